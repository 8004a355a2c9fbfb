//! Shared harness: an in-memory server on an ephemeral port plus small reqwest helpers.
#![allow(dead_code)]

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use uuid::Uuid;

use health_referral::config::Config;
use health_referral::models::{Facility, FacilityType, GeoPoint, Role};
use health_referral::server::{serve, AppState};
use health_referral::store::Stores;

pub struct TestServer {
    pub base: String,
    pub state: AppState,
    pub client: Client,
}

pub async fn spawn_with(config: Config, facilities: Vec<Facility>) -> TestServer {
    let (stores, mem) = Stores::in_memory();
    for f in facilities {
        mem.insert_facility(f);
    }
    let state = AppState::new(&config, stores).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let st = state.clone();
    tokio::spawn(async move {
        let _ = serve(listener, st).await;
    });
    TestServer { base: format!("http://{addr}"), state, client: Client::new() }
}

pub async fn spawn() -> TestServer { spawn_with(Config::default(), vec![]).await }

impl TestServer {
    pub fn url(&self, path: &str) -> String { format!("{}{}", self.base, path) }

    pub async fn send(&self, req: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.send(self.client.get(self.url(path)).bearer_auth(token)).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        self.send(req).await
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.put(self.url(path)).bearer_auth(token).json(&body)).await
    }

    /// Log in over HTTP and return the bearer token.
    pub async fn login(&self, phone: &str) -> String {
        let (status, body) = self.post("/v1/auth/login", None, serde_json::json!({ "phone": phone })).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["data"]["session_token"].as_str().unwrap().to_string()
    }

    /// Staff accounts cannot self-register; create one directly and log in.
    pub async fn clinician_token(&self, phone: &str) -> String {
        self.state.sessions.register(phone, Some(Role::Clinician)).await.unwrap();
        self.login(phone).await
    }
}

pub fn facility(name: &str, lat: f64, lng: f64, accepts_referrals: bool) -> Facility {
    Facility {
        id: Uuid::new_v4(),
        name: name.to_string(),
        facility_type: FacilityType::HealthCenter,
        level: Some(3),
        county: Some("Nairobi".to_string()),
        sub_county: None,
        location: Some(GeoPoint::new(lat, lng)),
        address: None,
        phone: None,
        email: None,
        services: vec!["outpatient".to_string()],
        operating_hours: Default::default(),
        accepts_referrals,
        accepts_mpesa: false,
        bed_capacity: None,
        staff_count: None,
        available_slots: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
