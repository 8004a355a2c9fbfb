//!
//! health referral HTTP server
//! ---------------------------
//! Axum router over the session, triage, patient and facility components.
//!
//! Responsibilities:
//! - Public routes: health, status, register, login, logout.
//! - Bearer-session gate on everything else, with a role guard on the
//!   triage write routes used by the classification worker.
//! - Uniform `{success, data}` / `{success, error}` envelopes.
//! - Background sweeping of expired sessions and cache entries.
//! - Store selection (memory or postgres) and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::Router;
use tracing::{debug, info, warn};

use crate::cache::{KvCache, LoginRateLimiter};
use crate::config::{Config, ConfigError, StoreBackend, MAX_SESSION_HOURS};
use crate::error::AppError;
use crate::facility::FacilityLocator;
use crate::identity::{require_session, role_guard, PhoneAuthProvider, SessionManager, CLINICAL_ROLES};
use crate::models::Facility;
use crate::patients::PatientRegistry;
use crate::store::{Deadline, PgStore, Stores};
use crate::triage::TriageController;

pub mod extract;
mod handlers;

/// Shared handles passed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: SessionManager,
    pub auth: PhoneAuthProvider,
    pub triage: TriageController,
    pub facilities: FacilityLocator,
    pub patients: PatientRegistry,
    pub cache: KvCache,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: &Config, stores: Stores) -> Result<Self, ConfigError> {
        let deadline = Deadline(config.store_timeout);
        let secs = config.session_duration.as_secs();
        let ttl = (secs <= MAX_SESSION_HOURS * 3600)
            .then(|| i64::try_from(secs).ok())
            .flatten()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| ConfigError::Invalid {
                key: "session_duration".to_string(),
                value: format!("{secs}s"),
            })?;
        let sessions = SessionManager::new(stores.users, stores.sessions, ttl, config.login_policy, deadline);
        let cache = KvCache::new();
        let limiter = LoginRateLimiter::new(cache.clone(), config.login_rate_limit, config.login_rate_window);
        Ok(Self {
            config: Arc::new(config.clone()),
            auth: PhoneAuthProvider::new(sessions.clone(), limiter),
            sessions,
            triage: TriageController::new(stores.triage, deadline),
            facilities: FacilityLocator::new(stores.facilities, deadline),
            patients: PatientRegistry::new(stores.patients, deadline),
            cache,
            started_at: Instant::now(),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let clinical = Router::new()
        .route("/v1/triage/{id}/status", put(handlers::update_triage_status))
        .route("/v1/triage/{id}/result", put(handlers::update_triage_result))
        .route_layer(middleware::from_fn_with_state(CLINICAL_ROLES, role_guard));

    let protected = Router::new()
        .route("/v1/auth/me", get(handlers::me))
        .route("/v1/patients", post(handlers::create_patient))
        .route("/v1/patients/{id}", get(handlers::get_patient).put(handlers::update_patient))
        .route("/v1/triage/patient/{patient_id}", get(handlers::patient_triage_history))
        .route("/v1/facilities", get(handlers::list_facilities))
        .route("/v1/facilities/nearby", get(handlers::nearby_facilities))
        .route("/v1/facilities/{id}", get(handlers::get_facility))
        .route("/v1/triage", post(handlers::create_triage))
        .route("/v1/triage/{id}", get(handlers::get_triage))
        .merge(clinical)
        .route_layer(middleware::from_fn_with_state(state.sessions.clone(), require_session));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/status", get(handlers::status))
        .route("/v1/auth/register", post(handlers::register))
        .route("/v1/auth/login", post(handlers::login))
        .route("/v1/auth/logout", post(handlers::logout))
        .merge(protected)
        .fallback(not_found)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn not_found() -> AppError { AppError::not_found("NOT_FOUND", "route not found") }

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let resp = next.run(req).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    let status = resp.status().as_u16();
    if resp.status().is_server_error() {
        warn!(target: "http", %method, %path, status, latency_ms, "request failed");
    } else {
        info!(target: "http", %method, %path, status, latency_ms, "request");
    }
    resp
}

/// Periodically drop expired sessions and cache entries. A zero interval disables it.
pub fn spawn_sweepers(state: &AppState) {
    let interval = state.config.session_sweep_interval;
    if interval.is_zero() {
        info!(target: "startup", "session sweeper disabled");
        return;
    }
    let sessions = state.sessions.clone();
    let cache = state.cache.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.tick().await;
        loop {
            tick.tick().await;
            match sessions.purge_expired().await {
                Ok(0) => {}
                Ok(n) => debug!(target: "auth", removed = n, "session_sweep"),
                Err(e) => warn!(target: "auth", "session sweep failed: {e}"),
            }
            let removed = cache.sweep();
            if removed > 0 {
                debug!(target: "cache", removed, remaining = cache.len(), "kv_sweep");
            }
        }
    });
}

fn load_facilities(path: &std::path::Path) -> anyhow::Result<Vec<Facility>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading facilities file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing facilities file {}", path.display()))
}

/// Open the configured backend. Facility seeding applies to the memory store only.
pub async fn build_stores(config: &Config) -> anyhow::Result<Stores> {
    match config.store {
        StoreBackend::Memory => {
            let (stores, mem) = Stores::in_memory();
            if let Some(path) = &config.facilities_file {
                let facilities = load_facilities(path)?;
                let count = facilities.len();
                for f in facilities {
                    mem.insert_facility(f);
                }
                info!(target: "startup", count, file = %path.display(), "facilities loaded");
            }
            Ok(stores)
        }
        StoreBackend::Postgres => {
            let url = config.database_url.as_deref().context("postgres store selected without a database url")?;
            let pg = PgStore::connect(url).await.context("connecting to postgres")?;
            pg.ensure_schema().await.context("applying schema")?;
            pg.ping().await.context("postgres ping")?;
            if config.facilities_file.is_some() {
                warn!(target: "startup", "facilities file ignored for the postgres store");
            }
            Ok(Stores::from_backend(Arc::new(pg)))
        }
    }
}

pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(target: "startup", "shutdown requested");
            }
        })
        .await?;
    Ok(())
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let stores = build_stores(&config).await?;
    let state = AppState::new(&config, stores)?;
    spawn_sweepers(&state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    info!(
        target: "startup",
        "Starting server on {}: store={:?}, environment='{}', login_policy={:?}",
        addr, config.store, config.environment, config.login_policy
    );
    serve(listener, state).await
}
