use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::extract::{body, created, ok, parse_id, query, ClientMeta};
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::{parse_bearer, AuthError, AuthProvider, LoginRequest, RequestContext};
use crate::models::{
    FacilityFilter, FacilityType, NewPatient, ParseEnumError, PatientUpdate, Role, TriageLevel,
    TriageResult, TriageStatus,
};
use crate::triage::CreateTriage;

const SERVICE_NAME: &str = "digital-health-assistant";

pub async fn health() -> impl IntoResponse { Json(json!({"status": "healthy", "service": SERVICE_NAME})) }

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": SERVICE_NAME,
        "environment": state.config.environment,
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

// ---- auth ----

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub phone: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Roles a caller may pick for themselves; staff roles are granted out of band.
const SELF_SERVICE_ROLES: &[Role] = &[Role::Patient, Role::Chv];

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterPayload>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let payload = body(payload)?;
    let role = match payload.role.as_deref() {
        None => None,
        Some(r) => {
            let role: Role = r.parse().map_err(|e: ParseEnumError| {
                AppError::user("INVALID_REQUEST".to_string(), e.to_string())
            })?;
            if !SELF_SERVICE_ROLES.contains(&role) {
                return Err(AuthError::Forbidden.into());
            }
            Some(role)
        }
    };
    let user = state.sessions.register(&payload.phone, role).await?;
    Ok(created(user))
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub phone: String,
}

pub async fn login(
    State(state): State<AppState>,
    client: ClientMeta,
    payload: Result<Json<LoginPayload>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let payload = body(payload)?;
    let req = LoginRequest { phone: payload.phone, user_agent: client.user_agent, ip: client.ip };
    let resp = state.auth.login(&req).await?;
    Ok(ok(resp))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<impl IntoResponse> {
    let token = parse_bearer(&headers)?;
    state.sessions.delete_session(token).await?;
    Ok(ok(json!({"message": "Logged out successfully"})))
}

pub async fn me(Extension(ctx): Extension<RequestContext>) -> impl IntoResponse { ok(ctx.user) }

// ---- patients ----

pub async fn create_patient(
    State(state): State<AppState>,
    payload: Result<Json<NewPatient>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let patient = state.patients.create(body(payload)?).await?;
    Ok(created(patient))
}

pub async fn get_patient(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id, "patient")?;
    Ok(ok(state.patients.get_by_id(id).await?))
}

pub async fn update_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<PatientUpdate>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id, "patient")?;
    let patient = state.patients.update(id, body(payload)?).await?;
    Ok(ok(patient))
}

// ---- facilities ----

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default, rename = "type")]
    pub facility_type: Option<String>,
}

pub async fn list_facilities(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let params = query(params)?;
    let facility_type = params
        .facility_type
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<FacilityType>())
        .transpose()
        .map_err(|e| AppError::user("INVALID_REQUEST".to_string(), e.to_string()))?;
    let filter = FacilityFilter { county: params.county.filter(|c| !c.is_empty()), facility_type };
    let facilities = state.facilities.list(filter).await?;
    Ok(ok(json!({"count": facilities.len(), "facilities": facilities})))
}

#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lng")]
    pub longitude: f64,
    #[serde(alias = "radius")]
    pub radius_km: f64,
}

pub async fn nearby_facilities(
    State(state): State<AppState>,
    params: Result<Query<NearbyParams>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let p = query(params)?;
    let facilities = state.facilities.nearby(p.latitude, p.longitude, p.radius_km).await?;
    Ok(ok(json!({"count": facilities.len(), "facilities": facilities})))
}

pub async fn get_facility(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id, "facility")?;
    Ok(ok(state.facilities.get_by_id(id).await?))
}

// ---- triage ----

#[derive(Debug, Serialize)]
pub struct TriageCreated {
    pub session_id: Uuid,
    pub status: TriageStatus,
    pub triage_level: Option<TriageLevel>,
    pub recommended_action: Option<String>,
    pub message: &'static str,
    pub created_at: DateTime<Utc>,
}

pub async fn create_triage(
    State(state): State<AppState>,
    payload: Result<Json<CreateTriage>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let session = state.triage.create(body(payload)?).await?;
    Ok(created(TriageCreated {
        session_id: session.id,
        status: session.status,
        triage_level: session.triage_level,
        recommended_action: session.recommended_action,
        message: "Triage session created and queued for processing",
        created_at: session.created_at,
    }))
}

pub async fn get_triage(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id, "triage session")?;
    Ok(ok(state.triage.get_by_id(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn patient_triage_history(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let patient_id = parse_id(&patient_id, "patient")?;
    let limit = query(params)?.limit;
    let sessions = state.triage.get_by_patient(patient_id, limit).await?;
    Ok(ok(json!({"count": sessions.len(), "sessions": sessions})))
}

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    pub status: String,
}

pub async fn update_triage_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<StatusPayload>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id, "triage session")?;
    let raw = body(payload)?.status;
    let status: TriageStatus =
        raw.parse().map_err(|e: ParseEnumError| AppError::user("INVALID_REQUEST".to_string(), e.to_string()))?;
    Ok(ok(state.triage.update_status(id, status).await?))
}

pub async fn update_triage_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<TriageResult>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let id = parse_id(&id, "triage session")?;
    Ok(ok(state.triage.update_result(id, body(payload)?).await?))
}
