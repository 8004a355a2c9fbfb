//! Request extractors and the success envelope.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> { Json(ApiResponse { success: true, data }) }

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) { (StatusCode::CREATED, ok(data)) }

pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::user("INVALID_ID".to_string(), format!("invalid {what} id")))
}

pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| AppError::user("INVALID_REQUEST".to_string(), format!("invalid request body: {}", e.body_text())))
}

pub fn query<T>(params: Result<axum::extract::Query<T>, QueryRejection>) -> Result<T, AppError> {
    params
        .map(|axum::extract::Query(v)| v)
        .map_err(|e| AppError::user("INVALID_REQUEST".to_string(), format!("invalid query parameters: {}", e.body_text())))
}

/// Caller address and user agent as recorded on a new session.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let ip = forwarded
            .or_else(|| parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| addr.ip().to_string()));
        let user_agent = parts.headers.get(USER_AGENT).and_then(|v| v.to_str().ok()).map(str::to_string);
        Ok(ClientMeta { ip, user_agent })
    }
}
