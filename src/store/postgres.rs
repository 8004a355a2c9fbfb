//! PostgreSQL/PostGIS backend over a single pipelined `tokio_postgres::Client`.
//!
//! Enumerations are stored as TEXT and JSON payloads as JSONB. Facility points
//! live in a `geography(Point, 4326)` column and are read back with
//! `ST_Y`/`ST_X`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{Json, ToSql};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info};
use uuid::Uuid;

use super::{
    BoundingBox, CasOutcome, FacilityStore, PatientStore, SessionStore, StoreError, StoreResult, TriagePatch,
    TriageStore, UserStore,
};
use crate::models::{
    Document, Facility, FacilityFilter, GeoPoint, NewPatient, NewSession, NewTriageSession, Patient, PatientUpdate,
    Role, Session, TriageSession, TriageStatus, User,
};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const USER_COLUMNS: &str =
    "id, phone, name, email, role, patient_id, is_active, last_login_at, created_at, updated_at";
const SESSION_COLUMNS: &str = "id, user_id, session_token, expires_at, user_agent, ip_address, created_at";
const PATIENT_COLUMNS: &str =
    "id, phone, name, date_of_birth, gender, preferred_language, consent_flags, created_at, updated_at";
const TRIAGE_COLUMNS: &str = "id, patient_id, symptoms, context, summary_text, triage_level, triage_code, \
     confidence, recommended_action, llm_response, channel, status, created_at, updated_at";
const FACILITY_COLUMNS: &str = "id, name, type, level, county, sub_county, \
     ST_Y(location::geometry) AS latitude, ST_X(location::geometry) AS longitude, \
     address, phone, email, services, operating_hours, accepts_referrals, accepts_mpesa, \
     bed_capacity, staff_count, available_slots, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    client: Arc<Client>,
}

impl PgStore {
    /// Connect and drive the connection on a background task.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await.map_err(pg_err)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(target: "store", "postgres connection error: {e}");
            }
        });
        info!(target: "store", "postgres connection established");
        Ok(Self { client: Arc::new(client) })
    }

    pub async fn ensure_schema(&self) -> StoreResult<()> {
        self.client.batch_execute(SCHEMA_SQL).await.map_err(pg_err)
    }

    pub async fn ping(&self) -> StoreResult<()> {
        self.client.simple_query("SELECT 1").await.map(|_| ()).map_err(pg_err)
    }
}

fn pg_err(e: tokio_postgres::Error) -> StoreError {
    match e.code() {
        Some(c) if *c == SqlState::UNIQUE_VIOLATION => StoreError::Conflict(e.to_string()),
        Some(c) if *c == SqlState::FOREIGN_KEY_VIOLATION => StoreError::MissingReference(e.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}

/// Candidate query for `bbox` with `$1..$4` = min_lat, max_lat, min_lng, max_lng.
///
/// The `&&` envelope test is what lets `facilities_location_idx` serve the
/// scan; the coordinate range re-check keeps results identical to the box. An
/// envelope spanning every longitude is degenerate, so open boxes skip it.
fn candidates_query(bbox: &BoundingBox) -> String {
    let mut q = format!(
        "SELECT {FACILITY_COLUMNS} FROM facilities \
         WHERE accepts_referrals = TRUE AND location IS NOT NULL"
    );
    if !bbox.spans_all_longitudes() {
        q.push_str(" AND location && ST_MakeEnvelope($3, $1, $4, $2, 4326)::geography");
    }
    q.push_str(
        " AND ST_Y(location::geometry) BETWEEN $1 AND $2 \
         AND ST_X(location::geometry) BETWEEN $3 AND $4",
    );
    q
}

fn parse_col<T>(row: &Row, col: &str) -> StoreResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(col).map_err(|e| StoreError::Decode(e.to_string()))?;
    raw.parse::<T>().map_err(|e| StoreError::Decode(format!("{col}: {e}")))
}

fn parse_opt_col<T>(row: &Row, col: &str) -> StoreResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: Option<String> = row.try_get(col).map_err(|e| StoreError::Decode(e.to_string()))?;
    raw.map(|s| s.parse::<T>().map_err(|e| StoreError::Decode(format!("{col}: {e}")))).transpose()
}

fn get<'a, T: tokio_postgres::types::FromSql<'a>>(row: &'a Row, col: &str) -> StoreResult<T> {
    row.try_get(col).map_err(|e| StoreError::Decode(format!("{col}: {e}")))
}

fn user_from_row(row: &Row) -> StoreResult<User> {
    Ok(User {
        id: get(row, "id")?,
        phone: get(row, "phone")?,
        name: get(row, "name")?,
        email: get(row, "email")?,
        role: parse_col::<Role>(row, "role")?,
        patient_id: get(row, "patient_id")?,
        is_active: get(row, "is_active")?,
        last_login_at: get(row, "last_login_at")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn session_from_row(row: &Row) -> StoreResult<Session> {
    Ok(Session {
        id: get(row, "id")?,
        user_id: get(row, "user_id")?,
        token: get(row, "session_token")?,
        expires_at: get(row, "expires_at")?,
        user_agent: get(row, "user_agent")?,
        ip_address: get(row, "ip_address")?,
        created_at: get(row, "created_at")?,
    })
}

fn patient_from_row(row: &Row) -> StoreResult<Patient> {
    let Json(consent_flags): Json<BTreeMap<String, bool>> = get(row, "consent_flags")?;
    Ok(Patient {
        id: get(row, "id")?,
        phone: get(row, "phone")?,
        name: get(row, "name")?,
        date_of_birth: get(row, "date_of_birth")?,
        gender: get(row, "gender")?,
        preferred_language: get(row, "preferred_language")?,
        consent_flags,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn triage_from_row(row: &Row) -> StoreResult<TriageSession> {
    let Json(symptoms): Json<Document> = get(row, "symptoms")?;
    let context: Option<Json<Document>> = get(row, "context")?;
    let llm_response: Option<Json<Document>> = get(row, "llm_response")?;
    Ok(TriageSession {
        id: get(row, "id")?,
        patient_id: get(row, "patient_id")?,
        symptoms,
        context: context.map(|j| j.0),
        summary_text: get(row, "summary_text")?,
        triage_level: parse_opt_col(row, "triage_level")?,
        triage_code: get(row, "triage_code")?,
        confidence: get(row, "confidence")?,
        recommended_action: get(row, "recommended_action")?,
        llm_response: llm_response.map(|j| j.0),
        channel: parse_col(row, "channel")?,
        status: parse_col(row, "status")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn facility_from_row(row: &Row) -> StoreResult<Facility> {
    let latitude: Option<f64> = get(row, "latitude")?;
    let longitude: Option<f64> = get(row, "longitude")?;
    let Json(operating_hours): Json<BTreeMap<String, String>> = get(row, "operating_hours")?;
    let Json(available_slots): Json<Vec<Document>> = get(row, "available_slots")?;
    Ok(Facility {
        id: get(row, "id")?,
        name: get(row, "name")?,
        facility_type: parse_col(row, "type")?,
        level: get(row, "level")?,
        county: get(row, "county")?,
        sub_county: get(row, "sub_county")?,
        location: latitude.zip(longitude).map(|(lat, lng)| GeoPoint::new(lat, lng)),
        address: get(row, "address")?,
        phone: get(row, "phone")?,
        email: get(row, "email")?,
        services: get(row, "services")?,
        operating_hours,
        accepts_referrals: get(row, "accepts_referrals")?,
        accepts_mpesa: get(row, "accepts_mpesa")?,
        bed_capacity: get(row, "bed_capacity")?,
        staff_count: get(row, "staff_count")?,
        available_slots,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, phone: &str, role: Role) -> StoreResult<User> {
        let q = format!("INSERT INTO users (phone, role) VALUES ($1, $2) RETURNING {USER_COLUMNS}");
        let row = self.client.query_one(&q, &[&phone, &role.as_str()]).await.map_err(pg_err)?;
        user_from_row(&row)
    }

    async fn user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let q = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = self.client.query_opt(&q, &[&id]).await.map_err(pg_err)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_by_phone(&self, phone: &str) -> StoreResult<Option<User>> {
        let q = format!("SELECT {USER_COLUMNS} FROM users WHERE phone = $1");
        let row = self.client.query_opt(&q, &[&phone]).await.map_err(pg_err)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let n = self
            .client
            .execute("UPDATE users SET last_login_at = $2 WHERE id = $1", &[&id, &at])
            .await
            .map_err(pg_err)?;
        Ok(n > 0)
    }

    async fn set_user_active(&self, id: Uuid, active: bool) -> StoreResult<bool> {
        let n = self
            .client
            .execute("UPDATE users SET is_active = $2, updated_at = now() WHERE id = $1", &[&id, &active])
            .await
            .map_err(pg_err)?;
        Ok(n > 0)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, new: NewSession) -> StoreResult<Session> {
        let q = format!(
            "INSERT INTO sessions (user_id, session_token, expires_at, user_agent, ip_address) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {SESSION_COLUMNS}"
        );
        let row = self
            .client
            .query_one(&q, &[&new.user_id, &new.token, &new.expires_at, &new.user_agent, &new.ip_address])
            .await
            .map_err(pg_err)?;
        session_from_row(&row)
    }

    async fn session_by_token(&self, token: &str) -> StoreResult<Option<Session>> {
        let q = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_token = $1");
        let row = self.client.query_opt(&q, &[&token]).await.map_err(pg_err)?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn delete_session(&self, token: &str) -> StoreResult<bool> {
        let n = self
            .client
            .execute("DELETE FROM sessions WHERE session_token = $1", &[&token])
            .await
            .map_err(pg_err)?;
        Ok(n > 0)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.client
            .execute("DELETE FROM sessions WHERE expires_at <= $1", &[&now])
            .await
            .map_err(pg_err)
    }
}

#[async_trait]
impl PatientStore for PgStore {
    async fn create_patient(&self, new: NewPatient) -> StoreResult<Patient> {
        let q = format!(
            "INSERT INTO patients (phone, name, date_of_birth, gender, preferred_language, consent_flags) \
             VALUES ($1, $2, $3, $4, COALESCE($5, 'en'), $6) RETURNING {PATIENT_COLUMNS}"
        );
        let consent = Json(&new.consent_flags);
        let row = self
            .client
            .query_one(
                &q,
                &[&new.phone, &new.name, &new.date_of_birth, &new.gender, &new.preferred_language, &consent],
            )
            .await
            .map_err(pg_err)?;
        patient_from_row(&row)
    }

    async fn patient_by_id(&self, id: Uuid) -> StoreResult<Option<Patient>> {
        let q = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = $1");
        let row = self.client.query_opt(&q, &[&id]).await.map_err(pg_err)?;
        row.as_ref().map(patient_from_row).transpose()
    }

    async fn patient_by_phone(&self, phone: &str) -> StoreResult<Option<Patient>> {
        let q = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE phone = $1");
        let row = self.client.query_opt(&q, &[&phone]).await.map_err(pg_err)?;
        row.as_ref().map(patient_from_row).transpose()
    }

    async fn update_patient(&self, id: Uuid, update: PatientUpdate) -> StoreResult<Option<Patient>> {
        let q = format!(
            "UPDATE patients SET \
               name = COALESCE($2, name), \
               date_of_birth = COALESCE($3, date_of_birth), \
               gender = COALESCE($4, gender), \
               preferred_language = COALESCE($5, preferred_language), \
               consent_flags = COALESCE($6, consent_flags), \
               updated_at = now() \
             WHERE id = $1 RETURNING {PATIENT_COLUMNS}"
        );
        let consent = update.consent_flags.as_ref().map(Json);
        let row = self
            .client
            .query_opt(
                &q,
                &[&id, &update.name, &update.date_of_birth, &update.gender, &update.preferred_language, &consent],
            )
            .await
            .map_err(pg_err)?;
        row.as_ref().map(patient_from_row).transpose()
    }
}

#[async_trait]
impl TriageStore for PgStore {
    async fn create_triage(&self, new: NewTriageSession) -> StoreResult<TriageSession> {
        let q = format!(
            "INSERT INTO triage_sessions (patient_id, symptoms, context, channel, status) \
             VALUES ($1, $2, $3, $4, 'queued') RETURNING {TRIAGE_COLUMNS}"
        );
        let symptoms = Json(&new.symptoms);
        let context = new.context.as_ref().map(Json);
        let row = self
            .client
            .query_one(&q, &[&new.patient_id, &symptoms, &context, &new.channel.as_str()])
            .await
            .map_err(pg_err)?;
        triage_from_row(&row)
    }

    async fn triage_by_id(&self, id: Uuid) -> StoreResult<Option<TriageSession>> {
        let q = format!("SELECT {TRIAGE_COLUMNS} FROM triage_sessions WHERE id = $1");
        let row = self.client.query_opt(&q, &[&id]).await.map_err(pg_err)?;
        row.as_ref().map(triage_from_row).transpose()
    }

    async fn triage_by_patient(&self, patient_id: Uuid, limit: usize) -> StoreResult<Vec<TriageSession>> {
        let q = format!(
            "SELECT {TRIAGE_COLUMNS} FROM triage_sessions WHERE patient_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        let limit = limit as i64;
        let rows = self.client.query(&q, &[&patient_id, &limit]).await.map_err(pg_err)?;
        rows.iter().map(triage_from_row).collect()
    }

    async fn apply_triage(&self, id: Uuid, expected: TriageStatus, patch: TriagePatch) -> StoreResult<CasOutcome> {
        let target = patch.target_status();
        let row = match &patch {
            TriagePatch::Status(_) => {
                let q = format!(
                    "UPDATE triage_sessions SET status = $3, updated_at = now() \
                     WHERE id = $1 AND status = $2 RETURNING {TRIAGE_COLUMNS}"
                );
                self.client
                    .query_opt(&q, &[&id, &expected.as_str(), &target.as_str()])
                    .await
                    .map_err(pg_err)?
            }
            TriagePatch::Result(r) => {
                let q = format!(
                    "UPDATE triage_sessions SET status = $3, triage_level = $4, triage_code = $5, \
                       confidence = $6, recommended_action = $7, llm_response = $8, updated_at = now() \
                     WHERE id = $1 AND status = $2 RETURNING {TRIAGE_COLUMNS}"
                );
                let response = Json(&r.response);
                self.client
                    .query_opt(
                        &q,
                        &[
                            &id,
                            &expected.as_str(),
                            &target.as_str(),
                            &r.level.as_str(),
                            &r.code,
                            &r.confidence,
                            &r.recommended_action,
                            &response,
                        ],
                    )
                    .await
                    .map_err(pg_err)?
            }
        };
        if let Some(row) = row {
            return Ok(CasOutcome::Applied(triage_from_row(&row)?));
        }
        let exists = self
            .client
            .query_opt("SELECT 1 FROM triage_sessions WHERE id = $1", &[&id])
            .await
            .map_err(pg_err)?;
        Ok(if exists.is_some() { CasOutcome::Stale } else { CasOutcome::Missing })
    }
}

#[async_trait]
impl FacilityStore for PgStore {
    async fn facility_by_id(&self, id: Uuid) -> StoreResult<Option<Facility>> {
        let q = format!("SELECT {FACILITY_COLUMNS} FROM facilities WHERE id = $1");
        let row = self.client.query_opt(&q, &[&id]).await.map_err(pg_err)?;
        row.as_ref().map(facility_from_row).transpose()
    }

    async fn list_facilities(&self, filter: &FacilityFilter, limit: usize) -> StoreResult<Vec<Facility>> {
        let type_str = filter.facility_type.map(|t| t.as_str());
        let limit = limit as i64;
        let mut q = format!("SELECT {FACILITY_COLUMNS} FROM facilities WHERE 1=1");
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        if let Some(county) = filter.county.as_ref() {
            params.push(county);
            q.push_str(&format!(" AND county = ${}", params.len()));
        }
        if let Some(t) = type_str.as_ref() {
            params.push(t);
            q.push_str(&format!(" AND type = ${}", params.len()));
        }
        params.push(&limit);
        q.push_str(&format!(" ORDER BY name ASC LIMIT ${}", params.len()));
        let rows = self.client.query(&q, &params).await.map_err(pg_err)?;
        rows.iter().map(facility_from_row).collect()
    }

    async fn referral_candidates(&self, bbox: BoundingBox) -> StoreResult<Vec<Facility>> {
        let q = candidates_query(&bbox);
        let rows = self
            .client
            .query(&q, &[&bbox.min_lat, &bbox.max_lat, &bbox.min_lng, &bbox.max_lng])
            .await
            .map_err(pg_err)?;
        rows.iter().map(facility_from_row).collect()
    }
}
