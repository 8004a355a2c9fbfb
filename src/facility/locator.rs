use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::geodesic::{bounding_box, distance_km};
use crate::models::{Facility, FacilityFilter, GeoPoint, NearbyFacility};
use crate::store::{Deadline, FacilityStore, StoreError};

pub const MAX_NEARBY: usize = 20;
pub const MAX_LIST: usize = 100;
pub const MIN_RADIUS_KM: f64 = 1.0;
pub const MAX_RADIUS_KM: f64 = 50.0;

#[derive(Debug, Error)]
pub enum FacilityError {
    #[error("invalid coordinates ({lat}, {lng})")]
    InvalidCoordinates { lat: f64, lng: f64 },

    #[error("radius_km must be between 1 and 50 (got {0})")]
    InvalidRadius(f64),

    #[error("facility {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct FacilityLocator {
    store: Arc<dyn FacilityStore>,
    deadline: Deadline,
}

impl FacilityLocator {
    pub fn new(store: Arc<dyn FacilityStore>, deadline: Deadline) -> Self { Self { store, deadline } }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Facility, FacilityError> {
        self.deadline.run(self.store.facility_by_id(id)).await?.ok_or(FacilityError::NotFound(id))
    }

    /// Name ascending, capped at [`MAX_LIST`].
    pub async fn list(&self, filter: FacilityFilter) -> Result<Vec<Facility>, FacilityError> {
        Ok(self.deadline.run(self.store.list_facilities(&filter, MAX_LIST)).await?)
    }

    /// Referral-accepting facilities within `radius_km` of the point, nearest
    /// first, at most [`MAX_NEARBY`].
    pub async fn nearby(&self, lat: f64, lng: f64, radius_km: f64) -> Result<Vec<NearbyFacility>, FacilityError> {
        let center = GeoPoint::new(lat, lng);
        if !center.is_valid() {
            return Err(FacilityError::InvalidCoordinates { lat, lng });
        }
        if !(MIN_RADIUS_KM..=MAX_RADIUS_KM).contains(&radius_km) {
            return Err(FacilityError::InvalidRadius(radius_km));
        }

        let bbox = bounding_box(center, radius_km);
        let candidates = self.deadline.run(self.store.referral_candidates(bbox)).await?;
        let scanned = candidates.len();
        let mut ranked: Vec<NearbyFacility> = candidates
            .into_iter()
            .filter(|f| f.accepts_referrals)
            .filter_map(|f| {
                let d = distance_km(center, f.location?);
                (d <= radius_km).then_some(NearbyFacility { facility: f, distance_km: d })
            })
            .collect();
        ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        ranked.truncate(MAX_NEARBY);
        debug!(target: "facility", lat, lng, radius_km, scanned, matched = ranked.len(), "nearby query");
        Ok(ranked)
    }
}
