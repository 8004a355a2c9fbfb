use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Document, ParseEnumError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityType {
    Dispensary,
    HealthCenter,
    SubCountyHospital,
    CountyHospital,
    PrivateClinic,
}

impl FacilityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityType::Dispensary => "dispensary",
            FacilityType::HealthCenter => "health_center",
            FacilityType::SubCountyHospital => "sub_county_hospital",
            FacilityType::CountyHospital => "county_hospital",
            FacilityType::PrivateClinic => "private_clinic",
        }
    }
}

impl FromStr for FacilityType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dispensary" => Ok(FacilityType::Dispensary),
            "health_center" => Ok(FacilityType::HealthCenter),
            "sub_county_hospital" => Ok(FacilityType::SubCountyHospital),
            "county_hospital" => Ok(FacilityType::CountyHospital),
            "private_clinic" => Ok(FacilityType::PrivateClinic),
            other => Err(ParseEnumError { kind: "facility type", value: other.to_string() }),
        }
    }
}

/// WGS-84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self { Self { latitude, longitude } }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub facility_type: FacilityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_county: Option<String>,
    #[serde(default, flatten)]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub operating_hours: BTreeMap<String, String>,
    pub accepts_referrals: bool,
    pub accepts_mpesa: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bed_capacity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_count: Option<i32>,
    #[serde(default)]
    pub available_slots: Vec<Document>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A facility ranked by geodesic distance from the query point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyFacility {
    #[serde(flatten)]
    pub facility: Facility,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Default)]
pub struct FacilityFilter {
    pub county: Option<String>,
    pub facility_type: Option<FacilityType>,
}
