//! Facility lookup and proximity ranking.

pub mod geodesic;
mod locator;

pub use locator::{FacilityError, FacilityLocator, MAX_LIST, MAX_NEARBY, MAX_RADIUS_KM, MIN_RADIUS_KM};
