//! Distances on the WGS-84 ellipsoid (Vincenty's inverse formula).

use crate::models::GeoPoint;
use crate::store::BoundingBox;

/// Semi-major axis in metres.
pub const WGS84_A: f64 = 6_378_137.0;
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
pub const WGS84_B: f64 = (1.0 - WGS84_F) * WGS84_A;

/// IUGG mean Earth radius, used by the spherical fallback.
const MEAN_RADIUS_M: f64 = 6_371_008.8;

const MAX_ITERATIONS: usize = 200;
const TOLERANCE: f64 = 1e-12;

/// Kilometres per degree of latitude at its shortest (the equator).
const KM_PER_DEG_LAT: f64 = 110.574;
/// Kilometres per degree of longitude on the equator.
const KM_PER_DEG_LNG: f64 = 111.320;
/// Widening applied to the box so that rounding never excludes a true match.
const BOX_PAD: f64 = 1.05;

/// Geodesic distance in metres, or `None` when the iteration does not
/// converge (nearly antipodal points).
pub fn vincenty_inverse_m(p1: GeoPoint, p2: GeoPoint) -> Option<f64> {
    let (a, b, f) = (WGS84_A, WGS84_B, WGS84_F);
    let l = (p2.longitude - p1.longitude).to_radians();
    let u1 = ((1.0 - f) * p1.latitude.to_radians().tan()).atan();
    let u2 = ((1.0 - f) * p2.latitude.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    let mut converged = false;
    let (mut sin_sigma, mut cos_sigma, mut sigma) = (0.0, 0.0, 0.0);
    let (mut cos_sq_alpha, mut cos_2sigma_m) = (0.0, 0.0);

    for _ in 0..MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let t1 = cos_u2 * sin_lambda;
        let t2 = cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda;
        sin_sigma = (t1 * t1 + t2 * t2).sqrt();
        if sin_sigma == 0.0 {
            // coincident points
            return Some(0.0);
        }
        cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // equatorial line: cos_sq_alpha == 0
        cos_2sigma_m = if cos_sq_alpha != 0.0 { cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha } else { 0.0 };
        let c = f / 16.0 * cos_sq_alpha * (4.0 + f * (4.0 - 3.0 * cos_sq_alpha));
        let prev = lambda;
        lambda = l
            + (1.0 - c)
                * f
                * sin_alpha
                * (sigma + c * sin_sigma * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));
        if (lambda - prev).abs() <= TOLERANCE {
            converged = true;
            break;
        }
    }
    if !converged {
        return None;
    }

    let u_sq = cos_sq_alpha * (a * a - b * b) / (b * b);
    let big_a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
    let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
    let delta_sigma = big_b
        * sin_sigma
        * (cos_2sigma_m
            + big_b / 4.0
                * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                    - big_b / 6.0
                        * cos_2sigma_m
                        * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                        * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)));
    Some(b * big_a * (sigma - delta_sigma))
}

/// Great-circle distance in metres on the mean sphere.
pub fn haversine_m(p1: GeoPoint, p2: GeoPoint) -> f64 {
    let (lat1, lat2) = (p1.latitude.to_radians(), p2.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (p2.longitude - p1.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * MEAN_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Ellipsoidal distance in kilometres, spherical when Vincenty diverges.
pub fn distance_km(p1: GeoPoint, p2: GeoPoint) -> f64 {
    vincenty_inverse_m(p1, p2).unwrap_or_else(|| haversine_m(p1, p2)) / 1000.0
}

/// Lat/lng window guaranteed to contain every point within `radius_km` of `center`.
///
/// Near a pole or across the antimeridian the longitude range is left open.
pub fn bounding_box(center: GeoPoint, radius_km: f64) -> BoundingBox {
    let dlat = radius_km / KM_PER_DEG_LAT * BOX_PAD;
    let min_lat = (center.latitude - dlat).max(-90.0);
    let max_lat = (center.latitude + dlat).min(90.0);
    let full = BoundingBox { min_lat, max_lat, min_lng: -180.0, max_lng: 180.0 };
    if min_lat <= -90.0 || max_lat >= 90.0 {
        return full;
    }
    // the parallel closest to a pole has the shortest degree of longitude
    let widest = min_lat.abs().max(max_lat.abs()).to_radians();
    let dlng = radius_km / (KM_PER_DEG_LNG * widest.cos()) * BOX_PAD;
    let (min_lng, max_lng) = (center.longitude - dlng, center.longitude + dlng);
    if dlng >= 180.0 || min_lng < -180.0 || max_lng > 180.0 {
        return full;
    }
    BoundingBox { min_lat, max_lat, min_lng, max_lng }
}
