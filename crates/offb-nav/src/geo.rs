//! Geodetic to local-tangent-plane projection.
//!
//! Waypoints are converted once, at startup, into a North-East-Down frame
//! anchored at a single reference point on the WGS84 ellipsoid.

use offb_proto::Vec3;
use serde::{Deserialize, Serialize};

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// Geodetic coordinate: degrees, degrees, meters above the ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub alt_m: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64, alt_m: f64) -> Self {
        Self { lat, lon, alt_m }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.alt_m.is_finite()
            && self.lat.abs() <= 90.0
            && self.lon.abs() <= 180.0
    }
}

/// Origin of the local frame. Immutable once built.
#[derive(Debug, Clone, Copy)]
pub struct ReferencePoint {
    ecef: [f64; 3],
    sin_lat: f64,
    cos_lat: f64,
    sin_lon: f64,
    cos_lon: f64,
}

impl ReferencePoint {
    pub fn new(origin: GeoPoint) -> Self {
        let (lat, lon) = (origin.lat.to_radians(), origin.lon.to_radians());
        Self {
            ecef: to_ecef(&origin),
            sin_lat: lat.sin(),
            cos_lat: lat.cos(),
            sin_lon: lon.sin(),
            cos_lon: lon.cos(),
        }
    }

    pub fn to_ned(&self, p: &GeoPoint) -> Vec3 {
        let ecef = to_ecef(p);
        let dx = ecef[0] - self.ecef[0];
        let dy = ecef[1] - self.ecef[1];
        let dz = ecef[2] - self.ecef[2];

        let (sp, cp, sl, cl) = (self.sin_lat, self.cos_lat, self.sin_lon, self.cos_lon);
        Vec3::new(
            -sp * cl * dx - sp * sl * dy + cp * dz,
            -sl * dx + cl * dy,
            -cp * cl * dx - cp * sl * dy - sp * dz,
        )
    }
}

/// Project an ordered list of geodetic waypoints into the reference NED
/// frame. Order and length are preserved; an empty input gives an empty
/// output.
pub fn project_waypoints(reference: &ReferencePoint, points: &[GeoPoint]) -> Vec<Vec3> {
    points.iter().map(|p| reference.to_ned(p)).collect()
}

fn to_ecef(p: &GeoPoint) -> [f64; 3] {
    let lat = p.lat.to_radians();
    let lon = p.lon.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    [
        (n + p.alt_m) * cos_lat * lon.cos(),
        (n + p.alt_m) * cos_lat * lon.sin(),
        (n * (1.0 - WGS84_E2) + p.alt_m) * sin_lat,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn altitude_maps_to_negative_down() {
        let r = ReferencePoint::new(GeoPoint::new(24.0, 54.0, 0.0));
        let ned = project_waypoints(&r, &[GeoPoint::new(24.0, 54.0, 10.0)]);
        assert_eq!(ned.len(), 1);
        assert!(close(ned[0].n, 0.0, 1e-6), "{:?}", ned[0]);
        assert!(close(ned[0].e, 0.0, 1e-6), "{:?}", ned[0]);
        assert!(close(ned[0].d, -10.0, 1e-6), "{:?}", ned[0]);
    }

    #[test]
    fn reference_projects_to_origin() {
        let origin = GeoPoint::new(24.484043629238872, 54.36068616768677, 0.0);
        let r = ReferencePoint::new(origin);
        assert!(r.to_ned(&origin).norm() < 1e-6);
    }

    #[test]
    fn small_offsets_follow_ellipsoid_radii() {
        let r = ReferencePoint::new(GeoPoint::new(24.0, 54.0, 0.0));

        let north = r.to_ned(&GeoPoint::new(24.001, 54.0, 0.0));
        assert!(north.n > 110.0 && north.n < 111.5, "{:?}", north);
        assert!(close(north.e, 0.0, 1e-6));

        let east = r.to_ned(&GeoPoint::new(24.0, 54.001, 0.0));
        assert!(east.e > 101.0 && east.e < 102.5, "{:?}", east);
        assert!(close(east.n, 0.0, 0.01));
        // the tangent plane drops away from the ellipsoid with distance
        assert!(east.d > 0.0 && east.d < 0.01);
    }

    #[test]
    fn order_and_length_preserved() {
        let r = ReferencePoint::new(GeoPoint::new(24.0, 54.0, 0.0));
        let pts = [
            GeoPoint::new(24.001, 54.0, 5.0),
            GeoPoint::new(24.0, 54.001, 15.0),
            GeoPoint::new(23.999, 53.999, 25.0),
        ];
        let ned = project_waypoints(&r, &pts);
        assert_eq!(ned.len(), 3);
        assert!(ned[0].n > 100.0);
        assert!(ned[1].e > 100.0);
        assert!(ned[2].n < -100.0 && ned[2].e < -100.0);
        assert!(close(ned[2].d, -25.0, 0.01));
    }

    #[test]
    fn empty_input_is_empty_output() {
        let r = ReferencePoint::new(GeoPoint::new(0.0, 0.0, 0.0));
        assert!(project_waypoints(&r, &[]).is_empty());
    }

    #[test]
    fn validity() {
        assert!(GeoPoint::new(24.0, 54.0, 0.0).is_valid());
        assert!(!GeoPoint::new(91.0, 54.0, 0.0).is_valid());
        assert!(!GeoPoint::new(24.0, f64::NAN, 0.0).is_valid());
    }
}
