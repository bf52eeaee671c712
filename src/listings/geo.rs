const EARTH_RADIUS_KM: f64 = 6371.0;

pub const DEFAULT_RADIUS_KM: f64 = 10.0;
pub const MAX_RADIUS_KM: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    pub fn new(lat: f64, lng: f64) -> Result<Self, String> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err("Latitude must be between -90 and 90".into());
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err("Longitude must be between -180 and 180".into());
        }
        Ok(Self { lat, lng })
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: Point, b: Point) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Lat/lng bounds that contain every point within `radius_km` of a centre.
/// Used as a cheap SQL prefilter before the exact distance check.
///
/// Longitudes are kept in [-180, 180]. A box that crosses the antimeridian
/// has `min_lng > max_lng` and covers both `>= min_lng` and `<= max_lng`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn wraps_antimeridian(&self) -> bool {
        self.min_lng > self.max_lng
    }

    pub fn contains(&self, p: Point) -> bool {
        let lat_ok = (self.min_lat..=self.max_lat).contains(&p.lat);
        let lng_ok = if self.wraps_antimeridian() {
            p.lng >= self.min_lng || p.lng <= self.max_lng
        } else {
            (self.min_lng..=self.max_lng).contains(&p.lng)
        };
        lat_ok && lng_ok
    }
}

pub fn bounding_box(center: Point, radius_km: f64) -> BoundingBox {
    let dlat = (radius_km / EARTH_RADIUS_KM).to_degrees();
    let min_lat = (center.lat - dlat).max(-90.0);
    let max_lat = (center.lat + dlat).min(90.0);

    let cos_lat = center.lat.to_radians().cos().abs().max(1e-6);
    let dlng = (radius_km / (EARTH_RADIUS_KM * cos_lat)).to_degrees();

    // Past a pole, or wide enough to circle the globe, every longitude is in.
    if dlng >= 180.0 || min_lat <= -90.0 || max_lat >= 90.0 {
        return BoundingBox {
            min_lat,
            max_lat,
            min_lng: -180.0,
            max_lng: 180.0,
        };
    }

    BoundingBox {
        min_lat,
        max_lat,
        min_lng: wrap_lng(center.lng - dlng),
        max_lng: wrap_lng(center.lng + dlng),
    }
}

fn wrap_lng(lng: f64) -> f64 {
    if lng < -180.0 {
        lng + 360.0
    } else if lng > 180.0 {
        lng - 360.0
    } else {
        lng
    }
}

pub fn clamp_radius(radius_km: Option<f64>) -> f64 {
    match radius_km {
        Some(r) if r.is_finite() && r > 0.0 => r.min(MAX_RADIUS_KM),
        _ => DEFAULT_RADIUS_KM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAIROBI: Point = Point {
        lat: -1.2921,
        lng: 36.8219,
    };
    const MOMBASA: Point = Point {
        lat: -4.0435,
        lng: 39.6682,
    };

    #[test]
    fn distance_to_self_is_zero() {
        assert!(haversine_km(NAIROBI, NAIROBI).abs() < 1e-9);
    }

    #[test]
    fn nairobi_to_mombasa_is_about_440_km() {
        let d = haversine_km(NAIROBI, MOMBASA);
        assert!((d - 440.0).abs() < 10.0, "got {d}");
        assert!((d - haversine_km(MOMBASA, NAIROBI)).abs() < 1e-9);
    }

    #[test]
    fn bounding_box_contains_radius() {
        let bbox = bounding_box(NAIROBI, 10.0);
        assert!(!bbox.wraps_antimeridian());
        assert!(bbox.contains(NAIROBI));
        assert!(!bbox.contains(MOMBASA));
        // One degree of latitude is ~111 km
        assert!(((bbox.max_lat - bbox.min_lat) / 2.0 - 10.0 / 111.2).abs() < 0.01);
    }

    #[test]
    fn bounding_box_wraps_across_the_antimeridian() {
        let east = Point { lat: 0.0, lng: 179.95 };
        let west = Point { lat: 0.0, lng: -179.95 };
        assert!(haversine_km(east, west) < 20.0);

        let bbox = bounding_box(east, 20.0);
        assert!(bbox.wraps_antimeridian());
        assert!((-180.0..=180.0).contains(&bbox.min_lng));
        assert!((-180.0..=180.0).contains(&bbox.max_lng));
        assert!(bbox.contains(east));
        assert!(bbox.contains(west));
        assert!(!bbox.contains(Point { lat: 0.0, lng: 0.0 }));

        let bbox = bounding_box(west, 20.0);
        assert!(bbox.wraps_antimeridian());
        assert!(bbox.contains(east));
    }

    #[test]
    fn bounding_box_near_a_pole_spans_every_longitude() {
        let bbox = bounding_box(Point { lat: 89.99, lng: 10.0 }, 5.0);
        assert_eq!((bbox.min_lng, bbox.max_lng), (-180.0, 180.0));
        assert_eq!(bbox.max_lat, 90.0);
        assert!(bbox.contains(Point { lat: 89.995, lng: -170.0 }));
    }

    #[test]
    fn invalid_coordinates_rejected() {
        assert!(Point::new(91.0, 0.0).is_err());
        assert!(Point::new(0.0, -181.0).is_err());
        assert!(Point::new(f64::NAN, 0.0).is_err());
        assert!(Point::new(-1.29, 36.82).is_ok());
    }

    #[test]
    fn radius_is_clamped() {
        assert_eq!(clamp_radius(None), DEFAULT_RADIUS_KM);
        assert_eq!(clamp_radius(Some(-3.0)), DEFAULT_RADIUS_KM);
        assert_eq!(clamp_radius(Some(500.0)), MAX_RADIUS_KM);
        assert_eq!(clamp_radius(Some(2.5)), 2.5);
    }
}
