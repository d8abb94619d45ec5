//! Planar coordinates to geographic latitude/longitude.

pub mod swiss;

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, UploadError};
use crate::records::UploadRecord;

const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpatialReference {
    /// WGS84 geographic, x = longitude, y = latitude.
    Wgs84,
    /// Swiss CH1903+/LV95, EPSG:2056.
    Lv95,
    /// Swiss CH1903/LV03, EPSG:21781.
    Lv03,
    /// Pseudo-Mercator, EPSG:3857.
    WebMercator,
    /// Parsed but without a transform.
    Other(String),
}

impl FromStr for SpatialReference {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        let code = normalized.strip_prefix("EPSG:").unwrap_or(&normalized);

        Ok(match code {
            "4326" | "WGS84" | "CRS84" | "OGC:CRS84" | "CRS:84" => SpatialReference::Wgs84,
            "2056" => SpatialReference::Lv95,
            "21781" => SpatialReference::Lv03,
            "3857" | "900913" => SpatialReference::WebMercator,
            _ => SpatialReference::Other(s.trim().to_string()),
        })
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialReference::Wgs84 => write!(f, "EPSG:4326"),
            SpatialReference::Lv95 => write!(f, "EPSG:2056"),
            SpatialReference::Lv03 => write!(f, "EPSG:21781"),
            SpatialReference::WebMercator => write!(f, "EPSG:3857"),
            SpatialReference::Other(id) => write!(f, "{}", id),
        }
    }
}

impl SpatialReference {
    /// (x, y) in this reference to (latitude, longitude), `None` without a transform.
    pub fn to_wgs84(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        match self {
            SpatialReference::Wgs84 => Some((y, x)),
            SpatialReference::Lv95 => Some(swiss::lv95_to_wgs84(x, y)),
            SpatialReference::Lv03 => Some(swiss::lv03_to_wgs84(x, y)),
            SpatialReference::WebMercator => Some(web_mercator_to_wgs84(x, y)),
            SpatialReference::Other(_) => None,
        }
    }
}

fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / WEB_MERCATOR_RADIUS).to_degrees();
    let lat = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lat, lon)
}

/// True when a geographic pair looks like latitude and longitude were swapped
/// upstream (latitude near the equator, longitude far from it).
pub fn looks_swapped(lat: f64, lon: f64) -> bool {
    lat.abs() <= 15.0 && lon.abs() >= 30.0
}

pub struct CoordinateResolver {
    srs: SpatialReference,
    axis_swap_heuristic: bool,
}

impl CoordinateResolver {
    pub fn new(srs: SpatialReference, axis_swap_heuristic: bool) -> Self {
        Self {
            srs,
            axis_swap_heuristic,
        }
    }

    /// Resolve a record's raw x/y into (latitude, longitude).
    pub fn resolve(&self, record: &UploadRecord) -> Result<(f64, f64)> {
        let sample_id = &record.sample_id;
        let (x, y) = match (record.raw_x, record.raw_y) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(UploadError::unresolvable(sample_id, "missing x or y coordinate")),
        };

        let (mut lat, mut lon) = self.srs.to_wgs84(x, y).ok_or_else(|| {
            UploadError::unresolvable(sample_id, format!("no transform available for {}", self.srs))
        })?;

        if looks_swapped(lat, lon) {
            if self.axis_swap_heuristic {
                tracing::warn!(%sample_id, lat, lon, "Coordinates look swapped, swapping lat/lon");
                std::mem::swap(&mut lat, &mut lon);
            } else {
                tracing::warn!(%sample_id, lat, lon, "Coordinates look swapped; check the x/y columns");
            }
        }

        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(UploadError::unresolvable(
                sample_id,
                format!("({lat}, {lon}) is outside the geographic range"),
            ));
        }

        Ok((lat, lon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(x: Option<f64>, y: Option<f64>) -> UploadRecord {
        UploadRecord {
            sample_id: "abc_000123".to_string(),
            taxon_name: None,
            observed_on: None,
            raw_x: x,
            raw_y: y,
            location: None,
            upload: true,
            wildness: Default::default(),
            collector_inat: None,
            collector_name: None,
            project_code: None,
        }
    }

    fn srs(id: &str) -> SpatialReference {
        id.parse().unwrap()
    }

    #[test]
    fn test_parse_identifiers() {
        assert_eq!(srs("EPSG:4326"), SpatialReference::Wgs84);
        assert_eq!(srs("epsg:2056"), SpatialReference::Lv95);
        assert_eq!(srs("21781"), SpatialReference::Lv03);
        assert_eq!(srs("WGS84"), SpatialReference::Wgs84);
        assert_eq!(srs("EPSG:3857"), SpatialReference::WebMercator);
        assert_eq!(srs("EPSG:32632"), SpatialReference::Other("EPSG:32632".to_string()));
    }

    #[test]
    fn test_geographic_identity_reorders_axes() {
        let resolver = CoordinateResolver::new(SpatialReference::Wgs84, false);
        let (lat, lon) = resolver.resolve(&record(Some(7.0), Some(46.0))).unwrap();
        assert!((lat - 46.0).abs() < 1e-12);
        assert!((lon - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_coordinate_is_unresolvable() {
        let resolver = CoordinateResolver::new(SpatialReference::Wgs84, false);
        assert!(matches!(
            resolver.resolve(&record(Some(7.0), None)),
            Err(UploadError::UnresolvableCoordinates { .. })
        ));
    }

    #[test]
    fn test_unknown_reference_is_unresolvable() {
        let resolver = CoordinateResolver::new(srs("EPSG:32632"), false);
        let err = resolver
            .resolve(&record(Some(500_000.0), Some(5_100_000.0)))
            .unwrap_err();
        assert!(err.to_string().contains("EPSG:32632"));
    }

    #[test]
    fn test_lv95_projection() {
        let resolver = CoordinateResolver::new(SpatialReference::Lv95, false);
        let (lat, lon) = resolver
            .resolve(&record(Some(2_600_000.0), Some(1_200_000.0)))
            .unwrap();
        assert!((lat - 46.951081).abs() < 1e-4);
        assert!((lon - 7.438637).abs() < 1e-4);
    }

    #[test]
    fn test_web_mercator_inverse() {
        let (lat, lon) = SpatialReference::WebMercator
            .to_wgs84(0.0, 0.0)
            .unwrap();
        assert!(lat.abs() < 1e-9 && lon.abs() < 1e-9);

        let (lat, lon) = SpatialReference::WebMercator
            .to_wgs84(20_037_508.342789244, 0.0)
            .unwrap();
        assert!(lat.abs() < 1e-9);
        assert!((lon - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_swap_heuristic_is_opt_in() {
        // Columns labelled the wrong way round: x holds latitude
        let swapped = record(Some(46.0), Some(7.0));

        let strict = CoordinateResolver::new(SpatialReference::Wgs84, false);
        assert_eq!(strict.resolve(&swapped).unwrap(), (7.0, 46.0));

        let lenient = CoordinateResolver::new(SpatialReference::Wgs84, true);
        assert_eq!(lenient.resolve(&swapped).unwrap(), (46.0, 7.0));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let resolver = CoordinateResolver::new(SpatialReference::Wgs84, false);
        assert!(resolver.resolve(&record(Some(7.0), Some(146.0))).is_err());
    }
}
