//! Swiss national grids to WGS84.
//!
//! Approximate formulas published by swisstopo; accurate to about one metre,
//! well below the positional accuracy of field observations.

/// False origin of the LV95 grid (easting, northing).
const LV95_ORIGIN: (f64, f64) = (2_600_000.0, 1_200_000.0);
/// False origin of the LV03 grid (y/easting, x/northing).
const LV03_ORIGIN: (f64, f64) = (600_000.0, 200_000.0);

/// LV95 (EPSG:2056) easting/northing to (latitude, longitude).
pub fn lv95_to_wgs84(easting: f64, northing: f64) -> (f64, f64) {
    auxiliary_to_wgs84(
        (easting - LV95_ORIGIN.0) / 1_000_000.0,
        (northing - LV95_ORIGIN.1) / 1_000_000.0,
    )
}

/// LV03 (EPSG:21781) easting/northing to (latitude, longitude).
pub fn lv03_to_wgs84(easting: f64, northing: f64) -> (f64, f64) {
    auxiliary_to_wgs84(
        (easting - LV03_ORIGIN.0) / 1_000_000.0,
        (northing - LV03_ORIGIN.1) / 1_000_000.0,
    )
}

fn auxiliary_to_wgs84(y: f64, x: f64) -> (f64, f64) {
    // Results are in units of 10000"
    let lon = 2.6779094 + 4.728982 * y + 0.791484 * y * x + 0.1306 * y * x.powi(2)
        - 0.0436 * y.powi(3);
    let lat = 16.9023892 + 3.238272 * x
        - 0.270978 * y.powi(2)
        - 0.002528 * x.powi(2)
        - 0.0447 * y.powi(2) * x
        - 0.0140 * x.powi(3);

    (lat * 100.0 / 36.0, lon * 100.0 / 36.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_bern_origin() {
        let (lat, lon) = lv95_to_wgs84(2_600_000.0, 1_200_000.0);
        assert!(close(lat, 46.951081), "lat {lat}");
        assert!(close(lon, 7.438637), "lon {lon}");
    }

    #[test]
    fn test_lv03_matches_lv95() {
        let a = lv95_to_wgs84(2_573_000.0, 1_096_000.0);
        let b = lv03_to_wgs84(573_000.0, 96_000.0);
        assert!(close(a.0, b.0) && close(a.1, b.1));
        // Champex-Lac area, Valais
        assert!(a.0 > 45.9 && a.0 < 46.1, "lat {}", a.0);
        assert!(a.1 > 7.0 && a.1 < 7.2, "lon {}", a.1);
    }
}
