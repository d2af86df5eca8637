//! Great-circle geodesy and travel-time conversion.

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default planning speed when none is configured, in km/h.
pub const DEFAULT_SPEED_KPH: f64 = 50.0;

/// Haversine great-circle distance between two coordinates, in metres.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Convert a speed in km/h to metres per second.
pub fn speed_mps(speed_kph: f64) -> f64 {
    speed_kph / 3.6
}

/// Travel time in seconds for a distance at the given speed.
pub fn travel_time_sec(dist_m: f64, speed_kph: f64) -> f64 {
    dist_m / speed_mps(speed_kph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn haversine_matches_known_city_pair() {
        // London -> Paris is roughly 344 km.
        let dist = haversine_m(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((dist - 344_000.0).abs() < 3_000.0, "got {dist}");
    }

    #[rstest]
    fn haversine_is_zero_for_identical_points() {
        assert_eq!(haversine_m(10.0, 20.0, 10.0, 20.0), 0.0);
    }

    #[rstest]
    #[case(50.0, 13.888)]
    #[case(36.0, 10.0)]
    fn speed_conversion(#[case] kph: f64, #[case] expected_mps: f64) {
        assert!((speed_mps(kph) - expected_mps).abs() < 0.001);
    }

    #[rstest]
    fn travel_time_at_default_speed() {
        // 13.888.. m/s -> one kilometre in ~72 s.
        let secs = travel_time_sec(1_000.0, DEFAULT_SPEED_KPH);
        assert!((secs - 72.0).abs() < 0.1, "got {secs}");
    }
}
