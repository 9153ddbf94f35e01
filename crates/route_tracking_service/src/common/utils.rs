/*  This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use super::types::*;
use chrono::{NaiveDate, NaiveTime, Timelike, Utc};
use std::f64::consts::PI;

/// Geofence radius around a warehouse: 0.1 mile.
pub const GEOFENCE_RADIUS_METERS: f64 = 160.934;

fn deg2rad(degrees: f64) -> f64 {
    degrees * PI / 180.0
}

pub fn distance_between_in_meters(latlong1: &Point, latlong2: &Point) -> f64 {
    // Calculating using haversine formula
    // Radius of Earth in meters
    let r: f64 = 6371000.0;

    let Latitude(lat1) = latlong1.lat;
    let Longitude(lon1) = latlong1.lon;
    let Latitude(lat2) = latlong2.lat;
    let Longitude(lon2) = latlong2.lon;

    let dlat = deg2rad(lat2 - lat1);
    let dlon = deg2rad(lon2 - lon1);

    let rlat1 = deg2rad(lat1);
    let rlat2 = deg2rad(lat2);

    let sq = |x: f64| x * x;

    // Calculated distance is real (not imaginary) when 0 <= h <= 1
    let h = sq((dlat / 2.0).sin()) + rlat1.cos() * rlat2.cos() * sq((dlon / 2.0).sin());

    2.0 * r * h.sqrt().atan2((1.0 - h).sqrt())
}

pub fn is_within_geofence(point: &Point, center: &Point, radius_meters: f64) -> bool {
    distance_between_in_meters(point, center) <= radius_meters
}

/// Clamps a recomputed planned arrival into the [07:00, 20:00) operating
/// window on its own calendar day. Earlier floors to 07:00, 20:00 or later
/// caps to 19:59.
pub fn clamp_to_operating_window(
    TimeStamp(ts): TimeStamp,
    start_hour: u32,
    end_hour: u32,
) -> TimeStamp {
    let window_start =
        NaiveTime::from_hms_opt(start_hour, 0, 0).unwrap_or(NaiveTime::default());
    let window_cap =
        NaiveTime::from_hms_opt(end_hour.saturating_sub(1), 59, 0).unwrap_or(NaiveTime::default());

    let time = ts.time();
    let clamped = if time < window_start {
        window_start
    } else if time.hour() >= end_hour {
        window_cap
    } else {
        return TimeStamp(ts);
    };

    TimeStamp(ts.date_naive().and_time(clamped).and_utc())
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Automatic polling only runs inside the configured daily window.
pub fn is_within_tracking_hours(start_hour: u32, end_hour: u32) -> bool {
    let hour = Utc::now().hour();
    hour >= start_hour && hour < end_hour
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32) -> TimeStamp {
        TimeStamp(Utc.with_ymd_and_hms(2024, 3, 14, h, m, 0).unwrap())
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Bangalore city railway station to Kempegowda bus station, ~880m.
        let a = Point {
            lat: Latitude(12.9767),
            lon: Longitude(77.5713),
        };
        let b = Point {
            lat: Latitude(12.9774),
            lon: Longitude(77.5794),
        };
        let d = distance_between_in_meters(&a, &b);
        assert!(d > 850.0 && d < 920.0, "got {d}");
    }

    #[test]
    fn geofence_containment_uses_radius_boundary() {
        let center = Point {
            lat: Latitude(12.9716),
            lon: Longitude(77.5946),
        };
        // ~111m north of center, inside the 160.934m fence.
        let inside = Point {
            lat: Latitude(12.9726),
            lon: Longitude(77.5946),
        };
        // ~1.1km north, outside.
        let outside = Point {
            lat: Latitude(12.9816),
            lon: Longitude(77.5946),
        };
        assert!(is_within_geofence(&inside, &center, GEOFENCE_RADIUS_METERS));
        assert!(!is_within_geofence(&outside, &center, GEOFENCE_RADIUS_METERS));
    }

    #[test]
    fn clamp_floors_early_arrivals() {
        let clamped = clamp_to_operating_window(ts(5, 30), 7, 20);
        assert_eq!(clamped, ts(7, 0));
    }

    #[test]
    fn clamp_caps_late_arrivals() {
        let clamped = clamp_to_operating_window(ts(21, 15), 7, 20);
        assert_eq!(clamped, ts(19, 59));
        // 20:00 itself is outside the half-open window.
        assert_eq!(clamp_to_operating_window(ts(20, 0), 7, 20), ts(19, 59));
    }

    #[test]
    fn clamp_survives_a_zero_end_hour() {
        assert_eq!(clamp_to_operating_window(ts(5, 30), 0, 0), ts(0, 59));
    }

    #[test]
    fn clamp_leaves_in_window_arrivals_untouched() {
        assert_eq!(clamp_to_operating_window(ts(12, 45), 7, 20), ts(12, 45));
        assert_eq!(clamp_to_operating_window(ts(7, 0), 7, 20), ts(7, 0));
        assert_eq!(clamp_to_operating_window(ts(19, 59), 7, 20), ts(19, 59));
    }
}
