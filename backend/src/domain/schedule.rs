//! Stop-sequence scheduling with time windows and hours-of-service breaks.
//!
//! Times are second offsets from the start of the plan. The walk accumulates
//! arrival time per stop: early arrivals wait for the window to open, an
//! arrival past the window end makes the plan infeasible, and when the
//! continuous drive counter would exceed the HoS limit a break is inserted
//! before the next drive and the counter resets.

use crate::domain::geo::{haversine_m, speed_mps};

/// One stop as seen by the scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleStop {
    pub lat: f64,
    pub lng: f64,
    pub service_sec: u32,
    pub window_start_sec: Option<f64>,
    pub window_end_sec: Option<f64>,
}

/// Parameters for one scheduling walk.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleParams {
    pub speed_kph: f64,
    /// Continuous drive limit in seconds; zero disables break insertion.
    pub hos_max_drive_sec: u32,
    /// Planned break duration inserted when the limit would be exceeded.
    pub break_sec: u32,
    /// Optional depot origin. Without one the walk starts at the first stop.
    pub start: Option<(f64, f64)>,
}

/// Accumulated totals of a scheduling walk.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScheduleTotals {
    pub drive_sec: f64,
    pub dist_m: f64,
    pub lateness_sec: f64,
}

/// Walk the stop sequence accumulating arrival times.
///
/// Returns the totals and whether every stop was reachable within its
/// window. On the first window violation the walk stops and reports the
/// partial totals including the violating lateness.
pub fn schedule_plan(stops: &[ScheduleStop], params: &ScheduleParams) -> (ScheduleTotals, bool) {
    let speed = speed_mps(params.speed_kph);
    let (mut cur_lat, mut cur_lng) = match params.start {
        Some(origin) => origin,
        None => match stops.first() {
            Some(first) => (first.lat, first.lng),
            None => return (ScheduleTotals::default(), true),
        },
    };

    let mut t = 0.0;
    let mut dist_total = 0.0;
    let lateness_total = 0.0;
    let mut drive_since_break = 0.0;

    for stop in stops {
        let dist = haversine_m(cur_lat, cur_lng, stop.lat, stop.lng);
        let drive = dist / speed;
        if params.hos_max_drive_sec > 0
            && (drive_since_break + drive) as u64 > u64::from(params.hos_max_drive_sec)
        {
            t += f64::from(params.break_sec);
            drive_since_break = 0.0;
        }
        t += drive;
        drive_since_break += drive;
        let mut arrival = t;
        if let Some(start) = stop.window_start_sec {
            if arrival < start {
                arrival = start;
                t = arrival;
            }
        }
        if let Some(end) = stop.window_end_sec {
            if arrival > end {
                let totals = ScheduleTotals {
                    drive_sec: t,
                    dist_m: dist_total + dist,
                    lateness_sec: lateness_total + (arrival - end),
                };
                return (totals, false);
            }
        }
        t += f64::from(stop.service_sec);
        dist_total += dist;
        cur_lat = stop.lat;
        cur_lng = stop.lng;
    }

    let totals = ScheduleTotals {
        drive_sec: t,
        dist_m: dist_total,
        lateness_sec: lateness_total,
    };
    (totals, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn params() -> ScheduleParams {
        ScheduleParams {
            speed_kph: 50.0,
            hos_max_drive_sec: 0,
            break_sec: 0,
            start: None,
        }
    }

    fn stop_at(lat: f64, lng: f64) -> ScheduleStop {
        ScheduleStop {
            lat,
            lng,
            ..ScheduleStop::default()
        }
    }

    #[rstest]
    fn empty_sequence_is_trivially_feasible(params: ScheduleParams) {
        let (totals, feasible) = schedule_plan(&[], &params);
        assert!(feasible);
        assert_eq!(totals, ScheduleTotals::default());
    }

    #[rstest]
    fn waits_for_window_start(params: ScheduleParams) {
        let mut second = stop_at(0.0, 0.01);
        second.window_start_sec = Some(10_000.0);
        let stops = [stop_at(0.0, 0.0), second];
        let (totals, feasible) = schedule_plan(&stops, &params);
        assert!(feasible);
        // Arrival is clamped up to the window start before service begins.
        assert!(totals.drive_sec >= 10_000.0);
    }

    #[rstest]
    fn rejects_arrival_past_window_end(params: ScheduleParams) {
        let mut second = stop_at(0.0, 1.0);
        second.window_end_sec = Some(10.0);
        let stops = [stop_at(0.0, 0.0), second];
        let (totals, feasible) = schedule_plan(&stops, &params);
        assert!(!feasible);
        assert!(totals.lateness_sec > 0.0);
    }

    #[rstest]
    fn inserts_break_when_drive_limit_exceeded(mut params: ScheduleParams) {
        params.hos_max_drive_sec = 100;
        params.break_sec = 1800;
        // Two hops of ~0.1 degrees of longitude at the equator, each far
        // beyond 100 s of continuous drive.
        let stops = [stop_at(0.0, 0.0), stop_at(0.0, 0.1), stop_at(0.0, 0.2)];
        let (with_breaks, feasible) = schedule_plan(&stops, &params);
        assert!(feasible);
        params.hos_max_drive_sec = 0;
        let (without_breaks, _) = schedule_plan(&stops, &params);
        let delta = with_breaks.drive_sec - without_breaks.drive_sec;
        // Both hops trip the limit, so two breaks are inserted.
        assert!((delta - 3600.0).abs() < 1.0, "got {delta}");
    }
}
