/**
 * Dead-reckoning navigation estimator. Fuses the compass heading with a
 * GPS-derived course, advances the estimated position along that heading by
 * the odometer distance each tick, and keeps range and relative bearing to
 * the waypoint up to date. The waypoint is latched from the first valid GPS
 * fix, so the vehicle navigates relative to wherever it woke up.
 */
use crate::state::{Degrees, Meters, MetersPerSecond, StateVars};

pub const EARTH_RADIUS_M: f64 = 6_371_393.0;
/// Local magnetic declination; compass headings are magnetic, nav is true.
pub const MAGNETIC_DECLINATION: Degrees = 8.52;
pub const METERS_PER_SECOND_PER_KNOT: f32 = 0.514444;
/// The free-running timer advances every 4 us.
pub const SECONDS_PER_TIMER_TICK: f32 = 0.000004;
/// Calibrated for this wheel and sensor ring.
pub const TICKS_PER_METER: f32 = 7.6;

pub struct NavigationEstimator {
    position_known: bool,
    current_latitude: f64,
    current_longitude: f64,
    waypoint_latitude: f64,
    waypoint_longitude: f64,
    gps_latitude_most_recent: f64,
    gps_longitude_most_recent: f64,
    gps_heading_most_recent: Degrees,
    gps_speed_most_recent: MetersPerSecond,
    prev_tick_count: u32,
}

impl NavigationEstimator {
    pub fn new() -> NavigationEstimator {
        NavigationEstimator {
            position_known: false,
            current_latitude: 0.0,
            current_longitude: 0.0,
            waypoint_latitude: 0.0,
            waypoint_longitude: 0.0,
            gps_latitude_most_recent: 0.0,
            gps_longitude_most_recent: 0.0,
            gps_heading_most_recent: 0.0,
            gps_speed_most_recent: 0.0,
            prev_tick_count: 0,
        }
    }

    /**
     * Runs one estimation step against the freshly serviced snapshot.
     * Until the first valid fix arrives there is nothing to estimate from
     * and every nav output stays at its reset value.
     */
    pub fn update(&mut self, state: &mut StateVars) {
        if !self.position_known {
            self.latch_first_fix(state);
            if !self.position_known {
                return;
            }
        }
        state.status.nav_position_known = true;

        if state.status.gps_fix_avail {
            // Course over ground from the previous fix to this one, then
            // re-anchor the dead-reckoned position to the fix
            self.gps_heading_most_recent = calc_true_bearing(
                self.gps_latitude_most_recent,
                self.gps_longitude_most_recent,
                state.gps_latitude,
                state.gps_longitude,
            );
            self.gps_latitude_most_recent = state.gps_latitude;
            self.gps_longitude_most_recent = state.gps_longitude;
            self.current_latitude = state.gps_latitude;
            self.current_longitude = state.gps_longitude;
        }

        if state.status.gps_gprmc_rcvd {
            self.gps_speed_most_recent =
                state.gps_ground_speed_kt * METERS_PER_SECOND_PER_KNOT;
        }

        // Counters are monotonic; a mid-read increment can only make the
        // delta conservative, never negative
        let tick_diff = state.odometer_ticks.saturating_sub(self.prev_tick_count);
        self.prev_tick_count = state.odometer_ticks;

        let distance_m = tick_diff as f32 / TICKS_PER_METER;
        let mut speed = calc_speed_mps(tick_diff, state.odometer_timestamp);
        if speed == 0.0 {
            speed = self.gps_speed_most_recent;
        }

        let nav_heading = calc_nav_heading(state.heading_deg, self.gps_heading_most_recent);

        let (latitude, longitude) = calc_position(
            self.current_latitude,
            self.current_longitude,
            distance_m,
            nav_heading,
        );
        self.current_latitude = latitude;
        self.current_longitude = longitude;

        let waypoint_bearing = calc_true_bearing(
            self.current_latitude,
            self.current_longitude,
            self.waypoint_latitude,
            self.waypoint_longitude,
        );

        state.nav_heading_deg = nav_heading;
        state.nav_gps_heading = self.gps_heading_most_recent;
        state.nav_latitude = self.current_latitude;
        state.nav_longitude = self.current_longitude;
        state.nav_waypt_latitude = self.waypoint_latitude;
        state.nav_waypt_longitude = self.waypoint_longitude;
        state.nav_waypt_true_bearing = waypoint_bearing;
        state.nav_rel_bearing_deg = calc_relative_bearing(waypoint_bearing, nav_heading);
        state.nav_distance_to_waypt_m = calc_dist_to_waypoint(
            self.current_latitude,
            self.current_longitude,
            self.waypoint_latitude,
            self.waypoint_longitude,
        );
        state.nav_speed = speed;
    }

    /// The first fix with real coordinates becomes both the starting
    /// position and the waypoint. A fix of exactly (0, 0) is the receiver
    /// warming up, not a place this vehicle drives.
    fn latch_first_fix(&mut self, state: &StateVars) {
        if !state.status.gps_fix_avail
            || state.gps_latitude == 0.0
            || state.gps_longitude == 0.0
        {
            return;
        }
        self.current_latitude = state.gps_latitude;
        self.current_longitude = state.gps_longitude;
        self.waypoint_latitude = state.gps_latitude;
        self.waypoint_longitude = state.gps_longitude;
        self.gps_latitude_most_recent = state.gps_latitude;
        self.gps_longitude_most_recent = state.gps_longitude;
        self.prev_tick_count = state.odometer_ticks;
        self.position_known = true;
    }
}

impl Default for NavigationEstimator {
    fn default() -> NavigationEstimator {
        NavigationEstimator::new()
    }
}

/**
 * Initial great-circle bearing from one point to another, in [0, 360).
 */
pub fn calc_true_bearing(
    latitude_1: f64,
    longitude_1: f64,
    latitude_2: f64,
    longitude_2: f64,
) -> Degrees {
    let phi_1 = latitude_1.to_radians();
    let phi_2 = latitude_2.to_radians();
    let delta_lambda = (longitude_2 - longitude_1).to_radians();

    let y = delta_lambda.sin() * phi_2.cos();
    let x = phi_1.cos() * phi_2.sin() - phi_1.sin() * phi_2.cos() * delta_lambda.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0) as Degrees
}

/**
 * Haversine great-circle distance to the waypoint.
 */
pub fn calc_dist_to_waypoint(
    latitude_1: f64,
    longitude_1: f64,
    latitude_2: f64,
    longitude_2: f64,
) -> Meters {
    let phi_1 = latitude_1.to_radians();
    let phi_2 = latitude_2.to_radians();
    let delta_phi = (latitude_2 - latitude_1).to_radians();
    let delta_lambda = (longitude_2 - longitude_1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi_1.cos() * phi_2.cos() * (delta_lambda / 2.0).sin().powi(2);
    (2.0 * a.sqrt().asin() * EARTH_RADIUS_M) as Meters
}

/**
 * Destination point: from a position, travel the given distance along the
 * given true heading over the spherical Earth.
 */
pub fn calc_position(
    latitude: f64,
    longitude: f64,
    distance: Meters,
    heading: Degrees,
) -> (f64, f64) {
    let phi_1 = latitude.to_radians();
    let lambda_1 = longitude.to_radians();
    let theta = f64::from(heading).to_radians();
    let delta = f64::from(distance) / EARTH_RADIUS_M;

    let phi_2 = (phi_1.sin() * delta.cos() + phi_1.cos() * delta.sin() * theta.cos()).asin();
    let lambda_2 = lambda_1
        + (theta.sin() * delta.sin() * phi_1.cos())
            .atan2(delta.cos() - phi_1.sin() * phi_2.sin());
    (phi_2.to_degrees(), lambda_2.to_degrees())
}

/**
 * Circular mean of two headings, taking the short way around the compass
 * rose so that averaging 10 and 350 gives 0, not 180.
 */
pub fn calc_mid_angle(angle_1: Degrees, angle_2: Degrees) -> Degrees {
    let (mut high, low) = if angle_1 >= angle_2 {
        (angle_1, angle_2)
    } else {
        (angle_2, angle_1)
    };
    if high - low > 180.0 {
        high -= 360.0;
    }
    let mut mid = (high + low) / 2.0;
    if mid < 0.0 {
        mid += 360.0;
    }
    mid
}

/**
 * Signed angle from the current heading to the target bearing, in
 * (-180, 180]. Negative means the target is to the left.
 */
pub fn calc_relative_bearing(target: Degrees, current: Degrees) -> Degrees {
    let mut diff = target - current;
    if diff > 180.0 {
        diff -= 360.0;
    } else if diff <= -180.0 {
        diff += 360.0;
    }
    diff
}

/**
 * Fused navigation heading: the declination-corrected compass heading
 * averaged (circularly) with the GPS-derived course.
 */
pub fn calc_nav_heading(compass_heading: Degrees, gps_heading: Degrees) -> Degrees {
    let mut corrected = compass_heading + MAGNETIC_DECLINATION;
    if corrected >= 360.0 {
        corrected -= 360.0;
    }
    calc_mid_angle(corrected, gps_heading)
}

/**
 * Speed from the tick delta and the last edge's timer capture. Zero ticks
 * or a zeroed timer both mean "no usable measurement this interval".
 */
pub fn calc_speed_mps(ticks: u32, timer_count: u16) -> MetersPerSecond {
    if ticks == 0 {
        return 0.0;
    }
    let distance = ticks as f32 / TICKS_PER_METER;
    let elapsed = f32::from(timer_count) * SECONDS_PER_TIMER_TICK;
    if elapsed > 0.0 {
        distance / elapsed
    } else {
        0.0
    }
}
