/**
 * The shared state snapshot that every component reads and writes, one
 * writer per field group: the GPS receiver owns the gps_* fields, the
 * compass owns heading/pitch/roll, the odometer owns the odometer_*
 * fields, the estimator owns nav_*, and the controller owns control_*.
 * Readers tolerate one tick of staleness by design.
 */
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

pub type Degrees = f32;
pub type Meters = f32;
pub type MetersPerSecond = f32;
pub type Knots = f32;

/// Status flags, producer-set and wiped at the top of each supervisory tick
/// so that no bit is ever observed as "new" twice.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Status {
    pub gps_no_buff_avail: bool,
    pub gps_buff_overflow: bool,
    pub gps_unexpected_start: bool,
    pub gps_gpgga_rcvd: bool,
    pub gps_gpgsa_rcvd: bool,
    pub gps_gprmc_rcvd: bool,
    pub gps_gpvtg_rcvd: bool,
    pub gps_no_fix_avail: bool,
    pub gps_unexpected_value: bool,
    pub gps_data_not_valid: bool,
    pub gps_fix_avail: bool,
    pub compass_error: bool,
    pub nav_position_known: bool,
}

impl Status {
    pub fn clear(&mut self) {
        *self = Status::default();
    }
}

#[derive(Clone, Debug, Default)]
pub struct StateVars {
    pub status: Status,
    pub main_loop_counter: u32,

    // Raw sentence retention for postmortem debugging; written whether or
    // not the checksum held up
    pub gps_sentence_gga: String,
    pub gps_sentence_gsa: String,
    pub gps_sentence_rmc: String,
    pub gps_sentence_vtg: String,

    pub gps_latitude: f64,
    pub gps_longitude: f64,
    pub gps_lat_deg: i16,
    pub gps_lat_ddeg: f64,
    pub gps_long_deg: i16,
    pub gps_long_ddeg: f64,
    pub gps_hdop: f32,
    pub gps_pdop: f32,
    pub gps_vdop: f32,
    pub gps_msl_altitude_m: f32,
    pub gps_true_hdg_deg: Degrees,
    pub gps_ground_course_deg: Degrees,
    pub gps_speed_kmph: f32,
    pub gps_ground_speed_kt: Knots,
    pub gps_speed_kt: Knots,
    pub gps_hours: u8,
    pub gps_minutes: u8,
    pub gps_seconds: f32,
    pub gps_date: String,
    pub gps_satcount: u8,

    pub heading_raw: u16,
    pub heading_deg: Degrees,
    pub pitch_deg: i8,
    pub roll_deg: i8,

    pub odometer_ticks: u32,
    pub odometer_timestamp: u16,
    pub odometer_ticks_are_fwd: bool,

    pub nav_heading_deg: Degrees,
    pub nav_gps_heading: Degrees,
    pub nav_latitude: f64,
    pub nav_longitude: f64,
    pub nav_waypt_latitude: f64,
    pub nav_waypt_longitude: f64,
    pub nav_waypt_true_bearing: Degrees,
    pub nav_rel_bearing_deg: Degrees,
    pub nav_distance_to_waypt_m: Meters,
    pub nav_speed: MetersPerSecond,

    pub control_heading_desired: Degrees,
    pub control_xtrack_error: f32,
    pub control_xtrack_error_rate: f32,
    pub control_xtrack_error_sum: f32,
    pub control_steering_pwm: u16,
}

impl StateVars {
    pub fn new() -> StateVars {
        StateVars::default()
    }

    /**
     * Recombines the parsed GPRMC date and GPGGA time fields into a UTC
     * timestamp for telemetry display. Returns None until both have been
     * received.
     */
    pub fn gps_datetime(&self) -> Option<NaiveDateTime> {
        let date = NaiveDate::parse_from_str(&self.gps_date, "%d%m%y").ok()?;
        let millis = ((self.gps_seconds - self.gps_seconds.floor()) * 1000.0) as u32;
        let time = NaiveTime::from_hms_milli_opt(
            u32::from(self.gps_hours),
            u32::from(self.gps_minutes),
            self.gps_seconds as u32,
            millis,
        )?;
        Some(NaiveDateTime::new(date, time))
    }
}

#[cfg(test)]
mod tests {
    use super::{StateVars, Status};

    #[test]
    fn test_status_clear() {
        let mut status = Status::default();
        status.gps_fix_avail = true;
        status.gps_buff_overflow = true;
        status.clear();
        assert!(status == Status::default());
    }

    #[test]
    fn test_gps_datetime() {
        let mut state = StateVars::new();
        assert!(state.gps_datetime().is_none());

        state.gps_date = "060916".to_string();
        state.gps_hours = 3;
        state.gps_minutes = 34;
        state.gps_seconds = 3.5;
        let timestamp = state.gps_datetime().unwrap();
        assert_eq!(
            timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            "2016-09-06 03:34:03.500"
        );
    }

    #[test]
    fn test_gps_datetime_bad_date() {
        let mut state = StateVars::new();
        state.gps_date = "66X916".to_string();
        assert!(state.gps_datetime().is_none());
    }
}
