/**
 * Reads NMEA sentences from the GPS.
 *
 * Bytes arrive asynchronously through on_byte_received(), which files them
 * into one of several rotating sentence buffers in O(1) time. Once per
 * supervisory tick, service() parses every complete sentence (GPGGA, GPGSA,
 * GPRMC, and GPVTG) and stores the values of interest in the state
 * snapshot. Anything that goes wrong is reported as a status flag; nothing
 * here ever halts the loop.
 */
use log::debug;
use thiserror::Error;

use crate::state::StateVars;

pub const GPS_SENTENCE_BUFF_SZ: usize = 128;
pub const NUM_GPS_SENTENCE_BUFFS: usize = 4;
pub const GPS_SENTENCE_START: u8 = b'$';
pub const GPS_SENTENCE_END: u8 = b'\n';

const GPGGA_START: &str = "$GPGGA";
const GPGSA_START: &str = "$GPGSA";
const GPRMC_START: &str = "$GPRMC";
const GPVTG_START: &str = "$GPVTG";
const GPS_NO_FIX: char = '0';

#[derive(Debug, Error, PartialEq)]
enum SentenceError {
    #[error("sentence ended before all expected fields were read")]
    TooShort,
    #[error("field held an unexpected value")]
    UnexpectedValue,
    #[error("receiver reports no fix")]
    NoFix,
    #[error("receiver reports data not valid")]
    DataNotValid,
}

macro_rules! bail_none {
    ($option:expr) => {
        match $option {
            Some(s) => s,
            None => return Err(SentenceError::TooShort),
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum BufferState {
    Free,
    Filling,
    Ready,
}

struct SentenceBuffer {
    state: BufferState,
    len: usize,
    bytes: [u8; GPS_SENTENCE_BUFF_SZ],
}

impl SentenceBuffer {
    fn new() -> SentenceBuffer {
        SentenceBuffer {
            state: BufferState::Free,
            len: 0,
            bytes: [0; GPS_SENTENCE_BUFF_SZ],
        }
    }

    fn clear(&mut self) {
        self.state = BufferState::Free;
        self.len = 0;
    }
}

pub struct GpsReceiver {
    buffers: [SentenceBuffer; NUM_GPS_SENTENCE_BUFFS],
    fill_index: Option<usize>,
    no_buff_avail: bool,
    buff_overflow: bool,
    unexpected_start: bool,
}

impl GpsReceiver {
    pub fn new() -> GpsReceiver {
        GpsReceiver {
            buffers: [
                SentenceBuffer::new(),
                SentenceBuffer::new(),
                SentenceBuffer::new(),
                SentenceBuffer::new(),
            ],
            fill_index: None,
            no_buff_avail: false,
            buff_overflow: false,
            unexpected_start: false,
        }
    }

    /**
     * Files one serial byte into the buffer currently being filled.
     * Interrupt context: O(1), no allocation, no logging.
     */
    pub fn on_byte_received(&mut self, byte: u8) {
        match self.fill_index {
            None => {
                // Capture only begins on a start marker; stray bytes between
                // sentences are dropped
                if byte != GPS_SENTENCE_START {
                    return;
                }
                let free = self
                    .buffers
                    .iter()
                    .position(|buffer| buffer.state == BufferState::Free);
                match free {
                    Some(index) => self.begin_fill(index),
                    None => {
                        self.no_buff_avail = true;
                        return;
                    }
                }
            }
            Some(index) if byte == GPS_SENTENCE_START => {
                // A start marker mid-fill means the previous sentence was cut
                // short. Discard the partial capture and restart in buffer 0.
                self.unexpected_start = true;
                self.buffers[index].clear();
                self.begin_fill(0);
            }
            Some(_) => (),
        }

        let index = match self.fill_index {
            Some(index) => index,
            None => return,
        };
        let buffer = &mut self.buffers[index];

        if byte != GPS_SENTENCE_END {
            buffer.bytes[buffer.len] = byte;
            buffer.len += 1;

            // Leave room for the terminator; any sentence this long is garbage
            if buffer.len >= GPS_SENTENCE_BUFF_SZ - 2 {
                buffer.clear();
                self.fill_index = None;
                self.buff_overflow = true;
            }
            return;
        }

        // Terminator: append it and hand the buffer to service()
        buffer.bytes[buffer.len] = byte;
        buffer.len += 1;
        buffer.state = BufferState::Ready;
        self.fill_index = None;
    }

    fn begin_fill(&mut self, index: usize) {
        self.buffers[index].state = BufferState::Filling;
        self.buffers[index].len = 0;
        self.fill_index = Some(index);
    }

    /**
     * Drains every ready sentence buffer: validates, parses, publishes, and
     * returns each buffer to the free pool. Called once per supervisory tick.
     */
    pub fn service(&mut self, state: &mut StateVars) {
        reset_gps_statevars(state);

        if self.no_buff_avail {
            state.status.gps_no_buff_avail = true;
            self.no_buff_avail = false;
        }
        if self.buff_overflow {
            state.status.gps_buff_overflow = true;
            self.buff_overflow = false;
        }
        if self.unexpected_start {
            state.status.gps_unexpected_start = true;
            self.unexpected_start = false;
        }

        for index in 0..NUM_GPS_SENTENCE_BUFFS {
            if self.buffers[index].state != BufferState::Ready {
                continue;
            }
            let len = self.buffers[index].len;
            let sentence =
                String::from_utf8_lossy(&self.buffers[index].bytes[..len]).into_owned();
            parse_gps_sentence(&sentence, state);
            self.buffers[index].clear();
        }
    }
}

impl Default for GpsReceiver {
    fn default() -> GpsReceiver {
        GpsReceiver::new()
    }
}

/// Wiped at the top of every GPS service pass; the retained raw sentences
/// deliberately survive.
fn reset_gps_statevars(state: &mut StateVars) {
    state.gps_latitude = 0.0;
    state.gps_longitude = 0.0;
    state.gps_lat_deg = 0;
    state.gps_lat_ddeg = 0.0;
    state.gps_long_deg = 0;
    state.gps_long_ddeg = 0.0;
    state.gps_hdop = 0.0;
    state.gps_pdop = 0.0;
    state.gps_vdop = 0.0;
    state.gps_msl_altitude_m = 0.0;
    state.gps_true_hdg_deg = 0.0;
    state.gps_ground_course_deg = 0.0;
    state.gps_speed_kmph = 0.0;
    state.gps_ground_speed_kt = 0.0;
    state.gps_speed_kt = 0.0;
    state.gps_hours = 0;
    state.gps_minutes = 0;
    state.gps_seconds = 0.0;
    state.gps_date.clear();
    state.gps_satcount = 0;
}

fn parse_gps_sentence(sentence: &str, state: &mut StateVars) {
    if sentence.starts_with(GPGGA_START) {
        // The raw sentence is retained whether or not the checksum holds up
        state.gps_sentence_gga = sentence.to_string();
        if validate_checksum(sentence) {
            if let Err(e) = parse_gpgga(sentence, state) {
                flag_error(&e, state);
                debug!("GPGGA parse stopped early: {}", e);
            }
            state.status.gps_gpgga_rcvd = true;
        }
    } else if sentence.starts_with(GPGSA_START) {
        state.gps_sentence_gsa = sentence.to_string();
        if validate_checksum(sentence) {
            if let Err(e) = parse_gpgsa(sentence, state) {
                flag_error(&e, state);
                debug!("GPGSA parse stopped early: {}", e);
            }
            state.status.gps_gpgsa_rcvd = true;
        }
    } else if sentence.starts_with(GPRMC_START) {
        state.gps_sentence_rmc = sentence.to_string();
        if validate_checksum(sentence) {
            if let Err(e) = parse_gprmc(sentence, state) {
                flag_error(&e, state);
                debug!("GPRMC parse stopped early: {}", e);
            }
            state.status.gps_gprmc_rcvd = true;
        }
    } else if sentence.starts_with(GPVTG_START) {
        state.gps_sentence_vtg = sentence.to_string();
        if validate_checksum(sentence) {
            if let Err(e) = parse_gpvtg(sentence, state) {
                flag_error(&e, state);
                debug!("GPVTG parse stopped early: {}", e);
            }
            state.status.gps_gpvtg_rcvd = true;
        }
    }
    // Everything else, notably GPGSV, is intentionally ignored
}

fn flag_error(error: &SentenceError, state: &mut StateVars) {
    match error {
        SentenceError::NoFix => state.status.gps_no_fix_avail = true,
        SentenceError::DataNotValid => state.status.gps_data_not_valid = true,
        SentenceError::TooShort | SentenceError::UnexpectedValue => {
            state.status.gps_unexpected_value = true
        }
    }
}

/// The leading run of characters that could belong to a number. Fields at
/// the tail of a sentence drag the "*hh" checksum along with them, and the
/// parsers treat non-numeric text as zero rather than as a distinct error.
fn numeric_prefix(field: &str) -> &str {
    let end = field
        .find(|c: char| !c.is_ascii_digit() && c != '.' && c != '-' && c != '+')
        .unwrap_or(field.len());
    &field[..end]
}

fn parse_f32(field: &str) -> f32 {
    numeric_prefix(field).parse().unwrap_or(0.0)
}

fn parse_f64(field: &str) -> f64 {
    numeric_prefix(field).parse().unwrap_or(0.0)
}

fn parse_u8(field: &str) -> u8 {
    numeric_prefix(field).parse().unwrap_or(0)
}

fn parse_i16(field: &str) -> i16 {
    numeric_prefix(field).parse().unwrap_or(0)
}

/**
 * $GPGGA,hhmmss.sss,ddmm.mmmm,a,dddmm.mmmm,a,x,xx,x.x,x.x,M,,,,xxxx*hh
 * UTC time, position, fix quality, satellite count, HDOP, MSL altitude.
 */
fn parse_gpgga(sentence: &str, state: &mut StateVars) -> Result<(), SentenceError> {
    let mut fields = sentence.split(',').filter(|f| !f.is_empty());
    fields.next(); // $GPGGA header

    // UTC time - hhmmss.sss
    let time = bail_none!(fields.next());
    state.gps_hours = parse_u8(time.get(0..2).unwrap_or(""));
    state.gps_minutes = parse_u8(time.get(2..4).unwrap_or(""));
    state.gps_seconds = parse_f32(time.get(4..).unwrap_or(""));

    // Latitude - ddmm.mmmm
    let latitude_field = bail_none!(fields.next());
    let mut lat_degrees = parse_i16(latitude_field.get(0..2).unwrap_or(""));
    let lat_minutes = parse_f64(latitude_field.get(2..).unwrap_or(""));

    let lat_is_south = match bail_none!(fields.next()) {
        "N" => false,
        "S" => true,
        _ => return Err(SentenceError::UnexpectedValue),
    };

    // Longitude - dddmm.mmmm
    let longitude_field = bail_none!(fields.next());
    let mut long_degrees = parse_i16(longitude_field.get(0..3).unwrap_or(""));
    let long_minutes = parse_f64(longitude_field.get(3..).unwrap_or(""));

    let long_is_west = match bail_none!(fields.next()) {
        "E" => false,
        "W" => true,
        _ => return Err(SentenceError::UnexpectedValue),
    };

    // The degree/fraction split must always sum to the combined value, so
    // southern and western coordinates negate both halves
    let mut lat_ddeg = lat_minutes / 60.0;
    let mut latitude = f64::from(lat_degrees) + lat_ddeg;
    if lat_is_south {
        latitude = -latitude;
        lat_degrees = -lat_degrees;
        lat_ddeg = -lat_ddeg;
    }

    let mut long_ddeg = long_minutes / 60.0;
    let mut longitude = f64::from(long_degrees) + long_ddeg;
    if long_is_west {
        longitude = -longitude;
        long_degrees = -long_degrees;
        long_ddeg = -long_ddeg;
    }

    state.gps_latitude = latitude;
    state.gps_longitude = longitude;
    state.gps_lat_deg = lat_degrees;
    state.gps_lat_ddeg = lat_ddeg;
    state.gps_long_deg = long_degrees;
    state.gps_long_ddeg = long_ddeg;

    // Position fix indicator; no fix is a hard stop
    let fix = bail_none!(fields.next());
    if fix.starts_with(GPS_NO_FIX) {
        return Err(SentenceError::NoFix);
    }
    state.status.gps_fix_avail = true;

    state.gps_satcount = parse_u8(bail_none!(fields.next()));
    state.gps_hdop = parse_f32(bail_none!(fields.next()));
    state.gps_msl_altitude_m = parse_f32(bail_none!(fields.next()));

    Ok(())
}

/**
 * $GPGSA: PDOP and VDOP. HDOP is skipped since GPGGA already provides it.
 */
fn parse_gpgsa(sentence: &str, state: &mut StateVars) -> Result<(), SentenceError> {
    let mut fields = sentence.split(',').filter(|f| !f.is_empty());
    fields.next(); // $GPGSA header
    bail_none!(fields.next()); // Mode 1
    bail_none!(fields.next()); // Mode 2

    // Up to 12 satellite ID fields follow, but empty ones are elided by the
    // tokenizer, so the first field containing a decimal point is actually
    // the PDOP field
    let mut pdop = None;
    for _ in 0..12 {
        let field = bail_none!(fields.next());
        if field.contains('.') {
            pdop = Some(field);
            break;
        }
    }
    let pdop = match pdop {
        // All 12 satellite slots were in use; PDOP is the next field
        None => bail_none!(fields.next()),
        Some(field) => field,
    };
    state.gps_pdop = parse_f32(pdop);

    bail_none!(fields.next()); // HDOP

    state.gps_vdop = parse_f32(bail_none!(fields.next()));

    Ok(())
}

/**
 * $GPRMC: ground speed in knots, true course, and the ddmmyy date. The
 * position fields duplicate GPGGA and are skipped.
 */
fn parse_gprmc(sentence: &str, state: &mut StateVars) -> Result<(), SentenceError> {
    let mut fields = sentence.split(',').filter(|f| !f.is_empty());
    fields.next(); // $GPRMC header
    bail_none!(fields.next()); // UTC time

    // 'A' means data valid, 'V' means not valid
    if !bail_none!(fields.next()).starts_with('A') {
        return Err(SentenceError::DataNotValid);
    }

    bail_none!(fields.next()); // Latitude
    bail_none!(fields.next()); // Latitude hemisphere
    bail_none!(fields.next()); // Longitude
    bail_none!(fields.next()); // Longitude hemisphere

    state.gps_ground_speed_kt = parse_f32(bail_none!(fields.next()));
    state.gps_ground_course_deg = parse_f32(bail_none!(fields.next()));

    // Date - ddmmyy, stored verbatim (minus any trailing checksum)
    let date = bail_none!(fields.next());
    state.gps_date = date.split('*').next().unwrap_or(date).to_string();

    Ok(())
}

/**
 * $GPVTG: true course and speed in knots and km/h. Each value is committed
 * only if the reference letter that follows it checks out; a mismatch
 * abandons the rest of the sentence but keeps what was already committed.
 */
fn parse_gpvtg(sentence: &str, state: &mut StateVars) -> Result<(), SentenceError> {
    let mut fields = sentence.split(',').filter(|f| !f.is_empty());
    fields.next(); // $GPVTG header

    let true_hdg_deg = parse_f32(bail_none!(fields.next()));
    if !bail_none!(fields.next()).starts_with('T') {
        return Err(SentenceError::UnexpectedValue);
    }
    state.gps_true_hdg_deg = true_hdg_deg;

    // The magnetic course is not configured on this receiver, so only its
    // lone 'M' reference letter remains after empty-field elision
    bail_none!(fields.next());

    let speed_knots = parse_f32(bail_none!(fields.next()));
    if !bail_none!(fields.next()).starts_with('N') {
        return Err(SentenceError::UnexpectedValue);
    }
    state.gps_speed_kt = speed_knots;

    let speed_kmph = parse_f32(bail_none!(fields.next()));
    if !bail_none!(fields.next()).starts_with('K') {
        return Err(SentenceError::UnexpectedValue);
    }
    state.gps_speed_kmph = speed_kmph;

    Ok(())
}

fn hexchar_to_dec(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/**
 * Validates an NMEA checksum: the XOR of every byte between '$' and '*'
 * must match the two uppercase hex digits after the '*'.
 */
fn validate_checksum(sentence: &str) -> bool {
    let bytes = sentence.as_bytes();
    let mut checksum = 0u8;
    let mut cursor = 1;
    while cursor < bytes.len() && bytes[cursor] != b'*' {
        checksum ^= bytes[cursor];
        cursor += 1;
    }

    // cursor sits on the '*'; two hex digits must follow
    if cursor + 2 >= bytes.len() {
        return false;
    }
    match (
        hexchar_to_dec(bytes[cursor + 1]),
        hexchar_to_dec(bytes[cursor + 2]),
    ) {
        (Some(upper), Some(lower)) => checksum == (upper << 4) | lower,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_checksum, GpsReceiver, NUM_GPS_SENTENCE_BUFFS};
    use crate::state::StateVars;

    /// Appends a correct "*hh\r\n" tail to a sentence body.
    fn with_checksum(body: &str) -> String {
        let checksum = body.bytes().skip(1).fold(0u8, |acc, b| acc ^ b);
        format!("{}*{:02X}\r\n", body, checksum)
    }

    fn feed(gps: &mut GpsReceiver, sentence: &str) {
        for byte in sentence.bytes() {
            gps.on_byte_received(byte);
        }
    }

    fn service_one(sentence: &str) -> StateVars {
        let mut gps = GpsReceiver::new();
        let mut state = StateVars::new();
        feed(&mut gps, sentence);
        gps.service(&mut state);
        state
    }

    #[test]
    fn test_validate_checksum() {
        let good = with_checksum("$GPGGA,033403.456,3002.5440,N,09734.0000,W,1,11,0.8,108.2,M,,,,0000");
        assert!(validate_checksum(&good));
        assert!(!validate_checksum("$GPGGA,033403.456*ZZ\r\n"));
        assert!(!validate_checksum("$GPGGA,no,star,here\r\n"));
    }

    #[test]
    fn test_parse_gga() {
        let state = service_one(&with_checksum(
            "$GPGGA,033403.456,3002.5440,N,09734.0000,W,1,11,0.8,108.2,M,,,,0000",
        ));

        assert!(state.status.gps_gpgga_rcvd);
        assert!(state.status.gps_fix_avail);
        assert!(!state.status.gps_no_fix_avail);

        // 30 degrees + 2.5440 minutes
        let expected_lat = 30.0 + 2.5440 / 60.0;
        let expected_long = -(97.0 + 34.0 / 60.0);
        assert!((state.gps_latitude - expected_lat).abs() < 1e-9);
        assert!((state.gps_longitude - expected_long).abs() < 1e-9);

        // The split halves must recombine to the signed decimal degrees
        let recombined_lat = f64::from(state.gps_lat_deg) + state.gps_lat_ddeg;
        let recombined_long = f64::from(state.gps_long_deg) + state.gps_long_ddeg;
        assert!((recombined_lat - state.gps_latitude).abs() < 1e-6);
        assert!((recombined_long - state.gps_longitude).abs() < 1e-6);
        assert_eq!(state.gps_long_deg, -97);

        assert_eq!(state.gps_hours, 3);
        assert_eq!(state.gps_minutes, 34);
        assert!((state.gps_seconds - 3.456).abs() < 1e-4);
        assert_eq!(state.gps_satcount, 11);
        assert!((state.gps_hdop - 0.8).abs() < 1e-6);
        assert!((state.gps_msl_altitude_m - 108.2).abs() < 1e-4);
    }

    #[test]
    fn test_parse_gga_southern_hemisphere() {
        let state = service_one(&with_checksum(
            "$GPGGA,033403.456,3002.5440,S,09734.0000,E,1,11,0.8,108.2,M,,,,0000",
        ));
        let expected = -(30.0 + 2.5440 / 60.0);
        assert!((state.gps_latitude - expected).abs() < 1e-9);
        assert!(state.gps_longitude > 0.0);
        let recombined = f64::from(state.gps_lat_deg) + state.gps_lat_ddeg;
        assert!((recombined - state.gps_latitude).abs() < 1e-6);
    }

    #[test]
    fn test_parse_gga_no_fix() {
        let state = service_one(&with_checksum(
            "$GPGGA,033403.456,3002.5440,N,09734.0000,W,0,03,6.8,108.2,M,,,,0000",
        ));
        assert!(state.status.gps_no_fix_avail);
        assert!(!state.status.gps_fix_avail);
        // The satellite count is never reached after the hard stop
        assert_eq!(state.gps_satcount, 0);
    }

    #[test]
    fn test_corrupted_checksum_keeps_raw_copy_only() {
        let body = "$GPGGA,033403.456,3002.5440,N,09734.0000,W,1,11,0.8,108.2,M,,,,0000";
        let checksum = body.bytes().skip(1).fold(0u8, |acc, b| acc ^ b);
        let corrupted = format!("{}*{:02X}\r\n", body, checksum ^ 0xFF);

        let state = service_one(&corrupted);
        assert_eq!(state.gps_sentence_gga, corrupted);
        assert!(!state.status.gps_gpgga_rcvd);
        assert!(!state.status.gps_fix_avail);
        assert!(state.gps_latitude == 0.0);
        assert_eq!(state.gps_satcount, 0);
    }

    #[test]
    fn test_parse_gsa_with_unused_satellite_slots() {
        let state = service_one(&with_checksum("$GPGSA,A,3,07,08,11,,,,,,,,,,1.8,1.0,1.6"));
        assert!(state.status.gps_gpgsa_rcvd);
        assert!((state.gps_pdop - 1.8).abs() < 1e-6);
        assert!((state.gps_vdop - 1.6).abs() < 1e-6);
    }

    #[test]
    fn test_parse_gsa_with_all_satellite_slots_used() {
        let state = service_one(&with_checksum(
            "$GPGSA,A,3,01,02,03,04,05,06,07,08,09,10,11,12,1.8,1.0,1.6",
        ));
        assert!((state.gps_pdop - 1.8).abs() < 1e-6);
        assert!((state.gps_vdop - 1.6).abs() < 1e-6);
    }

    #[test]
    fn test_parse_rmc() {
        let state = service_one(&with_checksum(
            "$GPRMC,033403.456,A,3002.5440,N,09734.0000,W,004.1,354.2,060916,,,A",
        ));
        assert!(state.status.gps_gprmc_rcvd);
        assert!(!state.status.gps_data_not_valid);
        assert!((state.gps_ground_speed_kt - 4.1).abs() < 1e-6);
        assert!((state.gps_ground_course_deg - 354.2).abs() < 1e-4);
        assert_eq!(state.gps_date, "060916");
    }

    #[test]
    fn test_parse_rmc_not_valid() {
        let state = service_one(&with_checksum(
            "$GPRMC,033403.456,V,,,,,,,060916,,,N",
        ));
        assert!(state.status.gps_data_not_valid);
        assert!(state.gps_ground_speed_kt == 0.0);
        assert_eq!(state.gps_date, "");
    }

    #[test]
    fn test_parse_vtg() {
        // 36 km/h is 10 m/s, handy for eyeballing
        let state = service_one(&with_checksum("$GPVTG,123.4,T,,M,019.4,N,0036.0,K,A"));
        assert!(state.status.gps_gpvtg_rcvd);
        assert!((state.gps_true_hdg_deg - 123.4).abs() < 1e-4);
        assert!((state.gps_speed_kt - 19.4).abs() < 1e-4);
        assert!((state.gps_speed_kmph - 36.0).abs() < 1e-4);
    }

    #[test]
    fn test_parse_vtg_reference_mismatch_keeps_prior_fields() {
        let state = service_one(&with_checksum("$GPVTG,123.4,T,,M,019.4,X,0036.0,K,A"));
        assert!(state.status.gps_unexpected_value);
        // The course cleared its reference check before the speed failed its own
        assert!((state.gps_true_hdg_deg - 123.4).abs() < 1e-4);
        assert!(state.gps_speed_kt == 0.0);
        assert!(state.gps_speed_kmph == 0.0);
    }

    #[test]
    fn test_gsv_ignored() {
        let state = service_one(&with_checksum(
            "$GPGSV,3,1,11,07,79,048,42,02,51,062,43,26,36,256,42,27,27,138,42",
        ));
        assert!(!state.status.gps_gpgga_rcvd);
        assert!(!state.status.gps_gpgsa_rcvd);
        assert!(!state.status.gps_gprmc_rcvd);
        assert!(!state.status.gps_gpvtg_rcvd);
        assert!(state.gps_sentence_gga.is_empty());
    }

    #[test]
    fn test_buffer_exhaustion_flags_and_preserves_content() {
        let mut gps = GpsReceiver::new();
        let mut state = StateVars::new();

        let gga = with_checksum("$GPGGA,033403.456,3002.5440,N,09734.0000,W,1,11,0.8,108.2,M,,,,0000");
        let gsa = with_checksum("$GPGSA,A,3,07,08,11,,,,,,,,,,1.8,1.0,1.6");
        let rmc = with_checksum("$GPRMC,033403.456,A,3002.5440,N,09734.0000,W,004.1,354.2,060916,,,A");
        let vtg = with_checksum("$GPVTG,123.4,T,,M,019.4,N,0036.0,K,A");
        for sentence in [&gga, &gsa, &rmc, &vtg] {
            feed(&mut gps, sentence);
        }
        assert_eq!(NUM_GPS_SENTENCE_BUFFS, 4);

        // All four buffers hold unserviced sentences; a fifth has nowhere to go
        feed(&mut gps, "$GP");

        gps.service(&mut state);
        assert!(state.status.gps_no_buff_avail);
        // Nothing in flight was corrupted
        assert!(state.status.gps_gpgga_rcvd);
        assert!(state.status.gps_gpgsa_rcvd);
        assert!(state.status.gps_gprmc_rcvd);
        assert!(state.status.gps_gpvtg_rcvd);
        assert!((state.gps_pdop - 1.8).abs() < 1e-6);
        assert_eq!(state.gps_date, "060916");
    }

    #[test]
    fn test_unexpected_start_restarts_capture() {
        let mut gps = GpsReceiver::new();
        let mut state = StateVars::new();

        // A sentence that never finishes, then a complete one
        feed(&mut gps, "$GPGGA,0334");
        let vtg = with_checksum("$GPVTG,123.4,T,,M,019.4,N,0036.0,K,A");
        feed(&mut gps, &vtg);

        gps.service(&mut state);
        assert!(state.status.gps_unexpected_start);
        assert!(state.status.gps_gpvtg_rcvd);
        assert!((state.gps_true_hdg_deg - 123.4).abs() < 1e-4);
        // Only the restarted sentence came out; the partial one is gone
        assert!(state.gps_sentence_gga.is_empty());
    }

    #[test]
    fn test_buffer_overflow_abandons_fill() {
        let mut gps = GpsReceiver::new();
        let mut state = StateVars::new();

        gps.on_byte_received(b'$');
        for _ in 0..200 {
            gps.on_byte_received(b'A');
        }
        gps.on_byte_received(b'\n');

        gps.service(&mut state);
        assert!(state.status.gps_buff_overflow);
        assert!(!state.status.gps_gpgga_rcvd);

        // The receiver recovers and captures the next sentence normally
        let vtg = with_checksum("$GPVTG,123.4,T,,M,019.4,N,0036.0,K,A");
        feed(&mut gps, &vtg);
        state.status.clear();
        gps.service(&mut state);
        assert!(state.status.gps_gpvtg_rcvd);
    }

    #[test]
    fn test_stray_bytes_between_sentences_are_dropped() {
        let mut gps = GpsReceiver::new();
        let mut state = StateVars::new();

        feed(&mut gps, "garbage\r\n");
        let vtg = with_checksum("$GPVTG,123.4,T,,M,019.4,N,0036.0,K,A");
        feed(&mut gps, &vtg);

        gps.service(&mut state);
        assert!(state.status.gps_gpvtg_rcvd);
        assert!(!state.status.gps_unexpected_start);
    }
}
