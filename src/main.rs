/**
 * Bootstrap and supervisory loop. Wires the GPS receiver, compass,
 * odometer, estimator, controller and driver together and runs them on a
 * fixed 25 ms cadence. Without the real serial and TWI hardware attached,
 * NMEA sentences are replayed from a file or stdin and the compass talks to
 * a simulated bus, which makes the whole pipeline exercisable on a desk.
 */
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::rc::Rc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use getopts::Options;
use log::{debug, error, info, warn};
use num::clamp;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use rover_control::compass::{CompassReader, TwiBus};
use rover_control::control::{
    SteeringController, SteeringReference, SECONDS_PER_LOOP, TARGET_HEADING,
};
use rover_control::driver::{Driver, Pwm, TURN_FULL_LEFT, TURN_FULL_RIGHT, TURN_NEUTRAL};
use rover_control::gps::GpsReceiver;
use rover_control::nav::NavigationEstimator;
use rover_control::odometer::{Odometer, TimerRegister};
use rover_control::state::StateVars;

struct Settings {
    replay_path: Option<String>,
    steer_to_waypoint: bool,
}

type TwiEventQueue = Rc<RefCell<VecDeque<(u8, u8)>>>;

#[derive(Clone, Copy, PartialEq)]
enum BusPhase {
    Idle,
    Started,
    Addressed,
    RegisterSelected,
    Restarted,
    Reading,
}

/**
 * A stand-in for the TWI hardware: acts like a CMPS10 holding a fixed
 * attitude, and turns each bus request into the status event the real
 * master would raise, queued for the supervisory loop to deliver.
 */
struct SimulatedBus {
    events: TwiEventQueue,
    phase: BusPhase,
    registers: [u8; 4],
    pointer: usize,
}

impl SimulatedBus {
    fn new(events: TwiEventQueue, heading_tenths: u16, pitch: i8, roll: i8) -> SimulatedBus {
        SimulatedBus {
            events,
            phase: BusPhase::Idle,
            registers: [
                (heading_tenths >> 8) as u8,
                (heading_tenths & 0xFF) as u8,
                pitch as u8,
                roll as u8,
            ],
            pointer: 0,
        }
    }

    fn raise(&mut self, status: u8, data: u8) {
        self.events.borrow_mut().push_back((status, data));
    }
}

impl TwiBus for SimulatedBus {
    fn start(&mut self) {
        if self.phase == BusPhase::Idle {
            self.phase = BusPhase::Started;
            self.raise(0x08, 0);
        } else {
            self.phase = BusPhase::Restarted;
            self.raise(0x10, 0);
        }
    }

    fn write(&mut self, byte: u8) {
        match self.phase {
            BusPhase::Started => {
                self.phase = BusPhase::Addressed;
                self.raise(0x18, 0);
            }
            BusPhase::Addressed => {
                // Register 2 is the first of the four we serve
                self.pointer = usize::from(byte.saturating_sub(2)).min(3);
                self.phase = BusPhase::RegisterSelected;
                self.raise(0x28, 0);
            }
            BusPhase::Restarted => {
                self.phase = BusPhase::Reading;
                self.raise(0x40, 0);
            }
            _ => self.raise(0x00, byte),
        }
    }

    fn read_ack(&mut self) {
        let data = self.registers[self.pointer];
        self.pointer = (self.pointer + 1).min(3);
        self.raise(0x50, data);
    }

    fn read_nack(&mut self) {
        let data = self.registers[self.pointer];
        self.phase = BusPhase::Idle;
        self.raise(0x58, data);
    }

    fn stop(&mut self) {
        self.phase = BusPhase::Idle;
    }
}

/// Emulates the free-running 4 us hardware timer from the wall clock.
struct WallClockTimer {
    epoch: Instant,
}

impl WallClockTimer {
    fn new() -> WallClockTimer {
        WallClockTimer {
            epoch: Instant::now(),
        }
    }
}

impl TimerRegister for WallClockTimer {
    fn count(&self) -> u16 {
        (self.epoch.elapsed().as_micros() / 4) as u16
    }
}

/// Logs steering commands instead of generating pulses; enforces the
/// mechanical limits the controller leaves to the driver.
struct LoggingDriver {
    steering_pwm: Pwm,
}

impl LoggingDriver {
    fn new() -> LoggingDriver {
        LoggingDriver {
            steering_pwm: TURN_NEUTRAL,
        }
    }
}

impl Driver for LoggingDriver {
    fn steer(&mut self, steering_pwm: Pwm) {
        self.steering_pwm = clamp(steering_pwm, TURN_FULL_RIGHT, TURN_FULL_LEFT);
        debug!("Steering pulse {} us", self.steering_pwm);
    }

    fn get_steering(&self) -> Pwm {
        self.steering_pwm
    }
}

fn main() {
    let settings = match handle_opts() {
        Some(settings) => settings,
        None => return,
    };
    info!("Starting up");

    match run(&settings) {
        Ok(()) => (),
        Err(e) => error!("Supervisory loop failed: {}", e),
    }

    info!("Shutting down");
}

fn run(settings: &Settings) -> io::Result<()> {
    let reader: Box<dyn BufRead> = match settings.replay_path {
        Some(ref path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let twi_events: TwiEventQueue = Rc::new(RefCell::new(VecDeque::new()));
    // 263.48 magnetic reads as 272.0 true after declination
    let bus = SimulatedBus::new(twi_events.clone(), 2634, 0, 0);

    let mut state = StateVars::new();
    let mut gps = GpsReceiver::new();
    let mut compass = CompassReader::new(Box::new(bus));
    let mut odometer = Odometer::new(Box::new(WallClockTimer::new()));
    let mut estimator = NavigationEstimator::new();
    let mut controller = SteeringController::new(if settings.steer_to_waypoint {
        SteeringReference::WaypointBearing
    } else {
        SteeringReference::FixedHeading(TARGET_HEADING)
    });
    let mut driver = LoggingDriver::new();

    let loop_duration = Duration::from_secs_f32(SECONDS_PER_LOOP);

    for line in reader.lines() {
        let line = line?;
        let tick_start = Instant::now();

        state.status.clear();
        state.main_loop_counter = state.main_loop_counter.wrapping_add(1);

        // One replayed line stands in for the bytes the serial interrupt
        // would have delivered since the last tick
        for byte in line.bytes() {
            gps.on_byte_received(byte);
        }
        gps.on_byte_received(b'\n');

        // Deliver the bus events from the transaction started last tick
        loop {
            let event = twi_events.borrow_mut().pop_front();
            match event {
                Some((status, data)) => compass.on_twi_event(status, data),
                None => break,
            }
        }

        odometer.service(&mut state);
        compass.service(&mut state);
        gps.service(&mut state);
        estimator.update(&mut state);
        controller.update(&mut state);
        driver.steer(state.control_steering_pwm);

        log_telemetry(&state);

        let elapsed = tick_start.elapsed();
        if elapsed < loop_duration {
            sleep(loop_duration - elapsed);
        }
    }
    Ok(())
}

fn log_telemetry(state: &StateVars) {
    if state.status.gps_no_buff_avail || state.status.gps_buff_overflow {
        warn!("GPS capture falling behind: {:?}", state.status);
    }
    if state.status.compass_error {
        warn!("Compass read failed");
    }

    let timestamp = match state.gps_datetime() {
        Some(t) => t.format("%H:%M:%S%.3f").to_string(),
        None => "--:--:--".to_string(),
    };
    debug!(
        "tick {} utc {} pos ({:.6}, {:.6}) hdg {:.1} waypt {:.1} deg {:.1} m speed {:.1} m/s pwm {}",
        state.main_loop_counter,
        timestamp,
        state.nav_latitude,
        state.nav_longitude,
        state.nav_heading_deg,
        state.nav_waypt_true_bearing,
        state.nav_distance_to_waypt_m,
        state.nav_speed,
        state.control_steering_pwm,
    );
}

fn handle_opts() -> Option<Settings> {
    let mut opts = Options::new();
    opts.optflag("v", "verbose", "Prints extra logging.");
    opts.optflag("h", "help", "Print this help menu.");
    opts.optopt(
        "f",
        "file",
        "Replay NMEA sentences from a file instead of stdin.",
        "FILE",
    );
    opts.optflag(
        "w",
        "waypoint",
        "Steer toward the latched waypoint instead of holding the fixed heading.",
    );
    let mut args = std::env::args();
    args.next(); // Skip the program name
    let matches = match opts.parse(args) {
        Ok(m) => m,
        Err(e) => panic!("Unable to parse options: {}", e),
    };
    if matches.opt_present("h") {
        print_usage(opts);
        return None;
    }

    let level = if matches.opt_present("v") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let status = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
    match status {
        Ok(_) => (),
        Err(e) => panic!("Unable to initialize logger: {}", e),
    };

    Some(Settings {
        replay_path: matches.opt_str("f"),
        steer_to_waypoint: matches.opt_present("w"),
    })
}

fn print_usage(opts: Options) {
    let brief = "Usage: rover-control [options]";
    print!("{}", opts.usage(brief));
}
