/**
 * Reads heading, pitch and roll from the CMPS10 tilt-compensated compass
 * over TWI. The transaction is a strict linear sequence driven entirely by
 * bus events: address the device for writing, select the heading register,
 * repeated-start, then read four registers back to back. Any status byte
 * that does not belong to the expected sequence aborts the transaction and
 * plants sentinel values so the failure is visible downstream.
 */
use enum_primitive::FromPrimitive;

use crate::state::StateVars;

pub const COMPASS_ADDR: u8 = 0x60;
const COMPASS_HEADING_REG: u8 = 2;

const TW_WRITE: u8 = 0;
const TW_READ: u8 = 1;

/// Planted on abort so a half-finished reading is never mistaken for data.
pub const HEADING_ERROR: u16 = 0xEEEE;
pub const PITCH_ROLL_ERROR: u8 = 0xBB;

// Reset values at the start of each transaction, distinct from the error
// sentinels so the two cases can be told apart on the wire
const HEADING_RESET: u16 = 0xFFFF;
const PITCH_ROLL_RESET: u8 = 0xFF;

enum_from_primitive! {
    /// TWI master status codes, as reported by the bus hardware.
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub enum TwiStatus {
        Start = 0x08,
        RepeatedStart = 0x10,
        AddressWriteAck = 0x18,
        DataWriteAck = 0x28,
        AddressReadAck = 0x40,
        DataReadAck = 0x50,
        DataReadNack = 0x58,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum CompassRegister {
    HeadingHigh,
    HeadingLow,
    Pitch,
    Roll,
}

/**
 * Provides the bus primitives the read sequence is built from. Each call
 * requests an action; completion comes back later as an on_twi_event.
 */
pub trait TwiBus {
    fn start(&mut self);
    fn write(&mut self, byte: u8);
    fn read_ack(&mut self);
    fn read_nack(&mut self);
    fn stop(&mut self);
}

pub struct CompassReader {
    bus: Box<dyn TwiBus>,
    requested_register: CompassRegister,
    heading_reading: u16,
    heading_ready: bool,
    pitch_reading: u8,
    pitch_ready: bool,
    roll_reading: u8,
    roll_ready: bool,
    active: bool,
    error: bool,
}

impl CompassReader {
    pub fn new(bus: Box<dyn TwiBus>) -> CompassReader {
        CompassReader {
            bus,
            requested_register: CompassRegister::HeadingHigh,
            heading_reading: HEADING_RESET,
            heading_ready: false,
            pitch_reading: PITCH_ROLL_RESET,
            pitch_ready: false,
            roll_reading: PITCH_ROLL_RESET,
            roll_ready: false,
            active: false,
            error: false,
        }
    }

    /**
     * Advances the transaction by one bus event. Interrupt context: the
     * only side effects are bus requests and local bookkeeping.
     */
    pub fn on_twi_event(&mut self, status: u8, data: u8) {
        let status = match TwiStatus::from_u8(status) {
            Some(status) => status,
            None => {
                self.abort();
                return;
            }
        };

        match status {
            TwiStatus::Start => self.bus.write((COMPASS_ADDR << 1) | TW_WRITE),
            TwiStatus::AddressWriteAck => self.bus.write(COMPASS_HEADING_REG),
            TwiStatus::DataWriteAck => self.bus.start(),
            TwiStatus::RepeatedStart => self.bus.write((COMPASS_ADDR << 1) | TW_READ),
            TwiStatus::AddressReadAck => {
                if self.requested_register == CompassRegister::HeadingHigh {
                    self.bus.read_ack();
                } else {
                    self.abort();
                }
            }
            TwiStatus::DataReadAck => match self.requested_register {
                CompassRegister::HeadingHigh => {
                    self.heading_reading = u16::from(data) << 8;
                    self.requested_register = CompassRegister::HeadingLow;
                    self.bus.read_ack();
                }
                CompassRegister::HeadingLow => {
                    self.heading_reading |= u16::from(data);
                    self.heading_ready = true;
                    self.requested_register = CompassRegister::Pitch;
                    self.bus.read_ack();
                }
                CompassRegister::Pitch => {
                    self.pitch_reading = data;
                    self.pitch_ready = true;
                    self.requested_register = CompassRegister::Roll;
                    // The roll register is the last one; tell the device so
                    self.bus.read_nack();
                }
                CompassRegister::Roll => self.abort(),
            },
            TwiStatus::DataReadNack => {
                if self.requested_register == CompassRegister::Roll {
                    self.roll_reading = data;
                    self.roll_ready = true;
                    self.active = false;
                    self.bus.stop();
                } else {
                    self.abort();
                }
            }
        }
    }

    fn abort(&mut self) {
        self.error = true;
        self.heading_reading = HEADING_ERROR;
        self.pitch_reading = PITCH_ROLL_ERROR;
        self.roll_reading = PITCH_ROLL_ERROR;
        self.active = false;
        self.bus.stop();
    }

    /**
     * Publishes the completed readings and kicks off the next transaction.
     * If the previous transaction is still in flight, this tick is skipped
     * and the snapshot keeps its last values.
     */
    pub fn service(&mut self, state: &mut StateVars) {
        if self.active {
            return;
        }

        if self.heading_ready {
            state.heading_raw = self.heading_reading;
            state.heading_deg = f32::from(self.heading_reading) / 10.0;
        }
        if self.pitch_ready {
            state.pitch_deg = self.pitch_reading as i8;
        }
        if self.roll_ready {
            state.roll_deg = self.roll_reading as i8;
        }
        if self.error {
            state.status.compass_error = true;
        }

        self.begin_new_reading();
    }

    fn begin_new_reading(&mut self) {
        self.requested_register = CompassRegister::HeadingHigh;
        self.heading_reading = HEADING_RESET;
        self.heading_ready = false;
        self.pitch_reading = PITCH_ROLL_RESET;
        self.pitch_ready = false;
        self.roll_reading = PITCH_ROLL_RESET;
        self.roll_ready = false;
        self.error = false;
        self.active = true;
        self.bus.start();
    }
}
