/// Steering servo pulse width in microseconds.
pub type Pwm = u16;

// Mechanical limits of the steering linkage. Left is the longer pulse on
// this servo.
pub const TURN_FULL_LEFT: Pwm = 1900;
pub const TURN_NEUTRAL: Pwm = 1500;
pub const TURN_FULL_RIGHT: Pwm = 1100;

/// Provides an interface to steer the vehicle.
pub trait Driver {
    fn steer(&mut self, steering_pwm: Pwm);
    fn get_steering(&self) -> Pwm;
}
