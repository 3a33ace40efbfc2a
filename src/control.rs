/**
 * Steering controller. Treats the angle between the desired and estimated
 * heading as the cross-track error and runs a PID loop over it, producing a
 * servo pulse width around neutral. Only the proportional gain is active on
 * the shipped tune; the rate and integral terms are wired up and zeroed.
 */
use crate::driver::TURN_NEUTRAL;
use crate::nav::calc_relative_bearing;
use crate::state::{Degrees, StateVars};

/// One pass through the supervisory loop.
pub const SECONDS_PER_LOOP: f32 = 0.025;
pub const TARGET_HEADING: Degrees = 270.0;

const K_PROP: f32 = 2.7777777777777;
const K_RATE: f32 = 0.0;
const K_INTEGRAL: f32 = 0.0;

/// What the controller steers toward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SteeringReference {
    /// Hold a compass heading, regardless of position.
    FixedHeading(Degrees),
    /// Chase the latched waypoint's bearing.
    WaypointBearing,
}

pub struct SteeringController {
    reference: SteeringReference,
    xtrack_error: f32,
    xtrack_error_prev: f32,
    xtrack_error_sum: f32,
}

impl SteeringController {
    pub fn new(reference: SteeringReference) -> SteeringController {
        SteeringController {
            reference,
            xtrack_error: 0.0,
            xtrack_error_prev: 0.0,
            xtrack_error_sum: 0.0,
        }
    }

    /**
     * Runs one PID step against the estimator's outputs and publishes the
     * steering pulse width. The raw output is not clamped here; the driver
     * owns the mechanical limits.
     */
    pub fn update(&mut self, state: &mut StateVars) {
        let desired = match self.reference {
            SteeringReference::FixedHeading(heading) => heading,
            SteeringReference::WaypointBearing => state.nav_waypt_true_bearing,
        };

        self.xtrack_error_prev = self.xtrack_error;
        self.xtrack_error = calc_relative_bearing(desired, state.nav_heading_deg);
        let error_rate = (self.xtrack_error - self.xtrack_error_prev) / SECONDS_PER_LOOP;
        self.xtrack_error_sum += self.xtrack_error * SECONDS_PER_LOOP;

        let steer =
            K_PROP * self.xtrack_error + K_RATE * error_rate + K_INTEGRAL * self.xtrack_error_sum;

        state.control_heading_desired = desired;
        state.control_xtrack_error = self.xtrack_error;
        state.control_xtrack_error_rate = error_rate;
        state.control_xtrack_error_sum = self.xtrack_error_sum;
        // A positive error means the target is to the right, which is a
        // shorter pulse on this servo
        state.control_steering_pwm = (f32::from(TURN_NEUTRAL) - steer) as u16;
    }
}
