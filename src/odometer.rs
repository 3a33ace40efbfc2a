/**
 * Counts wheel-sensor edges to measure distance travelled. The sensor has
 * no notion of direction, so the caller tells the odometer which way the
 * drivetrain is commanded and edges are credited to that direction's
 * counter. Each edge also captures the free-running timer so the estimator
 * can turn tick deltas into speed.
 */
use crate::state::StateVars;

/// Reads the free-running 16-bit hardware timer (4 us per count).
pub trait TimerRegister {
    fn count(&self) -> u16;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WheelDirection {
    Forward,
    Reverse,
}

pub struct Odometer {
    fwd_count: u32,
    rev_count: u32,
    tick_time: u16,
    direction: WheelDirection,
    timer: Box<dyn TimerRegister>,
}

impl Odometer {
    pub fn new(timer: Box<dyn TimerRegister>) -> Odometer {
        Odometer {
            fwd_count: 0,
            rev_count: 0,
            tick_time: 0,
            direction: WheelDirection::Forward,
            timer,
        }
    }

    /**
     * Credits one sensor edge to the active direction and captures the
     * timer. Interrupt context: O(1), wrap instead of overflow.
     */
    pub fn on_edge(&mut self) {
        match self.direction {
            WheelDirection::Forward => self.fwd_count = self.fwd_count.wrapping_add(1),
            WheelDirection::Reverse => self.rev_count = self.rev_count.wrapping_add(1),
        }
        self.tick_time = self.timer.count();
    }

    pub fn reset(&mut self) {
        self.fwd_count = 0;
        self.rev_count = 0;
        self.tick_time = 0;
    }

    pub fn set_direction(&mut self, direction: WheelDirection) {
        self.direction = direction;
    }

    pub fn direction(&self) -> WheelDirection {
        self.direction
    }

    pub fn forward_count(&self) -> u32 {
        self.fwd_count
    }

    pub fn reverse_count(&self) -> u32 {
        self.rev_count
    }

    /**
     * Publishes the active direction's counter and the latest edge
     * timestamp. The counters are read without masking the edge interrupt:
     * an edge landing mid-service only makes this tick's copy one count
     * stale, and the next tick picks it up. The timestamp is transient and
     * is cleared after publication so a tickless interval reads as zero.
     */
    pub fn service(&mut self, state: &mut StateVars) {
        match self.direction {
            WheelDirection::Forward => {
                state.odometer_ticks = self.fwd_count;
                state.odometer_ticks_are_fwd = true;
            }
            WheelDirection::Reverse => {
                state.odometer_ticks = self.rev_count;
                state.odometer_ticks_are_fwd = false;
            }
        }
        state.odometer_timestamp = self.tick_time;
        self.tick_time = 0;
    }
}
