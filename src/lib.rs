#[macro_use]
extern crate enum_primitive;

pub mod compass;
pub mod control;
pub mod driver;
pub mod gps;
pub mod nav;
pub mod odometer;
pub mod state;
