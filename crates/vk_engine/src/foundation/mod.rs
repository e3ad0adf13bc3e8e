//! Foundation utilities shared by the render core and applications

pub mod logging;
pub mod math;
