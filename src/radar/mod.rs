//! The three perception subsystems: locating robots in 3-D, tracking their identity
//! across ticks, and talking to the referee system over serial.

pub mod locate;
pub mod referee;
pub mod track;
