//! Joystick devices that produce a port byte the ULA reads on `0x1F`.

mod kempston;

pub use kempston::{Directions, KempstonJoystick};
