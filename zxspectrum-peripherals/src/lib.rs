//! Peripheral devices kept separate from the core chip set: the keyboard
//! matrix and the Kempston joystick.

pub mod joystick;
pub mod keyboard;

pub use joystick::{Directions, KempstonJoystick};
pub use keyboard::{Key, Keyboard};
