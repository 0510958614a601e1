//! Kempston joystick: one port (`0x1F`), active-high direction/fire bits.

use bitflags::bitflags;

const FIRE_MASK: u8 = 0b0001_0000;
const RIGHT_MASK: u8 = 0b0000_0001;
const LEFT_MASK: u8 = 0b0000_0010;
const DOWN_MASK: u8 = 0b0000_0100;
const UP_MASK: u8 = 0b0000_1000;

bitflags! {
    #[derive(Default)]
    #[cfg_attr(feature = "snapshot", derive(serde::Serialize, serde::Deserialize))]
    pub struct Directions: u8 {
        const UP = UP_MASK;
        const DOWN = DOWN_MASK;
        const LEFT = LEFT_MASK;
        const RIGHT = RIGHT_MASK;
    }
}

/// Tracks the current stick/fire state and produces the byte the ULA
/// returns for a Kempston port read.
#[derive(Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "snapshot", derive(serde::Serialize, serde::Deserialize))]
pub struct KempstonJoystick {
    directions: Directions,
    fire: bool,
}

impl KempstonJoystick {
    pub fn new() -> Self {
        KempstonJoystick::default()
    }

    pub fn set_fire(&mut self, pressed: bool) {
        self.fire = pressed;
    }

    pub fn set_directions(&mut self, directions: Directions) {
        self.directions = directions;
    }

    pub fn port_value(&self) -> u8 {
        self.directions.bits() | if self.fire { FIRE_MASK } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_value_combines_direction_and_fire_bits() {
        let mut js = KempstonJoystick::new();
        js.set_directions(Directions::UP | Directions::RIGHT);
        js.set_fire(true);
        assert_eq!(js.port_value(), UP_MASK | RIGHT_MASK | FIRE_MASK);
    }
}
