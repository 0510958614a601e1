//! The 8x5 keyboard matrix (§4.2): each of the eight half-rows is an
//! active-low 5-bit mask read through the ULA's even I/O ports.

/// Every key on the 40-key ZX Spectrum keyboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "snapshot", derive(serde::Serialize, serde::Deserialize))]
pub enum Key {
    CapsShift, Z, X, C, V,
    A, S, D, F, G,
    Q, W, E, R, T,
    Digit1, Digit2, Digit3, Digit4, Digit5,
    Digit0, Digit9, Digit8, Digit7, Digit6,
    P, O, I, U, Y,
    Enter, L, K, J, H,
    Space, SymbolShift, M, N, B,
}

const ROWS: [[Key; 5]; 8] = [
    [Key::CapsShift, Key::Z, Key::X, Key::C, Key::V],
    [Key::A, Key::S, Key::D, Key::F, Key::G],
    [Key::Q, Key::W, Key::E, Key::R, Key::T],
    [Key::Digit1, Key::Digit2, Key::Digit3, Key::Digit4, Key::Digit5],
    [Key::Digit0, Key::Digit9, Key::Digit8, Key::Digit7, Key::Digit6],
    [Key::P, Key::O, Key::I, Key::U, Key::Y],
    [Key::Enter, Key::L, Key::K, Key::J, Key::H],
    [Key::Space, Key::SymbolShift, Key::M, Key::N, Key::B],
];

fn locate(key: Key) -> (usize, u8) {
    for (row, keys) in ROWS.iter().enumerate() {
        if let Some(bit) = keys.iter().position(|&k| k == key) {
            return (row, bit as u8);
        }
    }
    unreachable!("every Key variant appears exactly once in ROWS")
}

/// Tracks which keys are currently held and produces each half-row's
/// active-low port mask.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "snapshot", derive(serde::Serialize, serde::Deserialize))]
pub struct Keyboard {
    rows: [u8; 8],
}

impl Default for Keyboard {
    fn default() -> Self {
        Keyboard { rows: [0x1f; 8] }
    }
}

impl Keyboard {
    pub fn new() -> Self {
        Keyboard::default()
    }

    pub fn key_down(&mut self, key: Key) {
        let (row, bit) = locate(key);
        self.rows[row] &= !(1 << bit);
    }

    pub fn key_up(&mut self, key: Key) {
        let (row, bit) = locate(key);
        self.rows[row] |= 1 << bit;
    }

    pub fn set_key(&mut self, key: Key, pressed: bool) {
        log::trace!("key {:?} {}", key, if pressed { "down" } else { "up" });
        if pressed {
            self.key_down(key);
        } else {
            self.key_up(key);
        }
    }

    pub fn row_mask(&self, half_row: usize) -> u8 {
        self.rows[half_row]
    }

    pub fn rows(&self) -> &[u8; 8] {
        &self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_maps_to_a_distinct_row_bit() {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for row in ROWS.iter() {
            for &k in row {
                assert!(seen.insert(locate(k)));
            }
        }
    }

    #[test]
    fn pressing_a_key_clears_only_its_bit() {
        let mut kb = Keyboard::new();
        kb.key_down(Key::Enter);
        let (row, bit) = locate(Key::Enter);
        assert_eq!(kb.row_mask(row) & (1 << bit), 0);
        assert_eq!(kb.row_mask(row) | (1 << bit), 0x1f);
    }

    #[test]
    fn releasing_restores_the_default_row_mask() {
        let mut kb = Keyboard::new();
        kb.key_down(Key::Space);
        kb.key_up(Key::Space);
        assert_eq!(kb.row_mask(locate(Key::Space).0), 0x1f);
    }
}
