//! Envelope shapes: one full period is 32 steps (two 16-step ramps), which
//! is enough to express both the alternating and non-alternating shapes
//! without separate wrap-around bookkeeping in the driver.

pub const ENVELOPE_STEPS: usize = 32;
const SHAPE_COUNT: usize = 16;

static TABLE: [[u8; ENVELOPE_STEPS]; SHAPE_COUNT] = build_table();

pub fn level(shape: u8, step: u8) -> u8 {
    TABLE[(shape & 0x0f) as usize][(step as usize) % ENVELOPE_STEPS]
}

/// Whether the envelope freezes (at the last computed level) once it
/// reaches the end of its period, rather than repeating.
pub fn holds(shape: u8) -> bool {
    let continues = shape & 0x08 != 0;
    let hold = shape & 0x01 != 0;
    !continues || hold
}

const fn level_at(shape: u8, step: usize) -> u8 {
    let continues = shape & 0x08 != 0;
    let attack = shape & 0x04 != 0;
    let alt = shape & 0x02 != 0;
    let hold = shape & 0x01 != 0;

    if !continues {
        return if step >= 16 { 0 } else if attack { step as u8 } else { 15 - step as u8 };
    }
    if hold {
        if step >= 16 {
            return if attack { 15 } else { 0 };
        }
        return if attack { step as u8 } else { 15 - step as u8 };
    }
    let phase = step % 16;
    let second_ramp = step >= 16;
    let ascending = if alt { second_ramp == !attack } else { attack };
    if ascending { phase as u8 } else { 15 - phase as u8 }
}

const fn build_table() -> [[u8; ENVELOPE_STEPS]; SHAPE_COUNT] {
    let mut table = [[0u8; ENVELOPE_STEPS]; SHAPE_COUNT];
    let mut shape = 0usize;
    while shape < SHAPE_COUNT {
        let mut step = 0usize;
        while step < ENVELOPE_STEPS {
            table[shape][step] = level_at(shape as u8, step);
            step += 1;
        }
        shape += 1;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_zero_ramps_down_once_then_holds_at_zero() {
        assert_eq!(level(0, 0), 15);
        assert_eq!(level(0, 15), 0);
        assert_eq!(level(0, 20), 0);
        assert!(holds(0));
    }

    #[test]
    fn shape_fifteen_continue_attack_alt_hold_saturates_high() {
        // CONT=1 ATT=1 ALT=1 HOLD=1 -> single ramp up then hold at max.
        let shape = 0b1101;
        assert_eq!(level(shape, 0), 0);
        assert_eq!(level(shape, 15), 15);
        assert_eq!(level(shape, 30), 15);
        assert!(holds(shape));
    }

    #[test]
    fn alternating_sawtooth_mirrors_second_ramp() {
        let shape = 0b1110; // CONT ATT ALT, no HOLD
        assert_eq!(level(shape, 0), 0);
        assert_eq!(level(shape, 15), 15);
        assert_eq!(level(shape, 16), 15);
        assert_eq!(level(shape, 31), 0);
        assert!(!holds(shape));
    }
}
