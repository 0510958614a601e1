//! Tape playback (§4.5): a lazy sequence of pulse lengths in master-clock
//! ticks, clocked once per master tick alongside the rest of the machine
//! and read back by the ULA as `EAR IN`.

/// A loaded tape image reduced to its pulse train. Even pulse indices hold
/// the low output level, odd indices the high level.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "snapshot", derive(serde::Serialize, serde::Deserialize))]
pub struct Tape {
    pulses: Vec<u32>,
    index: usize,
    remaining: u32,
    playing: bool,
}

impl Tape {
    pub fn new(pulses: Vec<u32>) -> Self {
        let remaining = pulses.first().copied().unwrap_or(0);
        let playing = !pulses.is_empty();
        Tape { pulses, index: 0, remaining, playing }
    }

    /// An empty, non-playing tape; `Machine` starts with one of these until
    /// a real image is loaded.
    pub fn empty() -> Self {
        Tape::new(Vec::new())
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current output polarity, unaffected by `advance`.
    pub fn level(&self) -> bool {
        self.playing && self.index % 2 == 1
    }

    /// Advances the tape by one master tick: decrements the current pulse
    /// and, once it expires, moves to the next one (flipping polarity) or
    /// stops playing if the pulse train is exhausted.
    pub fn advance(&mut self) {
        if !self.playing {
            return;
        }
        if self.remaining > 0 {
            self.remaining -= 1;
        }
        if self.remaining == 0 {
            self.index += 1;
            match self.pulses.get(self.index) {
                Some(&pulse) => self.remaining = pulse,
                None => self.playing = false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_alternates_as_each_pulse_expires() {
        let mut tape = Tape::new(vec![3, 2, 1]);
        assert!(tape.is_playing());
        assert!(!tape.level());
        tape.advance();
        tape.advance();
        assert!(!tape.level());
        tape.advance();
        assert!(tape.level());
        tape.advance();
        assert!(tape.level());
        tape.advance();
        assert!(tape.is_playing());
        assert!(!tape.level());
        tape.advance();
        assert!(!tape.is_playing());
    }

    #[test]
    fn an_empty_tape_never_plays() {
        let mut tape = Tape::empty();
        assert!(!tape.is_playing());
        assert!(!tape.level());
        tape.advance();
        assert!(!tape.is_playing());
    }
}
