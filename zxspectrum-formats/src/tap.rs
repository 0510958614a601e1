//! **TAP** tape images: a sequence of length-prefixed blocks, each a flag
//! byte, payload, and XOR checksum. Playback turns each block into the
//! T-state pulse train the ROM loader expects on `EAR IN`.

pub mod pulse;

use std::io::Cursor;

use pulse::ReadEncPulseIter;

/// One `TAP` block: the raw bytes as they appear on tape, flag byte and
/// checksum included.
#[derive(Clone, Debug)]
pub struct TapBlock {
    pub data: Vec<u8>,
}

impl TapBlock {
    pub fn flag(&self) -> Option<u8> {
        self.data.first().copied()
    }

    pub fn is_header(&self) -> bool {
        self.flag() == Some(0x00)
    }
}

/// Splits a raw `.tap` file into its length-prefixed blocks.
pub fn read_blocks(bytes: &[u8]) -> std::io::Result<Vec<TapBlock>> {
    let mut blocks = Vec::new();
    let mut cursor = 0usize;
    while cursor + 2 <= bytes.len() {
        let len = u16::from_le_bytes([bytes[cursor], bytes[cursor + 1]]) as usize;
        cursor += 2;
        if cursor + len > bytes.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "TAP block length exceeds remaining file size",
            ));
        }
        blocks.push(TapBlock { data: bytes[cursor..cursor + len].to_vec() });
        cursor += len;
    }
    Ok(blocks)
}

/// Serializes blocks back into `.tap` framing.
pub fn write_blocks(blocks: &[TapBlock]) -> Vec<u8> {
    let mut out = Vec::new();
    for block in blocks {
        out.extend_from_slice(&(block.data.len() as u16).to_le_bytes());
        out.extend_from_slice(&block.data);
    }
    out
}

/// Plays a tape image back as a stream of pulse widths (in T-states),
/// block by block, with the documented inter-block pause.
pub struct TapPlayer {
    blocks: Vec<TapBlock>,
    block_index: usize,
    current: Option<ReadEncPulseIter<Cursor<Vec<u8>>>>,
    pause_remaining: u32,
}

impl TapPlayer {
    pub fn new(blocks: Vec<TapBlock>) -> Self {
        TapPlayer { blocks, block_index: 0, current: None, pause_remaining: 0 }
    }

    /// Returns the next pulse width in T-states, or `None` once every
    /// block (and its trailing pause) has been played.
    pub fn next_pulse(&mut self) -> Option<u32> {
        if self.pause_remaining > 0 {
            let p = self.pause_remaining;
            self.pause_remaining = 0;
            return Some(p);
        }
        loop {
            if let Some(iter) = &mut self.current {
                if let Some(pulse) = iter.next() {
                    return Some(pulse.get());
                }
                self.current = None;
                self.pause_remaining = pulse::consts::PAUSE_PULSE_LENGTH.get();
            }
            let block = self.blocks.get(self.block_index)?;
            self.block_index += 1;
            self.current = Some(ReadEncPulseIter::new(Cursor::new(block.data.clone())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_round_trip_through_tap_framing() {
        let blocks = vec![
            TapBlock { data: vec![0x00, 0x03, b'A', 0xff] },
            TapBlock { data: vec![0xff, 1, 2, 3] },
        ];
        let bytes = write_blocks(&blocks);
        let parsed = read_blocks(&bytes).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].is_header());
        assert!(!parsed[1].is_header());
    }

    #[test]
    fn truncated_block_length_is_an_error() {
        let bytes = vec![0xff, 0xff, 0x00];
        assert!(read_blocks(&bytes).is_err());
    }

    #[test]
    fn pulses_generated_for_a_tap_block_decode_back_to_its_original_bytes() {
        use core::num::NonZeroU32;
        use pulse::PulseDecodeWriter;

        let original = vec![0x00, 0x03, b'A', 0xff];
        let mut player = TapPlayer::new(vec![TapBlock { data: original.clone() }]);
        let mut pulses = Vec::new();
        while let Some(p) = player.next_pulse() {
            pulses.push(NonZeroU32::new(p).unwrap());
        }

        let mut decoder = PulseDecodeWriter::new(Cursor::new(Vec::new()));
        let written = decoder.write_decoded_pulses(pulses.into_iter()).unwrap();
        assert_eq!(written, NonZeroU32::new(original.len() as u32));
        assert_eq!(decoder.into_inner().into_inner(), original);
    }
}
