//! **TZX** tape images: a general block-based successor to TAP. Blocks
//! that carry a pulse train — standard/turbo speed data, pure tone, a raw
//! pulse sequence, pure data, and pause — are compiled into the same
//! master-tick pulse units [`crate::tap`] uses for playback. Structural
//! blocks (group/loop markers, text/archive metadata) are recognized and
//! stepped over by their declared length; everything else stops the scan
//! rather than risk misparsing an unknown layout.

use core::convert::TryFrom;
use std::io::Cursor;

use crate::tap::pulse::consts::*;
use crate::tap::pulse::ReadEncPulseIter;

macro_rules! tzx_id {
    ($($id:ident = $n:literal),*) => {
        #[repr(u8)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum TzxId {
            $($id = $n),*
        }

        impl TryFrom<u8> for TzxId {
            type Error = &'static str;
            fn try_from(id: u8) -> Result<Self, Self::Error> {
                match id {
                    $($n => Ok(TzxId::$id),)*
                    _ => Err("unrecognized TZX block id"),
                }
            }
        }
    };
}

tzx_id! {
    StandardSpeed = 0x10,
    TurboSpeed    = 0x11,
    PureTone      = 0x12,
    SeqOfPulses   = 0x13,
    PureData      = 0x14,
    DirectRec     = 0x15,
    CswRecording  = 0x18,
    Generalized   = 0x19,
    Pause         = 0x20,
    GroupStart    = 0x21,
    GroupEnd      = 0x22,
    Jump          = 0x23,
    LoopStart     = 0x24,
    LoopEnd       = 0x25,
    CallSeq       = 0x26,
    Return        = 0x27,
    Select        = 0x28,
    StopIn48k     = 0x2A,
    SetLevel      = 0x2B,
    Text          = 0x30,
    Message       = 0x31,
    Archive       = 0x32,
    Hardware      = 0x33,
    Custom        = 0x35,
    Glue          = 0x5A
}

impl From<TzxId> for u8 {
    fn from(id: TzxId) -> u8 {
        id as u8
    }
}

const SIGNATURE: &[u8] = b"ZXTape!\x1a";

/// T-states per millisecond at the standard 3.5MHz clock, used to convert
/// a TZX pause field (always specified in milliseconds) into master ticks.
const TSTATES_PER_MS: u32 = 3500;

fn u16_at(bytes: &[u8], off: usize) -> Option<u16> {
    Some(u16::from_le_bytes([*bytes.get(off)?, *bytes.get(off + 1)?]))
}

fn u24_at(bytes: &[u8], off: usize) -> Option<usize> {
    Some(u32::from_le_bytes([*bytes.get(off)?, *bytes.get(off + 1)?, *bytes.get(off + 2)?, 0]) as usize)
}

fn u32_at(bytes: &[u8], off: usize) -> Option<u32> {
    Some(u32::from_le_bytes([*bytes.get(off)?, *bytes.get(off + 1)?, *bytes.get(off + 2)?, *bytes.get(off + 3)?]))
}

/// Returns the number of bytes in `bytes[cursor..]` occupied by a
/// structural block's body (not counting the id byte already consumed).
/// Only used for block ids that carry no pulses of their own; those with
/// a dedicated synthesizer are skipped by the amount they actually
/// consume while synthesizing.
fn block_body_len(id: TzxId, bytes: &[u8], cursor: usize) -> Option<usize> {
    match id {
        TzxId::StandardSpeed | TzxId::TurboSpeed | TzxId::PureTone | TzxId::SeqOfPulses
        | TzxId::PureData | TzxId::Pause | TzxId::LoopStart | TzxId::LoopEnd => None, // synthesized directly
        TzxId::DirectRec => Some(5 + u24_at(bytes, cursor + 5)?),
        TzxId::CswRecording | TzxId::Generalized => Some(4 + u32_at(bytes, cursor)? as usize),
        TzxId::Jump => Some(2),
        TzxId::GroupStart | TzxId::Text => Some(1 + *bytes.get(cursor)? as usize),
        TzxId::GroupEnd | TzxId::Return => Some(0),
        TzxId::CallSeq => Some(2 + 2 * u16_at(bytes, cursor)? as usize),
        TzxId::Select | TzxId::Archive => Some(2 + u16_at(bytes, cursor)? as usize),
        TzxId::StopIn48k | TzxId::SetLevel => Some(4 + u32_at(bytes, cursor)? as usize),
        TzxId::Message => Some(2 + *bytes.get(cursor + 1)? as usize),
        TzxId::Hardware => Some(1 + 3 * *bytes.get(cursor)? as usize),
        TzxId::Custom => Some(14 + u32_at(bytes, cursor + 10)? as usize),
        TzxId::Glue => Some(9),
    }
}

/// Appends the lead-in/sync/data pulses for a standard-speed byte stream,
/// reusing the same encoder [`crate::tap::TapPlayer`] drives for `.tap`
/// blocks, since `StandardSpeedData` uses identical ROM loader timings.
fn push_standard_encoded(out: &mut Vec<u32>, data: &[u8]) {
    let iter = ReadEncPulseIter::new(Cursor::new(data.to_vec()));
    out.extend(iter.map(|p| p.get()));
}

/// Appends two pulses per bit (MSB first) for `bits` bits of `byte`.
fn push_data_bits(out: &mut Vec<u32>, byte: u8, bits: u8, zero: u32, one: u32) {
    for i in 0..bits {
        let bit = byte & (0x80 >> i) != 0;
        let len = if bit { one } else { zero };
        out.push(len);
        out.push(len);
    }
}

fn push_pause(out: &mut Vec<u32>, pause_ms: u16) {
    if pause_ms > 0 {
        out.push(pause_ms as u32 * TSTATES_PER_MS);
    }
}

/// Compiles every block with a pulse train of its own into the flat
/// master-tick pulse sequence described by §4.5: standard/turbo speed
/// data, pure tone, a raw pulse sequence, pure data, and pauses. Loop
/// markers repeat the pulses generated between them. Structural blocks
/// (group markers, text, archive info, and any other recognized id) are
/// stepped over with no pulses of their own; an unrecognized id stops the
/// scan, since its layout — and thus where the next block starts — isn't
/// known.
pub fn compile_pulses(bytes: &[u8]) -> std::io::Result<Vec<u32>> {
    if bytes.len() < SIGNATURE.len() + 2 || &bytes[..SIGNATURE.len()] != SIGNATURE {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "missing TZX signature"));
    }
    let mut cursor = SIGNATURE.len() + 2;
    let mut out = Vec::new();
    let mut loop_marker: Option<(usize, u16)> = None;
    while cursor < bytes.len() {
        let id = bytes[cursor];
        cursor += 1;
        let tzx_id = match TzxId::try_from(id) {
            Ok(tzx_id) => tzx_id,
            Err(_) => break,
        };
        match tzx_id {
            TzxId::StandardSpeed => {
                let (Some(pause), Some(len)) = (u16_at(bytes, cursor), u16_at(bytes, cursor + 2)) else { break };
                let len = len as usize;
                if cursor + 4 + len > bytes.len() {
                    break;
                }
                push_standard_encoded(&mut out, &bytes[cursor + 4..cursor + 4 + len]);
                push_pause(&mut out, pause);
                cursor += 4 + len;
            }
            TzxId::TurboSpeed => {
                let Some(zero) = u16_at(bytes, cursor) else { break };
                let Some(one) = u16_at(bytes, cursor + 2) else { break };
                let Some(pilot_len) = u16_at(bytes, cursor + 4) else { break };
                let Some(pilot_count) = u16_at(bytes, cursor + 6) else { break };
                let Some(used_bits) = bytes.get(cursor + 8).copied() else { break };
                let Some(pause) = u16_at(bytes, cursor + 9) else { break };
                let Some(len) = u24_at(bytes, cursor + 11) else { break };
                if cursor + 14 + len > bytes.len() {
                    break;
                }
                for _ in 0..pilot_count {
                    out.push(pilot_len as u32);
                }
                let data = &bytes[cursor + 14..cursor + 14 + len];
                let last = data.len().saturating_sub(1);
                for (i, &byte) in data.iter().enumerate() {
                    let bits = if i == last && used_bits != 0 { used_bits } else { 8 };
                    push_data_bits(&mut out, byte, bits, zero as u32, one as u32);
                }
                push_pause(&mut out, pause);
                cursor += 14 + len;
            }
            TzxId::PureTone => {
                let (Some(pulse_len), Some(count)) = (u16_at(bytes, cursor), u16_at(bytes, cursor + 2)) else { break };
                for _ in 0..count {
                    out.push(pulse_len as u32);
                }
                cursor += 4;
            }
            TzxId::SeqOfPulses => {
                let Some(&count) = bytes.get(cursor) else { break };
                cursor += 1;
                for i in 0..count as usize {
                    let Some(pulse_len) = u16_at(bytes, cursor + i * 2) else { break };
                    out.push(pulse_len as u32);
                }
                cursor += 2 * count as usize;
            }
            TzxId::PureData => {
                let Some(zero) = u16_at(bytes, cursor) else { break };
                let Some(one) = u16_at(bytes, cursor + 2) else { break };
                let Some(used_bits) = bytes.get(cursor + 4).copied() else { break };
                let Some(pause) = u16_at(bytes, cursor + 5) else { break };
                let Some(len) = u24_at(bytes, cursor + 7) else { break };
                if cursor + 10 + len > bytes.len() {
                    break;
                }
                let data = &bytes[cursor + 10..cursor + 10 + len];
                let last = data.len().saturating_sub(1);
                for (i, &byte) in data.iter().enumerate() {
                    let bits = if i == last && used_bits != 0 { used_bits } else { 8 };
                    push_data_bits(&mut out, byte, bits, zero as u32, one as u32);
                }
                push_pause(&mut out, pause);
                cursor += 10 + len;
            }
            TzxId::Pause => {
                let Some(pause) = u16_at(bytes, cursor) else { break };
                push_pause(&mut out, pause);
                cursor += 2;
            }
            TzxId::LoopStart => {
                let Some(count) = u16_at(bytes, cursor) else { break };
                loop_marker = Some((out.len(), count));
                cursor += 2;
            }
            TzxId::LoopEnd => {
                if let Some((start, count)) = loop_marker.take() {
                    let segment = out[start..].to_vec();
                    for _ in 1..count {
                        out.extend_from_slice(&segment);
                    }
                }
            }
            _ => match block_body_len(tzx_id, bytes, cursor) {
                Some(len) if cursor + len <= bytes.len() => cursor += len,
                _ => break,
            },
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_speed_block(pause: u16, data: &[u8]) -> Vec<u8> {
        let mut block = vec![0x10];
        block.extend_from_slice(&pause.to_le_bytes());
        block.extend_from_slice(&(data.len() as u16).to_le_bytes());
        block.extend_from_slice(data);
        block
    }

    fn file_with(blocks: &[Vec<u8>]) -> Vec<u8> {
        let mut bytes = SIGNATURE.to_vec();
        bytes.extend_from_slice(&[1, 20]);
        for block in blocks {
            bytes.extend_from_slice(block);
        }
        bytes
    }

    #[test]
    fn rejects_files_without_the_tzx_signature() {
        assert!(compile_pulses(b"not a tzx file").is_err());
    }

    #[test]
    fn a_standard_speed_block_compiles_to_the_documented_rom_loader_timings() {
        let bytes = file_with(&[standard_speed_block(0, &[0x00, 0xaa])]);
        let pulses = compile_pulses(&bytes).unwrap();
        assert_eq!(pulses.len() as u16, LEAD_PULSES_HEAD + 2 + 2 * 8 * 2);
        assert!(pulses[..LEAD_PULSES_HEAD as usize].iter().all(|&p| p == LEAD_PULSE_LENGTH.get()));
        assert_eq!(pulses[LEAD_PULSES_HEAD as usize], SYNC_PULSE1_LENGTH.get());
        assert_eq!(pulses[LEAD_PULSES_HEAD as usize + 1], SYNC_PULSE2_LENGTH.get());
    }

    #[test]
    fn a_pause_field_adds_a_trailing_pulse_scaled_to_tstates() {
        let bytes = file_with(&[standard_speed_block(1000, &[0x00])]);
        let pulses = compile_pulses(&bytes).unwrap();
        assert_eq!(*pulses.last().unwrap(), 1000 * TSTATES_PER_MS);
    }

    #[test]
    fn skips_a_text_description_block_before_a_standard_speed_block() {
        let mut text_block = vec![0x30, 5];
        text_block.extend_from_slice(b"hello");
        let bytes = file_with(&[text_block, standard_speed_block(0, &[0xaa, 0xbb])]);
        let pulses = compile_pulses(&bytes).unwrap();
        assert!(!pulses.is_empty());
    }

    #[test]
    fn a_pure_tone_block_repeats_a_single_pulse_length() {
        let mut block = vec![0x12];
        block.extend_from_slice(&1000u16.to_le_bytes());
        block.extend_from_slice(&5u16.to_le_bytes());
        let bytes = file_with(&[block]);
        let pulses = compile_pulses(&bytes).unwrap();
        assert_eq!(pulses, vec![1000; 5]);
    }

    #[test]
    fn a_pulse_sequence_block_plays_its_literal_pulse_list() {
        let mut block = vec![0x13, 3];
        for len in [100u16, 200, 300] {
            block.extend_from_slice(&len.to_le_bytes());
        }
        let bytes = file_with(&[block]);
        let pulses = compile_pulses(&bytes).unwrap();
        assert_eq!(pulses, vec![100, 200, 300]);
    }

    #[test]
    fn a_pure_data_block_encodes_bits_without_any_lead_or_sync_pulses() {
        let mut block = vec![0x14];
        block.extend_from_slice(&500u16.to_le_bytes()); // zero pulse length
        block.extend_from_slice(&1000u16.to_le_bytes()); // one pulse length
        block.push(0); // used bits in last byte: all 8
        block.extend_from_slice(&0u16.to_le_bytes()); // no pause
        block.extend_from_slice(&[1, 0, 0]); // 1 byte of data
        block.push(0x80); // top bit set, rest clear
        let bytes = file_with(&[block]);
        let pulses = compile_pulses(&bytes).unwrap();
        assert_eq!(pulses, vec![1000, 1000, 500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 500]);
    }

    #[test]
    fn a_loop_repeats_the_pulses_between_loop_start_and_loop_end() {
        let mut pure_tone = vec![0x12];
        pure_tone.extend_from_slice(&42u16.to_le_bytes());
        pure_tone.extend_from_slice(&1u16.to_le_bytes());
        let mut loop_start = vec![0x24];
        loop_start.extend_from_slice(&3u16.to_le_bytes());
        let loop_end = vec![0x25];
        let bytes = file_with(&[loop_start, pure_tone, loop_end]);
        let pulses = compile_pulses(&bytes).unwrap();
        assert_eq!(pulses, vec![42, 42, 42]);
    }

    #[test]
    fn a_plain_pause_block_becomes_a_single_scaled_pulse() {
        let mut block = vec![0x20];
        block.extend_from_slice(&2u16.to_le_bytes());
        let bytes = file_with(&[block]);
        let pulses = compile_pulses(&bytes).unwrap();
        assert_eq!(pulses, vec![2 * TSTATES_PER_MS]);
    }
}
