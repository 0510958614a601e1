//! **Z80** snapshot format: the de-facto standard ZX Spectrum snapshot,
//! in three header revisions (see the format reference on World of
//! Spectrum). Only the common case of reading a complete machine state
//! back into a fresh [`Machine`] and writing one back out is covered;
//! MGT/DISCiPLE/Multiface extensions aren't.

mod compress;
mod decompress;

use std::io::{self, Read, Result, Write};

use zxspectrum_core::cpu::InterruptMode;
use zxspectrum_core::ula::Model;
use zxspectrum_core::Machine;

use compress::compress_write_all;
use decompress::MemDecompress;

const HEADER_V1_LEN: usize = 30;

/// Pages a V2/V3 `page` byte number to a RAM bank index, per model.
fn page_to_bank(page: u8, model: Model) -> Option<usize> {
    match model {
        Model::Spectrum48k => match page {
            4 => Some(2),
            5 => Some(0),
            8 => Some(5),
            _ => None,
        },
        Model::Spectrum128k => match page {
            3 => Some(0),
            4 => Some(1),
            5 => Some(2),
            6 => Some(3),
            7 => Some(4),
            8 => Some(5),
            9 => Some(6),
            10 => Some(7),
            _ => None,
        },
    }
}

fn bank_to_page(bank: usize, model: Model) -> u8 {
    match model {
        Model::Spectrum48k => match bank {
            2 => 4,
            0 => 5,
            5 => 8,
            _ => unreachable!("48k snapshots only ever touch banks 0, 2 and 5"),
        },
        Model::Spectrum128k => bank as u8 + 3,
    }
}

/// Loads a `.z80` snapshot into `machine`, replacing its CPU, ULA and AY
/// state entirely. The model implied by the file (48k vs 128k hardware
/// mode) must match `machine`'s current model.
pub fn load(bytes: &[u8], machine: &mut Machine) -> Result<()> {
    if bytes.len() < HEADER_V1_LEN {
        log::warn!("z80 load failed: {} bytes is shorter than the v1 header", bytes.len());
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "z80 file shorter than the v1 header"));
    }
    let h = &bytes[..HEADER_V1_LEN];
    let r7 = h[11];
    let flags1 = if r7 == 0xff { 1 } else { r7 };
    let border = (flags1 >> 1) & 0x07;
    machine.ula_mut().set_border(border);
    let cpu = machine.cpu_mut();
    cpu.registers.af.set(u16::from_le_bytes([h[0], h[1]]));
    cpu.registers.bc.set(u16::from_le_bytes([h[2], h[3]]));
    cpu.registers.hl.set(u16::from_le_bytes([h[4], h[5]]));
    let mut pc = u16::from_le_bytes([h[6], h[7]]);
    cpu.registers.sp = u16::from_le_bytes([h[8], h[9]]);
    cpu.registers.ir.high = h[10];
    cpu.registers.ir.low = (flags1 & 1) << 7 | (r7 & 0x7f);
    cpu.registers.de.set(u16::from_le_bytes([h[13], h[14]]));
    cpu.registers.bc2.set(u16::from_le_bytes([h[15], h[16]]));
    cpu.registers.de2.set(u16::from_le_bytes([h[17], h[18]]));
    cpu.registers.hl2.set(u16::from_le_bytes([h[19], h[20]]));
    cpu.registers.af2.set(u16::from_le_bytes([h[21], h[22]]));
    cpu.registers.iy.set(u16::from_le_bytes([h[23], h[24]]));
    cpu.registers.ix.set(u16::from_le_bytes([h[25], h[26]]));
    cpu.registers.iff1 = h[27] != 0;
    cpu.registers.iff2 = h[28] != 0;
    cpu.registers.im = match h[29] & 0x03 {
        0 => InterruptMode::Im0,
        1 => InterruptMode::Im1,
        _ => InterruptMode::Im2,
    };

    let mut cursor = HEADER_V1_LEN;
    let (version, model, ay_state) = if pc != 0 {
        (1u8, Model::Spectrum48k, None)
    } else {
        if bytes.len() < cursor + 2 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated extended header length"));
        }
        let ext_len = u16::from_le_bytes([bytes[cursor], bytes[cursor + 1]]) as usize;
        cursor += 2;
        if bytes.len() < cursor + ext_len {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated extended header"));
        }
        let ext = &bytes[cursor..cursor + ext_len];
        cursor += ext_len;
        let version = match ext_len {
            23 => 2,
            54 | 55 => 3,
            _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "unrecognized z80 extended header length")),
        };
        pc = u16::from_le_bytes([ext[0], ext[1]]);
        let hw_mode = ext[2];
        let model = if version == 2 {
            if hw_mode >= 3 { Model::Spectrum128k } else { Model::Spectrum48k }
        } else if hw_mode >= 4 {
            Model::Spectrum128k
        } else {
            Model::Spectrum48k
        };
        let port_7ffd = ext[3];
        let ay_sel = ext[6];
        let ay_regs = if ext.len() >= 23 { ext[7..23].to_vec() } else { Vec::new() };
        (version, model, Some((port_7ffd, ay_sel, ay_regs)))
    };
    cpu.registers.pc = pc;

    if model != machine.model() {
        log::warn!("z80 load failed: snapshot model {:?} does not match machine model {:?}", model, machine.model());
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "z80 snapshot's hardware model does not match the machine it is being loaded into",
        ));
    }
    log::info!("loading v{} z80 snapshot ({:?})", version, model);

    if let Some((port_7ffd, ay_sel, ay_regs)) = ay_state {
        if model == Model::Spectrum128k {
            machine.ula_mut().restore_paging(port_7ffd, false);
        }
        let ay = machine.ay_mut();
        for (reg, value) in ay_regs.iter().enumerate() {
            ay.select(reg as u8);
            ay.write_data(*value);
        }
        ay.select(ay_sel);
    }

    if version == 1 {
        let compressed = flags1 & 0x20 != 0;
        let mem_bytes = &bytes[cursor..];
        let plain = if compressed {
            let mut out = Vec::with_capacity(0xc000);
            let mut body = mem_bytes;
            if body.len() >= 4 && &body[body.len() - 4..] == [0, 0xed, 0xed, 0] {
                body = &body[..body.len() - 4];
            }
            MemDecompress::new(body).read_to_end(&mut out)?;
            out
        } else {
            mem_bytes.to_vec()
        };
        let ula = machine.ula_mut();
        // v1 only ever targets a plain 48k map: banks 5 (0x4000), 2 (0x8000), 0 (0xc000).
        let page_at = |offset: usize| -> &[u8] {
            let end = (offset + 0x4000).min(plain.len());
            if offset >= plain.len() { &[] } else { &plain[offset..end] }
        };
        ula.write_ram_bank(5, page_at(0));
        ula.write_ram_bank(2, page_at(0x4000));
        ula.write_ram_bank(0, page_at(0x8000));
        return Ok(());
    }

    let mut rest = &bytes[cursor..];
    while !rest.is_empty() {
        if rest.len() < 3 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated page header"));
        }
        let length = u16::from_le_bytes([rest[0], rest[1]]);
        let page = rest[2];
        rest = &rest[3..];
        let (data, compressed) = if length == 0xffff {
            (&rest[..0x4000], false)
        } else {
            let len = length as usize;
            if rest.len() < len {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated page data"));
            }
            (&rest[..len], true)
        };
        let plain = if compressed {
            let mut out = Vec::with_capacity(0x4000);
            MemDecompress::new(data).read_to_end(&mut out)?;
            out
        } else {
            data.to_vec()
        };
        if let Some(bank) = page_to_bank(page, model) {
            machine.ula_mut().write_ram_bank(bank, &plain);
        }
        rest = &rest[data.len()..];
    }

    Ok(())
}

/// Writes `machine`'s current state as a version 3 `.z80` snapshot.
pub fn save(machine: &Machine) -> Result<Vec<u8>> {
    let cpu = machine.cpu();
    let r = &cpu.registers;
    let model = machine.model();
    let mut out = Vec::new();

    out.extend_from_slice(&r.af.get().to_le_bytes());
    out.extend_from_slice(&r.bc.get().to_le_bytes());
    out.extend_from_slice(&r.hl.get().to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // pc == 0 signals an extended header follows
    out.extend_from_slice(&r.sp.to_le_bytes());
    out.push(r.ir.high);
    out.push(r.ir.low & 0x7f);
    let flags1 = ((r.ir.low >> 7) & 1) | (machine.ula().border() << 1);
    out.push(flags1);
    out.extend_from_slice(&r.de.get().to_le_bytes());
    out.extend_from_slice(&r.bc2.get().to_le_bytes());
    out.extend_from_slice(&r.de2.get().to_le_bytes());
    out.extend_from_slice(&r.hl2.get().to_le_bytes());
    out.extend_from_slice(&r.af2.get().to_le_bytes());
    out.extend_from_slice(&r.iy.get().to_le_bytes());
    out.extend_from_slice(&r.ix.get().to_le_bytes());
    out.push(r.iff1 as u8);
    out.push(r.iff2 as u8);
    let im = match r.im {
        InterruptMode::Im0 => 0,
        InterruptMode::Im1 => 1,
        InterruptMode::Im2 => 2,
    };
    out.push(im);
    debug_assert_eq!(out.len(), HEADER_V1_LEN);

    let mut ext = Vec::new();
    ext.extend_from_slice(&r.pc.to_le_bytes());
    let hw_mode: u8 = if model == Model::Spectrum128k { 4 } else { 0 };
    ext.push(hw_mode);
    let ula = machine.ula();
    let port_7ffd = (ula.ram_bank_index() as u8 & 0x07)
        | if ula.is_shadow_screen() { 0x08 } else { 0x00 }
        | ((ula.rom_bank_index() as u8 & 0x01) << 4)
        | if ula.is_paging_disabled() { 0x20 } else { 0x00 };
    ext.push(if model == Model::Spectrum128k { port_7ffd } else { 0 });
    ext.push(0); // last OUT to 0x1ffd (+3 paging), not modeled
    ext.push(1); // Flags3: R register emulation on
    ext.push(machine.ay().selected_register());
    ext.extend_from_slice(&machine.ay().registers_snapshot());
    ext.extend_from_slice(&[0u8; 54 - 23]); // T-state counter and MGT/DISCiPLE fields, all zeroed

    out.extend_from_slice(&(ext.len() as u16).to_le_bytes());
    out.extend_from_slice(&ext);

    let ula = machine.ula();
    let banks: &[usize] = if model == Model::Spectrum128k {
        &[0, 1, 2, 3, 4, 5, 6, 7]
    } else {
        &[5, 2, 0]
    };
    for &bank in banks {
        let data = ula.ram_bank(bank);
        let mut compressed = Vec::new();
        compress_write_all(data, &mut compressed)?;
        let (len, payload): (u16, &[u8]) = if compressed.len() < data.len() {
            (compressed.len() as u16, &compressed)
        } else {
            (data.len() as u16, data)
        };
        out.extend_from_slice(&len.to_le_bytes());
        out.push(bank_to_page(bank, model));
        out.extend_from_slice(payload);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_registers_and_memory_for_a_48k_snapshot() {
        let mut machine = Machine::new(Model::Spectrum48k);
        machine.cpu_mut().registers.af.set(0x1234);
        machine.cpu_mut().registers.pc = 0x8000;
        machine.ula_mut().write_ram_bank(0, &[0xaa; 0x4000]);

        let bytes = save(&machine).unwrap();
        let mut loaded = Machine::new(Model::Spectrum48k);
        load(&bytes, &mut loaded).unwrap();

        assert_eq!(loaded.cpu().registers.af.get(), 0x1234);
        assert_eq!(loaded.cpu().registers.pc, 0x8000);
        assert_eq!(loaded.ula().ram_bank(0)[0], 0xaa);
    }

    #[test]
    fn rejects_files_shorter_than_a_v1_header() {
        let mut machine = Machine::new(Model::Spectrum48k);
        assert!(load(&[0u8; 10], &mut machine).is_err());
    }

    #[test]
    fn round_trips_paging_state_for_a_128k_snapshot() {
        let mut machine = Machine::new(Model::Spectrum128k);
        machine.ula_mut().restore_paging(0x05, false); // ram bank 5 paged at 0xc000
        machine.ula_mut().write_ram_bank(5, &[0x33; 0x4000]);

        let bytes = save(&machine).unwrap();
        let mut loaded = Machine::new(Model::Spectrum128k);
        load(&bytes, &mut loaded).unwrap();

        assert_eq!(loaded.ula().ram_bank_index(), 5);
        assert_eq!(loaded.ula().ram_bank(5)[0], 0x33);
    }

    #[test]
    fn rejects_a_model_mismatch() {
        let mut machine48 = Machine::new(Model::Spectrum48k);
        let machine128 = Machine::new(Model::Spectrum128k);
        let bytes = save(&machine128).unwrap();
        assert!(load(&bytes, &mut machine48).is_err());
    }
}
