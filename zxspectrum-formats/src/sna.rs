//! **SNA** snapshot format: a fixed 27-byte register header followed by a
//! flat RAM dump, in a 48k and a 128k-extended variant.
//!
//! ```text
//! 48k SNA (49179 bytes total)
//! offset size  field
//!      0    1  I
//!      1    6  HL', DE', BC'
//!      7    2  AF'
//!      9    6  HL, DE, BC
//!     15    4  IY, IX
//!     19    1  interrupt flags: bit0=IFF2 (IFF1 mirrors it), bit2=IM mode bit
//!     20    1  R
//!     21    4  AF, SP
//!     25    1  interrupt mode (0, 1 or 2)
//!     26    1  border color
//!     27 49152 RAM 0x4000..=0xffff
//! ```
//!
//! The 128k variant appends pages 1/2/3 (banks 5/2/current), then `PC`,
//! the last `0x7ffd` OUT byte, a TR-DOS paged flag, and the remaining
//! banks in ascending order. `PC` has to come from the file rather than
//! the stack top, since loading the `RETN`-based trick the 48k format
//! relies on isn't meaningful once bank 3 at `0xc000` may not be bank 0.

use std::io::{self, Result};

use zxspectrum_core::cpu::Bus;
use zxspectrum_core::ula::Model;
use zxspectrum_core::Machine;

const HEADER_LEN: usize = 27;
const PAGE_SIZE: usize = 0x4000;
const SNA48_LEN: usize = HEADER_LEN + 3 * PAGE_SIZE;

/// Loads a `.sna` snapshot into `machine`. The model is inferred from the
/// file size (48k plain dump vs. 128k extended), and `machine` is left
/// with that model's paging already restored.
pub fn load(bytes: &[u8], machine: &mut Machine) -> Result<()> {
    if bytes.len() < SNA48_LEN {
        log::warn!("sna load failed: {} bytes is shorter than a 48k dump", bytes.len());
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "sna file shorter than a 48k dump"));
    }
    let h = &bytes[..HEADER_LEN];
    let cpu = machine.cpu_mut();
    cpu.registers.ir.high = h[0];
    cpu.registers.hl2.set(u16::from_le_bytes([h[1], h[2]]));
    cpu.registers.de2.set(u16::from_le_bytes([h[3], h[4]]));
    cpu.registers.bc2.set(u16::from_le_bytes([h[5], h[6]]));
    cpu.registers.af2.set(u16::from_le_bytes([h[7], h[8]]));
    cpu.registers.hl.set(u16::from_le_bytes([h[9], h[10]]));
    cpu.registers.de.set(u16::from_le_bytes([h[11], h[12]]));
    cpu.registers.bc.set(u16::from_le_bytes([h[13], h[14]]));
    cpu.registers.iy.set(u16::from_le_bytes([h[15], h[16]]));
    cpu.registers.ix.set(u16::from_le_bytes([h[17], h[18]]));
    cpu.registers.iff2 = h[19] & 0x04 != 0;
    cpu.registers.iff1 = cpu.registers.iff2;
    cpu.registers.ir.low = h[20] & 0x7f;
    cpu.registers.af.set(u16::from_le_bytes([h[21], h[22]]));
    cpu.registers.sp = u16::from_le_bytes([h[23], h[24]]);
    cpu.registers.im = match h[25] {
        0 => zxspectrum_core::cpu::InterruptMode::Im0,
        1 => zxspectrum_core::cpu::InterruptMode::Im1,
        _ => zxspectrum_core::cpu::InterruptMode::Im2,
    };
    machine.ula_mut().set_border(h[26] & 0x07);

    let is_128k = bytes.len() > SNA48_LEN;
    log::info!("loading {} sna snapshot ({} bytes)", if is_128k { "128k" } else { "48k" }, bytes.len());
    if !is_128k {
        if machine.model() != Model::Spectrum48k {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "48k sna loaded into a 128k machine"));
        }
        let dump = &bytes[HEADER_LEN..SNA48_LEN];
        machine.ula_mut().write_ram_bank(5, &dump[0..PAGE_SIZE]);
        machine.ula_mut().write_ram_bank(2, &dump[PAGE_SIZE..2 * PAGE_SIZE]);
        machine.ula_mut().write_ram_bank(0, &dump[2 * PAGE_SIZE..3 * PAGE_SIZE]);
        // 48k SNA has no PC field: it's recovered by popping the word the
        // saver pushed onto the stack before dumping memory.
        let sp = machine.cpu().registers.sp;
        let ula = machine.ula_mut();
        let lo = ula.read(sp);
        let hi = ula.read(sp.wrapping_add(1));
        machine.cpu_mut().registers.pc = u16::from_le_bytes([lo, hi]);
        machine.cpu_mut().registers.sp = sp.wrapping_add(2);
        return Ok(());
    }

    if machine.model() != Model::Spectrum128k {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "128k sna loaded into a 48k machine"));
    }
    let mut cursor = SNA48_LEN;
    let page5 = &bytes[cursor..cursor + PAGE_SIZE];
    cursor += PAGE_SIZE;
    let page2 = &bytes[cursor..cursor + PAGE_SIZE];
    cursor += PAGE_SIZE;
    let current_page_dump = &bytes[cursor..cursor + PAGE_SIZE];
    cursor += PAGE_SIZE;
    if bytes.len() < cursor + 4 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated 128k sna tail"));
    }
    let pc = u16::from_le_bytes([bytes[cursor], bytes[cursor + 1]]);
    let port_7ffd = bytes[cursor + 2];
    cursor += 4; // skip TR-DOS paged flag
    machine.cpu_mut().registers.pc = pc;
    machine.ula_mut().restore_paging(port_7ffd, false);
    let current_bank = (port_7ffd & 0x07) as usize;

    machine.ula_mut().write_ram_bank(5, page5);
    machine.ula_mut().write_ram_bank(2, page2);
    machine.ula_mut().write_ram_bank(current_bank, current_page_dump);

    for bank in 0..8usize {
        if bank == 5 || bank == 2 || bank == current_bank {
            continue;
        }
        if bytes.len() < cursor + PAGE_SIZE {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated remaining 128k page"));
        }
        machine.ula_mut().write_ram_bank(bank, &bytes[cursor..cursor + PAGE_SIZE]);
        cursor += PAGE_SIZE;
    }

    Ok(())
}

/// Writes `machine`'s current state as a `.sna` snapshot: plain 48k format
/// for a 48k machine, the 128k-extended format otherwise.
pub fn save(machine: &Machine) -> Vec<u8> {
    let cpu = machine.cpu();
    let r = &cpu.registers;
    let mut out = Vec::with_capacity(SNA48_LEN);
    out.push(r.ir.high);
    out.extend_from_slice(&r.hl2.get().to_le_bytes());
    out.extend_from_slice(&r.de2.get().to_le_bytes());
    out.extend_from_slice(&r.bc2.get().to_le_bytes());
    out.extend_from_slice(&r.af2.get().to_le_bytes());
    out.extend_from_slice(&r.hl.get().to_le_bytes());
    out.extend_from_slice(&r.de.get().to_le_bytes());
    out.extend_from_slice(&r.bc.get().to_le_bytes());
    out.extend_from_slice(&r.iy.get().to_le_bytes());
    out.extend_from_slice(&r.ix.get().to_le_bytes());
    out.push(if r.iff2 { 0x04 } else { 0x00 });
    out.push(r.ir.low & 0x7f);
    out.extend_from_slice(&r.af.get().to_le_bytes());
    out.extend_from_slice(&r.sp.to_le_bytes());
    out.push(match r.im {
        zxspectrum_core::cpu::InterruptMode::Im0 => 0,
        zxspectrum_core::cpu::InterruptMode::Im1 => 1,
        zxspectrum_core::cpu::InterruptMode::Im2 => 2,
    });
    out.push(machine.ula().border());
    debug_assert_eq!(out.len(), HEADER_LEN);

    let ula = machine.ula();

    if machine.model() == Model::Spectrum48k {
        // SNA carries no PC field: the saver pushes it onto the stack so
        // the loader can pop it back off.
        let mut flat = Vec::with_capacity(3 * PAGE_SIZE);
        flat.extend_from_slice(ula.ram_bank(5));
        flat.extend_from_slice(ula.ram_bank(2));
        flat.extend_from_slice(ula.ram_bank(0));
        let new_sp = r.sp.wrapping_sub(2);
        let patch_at = (new_sp.wrapping_sub(0x4000)) as usize;
        if patch_at + 1 < flat.len() {
            let [lo, hi] = r.pc.to_le_bytes();
            flat[patch_at] = lo;
            flat[patch_at + 1] = hi;
        }
        out[23..25].copy_from_slice(&new_sp.to_le_bytes());
        out.extend_from_slice(&flat);
        return out;
    }

    out.extend_from_slice(ula.ram_bank(5));
    out.extend_from_slice(ula.ram_bank(2));

    let current_bank = ula.ram_bank_index();
    out.extend_from_slice(ula.ram_bank(current_bank));
    out.extend_from_slice(&r.pc.to_le_bytes());
    let port_7ffd = (current_bank as u8 & 0x07)
        | if ula.is_shadow_screen() { 0x08 } else { 0x00 }
        | ((ula.rom_bank_index() as u8 & 0x01) << 4)
        | if ula.is_paging_disabled() { 0x20 } else { 0x00 };
    out.push(port_7ffd);
    out.push(0); // TR-DOS ROM not paged
    for bank in 0..8usize {
        if bank == 5 || bank == 2 || bank == current_bank {
            continue;
        }
        out.extend_from_slice(ula.ram_bank(bank));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_48k_snapshot() {
        let mut machine = Machine::new(Model::Spectrum48k);
        machine.cpu_mut().registers.af.set(0xcafe);
        machine.ula_mut().write_ram_bank(5, &[0x11; PAGE_SIZE]);

        let bytes = save(&machine);
        assert_eq!(bytes.len(), SNA48_LEN);

        let mut loaded = Machine::new(Model::Spectrum48k);
        load(&bytes, &mut loaded).unwrap();
        assert_eq!(loaded.cpu().registers.af.get(), 0xcafe);
        assert_eq!(loaded.ula().ram_bank(5)[0], 0x11);
    }

    #[test]
    fn round_trips_a_128k_snapshot_with_paging() {
        let mut machine = Machine::new(Model::Spectrum128k);
        machine.ula_mut().restore_paging(0x03, false); // ram bank 3 paged in
        machine.ula_mut().write_ram_bank(3, &[0x22; PAGE_SIZE]);
        machine.cpu_mut().registers.pc = 0x4000;

        let bytes = save(&machine);
        let mut loaded = Machine::new(Model::Spectrum128k);
        load(&bytes, &mut loaded).unwrap();

        assert_eq!(loaded.ula().ram_bank_index(), 3);
        assert_eq!(loaded.ula().ram_bank(3)[0], 0x22);
        assert_eq!(loaded.cpu().registers.pc, 0x4000);
    }

    #[test]
    fn rejects_a_48k_file_loaded_into_a_128k_machine() {
        let machine48 = Machine::new(Model::Spectrum48k);
        let bytes = save(&machine48);
        let mut machine128 = Machine::new(Model::Spectrum128k);
        assert!(load(&bytes, &mut machine128).is_err());
    }
}
