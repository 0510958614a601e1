//! Banked memory and the 128K paging port (§4.2). Bank layout follows the
//! real hardware numbering (RAM banks 0-7, ROM banks 0-1) rather than a
//! linear address space, so paging is just picking which bank backs a
//! 16K window.

const BANK_SIZE: usize = 0x4000;

/// `serde` support for `[[u8; N]; M]`: serde's built-in array impls only
/// cover lengths up to 32, and that limit applies at every nesting level,
/// so neither `serde_big_array` nor a plain derive can handle a bank array
/// whose element type is itself an oversized array.
#[cfg(feature = "snapshot")]
mod banked_bytes {
    use serde::de::{Error as _, SeqAccess, Visitor};
    use serde::ser::SerializeTuple;
    use serde::{Deserializer, Serializer};
    use std::fmt;
    use std::marker::PhantomData;

    pub fn serialize<S, const N: usize, const M: usize>(
        banks: &[[u8; N]; M],
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tup = serializer.serialize_tuple(N * M)?;
        for bank in banks.iter() {
            for byte in bank.iter() {
                tup.serialize_element(byte)?;
            }
        }
        tup.end()
    }

    struct BankedBytesVisitor<const N: usize, const M: usize>(PhantomData<[[u8; N]; M]>);

    impl<'de, const N: usize, const M: usize> Visitor<'de> for BankedBytesVisitor<N, M> {
        type Value = [[u8; N]; M];

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "an array of {} bytes", N * M)
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut out = [[0u8; N]; M];
            for (i, bank) in out.iter_mut().enumerate() {
                for (j, byte) in bank.iter_mut().enumerate() {
                    *byte = seq
                        .next_element()?
                        .ok_or_else(|| A::Error::invalid_length(i * N + j, &self))?;
                }
            }
            Ok(out)
        }
    }

    pub fn deserialize<'de, D, const N: usize, const M: usize>(
        deserializer: D,
    ) -> Result<[[u8; N]; M], D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_tuple(N * M, BankedBytesVisitor::<N, M>(PhantomData))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "snapshot", derive(serde::Serialize, serde::Deserialize))]
pub enum Model {
    Spectrum48k,
    Spectrum128k,
}

#[derive(Clone)]
#[cfg_attr(feature = "snapshot", derive(serde::Serialize, serde::Deserialize))]
pub struct Memory {
    model: Model,
    #[cfg_attr(feature = "snapshot", serde(with = "banked_bytes"))]
    rom: [[u8; BANK_SIZE]; 2],
    #[cfg_attr(feature = "snapshot", serde(with = "banked_bytes"))]
    ram: [[u8; BANK_SIZE]; 8],
    rom_bank: usize,
    ram_bank: usize,
    shadow_screen: bool,
    paging_disabled: bool,
}

impl Memory {
    pub fn new(model: Model) -> Self {
        Memory {
            model,
            rom: [[0; BANK_SIZE]; 2],
            ram: [[0; BANK_SIZE]; 8],
            rom_bank: 0,
            ram_bank: 0,
            shadow_screen: false,
            paging_disabled: false,
        }
    }

    pub fn reset(&mut self) {
        self.rom_bank = 0;
        self.ram_bank = 0;
        self.shadow_screen = false;
        self.paging_disabled = false;
    }

    pub fn load_rom(&mut self, bank: usize, data: &[u8]) {
        let len = data.len().min(BANK_SIZE);
        self.rom[bank][..len].copy_from_slice(&data[..len]);
    }

    /// The RAM bank currently displayed (5, or 7 when shadow-screen paged
    /// in on a 128K model).
    pub fn screen_bank(&self) -> usize {
        if self.model == Model::Spectrum128k && self.shadow_screen { 7 } else { 5 }
    }

    pub fn screen_ram(&self) -> &[u8; BANK_SIZE] {
        &self.ram[self.screen_bank()]
    }

    pub fn read(&self, addr: u16) -> u8 {
        let (bank, is_rom, offset) = self.decode(addr);
        if is_rom { self.rom[bank][offset] } else { self.ram[bank][offset] }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        let (bank, is_rom, offset) = self.decode(addr);
        if !is_rom {
            self.ram[bank][offset] = value;
        }
    }

    /// Raw contents of a RAM bank (0..=7), independent of current paging.
    /// Used by snapshot formats, which address banks directly rather than
    /// through the paged 16K windows.
    pub fn ram_bank(&self, bank: usize) -> &[u8; BANK_SIZE] {
        &self.ram[bank]
    }

    /// Overwrites a RAM bank's contents wholesale; `data` shorter than the
    /// bank is zero-padded, longer is truncated.
    pub fn write_ram_bank(&mut self, bank: usize, data: &[u8]) {
        let len = data.len().min(BANK_SIZE);
        self.ram[bank][..len].copy_from_slice(&data[..len]);
        self.ram[bank][len..].fill(0);
    }

    pub fn rom_bank_index(&self) -> usize {
        self.rom_bank
    }

    pub fn ram_bank_index(&self) -> usize {
        self.ram_bank
    }

    pub fn is_shadow_screen(&self) -> bool {
        self.shadow_screen
    }

    pub fn is_paging_disabled(&self) -> bool {
        self.paging_disabled
    }

    pub fn model(&self) -> Model {
        self.model
    }

    /// Restores the `0x7FFD` paging state directly, as recorded in a
    /// snapshot, bypassing the port-address decode `paging_port_write` does.
    pub fn restore_paging(&mut self, value: u8, disabled: bool) {
        if self.model != Model::Spectrum128k {
            return;
        }
        self.ram_bank = (value & 0x07) as usize;
        self.shadow_screen = value & 0x08 != 0;
        self.rom_bank = ((value >> 4) & 0x01) as usize;
        self.paging_disabled = disabled;
    }

    fn decode(&self, addr: u16) -> (usize, bool, usize) {
        let offset = (addr as usize) & (BANK_SIZE - 1);
        match addr {
            0x0000..=0x3fff => (self.rom_bank, true, offset),
            0x4000..=0x7fff => (5, false, offset),
            0x8000..=0xbfff => (2, false, offset),
            _ => {
                let bank = if self.model == Model::Spectrum128k { self.ram_bank } else { 0 };
                (bank, false, offset)
            }
        }
    }

    /// `0x7FFD`-style paging port decode: bit 1 and bit 15 of the port
    /// address must both be clear.
    fn is_paging_port(port: u16) -> bool {
        port & 0b1000_0000_0000_0010 == 0
    }

    pub fn paging_port_write(&mut self, port: u16, value: u8) {
        if self.model != Model::Spectrum128k || self.paging_disabled || !Self::is_paging_port(port) {
            return;
        }
        self.ram_bank = (value & 0x07) as usize;
        self.shadow_screen = value & 0x08 != 0;
        self.rom_bank = ((value >> 4) & 0x01) as usize;
        if value & 0x20 != 0 {
            self.paging_disabled = true;
        }
    }

    /// Reading the paging port yields no dedicated value: it falls through
    /// to the floating bus, same as any other unassigned I/O address.
    pub fn paging_port_read(&self, port: u16) -> Option<u8> {
        if self.model == Model::Spectrum128k && Self::is_paging_port(port) {
            None
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rom_writes_are_ignored() {
        let mut mem = Memory::new(Model::Spectrum48k);
        mem.write(0x0000, 0xaa);
        assert_eq!(mem.read(0x0000), 0);
    }

    #[test]
    fn paging_port_selects_ram_bank_and_screen() {
        let mut mem = Memory::new(Model::Spectrum128k);
        mem.paging_port_write(0x7ffd, 0b0000_1011);
        assert_eq!(mem.ram_bank, 3);
        assert!(mem.shadow_screen);
        mem.write(0xc000, 0x42);
        assert_eq!(mem.read(0xc000), 0x42);
    }

    #[test]
    fn paging_latch_locks_further_writes() {
        let mut mem = Memory::new(Model::Spectrum128k);
        mem.paging_port_write(0x7ffd, 0x20);
        mem.paging_port_write(0x7ffd, 0x05);
        assert_eq!(mem.ram_bank, 0);
    }

    #[test]
    fn model_48k_ignores_paging_port() {
        let mut mem = Memory::new(Model::Spectrum48k);
        mem.paging_port_write(0x7ffd, 0x07);
        assert_eq!(mem.ram_bank, 0);
    }

    #[test]
    fn first_write_with_the_lock_bit_set_pages_and_then_ignores_later_writes() {
        // bit5 (0x20) is the lock bit, bits0-2 select the RAM bank: 0x27
        // pages in bank 7 and sets the lock in the same write.
        let mut mem = Memory::new(Model::Spectrum128k);
        mem.paging_port_write(0x7ffd, 0x27);
        assert_eq!(mem.ram_bank, 7);
        assert!(mem.paging_disabled);
        mem.paging_port_write(0x7ffd, 0x07);
        assert_eq!(mem.ram_bank, 7);
    }
}
