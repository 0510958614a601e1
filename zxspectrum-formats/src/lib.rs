//! Snapshot (`.sna`, `.z80`) and tape (`.tap`, `.tzx`) file formats for the
//! zxspectrum emulator, read and written directly against
//! [`zxspectrum_core::Machine`].

pub mod sna;
pub mod tap;
pub mod tzx;
pub mod z80;
