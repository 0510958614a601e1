//! Core ZX Spectrum emulation: the Z80 instruction engine, the ULA chip,
//! the AY-3-8910 sound generator, and the [`Machine`] that clocks them
//! together.

pub mod audio;
pub mod ay;
pub mod cpu;
pub mod machine;
pub mod tape;
pub mod ula;

pub use machine::Machine;
pub use tape::Tape;
pub use ula::Model;
