//! Wires the CPU, ULA and AY together into one clockable machine and
//! exposes the frame-level API (§4.4, §6): `clock`/`frame`/audio/video
//! readout and snapshot-facing accessors.

use crate::audio::{RingBuffer, SoundSample};
use crate::ay::Ay;
use crate::cpu::{Bus, Cpu};
use crate::tape::Tape;
use crate::ula::{Model, Rgba, Ula};

const AY_SELECT_PORT: u16 = 0xFFFD;
const AY_DATA_WRITE_PORT: u16 = 0xBFFD;

/// Default host sample rate audio is resampled to on push into the ring
/// buffer (§4.4).
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
const CPU_HZ: u32 = 3_500_000;

struct MachineBus<'a> {
    ula: &'a mut Ula,
    ay: &'a mut Ay,
}

impl<'a> Bus for MachineBus<'a> {
    fn read(&mut self, addr: u16) -> u8 {
        self.ula.read(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.ula.write(addr, value);
    }

    fn io_read(&mut self, port: u16) -> u8 {
        if port == AY_SELECT_PORT {
            self.ay.read_data()
        } else {
            self.ula.io_read(port)
        }
    }

    fn io_write(&mut self, port: u16, value: u8) {
        if port == AY_SELECT_PORT {
            self.ay.select(value);
        } else if port == AY_DATA_WRITE_PORT {
            self.ay.write_data(value);
        } else {
            self.ula.io_write(port, value);
        }
    }

    fn irq(&self) -> bool {
        self.ula.irq()
    }
}

/// A complete ZX Spectrum: Z80 core, ULA and AY-3-8910, plus the audio
/// ring buffer samples are pushed into as the frame runs.
pub struct Machine {
    cpu: Cpu,
    ula: Ula,
    ay: Ay,
    tape: Tape,
    audio: RingBuffer,
    sample_rate: u32,
    /// Fixed-point accumulator (in master ticks scaled by `sample_rate`)
    /// deciding when the next audio sample is due.
    sample_error: u32,
    /// The AY advances once every two master ticks (§4.3); this toggles on
    /// every `clock()` call to pick out every other one.
    ay_tick: bool,
}

impl Machine {
    pub fn new(model: Model) -> Self {
        Machine::with_sample_rate(model, DEFAULT_SAMPLE_RATE)
    }

    pub fn with_sample_rate(model: Model, sample_rate: u32) -> Self {
        Machine {
            cpu: Cpu::new(),
            ula: Ula::new(model),
            ay: Ay::new(),
            tape: Tape::empty(),
            audio: RingBuffer::new(4096),
            sample_rate,
            sample_error: 0,
            ay_tick: false,
        }
    }

    pub fn load_rom(&mut self, bank: usize, data: &[u8]) {
        self.ula.load_rom(bank, data);
    }

    /// Replaces the currently playing tape (if any) with one compiled from
    /// `pulses`, in master-clock ticks (§4.5).
    pub fn load_tape(&mut self, pulses: Vec<u32>) {
        self.tape = Tape::new(pulses);
    }

    pub fn is_tape_playing(&self) -> bool {
        self.tape.is_playing()
    }

    pub fn reset(&mut self) {
        log::debug!("machine reset");
        self.cpu.reset();
        self.ula.reset();
        self.ay.reset();
        self.sample_error = 0;
        self.ay_tick = false;
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn ula(&self) -> &Ula {
        &self.ula
    }

    pub fn ula_mut(&mut self) -> &mut Ula {
        &mut self.ula
    }

    pub fn ay(&self) -> &Ay {
        &self.ay
    }

    pub fn ay_mut(&mut self) -> &mut Ay {
        &mut self.ay
    }

    pub fn model(&self) -> Model {
        self.ula.model()
    }

    pub fn screen_buffer(&self) -> &[Rgba] {
        self.ula.screen_buffer()
    }

    pub fn audio_buffer(&self) -> &RingBuffer {
        &self.audio
    }

    /// Advances the whole machine by exactly one master tick (§4.4).
    pub fn clock(&mut self) {
        let mut bus = MachineBus { ula: &mut self.ula, ay: &mut self.ay };
        self.cpu.clock(&mut bus, false);
        self.ula.tick();
        self.ula.set_ear_in(self.tape.level());

        self.ay_tick = !self.ay_tick;
        if self.ay_tick {
            self.ay.clock();
        }

        self.sample_error += self.sample_rate;
        if self.sample_error >= CPU_HZ {
            self.sample_error -= CPU_HZ;
            self.audio.push(self.current_audio_sample());
        }

        self.tape.advance();
    }

    /// Runs exactly one frame's worth of master ticks
    /// ([`crate::ula::FRAME_CLOCKS`]).
    pub fn frame(&mut self) {
        for _ in 0..crate::ula::FRAME_CLOCKS {
            self.clock();
        }
    }

    /// The ULA's beeper/tape contribution mixed with the AY's (128K only,
    /// per §4.2/§4.3).
    fn current_audio_sample(&self) -> SoundSample {
        let ay_level = if self.model() == Model::Spectrum128k { self.ay.mix() } else { 0.0 };
        SoundSample::mono(self.ula.audio_out() + ay_level)
    }

    /// Advances the machine, if needed, until a host sample period has
    /// elapsed, and returns the resulting audio-out sample (§4.4).
    pub fn generate_audio_sample(&mut self) -> SoundSample {
        loop {
            if let Some(sample) = self.audio.pop() {
                return sample;
            }
            self.clock();
        }
    }

    pub fn key_event(&mut self, half_row: usize, mask: u8) {
        self.ula.set_key_row(half_row, mask);
    }

    pub fn set_kempston(&mut self, up: bool, down: bool, left: bool, right: bool, fire: bool) {
        self.ula.set_kempston(up, down, left, right, fire);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_frame_advances_the_cpu_clock_counter_by_frame_clocks() {
        let mut machine = Machine::new(Model::Spectrum48k);
        machine.frame();
        assert_eq!(machine.cpu().cycle_counter(), u64::from(crate::ula::FRAME_CLOCKS));
    }

    #[test]
    fn resetting_clears_cycle_counter_and_audio_backlog() {
        let mut machine = Machine::new(Model::Spectrum48k);
        machine.frame();
        machine.reset();
        assert_eq!(machine.cpu().cycle_counter(), 0);
    }

    #[test]
    fn generate_audio_sample_reflects_the_ula_beeper_output() {
        let mut machine = Machine::new(Model::Spectrum48k);
        Bus::io_write(machine.ula_mut(), 0xfe, 0x10); // EAR high
        let sample = machine.generate_audio_sample();
        assert!((sample.left - 0.8).abs() < 1e-6);
        assert_eq!(sample.left, sample.right);
    }

    #[test]
    fn tape_level_reaches_the_ula_ear_in_latch_after_its_first_pulse_expires() {
        let mut machine = Machine::new(Model::Spectrum48k);
        machine.load_tape(vec![5, 5]);
        assert!(machine.is_tape_playing());
        for _ in 0..6 {
            machine.clock();
        }
        let v = Bus::io_read(machine.ula_mut(), 0xfffe);
        assert_eq!(v & 0x40, 0x40);
    }

    #[test]
    fn ay_output_is_silent_on_a_48k_machine_even_with_a_loud_tone_register() {
        let mut machine = Machine::new(Model::Spectrum48k);
        machine.ay_mut().select(8);
        machine.ay_mut().write_data(0x0f);
        machine.ay_mut().select(7);
        machine.ay_mut().write_data(0xfe);
        for _ in 0..4096 {
            machine.clock();
        }
        let sample = machine.generate_audio_sample();
        assert_eq!(sample.left, 0.0);
    }
}
