//! Opcode fetch/decode/execute. Uses the standard Z80 opcode decomposition
//! into `x = opcode>>6, y = (opcode>>3)&7, z = opcode&7` quadrants — the
//! same structure the original C++ source's `mainQuadrant0..3` /
//! `prefixCb`/`prefixDd`/`prefixEd`/`prefixFd` split implements.

use super::alu;
use super::bus::Bus;
use super::flags::CpuFlags;
use super::registers::IndexPrefix;
use super::Cpu;

const RP_SP: usize = 3; // rp table index for SP
const RP_AF: usize = 3; // rp2 table index for AF

#[inline]
fn fetch8(cpu: &mut Cpu, bus: &mut impl Bus) -> u8 {
    let pc = cpu.registers.pc;
    let v = bus.read(pc);
    cpu.registers.pc = pc.wrapping_add(1);
    v
}

#[inline]
fn fetch16(cpu: &mut Cpu, bus: &mut impl Bus) -> u16 {
    let lo = fetch8(cpu, bus);
    let hi = fetch8(cpu, bus);
    u16::from_le_bytes([lo, hi])
}

#[inline]
fn read16(bus: &mut impl Bus, addr: u16) -> u16 {
    let lo = bus.read(addr);
    let hi = bus.read(addr.wrapping_add(1));
    u16::from_le_bytes([lo, hi])
}

#[inline]
fn write16(bus: &mut impl Bus, addr: u16, value: u16) {
    bus.write(addr, value as u8);
    bus.write(addr.wrapping_add(1), (value >> 8) as u8);
}

#[inline]
fn push16(cpu: &mut Cpu, bus: &mut impl Bus, value: u16) {
    cpu.registers.sp = cpu.registers.sp.wrapping_sub(2);
    let sp = cpu.registers.sp;
    write16(bus, sp, value);
}

#[inline]
fn pop16(cpu: &mut Cpu, bus: &mut impl Bus) -> u16 {
    let sp = cpu.registers.sp;
    let v = read16(bus, sp);
    cpu.registers.sp = sp.wrapping_add(2);
    v
}

/// Reads one of the 8 register-table slots (B,C,D,E,H,L,(HL),A), honoring
/// an IX/IY substitution on H/L/(HL). `disp` is the already-fetched
/// displacement byte for a prefixed `(HL)`/`(IX+d)`/`(IY+d)` access.
fn reg8_get(cpu: &mut Cpu, bus: &mut impl Bus, prefix: IndexPrefix, idx: u8, disp: i8) -> u8 {
    match idx {
        0 => cpu.registers.b(),
        1 => cpu.registers.c(),
        2 => cpu.registers.d(),
        3 => cpu.registers.e(),
        4 => match prefix {
            IndexPrefix::None => cpu.registers.h(),
            IndexPrefix::Ix => cpu.registers.ix.high,
            IndexPrefix::Iy => cpu.registers.iy.high,
        },
        5 => match prefix {
            IndexPrefix::None => cpu.registers.l(),
            IndexPrefix::Ix => cpu.registers.ix.low,
            IndexPrefix::Iy => cpu.registers.iy.low,
        },
        6 => {
            let base = cpu.registers.indexed_hl(prefix);
            let addr = if prefix == IndexPrefix::None {
                base
            } else {
                base.wrapping_add(disp as i16 as u16)
            };
            bus.read(addr)
        }
        _ => cpu.registers.a(),
    }
}

fn reg8_set(cpu: &mut Cpu, bus: &mut impl Bus, prefix: IndexPrefix, idx: u8, disp: i8, value: u8) {
    match idx {
        0 => cpu.registers.set_b(value),
        1 => cpu.registers.set_c(value),
        2 => cpu.registers.set_d(value),
        3 => cpu.registers.set_e(value),
        4 => match prefix {
            IndexPrefix::None => cpu.registers.set_h(value),
            IndexPrefix::Ix => cpu.registers.ix.high = value,
            IndexPrefix::Iy => cpu.registers.iy.high = value,
        },
        5 => match prefix {
            IndexPrefix::None => cpu.registers.set_l(value),
            IndexPrefix::Ix => cpu.registers.ix.low = value,
            IndexPrefix::Iy => cpu.registers.iy.low = value,
        },
        6 => {
            let base = cpu.registers.indexed_hl(prefix);
            let addr = if prefix == IndexPrefix::None {
                base
            } else {
                base.wrapping_add(disp as i16 as u16)
            };
            bus.write(addr, value);
        }
        _ => cpu.registers.set_a(value),
    }
}

fn rp_get(cpu: &Cpu, prefix: IndexPrefix, p: u8) -> u16 {
    match p {
        0 => cpu.registers.bc.get(),
        1 => cpu.registers.de.get(),
        2 => cpu.registers.indexed_hl(prefix),
        _ => cpu.registers.sp,
    }
}

fn rp_set(cpu: &mut Cpu, prefix: IndexPrefix, p: u8, value: u16) {
    match p {
        0 => cpu.registers.bc.set(value),
        1 => cpu.registers.de.set(value),
        2 => cpu.registers.set_indexed_hl(prefix, value),
        _ => cpu.registers.sp = value,
    }
}

fn rp2_get(cpu: &Cpu, prefix: IndexPrefix, p: u8) -> u16 {
    match p {
        0 => cpu.registers.bc.get(),
        1 => cpu.registers.de.get(),
        2 => cpu.registers.indexed_hl(prefix),
        _ => cpu.registers.af.get(),
    }
}

fn rp2_set(cpu: &mut Cpu, prefix: IndexPrefix, p: u8, value: u16) {
    match p {
        0 => cpu.registers.bc.set(value),
        1 => cpu.registers.de.set(value),
        2 => cpu.registers.set_indexed_hl(prefix, value),
        _ => cpu.registers.af.set(value),
    }
}

fn eval_condition(cpu: &Cpu, y: u8) -> bool {
    let f = cpu.registers.f();
    match y {
        0 => !f.contains(CpuFlags::Z),
        1 => f.contains(CpuFlags::Z),
        2 => !f.contains(CpuFlags::C),
        3 => f.contains(CpuFlags::C),
        4 => !f.contains(CpuFlags::P),
        5 => f.contains(CpuFlags::P),
        6 => !f.contains(CpuFlags::S),
        _ => f.contains(CpuFlags::S),
    }
}

fn apply_alu(cpu: &mut Cpu, op: u8, operand: u8) {
    let a = cpu.registers.a();
    let carry = cpu.registers.f().contains(CpuFlags::C);
    let (result, f) = match op {
        0 => alu::add8(a, operand, false),
        1 => alu::add8(a, operand, carry),
        2 => alu::sub8(a, operand, false),
        3 => alu::sub8(a, operand, carry),
        4 => alu::and8(a, operand),
        5 => alu::xor8(a, operand),
        6 => alu::or8(a, operand),
        _ => {
            cpu.registers.set_f(alu::cp8(a, operand));
            return;
        }
    };
    cpu.registers.set_a(result);
    cpu.registers.set_f(f);
}

fn apply_rot(op: u8, value: u8, carry_in: bool) -> (u8, bool) {
    match op {
        0 => alu::rlc(value),
        1 => alu::rrc(value),
        2 => alu::rl(value, carry_in),
        3 => alu::rr(value, carry_in),
        4 => alu::sla(value),
        5 => alu::sra(value),
        6 => alu::sll(value),
        _ => alu::srl(value),
    }
}

/// Executes one instruction (including any DD/FD/CB/ED prefixes) and
/// returns its total T-state cost.
pub fn execute_instruction(cpu: &mut Cpu, bus: &mut impl Bus) -> u32 {
    let mut prefix = IndexPrefix::None;
    loop {
        let opcode = fetch8(cpu, bus);
        cpu.registers.bump_r();
        match opcode {
            0xDD => { prefix = IndexPrefix::Ix; continue; }
            0xFD => { prefix = IndexPrefix::Iy; continue; }
            0xCB => return exec_cb(cpu, bus, prefix),
            0xED => return exec_ed(cpu, bus),
            _ => return exec_main(cpu, bus, prefix, opcode),
        }
    }
}

fn exec_main(cpu: &mut Cpu, bus: &mut impl Bus, prefix: IndexPrefix, opcode: u8) -> u32 {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let p = y >> 1;
    let q = y & 1;

    match x {
        0 => exec_x0(cpu, bus, prefix, z, y, p, q),
        1 => {
            if z == 6 && y == 6 {
                cpu.registers.halted = true;
                cpu.registers.pc = cpu.registers.pc.wrapping_sub(1);
                4
            } else {
                let disp = if z == 6 || y == 6 { fetch_disp(cpu, bus, prefix) } else { 0 };
                let v = reg8_get(cpu, bus, prefix, z, disp);
                reg8_set(cpu, bus, prefix, y, disp, v);
                if z == 6 || y == 6 {
                    if prefix == IndexPrefix::None { 7 } else { 19 }
                } else {
                    4
                }
            }
        }
        2 => {
            let disp = if z == 6 { fetch_disp(cpu, bus, prefix) } else { 0 };
            let v = reg8_get(cpu, bus, prefix, z, disp);
            apply_alu(cpu, y, v);
            if z == 6 { if prefix == IndexPrefix::None { 7 } else { 19 } } else { 4 }
        }
        _ => exec_x3(cpu, bus, prefix, z, y, p, q),
    }
}

/// Fetches the IX/IY displacement byte that precedes a `(HL)`-family
/// memory access whenever a prefix is active; consumes nothing if not.
fn fetch_disp(cpu: &mut Cpu, bus: &mut impl Bus, prefix: IndexPrefix) -> i8 {
    if prefix == IndexPrefix::None {
        0
    } else {
        fetch8(cpu, bus) as i8
    }
}

fn exec_x0(cpu: &mut Cpu, bus: &mut impl Bus, prefix: IndexPrefix, z: u8, y: u8, p: u8, q: u8) -> u32 {
    match z {
        0 => match y {
            0 => 4, // NOP
            1 => { cpu.registers.ex_af_af(); 4 }
            2 => { // DJNZ
                let d = fetch8(cpu, bus) as i8;
                cpu.registers.set_b(cpu.registers.b().wrapping_sub(1));
                if cpu.registers.b() != 0 {
                    cpu.registers.pc = cpu.registers.pc.wrapping_add(d as i16 as u16);
                    13
                } else {
                    8
                }
            }
            3 => { // JR d
                let d = fetch8(cpu, bus) as i8;
                cpu.registers.pc = cpu.registers.pc.wrapping_add(d as i16 as u16);
                12
            }
            _ => { // JR cc,d  (y=4..7 -> cc=0..3)
                let d = fetch8(cpu, bus) as i8;
                if eval_condition(cpu, y - 4) {
                    cpu.registers.pc = cpu.registers.pc.wrapping_add(d as i16 as u16);
                    12
                } else {
                    7
                }
            }
        },
        1 => {
            if q == 0 {
                let nn = fetch16(cpu, bus);
                rp_set(cpu, prefix, p, nn);
                10
            } else {
                let hl = rp_get(cpu, prefix, 2);
                let rp = rp_get(cpu, prefix, p);
                let f = cpu.registers.f();
                let (result, nf) = alu::add16(hl, rp, f);
                rp_set(cpu, prefix, 2, result);
                cpu.registers.set_f(nf);
                11
            }
        }
        2 => {
            match (p, q) {
                (0, 0) => { bus.write(cpu.registers.bc.get(), cpu.registers.a()); 7 }
                (0, 1) => { cpu.registers.set_a(bus.read(cpu.registers.bc.get())); 7 }
                (1, 0) => { bus.write(cpu.registers.de.get(), cpu.registers.a()); 7 }
                (1, 1) => { cpu.registers.set_a(bus.read(cpu.registers.de.get())); 7 }
                (2, 0) => { let nn = fetch16(cpu, bus); write16(bus, nn, rp_get(cpu, prefix, 2)); 16 }
                (2, 1) => { let nn = fetch16(cpu, bus); let v = read16(bus, nn); rp_set(cpu, prefix, 2, v); 16 }
                (3, 0) => { let nn = fetch16(cpu, bus); bus.write(nn, cpu.registers.a()); 13 }
                _ => { let nn = fetch16(cpu, bus); cpu.registers.set_a(bus.read(nn)); 13 }
            }
        }
        3 => {
            let rp = rp_get(cpu, prefix, p);
            rp_set(cpu, prefix, p, if q == 0 { rp.wrapping_add(1) } else { rp.wrapping_sub(1) });
            6
        }
        4 | 5 => {
            let disp = if y == 6 { fetch_disp(cpu, bus, prefix) } else { 0 };
            let v = reg8_get(cpu, bus, prefix, y, disp);
            let old_c = cpu.registers.f().contains(CpuFlags::C);
            let (result, f) = if z == 4 { alu::inc8(v, old_c) } else { alu::dec8(v, old_c) };
            reg8_set(cpu, bus, prefix, y, disp, result);
            cpu.registers.set_f(f);
            if y == 6 { if prefix == IndexPrefix::None { 11 } else { 23 } } else { 4 }
        }
        6 => {
            let disp = if y == 6 { fetch_disp(cpu, bus, prefix) } else { 0 };
            let n = fetch8(cpu, bus);
            reg8_set(cpu, bus, prefix, y, disp, n);
            if y == 6 { if prefix == IndexPrefix::None { 10 } else { 19 } } else { 7 }
        }
        _ => match y {
            0 => { let (r, c) = alu::rlc(cpu.registers.a()); cpu.registers.set_a(r); set_rot_a_flags(cpu, c); 4 }
            1 => { let (r, c) = alu::rrc(cpu.registers.a()); cpu.registers.set_a(r); set_rot_a_flags(cpu, c); 4 }
            2 => { let old_c = cpu.registers.f().contains(CpuFlags::C); let (r, c) = alu::rl(cpu.registers.a(), old_c); cpu.registers.set_a(r); set_rot_a_flags(cpu, c); 4 }
            3 => { let old_c = cpu.registers.f().contains(CpuFlags::C); let (r, c) = alu::rr(cpu.registers.a(), old_c); cpu.registers.set_a(r); set_rot_a_flags(cpu, c); 4 }
            4 => { let (r, f) = alu::daa(cpu.registers.a(), cpu.registers.f()); cpu.registers.set_a(r); cpu.registers.set_f(f); 4 }
            5 => { let (r, f) = alu::cpl(cpu.registers.a(), cpu.registers.f()); cpu.registers.set_a(r); cpu.registers.set_f(f); 4 }
            6 => { let f = alu::scf(cpu.registers.a(), cpu.registers.f()); cpu.registers.set_f(f); 4 }
            _ => { let f = alu::ccf(cpu.registers.a(), cpu.registers.f()); cpu.registers.set_f(f); 4 }
        },
    }
}

#[inline]
fn set_rot_a_flags(cpu: &mut Cpu, carry: bool) {
    let a = cpu.registers.a();
    let mut f = cpu.registers.f() & (CpuFlags::S | CpuFlags::Z | CpuFlags::P);
    f.set(CpuFlags::Y, a & 0x20 != 0);
    f.set(CpuFlags::X, a & 0x08 != 0);
    f.set(CpuFlags::C, carry);
    cpu.registers.set_f(f);
}

fn exec_x3(cpu: &mut Cpu, bus: &mut impl Bus, prefix: IndexPrefix, z: u8, y: u8, p: u8, q: u8) -> u32 {
    match z {
        0 => {
            if eval_condition(cpu, y) {
                cpu.registers.pc = pop16(cpu, bus);
                11
            } else {
                6
            }
        }
        1 => {
            if q == 0 {
                let v = pop16(cpu, bus);
                rp2_set(cpu, prefix, p, v);
                10
            } else {
                match p {
                    0 => { cpu.registers.pc = pop16(cpu, bus); 10 }
                    1 => { cpu.registers.exx(); 4 }
                    2 => { cpu.registers.pc = cpu.registers.indexed_hl(prefix); 4 }
                    _ => { cpu.registers.sp = cpu.registers.indexed_hl(prefix); 6 }
                }
            }
        }
        2 => {
            let nn = fetch16(cpu, bus);
            if eval_condition(cpu, y) {
                cpu.registers.pc = nn;
            }
            10
        }
        3 => match y {
            0 => { let nn = fetch16(cpu, bus); cpu.registers.pc = nn; 10 }
            1 => exec_cb(cpu, bus, IndexPrefix::None), // unreachable: CB handled earlier
            2 => { let n = fetch8(cpu, bus); bus.io_write(u16::from(n) | u16::from(cpu.registers.a()) << 8, cpu.registers.a()); 11 }
            3 => { let n = fetch8(cpu, bus); cpu.registers.set_a(bus.io_read(u16::from(n) | u16::from(cpu.registers.a()) << 8)); 11 }
            4 => { // EX (SP),HL
                let sp = cpu.registers.sp;
                let old = rp_get(cpu, prefix, 2);
                let v = read16(bus, sp);
                write16(bus, sp, old);
                rp_set(cpu, prefix, 2, v);
                19
            }
            5 => { // EX DE,HL
                let hl = cpu.registers.hl;
                cpu.registers.hl = cpu.registers.de;
                cpu.registers.de = hl;
                4
            }
            6 => { cpu.registers.iff1 = false; cpu.registers.iff2 = false; 4 } // DI
            _ => { cpu.registers.iff1 = true; cpu.registers.iff2 = true; cpu.registers.just_enabled_interrupts = true; 4 } // EI
        },
        4 => {
            let nn = fetch16(cpu, bus);
            if eval_condition(cpu, y) {
                push16(cpu, bus, cpu.registers.pc);
                cpu.registers.pc = nn;
                17
            } else {
                10
            }
        }
        5 => {
            if q == 0 {
                push16(cpu, bus, rp2_get(cpu, prefix, p));
                11
            } else if p == 0 {
                let nn = fetch16(cpu, bus);
                push16(cpu, bus, cpu.registers.pc);
                cpu.registers.pc = nn;
                17
            } else {
                4 // DD/FD/ED handled by caller; unreachable for plain table
            }
        }
        6 => {
            let n = fetch8(cpu, bus);
            apply_alu(cpu, y, n);
            7
        }
        _ => {
            push16(cpu, bus, cpu.registers.pc);
            cpu.registers.pc = u16::from(y) * 8;
            11
        }
    }
}

fn exec_cb(cpu: &mut Cpu, bus: &mut impl Bus, prefix: IndexPrefix) -> u32 {
    if prefix != IndexPrefix::None {
        return exec_ddfd_cb(cpu, bus, prefix);
    }
    let opcode = fetch8(cpu, bus);
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let v = reg8_get(cpu, bus, prefix, z, 0);
    match x {
        0 => {
            let (r, c) = apply_rot(y, v, cpu.registers.f().contains(CpuFlags::C));
            reg8_set(cpu, bus, prefix, z, 0, r);
            cpu.registers.set_f(alu::shift_flags(r, c));
            if z == 6 { 15 } else { 8 }
        }
        1 => {
            let bit = 1u8 << y;
            let mut f = cpu.registers.f() & CpuFlags::C;
            f.set(CpuFlags::Z, v & bit == 0);
            f.set(CpuFlags::P, v & bit == 0);
            f.insert(CpuFlags::H);
            if z == 6 {
                let wz_hi = (cpu.registers.wz >> 8) as u8;
                f.set(CpuFlags::Y, wz_hi & 0x20 != 0);
                f.set(CpuFlags::X, wz_hi & 0x08 != 0);
            } else {
                f.set(CpuFlags::Y, v & 0x20 != 0);
                f.set(CpuFlags::X, v & 0x08 != 0);
            }
            f.set(CpuFlags::S, y == 7 && v & bit != 0);
            cpu.registers.set_f(f);
            if z == 6 { 12 } else { 8 }
        }
        2 => {
            let r = v & !(1u8 << y);
            reg8_set(cpu, bus, prefix, z, 0, r);
            if z == 6 { 15 } else { 8 }
        }
        _ => {
            let r = v | (1u8 << y);
            reg8_set(cpu, bus, prefix, z, 0, r);
            if z == 6 { 15 } else { 8 }
        }
    }
}

/// DDCB/FDCB: displacement then sub-opcode; the operation always applies to
/// `(IX+d)`/`(IY+d)` and, for rotate/shift/res/set (but not BIT), the
/// result is also written back into the plain register named by `z`
/// (§4.1 — "except when that field selects memory").
fn exec_ddfd_cb(cpu: &mut Cpu, bus: &mut impl Bus, prefix: IndexPrefix) -> u32 {
    let d = fetch8(cpu, bus) as i8;
    let opcode = fetch8(cpu, bus);
    let addr = cpu.registers.indexed_hl(prefix).wrapping_add(d as i16 as u16);
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let v = bus.read(addr);

    match x {
        1 => {
            let bit = 1u8 << y;
            let mut f = cpu.registers.f() & CpuFlags::C;
            f.set(CpuFlags::Z, v & bit == 0);
            f.set(CpuFlags::P, v & bit == 0);
            f.insert(CpuFlags::H);
            let addr_hi = (addr >> 8) as u8;
            f.set(CpuFlags::Y, addr_hi & 0x20 != 0);
            f.set(CpuFlags::X, addr_hi & 0x08 != 0);
            f.set(CpuFlags::S, y == 7 && v & bit != 0);
            cpu.registers.set_f(f);
            20
        }
        0 | 2 | 3 => {
            let result = match x {
                0 => {
                    let (r, c) = apply_rot(y, v, cpu.registers.f().contains(CpuFlags::C));
                    cpu.registers.set_f(alu::shift_flags(r, c));
                    r
                }
                2 => v & !(1u8 << y),
                _ => v | (1u8 << y),
            };
            bus.write(addr, result);
            if z != 6 {
                reg8_set(cpu, bus, IndexPrefix::None, z, 0, result);
            }
            23
        }
        _ => unreachable!(),
    }
}

fn exec_ed(cpu: &mut Cpu, bus: &mut impl Bus) -> u32 {
    let opcode = fetch8(cpu, bus);
    let x = opcode >> 6;
    let y = (opcode >> 3) & 7;
    let z = opcode & 7;
    let p = y >> 1;
    let q = y & 1;

    if x != 1 && x != 2 {
        return 8; // ED-space NOP: every undocumented ED opcode has this defined behavior (§7).
    }

    if x == 2 {
        return exec_ed_block(cpu, bus, y, z);
    }

    match z {
        0 => {
            let v = bus.io_read(cpu.registers.bc.get());
            if y != 6 {
                reg8_set(cpu, bus, IndexPrefix::None, y, 0, v);
            }
            let mut f = cpu.registers.f() & CpuFlags::C;
            f |= super::flags::szp(v) & (CpuFlags::S | CpuFlags::Z | CpuFlags::Y | CpuFlags::X | CpuFlags::P);
            cpu.registers.set_f(f);
            12
        }
        1 => {
            let v = if y == 6 { 0 } else { reg8_get(cpu, bus, IndexPrefix::None, y, 0) };
            bus.io_write(cpu.registers.bc.get(), v);
            12
        }
        2 => {
            let hl = cpu.registers.hl.get();
            let rp = rp_get(cpu, IndexPrefix::None, p);
            let carry = cpu.registers.f().contains(CpuFlags::C);
            let (result, f) = if q == 0 {
                alu::sbc16(hl, rp, carry)
            } else {
                alu::adc16(hl, rp, carry)
            };
            cpu.registers.hl.set(result);
            cpu.registers.set_f(f);
            15
        }
        3 => {
            if q == 0 {
                let nn = fetch16(cpu, bus);
                write16(bus, nn, rp_get(cpu, IndexPrefix::None, p));
            } else {
                let nn = fetch16(cpu, bus);
                let v = read16(bus, nn);
                rp_set(cpu, IndexPrefix::None, p, v);
            }
            20
        }
        4 => {
            let a = cpu.registers.a();
            let (r, f) = alu::sub8(0, a, false);
            cpu.registers.set_a(r);
            cpu.registers.set_f(f);
            8
        }
        5 => {
            cpu.registers.pc = pop16(cpu, bus);
            cpu.registers.iff1 = cpu.registers.iff2;
            14
        }
        6 => {
            cpu.registers.im = match y & 3 {
                0 | 1 => super::InterruptMode::Im0,
                2 => super::InterruptMode::Im1,
                _ => super::InterruptMode::Im2,
            };
            8
        }
        7 => match y {
            0 => { cpu.registers.ir.high = cpu.registers.a(); 9 }
            1 => { cpu.registers.ir.low = cpu.registers.a(); 9 }
            2 => { // LD A,I
                let i = cpu.registers.i();
                cpu.registers.set_a(i);
                set_ld_a_ir_flags(cpu, i);
                9
            }
            3 => { // LD A,R
                let r = cpu.registers.r();
                cpu.registers.set_a(r);
                set_ld_a_ir_flags(cpu, r);
                9
            }
            4 => { // RRD
                let hl = cpu.registers.hl.get();
                let mem = bus.read(hl);
                let a = cpu.registers.a();
                let new_mem = (a << 4) | (mem >> 4);
                let new_a = (a & 0xf0) | (mem & 0x0f);
                bus.write(hl, new_mem);
                cpu.registers.set_a(new_a);
                let mut f = cpu.registers.f() & CpuFlags::C;
                f |= super::flags::szp(new_a) & (CpuFlags::S | CpuFlags::Z | CpuFlags::Y | CpuFlags::X | CpuFlags::P);
                cpu.registers.set_f(f);
                18
            }
            5 => { // RLD
                let hl = cpu.registers.hl.get();
                let mem = bus.read(hl);
                let a = cpu.registers.a();
                let new_mem = (mem << 4) | (a & 0x0f);
                let new_a = (a & 0xf0) | (mem >> 4);
                bus.write(hl, new_mem);
                cpu.registers.set_a(new_a);
                let mut f = cpu.registers.f() & CpuFlags::C;
                f |= super::flags::szp(new_a) & (CpuFlags::S | CpuFlags::Z | CpuFlags::Y | CpuFlags::X | CpuFlags::P);
                cpu.registers.set_f(f);
                18
            }
            _ => 8, // NOP (ED55/ED5D undocumented)
        },
        _ => 8,
    }
}

#[inline]
fn set_ld_a_ir_flags(cpu: &mut Cpu, value: u8) {
    let mut f = cpu.registers.f() & CpuFlags::C;
    f |= CpuFlags::from_sign_zero_53(value);
    f.set(CpuFlags::P, cpu.registers.iff2);
    cpu.registers.set_f(f);
}

/// The sixteen ED-space block instructions (x=2): LDI/LDD/LDIR/LDDR,
/// CPI/CPD/CPIR/CPDR, INI/IND/INIR/INDR, OUTI/OUTD/OTIR/OTDR.
fn exec_ed_block(cpu: &mut Cpu, bus: &mut impl Bus, y: u8, z: u8) -> u32 {
    let increment = z & 1 == 0; // z in {0,1,2,3}: 0/2 are I-forms, 1/3 are D-forms... see mapping below
    // y selects the row (4=LD,5=CP,6=IN,7=OUT), z selects I/D/IR/DR (0/1/2/3).
    let repeat = z >= 2;
    let inc = z == 0 || z == 2;
    let _ = increment;
    match y {
        4 => block_ld(cpu, bus, inc, repeat),
        5 => block_cp(cpu, bus, inc, repeat),
        6 => block_in(cpu, bus, inc, repeat),
        _ => block_out(cpu, bus, inc, repeat),
    }
}

fn block_ld(cpu: &mut Cpu, bus: &mut impl Bus, inc: bool, repeat: bool) -> u32 {
    let hl = cpu.registers.hl.get();
    let de = cpu.registers.de.get();
    let v = bus.read(hl);
    bus.write(de, v);
    let step: u16 = if inc { 1 } else { 0u16.wrapping_sub(1) };
    cpu.registers.hl.set(hl.wrapping_add(step));
    cpu.registers.de.set(de.wrapping_add(step));
    let bc = cpu.registers.bc.get().wrapping_sub(1);
    cpu.registers.bc.set(bc);

    let mut f = cpu.registers.f() & (CpuFlags::S | CpuFlags::Z | CpuFlags::C);
    let n_plus_a = v.wrapping_add(cpu.registers.a());
    f.set(CpuFlags::Y, n_plus_a & 0x02 != 0);
    f.set(CpuFlags::X, n_plus_a & 0x08 != 0);
    f.set(CpuFlags::P, bc != 0);
    cpu.registers.set_f(f);

    if repeat && bc != 0 {
        cpu.registers.pc = cpu.registers.pc.wrapping_sub(2);
        21
    } else {
        16
    }
}

fn block_cp(cpu: &mut Cpu, bus: &mut impl Bus, inc: bool, repeat: bool) -> u32 {
    let hl = cpu.registers.hl.get();
    let v = bus.read(hl);
    let a = cpu.registers.a();
    let step: u16 = if inc { 1 } else { 0u16.wrapping_sub(1) };
    cpu.registers.hl.set(hl.wrapping_add(step));
    let bc = cpu.registers.bc.get().wrapping_sub(1);
    cpu.registers.bc.set(bc);

    let (result, base_f) = alu::sub8(a, v, false);
    let half = base_f.contains(CpuFlags::H);
    let mut f = base_f & (CpuFlags::S | CpuFlags::Z | CpuFlags::H | CpuFlags::N);
    let n = result.wrapping_sub(if half { 1 } else { 0 });
    f.set(CpuFlags::Y, n & 0x02 != 0);
    f.set(CpuFlags::X, n & 0x08 != 0);
    f.set(CpuFlags::P, bc != 0);
    cpu.registers.set_f(f);

    if repeat && bc != 0 && result != 0 {
        cpu.registers.pc = cpu.registers.pc.wrapping_sub(2);
        21
    } else {
        16
    }
}

fn block_in(cpu: &mut Cpu, bus: &mut impl Bus, inc: bool, repeat: bool) -> u32 {
    let port = cpu.registers.bc.get();
    let v = bus.io_read(port);
    let hl = cpu.registers.hl.get();
    bus.write(hl, v);
    let step: u16 = if inc { 1 } else { 0u16.wrapping_sub(1) };
    cpu.registers.hl.set(hl.wrapping_add(step));
    let b = cpu.registers.b().wrapping_sub(1);
    cpu.registers.set_b(b);

    let mut f = super::flags::szp(b) & (CpuFlags::S | CpuFlags::Z | CpuFlags::Y | CpuFlags::X);
    f.set(CpuFlags::N, v & 0x80 != 0);
    cpu.registers.set_f(f);

    if repeat && b != 0 {
        cpu.registers.pc = cpu.registers.pc.wrapping_sub(2);
        21
    } else {
        16
    }
}

fn block_out(cpu: &mut Cpu, bus: &mut impl Bus, inc: bool, repeat: bool) -> u32 {
    let hl = cpu.registers.hl.get();
    let v = bus.read(hl);
    let step: u16 = if inc { 1 } else { 0u16.wrapping_sub(1) };
    cpu.registers.hl.set(hl.wrapping_add(step));
    let b = cpu.registers.b().wrapping_sub(1);
    cpu.registers.set_b(b);
    let port = cpu.registers.bc.get();
    bus.io_write(port, v);

    let mut f = super::flags::szp(b) & (CpuFlags::S | CpuFlags::Z | CpuFlags::Y | CpuFlags::X);
    f.set(CpuFlags::N, v & 0x80 != 0);
    cpu.registers.set_f(f);

    if repeat && b != 0 {
        cpu.registers.pc = cpu.registers.pc.wrapping_sub(2);
        21
    } else {
        16
    }
}

/// Services an accepted interrupt request. Returns the T-state cost.
pub fn accept_interrupt(cpu: &mut Cpu, bus: &mut impl Bus) -> u32 {
    if cpu.registers.halted {
        cpu.registers.pc = cpu.registers.pc.wrapping_add(1);
        cpu.registers.halted = false;
    }
    cpu.registers.bump_r();
    cpu.registers.iff1 = false;
    cpu.registers.iff2 = false;
    push16(cpu, bus, cpu.registers.pc);

    match cpu.registers.im {
        super::InterruptMode::Im0 => 13,
        super::InterruptMode::Im1 => {
            cpu.registers.pc = 0x0038;
            13
        }
        super::InterruptMode::Im2 => {
            let vector = (u16::from(cpu.registers.i()) << 8) | 0x00FF;
            cpu.registers.pc = read16(bus, vector);
            19
        }
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::Cpu;
    use crate::ula::{Model, Ula};

    /// Loads `program` at the start of ROM bank 0, so it's readable at
    /// addresses 0x0000.. through the same `Bus` impl the machine uses.
    fn rom_with(program: &[u8]) -> Ula {
        let mut image = vec![0u8; 0x4000];
        image[..program.len()].copy_from_slice(program);
        let mut ula = Ula::new(Model::Spectrum48k);
        ula.load_rom(0, &image);
        ula
    }

    #[test]
    fn ld_bc_nn_loads_the_immediate_and_costs_ten_tstates() {
        let mut cpu = Cpu::new();
        let mut ula = rom_with(&[0x01, 0x34, 0x12]); // LD BC,0x1234
        cpu.step(&mut ula);
        assert_eq!(cpu.registers.pc, 3);
        assert_eq!(cpu.registers.bc.get(), 0x1234);
        assert_eq!(cpu.cycle_counter(), 10);
        assert_eq!(cpu.registers.ir.low, 1);
    }

    #[test]
    fn sub_a_ix_plus_d_sets_the_documented_flags() {
        let mut image = vec![0u8; 0x4000];
        image[..5].copy_from_slice(&[0x3E, 0x25, 0xDD, 0x96, 0x01]); // LD A,0x25 ; SUB A,(IX+1)
        image[0x0020] = 0x35;
        let mut ula = Ula::new(Model::Spectrum48k);
        ula.load_rom(0, &image);
        let mut cpu = Cpu::new();
        cpu.registers.ix.set(0x001F);

        cpu.step(&mut ula);
        cpu.step(&mut ula);

        assert_eq!(cpu.registers.a(), 0xF0);
        let f = cpu.registers.f();
        assert!(f.contains(super::CpuFlags::S));
        assert!(!f.contains(super::CpuFlags::Z));
        assert!(!f.contains(super::CpuFlags::H)); // 0x25 - 0x35: equal low nibbles borrow nothing
        assert!(!f.contains(super::CpuFlags::V));
        assert!(f.contains(super::CpuFlags::N));
        assert!(f.contains(super::CpuFlags::C));
        assert_eq!(cpu.registers.wz, 0x0020);
        assert_eq!(cpu.cycle_counter(), 7 + 19);
    }

    #[test]
    fn eight_rlc_b_rotations_cycle_through_the_documented_sequence() {
        let mut image = vec![0u8; 0x4000];
        for chunk in image[..16].chunks_mut(2) {
            chunk.copy_from_slice(&[0xCB, 0x00]); // RLC B
        }
        let mut ula = Ula::new(Model::Spectrum48k);
        ula.load_rom(0, &image);
        let mut cpu = Cpu::new();
        cpu.registers.bc.high = 0x61;

        let expected_b = [0xC2, 0x85, 0x0B, 0x16, 0x2C, 0x58, 0xB0, 0x61];
        let expected_carry = [true, true, false, false, false, false, true, true];
        for i in 0..8 {
            cpu.step(&mut ula);
            assert_eq!(cpu.registers.bc.high, expected_b[i], "iteration {i}");
            assert_eq!(cpu.registers.f().contains(super::CpuFlags::C), expected_carry[i], "iteration {i}");
        }
    }
}
