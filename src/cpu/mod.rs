use bitflags::bitflags;


/// Start of the fixed stack page. SP is an offset into this page and
/// wraps within it.
pub const STACK_BASE: u16 = 0x0200;

pub const MEM_SIZE: usize = 0x10000;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const CARRY = 0b0000_0001;
        const ZERO = 0b0000_0010;
        const INTERRUPT = 0b0000_0100; // reserved, never set
        const HALF = 0b0000_1000; // reserved, never set
        const HALT = 0b0001_0000;
        const UNUSED = 0b0010_0000;
        const OVERFLOW = 0b0100_0000;
        const NEGATIVE = 0b1000_0000;
    }
}

/// The defined instruction set. Every byte not listed here executes as a
/// no-op with zero cycle cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Add = 0x00,
    Sub = 0x01,
    Inc = 0x02,
    Dec = 0x03,
    B = 0x04,
    Bnz = 0x05,
    Bz = 0x06,
    Tsx = 0x07,
    Xts = 0x08,
    Lda = 0x09,
    Sta = 0x0A,
    Br = 0x0B,
    Xta = 0x0C,
    Atx = 0x0D,
    Ldx = 0x0E,
    Stx = 0x0F,
    Jsr = 0x10,
    Rts = 0x11,
    Bsr = 0x12,
    Bn = 0x13,
    Bnr = 0x14,
    Bpr = 0x15,
    Bp = 0x16,
    Bc = 0x17,
    Bcr = 0x18,
    Xsra = 0x19,
    Xsla = 0x1A,
    Asrx = 0x1B,
    Aslx = 0x1C,
    And = 0x1D,
    Or = 0x1E,
    Xor = 0x1F,
    Clf = 0x20,
    Clc = 0x21,
    Cln = 0x22,
    Clz = 0x23,
    Xxa = 0x24,
    Rtr = 0x26,
    Ba = 0x27,
    Addf = 0x28,
    Subf = 0x29,
    Bnc = 0x2A,
    Bncr = 0x2B,
    Pha = 0x2C,
    Pla = 0x2D,
    Phx = 0x2E,
    Plx = 0x2F,
    Nota = 0x30,
    Notx = 0x31,
    Neg = 0x32,
    Swap = 0x33,
    Adc = 0x34,
    Sbc = 0x35,
    Setbrk = 0x36,
    Brk = 0x37,
    Rol = 0x38,
    Ror = 0x39,
    Asl = 0x3A,
    Asr = 0x3B,
    Bvs = 0x3C,
    Bvc = 0x3D,
    Bvsr = 0x3E,
    Bvcr = 0x3F,
    Jsri = 0x40,
    Bx = 0x41,
    Bax = 0x42,
    Decod = 0x44,
    Decbin = 0x45,
    Addbcd = 0x46,
    Subbcd = 0x47,
    Halt = 0xFF,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::Add,
            0x01 => Self::Sub,
            0x02 => Self::Inc,
            0x03 => Self::Dec,
            0x04 => Self::B,
            0x05 => Self::Bnz,
            0x06 => Self::Bz,
            0x07 => Self::Tsx,
            0x08 => Self::Xts,
            0x09 => Self::Lda,
            0x0A => Self::Sta,
            0x0B => Self::Br,
            0x0C => Self::Xta,
            0x0D => Self::Atx,
            0x0E => Self::Ldx,
            0x0F => Self::Stx,
            0x10 => Self::Jsr,
            0x11 => Self::Rts,
            0x12 => Self::Bsr,
            0x13 => Self::Bn,
            0x14 => Self::Bnr,
            0x15 => Self::Bpr,
            0x16 => Self::Bp,
            0x17 => Self::Bc,
            0x18 => Self::Bcr,
            0x19 => Self::Xsra,
            0x1A => Self::Xsla,
            0x1B => Self::Asrx,
            0x1C => Self::Aslx,
            0x1D => Self::And,
            0x1E => Self::Or,
            0x1F => Self::Xor,
            0x20 => Self::Clf,
            0x21 => Self::Clc,
            0x22 => Self::Cln,
            0x23 => Self::Clz,
            0x24 => Self::Xxa,
            0x26 => Self::Rtr,
            0x27 => Self::Ba,
            0x28 => Self::Addf,
            0x29 => Self::Subf,
            0x2A => Self::Bnc,
            0x2B => Self::Bncr,
            0x2C => Self::Pha,
            0x2D => Self::Pla,
            0x2E => Self::Phx,
            0x2F => Self::Plx,
            0x30 => Self::Nota,
            0x31 => Self::Notx,
            0x32 => Self::Neg,
            0x33 => Self::Swap,
            0x34 => Self::Adc,
            0x35 => Self::Sbc,
            0x36 => Self::Setbrk,
            0x37 => Self::Brk,
            0x38 => Self::Rol,
            0x39 => Self::Ror,
            0x3A => Self::Asl,
            0x3B => Self::Asr,
            0x3C => Self::Bvs,
            0x3D => Self::Bvc,
            0x3E => Self::Bvsr,
            0x3F => Self::Bvcr,
            0x40 => Self::Jsri,
            0x41 => Self::Bx,
            0x42 => Self::Bax,
            0x44 => Self::Decod,
            0x45 => Self::Decbin,
            0x46 => Self::Addbcd,
            0x47 => Self::Subbcd,
            0xFF => Self::Halt,
            _ => return None,
        })
    }
}

/// Base cycle cost per opcode byte, indexed identically to the dispatch.
/// Taken conditional branches add one extra unit on top of the base cost.
/// Undefined opcodes stay at 0: they cost nothing beyond the dispatch.
pub const CYCLES: [u8; 256] = build_cycle_table();

const fn build_cycle_table() -> [u8; 256] {
    let costs: &[(u8, u8)] = &[
        (0x00, 2), // ADD
        (0x01, 2), // SUB
        (0x02, 2), // INC
        (0x03, 2), // DEC
        (0x04, 3), // B abs
        (0x05, 4), // BNZ abs
        (0x06, 4), // BZ abs
        (0x07, 2), // TSX
        (0x08, 2), // XTS
        (0x09, 4), // LDA abs
        (0x0A, 4), // STA abs
        (0x0B, 3), // BR rel
        (0x0C, 2), // XTA
        (0x0D, 2), // ATX
        (0x0E, 4), // LDX abs
        (0x0F, 4), // STX abs
        (0x10, 6), // JSR abs
        (0x11, 6), // RTS
        (0x12, 5), // BSR rel
        (0x13, 4), // BN abs
        (0x14, 3), // BNR rel
        (0x15, 3), // BPR rel
        (0x16, 4), // BP abs
        (0x17, 4), // BC abs
        (0x18, 3), // BCR rel
        (0x19, 2), // XSRA
        (0x1A, 2), // XSLA
        (0x1B, 2), // ASRX
        (0x1C, 2), // ASLX
        (0x1D, 2), // AND
        (0x1E, 2), // OR
        (0x1F, 2), // XOR
        (0x20, 2), // CLF
        (0x21, 2), // CLC
        (0x22, 2), // CLN
        (0x23, 2), // CLZ
        (0x24, 2), // XXA
        (0x26, 4), // RTR
        (0x27, 2), // BA
        (0x28, 2), // ADDF
        (0x29, 2), // SUBF
        (0x2A, 4), // BNC abs
        (0x2B, 3), // BNCR rel
        (0x2C, 3), // PHA
        (0x2D, 4), // PLA
        (0x2E, 3), // PHX
        (0x2F, 4), // PLX
        (0x30, 2), // NOTA
        (0x31, 2), // NOTX
        (0x32, 2), // NEG
        (0x33, 2), // SWAP
        (0x34, 2), // ADC #imm
        (0x35, 2), // SBC #imm
        (0x36, 4), // SETBRK abs
        (0x37, 3), // BRK
        (0x38, 2), // ROL
        (0x39, 2), // ROR
        (0x3A, 2), // ASL
        (0x3B, 2), // ASR
        (0x3C, 4), // BVS abs
        (0x3D, 4), // BVC abs
        (0x3E, 3), // BVSR rel
        (0x3F, 3), // BVCR rel
        (0x40, 8), // JSRI
        (0x41, 2), // BX
        (0x42, 3), // BAX
        (0x44, 4), // DECOD
        (0x45, 4), // DECBIN
        (0x46, 4), // ADDBCD
        (0x47, 4), // SUBBCD
        (0xFF, 2), // HALT
    ];
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < costs.len() {
        table[costs[i].0 as usize] = costs[i].1;
        i += 1;
    }
    table
}

/// The MR8C execution engine: registers plus the flat 64KB memory it
/// exclusively owns. Instances are fully independent of each other.
pub struct Cpu {
    pub a: u8,
    pub x: u8,
    pub sp: u8, // offset into the stack page
    pub pc: u16,
    pub p: StatusFlags,
    pub break_vector: u16,
    pub halted: bool,
    cycles: u32, // cycle debt still owed by the last instruction
    mem: [u8; MEM_SIZE],
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            a: 0,
            x: 0,
            sp: 0xFF,
            pc: 0,
            p: StatusFlags::empty(),
            break_vector: 0,
            halted: false,
            cycles: 0,
            mem: [0; MEM_SIZE],
        }
    }

    /// Re-initialize the whole register aggregate and start executing at
    /// `origin`. Memory contents are left alone.
    pub fn reset(&mut self, origin: u16) {
        self.a = 0;
        self.x = 0;
        self.sp = 0xFF;
        self.p = StatusFlags::empty();
        self.pc = origin;
        self.break_vector = 0;
        self.halted = false;
        self.cycles = 0;
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.mem[addr as usize]
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        self.mem[addr as usize] = value;
    }

    /// Copy a payload into memory starting at `origin`, wrapping at the
    /// top of the address space.
    pub fn load(&mut self, data: &[u8], origin: u16) {
        for (i, &byte) in data.iter().enumerate() {
            self.mem[origin.wrapping_add(i as u16) as usize] = byte;
        }
    }

    /// Remaining cycle debt from the last executed instruction.
    pub fn cycle_debt(&self) -> u32 {
        self.cycles
    }

    /// One dispatch quantum. Pays down one unit of cycle debt if any is
    /// owed; otherwise fetches and executes the next instruction and
    /// reloads the debt from the cost table.
    pub fn step(&mut self) {
        if self.cycles > 0 {
            self.cycles -= 1;
            return;
        }
        if self.halted {
            return;
        }
        let byte = self.fetch_byte();
        if let Some(op) = Opcode::from_byte(byte) {
            self.execute(op);
        }
        self.cycles += u32::from(CYCLES[byte as usize]);
    }

    /// Step until the halt instruction executes. The caller is responsible
    /// for bounding runaway programs; see the step cap in the host.
    pub fn run(&mut self) {
        while !self.halted {
            self.step();
        }
    }

    fn fetch_byte(&mut self) -> u8 {
        let byte = self.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch_byte();
        let hi = self.fetch_byte();
        u16::from_le_bytes([lo, hi])
    }

    fn push8(&mut self, value: u8) {
        self.write(STACK_BASE + u16::from(self.sp), value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop8(&mut self) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        self.read(STACK_BASE + u16::from(self.sp))
    }

    fn set_zero_negative(&mut self, value: u8) {
        self.p.set(StatusFlags::ZERO, value == 0);
        self.p.set(StatusFlags::NEGATIVE, value & 0x80 != 0);
    }

    fn set_add_flags(&mut self, a: u8, b: u8, raw: u16) {
        let result = raw as u8;
        self.set_zero_negative(result);
        self.p.set(StatusFlags::CARRY, raw > 0xFF);
        // Signed overflow: operands agree in sign, result does not.
        self.p
            .set(StatusFlags::OVERFLOW, (!(a ^ b) & (a ^ result)) & 0x80 != 0);
    }

    fn set_sub_flags(&mut self, a: u8, b: u8, raw: u16) {
        let result = raw as u8;
        self.set_zero_negative(result);
        // Carry means "no borrow".
        self.p.set(StatusFlags::CARRY, raw < 0x100);
        self.p
            .set(StatusFlags::OVERFLOW, ((a ^ b) & (a ^ result)) & 0x80 != 0);
    }

    /// Absolute conditional branch. Taken branches owe one extra cycle.
    fn branch_abs(&mut self, taken: bool) {
        let target = self.fetch_word();
        if taken {
            self.pc = target;
            self.cycles += 1;
        }
    }

    /// Relative conditional branch: target is PC after the offset byte,
    /// plus the signed offset, wrapping mod 65536.
    fn branch_rel(&mut self, taken: bool) {
        let offset = self.fetch_byte() as i8;
        if taken {
            self.pc = self.pc.wrapping_add(offset as u16);
            self.cycles += 1;
        }
    }

    fn execute(&mut self, op: Opcode) {
        match op {
            Opcode::Add => {
                let raw = u16::from(self.a) + u16::from(self.x);
                self.set_add_flags(self.a, self.x, raw);
                self.a = raw as u8;
            }
            Opcode::Sub => {
                let raw = u16::from(self.a).wrapping_sub(u16::from(self.x));
                self.set_sub_flags(self.a, self.x, raw);
                self.a = raw as u8;
            }
            Opcode::Inc => {
                self.a = self.a.wrapping_add(1);
                self.set_zero_negative(self.a);
            }
            Opcode::Dec => {
                self.a = self.a.wrapping_sub(1);
                self.set_zero_negative(self.a);
            }
            Opcode::B => {
                self.pc = self.fetch_word();
            }
            Opcode::Bnz => self.branch_abs(!self.p.contains(StatusFlags::ZERO)),
            Opcode::Bz => self.branch_abs(self.p.contains(StatusFlags::ZERO)),
            Opcode::Tsx => {
                self.x = self.sp;
                self.set_zero_negative(self.x);
            }
            Opcode::Xts => {
                self.sp = self.x;
            }
            Opcode::Lda => {
                let addr = self.fetch_word();
                self.a = self.read(addr);
                self.set_zero_negative(self.a);
            }
            Opcode::Sta => {
                let addr = self.fetch_word();
                self.write(addr, self.a);
            }
            Opcode::Br => {
                let offset = self.fetch_byte() as i8;
                self.pc = self.pc.wrapping_add(offset as u16);
            }
            Opcode::Xta => {
                self.a = self.x;
                self.set_zero_negative(self.a);
            }
            Opcode::Atx => {
                self.x = self.a;
                self.set_zero_negative(self.x);
            }
            Opcode::Ldx => {
                let addr = self.fetch_word();
                self.x = self.read(addr);
                self.set_zero_negative(self.x);
            }
            Opcode::Stx => {
                let addr = self.fetch_word();
                self.write(addr, self.x);
            }
            Opcode::Jsr => {
                let target = self.fetch_word();
                // Return address = address of the last operand byte; RTS
                // adds 1 to land past the encoding.
                let ret = self.pc.wrapping_sub(1);
                self.push8((ret >> 8) as u8);
                self.push8(ret as u8);
                self.pc = target;
            }
            Opcode::Rts => {
                let lo = self.pop8();
                let hi = self.pop8();
                self.pc = u16::from_le_bytes([lo, hi]).wrapping_add(1);
            }
            Opcode::Bsr => {
                // Compact call: push the negated delta back to the
                // instruction after BSR as a single byte. One return per
                // pushed delta; nesting beyond that is undefined.
                let offset = self.fetch_byte() as i8;
                self.push8(offset.wrapping_neg() as u8);
                self.pc = self.pc.wrapping_add(offset as u16);
            }
            Opcode::Bn => self.branch_abs(self.p.contains(StatusFlags::NEGATIVE)),
            Opcode::Bnr => self.branch_rel(self.p.contains(StatusFlags::NEGATIVE)),
            Opcode::Bpr => self.branch_rel(!self.p.contains(StatusFlags::NEGATIVE)),
            Opcode::Bp => self.branch_abs(!self.p.contains(StatusFlags::NEGATIVE)),
            Opcode::Bc => self.branch_abs(self.p.contains(StatusFlags::CARRY)),
            Opcode::Bcr => self.branch_rel(self.p.contains(StatusFlags::CARRY)),
            Opcode::Xsra => {
                self.p.set(StatusFlags::CARRY, self.x & 0x01 != 0);
                self.a = self.x >> 1;
                self.set_zero_negative(self.a);
            }
            Opcode::Xsla => {
                self.p.set(StatusFlags::CARRY, self.x & 0x80 != 0);
                self.a = self.x << 1;
                self.set_zero_negative(self.a);
            }
            Opcode::Asrx => {
                self.p.set(StatusFlags::CARRY, self.a & 0x01 != 0);
                self.x = self.a >> 1;
                self.set_zero_negative(self.x);
            }
            Opcode::Aslx => {
                self.p.set(StatusFlags::CARRY, self.a & 0x80 != 0);
                self.x = self.a << 1;
                self.set_zero_negative(self.x);
            }
            Opcode::And => {
                self.a &= self.x;
                self.set_zero_negative(self.a);
            }
            Opcode::Or => {
                self.a |= self.x;
                self.set_zero_negative(self.a);
            }
            Opcode::Xor => {
                self.a ^= self.x;
                self.set_zero_negative(self.a);
            }
            Opcode::Clf => {
                self.p = StatusFlags::empty();
            }
            Opcode::Clc => {
                self.p.remove(StatusFlags::CARRY);
            }
            Opcode::Cln => {
                self.p.remove(StatusFlags::NEGATIVE);
            }
            Opcode::Clz => {
                self.p.remove(StatusFlags::ZERO);
            }
            Opcode::Xxa => {
                self.x ^= self.a;
                self.set_zero_negative(self.x);
            }
            Opcode::Rtr => {
                let offset = self.pop8() as i8;
                self.pc = self.pc.wrapping_add(offset as u16);
            }
            Opcode::Ba => {
                self.pc = self.pc.wrapping_add(self.a as i8 as u16);
            }
            Opcode::Addf => {
                // Flags-only add: recompute Z N C V from scratch, A is
                // not written.
                let raw = u16::from(self.a) + u16::from(self.x);
                let result = raw as u8;
                self.p.remove(
                    StatusFlags::ZERO
                        | StatusFlags::NEGATIVE
                        | StatusFlags::CARRY
                        | StatusFlags::OVERFLOW,
                );
                self.p.set(StatusFlags::ZERO, result == 0);
                self.p.set(StatusFlags::NEGATIVE, result & 0x80 != 0);
                self.p.set(StatusFlags::CARRY, raw > 0xFF);
                self.p.set(
                    StatusFlags::OVERFLOW,
                    ((self.a ^ result) & (self.x ^ result)) & 0x80 != 0,
                );
            }
            Opcode::Subf => {
                let raw = u16::from(self.a).wrapping_sub(u16::from(self.x));
                let result = raw as u8;
                self.p.remove(
                    StatusFlags::ZERO
                        | StatusFlags::NEGATIVE
                        | StatusFlags::CARRY
                        | StatusFlags::OVERFLOW,
                );
                self.p.set(StatusFlags::ZERO, result == 0);
                self.p.set(StatusFlags::NEGATIVE, result & 0x80 != 0);
                self.p.set(StatusFlags::CARRY, self.a >= self.x);
                self.p.set(
                    StatusFlags::OVERFLOW,
                    ((self.a ^ self.x) & (self.a ^ result)) & 0x80 != 0,
                );
            }
            Opcode::Bnc => self.branch_abs(!self.p.contains(StatusFlags::CARRY)),
            Opcode::Bncr => self.branch_rel(!self.p.contains(StatusFlags::CARRY)),
            Opcode::Pha => self.push8(self.a),
            Opcode::Pla => {
                self.a = self.pop8();
                self.set_zero_negative(self.a);
            }
            Opcode::Phx => self.push8(self.x),
            Opcode::Plx => {
                self.x = self.pop8();
                self.set_zero_negative(self.x);
            }
            Opcode::Nota => {
                self.a = !self.a;
                self.set_zero_negative(self.a);
            }
            Opcode::Notx => {
                self.x = !self.x;
                self.set_zero_negative(self.x);
            }
            Opcode::Neg => {
                let old = self.a;
                self.a = self.a.wrapping_neg();
                self.set_zero_negative(self.a);
                self.p.set(StatusFlags::CARRY, self.a != 0);
                self.p.set(StatusFlags::OVERFLOW, (old ^ self.a) & 0x80 != 0);
            }
            Opcode::Swap => {
                std::mem::swap(&mut self.a, &mut self.x);
            }
            Opcode::Adc => {
                let value = self.fetch_byte();
                let carry_in = u16::from(self.p.contains(StatusFlags::CARRY));
                let raw = u16::from(self.a) + u16::from(value) + carry_in;
                let result = raw as u8;
                self.p.set(StatusFlags::CARRY, raw > 0xFF);
                self.p.set(StatusFlags::ZERO, result == 0);
                self.p.set(StatusFlags::NEGATIVE, result & 0x80 != 0);
                self.p.set(
                    StatusFlags::OVERFLOW,
                    (!(self.a ^ value) & (self.a ^ result)) & 0x80 != 0,
                );
                self.a = result;
            }
            Opcode::Sbc => {
                let value = self.fetch_byte();
                let borrow = u16::from(!self.p.contains(StatusFlags::CARRY));
                let raw = u16::from(self.a)
                    .wrapping_sub(u16::from(value))
                    .wrapping_sub(borrow);
                let result = raw as u8;
                self.p.set(StatusFlags::CARRY, raw < 0x100);
                self.p.set(StatusFlags::ZERO, result == 0);
                self.p.set(StatusFlags::NEGATIVE, result & 0x80 != 0);
                self.p.set(
                    StatusFlags::OVERFLOW,
                    ((self.a ^ value) & (self.a ^ result)) & 0x80 != 0,
                );
                self.a = result;
            }
            Opcode::Setbrk => {
                self.break_vector = self.fetch_word();
            }
            Opcode::Brk => {
                self.pc = self.break_vector;
            }
            Opcode::Rol => {
                let carry_in = u8::from(self.p.contains(StatusFlags::CARRY));
                self.p.set(StatusFlags::CARRY, self.a & 0x80 != 0);
                self.a = (self.a << 1) | carry_in;
                self.set_zero_negative(self.a);
            }
            Opcode::Ror => {
                let carry_in = u8::from(self.p.contains(StatusFlags::CARRY));
                self.p.set(StatusFlags::CARRY, self.a & 0x01 != 0);
                self.a = (self.a >> 1) | (carry_in << 7);
                self.set_zero_negative(self.a);
            }
            Opcode::Asl => {
                self.p.set(StatusFlags::CARRY, self.a & 0x80 != 0);
                self.a <<= 1;
                self.set_zero_negative(self.a);
            }
            Opcode::Asr => {
                // Arithmetic: the sign bit shifts into itself.
                self.p.set(StatusFlags::CARRY, self.a & 0x01 != 0);
                self.a = (self.a >> 1) | (self.a & 0x80);
                self.set_zero_negative(self.a);
            }
            Opcode::Bvs => self.branch_abs(self.p.contains(StatusFlags::OVERFLOW)),
            Opcode::Bvc => self.branch_abs(!self.p.contains(StatusFlags::OVERFLOW)),
            Opcode::Bvsr => self.branch_rel(self.p.contains(StatusFlags::OVERFLOW)),
            Opcode::Bvcr => self.branch_rel(!self.p.contains(StatusFlags::OVERFLOW)),
            Opcode::Jsri => {
                // Operand is a pointer; the real target lives in memory.
                let ptr = self.fetch_word();
                let lo = self.read(ptr);
                let hi = self.read(ptr.wrapping_add(1));
                let target = u16::from_le_bytes([lo, hi]);
                let ret = self.pc.wrapping_sub(1);
                self.push8((ret >> 8) as u8);
                self.push8(ret as u8);
                self.pc = target;
            }
            Opcode::Bx => {
                self.pc = self.pc.wrapping_add(self.x as i8 as u16);
            }
            Opcode::Bax => {
                self.pc = (u16::from(self.a) << 8) | u16::from(self.x);
            }
            Opcode::Decod => {
                // Binary 0-99 -> packed BCD. Out of range clamps to 99
                // with Carry as the overflow signal.
                if self.a > 99 {
                    self.a = 0x99;
                    self.p.insert(StatusFlags::CARRY);
                } else {
                    self.a = ((self.a / 10) << 4) | (self.a % 10);
                    self.p.remove(StatusFlags::CARRY);
                }
                self.p.set(StatusFlags::ZERO, self.a == 0);
            }
            Opcode::Decbin => {
                let mut tens = self.a >> 4;
                let mut ones = self.a & 0x0F;
                let invalid = tens > 9 || ones > 9;
                if tens > 9 {
                    tens = 9;
                }
                if ones > 9 {
                    ones = 9;
                }
                self.a = tens * 10 + ones;
                self.p.set(StatusFlags::CARRY, invalid);
                self.p.set(StatusFlags::ZERO, self.a == 0);
            }
            Opcode::Addbcd => {
                let mut lo = (self.a & 0x0F) + (self.x & 0x0F);
                let mut half = 0;
                if lo > 9 {
                    lo -= 10;
                    half = 1;
                }
                let mut hi = (self.a >> 4) + (self.x >> 4) + half;
                let mut carry = false;
                if hi > 9 {
                    hi -= 10;
                    carry = true;
                }
                if hi > 9 {
                    // non-BCD input digits
                    hi = 9;
                }
                self.a = (hi << 4) | (lo & 0x0F);
                self.set_zero_negative(self.a);
                self.p.set(StatusFlags::CARRY, carry);
                self.p.set(StatusFlags::OVERFLOW, carry);
            }
            Opcode::Subbcd => {
                let mut lo = i16::from(self.a & 0x0F) - i16::from(self.x & 0x0F);
                let mut half = 0;
                if lo < 0 {
                    lo += 10;
                    half = 1;
                }
                let mut hi = i16::from(self.a >> 4) - i16::from(self.x >> 4) - half;
                let mut borrow = false;
                if hi < 0 {
                    hi += 10;
                    borrow = true;
                }
                if hi > 9 {
                    hi = 9;
                }
                self.a = ((hi as u8) << 4) | (lo as u8 & 0x0F);
                self.set_zero_negative(self.a);
                // Carry means "no borrow", same convention as SUB.
                self.p.set(StatusFlags::CARRY, !borrow);
                self.p.set(StatusFlags::OVERFLOW, borrow);
            }
            Opcode::Halt => {
                self.halted = true;
                self.p.insert(StatusFlags::HALT);
            }
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
