// Tue Jan 13 2026 - Alex

use crate::analysis::Instruction;

const REGISTER_NAMES: [&str; 16] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "sb", "sl", "fp", "ip", "sp", "lr", "pc",
];

const CONDITION_NAMES: [&str; 14] = [
    "eq", "ne", "hs", "lo", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "lt", "gt", "le",
];

/// Text decoder for Thumb and Thumb-2.
///
/// Produces mnemonic/operand text in lowercase with absolute branch targets.
/// Only the encodings seen in compiler output are spelled out; other 32-bit
/// encodings decode to `.inst.w` so linear decoding keeps going.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThumbDecoder;

impl ThumbDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decodes the instruction at the start of `bytes`, which lives at `address`.
    /// Returns `None` for undefined encodings or truncated input.
    pub fn decode(&self, bytes: &[u8], address: u32) -> Option<Instruction> {
        if bytes.len() < 2 {
            return None;
        }
        let hw1 = u16::from_le_bytes([bytes[0], bytes[1]]);

        if is_32bit(hw1) {
            if bytes.len() < 4 {
                return None;
            }
            let hw2 = u16::from_le_bytes([bytes[2], bytes[3]]);
            let (mnemonic, operands) = decode32(hw1, hw2, address)?;
            Some(Instruction::new(address, bytes[..4].to_vec(), &mnemonic, &operands))
        } else {
            let (mnemonic, operands) = decode16(hw1, address)?;
            Some(Instruction::new(address, bytes[..2].to_vec(), &mnemonic, &operands))
        }
    }

    /// Decodes forward from `start` through `code` (which begins at `base`)
    /// until the data ends or an undefined encoding is hit.
    pub fn decode_all<'a>(&'a self, code: &'a [u8], base: u32, start: u32) -> DecodeIter<'a> {
        DecodeIter {
            decoder: self,
            code,
            base,
            address: start,
        }
    }
}

pub struct DecodeIter<'a> {
    decoder: &'a ThumbDecoder,
    code: &'a [u8],
    base: u32,
    address: u32,
}

impl<'a> DecodeIter<'a> {
    pub fn address(&self) -> u32 {
        self.address
    }
}

impl<'a> Iterator for DecodeIter<'a> {
    type Item = Instruction;

    fn next(&mut self) -> Option<Instruction> {
        let offset = self.address.checked_sub(self.base)? as usize;
        let bytes = self.code.get(offset..)?;
        let instr = self.decoder.decode(bytes, self.address)?;
        self.address = instr.end();
        Some(instr)
    }
}

fn is_32bit(hw1: u16) -> bool {
    (hw1 >> 11) >= 0b11101
}

fn reg(n: u16) -> &'static str {
    REGISTER_NAMES[(n & 0xF) as usize]
}

fn cond(c: u16) -> Option<&'static str> {
    CONDITION_NAMES.get(c as usize).copied()
}

fn imm(v: u32) -> String {
    format!("#0x{:x}", v)
}

fn target(v: u32) -> String {
    format!("#0x{:x}", v)
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

fn reg_list(mask: u16) -> String {
    let regs: Vec<&str> = (0..16).filter(|i| mask & (1 << i) != 0).map(|i| reg(i)).collect();
    format!("{{{}}}", regs.join(", "))
}

fn ok(mnemonic: &str, operands: String) -> Option<(String, String)> {
    Some((mnemonic.to_string(), operands))
}

fn decode16(hw: u16, address: u32) -> Option<(String, String)> {
    let pc = address.wrapping_add(4);

    match hw >> 11 {
        0b00000..=0b00010 => {
            let op = (hw >> 11) & 0x3;
            let imm5 = ((hw >> 6) & 0x1F) as u32;
            let rm = (hw >> 3) & 0x7;
            let rd = hw & 0x7;
            if op == 0 && imm5 == 0 {
                return ok("movs", format!("{}, {}", reg(rd), reg(rm)));
            }
            let shift = if op != 0 && imm5 == 0 { 32 } else { imm5 };
            let mnemonic = ["lsls", "lsrs", "asrs"][op as usize];
            ok(mnemonic, format!("{}, {}, #{}", reg(rd), reg(rm), shift))
        }
        0b00011 => {
            let op = (hw >> 9) & 0x3;
            let rn = (hw >> 3) & 0x7;
            let rd = hw & 0x7;
            let field = (hw >> 6) & 0x7;
            match op {
                0 => ok("adds", format!("{}, {}, {}", reg(rd), reg(rn), reg(field))),
                1 => ok("subs", format!("{}, {}, {}", reg(rd), reg(rn), reg(field))),
                2 => ok("adds", format!("{}, {}, {}", reg(rd), reg(rn), imm(field as u32))),
                _ => ok("subs", format!("{}, {}, {}", reg(rd), reg(rn), imm(field as u32))),
            }
        }
        0b00100..=0b00111 => {
            let op = (hw >> 11) & 0x3;
            let rd = (hw >> 8) & 0x7;
            let imm8 = (hw & 0xFF) as u32;
            let mnemonic = ["movs", "cmp", "adds", "subs"][op as usize];
            ok(mnemonic, format!("{}, {}", reg(rd), imm(imm8)))
        }
        0b01000 => {
            if hw & 0x0400 == 0 {
                let op = (hw >> 6) & 0xF;
                let rm = (hw >> 3) & 0x7;
                let rdn = hw & 0x7;
                let mnemonic = [
                    "ands", "eors", "lsls", "lsrs", "asrs", "adcs", "sbcs", "rors", "tst", "rsbs",
                    "cmp", "cmn", "orrs", "muls", "bics", "mvns",
                ][op as usize];
                match op {
                    9 => ok(mnemonic, format!("{}, {}, #0", reg(rdn), reg(rm))),
                    13 => ok(mnemonic, format!("{}, {}, {}", reg(rdn), reg(rm), reg(rdn))),
                    _ => ok(mnemonic, format!("{}, {}", reg(rdn), reg(rm))),
                }
            } else {
                let op = (hw >> 8) & 0x3;
                let rm = (hw >> 3) & 0xF;
                let rdn = ((hw >> 4) & 0x8) | (hw & 0x7);
                match op {
                    0 => ok("add", format!("{}, {}", reg(rdn), reg(rm))),
                    1 => ok("cmp", format!("{}, {}", reg(rdn), reg(rm))),
                    2 => ok("mov", format!("{}, {}", reg(rdn), reg(rm))),
                    _ => {
                        if hw & 0x0080 != 0 {
                            ok("blx", reg(rm).to_string())
                        } else {
                            ok("bx", reg(rm).to_string())
                        }
                    }
                }
            }
        }
        0b01001 => {
            let rt = (hw >> 8) & 0x7;
            let imm8 = ((hw & 0xFF) as u32) << 2;
            ok("ldr", format!("{}, [pc, {}]", reg(rt), imm(imm8)))
        }
        0b01010 | 0b01011 => {
            let op = (hw >> 9) & 0x7;
            let rm = (hw >> 6) & 0x7;
            let rn = (hw >> 3) & 0x7;
            let rt = hw & 0x7;
            let mnemonic = ["str", "strh", "strb", "ldrsb", "ldr", "ldrh", "ldrb", "ldrsh"][op as usize];
            ok(mnemonic, format!("{}, [{}, {}]", reg(rt), reg(rn), reg(rm)))
        }
        0b01100..=0b10001 => {
            let rn = (hw >> 3) & 0x7;
            let rt = hw & 0x7;
            let imm5 = ((hw >> 6) & 0x1F) as u32;
            let (mnemonic, offset) = match hw >> 11 {
                0b01100 => ("str", imm5 << 2),
                0b01101 => ("ldr", imm5 << 2),
                0b01110 => ("strb", imm5),
                0b01111 => ("ldrb", imm5),
                0b10000 => ("strh", imm5 << 1),
                _ => ("ldrh", imm5 << 1),
            };
            if offset == 0 {
                ok(mnemonic, format!("{}, [{}]", reg(rt), reg(rn)))
            } else {
                ok(mnemonic, format!("{}, [{}, {}]", reg(rt), reg(rn), imm(offset)))
            }
        }
        0b10010 | 0b10011 => {
            let rt = (hw >> 8) & 0x7;
            let offset = ((hw & 0xFF) as u32) << 2;
            let mnemonic = if hw & 0x0800 != 0 { "ldr" } else { "str" };
            ok(mnemonic, format!("{}, [sp, {}]", reg(rt), imm(offset)))
        }
        0b10100 => {
            let rd = (hw >> 8) & 0x7;
            let offset = ((hw & 0xFF) as u32) << 2;
            ok("adr", format!("{}, {}", reg(rd), target((pc & !3).wrapping_add(offset))))
        }
        0b10101 => {
            let rd = (hw >> 8) & 0x7;
            let offset = ((hw & 0xFF) as u32) << 2;
            ok("add", format!("{}, sp, {}", reg(rd), imm(offset)))
        }
        0b10110 | 0b10111 => decode16_misc(hw, pc),
        0b11000 => {
            let rn = (hw >> 8) & 0x7;
            ok("stm", format!("{}!, {}", reg(rn), reg_list(hw & 0xFF)))
        }
        0b11001 => {
            let rn = (hw >> 8) & 0x7;
            let list = hw & 0xFF;
            let writeback = if list & (1 << rn) == 0 { "!" } else { "" };
            ok("ldm", format!("{}{}, {}", reg(rn), writeback, reg_list(list)))
        }
        0b11010 | 0b11011 => {
            let c = (hw >> 8) & 0xF;
            let imm8 = (hw & 0xFF) as u32;
            match c {
                0xE => None,
                0xF => ok("svc", imm(imm8)),
                _ => {
                    let offset = sign_extend(imm8 << 1, 9);
                    let dest = pc.wrapping_add(offset as u32);
                    ok(&format!("b{}", cond(c)?), target(dest))
                }
            }
        }
        0b11100 => {
            let offset = sign_extend(((hw & 0x7FF) as u32) << 1, 12);
            ok("b", target(pc.wrapping_add(offset as u32)))
        }
        _ => None,
    }
}

fn decode16_misc(hw: u16, pc: u32) -> Option<(String, String)> {
    match (hw >> 8) & 0xF {
        0b0000 => {
            let offset = ((hw & 0x7F) as u32) << 2;
            let mnemonic = if hw & 0x80 != 0 { "sub" } else { "add" };
            ok(mnemonic, format!("sp, sp, {}", imm(offset)))
        }
        0b0001 | 0b0011 | 0b1001 | 0b1011 => {
            let rn = hw & 0x7;
            let offset = ((((hw >> 9) & 0x1) << 6) | (((hw >> 3) & 0x1F) << 1)) as u32;
            let mnemonic = if hw & 0x0800 != 0 { "cbnz" } else { "cbz" };
            ok(mnemonic, format!("{}, {}", reg(rn), target(pc.wrapping_add(offset))))
        }
        0b0010 => {
            let rm = (hw >> 3) & 0x7;
            let rd = hw & 0x7;
            let mnemonic = ["sxth", "sxtb", "uxth", "uxtb"][((hw >> 6) & 0x3) as usize];
            ok(mnemonic, format!("{}, {}", reg(rd), reg(rm)))
        }
        0b0100 | 0b0101 => {
            let mut list = hw & 0xFF;
            if hw & 0x100 != 0 {
                list |= 1 << 14;
            }
            ok("push", reg_list(list))
        }
        0b0110 => {
            if (hw >> 5) & 0x7 == 0b011 {
                let mnemonic = if hw & 0x10 != 0 { "cpsid" } else { "cpsie" };
                let mut flags = String::new();
                if hw & 0x4 != 0 {
                    flags.push('a');
                }
                if hw & 0x2 != 0 {
                    flags.push('i');
                }
                if hw & 0x1 != 0 {
                    flags.push('f');
                }
                ok(mnemonic, flags)
            } else {
                None
            }
        }
        0b1010 => {
            let rm = (hw >> 3) & 0x7;
            let rd = hw & 0x7;
            let mnemonic = match (hw >> 6) & 0x3 {
                0 => "rev",
                1 => "rev16",
                3 => "revsh",
                _ => return None,
            };
            ok(mnemonic, format!("{}, {}", reg(rd), reg(rm)))
        }
        0b1100 | 0b1101 => {
            let mut list = hw & 0xFF;
            if hw & 0x100 != 0 {
                list |= 1 << 15;
            }
            ok("pop", reg_list(list))
        }
        0b1110 => ok("bkpt", imm((hw & 0xFF) as u32)),
        0b1111 => {
            let first = (hw >> 4) & 0xF;
            let mask = hw & 0xF;
            if mask == 0 {
                let mnemonic = match first {
                    0 => "nop",
                    1 => "yield",
                    2 => "wfe",
                    3 => "wfi",
                    4 => "sev",
                    _ => return None,
                };
                return ok(mnemonic, String::new());
            }
            let c = cond(first)?;
            let lsb = first & 1;
            let trailing = mask.trailing_zeros();
            let mut suffix = String::new();
            for bit in (trailing + 1..4).rev() {
                let then = (mask >> bit) & 1 == lsb;
                suffix.push(if then { 't' } else { 'e' });
            }
            ok(&format!("it{}", suffix), c.to_string())
        }
        _ => None,
    }
}

fn thumb_expand_imm(imm12: u32) -> u32 {
    if imm12 >> 10 == 0 {
        let imm8 = imm12 & 0xFF;
        match (imm12 >> 8) & 0x3 {
            0 => imm8,
            1 => (imm8 << 16) | imm8,
            2 => (imm8 << 24) | (imm8 << 8),
            _ => imm8.wrapping_mul(0x0101_0101),
        }
    } else {
        let unrotated = 0x80 | (imm12 & 0x7F);
        unrotated.rotate_right((imm12 >> 7) & 0x1F)
    }
}

fn shift_suffix(kind: u16, amount: u32) -> String {
    match (kind, amount) {
        (0, 0) => String::new(),
        (3, 0) => ", rrx".to_string(),
        (1, 0) | (2, 0) => format!(", {} #32", ["", "lsr", "asr"][kind as usize]),
        _ => format!(", {} #{}", ["lsl", "lsr", "asr", "ror"][kind as usize], amount),
    }
}

/// Names for the shared data-processing opcode table; `None` for unallocated slots.
fn data_processing(op: u16, rn: u16, rd: u16, setflags: bool) -> Option<(&'static str, bool, bool)> {
    // (mnemonic, uses_rd, uses_rn)
    let entry = match op {
        0b0000 if rd == 15 && setflags => ("tst", false, true),
        0b0000 => ("and", true, true),
        0b0001 => ("bic", true, true),
        0b0010 if rn == 15 => ("mov", true, false),
        0b0010 => ("orr", true, true),
        0b0011 if rn == 15 => ("mvn", true, false),
        0b0011 => ("orn", true, true),
        0b0100 if rd == 15 && setflags => ("teq", false, true),
        0b0100 => ("eor", true, true),
        0b1000 if rd == 15 && setflags => ("cmn", false, true),
        0b1000 => ("add", true, true),
        0b1010 => ("adc", true, true),
        0b1011 => ("sbc", true, true),
        0b1101 if rd == 15 && setflags => ("cmp", false, true),
        0b1101 => ("sub", true, true),
        0b1110 => ("rsb", true, true),
        _ => return None,
    };
    Some(entry)
}

fn data_processing_text(
    name: &str,
    uses_rd: bool,
    uses_rn: bool,
    setflags: bool,
    rd: u16,
    rn: u16,
    last: String,
) -> (String, String) {
    let flag = if setflags && uses_rd { "s" } else { "" };
    let mnemonic = format!("{}{}.w", name, flag);
    let mut fields = Vec::new();
    if uses_rd {
        fields.push(reg(rd).to_string());
    }
    if uses_rn {
        fields.push(reg(rn).to_string());
    }
    fields.push(last);
    (mnemonic, fields.join(", "))
}

fn decode32(hw1: u16, hw2: u16, address: u32) -> Option<(String, String)> {
    let pc = address.wrapping_add(4);
    let raw = ((hw1 as u32) << 16) | hw2 as u32;
    let unknown = || Some((".inst.w".to_string(), format!("#0x{:08x}", raw)));

    // Branches and miscellaneous control
    if hw1 & 0xF800 == 0xF000 && hw2 & 0x8000 == 0x8000 {
        let s = ((hw1 >> 10) & 1) as u32;
        let j1 = ((hw2 >> 13) & 1) as u32;
        let j2 = ((hw2 >> 11) & 1) as u32;
        let imm11 = (hw2 & 0x7FF) as u32;

        if hw2 & 0x5000 == 0x0000 {
            let c = (hw1 >> 6) & 0xF;
            if c >= 0xE {
                if hw1 == 0xF3AF && hw2 == 0x8000 {
                    return ok("nop.w", String::new());
                }
                return unknown();
            }
            let imm6 = (hw1 & 0x3F) as u32;
            let value = (s << 20) | (j2 << 19) | (j1 << 18) | (imm6 << 12) | (imm11 << 1);
            let offset = sign_extend(value, 21);
            return ok(&format!("b{}.w", cond(c)?), target(pc.wrapping_add(offset as u32)));
        }

        let imm10 = (hw1 & 0x3FF) as u32;
        let i1 = !(j1 ^ s) & 1;
        let i2 = !(j2 ^ s) & 1;
        let value = (s << 24) | (i1 << 23) | (i2 << 22) | (imm10 << 12) | (imm11 << 1);
        let offset = sign_extend(value, 25);

        return match hw2 & 0x5000 {
            0x1000 => ok("b.w", target(pc.wrapping_add(offset as u32))),
            0x5000 => ok("bl", target(pc.wrapping_add(offset as u32))),
            _ => {
                if hw2 & 1 != 0 {
                    return None;
                }
                ok("blx", target((pc & !3).wrapping_add(offset as u32)))
            }
        };
    }

    // Data processing, modified immediate
    if hw1 & 0xFA00 == 0xF000 && hw2 & 0x8000 == 0 {
        let op = (hw1 >> 5) & 0xF;
        let setflags = hw1 & 0x10 != 0;
        let rn = hw1 & 0xF;
        let rd = (hw2 >> 8) & 0xF;
        let imm12 = (((hw1 >> 10) & 1) as u32) << 11 | (((hw2 >> 12) & 0x7) as u32) << 8 | (hw2 & 0xFF) as u32;
        let value = thumb_expand_imm(imm12);
        return match data_processing(op, rn, rd, setflags) {
            Some((name, uses_rd, uses_rn)) => {
                let (m, o) = data_processing_text(name, uses_rd, uses_rn, setflags, rd, rn, imm(value));
                Some((m, o))
            }
            None => unknown(),
        };
    }

    // Data processing, plain binary immediate
    if hw1 & 0xFA00 == 0xF200 && hw2 & 0x8000 == 0 {
        let op = (hw1 >> 4) & 0x1F;
        let rn = hw1 & 0xF;
        let rd = (hw2 >> 8) & 0xF;
        let i = ((hw1 >> 10) & 1) as u32;
        let imm3 = ((hw2 >> 12) & 0x7) as u32;
        let imm8 = (hw2 & 0xFF) as u32;
        let imm12 = (i << 11) | (imm3 << 8) | imm8;
        return match op {
            0b00000 if rn == 15 => ok("adr.w", format!("{}, {}", reg(rd), target((pc & !3).wrapping_add(imm12)))),
            0b00000 => ok("addw", format!("{}, {}, {}", reg(rd), reg(rn), imm(imm12))),
            0b01010 if rn == 15 => ok("adr.w", format!("{}, {}", reg(rd), target((pc & !3).wrapping_sub(imm12)))),
            0b01010 => ok("subw", format!("{}, {}, {}", reg(rd), reg(rn), imm(imm12))),
            0b00100 | 0b01100 => {
                let imm4 = (hw1 & 0xF) as u32;
                let imm16 = (imm4 << 12) | imm12;
                let mnemonic = if op == 0b00100 { "movw" } else { "movt" };
                ok(mnemonic, format!("{}, {}", reg(rd), imm(imm16)))
            }
            _ => unknown(),
        };
    }

    // Load/store multiple
    if hw1 & 0xFE40 == 0xE800 {
        let op = (hw1 >> 7) & 0x3;
        let writeback = hw1 & 0x20 != 0;
        let load = hw1 & 0x10 != 0;
        let rn = hw1 & 0xF;
        let list = hw2;
        let bang = if writeback { "!" } else { "" };
        return match (op, load) {
            (0b01, true) if rn == 13 && writeback => ok("pop.w", reg_list(list)),
            (0b01, true) => ok("ldm.w", format!("{}{}, {}", reg(rn), bang, reg_list(list))),
            (0b01, false) => ok("stm.w", format!("{}{}, {}", reg(rn), bang, reg_list(list))),
            (0b10, true) => ok("ldmdb", format!("{}{}, {}", reg(rn), bang, reg_list(list))),
            (0b10, false) if rn == 13 && writeback => ok("push.w", reg_list(list)),
            (0b10, false) => ok("stmdb", format!("{}{}, {}", reg(rn), bang, reg_list(list))),
            _ => unknown(),
        };
    }

    // Table branch
    if hw1 & 0xFFF0 == 0xE8D0 && hw2 & 0xFFE0 == 0xF000 {
        let rn = hw1 & 0xF;
        let rm = hw2 & 0xF;
        return if hw2 & 0x10 != 0 {
            ok("tbh", format!("[{}, {}, lsl #1]", reg(rn), reg(rm)))
        } else {
            ok("tbb", format!("[{}, {}]", reg(rn), reg(rm)))
        };
    }

    // Load/store dual
    if hw1 & 0xFE40 == 0xE840 && hw1 & 0x0120 != 0 {
        let p = hw1 & 0x100 != 0;
        let u = hw1 & 0x80 != 0;
        let w = hw1 & 0x20 != 0;
        let load = hw1 & 0x10 != 0;
        let rn = hw1 & 0xF;
        let rt = (hw2 >> 12) & 0xF;
        let rt2 = (hw2 >> 8) & 0xF;
        let offset = ((hw2 & 0xFF) as u32) << 2;
        let sign = if u { "" } else { "-" };
        let mnemonic = if load { "ldrd" } else { "strd" };
        let address = match (p, w) {
            (true, false) => format!("[{}, #{}0x{:x}]", reg(rn), sign, offset),
            (true, true) => format!("[{}, #{}0x{:x}]!", reg(rn), sign, offset),
            _ => format!("[{}], #{}0x{:x}", reg(rn), sign, offset),
        };
        return ok(mnemonic, format!("{}, {}, {}", reg(rt), reg(rt2), address));
    }

    // Data processing, shifted register
    if hw1 & 0xFE00 == 0xEA00 {
        let op = (hw1 >> 5) & 0xF;
        let setflags = hw1 & 0x10 != 0;
        let rn = hw1 & 0xF;
        let rd = (hw2 >> 8) & 0xF;
        let rm = hw2 & 0xF;
        let amount = ((((hw2 >> 12) & 0x7) << 2) | ((hw2 >> 6) & 0x3)) as u32;
        let kind = (hw2 >> 4) & 0x3;
        let last = format!("{}{}", reg(rm), shift_suffix(kind, amount));
        return match data_processing(op, rn, rd, setflags) {
            Some((name, uses_rd, uses_rn)) => Some(data_processing_text(name, uses_rd, uses_rn, setflags, rd, rn, last)),
            None => unknown(),
        };
    }

    // Load/store single
    if hw1 & 0xFE00 == 0xF800 {
        let rt = (hw2 >> 12) & 0xF;
        let rn = hw1 & 0xF;
        let size = (hw1 >> 5) & 0x3;
        let load = hw1 & 0x10 != 0;
        let signed = hw1 & 0x100 != 0;

        let mnemonic = match (load, signed, size) {
            (true, false, 0) => "ldrb",
            (true, false, 1) => "ldrh",
            (true, false, 2) => "ldr",
            (true, true, 0) => "ldrsb",
            (true, true, 1) => "ldrsh",
            (false, false, 0) => "strb",
            (false, false, 1) => "strh",
            (false, false, 2) => "str",
            _ => return unknown(),
        };

        if load && rn == 15 {
            let offset = (hw2 & 0xFFF) as u32;
            let sign = if hw1 & 0x80 != 0 { "" } else { "-" };
            return ok(&format!("{}.w", mnemonic), format!("{}, [pc, #{}0x{:x}]", reg(rt), sign, offset));
        }

        if hw1 & 0x80 != 0 {
            let offset = (hw2 & 0xFFF) as u32;
            let address = if offset == 0 {
                format!("[{}]", reg(rn))
            } else {
                format!("[{}, {}]", reg(rn), imm(offset))
            };
            return ok(&format!("{}.w", mnemonic), format!("{}, {}", reg(rt), address));
        }

        if hw2 & 0x0800 != 0 {
            let p = hw2 & 0x400 != 0;
            let u = hw2 & 0x200 != 0;
            let w = hw2 & 0x100 != 0;
            let offset = (hw2 & 0xFF) as u32;
            let sign = if u { "" } else { "-" };

            if rn == 13 && offset == 4 && w {
                if load && !p && u && mnemonic == "ldr" {
                    return ok("pop.w", format!("{{{}}}", reg(rt)));
                }
                if !load && p && !u && mnemonic == "str" {
                    return ok("push.w", format!("{{{}}}", reg(rt)));
                }
            }

            let address = match (p, w) {
                (true, false) => format!("[{}, #{}0x{:x}]", reg(rn), sign, offset),
                (true, true) => format!("[{}, #{}0x{:x}]!", reg(rn), sign, offset),
                (false, true) => format!("[{}], #{}0x{:x}", reg(rn), sign, offset),
                (false, false) => return unknown(),
            };
            let mnemonic = if p && !w && u { format!("{}t", mnemonic) } else { mnemonic.to_string() };
            return ok(&mnemonic, format!("{}, {}", reg(rt), address));
        }

        if hw2 & 0x0FC0 == 0 {
            let rm = hw2 & 0xF;
            let shift = ((hw2 >> 4) & 0x3) as u32;
            let address = if shift == 0 {
                format!("[{}, {}]", reg(rn), reg(rm))
            } else {
                format!("[{}, {}, lsl #{}]", reg(rn), reg(rm), shift)
            };
            return ok(&format!("{}.w", mnemonic), format!("{}, {}", reg(rt), address));
        }

        return unknown();
    }

    // Multiply
    if hw1 & 0xFFF0 == 0xFB00 && hw2 & 0x00F0 == 0 {
        let rn = hw1 & 0xF;
        let ra = (hw2 >> 12) & 0xF;
        let rd = (hw2 >> 8) & 0xF;
        let rm = hw2 & 0xF;
        return if ra == 15 {
            ok("mul.w", format!("{}, {}, {}", reg(rd), reg(rn), reg(rm)))
        } else {
            ok("mla", format!("{}, {}, {}, {}", reg(rd), reg(rn), reg(rm), reg(ra)))
        };
    }

    unknown()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8], address: u32) -> Instruction {
        ThumbDecoder::new().decode(bytes, address).unwrap()
    }

    #[test]
    fn test_decode_movw_movt() {
        let movw = decode(&[0x46, 0xF2, 0x10, 0x03], 0x1000);
        assert_eq!(movw.mnemonic, "movw");
        assert_eq!(movw.operands, "r3, #0x6010");

        let movt = decode(&[0xC1, 0xF2, 0x00, 0x03], 0x1004);
        assert_eq!(movt.mnemonic, "movt");
        assert_eq!(movt.operands, "r3, #0x1000");
        assert_eq!(movt.size(), 4);
    }

    #[test]
    fn test_decode_short_forms() {
        assert_eq!(decode(&[0x70, 0x47], 0).text(), "bx lr");
        assert_eq!(decode(&[0x10, 0xB5], 0).text(), "push {r4, lr}");
        assert_eq!(decode(&[0x10, 0xBD], 0).text(), "pop {r4, pc}");
        assert_eq!(decode(&[0x05, 0x23], 0).text(), "movs r3, #0x5");
        assert_eq!(decode(&[0x00, 0xBF], 0).text(), "nop");
        assert_eq!(decode(&[0x02, 0x48], 0x1000).text(), "ldr r0, [pc, #0x8]");
        assert_eq!(decode(&[0x4C, 0xF8, 0x04, 0x00], 0).mnemonic, "str.w");
    }

    #[test]
    fn test_decode_conditional_branch() {
        let bne = decode(&[0x06, 0xD1], 0x1000_A000);
        assert_eq!(bne.mnemonic, "bne");
        assert_eq!(bne.branch_target(), Some(0x1000_A010));

        let back = decode(&[0xFE, 0xE7], 0x2000);
        assert_eq!(back.text(), "b #0x2000");
    }

    #[test]
    fn test_decode_cbz() {
        // cbz r0, +0x10 from 0x100
        let cbz = decode(&[0x40, 0xB1], 0x100);
        assert_eq!(cbz.mnemonic, "cbz");
        assert_eq!(cbz.branch_target(), Some(0x114));
    }

    #[test]
    fn test_decode_bl() {
        // bl from 0x1000 to 0x2000: offset 0xFFC
        let bl = decode(&[0x00, 0xF0, 0xFE, 0xFF], 0x1000);
        assert_eq!(bl.mnemonic, "bl");
        assert_eq!(bl.branch_target(), Some(0x2000));
    }

    #[test]
    fn test_decode_it_block() {
        assert_eq!(decode(&[0x18, 0xBF], 0).text(), "it ne");
        assert_eq!(decode(&[0x0C, 0xBF], 0).text(), "ite eq");
    }

    #[test]
    fn test_undefined_stops_decoding() {
        assert!(ThumbDecoder::new().decode(&[0x00, 0xDE], 0).is_none());
        assert!(ThumbDecoder::new().decode(&[0x46, 0xF2], 0).is_none());

        let code = [0x00, 0xBF, 0x70, 0x47, 0x00, 0xDE, 0x00, 0xBF];
        let decoder = ThumbDecoder::new();
        let run: Vec<Instruction> = decoder.decode_all(&code, 0x100, 0x100).collect();
        assert_eq!(run.len(), 2);
    }

    #[test]
    fn test_thumb_expand_imm() {
        assert_eq!(thumb_expand_imm(0x0AB), 0xAB);
        assert_eq!(thumb_expand_imm(0x1AB), 0x00AB_00AB);
        assert_eq!(thumb_expand_imm(0x2AB), 0xAB00_AB00);
        assert_eq!(thumb_expand_imm(0x3AB), 0xABAB_ABAB);
        assert_eq!(thumb_expand_imm(0x4FF), 0x7F80_0000);
    }
}
