// Tue Jan 13 2026 - Alex

//! Encoders for the handful of Thumb instructions the patcher writes itself.

pub const NOP16: [u8; 2] = [0x00, 0xBF];
pub const NOP32: [u8; 4] = [0xAF, 0xF3, 0x00, 0x80];

fn branch_offset(from: u32, to: u32) -> i64 {
    to as i64 - (from as i64 + 4)
}

fn halfwords(hw1: u16, hw2: u16) -> [u8; 4] {
    let a = hw1.to_le_bytes();
    let b = hw2.to_le_bytes();
    [a[0], a[1], b[0], b[1]]
}

/// 16-bit unconditional `b` (encoding T2), range -2048..=2046.
pub fn encode_b16(from: u32, to: u32) -> Option<[u8; 2]> {
    let offset = branch_offset(from, to);
    if offset % 2 != 0 || !(-2048..=2046).contains(&offset) {
        return None;
    }
    let hw = 0xE000 | (((offset >> 1) as u16) & 0x07FF);
    Some(hw.to_le_bytes())
}

/// 32-bit `b.w` (encoding T4), range +-16MB.
pub fn encode_b32(from: u32, to: u32) -> Option<[u8; 4]> {
    encode_long_branch(from, to, 0x9000)
}

/// 32-bit `bl`.
pub fn encode_bl(from: u32, to: u32) -> Option<[u8; 4]> {
    encode_long_branch(from, to, 0xD000)
}

fn encode_long_branch(from: u32, to: u32, kind: u16) -> Option<[u8; 4]> {
    let offset = branch_offset(from, to);
    if offset % 2 != 0 || !(-(1 << 24)..(1 << 24)).contains(&offset) {
        return None;
    }
    let value = offset as u32;
    let s = (value >> 24) & 1;
    let i1 = (value >> 23) & 1;
    let i2 = (value >> 22) & 1;
    let j1 = (!i1 ^ s) & 1;
    let j2 = (!i2 ^ s) & 1;
    let imm10 = (value >> 12) & 0x3FF;
    let imm11 = (value >> 1) & 0x7FF;

    let hw1 = 0xF000 | (s << 10) as u16 | imm10 as u16;
    let hw2 = kind | (j1 << 13) as u16 | (j2 << 11) as u16 | imm11 as u16;
    Some(halfwords(hw1, hw2))
}

/// Unconditional branch of exactly `size` bytes (2 or 4).
pub fn encode_branch(size: u32, from: u32, to: u32) -> Option<Vec<u8>> {
    match size {
        2 => encode_b16(from, to).map(|b| b.to_vec()),
        4 => encode_b32(from, to).map(|b| b.to_vec()),
        _ => None,
    }
}

/// No-op filler of exactly `size` bytes.
pub fn encode_nop(size: u32) -> Option<Vec<u8>> {
    match size {
        2 => Some(NOP16.to_vec()),
        4 => Some(NOP32.to_vec()),
        _ => None,
    }
}
