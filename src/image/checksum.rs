// Tue Jan 13 2026 - Alex

/// PE image checksum: 16-bit one's-complement word sum with the four checksum
/// bytes counted as zero, plus the file length.
pub fn pe_checksum(data: &[u8], checksum_offset: usize) -> u32 {
    let field = checksum_offset..checksum_offset + 4;
    let byte_at = |i: usize| -> u64 {
        if field.contains(&i) {
            0
        } else {
            data[i] as u64
        }
    };

    let mut sum: u64 = 0;
    let mut i = 0;
    while i + 1 < data.len() {
        sum += byte_at(i) | (byte_at(i + 1) << 8);
        sum = (sum & 0xFFFF) + (sum >> 16);
        i += 2;
    }

    if data.len() % 2 == 1 {
        sum += byte_at(data.len() - 1);
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    sum = (sum & 0xFFFF) + (sum >> 16);
    (sum as u32).wrapping_add(data.len() as u32)
}
