//! CRC calculation for program-specific information sections.
//!
//! PSI sections carry a CRC-32/MPEG-2 trailer: polynomial 0x04C11DB7,
//! initial value 0xFFFFFFFF, no reflection and no final xor.

/// CRC algorithm specification with polynomial and initial value.
pub struct Algorithm<T> {
    poly: T,
    init: T,
}

/// CRC-32 algorithm used by PAT/PMT sections.
pub const CRC_PSI_SECTION_ALG: Algorithm<u32> = Algorithm {
    poly: 0x04C1_1DB7,
    init: 0xFFFF_FFFF,
};

/// Shifts `value` through `len` bits of the polynomial division.
#[inline(always)]
pub const fn crc32(poly: u32, mut value: u32, len: usize) -> u32 {
    value <<= 24;

    let mut i = 0;
    while i < len {
        value = (value << 1) ^ (((value >> 31) & 1) * poly);
        i += 1;
    }

    value
}

#[inline(always)]
const fn crc32_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc32(poly, i as u32, 8);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc32 {
    pub poly: u32,
    pub init: u32,
    table: [u32; 256],
}

impl Crc32 {
    pub const fn new(algorithm: &Algorithm<u32>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            table: crc32_table(algorithm.poly),
        }
    }

    const fn table_entry(&self, index: u32) -> u32 {
        self.table[(index & 0xFF) as usize]
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u32, bytes: &[u8]) -> u32 {
        let mut i = 0;

        while i < bytes.len() {
            crc = self.table_entry((crc >> 24) ^ bytes[i] as u32) ^ (crc << 8);
            i += 1;
        }

        crc
    }

    #[inline(always)]
    pub const fn checksum(&self, bytes: &[u8]) -> u32 {
        self.update(self.init, bytes)
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new(&CRC_PSI_SECTION_ALG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mpeg2_check_value() {
        let crc = Crc32::default();
        assert_eq!(crc.checksum(b"123456789"), 0x0376_E6E7);
    }

    #[test]
    fn section_with_trailer_has_zero_remainder() {
        let crc = Crc32::default();
        let mut section = vec![0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xF0, 0x00];
        let sum = crc.checksum(&section);
        section.extend_from_slice(&sum.to_be_bytes());
        assert_eq!(crc.checksum(&section), 0);
    }
}
