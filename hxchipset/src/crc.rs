const CRC_POLY: u32 = 0x82F6_3B78;

/// CRC over little-endian 32-bit words, as computed by the controller's
/// reload engine. Trailing bytes that do not fill a word are ignored.
///
/// An image that ends with its own CRC word folds to 0.
pub fn crc_with_ap(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for word in data.chunks_exact(4) {
        crc ^= u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        for _ in 0..32 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC_POLY
            } else {
                crc >> 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_keeps_seed() {
        assert_eq!(crc_with_ap(&[]), 0xFFFF_FFFF);
        assert_eq!(crc_with_ap(&[1, 2, 3]), 0xFFFF_FFFF);
    }

    #[test]
    fn appended_crc_folds_to_zero() {
        let mut image: alloc::vec::Vec<u8> = (0..256u32).map(|v| (v ^ 0x5A) as u8).collect();
        let crc = crc_with_ap(&image);
        image.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(crc_with_ap(&image), 0);
    }

    #[test]
    fn single_bit_flip_changes_result() {
        let a = [0u8; 16];
        let mut b = a;
        b[9] = 0x04;
        assert_ne!(crc_with_ap(&a), crc_with_ap(&b));
    }
}
