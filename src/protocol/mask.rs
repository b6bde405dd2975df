//! Payload masking (RFC 6455 Section 5.3).
//!
//! Masking XORs every payload byte with `key[i % 4]`; applying the same key
//! twice restores the input.

/// Byte-by-byte XOR masking, continuing the key cycle at `offset`.
#[inline]
pub fn apply_mask_offset(data: &mut [u8], key: [u8; 4], offset: usize) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[(i + offset) % 4];
    }
}

/// Mask or unmask `data` in place, processing four bytes at a time.
#[inline]
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    let key_word = u32::from_ne_bytes(key);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ key_word;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    // The remainder always starts on a key boundary.
    apply_mask_offset(chunks.into_remainder(), key, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_rfc_example() {
        // RFC 6455 section 5.7: masked "Hello"
        let mut data = *b"Hello";
        apply_mask(&mut data, [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_mask_is_involution() {
        let original: Vec<u8> = (0..=255).collect();
        let key = [0xde, 0xad, 0xbe, 0xef];
        let mut data = original.clone();
        apply_mask(&mut data, key);
        assert_ne!(data, original);
        apply_mask(&mut data, key);
        assert_eq!(data, original);
    }

    #[test]
    fn test_word_and_bytewise_agree() {
        for len in 0..17 {
            let key = [1, 2, 3, 4];
            let mut a: Vec<u8> = (0..len as u8).collect();
            let mut b = a.clone();
            apply_mask(&mut a, key);
            apply_mask_offset(&mut b, key, 0);
            assert_eq!(a, b, "length {len}");
        }
    }

    #[test]
    fn test_mask_offset_continues_cycle() {
        let key = [0x11, 0x22, 0x33, 0x44];
        let mut whole = vec![0u8; 10];
        apply_mask(&mut whole, key);

        let mut split = vec![0u8; 10];
        let (head, tail) = split.split_at_mut(3);
        apply_mask_offset(head, key, 0);
        apply_mask_offset(tail, key, 3);
        assert_eq!(whole, split);
    }

    #[test]
    fn test_empty_data() {
        let mut data: [u8; 0] = [];
        apply_mask(&mut data, [1, 2, 3, 4]);
    }
}
