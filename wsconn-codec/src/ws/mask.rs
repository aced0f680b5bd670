/// Mask or unmask `buf` in place with the 4-byte masking key.
#[inline]
pub(super) fn apply_mask(buf: &mut [u8], mask: [u8; 4]) {
    for (idx, byte) in buf.iter_mut().enumerate() {
        *byte ^= mask[idx & 3];
    }
}

#[cfg(test)]
mod tests {
    use super::apply_mask;

    #[test]
    fn test_apply_mask() {
        let mask = [0x6d, 0xb6, 0xb2, 0x80];
        let unmasked = vec![
            0xf3, 0x00, 0x01, 0x02, 0x03, 0x80, 0x81, 0x82, 0xff, 0xfe, 0x00, 0x17,
            0x74, 0xf9, 0x12, 0x03,
        ];

        let mut masked = unmasked.clone();
        apply_mask(&mut masked, mask);
        assert_eq!(masked[0], 0xf3 ^ 0x6d);
        assert_eq!(masked[5], 0x80 ^ 0xb6);
        assert_ne!(masked, unmasked);

        apply_mask(&mut masked, mask);
        assert_eq!(masked, unmasked);
    }
}
