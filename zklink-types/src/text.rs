//! NUL-padded ASCII fields

/// Read a fixed-width field up to its first NUL
pub(crate) fn read_field(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).trim().to_string()
}

/// Write `value` into a fixed-width field, NUL padded and truncated to fit
pub(crate) fn write_field(dst: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(dst.len());
    dst[..n].copy_from_slice(&bytes[..n]);
    dst[n..].fill(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_round_trip() {
        let mut buf = [0xFFu8; 8];
        write_field(&mut buf, "abc");
        assert_eq!(buf, *b"abc\0\0\0\0\0");
        assert_eq!(read_field(&buf), "abc");
    }

    #[test]
    fn test_unterminated_field() {
        assert_eq!(read_field(b"12345678"), "12345678");
        assert_eq!(read_field(b"\0garbage"), "");
    }
}
