//! ZKTeco checksum algorithm
//!
//! 1. Lay out the header with the checksum field zeroed:
//!    `[Command, 0x0000, SessionID, ReplyID, Payload]`
//! 2. Sum the buffer as unsigned 16-bit little-endian words; a trailing odd
//!    byte is added as-is
//! 3. Reduce the running sum modulo `0xFFFF` after every addition
//! 4. The checksum is `0xFFFF - sum - 1`

use tracing::trace;

const USHRT_MAX: u32 = 0xFFFF;

/// Calculate ZKTeco packet checksum
///
/// # Examples
///
/// ```
/// use zklink_core::checksum;
///
/// // CMD_CONNECT with no session and no payload
/// assert_eq!(checksum::calculate(1000, 0, 0, &[]), 64534);
/// ```
pub fn calculate(command: u16, session_id: u16, reply_id: u16, payload: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    // Header words; the zeroed checksum slot contributes nothing
    for word in [command, 0, session_id, reply_id] {
        sum = (sum + u32::from(word)) % USHRT_MAX;
    }

    // The header is word-aligned, so payload words line up with the full frame
    for chunk in payload.chunks(2) {
        let word = match *chunk {
            [lo, hi] => u32::from(u16::from_le_bytes([lo, hi])),
            [odd] => u32::from(odd),
            _ => 0,
        };
        sum = (sum + word) % USHRT_MAX;
    }

    let checksum = (USHRT_MAX - sum - 1) as u16;

    trace!(
        command = command,
        session_id = session_id,
        reply_id = reply_id,
        payload_len = payload.len(),
        checksum = format!("0x{:04X}", checksum),
        "Calculated checksum"
    );

    checksum
}

/// Verify checksum
pub fn verify(
    command: u16,
    session_id: u16,
    reply_id: u16,
    payload: &[u8],
    expected: u16,
) -> bool {
    calculate(command, session_id, reply_id, payload) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_checksum_is_nonzero() {
        let checksum = calculate(1000, 0, 0, &[]);
        assert_eq!(checksum, 64534);
        assert_ne!(checksum, 0);
    }

    #[test]
    fn test_checksum_folds_modulo_ushrt_max() {
        // 0xFFFF alone reduces to zero, leaving the empty-sum checksum
        assert_eq!(calculate(0xFFFF, 0, 0, &[]), 0xFFFE);
        // Two large words wrap instead of overflowing
        let wrapped = calculate(0xFFF0, 0x0020, 0, &[]);
        assert_eq!(wrapped, (0xFFFF - ((0xFFF0u32 + 0x20) % 0xFFFF) - 1) as u16);
    }

    #[test]
    fn test_checksum_verify() {
        let payload = vec![0xAB, 0xCD];
        let checksum = calculate(1000, 50, 100, &payload);

        assert!(verify(1000, 50, 100, &payload, checksum));
        assert!(!verify(1000, 50, 100, &payload, checksum.wrapping_add(1)));
    }

    #[test]
    fn test_checksum_depends_on_every_header_field() {
        let base = calculate(1000, 10, 20, &[]);
        assert_ne!(base, calculate(1001, 10, 20, &[]));
        assert_ne!(base, calculate(1000, 11, 20, &[]));
        assert_ne!(base, calculate(1000, 10, 21, &[]));
    }

    #[test]
    fn test_checksum_odd_payload_length() {
        // Trailing byte counts as a low byte
        assert_eq!(calculate(1000, 0, 0, &[1, 2, 3]), calculate(1000, 0, 0, &[1, 2, 3, 0]));
        assert_ne!(calculate(1000, 0, 0, &[1, 2, 3]), calculate(1000, 0, 0, &[1, 2]));
    }

    #[test]
    fn test_checksum_large_payload() {
        let payload = vec![0xFF; 1000];
        assert_eq!(calculate(1501, 7, 9, &payload), calculate(1501, 7, 9, &payload));
    }
}
