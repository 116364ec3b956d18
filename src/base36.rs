//! Lowercase base-36 numbers, as used throughout the changeset wire format.

use std::fmt;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Write `n` in canonical form (no leading zeros).
pub fn write(f: &mut impl fmt::Write, mut n: usize) -> fmt::Result {
    if n == 0 {
        return f.write_char('0');
    }
    let mut buf = [0u8; 16];
    let mut i = buf.len();
    while n > 0 {
        i -= 1;
        buf[i] = DIGITS[n % 36];
        n /= 36;
    }
    for &b in &buf[i..] {
        f.write_char(b as char)?;
    }
    return Ok(());
}

pub fn encode(n: usize) -> String {
    let mut s = String::new();
    // Writing into a String cannot fail.
    let _ = write(&mut s, n);
    return s;
}

#[inline(always)]
pub fn is_digit(b: u8) -> bool {
    return b.is_ascii_digit() || b.is_ascii_lowercase();
}

/// Parse a run of base-36 digits. Leading zeros are accepted.
/// Returns `None` on an empty run, a non-digit or overflow.
pub fn decode(digits: &str) -> Option<usize> {
    if digits.is_empty() {
        return None;
    }
    let mut n: usize = 0;
    for b in digits.bytes() {
        let d = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'z' => b - b'a' + 10,
            _ => return None,
        };
        n = n.checked_mul(36)?.checked_add(d as usize)?;
    }
    return Some(n);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_canonically() {
        assert_eq!(encode(0), "0");
        assert_eq!(encode(35), "z");
        assert_eq!(encode(36), "10");
        assert_eq!(encode(400), "b4");
    }

    #[test]
    fn decodes_with_leading_zeros() {
        assert_eq!(decode("b4"), Some(400));
        assert_eq!(decode("00b4"), Some(400));
        assert_eq!(decode(""), None);
        assert_eq!(decode("B4"), None);
        assert_eq!(decode("zzzzzzzzzzzzzzzzzzzz"), None);
    }
}
