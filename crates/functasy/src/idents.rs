//! Base-62 identifier codec.
//!
//! Identifiers in source text are fixed-width runs of `[0-9a-zA-Z]` decoded as
//! base-62 numbers: `0-9` map to 0–9, `a-z` to 10–35 and `A-Z` to 36–61. The
//! width of a run is not written in the source; it is implied by the nesting
//! depth at which the identifier appears, so the same digits mean different
//! things at different depths.

/// Number of distinct identifier digits.
pub const BASE: u32 = 62;

const DIGITS: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Value of a single identifier digit, or `None` if the byte is not a digit.
#[must_use]
pub fn digit(byte: u8) -> Option<u32> {
    match byte {
        b'0'..=b'9' => Some(u32::from(byte - b'0')),
        b'a'..=b'z' => Some(10 + u32::from(byte - b'a')),
        b'A'..=b'Z' => Some(36 + u32::from(byte - b'A')),
        _ => None,
    }
}

/// Number of base-62 digits an identifier token occupies at the given nesting
/// depth. Depths 1–61 need one digit, 62–3843 two, and so on. Depth 0 admits
/// no identifiers at all and yields width 0.
#[must_use]
pub fn width_for_depth(depth: u32) -> usize {
    let mut width = 0;
    let mut d = depth;
    while d != 0 {
        d /= BASE;
        width += 1;
    }
    width
}

/// Decodes a digit run, most significant digit first.
///
/// The caller is expected to have validated the bytes; non-digit bytes are
/// treated as zero.
#[must_use]
pub fn decode(digits: &[u8]) -> u32 {
    digits
        .iter()
        .fold(0, |acc, &b| acc * BASE + digit(b).unwrap_or(0))
}

/// Encodes an id as a digit string of exactly `width` characters, padding with
/// `'0'` on the left.
#[must_use]
pub fn encode(id: u32, width: usize) -> String {
    let mut out = vec![b'0'; width];
    let mut id = id;
    for slot in out.iter_mut().rev() {
        *slot = DIGITS[(id % BASE) as usize];
        id /= BASE;
    }
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_values() {
        assert_eq!(digit(b'0'), Some(0));
        assert_eq!(digit(b'9'), Some(9));
        assert_eq!(digit(b'a'), Some(10));
        assert_eq!(digit(b'z'), Some(35));
        assert_eq!(digit(b'A'), Some(36));
        assert_eq!(digit(b'Z'), Some(61));
        assert_eq!(digit(b'('), None);
        assert_eq!(digit(b'~'), None);
    }

    #[test]
    fn widths() {
        assert_eq!(width_for_depth(0), 0);
        assert_eq!(width_for_depth(1), 1);
        assert_eq!(width_for_depth(61), 1);
        assert_eq!(width_for_depth(62), 2);
        assert_eq!(width_for_depth(3843), 2);
        assert_eq!(width_for_depth(3844), 3);
    }

    #[test]
    fn round_trip() {
        for id in [0, 1, 9, 10, 35, 36, 61, 62, 100, 3843, 123_456] {
            let width = width_for_depth(id + 1);
            let text = encode(id, width);
            assert_eq!(decode(text.as_bytes()), id);
        }
        assert_eq!(decode(b"10"), 62);
        assert_eq!(decode(b"zZ"), 35 * 62 + 61);
        assert_eq!(encode(0, 3), "000");
        assert_eq!(encode(61, 1), "Z");
    }
}
