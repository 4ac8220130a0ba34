//! Content hashing for composed script sources
//!
//! The hash is persisted next to the compiled binary and used as the module
//! cache key, so it must be stable across processes and toolchain versions.
//! It deliberately does not use `std::hash`, whose output is unspecified.

/// Hash reserved for "not compiled".
pub const UNCOMPILED: i32 = 0;

const SEED: i32 = 23;
const FACTOR: i32 = 31;

/// Compute the 32-bit content hash of `source`.
///
/// Empty and whitespace-only input hashes to [`UNCOMPILED`]. Any other input
/// yields a non-zero value: a rolling result of 0 is remapped to the seed.
pub fn script_hash(source: &str) -> i32 {
    if source.trim().is_empty() {
        return UNCOMPILED;
    }

    let hash = source
        .encode_utf16()
        .fold(SEED, |hash, unit| {
            hash.wrapping_mul(FACTOR).wrapping_add(i32::from(unit))
        });

    if hash == UNCOMPILED {
        SEED
    } else {
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_blank_are_uncompiled() {
        assert_eq!(script_hash(""), UNCOMPILED);
        assert_eq!(script_hash("   \n\t "), UNCOMPILED);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let source = "return OpenPrice - LowPrice;";
        assert_eq!(script_hash(source), script_hash(source));
    }

    #[test]
    fn test_hash_is_order_sensitive() {
        assert_ne!(script_hash("ab"), script_hash("ba"));
    }

    #[test]
    fn test_known_values() {
        // 23 * 31 + 'a'
        assert_eq!(script_hash("a"), 23 * 31 + 97);
        // (23 * 31 + 'a') * 31 + 'b'
        assert_eq!(script_hash("ab"), (23 * 31 + 97) * 31 + 98);
    }

    #[test]
    fn test_non_ascii_uses_utf16_units() {
        // U+00E9 is a single UTF-16 unit
        assert_eq!(script_hash("\u{e9}"), 23 * 31 + 0xe9);
    }

    #[test]
    fn test_long_input_wraps_without_panic() {
        let source = "x".repeat(10_000);
        assert_ne!(script_hash(&source), UNCOMPILED);
    }
}
