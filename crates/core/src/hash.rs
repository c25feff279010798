//! Deterministic string hashing
//!
//! Experiment bucketing must assign a user to the same variant on every
//! platform and across releases, so it cannot use `std::hash`, whose output
//! is not stable. [`hash_string`] is the Java `String.hashCode` polynomial
//! (`h = h * 31 + unit`) over UTF-16 code units with 32-bit wraparound,
//! followed by an absolute value. The result matches the hash computed by the
//! mobile and mini-program clients for the same identifier.

/// Hash a string to a non-negative integer.
///
/// `i32::MIN` has no positive `i32` counterpart; its absolute value is
/// returned as `2147483648`, which is why the result is a `u32`.
pub fn hash_string(input: &str) -> u32 {
    let hash = input
        .encode_utf16()
        .fold(0i32, |acc, unit| acc.wrapping_mul(31).wrapping_add(unit as i32));
    hash.unsigned_abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        let vectors: &[(&str, u32)] = &[
            ("", 0),
            ("a", 97),
            ("abc", 96354),
            ("hello", 99162322),
            ("user123", 147178873),
            ("user-42", 147182656),
            ("中文", 646394),
        ];

        for (input, expected) in vectors {
            assert_eq!(hash_string(input), *expected, "hash of {:?}", input);
        }
    }

    #[test]
    fn test_min_value_absolute() {
        // Java hashCode of this string is Integer.MIN_VALUE
        assert_eq!(hash_string("polygenelubricants"), 2_147_483_648);
    }

    #[test]
    fn test_collisions_are_stable() {
        assert_eq!(hash_string("Aa"), hash_string("BB"));
        assert_eq!(hash_string("Aa"), 2112);
    }

    #[test]
    fn test_repeatable() {
        let openid = "wechat:o6_bmjrPTlm6_2sgVt7hMZOPfL2M";
        let first = hash_string(openid);
        for _ in 0..10 {
            assert_eq!(hash_string(openid), first);
        }
    }
}
