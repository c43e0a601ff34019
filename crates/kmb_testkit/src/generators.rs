//! Property-based test generators using proptest.
//!
//! Strategies stick to plain Rust types so any crate in the workspace can
//! build its own values from them.

use proptest::prelude::*;

/// Every signed 64-bit integer, with the boundaries weighted in.
pub fn bigint_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![
        1 => Just(i64::MIN),
        1 => Just(i64::MAX),
        1 => Just(0i64),
        10 => any::<i64>(),
    ]
}

/// Integers just outside the signed 64-bit range.
pub fn out_of_range_strategy() -> impl Strategy<Value = i128> {
    prop_oneof![
        (i128::from(i64::MAX) + 1)..=(i128::from(i64::MAX) + 1_000_000),
        (i128::from(i64::MIN) - 1_000_000)..=(i128::from(i64::MIN) - 1),
    ]
}

/// Nanosecond timestamps across the representable range, either sign.
pub fn timestamp_nanos_strategy() -> impl Strategy<Value = i64> {
    any::<i64>()
}

/// Text without interior NUL bytes.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[^\\x00]{0,64}").expect("Invalid regex")
}

/// Valid stream names (1-256 characters).
pub fn stream_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_.-]{0,63}").expect("Invalid regex")
}

/// Non-empty batches of event payloads.
pub fn payload_batch_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..256), 1..16)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn out_of_range_never_fits(n in out_of_range_strategy()) {
            prop_assert!(i64::try_from(n).is_err());
        }

        #[test]
        fn text_has_no_nul(s in text_strategy()) {
            prop_assert!(!s.contains('\0'));
        }

        #[test]
        fn batches_are_non_empty(batch in payload_batch_strategy()) {
            prop_assert!(!batch.is_empty());
        }
    }
}
