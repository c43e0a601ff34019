//! SQL values.
//!
//! [`Value`] is the one typed datum exchanged with the engine. Construction
//! is where typing is enforced: integers must fit in a signed 64-bit range,
//! text must be a string, booleans must be `bool`, and timestamps must be
//! whole nanoseconds. There is no conversion from floating-point types:
//!
//! ```compile_fail
//! let v = kmb_client::Value::from(1.5f64);
//! ```
//!
//! ```compile_fail
//! let ts = kmb_client::Timestamp::from(1.5f64);
//! ```

use std::ffi::c_int;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use kmb_ffi::{KMB_VALUE_BIGINT, KMB_VALUE_BOOLEAN, KMB_VALUE_NULL, KMB_VALUE_TEXT, KMB_VALUE_TIMESTAMP};
use serde::Serialize;

use crate::error::{ClientResult, Error};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Nanoseconds since the Unix epoch, UTC. Either sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The epoch.
    pub const EPOCH: Self = Self(0);

    /// Creates a timestamp from nanoseconds.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Creates a timestamp from whole seconds.
    pub fn from_secs(secs: i64) -> ClientResult<Self> {
        secs.checked_mul(NANOS_PER_SEC)
            .map(Self)
            .ok_or_else(|| Error::Type(format!("{secs} seconds does not fit in a nanosecond timestamp")))
    }

    /// Creates a timestamp from a UTC calendar time.
    pub fn from_datetime(datetime: DateTime<Utc>) -> ClientResult<Self> {
        datetime
            .timestamp_nanos_opt()
            .map(Self)
            .ok_or_else(|| Error::Type(format!("{datetime} is outside the nanosecond timestamp range")))
    }

    /// Current wall-clock time.
    pub fn now() -> ClientResult<Self> {
        Self::from_datetime(Utc::now())
    }

    /// Nanoseconds since the epoch.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Whole seconds since the epoch, rounded toward negative infinity.
    pub const fn as_secs(self) -> i64 {
        self.0.div_euclid(NANOS_PER_SEC)
    }

    /// The UTC calendar time.
    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_datetime().to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl TryFrom<DateTime<Utc>> for Timestamp {
    type Error = Error;

    fn try_from(datetime: DateTime<Utc>) -> ClientResult<Self> {
        Self::from_datetime(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.to_datetime()
    }
}

/// Wire type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// SQL NULL.
    Null,
    /// Signed 64-bit integer.
    BigInt,
    /// UTF-8 text.
    Text,
    /// Boolean.
    Boolean,
    /// Nanosecond timestamp.
    Timestamp,
}

impl ValueType {
    /// The wire type tag.
    pub fn tag(self) -> c_int {
        match self {
            ValueType::Null => KMB_VALUE_NULL,
            ValueType::BigInt => KMB_VALUE_BIGINT,
            ValueType::Text => KMB_VALUE_TEXT,
            ValueType::Boolean => KMB_VALUE_BOOLEAN,
            ValueType::Timestamp => KMB_VALUE_TIMESTAMP,
        }
    }

    /// The type for a wire tag.
    pub fn from_tag(tag: c_int) -> Option<Self> {
        match tag {
            KMB_VALUE_NULL => Some(ValueType::Null),
            KMB_VALUE_BIGINT => Some(ValueType::BigInt),
            KMB_VALUE_TEXT => Some(ValueType::Text),
            KMB_VALUE_BOOLEAN => Some(ValueType::Boolean),
            KMB_VALUE_TIMESTAMP => Some(ValueType::Timestamp),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Null => "null",
            ValueType::BigInt => "bigint",
            ValueType::Text => "text",
            ValueType::Boolean => "boolean",
            ValueType::Timestamp => "timestamp",
        })
    }
}

/// One SQL datum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Signed 64-bit integer.
    BigInt(i64),
    /// UTF-8 text.
    Text(String),
    /// Boolean.
    Boolean(bool),
    /// Nanosecond timestamp.
    Timestamp(Timestamp),
}

impl Value {
    /// Wire type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::BigInt(_) => ValueType::BigInt,
            Value::Text(_) => ValueType::Text,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Timestamp(_) => ValueType::Timestamp,
        }
    }

    /// Returns true for NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The integer, if this is a BIGINT.
    pub fn as_bigint(&self) -> Option<i64> {
        match self {
            Value::BigInt(n) => Some(*n),
            _ => None,
        }
    }

    /// The text, if this is TEXT.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean, if this is BOOLEAN.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The timestamp, if this is TIMESTAMP.
    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::BigInt(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Timestamp(ts) => write!(f, "{ts}"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::BigInt(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::BigInt(i64::from(n))
    }
}

impl TryFrom<i128> for Value {
    type Error = Error;

    fn try_from(n: i128) -> ClientResult<Self> {
        i64::try_from(n)
            .map(Value::BigInt)
            .map_err(|_| Error::Type(format!("{n} is outside the BIGINT range")))
    }
}

impl TryFrom<u64> for Value {
    type Error = Error;

    fn try_from(n: u64) -> ClientResult<Self> {
        Value::try_from(i128::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Value::Timestamp(ts)
    }
}

impl TryFrom<DateTime<Utc>> for Value {
    type Error = Error;

    fn try_from(datetime: DateTime<Utc>) -> ClientResult<Self> {
        Timestamp::from_datetime(datetime).map(Value::Timestamp)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Parses `type:literal` notation: `null`, `bigint:42`, `text:hello`,
/// `bool:true`, `ts:1700000000000000000` or `ts:2023-11-14T22:13:20Z`.
impl FromStr for Value {
    type Err = Error;

    fn from_str(s: &str) -> ClientResult<Self> {
        if s.eq_ignore_ascii_case("null") {
            return Ok(Value::Null);
        }
        let Some((kind, literal)) = s.split_once(':') else {
            return Err(Error::Type(format!(
                "expected `type:literal` or `null`, got `{s}`"
            )));
        };

        match kind.to_ascii_lowercase().as_str() {
            "bigint" | "int" => {
                let n: i128 = literal
                    .trim()
                    .parse()
                    .map_err(|_| Error::Type(format!("`{literal}` is not an integer")))?;
                Value::try_from(n)
            }
            "text" => Ok(Value::Text(literal.to_string())),
            "bool" | "boolean" => match literal.trim() {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                other => Err(Error::Type(format!("`{other}` is not a boolean"))),
            },
            "ts" | "timestamp" => {
                let literal = literal.trim();
                if let Ok(nanos) = literal.parse::<i64>() {
                    return Ok(Value::Timestamp(Timestamp::from_nanos(nanos)));
                }
                match DateTime::parse_from_rfc3339(literal) {
                    Ok(datetime) => Value::try_from(datetime.with_timezone(&Utc)),
                    Err(_) => Err(Error::Type(format!(
                        "`{literal}` is not an integer nanosecond count or RFC 3339 time"
                    ))),
                }
            }
            other => Err(Error::Type(format!("unknown value type `{other}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn bigint_range_is_enforced() {
        assert_eq!(
            Value::try_from(i128::from(i64::MAX)).unwrap(),
            Value::BigInt(i64::MAX)
        );
        assert_eq!(
            Value::try_from(i128::from(i64::MIN)).unwrap(),
            Value::BigInt(i64::MIN)
        );
        assert!(Value::try_from(1i128 << 63).is_err());
        assert!(Value::try_from(-(1i128 << 63) - 1).is_err());
        assert!(Value::try_from(u64::MAX).is_err());
        assert_eq!(Value::try_from(7u64).unwrap(), Value::BigInt(7));
    }

    #[test]
    fn timestamps_are_utc_and_floor_seconds() {
        let ts = Timestamp::from_secs(1_700_000_000).unwrap();
        assert_eq!(ts.as_nanos(), 1_700_000_000_000_000_000);
        assert_eq!(ts.to_string(), "2023-11-14T22:13:20Z");
        assert_eq!(Timestamp::from_datetime(ts.to_datetime()).unwrap(), ts);

        let before_epoch = Timestamp::from_nanos(-1);
        assert_eq!(before_epoch.as_secs(), -1);
        assert_eq!(Timestamp::from_nanos(1).as_secs(), 0);

        assert!(Timestamp::from_secs(i64::MAX).is_err());
    }

    #[test]
    fn option_maps_none_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn accessors() {
        let v = Value::from(true);
        assert_eq!(v.as_bool(), Some(true));
        assert_eq!(v.as_bigint(), None);
        assert_eq!(v.value_type(), ValueType::Boolean);
        assert_eq!(v.value_type().tag(), 3);
        assert!(Value::Null.is_null());
        assert_eq!(ValueType::from_tag(4), Some(ValueType::Timestamp));
        assert_eq!(ValueType::from_tag(9), None);
    }

    #[test]
    fn notation_parses() {
        assert_eq!("null".parse::<Value>().unwrap(), Value::Null);
        assert_eq!("bigint:-42".parse::<Value>().unwrap(), Value::BigInt(-42));
        assert_eq!("text:a:b".parse::<Value>().unwrap(), Value::Text("a:b".into()));
        assert_eq!("bool:false".parse::<Value>().unwrap(), Value::Boolean(false));
        assert_eq!(
            "ts:1700000000000000000".parse::<Value>().unwrap(),
            Value::Timestamp(Timestamp::from_nanos(1_700_000_000_000_000_000))
        );
        assert_eq!(
            "ts:2023-11-14T22:13:20Z".parse::<Value>().unwrap(),
            Value::Timestamp(Timestamp::from_secs(1_700_000_000).unwrap())
        );
    }

    #[test]
    fn notation_rejects_wrong_types_locally() {
        for bad in ["ts:1.5", "bool:1", "bigint:9223372036854775808", "bigint:x", "blob:00", "42"] {
            let err = bad.parse::<Value>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Type, "{bad}");
            assert!(err.is_local());
        }
    }

    #[test]
    fn serializes_tagged() {
        let json = serde_json::to_string(&Value::BigInt(5)).unwrap();
        assert_eq!(json, r#"{"type":"big_int","value":5}"#);
        let json = serde_json::to_string(&Value::Null).unwrap();
        assert_eq!(json, r#"{"type":"null"}"#);
    }

    proptest! {
        #[test]
        fn every_i64_constructs(n in kmb_testkit::bigint_strategy()) {
            prop_assert_eq!(Value::try_from(i128::from(n)).unwrap(), Value::BigInt(n));
        }

        #[test]
        fn out_of_range_fails(n in kmb_testkit::out_of_range_strategy()) {
            prop_assert_eq!(Value::try_from(n).unwrap_err().kind(), ErrorKind::Type);
        }

        #[test]
        fn seconds_round_trip(secs in -9_000_000_000i64..9_000_000_000i64) {
            let ts = Timestamp::from_secs(secs).unwrap();
            prop_assert_eq!(ts.as_secs(), secs);
        }
    }
}
