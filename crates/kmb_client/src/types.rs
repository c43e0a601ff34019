//! Identifier and record types.

use std::ffi::c_int;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use kmb_ffi::{KMB_DATA_CLASS_DEIDENTIFIED, KMB_DATA_CLASS_NON_PHI, KMB_DATA_CLASS_PHI};
use serde::Serialize;

use crate::error::Error;

/// Handle to an append-only event stream. Assigned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StreamId(pub u64);

/// Position in a stream, or in the cluster log for point-in-time queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Offset(pub u64);

/// Tenant isolation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TenantId(pub u64);

macro_rules! id_impls {
    ($($ty:ident),*) => {$(
        impl $ty {
            /// Returns the raw value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $ty {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl From<$ty> for u64 {
            fn from(id: $ty) -> Self {
                id.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    )*};
}

id_impls!(StreamId, Offset, TenantId);

impl Offset {
    /// The first record of a stream.
    pub const ZERO: Offset = Offset(0);
}

/// Sensitivity classification fixed at stream creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataClass {
    /// Regulated personal data.
    Phi,
    /// Not regulated.
    NonPhi,
    /// De-identified.
    Deidentified,
}

impl DataClass {
    /// Wire value.
    pub fn as_raw(self) -> c_int {
        match self {
            DataClass::Phi => KMB_DATA_CLASS_PHI,
            DataClass::NonPhi => KMB_DATA_CLASS_NON_PHI,
            DataClass::Deidentified => KMB_DATA_CLASS_DEIDENTIFIED,
        }
    }

    /// Class for a wire value.
    pub fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            KMB_DATA_CLASS_PHI => Some(DataClass::Phi),
            KMB_DATA_CLASS_NON_PHI => Some(DataClass::NonPhi),
            KMB_DATA_CLASS_DEIDENTIFIED => Some(DataClass::Deidentified),
            _ => None,
        }
    }
}

impl fmt::Display for DataClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataClass::Phi => "phi",
            DataClass::NonPhi => "non-phi",
            DataClass::Deidentified => "deidentified",
        })
    }
}

impl FromStr for DataClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "phi" => Ok(DataClass::Phi),
            "non-phi" => Ok(DataClass::NonPhi),
            "deidentified" => Ok(DataClass::Deidentified),
            other => Err(Error::InvalidArgument(format!(
                "unknown data class `{other}` (expected phi, non-phi or deidentified)"
            ))),
        }
    }
}

/// One record read from a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Stream offset as reported by the engine; `None` if the engine does
    /// not report per-event offsets.
    pub offset: Option<Offset>,
    /// Payload bytes.
    pub data: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_class_wire_values() {
        assert_eq!(DataClass::Phi.as_raw(), 0);
        assert_eq!(DataClass::NonPhi.as_raw(), 1);
        assert_eq!(DataClass::Deidentified.as_raw(), 2);
        assert_eq!(DataClass::from_raw(1), Some(DataClass::NonPhi));
        assert_eq!(DataClass::from_raw(3), None);
    }

    #[test]
    fn data_class_text() {
        for class in [DataClass::Phi, DataClass::NonPhi, DataClass::Deidentified] {
            assert_eq!(class.to_string().parse::<DataClass>().unwrap(), class);
        }
        assert_eq!("NON_PHI".parse::<DataClass>().unwrap(), DataClass::NonPhi);
        assert!("secret".parse::<DataClass>().is_err());
    }

    #[test]
    fn ids_convert() {
        let id = StreamId::from(9);
        assert_eq!(u64::from(id), 9);
        assert_eq!(Offset(3).to_string(), "3");
        assert!(Offset::ZERO < Offset(1));
    }
}
