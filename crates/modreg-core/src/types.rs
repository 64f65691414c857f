//! Identifier and address types shared by every registry component.

use crate::error::{RegistryError, Result};
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Logical module names accepted by [`ModuleKey::from_name`].
static MODULE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.:-]{1,64}$").unwrap());

/// Decode a `0x`-prefixed (or bare) hex string into exactly `N` bytes.
fn decode_fixed<const N: usize>(field: &str, text: &str) -> Result<[u8; N]> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.len() != N * 2 {
        return Err(RegistryError::invalid(
            field,
            format!("expected {} hex digits, got {}", N * 2, digits.len()),
        ));
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out)
        .map_err(|e| RegistryError::invalid(field, format!("{}: {}", text, e)))?;
    Ok(out)
}

fn blob_column<const N: usize>(value: ValueRef<'_>) -> FromSqlResult<[u8; N]> {
    let blob = value.as_blob()?;
    blob.try_into().map_err(|_| FromSqlError::InvalidBlobSize {
        expected_size: N,
        blob_size: blob.len(),
    })
}

/// Opaque identifier of a logical dependency slot.
///
/// Keys are the SHA-256 digest of a logical module name such as
/// `"PriceOracle"`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleKey([u8; 32]);

impl ModuleKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive the key for a logical module name.
    pub fn from_name(name: &str) -> Result<Self> {
        if !MODULE_NAME.is_match(name) {
            return Err(RegistryError::invalid(
                "module name",
                format!("{:?} must match {}", name, MODULE_NAME.as_str()),
            ));
        }
        Ok(Self(Sha256::digest(name.as_bytes()).into()))
    }

    /// Parse either the `0x`-prefixed hex form or a logical module name.
    pub fn parse(text: &str) -> Result<Self> {
        if text.starts_with("0x") && text.len() == 66 {
            text.parse()
        } else {
            Self::from_name(text)
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleKey({})", self)
    }
}

impl FromStr for ModuleKey {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        decode_fixed::<32>("module key", s).map(Self)
    }
}

/// A 20-byte account or contract address.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; 20]);

impl Address {
    /// The all-zero address. Never a valid binding.
    pub const ZERO: Address = Address([0; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Return `Err(ZeroAddress)` for the zero address.
    pub fn require_nonzero(self) -> Result<Self> {
        if self.is_zero() {
            Err(RegistryError::ZeroAddress)
        } else {
            Ok(self)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        decode_fixed::<20>("address", s).map(Self)
    }
}

macro_rules! hex_string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&self.0)))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                blob_column(value).map(Self)
            }
        }
    };
}

hex_string_serde!(ModuleKey);
hex_string_serde!(Address);

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: u64,
    pub limit: u64,
    /// Total number of items regardless of the requested window.
    pub total_count: u64,
}
