use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Target searched when none is configured. Its preimage is unknown.
pub const DEFAULT_TARGET: [u8; 64] = [
    31, 170, 185, 181, 210, 39, 72, 40, 255, 117, 96, 90, 121, 201, 145, 63, 13, 202, 13, 142,
    164, 251, 209, 132, 128, 48, 104, 21, 231, 143, 163, 137, 178, 196, 163, 143, 222, 67, 248,
    235, 66, 125, 101, 252, 253, 105, 79, 57, 215, 130, 146, 138, 28, 228, 200, 242, 40, 164, 38,
    160, 24, 254, 152, 165,
];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TargetError {
    #[error("target digest is empty")]
    Empty,
    #[error("invalid hex target: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid byte `{token}` in decimal target list")]
    Byte { token: String },
}

/// The digest every slot's combined output is compared against.
///
/// Its length is the number of bytes that take part in the comparison.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TargetDigest(Vec<u8>);

impl TargetDigest {
    pub fn new(bytes: Vec<u8>) -> Result<Self, TargetError> {
        if bytes.is_empty() {
            return Err(TargetError::Empty);
        }
        Ok(Self(bytes))
    }

    /// Parse hex text. Whitespace and a leading `0x` are ignored.
    pub fn from_hex(text: &str) -> Result<Self, TargetError> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let digits = compact
            .strip_prefix("0x")
            .or_else(|| compact.strip_prefix("0X"))
            .unwrap_or(&compact);
        Self::new(hex::decode(digits)?)
    }

    /// Parse a comma-separated list of decimal bytes, e.g. `31, 170, 185`.
    pub fn from_decimal_list(text: &str) -> Result<Self, TargetError> {
        let bytes = text
            .trim()
            .trim_start_matches('{')
            .trim_end_matches('}')
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<u8>().map_err(|_| TargetError::Byte {
                    token: t.to_string(),
                })
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes compared per slot.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl Default for TargetDigest {
    fn default() -> Self {
        Self(DEFAULT_TARGET.to_vec())
    }
}

impl FromStr for TargetDigest {
    type Err = TargetError;

    /// Decimal lists are recognised by their commas; anything else is hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(',') {
            Self::from_decimal_list(s)
        } else {
            Self::from_hex(s)
        }
    }
}

impl fmt::Display for TargetDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for TargetDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_and_decimal_forms_agree() {
        let from_hex: TargetDigest = "0x1faa b9b5".parse().expect("hex");
        let from_list: TargetDigest = "{31, 170, 185, 181}".parse().expect("list");
        assert_eq!(from_hex, from_list);
        assert_eq!(from_hex.to_string(), "1faab9b5");
        assert_eq!(from_hex.len(), 4);
    }

    #[test]
    fn default_target_round_trips_through_hex() {
        let target = TargetDigest::default();
        assert_eq!(target.len(), 64);
        let parsed = TargetDigest::from_hex(&target.to_hex()).expect("parse");
        assert_eq!(parsed, target);
    }

    #[test]
    fn rejects_empty_and_malformed_targets() {
        assert_eq!(TargetDigest::from_hex(""), Err(TargetError::Empty));
        assert!(matches!(
            TargetDigest::from_hex("abc"),
            Err(TargetError::Hex(_))
        ));
        match TargetDigest::from_decimal_list("1, 256") {
            Err(TargetError::Byte { token }) => assert_eq!(token, "256"),
            other => panic!("expected Byte error, got {other:?}"),
        }
    }
}
