use std::fmt::{Display, Formatter};
use std::str::FromStr;

use blake2::{digest::consts::U32, Blake2b, Digest};
use data_encoding::HEXLOWER;
use ed25519_dalek::VerifyingKey;
use mongodb::bson::Bson;
use rocket::{
    http::{
        impl_from_uri_param_identity,
        uri::fmt::{Path, UriDisplay},
    },
    request::FromParam,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

type Blake2b256 = Blake2b<U32>;

/// A wallet address: `0x` followed by 40 hex characters, derived from the
/// holder's public key. Stored and compared in lowercase; parsing accepts
/// either case.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

/// Number of address bytes taken from the public key digest.
const ADDRESS_BYTES: usize = 20;
/// Total textual length: `0x` + 2 chars per byte.
const ADDRESS_LEN: usize = 2 + ADDRESS_BYTES * 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("Address must start with 0x")]
    MissingPrefix,
    #[error("Address must be {ADDRESS_LEN} characters long")]
    BadLength,
    #[error("Address must be hexadecimal")]
    BadCharacter,
}

impl WalletAddress {
    /// Derive the address of the given public key: the trailing 20 bytes of
    /// its Blake2b-256 digest, hex-encoded.
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        let digest = Blake2b256::digest(key.as_bytes());
        let tail = &digest[digest.len() - ADDRESS_BYTES..];
        Self(format!("0x{}", HEXLOWER.encode(tail)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WalletAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !(s.starts_with("0x") || s.starts_with("0X")) {
            return Err(AddressParseError::MissingPrefix);
        }
        if s.len() != ADDRESS_LEN {
            return Err(AddressParseError::BadLength);
        }
        if !s[2..].bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressParseError::BadCharacter);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl From<WalletAddress> for Bson {
    fn from(address: WalletAddress) -> Self {
        Bson::String(address.0)
    }
}

// Note: `From<&WalletAddress> for Bson` is provided automatically by bson's
// blanket `impl<T: Clone + Into<Bson>> From<&T> for Bson`, which clones and
// reuses the owned conversion above — identical behavior to an explicit impl.

impl<'a> FromParam<'a> for WalletAddress {
    type Error = AddressParseError;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        param.parse()
    }
}

impl UriDisplay<Path> for WalletAddress {
    fn fmt(&self, formatter: &mut rocket::http::uri::fmt::Formatter<'_, Path>) -> std::fmt::Result {
        formatter.write_value(&self.0)
    }
}

impl_from_uri_param_identity!([Path] WalletAddress);

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn derive_is_deterministic() {
        let key = SigningKey::from_bytes(&[7u8; 32]).verifying_key();
        let a1 = WalletAddress::from_public_key(&key);
        let a2 = WalletAddress::from_public_key(&key);
        assert_eq!(a1, a2);
        assert_eq!(a1.as_str().len(), ADDRESS_LEN);
        assert!(a1.as_str().starts_with("0x"));
    }

    #[test]
    fn different_keys_different_addresses() {
        let k1 = SigningKey::from_bytes(&[1u8; 32]).verifying_key();
        let k2 = SigningKey::from_bytes(&[2u8; 32]).verifying_key();
        assert_ne!(
            WalletAddress::from_public_key(&k1),
            WalletAddress::from_public_key(&k2)
        );
    }

    #[test]
    fn parse_normalises_case() {
        let upper = "0xDEADBEEFDEADBEEFDEADBEEFDEADBEEFDEADBEEF";
        let lower = upper.to_ascii_lowercase();
        assert_eq!(
            upper.parse::<WalletAddress>().unwrap(),
            lower.parse::<WalletAddress>().unwrap()
        );
    }

    #[test]
    fn malformed_rejected() {
        assert_eq!(
            "deadbeef".parse::<WalletAddress>(),
            Err(AddressParseError::MissingPrefix)
        );
        assert_eq!(
            "0xdeadbeef".parse::<WalletAddress>(),
            Err(AddressParseError::BadLength)
        );
        assert_eq!(
            "0xzzadbeefdeadbeefdeadbeefdeadbeefdeadbeef".parse::<WalletAddress>(),
            Err(AddressParseError::BadCharacter)
        );
    }
}
