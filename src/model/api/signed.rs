use data_encoding::HEXLOWER_PERMISSIVE;
use ed25519_dalek::{Signature, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::common::WalletAddress;

/// A message signed by a wallet key, as attached to every voter- or
/// admin-initiated mutating request.
///
/// Verification is pure: it either recovers the signer's wallet address or
/// fails, with no side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedMessage {
    /// The address the sender claims to control.
    pub address: String,
    /// Hex-encoded Ed25519 public key.
    pub public_key: String,
    /// Hex-encoded signature over the message bytes.
    pub signature: String,
    /// The plaintext that was signed.
    pub message: String,
}

impl SignedMessage {
    /// Verify the signature and recover the signer's wallet address.
    ///
    /// Succeeds iff the signature verifies under the given public key AND
    /// the address derived from that key equals the claimed address,
    /// compared case-insensitively. Every other outcome, including
    /// malformed key or signature encodings, is an [`Error::InvalidSignature`].
    pub fn verify(&self) -> Result<WalletAddress, Error> {
        let key_bytes: [u8; PUBLIC_KEY_LENGTH] = decode_fixed(&self.public_key)
            .ok_or_else(|| Error::InvalidSignature("Malformed public key".to_string()))?;
        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|_| Error::InvalidSignature("Invalid public key".to_string()))?;

        let sig_bytes: [u8; SIGNATURE_LENGTH] = decode_fixed(&self.signature)
            .ok_or_else(|| Error::InvalidSignature("Malformed signature".to_string()))?;
        let signature = Signature::from_bytes(&sig_bytes);

        key.verify(self.message.as_bytes(), &signature)
            .map_err(|_| Error::InvalidSignature("Signature verification failed".to_string()))?;

        let derived = WalletAddress::from_public_key(&key);
        if !derived.as_str().eq_ignore_ascii_case(self.address.trim()) {
            return Err(Error::InvalidSignature(
                "Signer does not match the claimed address".to_string(),
            ));
        }
        Ok(derived)
    }
}

/// Decode a hex string (with or without a `0x` prefix) into a fixed-size
/// array. Returns `None` on bad characters or wrong length.
fn decode_fixed<const N: usize>(hex: &str) -> Option<[u8; N]> {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    let bytes = HEXLOWER_PERMISSIVE.decode(hex.as_bytes()).ok()?;
    bytes.try_into().ok()
}
