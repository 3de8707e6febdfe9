//! Ed25519 keypairs and addresses.
//!
//! An address is the base58 encoding of an Ed25519 public key; parsing
//! validates the decoded bytes are a usable key. Signatures travel as base58
//! strings next to the payloads they cover.

use crate::Error;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A validated, textual public-key address.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Address {
    encoded: String,
    key: VerifyingKey,
}

impl Address {
    /// Parse and validate a base58 public-key address.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| Error::BadPublicAddress)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| Error::BadPublicAddress)?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|_| Error::BadPublicAddress)?;
        Ok(Address {
            encoded: s.to_string(),
            key,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Verify a base58 signature over `message` against this address.
    pub fn verify(&self, message: &[u8], signature: &str) -> Result<(), Error> {
        let bytes = bs58::decode(signature)
            .into_vec()
            .map_err(|_| Error::SignatureVerificationFailed)?;
        let bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|_| Error::SignatureVerificationFailed)?;
        let signature = Signature::from_bytes(&bytes);
        self.key
            .verify(message, &signature)
            .map_err(|_| Error::SignatureVerificationFailed)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.encoded)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encoded)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

/// An Ed25519 signing keypair.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a fresh random keypair.
    pub fn random() -> Self {
        KeyPair {
            signing: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Rebuild a keypair from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        KeyPair {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Rebuild a keypair from a base58-encoded 32-byte seed.
    pub fn from_secret(secret: &str) -> Result<Self, Error> {
        let bytes = bs58::decode(secret)
            .into_vec()
            .map_err(|_| Error::BadPublicAddress)?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| Error::BadPublicAddress)?;
        Ok(Self::from_seed(seed))
    }

    /// Base58 encoding of the secret seed.
    pub fn secret(&self) -> String {
        bs58::encode(self.signing.to_bytes()).into_string()
    }

    /// The public address of this keypair.
    pub fn address(&self) -> Address {
        let key = self.signing.verifying_key();
        Address {
            encoded: bs58::encode(key.as_bytes()).into_string(),
            key,
        }
    }

    /// Sign `message`, returning a base58-encoded signature.
    pub fn sign(&self, message: &[u8]) -> String {
        let signature = self.signing.sign(message);
        bs58::encode(signature.to_bytes()).into_string()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({})", self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = KeyPair::random();
        let signature = kp.sign(b"payload");
        assert!(kp.address().verify(b"payload", &signature).is_ok());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let kp = KeyPair::random();
        let other = KeyPair::random();
        let signature = kp.sign(b"payload");
        assert_eq!(
            other.address().verify(b"payload", &signature),
            Err(Error::SignatureVerificationFailed)
        );
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = KeyPair::random();
        let signature = kp.sign(b"payload");
        assert_eq!(
            kp.address().verify(b"payloaX", &signature),
            Err(Error::SignatureVerificationFailed)
        );
    }

    #[test]
    fn address_parse_round_trip() {
        let kp = KeyPair::random();
        let addr = kp.address();
        let parsed = Address::parse(addr.as_str()).unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn address_parse_rejects_garbage() {
        assert_eq!(Address::parse("not-base58-0OIl"), Err(Error::BadPublicAddress));
        assert_eq!(Address::parse("abc"), Err(Error::BadPublicAddress));
    }

    #[test]
    fn keypair_secret_round_trip() {
        let kp = KeyPair::random();
        let restored = KeyPair::from_secret(&kp.secret()).unwrap();
        assert_eq!(restored.address(), kp.address());
    }
}
