//! Cryptographic primitives shared by every image layer.
//!
//! Three things live here: SHA-256 hashing, the AES-128-CBC cipher keyed by
//! the BEK, and RSASSA-PSS signing/verification. Nothing in this module keeps
//! global state; keys are built by the caller and lent to the codecs.

pub mod bek;
pub mod rsa_key;

pub use bek::Bek;
pub use rsa_key::RsaKey;

use sha2::{Digest, Sha256};

/// Size of a SHA-256 digest.
pub const HASH_SIZE: usize = 0x20;
/// Size of an RSA-2048 modulus and of the signatures it produces.
pub const SIGNATURE_SIZE: usize = 0x100;

pub type Hash = [u8; HASH_SIZE];
pub type Signature = [u8; SIGNATURE_SIZE];

/// SHA-256 of `data`.
pub fn hash(data: &[u8]) -> Hash {
    let mut digest = [0u8; HASH_SIZE];
    digest.copy_from_slice(&Sha256::digest(data));
    digest
}
