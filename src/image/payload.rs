//! Signed payload container.
//!
//! A 0x170-byte header followed by the payload data:
//!
//! | Offset  | Size  | Field                                  |
//! |---------|-------|----------------------------------------|
//! | `0x000` | 0x10  | reserved                               |
//! | `0x010` | 0x100 | RSASSA-PSS signature, byte-reversed    |
//! | `0x110` | 0x20  | salt                                   |
//! | `0x130` | 0x20  | SHA-256 of `data[..length]`            |
//! | `0x150` | 0x10  | version, length, load address, entry   |
//! | `0x160` | 0x10  | reserved                               |
//! | `0x170` |       | data                                   |
//!
//! The signature covers the header metadata only (salt through the reserved
//! tail), never the data itself; the data is tied in through its hash.
use std::{
    fmt::{self, Display, Formatter},
    ops::Range,
};

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use rsa::BigUint;
use static_assertions::const_assert_eq;

use super::{
    ensure_length, fixed_field, length_field, reversed_signature, write_field, write_validity,
    write_wrapped_hex, Check, VerificationFailure,
};
use crate::{
    crypto::{hash, Bek, Hash, RsaKey, Signature, HASH_SIZE, SIGNATURE_SIZE},
    error::Error,
};

pub const HEADER_SIZE: usize = 0x170;
pub const SALT_SIZE: usize = 0x20;

const SIGNATURE_RANGE: Range<usize> = 0x10..0x110;
const SALT_RANGE: Range<usize> = 0x110..0x130;
const HASH_RANGE: Range<usize> = 0x130..0x150;
const WORDS_RANGE: Range<usize> = 0x150..0x160;
const WORD_COUNT: usize = 4;
const RESERVED_SIZE: usize = 0x10;

/// Salt + hash + the four words + reserved tail.
const SIGNED_DATA_SIZE: usize = SALT_SIZE + HASH_SIZE + WORD_COUNT * 4 + RESERVED_SIZE;

const_assert_eq!(SIGNATURE_RANGE.end - SIGNATURE_RANGE.start, SIGNATURE_SIZE);
const_assert_eq!(WORDS_RANGE.end - WORDS_RANGE.start, WORD_COUNT * 4);
const_assert_eq!(WORDS_RANGE.end + RESERVED_SIZE, HEADER_SIZE);
const_assert_eq!(HEADER_SIZE - SALT_RANGE.start, SIGNED_DATA_SIZE);

pub const DEFAULT_LOAD_ADDRESS: u32 = 0x4001_0000;
pub const DEFAULT_VERSION: u32 = 19;
#[rustfmt::skip]
pub const DEFAULT_SALT: [u8; SALT_SIZE] = [
    0xF7, 0x23, 0xF4, 0x25, 0xB4, 0x71, 0xF8, 0x59, 0xFC, 0xF4, 0xD3, 0xDA, 0x0A, 0xF7, 0x63, 0x3C,
    0x38, 0xBE, 0xBD, 0x51, 0xEE, 0xB7, 0x0C, 0xCA, 0x54, 0x28, 0xDE, 0xD2, 0xFC, 0xE6, 0x17, 0x69,
];

/// Optional header fields for [`Payload::build`]. Anything left as `None`
/// takes its documented default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PayloadOverrides {
    /// Defaults to [`DEFAULT_LOAD_ADDRESS`].
    pub load_address: Option<u32>,
    /// Defaults to the load address.
    pub entry_point: Option<u32>,
    /// Defaults to the data length.
    pub length: Option<u32>,
    /// Defaults to [`DEFAULT_VERSION`].
    pub version: Option<u32>,
    /// Stored little-endian over 32 bytes. Defaults to [`DEFAULT_SALT`].
    pub salt: Option<BigUint>,
    /// Must be 32 bytes. Defaults to the SHA-256 of the data.
    pub data_hash: Option<Vec<u8>>,
    /// Must be 256 bytes. Defaults to a fresh signature over the header.
    pub signature: Option<Vec<u8>>,
}

/// Header plus data, borrowing the key used to sign and verify it.
#[derive(Clone, Debug)]
pub struct Payload<'k> {
    signature: Signature,
    salt: [u8; SALT_SIZE],
    data_hash: Hash,
    version: u32,
    length: u32,
    load_address: u32,
    entry_point: u32,
    data: Vec<u8>,
    key: &'k RsaKey,
}

impl<'k> Payload<'k> {
    /// Reads a payload from its on-disk form. Only the layout is checked here;
    /// use [`Payload::verify`] to authenticate it.
    pub fn parse(bytes: &[u8], key: &'k RsaKey) -> Result<Self, Error> {
        ensure_length(bytes, HEADER_SIZE)?;
        let mut words = [0u32; WORD_COUNT];
        LittleEndian::read_u32_into(&bytes[WORDS_RANGE], &mut words);
        let [version, length, load_address, entry_point] = words;

        Ok(Self {
            signature: reversed_signature(&bytes[SIGNATURE_RANGE])?,
            salt: fixed_field("salt", &bytes[SALT_RANGE])?,
            data_hash: fixed_field("data hash", &bytes[HASH_RANGE])?,
            version,
            length,
            load_address,
            entry_point,
            data: bytes[HEADER_SIZE..].to_vec(),
            key,
        })
    }

    /// Wraps `data` (usually an assembled package1) in a fresh header.
    pub fn build(data: &[u8], overrides: PayloadOverrides, key: &'k RsaKey) -> Result<Self, Error> {
        let data = data.to_vec();
        let load_address = overrides.load_address.unwrap_or(DEFAULT_LOAD_ADDRESS);
        let entry_point = overrides.entry_point.unwrap_or(load_address);
        let length = match overrides.length {
            Some(length) => length,
            None => length_field(data.len())?,
        };
        let version = overrides.version.unwrap_or(DEFAULT_VERSION);
        let salt = match overrides.salt {
            Some(salt) => encode_salt(&salt)?,
            None => DEFAULT_SALT,
        };
        let data_hash = match overrides.data_hash {
            Some(data_hash) => fixed_field("data hash", &data_hash)?,
            None => hash(&data),
        };

        let words = [version, length, load_address, entry_point];
        let signature = match overrides.signature {
            Some(signature) => fixed_field("signature", &signature)?,
            None => key.sign(&hash(&signed_data(&salt, &data_hash, words)))?,
        };

        debug!(
            "Built payload: version {}, length 0x{:x}, load 0x{:x}, entry 0x{:x}",
            version, length, load_address, entry_point
        );
        Ok(Self { signature, salt, data_hash, version, length, load_address, entry_point, data, key })
    }

    pub fn signature(&self) -> &Signature { &self.signature }
    pub fn salt(&self) -> &[u8; SALT_SIZE] { &self.salt }
    pub fn data_hash(&self) -> &Hash { &self.data_hash }
    pub fn version(&self) -> u32 { self.version }
    pub fn length(&self) -> u32 { self.length }
    pub fn load_address(&self) -> u32 { self.load_address }
    pub fn entry_point(&self) -> u32 { self.entry_point }
    pub fn data(&self) -> &[u8] { &self.data }

    /// On-disk form, the exact inverse of [`Payload::parse`].
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE];
        let mut signature = self.signature;
        signature.reverse();
        bytes[SIGNATURE_RANGE].copy_from_slice(&signature);
        bytes[SALT_RANGE].copy_from_slice(&self.salt);
        bytes[HASH_RANGE].copy_from_slice(&self.data_hash);
        LittleEndian::write_u32_into(&self.words(), &mut bytes[WORDS_RANGE]);
        bytes.extend_from_slice(&self.data);
        bytes
    }

    /// On-disk form, zero padded up to a multiple of `alignment`.
    pub fn serialize_padded(&self, alignment: usize) -> Vec<u8> {
        let mut bytes = self.serialize();
        if alignment > 1 && bytes.len() % alignment != 0 {
            let padded = bytes.len() + (alignment - bytes.len() % alignment);
            bytes.resize(padded, 0);
        }
        bytes
    }

    /// Whether the stored hash matches `data[..length]`.
    pub fn verify_hash(&self) -> bool {
        let end = (self.length as usize).min(self.data.len());
        hash(&self.data[..end]) == self.data_hash
    }

    /// Whether the stored signature matches the header metadata under the key.
    pub fn verify_signature(&self) -> bool {
        let digest = hash(&signed_data(&self.salt, &self.data_hash, self.words()));
        self.key.verify(&digest, &self.signature)
    }

    pub fn verify_length(&self) -> bool { self.length as usize == self.data.len() }

    /// Runs every check and reports all that failed.
    pub fn verify(&self) -> Result<(), VerificationFailure> {
        VerificationFailure::collect([
            (Check::Hash, self.verify_hash()),
            (Check::Signature, self.verify_signature()),
            (Check::Length, self.verify_length()),
        ])
    }

    /// Data region decrypted with the BEK.
    pub fn decrypted_data(&self, bek: &Bek) -> Result<Vec<u8>, Error> { bek.decrypt(&self.data) }

    fn words(&self) -> [u32; WORD_COUNT] {
        [self.version, self.length, self.load_address, self.entry_point]
    }
}

impl Display for Payload<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_field(f, "Version", self.version)?;
        write_field(f, "Data Size", format_args!("0x{:x}", self.length))?;
        write_field(f, "Entrypoint", format_args!("0x{:x}", self.entry_point))?;
        write_field(f, "Load addr.", format_args!("0x{:x}", self.load_address))?;
        write_field(f, "Salt", hex::encode(self.salt))?;
        write_field(f, "Data hash", hex::encode(self.data_hash))?;
        write_wrapped_hex(f, "Signature", &self.signature)?;
        write_validity(f, &self.verify())
    }
}

/// Canonical byte string the payload signature is computed over.
fn signed_data(
    salt: &[u8; SALT_SIZE],
    data_hash: &Hash,
    words: [u32; WORD_COUNT],
) -> [u8; SIGNED_DATA_SIZE] {
    let mut signed = [0u8; SIGNED_DATA_SIZE];
    signed[..SALT_SIZE].copy_from_slice(salt);
    signed[SALT_SIZE..SALT_SIZE + HASH_SIZE].copy_from_slice(data_hash);
    let words_start = SALT_SIZE + HASH_SIZE;
    LittleEndian::write_u32_into(&words, &mut signed[words_start..words_start + WORD_COUNT * 4]);
    signed
}

fn encode_salt(salt: &BigUint) -> Result<[u8; SALT_SIZE], Error> {
    let bytes = salt.to_bytes_le();
    if bytes.len() > SALT_SIZE {
        return Err(Error::InvalidFieldSize { field: "salt", expected: SALT_SIZE, actual: bytes.len() });
    }
    let mut encoded = [0u8; SALT_SIZE];
    encoded[..bytes.len()].copy_from_slice(&bytes);
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crypto::rsa_key::tests::test_keys, keys::KeyRing};

    fn zero_payload<'k>(keys: &'k KeyRing, size: usize) -> Payload<'k> {
        Payload::build(&vec![0u8; size], PayloadOverrides::default(), keys.signing_key()).unwrap()
    }

    #[test]
    fn defaults_are_applied_to_a_zero_blob() {
        let keys = test_keys();
        let payload = zero_payload(&keys, 64);
        assert_eq!(payload.length(), 64);
        assert_eq!(payload.load_address(), 0x4001_0000);
        assert_eq!(payload.entry_point(), 0x4001_0000);
        assert_eq!(payload.version(), 19);
        assert_eq!(payload.salt(), &DEFAULT_SALT);
        assert_eq!(payload.data_hash(), &hash(&[0u8; 64]));
        assert_eq!(payload.verify(), Ok(()));
    }

    #[test]
    fn entry_point_follows_overridden_load_address() {
        let keys = test_keys();
        let overrides = PayloadOverrides { load_address: Some(0x4002_0000), ..Default::default() };
        let payload = Payload::build(&[1, 2, 3, 4], overrides, keys.signing_key()).unwrap();
        assert_eq!(payload.load_address(), 0x4002_0000);
        assert_eq!(payload.entry_point(), 0x4002_0000);

        let overrides = PayloadOverrides {
            load_address: Some(0),
            entry_point: Some(0x100),
            version: Some(0),
            ..Default::default()
        };
        let payload = Payload::build(&[1, 2, 3, 4], overrides, keys.signing_key()).unwrap();
        assert_eq!(payload.load_address(), 0);
        assert_eq!(payload.entry_point(), 0x100);
        assert_eq!(payload.version(), 0);
    }

    #[test]
    fn serialized_layout_matches_fixed_offsets() {
        let keys = test_keys();
        let payload = zero_payload(&keys, 0x20);
        let bytes = payload.serialize();
        assert_eq!(bytes.len(), HEADER_SIZE + 0x20);
        assert_eq!(&bytes[..0x10], &[0u8; 0x10]);
        assert_eq!(bytes[0x10], payload.signature()[SIGNATURE_SIZE - 1]);
        assert_eq!(bytes[0x10f], payload.signature()[0]);
        assert_eq!(&bytes[0x110..0x130], &DEFAULT_SALT);
        assert_eq!(&bytes[0x150..0x154], &19u32.to_le_bytes());
        assert_eq!(&bytes[0x154..0x158], &0x20u32.to_le_bytes());
        assert_eq!(&bytes[0x158..0x15c], &0x4001_0000u32.to_le_bytes());
        assert_eq!(&bytes[0x15c..0x160], &0x4001_0000u32.to_le_bytes());
        assert_eq!(&bytes[0x160..0x170], &[0u8; 0x10]);
    }

    #[test]
    fn parsing_reverses_serialization() {
        let keys = test_keys();
        let data: Vec<u8> = (0..=255u8).collect();
        let overrides = PayloadOverrides {
            load_address: Some(0x4003_0000),
            entry_point: Some(0x4003_0100),
            version: Some(7),
            salt: Some(BigUint::from(0x1234u32)),
            ..Default::default()
        };
        let built = Payload::build(&data, overrides, keys.signing_key()).unwrap();
        let parsed = Payload::parse(&built.serialize(), keys.signing_key()).unwrap();

        assert_eq!(parsed.signature(), built.signature());
        assert_eq!(parsed.salt(), built.salt());
        assert_eq!(parsed.data_hash(), built.data_hash());
        assert_eq!(parsed.version(), 7);
        assert_eq!(parsed.length(), 256);
        assert_eq!(parsed.load_address(), 0x4003_0000);
        assert_eq!(parsed.entry_point(), 0x4003_0100);
        assert_eq!(parsed.data(), data.as_slice());
        assert_eq!(parsed.verify(), Ok(()));
    }

    #[test]
    fn salt_override_is_little_endian() {
        let keys = test_keys();
        let overrides =
            PayloadOverrides { salt: Some(BigUint::from(0x0102_0304u32)), ..Default::default() };
        let payload = Payload::build(&[0u8; 4], overrides, keys.signing_key()).unwrap();
        let mut expected = [0u8; SALT_SIZE];
        expected[..4].copy_from_slice(&[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(payload.salt(), &expected);
    }

    #[test]
    fn oversized_salt_is_rejected() {
        let keys = test_keys();
        let overrides = PayloadOverrides {
            salt: Some(BigUint::from_bytes_le(&[0xFF; SALT_SIZE + 1])),
            ..Default::default()
        };
        assert_eq!(
            Payload::build(&[0u8; 4], overrides, keys.signing_key()).unwrap_err(),
            Error::InvalidFieldSize { field: "salt", expected: SALT_SIZE, actual: SALT_SIZE + 1 }
        );
    }

    #[test]
    fn explicit_fields_must_have_exact_sizes() {
        let keys = test_keys();
        let overrides = PayloadOverrides { data_hash: Some(vec![0u8; 0x1f]), ..Default::default() };
        assert_eq!(
            Payload::build(&[0u8; 4], overrides, keys.signing_key()).unwrap_err(),
            Error::InvalidFieldSize { field: "data hash", expected: HASH_SIZE, actual: 0x1f }
        );

        let overrides = PayloadOverrides { signature: Some(vec![0u8; 0x80]), ..Default::default() };
        assert_eq!(
            Payload::build(&[0u8; 4], overrides, keys.signing_key()).unwrap_err(),
            Error::InvalidFieldSize { field: "signature", expected: SIGNATURE_SIZE, actual: 0x80 }
        );
    }

    #[test]
    fn explicit_hash_and_signature_are_kept_as_given() {
        let keys = test_keys();
        let overrides = PayloadOverrides {
            data_hash: Some(vec![0xAB; HASH_SIZE]),
            signature: Some(vec![0xCD; SIGNATURE_SIZE]),
            ..Default::default()
        };
        let payload = Payload::build(&[0u8; 4], overrides, keys.vendor_key()).unwrap();
        assert_eq!(payload.data_hash(), &[0xAB; HASH_SIZE]);
        assert_eq!(payload.signature(), &[0xCD; SIGNATURE_SIZE]);
        let failure = payload.verify().unwrap_err();
        assert_eq!(failure.failed(), &[Check::Hash, Check::Signature]);
    }

    #[test]
    fn signing_needs_a_private_key() {
        let keys = test_keys();
        assert_eq!(
            Payload::build(&[0u8; 4], PayloadOverrides::default(), keys.vendor_key()).unwrap_err(),
            Error::MissingPrivateKey
        );
    }

    #[test]
    fn truncated_header_is_rejected() {
        let keys = test_keys();
        assert_eq!(
            Payload::parse(&[0u8; HEADER_SIZE - 1], keys.signing_key()).unwrap_err(),
            Error::TruncatedInput { required: HEADER_SIZE, actual: HEADER_SIZE - 1 }
        );
        let empty = Payload::parse(&[0u8; HEADER_SIZE], keys.signing_key()).unwrap();
        assert!(empty.data().is_empty());
    }

    #[test]
    fn flipping_a_data_byte_breaks_only_the_hash() {
        let keys = test_keys();
        let payload = zero_payload(&keys, 0x100);
        let mut bytes = payload.serialize();
        bytes[0x200] ^= 0x01;

        let tampered = Payload::parse(&bytes, keys.signing_key()).unwrap();
        assert!(!tampered.verify_hash());
        assert!(tampered.verify_signature());
        assert!(tampered.verify_length());
        assert_eq!(tampered.verify().unwrap_err().failed(), &[Check::Hash]);
    }

    #[test]
    fn flipping_any_hashed_byte_breaks_the_hash() {
        let keys = test_keys();
        let payload = zero_payload(&keys, 0x10);
        let serialized = payload.serialize();
        for offset in HEADER_SIZE..serialized.len() {
            let mut bytes = serialized.clone();
            bytes[offset] = 0xFF;
            assert!(!Payload::parse(&bytes, keys.signing_key()).unwrap().verify_hash());
        }
    }

    #[test]
    fn tampering_with_metadata_breaks_the_signature() {
        let keys = test_keys();
        let mut bytes = zero_payload(&keys, 0x10).serialize();
        bytes[0x158] ^= 0x01; // load address
        let tampered = Payload::parse(&bytes, keys.signing_key()).unwrap();
        assert!(tampered.verify_hash());
        assert!(!tampered.verify_signature());
    }

    #[test]
    fn custom_signature_does_not_verify_under_vendor_key() {
        let keys = test_keys();
        let bytes = zero_payload(&keys, 0x40).serialize();
        let payload = Payload::parse(&bytes, keys.vendor_key()).unwrap();
        assert!(payload.verify_hash());
        assert!(!payload.verify_signature());
    }

    #[test]
    fn length_mismatch_is_reported_with_other_failures() {
        let keys = test_keys();
        let overrides = PayloadOverrides { length: Some(0x20), ..Default::default() };
        let payload = Payload::build(&[0u8; 0x40], overrides, keys.signing_key()).unwrap();
        // The default hash covers all 0x40 bytes, the stored length only 0x20.
        let failure = payload.verify().unwrap_err();
        assert_eq!(failure.failed(), &[Check::Hash, Check::Length]);
        assert!(payload.verify_signature());
    }

    #[test]
    fn trailing_padding_is_reported_as_length_mismatch() {
        let keys = test_keys();
        let payload = zero_payload(&keys, 0x30);
        let padded = payload.serialize_padded(0x200);
        assert_eq!(padded.len(), 0x200);
        let parsed = Payload::parse(&padded, keys.signing_key()).unwrap();
        assert!(parsed.verify_hash());
        assert!(parsed.verify_signature());
        assert_eq!(parsed.verify().unwrap_err().failed(), &[Check::Length]);
    }

    #[test]
    fn aligned_payloads_are_not_padded() {
        let keys = test_keys();
        let payload = zero_payload(&keys, 0x90);
        assert_eq!(payload.serialize_padded(0x200), payload.serialize());
        assert_eq!(payload.serialize_padded(0), payload.serialize());
    }

    #[test]
    fn data_region_can_be_decrypted() {
        let keys = test_keys();
        let bek = Bek::from_hex("0f0e0d0c0b0a09080706050403020100").unwrap();
        let plaintext = vec![0x42u8; 0x20];
        let payload =
            Payload::build(&bek.encrypt(&plaintext).unwrap(), Default::default(), keys.signing_key())
                .unwrap();
        assert_eq!(payload.decrypted_data(&bek).unwrap(), plaintext);
    }

    #[test]
    fn diagnostics_list_every_failing_check() {
        let keys = test_keys();
        let overrides = PayloadOverrides { length: Some(0x10), ..Default::default() };
        let payload = Payload::build(&[0u8; 0x20], overrides, keys.signing_key()).unwrap();
        let summary = payload.to_string();
        assert!(summary.contains("Version:               19\n"));
        assert!(summary.contains("Data Size:             0x10\n"));
        assert!(summary.contains("Entrypoint:            0x40010000\n"));
        assert!(summary.contains("Is valid:              Invalid hash\n"));
        assert!(summary.contains("                       Invalid length\n"));
        // 256 signature bytes wrap over eight lines of 64 hex digits.
        let signature_lines = summary
            .lines()
            .skip_while(|line| !line.starts_with("Signature:"))
            .take_while(|line| !line.starts_with("Is valid:"));
        assert!(signature_lines.map(|line| line.len()).eq(std::iter::repeat(23 + 64).take(8)));
    }

    #[test]
    fn diagnostics_report_valid_payloads() {
        let keys = test_keys();
        let summary = zero_payload(&keys, 0x10).to_string();
        assert!(summary.ends_with("Is valid:              True\n"));
    }
}
