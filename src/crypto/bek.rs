//! Boot encryption key and the AES-128-CBC layer it drives.
//!
//! The layer is unauthenticated and unpadded on purpose: it mirrors what the
//! boot ROM decrypts, so callers must hand in block aligned buffers.
use std::fmt::{self, Debug, Formatter};

use aes::Aes128;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroize;

use crate::error::Error;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Size of the BEK in bytes.
pub const BEK_SIZE: usize = 0x10;
/// AES block size. Every buffer going through the cipher must be a multiple of it.
pub const BLOCK_SIZE: usize = 0x10;

/// The chained mode always starts from an all-zero initialization vector.
const IV: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

/// Externally provisioned symmetric key. The key bytes are wiped on drop.
pub struct Bek([u8; BEK_SIZE]);

impl Bek {
    pub fn new(key: &[u8]) -> Result<Self, Error> {
        if key.len() != BEK_SIZE {
            return Err(Error::SizeMismatch { expected: BEK_SIZE, actual: key.len() });
        }
        let mut bytes = [0u8; BEK_SIZE];
        bytes.copy_from_slice(key);
        Ok(Self(bytes))
    }

    /// Parses a hex encoded BEK, as found in the `BEK` environment variable.
    pub fn from_hex(text: &str) -> Result<Self, Error> {
        let mut bytes =
            hex::decode(text.trim()).map_err(|_| Error::KeyInvalid("BEK is not valid hex"))?;
        let bek = Self::new(&bytes);
        bytes.zeroize();
        bek
    }

    /// Encrypts `data` with AES-128-CBC, zero IV, no padding.
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        check_alignment(data)?;
        let mut buffer = data.to_vec();
        let length = buffer.len();
        Aes128CbcEnc::new_from_slices(&self.0, &IV)
            .map_err(|_| Error::KeyInvalid("BEK has an invalid length"))?
            .encrypt_padded_mut::<NoPadding>(&mut buffer, length)
            .map_err(|_| Error::SizeMismatch { expected: length, actual: length })?;
        Ok(buffer)
    }

    /// Decrypts `data` with AES-128-CBC, zero IV, no padding.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        check_alignment(data)?;
        let mut buffer = data.to_vec();
        Aes128CbcDec::new_from_slices(&self.0, &IV)
            .map_err(|_| Error::KeyInvalid("BEK has an invalid length"))?
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(|_| Error::SizeMismatch { expected: data.len(), actual: data.len() })?;
        Ok(buffer)
    }
}

fn check_alignment(data: &[u8]) -> Result<(), Error> {
    match data.len() % BLOCK_SIZE {
        0 => Ok(()),
        remainder => Err(Error::SizeMismatch {
            expected: data.len() + (BLOCK_SIZE - remainder),
            actual: data.len(),
        }),
    }
}

impl Drop for Bek {
    fn drop(&mut self) { self.0.zeroize(); }
}

impl Debug for Bek {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str("Bek(..)") }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BEK: &str = "000102030405060708090a0b0c0d0e0f";

    #[test]
    fn decrypting_reverses_encryption() {
        let bek = Bek::from_hex(TEST_BEK).unwrap();
        let plaintext: Vec<u8> = (0..0x40u8).collect();
        let ciphertext = bek.encrypt(&plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(ciphertext, plaintext);
        assert_eq!(bek.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn encryption_matches_aes_128_cbc_reference_vector() {
        // NIST SP 800-38A F.2.1, first block. The reference IV is not zero,
        // so it is folded into the plaintext by hand.
        let bek = Bek::from_hex("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let iv = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let plaintext = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
        let whitened: Vec<u8> = plaintext.iter().zip(iv.iter()).map(|(p, v)| p ^ v).collect();
        assert_eq!(
            hex::encode(bek.encrypt(&whitened).unwrap()),
            "7649abac8119b246cee98e9b12e9197d"
        );
    }

    #[test]
    fn chaining_makes_identical_blocks_encrypt_differently() {
        let bek = Bek::from_hex(TEST_BEK).unwrap();
        let ciphertext = bek.encrypt(&[0xAA; 2 * BLOCK_SIZE]).unwrap();
        assert_ne!(ciphertext[..BLOCK_SIZE], ciphertext[BLOCK_SIZE..]);
    }

    #[test]
    fn empty_input_is_aligned() {
        let bek = Bek::from_hex(TEST_BEK).unwrap();
        assert!(bek.encrypt(&[]).unwrap().is_empty());
    }

    #[test]
    fn unaligned_input_is_rejected() {
        let bek = Bek::from_hex(TEST_BEK).unwrap();
        assert_eq!(
            bek.encrypt(&[0u8; 0x11]),
            Err(Error::SizeMismatch { expected: 0x20, actual: 0x11 })
        );
        assert_eq!(
            bek.decrypt(&[0u8; 0x0f]),
            Err(Error::SizeMismatch { expected: 0x10, actual: 0x0f })
        );
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert_eq!(
            Bek::new(&[0u8; 0x20]).unwrap_err(),
            Error::SizeMismatch { expected: BEK_SIZE, actual: 0x20 }
        );
        assert_eq!(Bek::from_hex("not hex").unwrap_err(), Error::KeyInvalid("BEK is not valid hex"));
    }
}
