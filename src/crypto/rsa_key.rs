//! RSASSA-PSS keys.
//!
//! Keys are described the way the boot ROM stores them: a little-endian
//! 2048-bit modulus, a public exponent and, for signing keys, a private
//! exponent. Signatures use SHA-256 with a fixed 32-byte salt length and are
//! randomized, so two signatures over the same digest never compare equal.
use std::fmt::{self, Debug, Formatter};

use log::debug;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::thread_rng;
use rsa::{traits::PublicKeyParts, BigUint, Pss, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::{Hash, Signature, SIGNATURE_SIZE};
use crate::error::Error;

/// Size of the modulus in bytes.
pub const MODULUS_SIZE: usize = SIGNATURE_SIZE;
/// PSS salt length used by the boot ROM.
pub const PSS_SALT_SIZE: usize = 0x20;

/// How many bases to try before giving up on factoring the modulus.
const FACTORING_ATTEMPTS: u32 = 100;

/// RSA key handle. Verify-only keys carry no private component and refuse to sign.
pub struct RsaKey {
    public: RsaPublicKey,
    private: Option<RsaPrivateKey>,
}

impl RsaKey {
    /// Builds a key from raw little-endian components. When a private exponent
    /// is supplied, the prime factors are recovered from it.
    pub fn from_components(
        modulus: &[u8],
        public_exponent: u32,
        private_exponent: Option<&[u8]>,
    ) -> Result<Self, Error> {
        if modulus.len() != MODULUS_SIZE {
            return Err(Error::SizeMismatch { expected: MODULUS_SIZE, actual: modulus.len() });
        }
        let n = BigUint::from_bytes_le(modulus);
        let e = BigUint::from(public_exponent);
        let public = RsaPublicKey::new(n.clone(), e.clone())
            .map_err(|_| Error::KeyInvalid("Malformed public key"))?;

        let private = match private_exponent {
            None => None,
            Some(d) => {
                let d = BigUint::from_bytes_le(d);
                let (p, q) = recover_primes(&n, &e, &d)?;
                debug!("Recovered {}-bit and {}-bit prime factors", p.bits(), q.bits());
                let key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
                    .map_err(|_| Error::KeyInvalid("Private exponent does not match modulus"))?;
                Some(key)
            }
        };

        Ok(Self { public, private })
    }

    pub fn can_sign(&self) -> bool { self.private.is_some() }

    /// Modulus in the little-endian layout used inside the BCT.
    pub fn modulus_le(&self) -> [u8; MODULUS_SIZE] {
        let mut modulus = [0u8; MODULUS_SIZE];
        let bytes = self.public.n().to_bytes_le();
        modulus[..bytes.len()].copy_from_slice(&bytes);
        modulus
    }

    /// Signs an already computed SHA-256 digest. The result is big-endian, as
    /// RSA produces it; the codecs reverse it when laying it out on disk.
    pub fn sign(&self, digest: &Hash) -> Result<Signature, Error> {
        let private = self.private.as_ref().ok_or(Error::MissingPrivateKey)?;
        let raw = private
            .sign_with_rng(&mut thread_rng(), Pss::new_with_salt::<Sha256>(PSS_SALT_SIZE), digest)
            .map_err(|_| Error::SigningFailed)?;
        if raw.len() != SIGNATURE_SIZE {
            return Err(Error::SizeMismatch { expected: SIGNATURE_SIZE, actual: raw.len() });
        }
        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&raw);
        Ok(signature)
    }

    /// Checks `signature` against `digest`. A mismatch is `false`, never an error.
    pub fn verify(&self, digest: &Hash, signature: &[u8]) -> bool {
        self.public
            .verify(Pss::new_with_salt::<Sha256>(PSS_SALT_SIZE), digest, signature)
            .is_ok()
    }
}

impl Debug for RsaKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKey")
            .field("modulus_bits", &self.public.n().bits())
            .field("can_sign", &self.can_sign())
            .finish()
    }
}

/// Factors `n` given both exponents, by looking for a non-trivial square root
/// of one (the randomized method from RFC 8017's appendix, with small fixed
/// bases). Unlike the balanced-prime shortcut this works for any factor sizes.
fn recover_primes(n: &BigUint, e: &BigUint, d: &BigUint) -> Result<(BigUint, BigUint), Error> {
    if d.is_zero() {
        return Err(Error::KeyInvalid("Private exponent does not match modulus"));
    }
    let one = BigUint::one();
    let n_minus_one = n - &one;
    let k = d * e - &one;
    if k.is_odd() {
        return Err(Error::KeyInvalid("Private exponent does not match modulus"));
    }

    let mut t = k;
    let mut s = 0usize;
    while t.is_even() {
        t = t >> 1usize;
        s += 1;
    }

    for base in 2..(2 + FACTORING_ATTEMPTS) {
        let mut x = BigUint::from(base).modpow(&t, n);
        for _ in 0..s {
            let y = (&x * &x) % n;
            if y.is_one() && !x.is_one() && x != n_minus_one {
                let p = (&x - &one).gcd(n);
                let q = n / &p;
                return Ok((p, q));
            }
            x = y;
        }
    }

    Err(Error::KeyInvalid("Unable to factor modulus from private exponent"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{crypto::hash, keys::KeyRing};

    pub(crate) fn test_keys() -> KeyRing { KeyRing::sample().unwrap() }

    #[test]
    fn signing_key_factors_are_recovered() {
        let keys = test_keys();
        assert!(keys.signing_key().can_sign());
        assert!(!keys.vendor_key().can_sign());
    }

    #[test]
    fn signatures_verify_and_are_randomized() {
        let keys = test_keys();
        let key = keys.signing_key();
        let digest = hash(b"stagepack");
        let first = key.sign(&digest).unwrap();
        let second = key.sign(&digest).unwrap();
        assert_ne!(first, second);
        assert!(key.verify(&digest, &first));
        assert!(key.verify(&digest, &second));
    }

    #[test]
    fn verification_fails_on_wrong_digest_or_key() {
        let keys = test_keys();
        let digest = hash(b"stagepack");
        let signature = keys.signing_key().sign(&digest).unwrap();
        assert!(!keys.signing_key().verify(&hash(b"stagepacks"), &signature));
        assert!(!keys.vendor_key().verify(&digest, &signature));
        assert!(!keys.signing_key().verify(&digest, &signature[..0x80]));
    }

    #[test]
    fn verify_only_keys_cannot_sign() {
        let keys = test_keys();
        assert_eq!(keys.vendor_key().sign(&hash(&[])), Err(Error::MissingPrivateKey));
    }

    #[test]
    fn modulus_round_trips_in_little_endian() {
        let keys = test_keys();
        let modulus = keys.signing_key().modulus_le();
        assert_eq!(modulus[0], 0x59);
        assert_eq!(modulus[MODULUS_SIZE - 1], 0xFF);
        let rebuilt = RsaKey::from_components(&modulus, 0x10001, None).unwrap();
        assert_eq!(rebuilt.modulus_le(), modulus);
    }

    #[test]
    fn mismatched_private_exponent_is_rejected() {
        let modulus = test_keys().signing_key().modulus_le();
        let bogus = [0x03u8; MODULUS_SIZE];
        assert!(matches!(
            RsaKey::from_components(&modulus, 0x10001, Some(&bogus)),
            Err(Error::KeyInvalid(_))
        ));
    }

    #[test]
    fn zero_private_exponent_is_rejected() {
        let modulus = test_keys().signing_key().modulus_le();
        assert_eq!(
            RsaKey::from_components(&modulus, 0x10001, Some(&[0u8])).unwrap_err(),
            Error::KeyInvalid("Private exponent does not match modulus")
        );
        assert!(matches!(
            RsaKey::from_components(&modulus, 0x10001, Some(&[])),
            Err(Error::KeyInvalid(_))
        ));
    }

    #[test]
    fn short_modulus_is_rejected() {
        assert_eq!(
            RsaKey::from_components(&[0x01; 0x80], 0x10001, None).unwrap_err(),
            Error::SizeMismatch { expected: MODULUS_SIZE, actual: 0x80 }
        );
    }
}
