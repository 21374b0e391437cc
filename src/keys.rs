//! Turns the raw key configuration into usable key objects.
use log::debug;
use stagepack_config::{security::RsaKeyConfiguration, Configuration};

use crate::{
    crypto::{Bek, RsaKey},
    error::Error,
};

/// Every key a single tool invocation may need. Built once per command and
/// dropped with it; the BEK and the private RSA key zeroize themselves.
#[derive(Debug)]
pub struct KeyRing {
    bek: Option<Bek>,
    signing_key: RsaKey,
    vendor_key: RsaKey,
}

impl KeyRing {
    pub fn new(bek: Option<Bek>, signing_key: RsaKey, vendor_key: RsaKey) -> Self {
        Self { bek, signing_key, vendor_key }
    }

    pub fn from_configuration(configuration: &Configuration) -> Result<Self, Error> {
        let security = &configuration.security_configuration;
        let bek = match security.bek.as_deref() {
            Some(text) if !text.is_empty() => Some(Bek::from_hex(text)?),
            _ => None,
        };
        debug!("Loading signing key");
        let signing_key = rsa_key(&security.signing_key)?;
        debug!("Loading vendor key");
        let vendor_key = rsa_key(&security.vendor_key)?;
        Ok(Self::new(bek, signing_key, vendor_key))
    }

    /// Keys from the bundled sample configuration, without a BEK.
    pub fn sample() -> Result<Self, Error> {
        let configuration = Configuration::sample()
            .map_err(|e| Error::ConfigurationError(e.to_string()))?;
        Self::from_configuration(&configuration)
    }

    pub fn with_bek(self, bek: Bek) -> Self { Self { bek: Some(bek), ..self } }

    pub fn bek(&self) -> Result<&Bek, Error> { self.bek.as_ref().ok_or(Error::MissingBek) }
    pub fn signing_key(&self) -> &RsaKey { &self.signing_key }
    pub fn vendor_key(&self) -> &RsaKey { &self.vendor_key }
}

fn rsa_key(configuration: &RsaKeyConfiguration) -> Result<RsaKey, Error> {
    let modulus = hex::decode(configuration.modulus.trim())
        .map_err(|_| Error::KeyInvalid("Modulus is not valid hex"))?;
    let private_exponent = match configuration.private_exponent.as_deref() {
        Some(text) if !text.is_empty() => Some(
            hex::decode(text.trim())
                .map_err(|_| Error::KeyInvalid("Private exponent is not valid hex"))?,
        ),
        _ => None,
    };
    RsaKey::from_components(&modulus, configuration.public_exponent, private_exponent.as_deref())
}
