//! This stagepack sub-crate contains the data model for the key material
//! consumed by the image codecs.
//!
//! NOTE: Nothing in here interprets the keys. The configuration only carries
//! raw, hex encoded components; turning them into usable key objects is the
//! job of the main crate.

use std::fmt::Display;

use anyhow::Result;
use security::SecurityConfiguration;
use serde::{Deserialize, Serialize};

pub mod security;

/// Environment variable naming a RON configuration file to load instead of
/// the bundled sample.
pub const CONFIG_ENV_VAR: &str = "STAGEPACK_CONFIG";
/// Environment variable holding the hex encoded BEK. Takes precedence over
/// the configuration file.
pub const BEK_ENV_VAR: &str = "BEK";

/// Sample configuration carrying the development signing key and the
/// vendor verification key.
pub const SAMPLE_CONFIGURATION: &str =
    include_str!("../sample_configurations/default_config.ron");

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct Configuration {
    pub security_configuration: SecurityConfiguration,
}

impl Configuration {
    pub fn from_ron(contents: &str) -> Result<Self> { Ok(ron::from_str(contents)?) }

    pub fn sample() -> Result<Self> { Self::from_ron(SAMPLE_CONFIGURATION) }

    /// Replaces the configured BEK with `bek`, if any.
    pub fn with_bek(mut self, bek: Option<String>) -> Self {
        if bek.is_some() {
            self.security_configuration.bek = bek;
        }
        self
    }
}

impl Configuration {
    pub fn complete(&self) -> bool { self.required_configuration_steps().count() == 0 }

    pub fn required_configuration_steps(&self) -> impl Iterator<Item = RequiredConfigurationStep> {
        let security = &self.security_configuration;
        #[rustfmt::skip]
        let steps = [
            security.bek.as_ref().map_or(true, |b| b.is_empty())
                .then(|| RequiredConfigurationStep::Bek),

            security.signing_key.modulus.is_empty()
                .then(|| RequiredConfigurationStep::SigningKeyModulus),

            (!security.signing_key.can_sign())
                .then(|| RequiredConfigurationStep::SigningKeyPrivateExponent),

            security.vendor_key.modulus.is_empty()
                .then(|| RequiredConfigurationStep::VendorKeyModulus),
        ];
        steps.into_iter().flatten()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequiredConfigurationStep {
    Bek,
    SigningKeyModulus,
    SigningKeyPrivateExponent,
    VendorKeyModulus,
}

impl Display for RequiredConfigurationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RequiredConfigurationStep::Bek => {
                "[Security] Provide the boot encryption key (BEK environment variable)"
            }
            RequiredConfigurationStep::SigningKeyModulus => "[Security] Provide the signing key modulus",
            RequiredConfigurationStep::SigningKeyPrivateExponent => {
                "[Security] Provide the signing key private exponent"
            }
            RequiredConfigurationStep::VendorKeyModulus => "[Security] Provide the vendor key modulus",
        })
    }
}
