use serde::{Deserialize, Serialize};

/// Raw RSA key components, hex encoded in little-endian byte order
/// (the order the boot ROM stores them in).
#[derive(Default, Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct RsaKeyConfiguration {
    pub modulus: String,
    pub public_exponent: u32,
    /// Absent for verify-only keys.
    #[serde(default)]
    pub private_exponent: Option<String>,
}

impl RsaKeyConfiguration {
    pub fn can_sign(&self) -> bool {
        self.private_exponent.as_ref().map_or(false, |d| !d.is_empty())
    }
}

#[derive(Default, Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SecurityConfiguration {
    /// Hex encoded AES-128 boot encryption key. Usually left out of the
    /// configuration file and supplied through the environment instead.
    #[serde(default)]
    pub bek: Option<String>,
    pub signing_key: RsaKeyConfiguration,
    pub vendor_key: RsaKeyConfiguration,
}
