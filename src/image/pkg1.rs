//! Package1: the encrypted loader (and payload) blob the boot ROM consumes.
//!
//! With a loader, the layout is `encrypt(loader) || 0x20 zero bytes || payload`.
//! The payload after the gap is the raw input, not the encrypted copy; the
//! boot ROM handles that region separately. Without a loader the package is
//! just `encrypt(payload)`. Nothing at this layer is hashed or signed.
use log::debug;

use crate::{crypto::Bek, error::Error};

/// Zero gap between the encrypted loader and the payload.
pub const GAP_SIZE: usize = 0x20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pkg1 {
    payload: Vec<u8>,
    loader: Option<Vec<u8>>,
    is_encrypted: bool,
}

impl Pkg1 {
    /// `is_encrypted` marks the inputs as already encrypted, in which case
    /// they are laid out verbatim. An empty loader counts as no loader.
    pub fn new(payload: Vec<u8>, loader: Option<Vec<u8>>, is_encrypted: bool) -> Self {
        let loader = loader.filter(|loader| !loader.is_empty());
        Self { payload, loader, is_encrypted }
    }

    pub fn payload(&self) -> &[u8] { &self.payload }
    pub fn loader(&self) -> Option<&[u8]> { self.loader.as_deref() }
    pub fn is_encrypted(&self) -> bool { self.is_encrypted }

    /// Produces the package bytes. `bek` is only required when the inputs
    /// still need encrypting.
    pub fn assemble(&self, bek: Option<&Bek>) -> Result<Vec<u8>, Error> {
        let encrypt = |data: &[u8]| -> Result<Vec<u8>, Error> {
            if self.is_encrypted {
                Ok(data.to_vec())
            } else {
                bek.ok_or(Error::MissingBek)?.encrypt(data)
            }
        };

        match &self.loader {
            Some(loader) => {
                debug!(
                    "Assembling package1: loader 0x{:x} bytes, payload 0x{:x} bytes",
                    loader.len(),
                    self.payload.len()
                );
                let mut package = encrypt(loader)?;
                package.resize(package.len() + GAP_SIZE, 0);
                package.extend_from_slice(&self.payload);
                Ok(package)
            }
            None => {
                debug!("Assembling package1: payload 0x{:x} bytes, no loader", self.payload.len());
                encrypt(&self.payload)
            }
        }
    }
}
