//! Boot image formats and their authentication chain.
//!
//! From the inside out: [`pkg1`] concatenates and encrypts the loader and the
//! payload, [`payload`] wraps a blob in a hashed and signed header, and
//! [`bct`] produces the boot configuration table, whose embedded
//! [`bl_entry`] describes (and signs) the bootloader the boot ROM loads.
//!
//! Every structure can be *built* from its components, in which case it is
//! consistent by construction, or *parsed* from bytes, in which case any of
//! its checks may fail. Failed checks are not errors: they are gathered in a
//! [`VerificationFailure`] so all of them can be reported at once.

use std::fmt::{self, Display, Formatter};

use crate::{crypto::Signature, error::Error};

pub mod bct;
pub mod bl_entry;
pub mod payload;
pub mod pkg1;

pub use bct::EristaBct;
pub use bl_entry::EristaBlEntry;
pub use payload::Payload;
pub use pkg1::Pkg1;

/// Individual validity checks an image can fail.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Check {
    Hash,
    Signature,
    Length,
}

impl Display for Check {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Check::Hash => "Invalid hash",
            Check::Signature => "Invalid signature",
            Check::Length => "Invalid length",
        })
    }
}

/// Every check that failed during a verification pass, in the order they ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationFailure {
    failed: Vec<Check>,
}

impl VerificationFailure {
    /// Runs through `(check, passed)` pairs and collects the failures. All
    /// pairs are looked at; nothing short-circuits.
    pub fn collect<I: IntoIterator<Item = (Check, bool)>>(checks: I) -> Result<(), Self> {
        let failed: Vec<Check> =
            checks.into_iter().filter(|(_, passed)| !passed).map(|(check, _)| check).collect();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(Self { failed })
        }
    }

    pub fn failed(&self) -> &[Check] { &self.failed }
    pub fn contains(&self, check: Check) -> bool { self.failed.contains(&check) }
}

impl Display for VerificationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (index, check) in self.failed.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", check)?;
        }
        Ok(())
    }
}

/// Copies a slice into a fixed size field, reporting the offending field name
/// if the length is off.
pub(crate) fn fixed_field<const N: usize>(
    field: &'static str,
    bytes: &[u8],
) -> Result<[u8; N], Error> {
    if bytes.len() != N {
        return Err(Error::InvalidFieldSize { field, expected: N, actual: bytes.len() });
    }
    let mut array = [0u8; N];
    array.copy_from_slice(bytes);
    Ok(array)
}

/// Signatures are stored on disk in reversed byte order.
pub(crate) fn reversed_signature(bytes: &[u8]) -> Result<Signature, Error> {
    let mut signature: Signature = fixed_field("signature", bytes)?;
    signature.reverse();
    Ok(signature)
}

pub(crate) fn ensure_length(bytes: &[u8], required: usize) -> Result<(), Error> {
    if bytes.len() < required {
        Err(Error::TruncatedInput { required, actual: bytes.len() })
    } else {
        Ok(())
    }
}

pub(crate) fn length_field(length: usize) -> Result<u32, Error> {
    u32::try_from(length)
        .map_err(|_| Error::SizeMismatch { expected: u32::MAX as usize, actual: length })
}

// Diagnostic output helpers, shared by the `Display` impls of every format.

const LABEL_WIDTH: usize = 23;
const HEX_LINE_WIDTH: usize = 64;

/// Writes `label: value`, aligned. An empty label continues the previous field.
pub(crate) fn write_field<T: Display>(f: &mut Formatter<'_>, label: &str, value: T) -> fmt::Result {
    let label = if label.is_empty() { String::new() } else { format!("{}:", label) };
    writeln!(f, "{:<width$}{}", label, value, width = LABEL_WIDTH)
}

pub(crate) fn write_wrapped_hex(f: &mut Formatter<'_>, label: &str, bytes: &[u8]) -> fmt::Result {
    let mut label = format!("{}:", label);
    for chunk in bytes.chunks(HEX_LINE_WIDTH / 2) {
        writeln!(f, "{:<width$}{}", label, hex::encode(chunk), width = LABEL_WIDTH)?;
        label.clear();
    }
    Ok(())
}

pub(crate) fn write_validity(
    f: &mut Formatter<'_>,
    result: &Result<(), VerificationFailure>,
) -> fmt::Result {
    match result {
        Ok(()) => write_field(f, "Is valid", "True"),
        Err(failure) => {
            let mut label = "Is valid";
            for check in failure.failed() {
                write_field(f, label, check)?;
                label = "";
            }
            Ok(())
        }
    }
}
