//! Error types for the image codecs and the tools built on them.
use std::fmt::{self, Display, Formatter};

use crate::image::VerificationFailure;

/// Files the tool reads or writes, for error reporting purposes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum File {
    Payload,
    Loader,
    Package,
    Output,
    Configuration,
}

impl Display for File {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        use File::*;
        match self {
            Payload => write!(f, "payload"),
            Loader => write!(f, "loader"),
            Package => write!(f, "package"),
            Output => write!(f, "output"),
            Configuration => write!(f, "configuration"),
        }
    }
}

/// Top level error type. Structural problems (wrong sizes, short buffers, bad
/// keys) surface here as soon as they are detected. Failed hash or signature
/// checks do not: those are collected in a [`VerificationFailure`] and only
/// become an `Error` if the caller promotes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A buffer does not match the length its layout requires.
    SizeMismatch { expected: usize, actual: usize },
    /// A buffer is shorter than the fixed layout being parsed.
    TruncatedInput { required: usize, actual: usize },
    /// A caller supplied override has the wrong byte length.
    InvalidFieldSize { field: &'static str, expected: usize, actual: usize },
    /// Key material could not be turned into a usable key.
    KeyInvalid(&'static str),
    /// Signing was requested with a verify-only key.
    MissingPrivateKey,
    /// Encryption or decryption was requested but no BEK was provided.
    MissingBek,
    SigningFailed,
    FileReadFailed(File),
    FileWriteFailed(File),
    ConfigurationError(String),
    Verification(VerificationFailure),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        use Error::*;
        match self {
            SizeMismatch { expected, actual } => {
                write!(f, "[Size Mismatch] -> Expected 0x{:x} bytes, got 0x{:x}", expected, actual)
            }
            TruncatedInput { required, actual } => write!(
                f,
                "[Truncated Input] -> At least 0x{:x} bytes required, got 0x{:x}",
                required, actual
            ),
            InvalidFieldSize { field, expected, actual } => write!(
                f,
                "[Invalid Field Size] -> {} must be 0x{:x} bytes, got 0x{:x}",
                field, expected, actual
            ),
            KeyInvalid(text) => write!(f, "[Key Error] -> {}", text),
            MissingPrivateKey => write!(f, "[Key Error] -> Key has no private component"),
            MissingBek => write!(f, "[Key Error] -> No BEK provided (set the BEK environment variable)"),
            SigningFailed => write!(f, "[Key Error] -> Failed to produce a signature"),
            FileReadFailed(file) => write!(f, "[File Error] -> Failed to read {} file", file),
            FileWriteFailed(file) => write!(f, "[File Error] -> Failed to write {} file", file),
            ConfigurationError(text) => write!(f, "[Configuration Error] -> {}", text),
            Verification(failure) => write!(f, "[Verification Error] -> {}", failure),
        }
    }
}

impl std::error::Error for Error {}

impl From<VerificationFailure> for Error {
    fn from(failure: VerificationFailure) -> Self { Error::Verification(failure) }
}
