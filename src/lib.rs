//! # Boot Image Packaging Library
//!
//! Builds, parses and authenticates the chain of boot images consumed by the
//! Erista boot ROM: the encrypted package1 blob, the signed payload header
//! wrapping it, and the boot configuration table pointing at the bootloader.
//!
//! The codecs live in [`image`], the primitives they rely on in [`crypto`].
//! [`commands`] glues both to the filesystem for the `stagepack` binary.

pub mod commands;
pub mod crypto;
pub mod error;
pub mod image;
pub mod keys;
