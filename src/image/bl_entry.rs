//! Bootloader entry descriptor, as embedded in the Erista BCT.
//!
//! Describes where the boot ROM finds the bootloader and where it loads it,
//! and carries a signature over the SHA-256 of the (encrypted) payload. Unlike
//! the payload header, the signature here covers the data directly.
use std::{
    fmt::{self, Display, Formatter},
    io::Cursor,
    ops::Range,
};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use log::debug;
use static_assertions::const_assert_eq;

use super::{
    ensure_length, length_field, reversed_signature, write_field, write_validity,
    write_wrapped_hex, Check, VerificationFailure,
};
use crate::{
    crypto::{hash, RsaKey, Signature, SIGNATURE_SIZE},
    error::Error,
};

pub const BL_ENTRY_SIZE: usize = 0x12c;

const WORDS_RANGE: Range<usize> = 0x00..0x1c;
const WORD_COUNT: usize = 7;
const SIGNATURE_RANGE: Range<usize> = 0x2c..0x12c;

const_assert_eq!(WORDS_RANGE.end, WORD_COUNT * 4);
const_assert_eq!(SIGNATURE_RANGE.start - WORDS_RANGE.end, 0x10);
const_assert_eq!(SIGNATURE_RANGE.end - SIGNATURE_RANGE.start, SIGNATURE_SIZE);
const_assert_eq!(SIGNATURE_RANGE.end, BL_ENTRY_SIZE);

pub const DEFAULT_VERSION: u32 = 9;
pub const DEFAULT_START_BLOCK: u32 = 0xfc;
pub const DEFAULT_LOAD_ADDRESS: u32 = 0x4001_0000;
pub const DEFAULT_ATTRIBUTES: u32 = 3;
/// Distance between the end of the loader and the bootloader entry point.
pub const ENTRY_POINT_GAP: u32 = 0x20;

/// Optional fields for [`EristaBlEntry::build`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlEntryOverrides {
    pub version: Option<u32>,
    pub start_block: Option<u32>,
    pub load_address: Option<u32>,
    /// Defaults to just past the loader and its trailing gap.
    pub entry_point: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct EristaBlEntry<'k> {
    signature: Signature,
    version: u32,
    start_block: u32,
    start_page: u32,
    length: u32,
    load_address: u32,
    entry_point: u32,
    attributes: u32,
    payload: Vec<u8>,
    key: &'k RsaKey,
}

impl<'k> EristaBlEntry<'k> {
    /// Describes `payload`, which sits behind a loader of `loader_length` bytes.
    pub fn build(
        payload: &[u8],
        loader_length: usize,
        overrides: BlEntryOverrides,
        key: &'k RsaKey,
    ) -> Result<Self, Error> {
        let load_address = overrides.load_address.unwrap_or(DEFAULT_LOAD_ADDRESS);
        let entry_point = match overrides.entry_point {
            Some(entry_point) => entry_point,
            None => load_address
                .wrapping_add(length_field(loader_length)?)
                .wrapping_add(ENTRY_POINT_GAP),
        };
        let signature = key.sign(&hash(payload))?;
        let entry = Self {
            signature,
            version: overrides.version.unwrap_or(DEFAULT_VERSION),
            start_block: overrides.start_block.unwrap_or(DEFAULT_START_BLOCK),
            start_page: 0,
            length: length_field(payload.len())?,
            load_address,
            entry_point,
            attributes: DEFAULT_ATTRIBUTES,
            payload: payload.to_vec(),
            key,
        };
        debug!(
            "Built bootloader entry: start block 0x{:x}, load 0x{:x}, entry 0x{:x}",
            entry.start_block, entry.load_address, entry.entry_point
        );
        Ok(entry)
    }

    /// Reads an entry from its serialized form. The payload it describes is
    /// not part of the entry and must be supplied separately.
    pub fn parse(bytes: &[u8], payload: &[u8], key: &'k RsaKey) -> Result<Self, Error> {
        ensure_length(bytes, BL_ENTRY_SIZE)?;
        let mut cursor = Cursor::new(&bytes[WORDS_RANGE]);
        let mut word = || {
            cursor.read_u32::<LittleEndian>().map_err(|_| Error::TruncatedInput {
                required: BL_ENTRY_SIZE,
                actual: bytes.len(),
            })
        };
        Ok(Self {
            version: word()?,
            start_block: word()?,
            start_page: word()?,
            length: word()?,
            load_address: word()?,
            entry_point: word()?,
            attributes: word()?,
            signature: reversed_signature(&bytes[SIGNATURE_RANGE])?,
            payload: payload.to_vec(),
            key,
        })
    }

    pub fn signature(&self) -> &Signature { &self.signature }
    pub fn version(&self) -> u32 { self.version }
    pub fn start_block(&self) -> u32 { self.start_block }
    pub fn start_page(&self) -> u32 { self.start_page }
    pub fn length(&self) -> u32 { self.length }
    pub fn load_address(&self) -> u32 { self.load_address }
    pub fn entry_point(&self) -> u32 { self.entry_point }
    pub fn attributes(&self) -> u32 { self.attributes }
    pub fn payload(&self) -> &[u8] { &self.payload }
    pub fn key(&self) -> &'k RsaKey { self.key }

    pub fn serialize(&self) -> [u8; BL_ENTRY_SIZE] {
        let mut bytes = [0u8; BL_ENTRY_SIZE];
        let words = [
            self.version,
            self.start_block,
            self.start_page,
            self.length,
            self.load_address,
            self.entry_point,
            self.attributes,
        ];
        LittleEndian::write_u32_into(&words, &mut bytes[WORDS_RANGE]);
        let mut signature = self.signature;
        signature.reverse();
        bytes[SIGNATURE_RANGE].copy_from_slice(&signature);
        bytes
    }

    pub fn verify_signature(&self) -> bool { self.key.verify(&hash(&self.payload), &self.signature) }

    pub fn verify_length(&self) -> bool { self.length as usize == self.payload.len() }

    pub fn verify(&self) -> Result<(), VerificationFailure> {
        VerificationFailure::collect([
            (Check::Signature, self.verify_signature()),
            (Check::Length, self.verify_length()),
        ])
    }
}

impl Display for EristaBlEntry<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_field(f, "Version", self.version)?;
        write_field(f, "Data Size", format_args!("0x{:x}", self.length))?;
        write_field(f, "Entrypoint", format_args!("0x{:x}", self.entry_point))?;
        write_field(f, "Load addr.", format_args!("0x{:x}", self.load_address))?;
        write_wrapped_hex(f, "Signature", &self.signature)?;
        write_validity(f, &self.verify())
    }
}
