//! Erista boot configuration table.
//!
//! The BCT is the first thing the boot ROM reads. It carries the public key
//! modulus, a signature over its own canonical region and, inside that region,
//! the descriptor of the bootloader to load.
//!
//! | Offset   | Size   | Field                                       |
//! |----------|--------|---------------------------------------------|
//! | `0x0000` | 4      | entries used                                |
//! | `0x0004` | 1      | virtual block size (log2)                   |
//! | `0x0005` | 1      | block size (log2)                           |
//! | `0x0006` | 0x20a  | reserved                                    |
//! | `0x0210` | 0x100  | RSA modulus, little-endian                  |
//! | `0x0310` | 0x10   | reserved                                    |
//! | `0x0320` | 0x100  | RSASSA-PSS signature, byte-reversed         |
//! | `0x0420` | 0xf0   | reserved                                    |
//! | `0x0510` | 0x22f0 | signed region (boot parameters, bootloader) |
use std::{
    fmt::{self, Display, Formatter},
    ops::Range,
};

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use static_assertions::const_assert_eq;

use super::{
    bl_entry::{EristaBlEntry, BL_ENTRY_SIZE},
    ensure_length, reversed_signature, write_validity, write_wrapped_hex, Check,
    VerificationFailure,
};
use crate::{
    crypto::{hash, RsaKey, Signature, SIGNATURE_SIZE},
    error::Error,
};

pub const BCT_SIZE: usize = 0x2800;
pub const SIGNATURE_RANGE: Range<usize> = 0x320..0x420;
pub const BL_ENTRY_RANGE: Range<usize> = 0x2330..0x245c;

const ENTRIES_USED_RANGE: Range<usize> = 0x0..0x4;
const VIRTUAL_BLOCK_SIZE_OFFSET: usize = 0x4;
const BLOCK_SIZE_OFFSET: usize = 0x5;
const MODULUS_RANGE: Range<usize> = 0x210..0x310;
const SIGNED_REGION_START: usize = 0x510;
const SIGNED_REGION_SIZE: usize = BCT_SIZE - SIGNED_REGION_START;

// Offsets below are relative to the start of the signed region.
const BOOT_PARAMETERS_RANGE: Range<usize> = 0x20..0x40;
const SDRAM_PARAMETER_SETS: usize = 4;
const SDRAM_PARAMETER_SIZE: usize = 0x768;
const SDRAM_PARAMETERS_START: usize = 0x7c;
const LOADERS_USED_RANGE: Range<usize> = 0x1e1c..0x1e20;
const REGION_BL_ENTRY_RANGE: Range<usize> = 0x1e20..0x1f4c;
const MAX_BOOTLOADERS: usize = 4;
const SECURE_DEBUG_CONTROL_RANGE: Range<usize> = 0x22d9..0x22dd;

const_assert_eq!(SIGNED_REGION_SIZE, 0x22f0);
const_assert_eq!(SIGNATURE_RANGE.end - SIGNATURE_RANGE.start, SIGNATURE_SIZE);
const_assert_eq!(MODULUS_RANGE.end - MODULUS_RANGE.start, SIGNATURE_SIZE);
const_assert_eq!(
    SDRAM_PARAMETERS_START + SDRAM_PARAMETER_SETS * SDRAM_PARAMETER_SIZE,
    LOADERS_USED_RANGE.start
);
const_assert_eq!(REGION_BL_ENTRY_RANGE.end - REGION_BL_ENTRY_RANGE.start, BL_ENTRY_SIZE);
const_assert_eq!(SIGNED_REGION_START + REGION_BL_ENTRY_RANGE.start, BL_ENTRY_RANGE.start);
const_assert_eq!(SIGNED_REGION_START + REGION_BL_ENTRY_RANGE.end, BL_ENTRY_RANGE.end);
const_assert_eq!(
    REGION_BL_ENTRY_RANGE.start + MAX_BOOTLOADERS * BL_ENTRY_SIZE + 9,
    SECURE_DEBUG_CONTROL_RANGE.start
);
const_assert_eq!(SECURE_DEBUG_CONTROL_RANGE.end + 0x13, SIGNED_REGION_SIZE);

pub const ENTRIES_USED: u32 = 0x200;
pub const VIRTUAL_BLOCK_SIZE_LOG2: u8 = 0xf;
pub const BLOCK_SIZE_LOG2: u8 = 0xe;
pub const LOADERS_USED: u32 = 1;
const SECURE_DEBUG_CONTROL: u32 = 0x8000_0000;

/// Boot device parameters stored in the signed region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootParameters {
    pub boot_data_version: u32,
    pub block_size_log2: u32,
    pub page_size_log2: u32,
    pub partition_size: u32,
    pub num_param_sets: u32,
    pub dev_type: u32,
    pub clock_divider: u32,
    pub data_width: u32,
}

impl Default for BootParameters {
    fn default() -> Self {
        Self {
            boot_data_version: 0x21_0001,
            block_size_log2: u32::from(BLOCK_SIZE_LOG2),
            page_size_log2: 9,
            partition_size: 0x100_0000,
            num_param_sets: 1,
            dev_type: 4,
            clock_divider: 9,
            data_width: 2,
        }
    }
}

impl BootParameters {
    fn words(&self) -> [u32; 8] {
        [
            self.boot_data_version,
            self.block_size_log2,
            self.page_size_log2,
            self.partition_size,
            self.num_param_sets,
            self.dev_type,
            self.clock_divider,
            self.data_width,
        ]
    }

    fn from_words(words: [u32; 8]) -> Self {
        let [boot_data_version, block_size_log2, page_size_log2, partition_size, num_param_sets, dev_type, clock_divider, data_width] =
            words;
        Self {
            boot_data_version,
            block_size_log2,
            page_size_log2,
            partition_size,
            num_param_sets,
            dev_type,
            clock_divider,
            data_width,
        }
    }
}

pub struct EristaBct<'k> {
    bl_entry: EristaBlEntry<'k>,
    entries_used: u32,
    virtual_block_size_log2: u8,
    block_size_log2: u8,
    modulus: [u8; SIGNATURE_SIZE],
    signature: Signature,
    parameters: BootParameters,
    loaders_used: u32,
    signed_region: Vec<u8>,
    key: &'k RsaKey,
}

impl<'k> EristaBct<'k> {
    /// Builds a table around `bl_entry` and signs it with `key`, whose modulus
    /// is embedded in the table.
    pub fn new(bl_entry: EristaBlEntry<'k>, key: &'k RsaKey) -> Result<Self, Error> {
        let parameters = BootParameters::default();
        let signed_region = signed_region(&parameters, LOADERS_USED, &bl_entry.serialize());
        let signature = key.sign(&hash(&signed_region))?;
        debug!("Signed 0x{:x} byte BCT region", signed_region.len());
        Ok(Self {
            bl_entry,
            entries_used: ENTRIES_USED,
            virtual_block_size_log2: VIRTUAL_BLOCK_SIZE_LOG2,
            block_size_log2: BLOCK_SIZE_LOG2,
            modulus: key.modulus_le(),
            signature,
            parameters,
            loaders_used: LOADERS_USED,
            signed_region,
            key,
        })
    }

    /// Reads a table from its serialized form. The signed region is kept as
    /// read, so verification sees exactly the bytes on disk.
    pub fn parse(bytes: &[u8], payload: &[u8], key: &'k RsaKey) -> Result<Self, Error> {
        ensure_length(bytes, BCT_SIZE)?;
        let signed_region = bytes[SIGNED_REGION_START..BCT_SIZE].to_vec();
        let mut words = [0u32; 8];
        LittleEndian::read_u32_into(&signed_region[BOOT_PARAMETERS_RANGE], &mut words);
        let mut modulus = [0u8; SIGNATURE_SIZE];
        modulus.copy_from_slice(&bytes[MODULUS_RANGE]);

        Ok(Self {
            bl_entry: EristaBlEntry::parse(&bytes[BL_ENTRY_RANGE], payload, key)?,
            entries_used: LittleEndian::read_u32(&bytes[ENTRIES_USED_RANGE]),
            virtual_block_size_log2: bytes[VIRTUAL_BLOCK_SIZE_OFFSET],
            block_size_log2: bytes[BLOCK_SIZE_OFFSET],
            modulus,
            signature: reversed_signature(&bytes[SIGNATURE_RANGE])?,
            parameters: BootParameters::from_words(words),
            loaders_used: LittleEndian::read_u32(&signed_region[LOADERS_USED_RANGE]),
            signed_region,
            key,
        })
    }

    pub fn bl_entry(&self) -> &EristaBlEntry<'k> { &self.bl_entry }
    pub fn entries_used(&self) -> u32 { self.entries_used }
    pub fn virtual_block_size_log2(&self) -> u8 { self.virtual_block_size_log2 }
    pub fn block_size_log2(&self) -> u8 { self.block_size_log2 }
    pub fn modulus(&self) -> &[u8; SIGNATURE_SIZE] { &self.modulus }
    pub fn signature(&self) -> &Signature { &self.signature }
    pub fn parameters(&self) -> &BootParameters { &self.parameters }
    pub fn loaders_used(&self) -> u32 { self.loaders_used }
    pub fn signed_region(&self) -> &[u8] { &self.signed_region }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; SIGNED_REGION_START];
        LittleEndian::write_u32(&mut bytes[ENTRIES_USED_RANGE], self.entries_used);
        bytes[VIRTUAL_BLOCK_SIZE_OFFSET] = self.virtual_block_size_log2;
        bytes[BLOCK_SIZE_OFFSET] = self.block_size_log2;
        bytes[MODULUS_RANGE].copy_from_slice(&self.modulus);
        let mut signature = self.signature;
        signature.reverse();
        bytes[SIGNATURE_RANGE].copy_from_slice(&signature);
        bytes.extend_from_slice(&self.signed_region);
        bytes
    }

    pub fn verify_signature(&self) -> bool {
        self.key.verify(&hash(&self.signed_region), &self.signature)
    }

    pub fn verify(&self) -> Result<(), VerificationFailure> {
        VerificationFailure::collect([(Check::Signature, self.verify_signature())])
    }
}

/// The stored signature, still in on-disk order, of a serialized table.
pub fn signature_bytes(bct: &[u8]) -> Result<&[u8], Error> {
    ensure_length(bct, SIGNATURE_RANGE.end)?;
    Ok(&bct[SIGNATURE_RANGE])
}

/// The embedded bootloader entry of a serialized table.
pub fn bl_entry_bytes(bct: &[u8]) -> Result<&[u8], Error> {
    ensure_length(bct, BL_ENTRY_RANGE.end)?;
    Ok(&bct[BL_ENTRY_RANGE])
}

impl Display for EristaBct<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_wrapped_hex(f, "Signature", &self.signature)?;
        write_validity(f, &self.verify())?;
        writeln!(f)?;
        writeln!(f, "Bootloader:")?;
        write!(f, "{}", self.bl_entry)
    }
}

/// Canonical region the outer signature covers.
fn signed_region(parameters: &BootParameters, loaders_used: u32, bl_entry: &[u8]) -> Vec<u8> {
    let mut region = vec![0u8; SIGNED_REGION_SIZE];
    LittleEndian::write_u32_into(&parameters.words(), &mut region[BOOT_PARAMETERS_RANGE]);
    LittleEndian::write_u32(&mut region[LOADERS_USED_RANGE], loaders_used);
    region[REGION_BL_ENTRY_RANGE].copy_from_slice(bl_entry);
    LittleEndian::write_u32(&mut region[SECURE_DEBUG_CONTROL_RANGE], SECURE_DEBUG_CONTROL);
    region
}
