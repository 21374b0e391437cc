//! The tool's operations, expressed over files.
//!
//! Each command reads its inputs, runs them through the image codecs with
//! keys borrowed from a [`KeyRing`], writes its outputs and hands back the
//! diagnostic summary for the caller to print.
use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{info, warn};

use crate::{
    error::{Error, File},
    image::{
        bct::{self, EristaBct},
        bl_entry::{BlEntryOverrides, EristaBlEntry},
        payload::{Payload, PayloadOverrides},
        Pkg1,
    },
    keys::KeyRing,
};

#[derive(Clone, Debug, Default)]
pub struct MakeArguments {
    pub payload: PathBuf,
    pub out_file: PathBuf,
    pub loader: Option<PathBuf>,
    pub is_encrypted: bool,
    /// Zero pads the written package to a multiple of this many bytes.
    pub pad: Option<usize>,
    pub overrides: PayloadOverrides,
}

#[derive(Clone, Debug, Default)]
pub struct MakeBctArguments {
    pub payload: PathBuf,
    pub loader: PathBuf,
    pub out_file: Option<PathBuf>,
    pub sig_out_path: Option<PathBuf>,
    pub bl_entry_out_path: Option<PathBuf>,
    pub overrides: BlEntryOverrides,
}

fn read_file(path: &Path, file: File) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|e| {
        warn!("Failed to read {}: {}", path.display(), e);
        Error::FileReadFailed(file)
    })
}

fn write_file(path: &Path, contents: &[u8], file: File) -> Result<(), Error> {
    fs::write(path, contents).map_err(|e| {
        warn!("Failed to write {}: {}", path.display(), e);
        Error::FileWriteFailed(file)
    })?;
    info!("Wrote 0x{:x} bytes to {}", contents.len(), path.display());
    Ok(())
}

impl Pkg1 {
    pub fn from_files(payload: &Path, loader: Option<&Path>, is_encrypted: bool) -> Result<Self, Error> {
        let payload = read_file(payload, File::Payload)?;
        let loader = loader.map(|path| read_file(path, File::Loader)).transpose()?;
        Ok(Pkg1::new(payload, loader, is_encrypted))
    }
}

/// Assembles package1 from the inputs, wraps it in a signed payload header
/// and writes the result.
pub fn make(arguments: MakeArguments, keys: &KeyRing) -> Result<String, Error> {
    let pkg1 = Pkg1::from_files(
        &arguments.payload,
        arguments.loader.as_deref(),
        arguments.is_encrypted,
    )?;
    let package = pkg1.assemble(keys.bek().ok())?;
    let payload = Payload::build(&package, arguments.overrides, keys.signing_key())?;
    let bytes = match arguments.pad {
        Some(alignment) => payload.serialize_padded(alignment),
        None => payload.serialize(),
    };
    write_file(&arguments.out_file, &bytes, File::Output)?;
    Ok(payload.to_string())
}

/// Parses a package and reports on it. Failed checks are logged and shown in
/// the summary but do not make the command fail.
pub fn check(package: &Path, use_vendor_key: bool, keys: &KeyRing) -> Result<String, Error> {
    let key = if use_vendor_key { keys.vendor_key() } else { keys.signing_key() };
    let bytes = read_file(package, File::Package)?;
    let payload = Payload::parse(&bytes, key)?;
    match payload.verify() {
        Ok(()) => info!("{} is valid", package.display()),
        Err(failure) => warn!("{} failed verification: {}", package.display(), failure),
    }
    Ok(payload.to_string())
}

/// Decrypts a whole file with the BEK.
pub fn decrypt(input: &Path, output: &Path, keys: &KeyRing) -> Result<(), Error> {
    let bek = keys.bek()?;
    let data = read_file(input, File::Package)?;
    write_file(output, &bek.decrypt(&data)?, File::Output)
}

/// Builds a signed BCT describing an already encrypted payload and loader.
/// Nothing is written unless at least one output path is given.
pub fn make_erista_bct(arguments: MakeBctArguments, keys: &KeyRing) -> Result<String, Error> {
    let payload = read_file(&arguments.payload, File::Payload)?;
    let loader = read_file(&arguments.loader, File::Loader)?;
    let key = keys.signing_key();
    let bl_entry = EristaBlEntry::build(&payload, loader.len(), arguments.overrides, key)?;
    let bct = EristaBct::new(bl_entry, key)?;
    let bytes = bct.serialize();

    if let Some(path) = &arguments.out_file {
        write_file(path, &bytes, File::Output)?;
    }
    if let Some(path) = &arguments.bl_entry_out_path {
        write_file(path, bct::bl_entry_bytes(&bytes)?, File::Output)?;
    }
    if let Some(path) = &arguments.sig_out_path {
        write_file(path, bct::signature_bytes(&bytes)?, File::Output)?;
    }
    Ok(bct.to_string())
}
