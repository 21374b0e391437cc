use std::{env, fs, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{clap_app, ArgMatches};
use log::{debug, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use stagepack_config::{Configuration, BEK_ENV_VAR, CONFIG_ENV_VAR};
use stagepack_lib::{
    commands::{self, MakeArguments, MakeBctArguments},
    image::{bl_entry::BlEntryOverrides, payload::PayloadOverrides},
    keys::KeyRing,
};

/// Accepts decimal or `0x`/`0o`/`0b` prefixed integers.
fn parse_int(text: &str) -> Result<u32> {
    let (digits, radix) = match text.get(..2) {
        Some("0x") | Some("0X") => (&text[2..], 16),
        Some("0o") | Some("0O") => (&text[2..], 8),
        Some("0b") | Some("0B") => (&text[2..], 2),
        _ => (text, 10),
    };
    u32::from_str_radix(digits, radix).with_context(|| format!("'{}' is not a valid integer", text))
}

fn int_argument(matches: &ArgMatches, name: &str) -> Result<Option<u32>> {
    matches.value_of(name).map(parse_int).transpose()
}

fn path_argument(matches: &ArgMatches, name: &str) -> Result<PathBuf> {
    matches.value_of(name).map(PathBuf::from).ok_or_else(|| anyhow!("Missing argument <{}>", name))
}

fn optional_path(matches: &ArgMatches, name: &str) -> Option<PathBuf> {
    matches.value_of(name).map(PathBuf::from)
}

fn load_configuration() -> Result<Configuration> {
    let configuration = match env::var(CONFIG_ENV_VAR) {
        Ok(path) => {
            debug!("Loading configuration from {}", path);
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read configuration file {}", path))?;
            Configuration::from_ron(&contents)?
        }
        Err(_) => {
            debug!("{} not set, using the sample configuration", CONFIG_ENV_VAR);
            Configuration::sample()?
        }
    };
    let configuration = configuration.with_bek(env::var(BEK_ENV_VAR).ok());
    for step in configuration.required_configuration_steps() {
        debug!("Configuration incomplete: {}", step);
    }
    Ok(configuration)
}

fn log_level(occurrences: u64) -> LevelFilter {
    match occurrences {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> Result<()> {
    let matches = clap_app!(app =>
        (name: env!("CARGO_PKG_NAME"))
        (version: env!("CARGO_PKG_VERSION"))
        (about: env!("CARGO_PKG_DESCRIPTION"))
        (@setting SubcommandRequiredElseHelp)
        (@setting VersionlessSubcommands)
        (@arg verbose: -v ... "Increases logging verbosity (repeatable)")
        (@subcommand make =>
            (about: "Packages a payload (and optional loader) into a signed package1")
            (@arg payload: +required "Payload to package")
            (@arg out_file: +required "Where to write the signed package")
            (@arg loader: --loader +takes_value "Loader placed in front of the payload")
            (@arg is_encrypted: --is_encrypted "Inputs are already encrypted")
            (@arg load_addr: --load_addr +takes_value "Load address")
            (@arg entry_point: --entry_point +takes_value "Entry point (defaults to the load address)")
            (@arg version: --version +takes_value "Header version")
            (@arg pad: --pad +takes_value "Pads the package to a multiple of this many bytes")
        )
        (@subcommand check =>
            (about: "Parses a signed package and reports on its validity")
            (@arg package: +required "Package to check")
            (@arg use_vendor_key: --use_vendor_key "Verify against the vendor key instead of the signing key")
        )
        (@subcommand decrypt =>
            (about: "Decrypts a file with the BEK")
            (@arg file_in: +required "Encrypted input")
            (@arg file_out: +required "Decrypted output")
        )
        (@subcommand make_erista_bct =>
            (about: "Builds a signed Erista BCT for an encrypted payload and loader")
            (@arg payload_enc: +required "Encrypted payload")
            (@arg loader_enc: +required "Encrypted loader")
            (@arg out_file: --out_file +takes_value "Where to write the BCT")
            (@arg load_addr: --load_addr +takes_value "Bootloader load address")
            (@arg entry_point: --entry_point +takes_value "Bootloader entry point")
            (@arg version: --version +takes_value "Bootloader version")
            (@arg start_block: --start_block +takes_value "Bootloader start block")
            (@arg sig_out_path: --sig_out_path +takes_value "Where to write the BCT signature")
            (@arg bl_entry_out_path: --bl_entry_out_path +takes_value "Where to write the bootloader entry")
        )
    )
    .get_matches();

    TermLogger::init(
        log_level(matches.occurrences_of("verbose")),
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;

    let keys = KeyRing::from_configuration(&load_configuration()?)?;

    match matches.subcommand() {
        ("make", Some(matches)) => {
            let arguments = MakeArguments {
                payload: path_argument(matches, "payload")?,
                out_file: path_argument(matches, "out_file")?,
                loader: optional_path(matches, "loader"),
                is_encrypted: matches.is_present("is_encrypted"),
                pad: int_argument(matches, "pad")?.map(|pad| pad as usize),
                overrides: PayloadOverrides {
                    load_address: int_argument(matches, "load_addr")?,
                    entry_point: int_argument(matches, "entry_point")?,
                    version: int_argument(matches, "version")?,
                    ..Default::default()
                },
            };
            println!("{}", commands::make(arguments, &keys)?);
        }
        ("check", Some(matches)) => {
            let package = path_argument(matches, "package")?;
            let use_vendor_key = matches.is_present("use_vendor_key");
            println!("{}", commands::check(&package, use_vendor_key, &keys)?);
        }
        ("decrypt", Some(matches)) => {
            let input = path_argument(matches, "file_in")?;
            let output = path_argument(matches, "file_out")?;
            commands::decrypt(&input, &output, &keys)?;
        }
        ("make_erista_bct", Some(matches)) => {
            let arguments = MakeBctArguments {
                payload: path_argument(matches, "payload_enc")?,
                loader: path_argument(matches, "loader_enc")?,
                out_file: optional_path(matches, "out_file"),
                sig_out_path: optional_path(matches, "sig_out_path"),
                bl_entry_out_path: optional_path(matches, "bl_entry_out_path"),
                overrides: BlEntryOverrides {
                    version: int_argument(matches, "version")?,
                    start_block: int_argument(matches, "start_block")?,
                    load_address: int_argument(matches, "load_addr")?,
                    entry_point: int_argument(matches, "entry_point")?,
                },
            };
            println!("{}", commands::make_erista_bct(arguments, &keys)?);
        }
        (name, _) => return Err(anyhow!("Unknown subcommand {}", name)),
    }

    Ok(())
}
