//! pew - inspector for Windows PE/COFF images
//!
//! Usage: `pew [--config <path>] <file>`

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use env_logger::{Builder, Target};
use log::{LevelFilter, debug, warn};
use pew_parser::{ByteSource, PeFile, check};

mod config;
mod errors;
mod loader;
mod report;

use config::Config;
use errors::{AppError, AppResult};
use report::Report;

const USAGE: &str = "usage: pew [--config <path>] <file>";

#[derive(Debug, PartialEq, Eq)]
struct Args {
    file: PathBuf,
    config: Option<PathBuf>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> AppResult<Self> {
        let mut file = None;
        let mut config = None;
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    let path = args
                        .next()
                        .ok_or_else(|| AppError::Usage(format!("--config needs a path\n{}", USAGE)))?;
                    config = Some(PathBuf::from(path));
                }
                "-h" | "--help" => return Err(AppError::Usage(USAGE.to_string())),
                _ if file.is_none() => file = Some(PathBuf::from(arg)),
                _ => return Err(AppError::Usage(format!("unexpected argument '{}'\n{}", arg, USAGE))),
            }
        }
        let file = file.ok_or_else(|| AppError::Usage(USAGE.to_string()))?;
        Ok(Self { file, config })
    }
}

/// Diagnostics go to stderr. RUST_LOG, when set, overrides the configured
/// level.
fn init_logging(level: &str) {
    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::Warn);
    let mut builder = Builder::new();
    builder
        .target(Target::Stderr)
        .filter_level(level)
        .parse_default_env();
    let _ = builder.try_init();
}

/// Classify `source` once and build the model from that result.
fn decode(source: ByteSource) -> AppResult<PeFile> {
    let bitness = match check(source.bytes()) {
        Ok(bitness) => bitness,
        Err(e) => {
            warn!("{}: nothing to decode: {}", source.name(), e);
            return Err(e.into());
        }
    };
    debug!("{}: classified as {:?}", source.name(), bitness);
    Ok(PeFile::new(source, bitness)?)
}

fn run() -> AppResult<()> {
    let args = Args::parse(std::env::args().skip(1))?;
    let config = Config::load(args.config.as_deref());
    init_logging(&config.general.log_level);

    let pe = decode(loader::load(&args.file)?)?;
    let text = Report::new(&pe, &config.report).render();

    let mut out = io::stdout().lock();
    out.write_all(text.as_bytes())?;
    out.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pew: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pew_parser::{Bitness, PeError};

    fn args(list: &[&str]) -> AppResult<Args> {
        Args::parse(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_file_and_config() {
        let parsed = args(&["--config", "my.toml", "kernel32.dll"]).unwrap();
        assert_eq!(parsed.file, PathBuf::from("kernel32.dll"));
        assert_eq!(parsed.config, Some(PathBuf::from("my.toml")));

        let parsed = args(&["app.exe"]).unwrap();
        assert_eq!(parsed.config, None);
    }

    #[test]
    fn test_decode_rejects_non_pe() {
        let err = decode(ByteSource::from_bytes("notes.txt", b"hello".to_vec())).unwrap_err();
        assert!(matches!(err, AppError::Pe(PeError::NotPe(_))));

        let mut img = vec![0u8; 0x200];
        img[0..2].copy_from_slice(b"MZ");
        img[0x3C..0x40].copy_from_slice(&0x1F0u32.to_le_bytes());
        let err = decode(ByteSource::from_bytes("short.exe", img)).unwrap_err();
        assert!(matches!(err, AppError::Pe(_)));
    }

    #[test]
    fn test_decode_keeps_classified_bitness() {
        let mut img = vec![0u8; 0x400];
        img[0..2].copy_from_slice(b"MZ");
        img[0x3C..0x40].copy_from_slice(&0x40u32.to_le_bytes());
        img[0x40..0x44].copy_from_slice(b"PE\0\0");
        img[0x44..0x46].copy_from_slice(&0x8664u16.to_le_bytes());
        img[0x54..0x56].copy_from_slice(&240u16.to_le_bytes());
        img[0x58..0x5A].copy_from_slice(&0x020bu16.to_le_bytes());
        img[0x58 + 108..0x58 + 112].copy_from_slice(&16u32.to_le_bytes());
        let pe = decode(ByteSource::from_bytes("x64.dll", img)).unwrap();
        assert_eq!(pe.bitness(), Bitness::Pe64);
    }

    #[test]
    fn test_usage_errors() {
        assert!(matches!(args(&[]), Err(AppError::Usage(_))));
        assert!(matches!(args(&["--config"]), Err(AppError::Usage(_))));
        assert!(matches!(args(&["a.exe", "b.exe"]), Err(AppError::Usage(_))));
        assert!(matches!(args(&["--help"]), Err(AppError::Usage(_))));
    }
}
