use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Args, Parser, Subcommand};
use engine::ParamValue;

#[derive(Parser, Debug)]
#[command(
    name = "pixelfx",
    author,
    version,
    about = "Applies scripted per-pixel effects to images",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Evaluation bands: `1` runs sequentially, `0` uses one band per CPU.
    #[arg(long, global = true, value_name = "N")]
    pub workers: Option<usize>,

    /// Cancel an effect that runs longer than this (e.g. `500ms`, `30s`).
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply an installed effect to an image.
    Apply(ApplyArgs),
    /// Apply every step of a chain file to an image.
    ApplyChain(ApplyChainArgs),
    /// Describe an installed effect or library.
    About(AboutArgs),
    /// Pack an installed effect or library into an archive.
    Pack(PackArgs),
    /// Install an effect from a `.fx.xpk` archive.
    UnpackEffect(UnpackArgs),
    /// Install a library from a `.lib.xpk` archive.
    UnpackLib(UnpackArgs),
    /// Create an identity effect to start editing from.
    MakeEmpty(MakeEmptyArgs),
    /// Write a gradient test image.
    SaveTest(SaveTestArgs),
    /// Print resolved directories and effect search roots.
    Paths,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[arg(long, value_name = "ID")]
    pub effect: String,

    /// Input image.
    #[arg(long, value_name = "PATH")]
    pub file: PathBuf,

    /// Output image; the format follows the extension.
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,

    /// Effect parameter, repeatable (e.g. `--param amount=20`).
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = fxchain::parse_param)]
    pub params: Vec<(String, ParamValue)>,
}

#[derive(Args, Debug)]
pub struct ApplyChainArgs {
    /// Chain file (`.xfc`).
    #[arg(long, value_name = "PATH")]
    pub file: PathBuf,

    #[arg(long, value_name = "PATH")]
    pub img: PathBuf,

    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("unit").required(true).args(["effect", "lib"])))]
pub struct AboutArgs {
    #[arg(long, value_name = "ID")]
    pub effect: Option<String>,

    #[arg(long, value_name = "ID")]
    pub lib: Option<String>,

    /// Print machine-readable JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("unit").required(true).args(["effect", "lib"])))]
pub struct PackArgs {
    #[arg(long, value_name = "ID")]
    pub effect: Option<String>,

    #[arg(long, value_name = "ID")]
    pub lib: Option<String>,

    /// Archive path; defaults to `<id>.fx.xpk` or `<id>.lib.xpk` here.
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct UnpackArgs {
    #[arg(long, value_name = "PATH")]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct MakeEmptyArgs {
    #[arg(long, value_name = "ID")]
    pub effect: String,
}

#[derive(Args, Debug)]
pub struct SaveTestArgs {
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,

    /// Width and height in pixels.
    #[arg(long, value_name = "N", default_value_t = 1024)]
    pub size: u32,
}

pub fn parse_from(args: Vec<OsString>) -> Cli {
    Cli::parse_from(expand_shorthand(args))
}

/// `pixelfx thing.fx.xpk`, `thing.lib.xpk` and `thing.xfc` are shorthands for
/// `unpack-effect`, `unpack-lib` and `apply-chain` with `--file thing...`.
pub fn expand_shorthand(args: Vec<OsString>) -> Vec<OsString> {
    let command = match args.get(1).and_then(|arg| arg.to_str()) {
        Some(first) if first.ends_with(".fx.xpk") => "unpack-effect",
        Some(first) if first.ends_with(".lib.xpk") => "unpack-lib",
        Some(first) if first.ends_with(".xfc") => "apply-chain",
        _ => return args,
    };

    let mut args = args.into_iter();
    let mut expanded: Vec<OsString> = args.next().into_iter().collect();
    expanded.push(command.into());
    expanded.push("--file".into());
    expanded.extend(args);
    expanded
}

pub fn parse_timeout(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("timeout must not be empty".to_string());
    }
    let timeout = humantime::parse_duration(trimmed)
        .map_err(|err| format!("invalid timeout '{trimmed}': {err}"))?;
    if timeout.is_zero() {
        return Err("timeout must be greater than zero".to_string());
    }
    Ok(timeout)
}
