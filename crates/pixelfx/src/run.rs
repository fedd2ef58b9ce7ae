use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use effects::{
    normalize_id, pack_directory, EffectRepository, LibraryUnit, Metadata, Package,
    TransformUnit, UnitKind, UnitStore, EFFECT_MANIFEST, EFFECT_SOURCE,
};
use engine::{
    apply_effect, EvalOptions, ParamValue, Params, PixelGrid, PreparedEffect, Rgba,
};
use fxchain::{apply_chain, ChainProgram};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{
    AboutArgs, ApplyArgs, ApplyChainArgs, Cli, Command, MakeEmptyArgs, PackArgs, SaveTestArgs,
    UnpackArgs,
};
use crate::config::AppConfig;
use crate::paths::AppPaths;

const EMPTY_EFFECT_MANIFEST: &str = "name = \"Empty Effect\"\n\
version = \"1.0.0\"\n\
author = \"unknown\"\n\
description = \"pixelfx generated empty effect\"\n";

const EMPTY_EFFECT_SOURCE: &str = "// x, y: pixel coordinates; pixel: #{ r, g, b, a } with 0..255 channels\n\
// write your code here\n\
#{ r: pixel.r, g: pixel.g, b: pixel.b, a: pixel.a }\n";

pub fn initialise_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config = AppConfig::load(&paths.config_file())?;
    let options = config.eval_options(&cli.global);
    let repo = EffectRepository::new(paths.search_roots());
    debug!(roots = ?repo.roots(), workers = options.workers, timeout = ?options.timeout, "resolved settings");

    match cli.command {
        Command::Apply(args) => run_apply(&repo, &options, args),
        Command::ApplyChain(args) => run_apply_chain(&repo, &options, args),
        Command::About(args) => run_about(&repo, args),
        Command::Pack(args) => run_pack(&repo, args),
        Command::UnpackEffect(args) => run_unpack(&paths, UnitKind::Effect, args),
        Command::UnpackLib(args) => run_unpack(&paths, UnitKind::Library, args),
        Command::MakeEmpty(args) => run_make_empty(&paths, args),
        Command::SaveTest(args) => run_save_test(args),
        Command::Paths => {
            run_paths(&paths);
            Ok(())
        }
    }
}

fn run_apply(repo: &EffectRepository, options: &EvalOptions, args: ApplyArgs) -> Result<()> {
    let unit = repo
        .effect(&args.effect)
        .with_context(|| format!("failed to load effect '{}'", args.effect))?;
    let prepared = PreparedEffect::prepare(&unit, repo)
        .with_context(|| format!("failed to prepare effect '{}'", unit.id()))?;
    let params = collect_params(args.params)?;

    let mut grid = PixelGrid::open(&args.file)?;
    info!(effect = unit.id(), input = %args.file.display(), "applying effect");
    apply_effect(&prepared, &params, &mut grid, options)
        .with_context(|| format!("effect '{}' failed", unit.id()))?;

    grid.save(&args.out)?;
    info!(output = %args.out.display(), "saved image");
    Ok(())
}

fn collect_params(pairs: Vec<(String, ParamValue)>) -> Result<Params> {
    let mut params = Params::new();
    for (key, value) in pairs {
        if params.insert(key.clone(), value).is_some() {
            bail!("duplicate parameter '{key}'");
        }
    }
    Ok(params)
}

fn run_apply_chain(
    repo: &EffectRepository,
    options: &EvalOptions,
    args: ApplyChainArgs,
) -> Result<()> {
    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read chain file {}", args.file.display()))?;
    let program = ChainProgram::parse(&source)
        .with_context(|| format!("invalid chain file {}", args.file.display()))?;

    let mut grid = PixelGrid::open(&args.img)?;
    info!(chain = %args.file.display(), steps = program.len(), "applying chain");
    apply_chain(&program, repo, &mut grid, options)
        .with_context(|| format!("chain {} failed", args.file.display()))?;

    grid.save(&args.out)?;
    info!(output = %args.out.display(), "saved image");
    Ok(())
}

#[derive(Debug, Serialize)]
struct AboutReport<'a> {
    kind: String,
    path: &'a Path,
    #[serde(flatten)]
    metadata: &'a Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<Vec<&'a str>>,
}

fn run_about(repo: &EffectRepository, args: AboutArgs) -> Result<()> {
    let effect;
    let library;
    let report = if let Some(id) = &args.effect {
        effect = repo
            .effect(id)
            .with_context(|| format!("failed to load effect '{id}'"))?;
        AboutReport {
            kind: UnitKind::Effect.to_string(),
            path: effect.root(),
            metadata: effect.metadata(),
            files: None,
        }
    } else if let Some(id) = &args.lib {
        library = repo
            .library(id)
            .with_context(|| format!("failed to load library '{id}'"))?;
        AboutReport {
            kind: UnitKind::Library.to_string(),
            path: library.root(),
            metadata: library.metadata(),
            files: Some(library.file_names().collect()),
        }
    } else {
        bail!("what should be described? use --effect <id> or --lib <id>");
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let meta = report.metadata;
    println!("======== About {} ========", meta.id);
    println!("Name:         {}", meta.name);
    println!("Version:      {}", meta.version);
    println!("Author:       {}", meta.author);
    println!("Description:  {}", meta.description);
    println!("Location:     {}", report.path.display());
    if !meta.preload.is_empty() {
        println!("Preload:      {}", meta.preload.join(", "));
    }
    if !meta.libs.is_empty() {
        println!("Libraries:    {}", meta.libs.join(", "));
    }
    if let Some(files) = &report.files {
        println!("Files:        [{}]", files.join("; "));
    }
    Ok(())
}

fn run_pack(repo: &EffectRepository, args: PackArgs) -> Result<()> {
    let (kind, raw_id) = match (&args.effect, &args.lib) {
        (Some(id), None) => (UnitKind::Effect, id),
        (None, Some(id)) => (UnitKind::Library, id),
        _ => bail!("use ONLY --effect <id> or ONLY --lib <id>"),
    };
    let id = normalize_id(raw_id)?;
    let dir = repo.locate(kind, &id)?;

    // refuse to pack a folder the loader would reject
    match kind {
        UnitKind::Effect => TransformUnit::load(&dir).map(|_| ()),
        UnitKind::Library => LibraryUnit::load(&dir).map(|_| ()),
    }
    .with_context(|| format!("{kind} '{id}' is not valid"))?;

    let bytes = pack_directory(&dir, &id)?;
    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(format!("{id}{}", kind.package_suffix())));
    fs::write(&out, &bytes).with_context(|| format!("failed to write {}", out.display()))?;
    info!(%kind, id = %id, path = %out.display(), bytes = bytes.len(), "packed unit");
    println!("Packed {kind} '{id}' into {}", out.display());
    Ok(())
}

fn run_unpack(paths: &AppPaths, kind: UnitKind, args: UnpackArgs) -> Result<()> {
    let bytes = fs::read(&args.file)
        .with_context(|| format!("failed to read package {}", args.file.display()))?;
    let package = Package::decode(&bytes)
        .with_context(|| format!("failed to parse package {}", args.file.display()))?;

    let target = EffectRepository::new(vec![paths.install_root().to_path_buf()]);
    let dest = target
        .install(kind, &package)
        .with_context(|| format!("package {} holds an invalid {kind}", args.file.display()))?;

    println!("Installed {kind} '{}' into {}", package.name(), dest.display());
    Ok(())
}

fn run_make_empty(paths: &AppPaths, args: MakeEmptyArgs) -> Result<()> {
    let id = normalize_id(&args.effect)?;
    let dir = paths
        .install_root()
        .join(UnitKind::Effect.dir_name())
        .join(&id);
    if dir.exists() {
        bail!("effect folder {} already exists", dir.display());
    }

    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    fs::write(dir.join(EFFECT_MANIFEST), EMPTY_EFFECT_MANIFEST)
        .with_context(|| format!("failed to write {}", dir.join(EFFECT_MANIFEST).display()))?;
    fs::write(dir.join(EFFECT_SOURCE), EMPTY_EFFECT_SOURCE)
        .with_context(|| format!("failed to write {}", dir.join(EFFECT_SOURCE).display()))?;

    info!(effect = %id, path = %dir.display(), "created empty effect");
    println!(" -- View your effect in: {}", dir.display());
    Ok(())
}

fn run_save_test(args: SaveTestArgs) -> Result<()> {
    let grid = test_pattern(args.size);
    grid.save(&args.out)?;
    info!(size = args.size, output = %args.out.display(), "saved test image");
    Ok(())
}

/// Red ramps along x and blue along y, each spanning 0..255 across the image.
fn test_pattern(size: u32) -> PixelGrid {
    let step = (size / 256).max(1);
    let ramp = |v: u32| (v / step).min(255) as u8;
    PixelGrid::from_fn(size, size, |x, y| Rgba::new(ramp(x), 0, ramp(y), 255))
}

fn run_paths(paths: &AppPaths) {
    println!("Directories:");
    println!("  config:     {}", paths.config_dir().display());
    println!("  data:       {}", paths.data_dir().display());
    println!("  share:      {}", paths.share_dir().display());
    println!("  config file: {}", paths.config_file().display());
    println!("Search roots:");
    for root in paths.search_roots() {
        println!("  {}", root.display());
    }
}
