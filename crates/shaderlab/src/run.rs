use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use renderer::{
    is_reserved, prepare, run_preview, EngineConfig, FrameQueue, GpuBackend, PreviewOptions,
    ProjectSnapshot, ShaderEngine, VsyncMode,
};
use tracing_subscriber::EnvFilter;

use crate::cli::{CheckArgs, NewArgs, PreviewArgs, RenderArgs, SnapshotArgs};
use crate::config::Settings;
use crate::paths::AppPaths;
use crate::sources::{write_project, SourceSet};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn preview(config_path: Option<&Path>, args: PreviewArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let settings = load_settings(&paths, config_path)?;
    let mut config = engine_config(&settings, &args.render);
    if args.paused {
        config.start_paused = true;
    }
    if args.no_vsync {
        config.vsync = VsyncMode::Off;
    }

    let sources = SourceSet::from_args(args.sources)?;
    let screenshot_dir = settings
        .screenshot_dir
        .clone()
        .unwrap_or_else(|| paths.screenshot_dir());
    tracing::debug!(
        config = %paths.config_dir().display(),
        screenshots = %screenshot_dir.display(),
        width = config.surface_size.0,
        height = config.surface_size.1,
        "starting preview"
    );

    let title = format!("shaderlab - {}", sources.title());
    let options = PreviewOptions::new(title, config, screenshot_dir).watching(sources.files());
    run_preview(options, move || sources.load())
}

pub fn check(args: CheckArgs) -> Result<()> {
    let sources = SourceSet::from_args(args.sources)?;
    let project = sources.load()?;
    let prepared = prepare(&project.sources()).map_err(|rejection| anyhow!("{rejection}"))?;

    println!("{}: ok", project.name);
    for member in prepared.layout.members() {
        println!("  uniform {:<6} {:<20} offset {}", member.ty, member.name, member.offset);
    }
    for parameter in &project.parameters {
        if is_reserved(&parameter.name) {
            println!("  note: parameter '{}' is reserved and ignored", parameter.name);
        } else if prepared.layout.member(&parameter.name).is_none() {
            println!("  note: parameter '{}' has no matching uniform", parameter.name);
        }
    }
    Ok(())
}

pub fn snapshot(config_path: Option<&Path>, args: SnapshotArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let settings = load_settings(&paths, config_path)?;
    let mut config = engine_config(&settings, &args.render);
    config.start_paused = true;
    let time = Duration::try_from_secs_f32(args.time)
        .map_err(|_| anyhow!("--time must be a non-negative number of seconds"))?;

    let project = SourceSet::from_args(args.sources)?.load()?;
    let png = render_still(&config, project, time)?;
    write_png(&args.out, &png)?;
    println!("{}", args.out.display());
    Ok(())
}

pub fn new_project(args: NewArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            args.path.display()
        );
    }
    let name = args.name.unwrap_or_else(|| {
        args.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_string())
    });
    write_project(&args.path, &ProjectSnapshot::starter(name))?;
    tracing::info!(path = %args.path.display(), "project created");
    Ok(())
}

fn render_still(config: &EngineConfig, project: ProjectSnapshot, time: Duration) -> Result<Vec<u8>> {
    let backend = GpuBackend::headless(config)?;
    tracing::debug!(adapter = backend.adapter_name(), "rendering snapshot");
    let now = Instant::now();
    let mut engine = ShaderEngine::attach(backend, FrameQueue::new(), config, now)
        .map_err(|err| anyhow!("fallback shader failed to build: {err}"))?;
    let name = project.name.clone();
    engine
        .load(project)
        .map_err(|rejection| anyhow!("{rejection}"))
        .with_context(|| format!("project '{name}' did not compile"))?;
    engine.seek(time, now);
    let png = engine.capture_png().context("failed to capture frame")?;
    engine.dispose();
    Ok(png)
}

fn write_png(path: &Path, png: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    fs::write(path, png).with_context(|| format!("failed to write {}", path.display()))
}

fn load_settings(paths: &AppPaths, explicit: Option<&Path>) -> Result<Settings> {
    match explicit {
        Some(path) => Settings::load(path, true),
        None => Settings::load(&paths.settings_file(), false),
    }
}

fn engine_config(settings: &Settings, render: &RenderArgs) -> EngineConfig {
    let mut config = settings.engine_config();
    if let Some(size) = render.size {
        config.surface_size = size;
    }
    if let Some(power) = render.power {
        config.power = power;
    }
    config
}
