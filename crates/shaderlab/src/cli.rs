use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use renderer::GpuPowerPreference;

#[derive(Parser, Debug)]
#[command(
    name = "shaderlab",
    author,
    version,
    about = "Live GLSL shader playground",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Settings file to use instead of `settings.toml` in the config directory.
    #[arg(long, global = true, value_name = "FILE", env = "SHADERLAB_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a preview window that reloads the sources as they change.
    Preview(PreviewArgs),
    /// Compile the sources without a GPU and print diagnostics.
    Check(CheckArgs),
    /// Render one frame headlessly and write it as PNG.
    Snapshot(SnapshotArgs),
    /// Write a starter project file.
    New(NewArgs),
}

/// Where the shader sources come from. Explicit files override the project.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Project JSON (`name`, `fragmentShader`, optional `vertexShader` and `parameters`).
    #[arg(value_name = "PROJECT")]
    pub project: Option<PathBuf>,

    /// Fragment shader file.
    #[arg(long, value_name = "FILE")]
    pub fragment: Option<PathBuf>,

    /// Vertex shader file; the default full-surface vertex shader otherwise.
    #[arg(long, value_name = "FILE")]
    pub vertex: Option<PathBuf>,

    /// JSON array of parameters.
    #[arg(long, value_name = "FILE")]
    pub params: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Drawing buffer size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// GPU power preference: `low` or `high`.
    #[arg(long, value_name = "POWER", value_parser = parse_power)]
    pub power: Option<GpuPowerPreference>,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    #[command(flatten)]
    pub render: RenderArgs,

    /// Start with the animation paused.
    #[arg(long)]
    pub paused: bool,

    /// Present without waiting for vertical sync.
    #[arg(long)]
    pub no_vsync: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub sources: SourceArgs,
}

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    #[command(flatten)]
    pub render: RenderArgs,

    /// Output PNG path.
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,

    /// Animation time to render, in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    pub time: f32,
}

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Where to write the project JSON.
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Project name; defaults to the file stem.
    #[arg(long)]
    pub name: Option<String>,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1920x1080".to_string())?;
    let width = width
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid width in size".to_string())?;
    let height = height
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid height in size".to_string())?;
    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

fn parse_power(value: &str) -> Result<GpuPowerPreference, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" => Ok(GpuPowerPreference::High),
        other => Err(format!("unknown power preference '{other}'; expected low or high")),
    }
}
