use crate::config::{load_config, DiagramConfig};
use crate::entry::render_pipeline;
use crate::ir::Pipeline;
use crate::render::RendererKind;
use crate::storage::{Destination, MirrorStore, ObjectStore};
use crate::theme::{Theme, ThemeOverrides, ThemeSpec};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pipediag", version, about = "Render a pipeline's process graph as an SVG diagram")]
pub struct Args {
    /// Pipeline file (JSON5 or JSON)
    #[arg(required_unless_present = "list_themes")]
    pub input: Option<PathBuf>,

    /// Output directory or remote uri; defaults to ./<pipeline name>-output
    #[arg(short = 'o', long = "outdir")]
    pub outdir: Option<String>,

    /// Config file (JSON5) with diagram options
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Built-in theme name
    #[arg(short = 't', long = "theme", conflicts_with = "theme_file")]
    pub theme: Option<String>,

    /// JSON5 file with per-role attribute overrides
    #[arg(long = "theme-file")]
    pub theme_file: Option<PathBuf>,

    /// Theme that overrides are applied to
    #[arg(long = "base-theme")]
    pub base_theme: Option<String>,

    /// Also write the graph description as <outdir>/diagram.dot
    #[arg(long = "save-dot")]
    pub save_dot: bool,

    #[arg(short = 'r', long = "renderer", value_enum)]
    pub renderer: Option<RendererArg>,

    /// Also write <outdir>/diagram.png
    #[arg(long = "png")]
    pub png: bool,

    /// Local directory that remote output uris are mirrored into
    #[arg(long = "remote-root")]
    pub remote_root: Option<PathBuf>,

    /// Print the built-in theme names and exit
    #[arg(long = "list-themes")]
    pub list_themes: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum RendererArg {
    Builtin,
    Graphviz,
}

impl From<RendererArg> for RendererKind {
    fn from(value: RendererArg) -> Self {
        match value {
            RendererArg::Builtin => RendererKind::Builtin,
            RendererArg::Graphviz => RendererKind::Graphviz,
        }
    }
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    if args.list_themes {
        for name in Theme::names() {
            println!("{name}");
        }
        return Ok(());
    }

    let (pipeline, config) = prepare(&args)?;
    init_tracing(&config.loglevel)?;
    let outdir = destination(&args, &pipeline)?;
    render_pipeline(&pipeline, &config, &outdir)
        .with_context(|| format!("failed to build diagram for pipeline `{}`", pipeline.name))?;
    Ok(())
}

/// Load the pipeline and layer its options: config file, then pipeline options, then flags.
fn prepare(args: &Args) -> Result<(Pipeline, DiagramConfig)> {
    let input = args.input.as_deref().context("no pipeline file given")?;
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read pipeline file {}", input.display()))?;
    let (pipeline, options) = Pipeline::from_json5(&source)
        .with_context(|| format!("failed to load pipeline file {}", input.display()))?;

    let mut config = load_config(args.config.as_deref())?;
    if let Some(options) = options {
        config.apply_options(options)?;
    }
    apply_args(&mut config, args)?;
    Ok((pipeline, config))
}

fn apply_args(config: &mut DiagramConfig, args: &Args) -> Result<()> {
    if let Some(name) = &args.theme {
        config.theme = ThemeSpec::Name(name.clone());
    }
    if let Some(path) = &args.theme_file {
        config.theme = ThemeSpec::Overrides(load_theme_file(path)?);
    }
    if let Some(base) = &args.base_theme {
        config.base_theme = base.clone();
    }
    if args.save_dot {
        config.save_dot = true;
    }
    if let Some(renderer) = args.renderer {
        config.renderer = renderer.into();
    }
    if args.png {
        config.png = true;
    }
    Ok(())
}

fn load_theme_file(path: &Path) -> Result<ThemeOverrides> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read theme file {}", path.display()))?;
    json5::from_str(&contents).with_context(|| format!("invalid theme file {}", path.display()))
}

fn destination(args: &Args, pipeline: &Pipeline) -> Result<Destination> {
    let location = args
        .outdir
        .clone()
        .unwrap_or_else(|| format!("./{}-output", pipeline.name));
    let store = args
        .remote_root
        .as_ref()
        .map(|root| Arc::new(MirrorStore::new(root)) as Arc<dyn ObjectStore>);
    Ok(Destination::parse(&location, store)?)
}

fn init_tracing(loglevel: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,pipeline_diagram={}", loglevel.to_ascii_lowercase())));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))
}
