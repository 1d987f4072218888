use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use farmnav::{
    colorize, config::ConfigLoader, decode_raster, frames::FrameWriter, script::parse_script,
    web::DemoConfig, HttpGateway, Layer, PaletteName, Session, TurnController,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Turn-based farm planning client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Play a session against a backend, driven by an input script
    Play(PlayArgs),
    /// Colorize a single-channel raster into an RGBA PNG
    Render(RenderArgs),
    /// Run the bundled demo backend
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct PlayArgs {
    /// Path to the client YAML file
    #[arg(long, default_value = "farmnav.yaml")]
    config: PathBuf,

    /// Input script; one command per line
    #[arg(long)]
    script: Option<PathBuf>,

    /// Override the backend base URL
    #[arg(long)]
    api_base: Option<String>,

    /// Write frames to this directory
    #[arg(long)]
    frames_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct RenderArgs {
    input: PathBuf,
    output: PathBuf,

    #[arg(long, default_value = "viridis")]
    palette: String,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8000)]
    port: u16,

    #[arg(long, default_value_t = 10)]
    grid_width: u32,

    #[arg(long, default_value_t = 10)]
    grid_height: u32,

    /// Years of the run, comma separated
    #[arg(long, value_delimiter = ',', default_values_t = [2020, 2021, 2022])]
    years: Vec<i32>,

    /// Layers to answer with 404
    #[arg(long, value_delimiter = ',')]
    missing_layers: Vec<Layer>,
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Play(args) => play(args).await,
        Command::Render(args) => {
            init_tracing("info");
            render(args)
        }
        Command::Serve(args) => {
            init_tracing("info");
            farmnav::web::run(DemoConfig {
                host: args.host,
                port: args.port,
                grid_width: args.grid_width,
                grid_height: args.grid_height,
                years: args.years,
                missing_layers: args.missing_layers,
                ..DemoConfig::default()
            })
            .await
        }
    }
}

async fn play(args: PlayArgs) -> Result<()> {
    let mut config = ConfigLoader::new(".").load(&args.config)?;
    init_tracing(&config.logging.level);
    if let Some(api_base) = args.api_base {
        config.api_base = api_base;
    }
    if let Some(dir) = args.frames_dir {
        config.frames.enabled = true;
        config.frames.output_dir = dir;
    }

    let inputs = match &args.script {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read script {}", path.display()))?;
            parse_script(&text).with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => Vec::new(),
    };

    let gateway = HttpGateway::new(config.request_timeout())?;
    let controller = TurnController::new(config.controller_settings())?;
    let mut session = Session::new(gateway, controller);
    if config.frames.enabled {
        session = session.with_frames(FrameWriter::new(&config.frames.output_dir)?);
    }

    session
        .start(config.session_context(), &config.new_game_request(), config.years.clone())
        .await?;
    let report = session.run_script(inputs).await;
    for error in &report.errors {
        warn!(%error, "session error");
    }
    info!(phase = %report.phase, year = ?report.year, "session finished");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn render(args: RenderArgs) -> Result<()> {
    let bytes = fs::read(&args.input).with_context(|| format!("Failed to read {}", args.input.display()))?;
    let raster = decode_raster(&bytes).with_context(|| format!("Failed to decode {}", args.input.display()))?;
    let palette = PaletteName::from_name(&args.palette);
    let png = colorize(&raster, palette).to_png()?;
    fs::write(&args.output, png).with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        width = raster.width(),
        height = raster.height(),
        %palette,
        "rendered"
    );
    Ok(())
}
