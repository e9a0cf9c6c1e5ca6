//! htmlcap entry point.
//!
//! `htmlcap serve` (the default) runs the HTTP server; `htmlcap convert`
//! performs a single conversion from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::info;

use htmlcap::convert::{output_file_name, Converter};
use htmlcap::encoder::GifEncoder;
use htmlcap::options::ConversionOptions;
use htmlcap::render::{RenderDriver, Target};
use htmlcap::server::{self, AppState, Config};
use htmlcap::EngineConfig;

#[derive(Parser)]
#[command(name = "htmlcap", version, about = "Render HTML to JPEG, PNG or animated GIF")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP conversion service
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Convert one document and exit
    Convert(ConvertArgs),
}

#[derive(Args)]
struct ConvertArgs {
    /// URL (http/https) or path of an HTML file
    input: String,
    /// Output file; defaults to `converted-<stamp>.<ext>` in the current directory
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// jpeg, png or gif
    #[arg(long, default_value = "jpeg")]
    format: String,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    #[arg(long)]
    scale: Option<u32>,
    #[arg(long)]
    quality: Option<u32>,
    /// GIF length in milliseconds
    #[arg(long)]
    duration: Option<u64>,
    #[arg(long)]
    fps: Option<u32>,
    #[arg(long)]
    wait_for_animation: bool,
    /// Settle delay in milliseconds when --wait-for-animation is set
    #[arg(long)]
    animation_duration: Option<u64>,
}

impl ConvertArgs {
    /// The same document a client would send as `options`.
    fn options_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("type".into(), json!(self.format));
        let numbers = [
            ("width", self.width.map(u64::from)),
            ("height", self.height.map(u64::from)),
            ("scale", self.scale.map(u64::from)),
            ("quality", self.quality.map(u64::from)),
            ("duration", self.duration),
            ("fps", self.fps.map(u64::from)),
            ("animationDuration", self.animation_duration),
        ];
        for (key, value) in numbers {
            if let Some(v) = value {
                doc.insert(key.into(), json!(v));
            }
        }
        doc.insert("waitForAnimation".into(), json!(self.wait_for_animation));
        Value::Object(doc)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env_file(".env");
    init_tracing(&config);

    match cli.command.unwrap_or(Command::Serve { host: None, port: None }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            info!(version = env!("CARGO_PKG_VERSION"), "htmlcap starting");
            server::ensure_directories(&config).context("creating working directories")?;
            let state = Arc::new(AppState::from_config(config, htmlcap::default_launcher()));
            server::serve(state).await
        }
        Command::Convert(args) => convert_once(&config, args).await,
    }
}

async fn convert_once(config: &Config, args: ConvertArgs) -> anyhow::Result<()> {
    let options = ConversionOptions::from_value(Some(&args.options_document()))?;
    let target = Target::parse(&args.input);
    if let Target::File(path) = &target {
        if !path.exists() {
            bail!("The file {} does not exist.", path.display());
        }
    }

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(output_file_name(options.format)));
    let frames_root = tempfile::tempdir().context("creating frame directory")?;

    let engine = EngineConfig {
        executable: config.chrome_path.clone(),
        ..Default::default()
    };
    let converter = Converter::new(
        RenderDriver::new(htmlcap::default_launcher(), engine),
        GifEncoder::from_override(config.ffmpeg_path.as_deref()),
        frames_root.path(),
    );

    let result = converter.convert(&target, &output, &options).await?;
    match result.frames {
        Some(frames) => println!("{} ({} frames)", result.output.display(), frames),
        None => println!("{}", result.output.display()),
    }
    Ok(())
}

/// `RUST_LOG` wins, then the configured level; `log` records from the
/// library are forwarded through the subscriber.
fn init_tracing(config: &Config) {
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match config.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: HTMLCAP_LOG='{}' is not a valid tracing filter ({}); falling back to 'info'",
                    config.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
