use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use onnx_classifier::{
    config::Config,
    inference::{load_model, predict, LabelMap},
    models::{Backbone, Device, OnnxBackbone},
    web::serve,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "onnx-classifier")]
#[command(about = "Binary image classification service backed by an ONNX backbone")]
struct Args {
    /// Server bind address
    #[arg(long, env = "ONNX_CLS_BIND", default_value = "0.0.0.0:8000")]
    bind: String,

    /// Number of worker threads
    #[arg(long, env = "ONNX_CLS_WORKERS")]
    workers: Option<usize>,

    /// Log level
    #[arg(long, env = "ONNX_CLS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Backbone ONNX model path
    #[arg(long, env = "ONNX_CLS_BACKBONE", default_value = "models/backbone.onnx")]
    backbone: PathBuf,

    /// Classifier head checkpoint (safetensors)
    #[arg(
        long,
        env = "ONNX_CLS_CHECKPOINT",
        default_value = "models/best_model.safetensors"
    )]
    checkpoint: PathBuf,

    /// Inference device: cpu, cuda, cuda:<id> or auto
    #[arg(long, env = "ONNX_CLS_DEVICE", default_value = "auto")]
    device: Device,

    /// Directory for uploaded images
    #[arg(long, env = "ONNX_CLS_MEDIA_DIR", default_value = "media")]
    media_dir: PathBuf,

    /// URL prefix under which uploads are served
    #[arg(long, env = "ONNX_CLS_MEDIA_URL", default_value = "/media/")]
    media_url: String,

    /// Display labels for class 0 and class 1
    #[arg(long, env = "ONNX_CLS_LABELS", default_value = "negative,positive")]
    labels: LabelMap,

    /// Enable development mode
    #[arg(long)]
    dev: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web service (default)
    Serve,
    /// Classify a single image and print the result as JSON
    Predict {
        /// Image file to classify
        image: PathBuf,
    },
}

impl Args {
    fn config(&self) -> Result<Config> {
        let mut config = Config::new(self.bind.clone(), self.workers, self.dev)?;
        config.model.backbone_path = self.backbone.clone();
        config.model.checkpoint_path = self.checkpoint.clone();
        config.model.device = self.device;
        config.media.media_dir = self.media_dir.clone();
        config.media.media_url = self.media_url.clone();
        config.labels = self.labels.clone();
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let config = args.config()?;

    match args.command {
        Some(Command::Predict { ref image }) => run_predict(&config, image),
        Some(Command::Serve) | None => run_server(config),
    }
}

fn run_server(config: Config) -> Result<()> {
    tracing::info!("Starting image classification service...");
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Backbone: {}", config.model.backbone_path.display());
    tracing::info!("Checkpoint: {}", config.model.checkpoint_path.display());
    tracing::info!("Worker threads: {}", config.workers);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(config))?;
    Ok(())
}

fn run_predict(config: &Config, image: &Path) -> Result<()> {
    let backbone: Arc<dyn Backbone> =
        Arc::new(OnnxBackbone::new(config).context("failed to load backbone")?);
    let model = load_model(&config.model.checkpoint_path, backbone, &config.model)
        .context("failed to load classifier checkpoint")?;

    let prediction = predict(image, &model, &config.labels)
        .with_context(|| format!("failed to classify {}", image.display()))?;

    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}
