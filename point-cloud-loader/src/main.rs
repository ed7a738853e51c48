/// Point cloud loader command-line entry point
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use point_cloud_loader::config::{LoaderConfig, ModuleConfigOverrides, format_memory};
use point_cloud_loader::engine::loading::ReqwestTransport;
use point_cloud_loader::rpc::notifications::NotificationOutbox;
use point_cloud_loader::{
    DecodeOptions, DecodePipelineController, DecodeRequest, LasModuleFactory, MemoryBudgetGuard,
    NativeDecodeBridge, NativeModuleLifecycle, PipelineEvent, PostProcessOptions, StreamIngestor,
};
use tracing::{debug, warn};

const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Decode a LAS/LAZ file or URL and report display statistics.
#[derive(Debug, Parser)]
#[command(name = "point-cloud-loader", version)]
struct Cli {
    /// Local file path or http(s) URL.
    input: String,

    /// Keep every n-th point.
    #[arg(long)]
    decimate: Option<usize>,

    /// Maximum displayed points after decimation.
    #[arg(long)]
    max_points: Option<usize>,

    /// Extract RGB colour.
    #[arg(long)]
    rgb: bool,

    /// JSON config file with memory sizing and defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Memory ledger ceiling in MiB.
    #[arg(long)]
    budget_mb: Option<u64>,

    /// Verbose module and pipeline logging.
    #[arg(long)]
    debug: bool,

    /// Print JSON-RPC notifications and a JSON summary instead of text.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LoaderConfig::from_path(path)
            .map_err(|e| anyhow!("failed to read config {}: {}", path.display(), e))?,
        None => LoaderConfig::default(),
    };
    if let Some(decimate) = cli.decimate {
        config.decimate = decimate;
    }
    if let Some(max_points) = cli.max_points {
        config.max_points = max_points;
    }
    if let Some(budget_mb) = cli.budget_mb {
        config.budget_mb = budget_mb;
    }
    if cli.debug {
        config.debug = Some(true);
    }

    logging::init_logging(config.debug.unwrap_or(false))?;

    let process_config = config
        .module_overrides()
        .over(&ModuleConfigOverrides::from_env());
    let lifecycle = Arc::new(
        NativeModuleLifecycle::new(Arc::new(LasModuleFactory)).with_config(process_config),
    );
    lifecycle.set_error_handler(|message| warn!("{}", message));
    lifecycle.set_debug_handler(|message| debug!("{}", message));

    let budget = MemoryBudgetGuard::with_ceiling_mb(config.budget_mb);
    let bridge = NativeDecodeBridge::new(lifecycle, budget.clone());
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .context("failed to build HTTP client")?;
    let transport = ReqwestTransport::with_client(client);
    let ingestor = StreamIngestor::new(Arc::new(transport));

    let (controller, mut events) = DecodePipelineController::new(ingestor, bridge);
    controller.set_post_process(PostProcessOptions {
        decimate: config.decimate,
        max_points: config.max_points,
    });

    let options = DecodeOptions {
        enable_color: cli.rgb,
    };
    let request = if cli.input.starts_with("http://") || cli.input.starts_with("https://") {
        DecodeRequest::from_url(cli.input.clone(), options)
    } else {
        let bytes = std::fs::read(&cli.input)
            .with_context(|| format!("failed to read {}", cli.input))?;
        DecodeRequest::from_buffer(bytes, options)
    };

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg}")?
            .progress_chars("▉▊▋▌▍▎▏ "),
    );
    pb.set_message("Downloading");
    if cli.json {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let mut outbox = NotificationOutbox::default();
    let token = controller.submit(request)?;

    let stats = loop {
        let Some(event) = events.recv().await else {
            bail!("pipeline stopped before request {} finished", token);
        };
        outbox.push_event(&event);

        match event {
            PipelineEvent::Started { .. } => {}
            PipelineEvent::Progress {
                received, total, ..
            } => {
                pb.set_length(total);
                pb.set_position(received);
            }
            PipelineEvent::Loaded { stats, .. } => {
                pb.finish_and_clear();
                break stats;
            }
            PipelineEvent::Failed { message, code, .. } => {
                pb.abandon();
                print_notifications(&mut outbox, cli.json)?;
                bail!("load failed ({}): {}", code, message);
            }
        }
    };

    print_notifications(&mut outbox, cli.json)?;

    let geometry = controller
        .geometry()
        .ok_or_else(|| anyhow!("geometry missing after load"))?;

    if cli.json {
        let summary = serde_json::json!({
            "stats": stats,
            "bounds": geometry.bounds,
            "normalisation": geometry.normalisation,
        });
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("✓ Loaded {}", cli.input);
        println!("  Decoded points:   {}", stats.decoded_points);
        println!("  Displayed points: {}", stats.displayed_points);
        println!("  Decode time:      {:.1} ms", stats.decode_ms);
        println!("  Colour:           {}", if stats.has_color { "yes" } else { "no" });
        println!(
            "  Bounds:           [{:.1}, {:.1}, {:.1}] → [{:.1}, {:.1}, {:.1}]",
            geometry.bounds.min_x,
            geometry.bounds.min_y,
            geometry.bounds.min_z,
            geometry.bounds.max_x,
            geometry.bounds.max_y,
            geometry.bounds.max_z
        );
        println!("  Scale factor:     {:.6}", geometry.normalisation.scale);
        println!(
            "  Ledger in use:    {} of {}",
            budget.usage(),
            format_memory(budget.ceiling())
        );
    }

    controller.shutdown();
    Ok(())
}

/// Emit queued notifications as JSON lines in `--json` mode.
fn print_notifications(outbox: &mut NotificationOutbox, json: bool) -> Result<()> {
    let notifications = outbox.drain();
    if json {
        for notification in notifications {
            println!("{}", serde_json::to_string(&notification)?);
        }
    }
    Ok(())
}
