//! Fengshui CLI - Main entry point
//!
//! Uploads room photos for analysis, watches 3D model generation jobs, and
//! exports annotation overlays.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fengshui_client::config::API_URL_ENV;
use fengshui_client::overlay_svg::{image_natural_size, render_overlay};
use fengshui_client::providers::{LocalWallet, TokenAuth, AUTH_TOKEN_ENV};
use fengshui_client::{
    load_config, poll_job, ApiClient, ClientState, Config, PollOutcome, PollUpdate,
};
use fengshui_core::{
    score_commentary, AccessDecision, AccessGate, AnalysisResult, BillingProvider, ImageMetrics,
    ImageSize,
};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "fengshui")]
#[command(about = "Feng Shui room analysis client")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "fengshui.toml")]
    config: PathBuf,

    /// Analysis API base URL (overrides config and FENGSHUI_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a room photo for analysis
    Analyze {
        /// Room photo (JPEG, PNG or WebP)
        image: PathBuf,
        /// Do not wait for the 3D model
        #[arg(long)]
        no_watch: bool,
    },
    /// Show a static analysis response without calling the API
    Demo {
        /// Response file (defaults to the bundled demo)
        #[arg(long)]
        response: Option<PathBuf>,
    },
    /// Watch a model generation job until it finishes
    Watch {
        model_id: String,
        /// Download the finished model into the models cache
        #[arg(long)]
        download: bool,
    },
    /// Export the annotation overlay as SVG
    Overlay {
        /// Analysis response JSON
        #[arg(long)]
        analysis: PathBuf,
        /// The analyzed room photo
        #[arg(long)]
        image: PathBuf,
        /// Output SVG path
        #[arg(long)]
        out: PathBuf,
        /// Annotation whose detail card is shown
        #[arg(long)]
        active: Option<usize>,
        /// Displayed width in pixels (defaults to the image width)
        #[arg(long)]
        width: Option<f32>,
    },
    /// Inspect or edit the persisted access flags
    Gate {
        #[command(subcommand)]
        action: GateAction,
    },
}

#[derive(Subcommand, Debug)]
enum GateAction {
    /// Show flags and wallet
    Status,
    /// Turn the paywall on
    Enable,
    /// Turn the paywall off
    Disable,
    /// Forget the free analysis and wallet
    Reset,
    /// Connect the local wallet and add funds
    TopUp { amount: f64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Fengshui v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&args.config)?;
    config.apply_api_overrides(std::env::var(API_URL_ENV).ok(), args.api_url);
    info!(api = %config.api.base_url, "Configuration loaded");

    match args.command {
        Command::Analyze { image, no_watch } => analyze(&config, &image, !no_watch).await,
        Command::Demo { response } => demo(response.as_deref()),
        Command::Watch { model_id, download } => {
            let api = ApiClient::new(&config.api.base_url, config.request_timeout())?;
            watch(&config, &api, &model_id, download).await
        }
        Command::Overlay {
            analysis,
            image,
            out,
            active,
            width,
        } => overlay(&config, &analysis, &image, &out, active, width),
        Command::Gate { action } => gate(&config, action),
    }
}

async fn analyze(config: &Config, image: &Path, watch_model: bool) -> Result<()> {
    let state_path = PathBuf::from(&config.state.path);
    let mut state = ClientState::load_or_create(&state_path, config.gate.paywall_enabled)
        .context("Failed to load client state")?;

    let wallet = LocalWallet::new(state.wallet.clone(), config.gate.payment_url.clone());
    let mut access = AccessGate::new(TokenAuth::from_env(), wallet, config.gate.analysis_cost);

    let decision = access.decide(&state.flags);
    match decision {
        AccessDecision::SignInRequired => bail!(
            "Free analysis used. Set {} and connect a wallet with `fengshui gate top-up`",
            AUTH_TOKEN_ENV
        ),
        AccessDecision::InsufficientBalance { balance, cost } => {
            let link = access.billing().create_payment_link(cost - balance)?;
            bail!(
                "Balance {:.2} is below the analysis cost {:.2}. Top up at {}",
                balance,
                cost,
                link
            );
        }
        AccessDecision::FreeTier | AccessDecision::Paid { .. } => {
            info!(?decision, "Analysis permitted");
        }
    }

    let api = ApiClient::new(&config.api.base_url, config.request_timeout())?;
    let result = api
        .analyze(image)
        .await
        .with_context(|| format!("Analysis of {} failed", image.display()))?;

    let mut flags = state.flags;
    access.commit(decision, &mut flags)?;
    let (_, wallet) = access.into_parts();
    state.update_flags(flags);
    state.wallet = wallet.into_state();
    state
        .save(&state_path)
        .context("Failed to save client state")?;

    print_summary(&result);

    match result.model_id() {
        Some(model_id) if watch_model => watch(config, &api, model_id, false).await,
        Some(model_id) => {
            println!("3D model job: {model_id} (run `fengshui watch {model_id}`)");
            Ok(())
        }
        None => Ok(()),
    }
}

fn demo(response: Option<&Path>) -> Result<()> {
    let content = match response {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => fengshui_client::DEMO_RESPONSE.to_string(),
    };
    let result = AnalysisResult::from_json_str(&content).context("Invalid demo response")?;
    print_summary(&result);
    Ok(())
}

async fn watch(config: &Config, api: &ApiClient, model_id: &str, download: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    println!("Waiting for 3D model {}...", model_id);
    let outcome = poll_job(
        api,
        api.base_url(),
        model_id,
        &config.to_poller_config(),
        &cancel,
        |event| {
            if let PollUpdate::Status(status) = event.update {
                println!("  status: {}", status.label());
            }
        },
    )
    .await;

    match outcome {
        PollOutcome::Completed { filename, url } => {
            println!("Model ready: {}", url);
            if download {
                let path = api
                    .download_model(&filename, Path::new(&config.models.cache_dir))
                    .await
                    .context("Model download failed")?;
                println!("Saved to {}", path.display());
            }
            Ok(())
        }
        PollOutcome::Failed { message } => bail!("Model generation failed: {}", message),
        PollOutcome::Cancelled => {
            println!("Stopped watching {}", model_id);
            Ok(())
        }
    }
}

fn overlay(
    config: &Config,
    analysis: &Path,
    image: &Path,
    out: &Path,
    active: Option<usize>,
    width: Option<f32>,
) -> Result<()> {
    let content = std::fs::read_to_string(analysis)
        .with_context(|| format!("Failed to read {}", analysis.display()))?;
    let result = AnalysisResult::from_json_str(&content)?;

    let mut metrics = ImageMetrics::with_fallback(config.fallback_image_size());
    match image_natural_size(image) {
        Ok(size) => metrics.on_image_loaded(size),
        Err(e) => warn!(image = %image.display(), error = %e, "Using fallback image size"),
    }
    let native = metrics.effective();
    let displayed = match width {
        Some(w) if w > 0.0 => ImageSize::new(w, w * native.height / native.width),
        _ => native,
    };

    let svg = render_overlay(
        &result.tooltips,
        &metrics,
        displayed,
        &image.to_string_lossy(),
        active,
    )?;
    std::fs::write(out, svg).with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "Wrote {} annotations to {} ({}x{})",
        result.tooltips.len(),
        out.display(),
        displayed.width,
        displayed.height
    );
    Ok(())
}

fn gate(config: &Config, action: GateAction) -> Result<()> {
    let path = PathBuf::from(&config.state.path);
    let mut state = ClientState::load_or_create(&path, config.gate.paywall_enabled)?;

    match action {
        GateAction::Status => {
            let paywall = if state.flags.paywall_enabled {
                "on"
            } else {
                "off"
            };
            let free = if state.flags.free_analysis_used {
                "used"
            } else {
                "available"
            };
            let wallet = if state.wallet.connected {
                "connected"
            } else {
                "not connected"
            };
            println!("Paywall:       {}", paywall);
            println!("Free analysis: {}", free);
            if let Some(at) = state.free_analysis_used_at {
                println!("  used at:     {}", at.to_rfc3339());
            }
            println!("Wallet:        {} ({:.2})", wallet, state.wallet.balance);
            println!("Analysis cost: {:.2}", config.gate.analysis_cost);
            return Ok(());
        }
        GateAction::Enable => state.flags.paywall_enabled = true,
        GateAction::Disable => state.flags.paywall_enabled = false,
        GateAction::Reset => state.reset(),
        GateAction::TopUp { amount } => {
            if amount <= 0.0 {
                bail!("Top-up amount must be positive");
            }
            state.wallet.connected = true;
            state.wallet.balance += amount;
        }
    }

    state.save(&path)?;
    info!(path = %path.display(), "Saved client state");
    Ok(())
}

fn print_summary(result: &AnalysisResult) {
    println!("Feng Shui score: {:.0}/10", result.score);
    println!("  {}", score_commentary(result.score));
    if result.is_celebration() {
        println!("  Great energy in this room!");
    }
    println!();
    println!("{}", result.overall_analysis);

    for (title, items) in [
        ("Strengths", &result.strengths),
        ("Weaknesses", &result.weaknesses),
        ("Suggestions", &result.suggestions),
    ] {
        if items.is_empty() {
            continue;
        }
        println!();
        println!("{}:", title);
        for item in items {
            println!("  - {}", item);
        }
    }

    if !result.tooltips.is_empty() {
        println!();
        println!("Annotations:");
        for (i, t) in result.tooltips.iter().enumerate() {
            println!(
                "  [{}] {} {} ({:.0}%): {}",
                i,
                t.kind.icon(),
                t.object_class,
                t.confidence * 100.0,
                t.message
            );
        }
    }
}
