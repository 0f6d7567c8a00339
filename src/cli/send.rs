use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cdp_adapter::{CdpAdapter, CdpConfig};
use clap::Args;
use injector::{InjectorHost, InjectorPolicy};
use orchestrator::{
    BroadcastReport, BroadcastRequest, DestinationOutcome, Orchestrator, OrchestratorPolicy,
};
use tabcast_core_types::StartCommand;
use tracing::{info, warn};

use super::context::CliContext;
use super::output::{print_structured, OutputFormat};
use crate::bridge::{CdpTabPlatform, HostChannel, InjectorBridge};
use crate::config::AppConfig;

#[derive(Args, Clone, Debug)]
pub struct SendArgs {
    /// Text to type into every destination
    #[arg(short, long, required_unless_present = "command_json")]
    pub text: Option<String>,

    /// Destination alias or URL; repeat for several. Defaults to the
    /// remembered selection.
    #[arg(long = "to", value_name = "ALIAS_OR_URL")]
    pub to: Vec<String>,

    /// A `{"action":"startTyping","text":..,"destinations":[..]}` command
    /// instead of --text/--to; `-` reads it from stdin
    #[arg(long, value_name = "JSON", conflicts_with_all = ["text", "to"])]
    pub command_json: Option<String>,

    /// Chrome/Chromium executable
    #[arg(long, value_name = "PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    /// Attach to a running browser's DevTools websocket instead of launching one
    #[arg(long, value_name = "URL")]
    pub ws_url: Option<String>,

    /// Seconds to keep the browser open after delivery
    #[arg(long, value_name = "SECS")]
    pub keep_open: Option<u64>,

    /// Do not remember the destinations given with --to
    #[arg(long)]
    pub no_save: bool,

    /// Print adapter metrics (Prometheus text format) to stderr when done
    #[arg(long)]
    pub metrics: bool,
}

pub async fn cmd_send(args: SendArgs, ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let (text, requested) = match args.command_json.as_deref() {
        Some(source) => {
            let command = read_start_command(source)?;
            (command.text, command.destinations)
        }
        None => (args.text.clone().unwrap_or_default(), args.to.clone()),
    };

    let store = ctx.selection_store();
    let destinations: Vec<String> = if requested.is_empty() {
        store.load()?
    } else {
        requested
            .iter()
            .map(|raw| ctx.config().resolve_destination(raw))
            .collect()
    };

    // Fail fast before any browser is launched.
    BroadcastRequest::new(text.as_str(), destinations.iter())?;

    if !requested.is_empty() && !args.no_save {
        store.save(&destinations)?;
    }

    let strategies = Arc::new(ctx.strategies()?);
    let adapter = Arc::new(CdpAdapter::new(cdp_config(&args, ctx.config())));
    if adapter.mode().is_stub() {
        bail!("no Chrome/Chromium found; pass --chrome-path, --ws-url or set TABCAST_CHROME");
    }
    Arc::clone(&adapter)
        .start()
        .await
        .context("failed to start the browser")?;

    let host = Arc::new(InjectorHost::new());
    let bridge = InjectorBridge::new(
        adapter.clone(),
        host.clone(),
        strategies,
        InjectorPolicy::default(),
    );
    bridge.start();

    let orchestrator = Orchestrator::new(
        Arc::new(CdpTabPlatform::new(adapter.clone(), &bridge)),
        Arc::new(HostChannel::new(host)),
        OrchestratorPolicy::default(),
    );
    orchestrator.start();

    let outcome = orchestrator.begin_broadcast(&text, &destinations).await;
    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            adapter.shutdown().await;
            return Err(err.into());
        }
    };
    print_report(&report, format)?;

    let keep_open = args.keep_open.unwrap_or(ctx.config().keep_open_secs);
    if report.succeeded() > 0 && keep_open > 0 {
        info!(seconds = keep_open, "keeping the browser open, press Ctrl+C to quit");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(keep_open)) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    orchestrator.shutdown().await;
    bridge.shutdown().await;
    adapter.shutdown().await;

    if args.metrics {
        eprint!("{}", crate::metrics::render());
    }

    if report.succeeded() == 0 {
        bail!("no destination received the text");
    }
    if report.failed() > 0 {
        warn!(failed = report.failed(), "some destinations failed");
    }
    Ok(())
}

fn read_start_command(source: &str) -> Result<StartCommand> {
    if source != "-" {
        return parse_start_command(source);
    }
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("failed to read the command from stdin")?;
    parse_start_command(&raw)
}

fn parse_start_command(raw: &str) -> Result<StartCommand> {
    serde_json::from_str(raw.trim()).context("invalid startTyping command")
}

fn cdp_config(args: &SendArgs, config: &AppConfig) -> CdpConfig {
    let mut cfg = CdpConfig::default();
    if let Some(executable) = args
        .chrome_path
        .clone()
        .or_else(|| config.browser.executable.clone())
    {
        cfg.executable = executable;
    }
    if let Some(dir) = config.browser.user_data_dir.clone() {
        cfg.user_data_dir = dir;
    }
    cfg.headless = args.headless || config.browser.headless.unwrap_or(cfg.headless);
    cfg.websocket_url = args
        .ws_url
        .clone()
        .or_else(|| config.browser.websocket_url.clone());
    cfg
}

fn outcome_label(outcome: &DestinationOutcome) -> String {
    match outcome {
        DestinationOutcome::Succeeded => "delivered".to_string(),
        DestinationOutcome::Failed(kind) => format!("failed ({kind})"),
        DestinationOutcome::Closed => "tab closed".to_string(),
        DestinationOutcome::Aborted => "aborted".to_string(),
    }
}

fn print_report(report: &BroadcastReport, format: OutputFormat) -> Result<()> {
    if print_structured(format, report)? {
        return Ok(());
    }
    println!(
        "{:<44} {:<20} {:<28} {:>8} {:>9}",
        "DESTINATION", "SITE", "OUTCOME", "ATTEMPTS", "ELAPSED"
    );
    for destination in &report.destinations {
        println!(
            "{:<44} {:<20} {:<28} {:>8} {:>8.1}s",
            destination.locator,
            destination.site_key.as_str(),
            outcome_label(&destination.outcome),
            destination.delivery_attempts,
            destination.elapsed_ms as f64 / 1000.0
        );
    }
    println!(
        "{} of {} destinations delivered",
        report.succeeded(),
        report.destinations.len()
    );
    Ok(())
}
