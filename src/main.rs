use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_checker::{
    config::{Config, EpgMode},
    models::AddressPreference,
    pipeline::{CheckOrchestrator, CheckerOptions},
    services::{
        HttpStreamProber, LogProgressReporter, NetworkCapabilityProbe, ProgressReporter,
        ResultWriter, TerminalProgressReporter,
    },
    sources::{EpgLoader, PlaylistLoader, parse_playlist},
};

#[derive(Parser)]
#[command(name = "iptv-checker")]
#[command(version)]
#[command(about = "Check the liveness of every stream in an M3U playlist")]
#[command(long_about = None)]
struct Cli {
    /// Playlist URL or local file path
    #[arg(default_value = "./iptv.m3u")]
    source: String,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Directory receiving the result playlists (overrides config file)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Number of concurrent probes (overrides config file)
    #[arg(short = 'j', long, value_name = "N")]
    concurrency: Option<usize>,

    /// Per-stream probe timeout, e.g. "5s" (overrides config file)
    #[arg(short, long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// EPG mode: disabled, remote or cache (overrides config file)
    #[arg(long, value_name = "MODE")]
    epg: Option<EpgMode>,

    /// Address family to check first: auto, ipv4 or ipv6 (overrides config file)
    #[arg(long, value_name = "FAMILY")]
    address_preference: Option<AddressPreference>,

    /// Write result playlists in playlist order instead of completion order
    #[arg(long)]
    stable_order: bool,

    /// Log progress periodically instead of refreshing a terminal line
    #[arg(long)]
    no_progress: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(output_dir) = &self.output_dir {
            config.checker.output_dir = output_dir.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.checker.concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout {
            config.probe.timeout = timeout;
        }
        if let Some(mode) = self.epg {
            config.epg.mode = mode;
        }
        if let Some(preference) = self.address_preference {
            config.network.address_preference = preference;
        }
        if self.stable_order {
            config.checker.stable_order = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("iptv_checker={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting IPTV checker v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let preferred_family = NetworkCapabilityProbe::new(config.network.clone())
        .resolve_preference()
        .await;

    let epg_index = match EpgLoader::new(config.epg.clone(), &config.probe.user_agent)?
        .load()
        .await
    {
        Ok(index) => index,
        Err(e) => {
            warn!("EPG data unavailable, continuing without it: {e}");
            None
        }
    };

    let loader = PlaylistLoader::new(
        config.source.clone(),
        &config.probe.user_agent,
        config.probe.accept_invalid_certs,
    )?;
    let playlist = loader.load(&cli.source).await.context(
        "Could not load the playlist; if the URL opens in a browser, download it and pass the local path instead",
    )?;

    let parsed = parse_playlist(&playlist.content);
    info!("Found {} stream URLs", parsed.len());

    let prober = Arc::new(HttpStreamProber::new(&config.probe)?);
    let reporter: Arc<dyn ProgressReporter> = if cli.no_progress {
        Arc::new(LogProgressReporter::new(config.checker.progress_interval))
    } else {
        Arc::new(TerminalProgressReporter::new())
    };

    let cancellation_token = CancellationToken::new();
    let ctrl_c_token = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight probes");
            ctrl_c_token.cancel();
        }
    });

    let options = CheckerOptions::from_config(&config, preferred_family);
    let orchestrator = CheckOrchestrator::new(prober, reporter, options);
    let report = orchestrator.run(parsed.entries, cancellation_token).await;

    let mut summary = report.summary();
    if let Some(index) = &epg_index {
        summary.epg_matches = Some(index.count_matches(report.accumulator.working_channels()));
    }

    let writer = ResultWriter::new(&config.checker.output_dir);
    writer.write_all(&report.documents(), &mut summary).await?;

    println!("{summary}");
    println!();
    println!("Results saved to {}", writer.output_dir().display());
    for file in &summary.files {
        println!("  {file}");
    }

    Ok(())
}
