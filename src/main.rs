use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vod_chat_analyzer::api::{AnalysisResult, Backend};
use vod_chat_analyzer::{
    AnalysisParams, AnalyzerClient, Config, HttpBackend, IngestOutcome, Metric, StatusEvent,
    StatusVocabulary, TaskId, WorkerStatusMonitor,
};

#[derive(Parser)]
#[command(name = "vod-analyzer")]
#[command(version, about = "Chat analytics for Twitch VODs via the analytics server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./vod-analyzer.toml or ./config/vod-analyzer.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Analytics server base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Delay between status checks in milliseconds
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Give up after this many status checks
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Status contract spoken by the server (current or legacy)
    #[arg(long, global = true)]
    contract: Option<StatusVocabulary>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a VOD and run analytics on it
    Analyze {
        /// VOD URL
        vod_url: String,

        /// Comma-separated keywords for the activity chart
        #[arg(short, long, default_value = "")]
        keywords: String,

        /// Metric to compute (repeatable; defaults to the configured set)
        #[arg(short, long = "metric")]
        metrics: Vec<Metric>,

        #[arg(long)]
        top_chatters: Option<u32>,

        #[arg(long)]
        top_pastes: Option<u32>,

        #[arg(long)]
        emoticons: Option<u32>,

        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load a VOD without running analytics
    Ingest {
        /// VOD URL
        vod_url: String,
    },
    /// Poll a task until it finishes
    Status {
        task_id: String,

        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show how busy the server's workers are
    Workers {
        /// Keep refreshing at the configured interval
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose {
        "vod_chat_analyzer=debug,info"
    } else {
        "vod_chat_analyzer=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    info!("🚀 VOD chat analyzer starting");
    tracing::debug!("{}", config.summary());

    match cli.command {
        Commands::Analyze {
            vod_url,
            keywords,
            metrics,
            top_chatters,
            top_pastes,
            emoticons,
            json,
        } => {
            let mut params = config.analysis.params().with_keywords(keywords);
            if !metrics.is_empty() {
                params = params.with_metrics(metrics);
            }
            if let Some(n) = top_chatters {
                params.top_chatters_count = n;
            }
            if let Some(n) = top_pastes {
                params.top_pastes_count = n;
            }
            if let Some(n) = emoticons {
                params.emoticons_count = n;
            }
            analyze(&config, &vod_url, params, json).await
        }
        Commands::Ingest { vod_url } => ingest(&config, &vod_url).await,
        Commands::Status { task_id, json } => status(&config, TaskId::new(task_id), json).await,
        Commands::Workers { watch } => workers(&config, watch).await,
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env();
            config
        }
        None => Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {:#}", e);
            Config::default()
        }),
    };

    if let Some(base_url) = &cli.base_url {
        config.server.base_url = base_url.clone();
    }
    if let Some(interval) = cli.poll_interval_ms {
        config.polling.interval_ms = interval;
    }
    if let Some(attempts) = cli.max_attempts {
        config.polling.max_attempts = Some(attempts);
    }
    if let Some(contract) = cli.contract {
        config.contract.vocabulary = contract;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Client wired to a printer task that plays the status line
fn client_with_status_line(config: &Config) -> Result<(AnalyzerClient, JoinHandle<()>)> {
    let (tx, mut rx) = mpsc::unbounded_channel::<StatusEvent>();
    let client = AnalyzerClient::from_config(config)?.with_events(tx);

    let printer = tokio::spawn(async move {
        let mut last = String::new();
        while let Some(event) = rx.recv().await {
            let line = event.to_string();
            // Pending checks repeat the same text every interval.
            if line != last {
                eprintln!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), line);
                last = line;
            }
        }
    });

    Ok((client, printer))
}

async fn analyze(config: &Config, vod_url: &str, params: AnalysisParams, json: bool) -> Result<()> {
    let (client, printer) = client_with_status_line(config)?;

    let monitor = config
        .worker_status
        .enabled
        .then(|| WorkerStatusMonitor::spawn(client.backend(), config.worker_status.interval()));

    let outcome = async {
        client.submit_vod(vod_url).await?;
        client.submit_analysis(params).await
    }
    .await;

    if let Some(monitor) = &monitor {
        if let Some(status) = monitor.latest() {
            info!("👷 Workers busy: {}", status);
        }
        monitor.stop();
    }
    drop(client);
    let _ = printer.await;

    let report = outcome.map_err(|e| anyhow::anyhow!(e.user_message()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let view = report.view();
        if view.is_empty() {
            println!("No analytics sections in the result.");
        } else {
            print!("{}", view);
        }
    }
    Ok(())
}

async fn ingest(config: &Config, vod_url: &str) -> Result<()> {
    let (client, printer) = client_with_status_line(config)?;
    let outcome = client.submit_vod(vod_url).await;
    drop(client);
    let _ = printer.await;

    match outcome.map_err(|e| anyhow::anyhow!(e.user_message()))? {
        IngestOutcome::Loaded { task_id, attempts } => {
            println!("Loaded (task {}, {} status checks)", task_id, attempts)
        }
        IngestOutcome::AlreadyAvailable { message } => {
            println!("{}", message.unwrap_or_else(|| "Data already available".to_string()))
        }
    }
    Ok(())
}

async fn status(config: &Config, task_id: TaskId, json: bool) -> Result<()> {
    let (client, printer) = client_with_status_line(config)?;
    let outcome = client.poll_status(&task_id).await;
    drop(client);
    let _ = printer.await;

    let polled = outcome.map_err(|e| anyhow::anyhow!(e.user_message()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&polled.value)?);
        return Ok(());
    }

    let result = AnalysisResult::from_task_payload(&polled.value).unwrap_or_default();
    let view = vod_chat_analyzer::render_result(&result);
    if view.is_empty() {
        println!("Task {} finished after {} checks", task_id, polled.attempts);
    } else {
        print!("{}", view);
    }
    Ok(())
}

async fn workers(config: &Config, watch: bool) -> Result<()> {
    let backend: Arc<dyn Backend> =
        Arc::new(HttpBackend::new(&config.server, config.contract.vocabulary)?);

    if !watch {
        let status = backend.worker_status().await?;
        println!("Active tasks: {}", status);
        return Ok(());
    }

    let interval = if config.worker_status.interval_ms == 0 {
        Duration::from_secs(5)
    } else {
        config.worker_status.interval()
    };
    let monitor = WorkerStatusMonitor::spawn(backend, interval);
    let mut updates = monitor.subscribe();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(status) = updates.borrow_and_update().clone() {
                    let now = chrono::Local::now().format("%H:%M:%S");
                    println!("[{}] Active tasks: {}", now, status);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
