use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod platform;

use config::RescueNetConfig;
use platform::Platform;
use rescuenet_core::roles::ScriptedSource;
use rescuenet_core::{AclMessage, MessageTransport, Performative, into_content, ontology};
use rescuenet_transport::{AgentAddress, TcpTransport};

const DEMO_SCENARIO: &str = r#"[
  {"id": "D-DEMO-QUAKE", "type": "earthquake", "severity": 4, "location": [34.05, -118.24],
   "affected_population": 5000, "casualties": 120, "damaged_buildings": 300},
  {"id": "D-DEMO-FLOOD", "type": "flood", "severity": 2, "location": [29.76, -95.36],
   "affected_population": 1200, "casualties": 3, "damaged_buildings": 40},
  {"id": "D-DEMO-FIRE", "type": "fire", "severity": 3, "location": [37.77, -122.42],
   "affected_population": 800, "casualties": 15, "damaged_buildings": 25}
]"#;

#[derive(Parser)]
#[command(name = "rescuenet")]
#[command(version)]
#[command(about = "RescueNet - disaster response agent coordination")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config to ~/.rescuenet/config.toml
    Init,

    /// Show the effective configuration
    Config,

    /// Start the TCP router and every agent
    Run {
        /// JSON file with scenario disasters for the sensor to report
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Run a built-in scenario on the in-process transport
    Demo {
        #[arg(long, default_value_t = 20)]
        duration: u64,

        /// Override the configured time scale for simulated work
        #[arg(long, default_value_t = 0.25)]
        time_scale: f64,
    },

    /// Send one message through a running router
    Send {
        /// Receiver agent name (repeat for several)
        #[arg(long = "to", required = true)]
        to: Vec<String>,

        #[arg(short, long)]
        performative: Performative,

        #[arg(long)]
        ontology: Option<String>,

        /// Message content as a JSON object
        #[arg(long, default_value = "{}")]
        content: String,

        /// Sender name stamped on the message
        #[arg(long, default_value = "cli")]
        sender: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Run { scenario, duration } => cmd_run(&cli.config, scenario, duration).await,
        Commands::Demo {
            duration,
            time_scale,
        } => cmd_demo(&cli.config, duration, time_scale).await,
        Commands::Send {
            to,
            performative,
            ontology,
            content,
            sender,
        } => cmd_send(&cli.config, to, performative, ontology, &content, &sender).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, config::DEFAULT_CONFIG).await?;
        info!("Created default config at {}", config_path.display());
    }

    println!("RescueNet initialized at {}", config_dir.display());
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = RescueNetConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

async fn cmd_run(
    config_path: &Option<PathBuf>,
    scenario: Option<PathBuf>,
    duration: Option<u64>,
) -> Result<()> {
    let cfg = RescueNetConfig::load(config_path)?;
    let source = match &scenario {
        Some(path) => ScriptedSource::from_file(path)?,
        None => {
            info!("No scenario given; disasters can be injected with `rescuenet send`");
            ScriptedSource::default()
        }
    };
    info!("Scenario holds {} disasters", source.remaining());

    let platform = Platform::tcp(&cfg, Box::new(source)).await?;

    match duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => info!("Run duration elapsed"),
                _ = signal::ctrl_c() => info!("Received Ctrl+C"),
            }
        }
        None => {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C");
        }
    }

    info!("Shutting down...");
    let summary = platform.shutdown(cfg.runtime.shutdown_deadline()).await;
    summary.print();
    Ok(())
}

async fn cmd_demo(config_path: &Option<PathBuf>, duration: u64, time_scale: f64) -> Result<()> {
    let mut cfg = RescueNetConfig::load(config_path)?;
    cfg.runtime.time_scale = time_scale;
    cfg.units.sensor_interval_secs = cfg.units.sensor_interval_secs.min(2);

    let source = ScriptedSource::from_json(DEMO_SCENARIO)?;
    let platform = Platform::in_process(&cfg, Box::new(source)).await?;

    let mut lab = platform.observer("lab_agent").await?;
    communication_lab(&platform, &mut lab, &cfg).await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration);
    loop {
        let status = platform.status().await;
        if status.closed_disasters >= 3 {
            info!("All demo disasters closed");
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                info!("Demo duration elapsed");
                break;
            }
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
        }
    }

    let summary = platform.shutdown(cfg.runtime.shutdown_deadline()).await;
    summary.print();
    Ok(())
}

/// Request/refuse/inform walk-through against the field teams
async fn communication_lab(
    platform: &Platform,
    lab: &mut mpsc::Receiver<AclMessage>,
    cfg: &RescueNetConfig,
) -> Result<()> {
    println!("\n=== Communication lab ===");
    let requests = [
        ("medic_agent", json!({"action": "evacuate_victim", "victim_id": "V-001"})),
        (
            "searcher_agent",
            json!({
                "action": "search_area",
                "area": [34.05, -118.24],
                "victim": {"victim_id": "V-002", "priority": "high"},
            }),
        ),
    ];

    let mut expected = 0;
    for (receiver, content) in requests {
        let content = into_content(content);
        let request = AclMessage::new(Performative::Request, vec![receiver.to_string()], content)
            .stamped("lab_agent");
        println!("  -> request {} to {}", request.action(), receiver);
        let report = platform.router.route(&request).await?;
        if report.all_delivered() {
            // refuse, or agree followed by inform
            expected += if receiver == "medic_agent" { 1 } else { 2 };
        }
    }

    let wait = Duration::from_secs_f64(3.0 + 2.0 * cfg.runtime.time_scale.max(0.0));
    for _ in 0..expected {
        match tokio::time::timeout(wait, lab.recv()).await {
            Ok(Some(reply)) => println!(
                "  <- {} from {} {}",
                reply.performative,
                reply.sender,
                summarize(&reply.content)
            ),
            _ => {
                warn!("Communication lab timed out waiting for replies");
                break;
            }
        }
    }
    Ok(())
}

fn summarize(content: &rescuenet_core::Content) -> String {
    let mut shown = content.clone();
    shown.remove("request");
    Value::Object(shown).to_string()
}

async fn cmd_send(
    config_path: &Option<PathBuf>,
    to: Vec<String>,
    performative: Performative,
    ontology_name: Option<String>,
    content: &str,
    sender: &str,
) -> Result<()> {
    let cfg = RescueNetConfig::load(config_path)?;
    let content: Value = serde_json::from_str(content).context("--content is not valid JSON")?;

    let message = AclMessage::new(performative, to, into_content(content))
        .with_ontology(ontology_name.unwrap_or_else(|| ontology::DEFAULT.to_string()))
        .stamped(sender);

    let router = AgentAddress::new(cfg.transport.host.clone(), cfg.transport.router_port);
    TcpTransport::new(router.clone())
        .send(message.clone())
        .await
        .with_context(|| format!("Is the router running at {}?", router))?;

    println!(
        "Sent {} to {:?} via {} (conversation {})",
        message.performative, message.receivers, router, message.conversation_id
    );
    Ok(())
}
