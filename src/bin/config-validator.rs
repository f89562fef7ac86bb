//! # Scheduler Configuration Validator
//!
//! Command-line tool for validating scheduler configuration files across
//! environments before a scheduler is started with them.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tasker_scheduler::config::{ConfigManager, SchedulerConfig};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate scheduler configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format for `show` (table, json)
    #[arg(long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate every configuration section
    All,

    /// Validate one section
    Component {
        /// Section name (execution, risk, backoff, persistence)
        name: String,
    },

    /// List environments that have an override file
    Environments,

    /// Print the merged configuration
    Show,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all_config(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Environments) => list_environments(&cli),
        Some(Commands::Show) => show_config(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<SchedulerConfig, Box<dyn std::error::Error>> {
    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)?;
    Ok(manager.config().clone())
}

fn config_dir(cli: &Cli) -> PathBuf {
    cli.config_dir.clone().unwrap_or_else(|| PathBuf::from("config"))
}

fn validate_all_config(cli: &Cli) -> CliResult {
    println!("🔧 Validating Scheduler Configuration");
    println!("Environment: {}", cli.environment);
    println!("Config Directory: {}", config_dir(cli).display());
    println!();

    let config = match load(cli) {
        Ok(config) => {
            println!("✅ Configuration loaded and validated");
            config
        }
        Err(e) => {
            println!("❌ Failed to load configuration: {}", e);
            println!("   This is the same error a scheduler would fail to build with");
            return Err(e);
        }
    };

    describe_execution(&config);
    describe_risk(&config);
    describe_backoff(&config);
    describe_persistence(&config)?;

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn validate_component(cli: &Cli, component_name: &str) -> CliResult {
    println!("🔧 Validating Component: {}", component_name);

    let config = load(cli)?;
    match component_name.to_lowercase().as_str() {
        "execution" => describe_execution(&config),
        "risk" | "risk_gate" | "risk-gate" => describe_risk(&config),
        "backoff" | "retry" => describe_backoff(&config),
        "persistence" => describe_persistence(&config)?,
        _ => return Err(format!("Unknown component: {}", component_name).into()),
    }

    println!("✅ Component '{}' validation passed!", component_name);
    Ok(())
}

fn list_environments(cli: &Cli) -> CliResult {
    let dir = config_dir(cli);
    println!("📋 Environments in {}:", dir.display());

    if !dir.exists() {
        println!("❌ Configuration directory not found: {}", dir.display());
        return Ok(());
    }

    let mut environments: Vec<String> = std::fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| environment_of(&entry.path()))
        .collect();
    environments.sort();

    if environments.is_empty() {
        println!("  (base configuration only)");
    }
    for env in environments {
        println!("  • {}", env);
    }
    Ok(())
}

/// `scheduler.production.yaml` -> `production`
fn environment_of(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let env = name.strip_prefix("scheduler.")?.strip_suffix(".yaml")?;
    (!env.is_empty()).then(|| env.to_string())
}

fn show_config(cli: &Cli) -> CliResult {
    let config = load(cli)?;

    match cli.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        "table" => {
            let value = serde_json::to_value(&config)?;
            if let Some(sections) = value.as_object() {
                for (section, fields) in sections {
                    println!("[{}]", section);
                    if let Some(fields) = fields.as_object() {
                        for (key, field) in fields {
                            println!("  {:<28} {}", key, field);
                        }
                    }
                }
            }
        }
        other => return Err(format!("Unsupported format: {}", other).into()),
    }
    Ok(())
}

fn describe_execution(config: &SchedulerConfig) {
    println!("⚙️  Execution");
    println!(
        "   ✅ Max concurrent tasks: {}",
        config.execution.max_concurrent_tasks
    );
    match config.action_timeout() {
        Some(timeout) => println!("   ✅ Action timeout: {:?}", timeout),
        None => println!("   ℹ️  No action timeout (actions run until they return)"),
    }
    println!("   ✅ Shutdown timeout: {:?}", config.shutdown_timeout());
}

fn describe_risk(config: &SchedulerConfig) {
    println!("🛡️  Risk Gate");
    println!(
        "   ✅ Medium risk threshold: {}",
        config.risk.medium_risk_threshold
    );
    println!("   ✅ Approval threshold: {}", config.risk.approval_threshold);
    println!(
        "   ✅ Dry-run high risk tasks: {}",
        config.risk.dry_run_high_risk
    );
}

fn describe_backoff(config: &SchedulerConfig) {
    println!("🔁 Backoff");
    println!("   ✅ Max attempts: {}", config.backoff.max_attempts);

    let mut delays = Vec::new();
    let mut delay = config.backoff.base_delay_ms as f64;
    for _ in 1..config.backoff.max_attempts {
        delays.push(format!("{}ms", delay.min(config.backoff.max_delay_ms as f64) as u64));
        delay *= config.backoff.backoff_multiplier;
    }
    if delays.is_empty() {
        println!("   ℹ️  Failures are final after the first attempt");
    } else {
        println!("   ✅ Retry delays: {}", delays.join(", "));
    }
    if config.backoff.jitter_enabled {
        println!(
            "   ✅ Jitter up to {}%",
            config.backoff.jitter_max_percentage * 100.0
        );
    }
}

fn describe_persistence(config: &SchedulerConfig) -> CliResult {
    println!("💾 Persistence");
    match &config.persistence.execution_log_dir {
        Some(dir) => {
            if dir.exists() && !dir.is_dir() {
                return Err(format!(
                    "execution_log_dir {} exists and is not a directory",
                    dir.display()
                )
                .into());
            }
            println!("   ✅ Execution log directory: {}", dir.display());
        }
        None => println!("   ℹ️  Execution log kept in memory"),
    }
    match (&config.persistence.snapshot_path, config.snapshot_interval()) {
        (Some(path), Some(every)) => {
            println!("   ✅ Snapshots to {} every {:?}", path.display(), every)
        }
        (Some(path), None) => println!("   ✅ On-demand snapshots to {}", path.display()),
        (None, _) => println!("   ℹ️  Snapshots disabled"),
    }
    Ok(())
}
