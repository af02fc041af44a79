//! Surge payment load generator CLI
//!
//! Runs a load session against a remote service, analyzes a result log, or
//! generates funding keys.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use surge_analyzer::{analyze_file, AnalyzeOptions};
use surge_spammer::config::SpammerConfig;
use surge_spammer::keygen::generate_keys_toml;
use surge_spammer::logging::{LogConfig, LogFormat};
use surge_spammer::session::Spammer;
use surge_types::{Amount, KeyPair};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser)]
#[command(name = "surge-spammer")]
#[command(about = "Payment load generator for a remote transactional service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate funding keys
    Keygen {
        /// Number of keys
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },

    /// Fund accounts and run payment load against the endpoint
    Run {
        /// Secret seed (hex) of the funding account
        secret: String,

        /// TOML config file; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Service endpoint
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Maximum payment requests in flight
        #[arg(long)]
        concurrency: Option<usize>,

        /// How long to keep sending (e.g. "30s", "5m")
        #[arg(short, long)]
        timeout: Option<humantime::Duration>,

        /// Timeout of a single HTTP request
        #[arg(long)]
        request_timeout: Option<humantime::Duration>,

        /// How long a payment may wait for confirmation
        #[arg(long)]
        confirm_duration: Option<humantime::Duration>,

        /// Operations per payment
        #[arg(long)]
        operations: Option<usize>,

        /// Amount paid to each target
        #[arg(long)]
        amount: Option<u64>,

        /// Result log path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for target selection
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        logging: LogArgs,
    },

    /// Analyze a result log
    Analyze {
        /// Result log path
        path: PathBuf,

        /// Histogram bin width (e.g. "5s", "500ms")
        #[arg(long, default_value = "5s")]
        bin: humantime::Duration,

        #[command(flatten)]
        logging: LogArgs,
    },
}

#[derive(Args, Debug)]
struct LogArgs {
    /// Log level; RUST_LOG overrides it
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Terminal)]
    log_format: LogFormat,

    /// Also write logs to this file
    #[arg(long)]
    log: Option<PathBuf>,
}

impl LogArgs {
    fn init(self) -> anyhow::Result<Option<WorkerGuard>> {
        let mut config = LogConfig::new(&self.log_level, self.log_format)?;
        if let Some(path) = self.log {
            config = config.with_file(path);
        }
        Ok(config.init()?)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Keygen { count } => {
            // No tracing for keygen, output goes to stdout
            print!("{}", generate_keys_toml(count)?);
        }

        Commands::Analyze { path, bin, logging } => {
            let _guard = logging.init()?;
            let report = analyze_file(&path, &AnalyzeOptions::default().with_bin_width(*bin))
                .with_context(|| format!("Failed to analyze {}", path.display()))?;
            report.print();
        }

        Commands::Run {
            secret,
            config,
            endpoint,
            concurrency,
            timeout,
            request_timeout,
            confirm_duration,
            operations,
            amount,
            output,
            seed,
            logging,
        } => {
            let _guard = logging.init()?;

            let funder = KeyPair::from_seed_hex(&secret).context("Invalid funding secret")?;

            let mut config = match config {
                Some(path) => SpammerConfig::from_toml_file(path)?,
                None => SpammerConfig::default(),
            };
            if let Some(endpoint) = endpoint {
                config = config.with_endpoint(endpoint);
            }
            if let Some(concurrency) = concurrency {
                config = config.with_concurrency(concurrency);
            }
            if let Some(timeout) = timeout {
                config = config.with_timeout(*timeout);
            }
            if let Some(timeout) = request_timeout {
                config = config.with_request_timeout(*timeout);
            }
            if let Some(duration) = confirm_duration {
                config = config.with_confirm_duration(*duration);
            }
            if let Some(operations) = operations {
                config = config.with_operations(operations);
            }
            if let Some(amount) = amount {
                config = config.with_payment_amount(Amount(amount));
            }
            if let Some(output) = output {
                config = config.with_result_output(output);
            }
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }

            let spammer = Spammer::connect(config, funder)?;
            println!(
                "Starting spammer against {} for {}...",
                spammer.config().endpoint,
                humantime::format_duration(spammer.config().timeout)
            );
            let summary = spammer.run().await?;
            summary.print();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_accepts_logging_flags() {
        let cli = Cli::try_parse_from([
            "surge-spammer",
            "analyze",
            "r.log",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "--log",
            "analyze.log",
        ])
        .unwrap();
        let Commands::Analyze { path, logging, .. } = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(path, PathBuf::from("r.log"));
        assert_eq!(logging.log_level, "debug");
        assert_eq!(logging.log_format, LogFormat::Json);
        assert_eq!(logging.log, Some(PathBuf::from("analyze.log")));
    }

    #[test]
    fn test_logging_flags_default_for_run_and_analyze() {
        let cli = Cli::try_parse_from(["surge-spammer", "analyze", "r.log"]).unwrap();
        let Commands::Analyze { logging, .. } = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(logging.log_level, "info");
        assert_eq!(logging.log_format, LogFormat::Terminal);
        assert!(logging.log.is_none());

        let cli = Cli::try_parse_from(["surge-spammer", "run", "00", "--log-level", "warn"]).unwrap();
        let Commands::Run { logging, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(logging.log_level, "warn");
    }
}
