use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use roster::aggregator::MergeStrategy;
use roster::app::{self, AppConfig};
use roster::config::{AggregationConfig, ServiceConfig};
use roster::server::ApiServer;
use roster::RosterError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Fetch, deduplicate and serve user records from concurrent batches
#[derive(Parser)]
#[command(name = "roster", version)]
#[command(about = "Concurrent fan-out/fan-in aggregator for user records", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "ROSTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (default command)
    Serve {
        /// Address to bind
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        #[command(flatten)]
        aggregation: AggregationArgs,
    },
    /// Run one aggregation and print the records as JSON
    Fetch {
        /// Print `{records, report}` instead of the bare record array
        #[arg(long)]
        report: bool,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,

        #[command(flatten)]
        aggregation: AggregationArgs,
    },
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        aggregation: AggregationArgs,
    },
}

/// Aggregation overrides shared by every subcommand
#[derive(Args, Debug, Default, Clone)]
struct AggregationArgs {
    /// Number of producer tasks (one fetch each)
    #[arg(short = 'p', long)]
    producers: Option<usize>,

    /// Records requested per fetch
    #[arg(short = 'b', long)]
    batch_size: Option<usize>,

    /// Number of consumer tasks
    #[arg(long)]
    consumers: Option<usize>,

    /// Hand-off queue capacity
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Overall deadline for one aggregation (e.g. "30s")
    #[arg(long, value_parser = humantime::parse_duration)]
    deadline: Option<Duration>,

    /// How consumers share the result set (shared_lock or per_consumer)
    #[arg(long)]
    merge_strategy: Option<MergeStrategy>,
}

impl AggregationArgs {
    fn apply(&self, config: &mut AggregationConfig) {
        if let Some(producers) = self.producers {
            config.producers = producers;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if self.consumers.is_some() {
            config.consumers = self.consumers;
        }
        if self.queue_capacity.is_some() {
            config.queue_capacity = self.queue_capacity;
        }
        if self.deadline.is_some() {
            config.deadline = self.deadline;
        }
        if let Some(strategy) = self.merge_strategy {
            config.merge_strategy = strategy;
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let app_config = AppConfig::new(cli.verbose).with_config_path(cli.config.clone());

    app::init_logging(&app_config);

    let command = cli.command.unwrap_or(Commands::Serve {
        bind: None,
        port: None,
        aggregation: AggregationArgs::default(),
    });

    if let Err(e) = run(command, &app_config).await {
        app::handle_fatal_error(e, app_config.verbose);
    }
}

async fn run(command: Commands, app_config: &AppConfig) -> Result<()> {
    let mut config = app::load_service_config(app_config)?;

    match command {
        Commands::Serve {
            bind,
            port,
            aggregation,
        } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            aggregation.apply(&mut config.aggregation);
            config.validate()?;
            run_serve(config).await
        }
        Commands::Fetch {
            report,
            pretty,
            aggregation,
        } => {
            aggregation.apply(&mut config.aggregation);
            config.validate()?;
            run_fetch(config, report, pretty).await
        }
        Commands::Config { aggregation } => {
            aggregation.apply(&mut config.aggregation);
            config.validate()?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn run_serve(config: ServiceConfig) -> Result<()> {
    let aggregator = app::build_aggregator(&config)?;
    info!(
        "Serving {} producers x {} records per request",
        config.aggregation.producers, config.aggregation.batch_size
    );
    ApiServer::new(Arc::new(aggregator), config.server.clone())
        .start()
        .await?;
    Ok(())
}

async fn run_fetch(config: ServiceConfig, with_report: bool, pretty: bool) -> Result<()> {
    let aggregator = app::build_aggregator(&config)?;
    let aggregation = aggregator
        .aggregate_with_report(aggregator.default_request())
        .await?;
    debug!("{}", aggregation.report.summary());

    let encoded = match (with_report, pretty) {
        (true, true) => serde_json::to_string_pretty(&aggregation),
        (true, false) => serde_json::to_string(&aggregation),
        (false, true) => serde_json::to_string_pretty(&aggregation.records),
        (false, false) => serde_json::to_string(&aggregation.records),
    }
    .map_err(|e| RosterError::serialization("failed to encode records", e))?;

    println!("{}", encoded);
    Ok(())
}
