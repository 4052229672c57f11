use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::Parser;
use eyre::Result;
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

use eth_history::config::{self, TrackerConfig};
use eth_history::{EtherscanClient, HistoryAggregator, RunOutcome};

#[derive(Parser, Debug)]
#[command(name = "eth-history", version, about = "Export an Ethereum address's transaction history to CSV")]
struct Cli {
    /// Ethereum address to export (0x...)
    address: String,

    /// Explorer API key
    #[arg(long, env = "ETHERSCAN_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Explorer API endpoint
    #[arg(long, env = "ETHERSCAN_API_URL", default_value = config::DEFAULT_API_URL)]
    api_url: String,

    /// Directory for the exported CSV
    #[arg(long, env = "OUTPUT_DIR", default_value = "data/output")]
    output_dir: PathBuf,

    /// Scratch directory for spill batches
    #[arg(long, env = "TEMP_DIR", default_value = "data/temp")]
    temp_dir: PathBuf,

    /// Records requested per explorer page
    #[arg(long, env = "PAGE_SIZE", default_value_t = config::DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Records normalized per spill batch
    #[arg(long, env = "BATCH_SIZE", default_value_t = config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Retries per failed explorer request
    #[arg(long, env = "MAX_RETRIES", default_value_t = config::DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Minimum delay between explorer requests, in milliseconds
    #[arg(long, env = "RATE_LIMIT_DELAY_MS", default_value_t = config::DEFAULT_RATE_LIMIT_DELAY_MS)]
    rate_limit_delay_ms: u64,

    /// Log filter directive, e.g. `debug` or `eth_history=trace`; overrides RUST_LOG
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Also fetch ERC-1155 transfers and split out contract calls and failed transactions
    #[arg(long)]
    all_categories: bool,
}

impl Cli {
    /// `--log-level` wins over `RUST_LOG`; both fall back to `info`.
    fn log_filter(&self) -> EnvFilter {
        self.log_level
            .as_deref()
            .and_then(|level| EnvFilter::try_new(level).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }

    fn tracker_config(&self) -> TrackerConfig {
        let rate_limit_delay = Duration::from_millis(self.rate_limit_delay_ms);
        let config = TrackerConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            page_size: self.page_size,
            batch_size: self.batch_size,
            max_retries: self.max_retries,
            rate_limit_delay,
            retry_backoff: rate_limit_delay * 2,
            output_dir: self.output_dir.clone(),
            temp_dir: self.temp_dir.clone(),
            ..TrackerConfig::default()
        };
        if self.all_categories {
            config.with_all_categories()
        } else {
            config
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.print()?;
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => {
            e.print()?;
            return Ok(ExitCode::from(1));
        }
    };
    Subscriber::builder().with_env_filter(cli.log_filter()).init();

    let config = cli.tracker_config();
    let client = EtherscanClient::new(&config)?;
    let aggregator = HistoryAggregator::new(client, config);

    match aggregator.run(&cli.address).await? {
        RunOutcome::Empty { address } => {
            println!("No transactions found for {address}");
        }
        RunOutcome::Exported { path, rows, .. } => {
            println!("Exported {rows} transactions to {}", path.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}
