//! Binary entrypoint for dapp-gas.

use anyhow::Context;
use clap::Parser;
use dapp_gas::collector::{self, BlockOutcome};
use dapp_gas::config::{self, Config, SourceMode};
use dapp_gas::labeler::{self, Labeler};
use dapp_gas::labels::LabelTable;
use dapp_gas::report;
use dapp_gas::rpc::{BlockId, NodeClient};
use dapp_gas::storage;
use std::path::PathBuf;

#[derive(clap::Parser)]
#[command(name = "dapp-gas", about = "Block Gas Attribution for Ethereum")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Label contract addresses from block explorer page titles.
    Label {
        /// File with one address per line.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Address to label (repeatable).
        #[arg(long = "address")]
        addresses: Vec<String>,
    },
    /// Attribute one block's gas to simple transfers and labeled dapps.
    Attribute {
        /// Block number (decimal or 0x hex) or "latest".
        #[arg(long, default_value = "latest")]
        block: String,
        /// Override the configured gas source.
        #[arg(long, value_enum)]
        mode: Option<SourceMode>,
        /// Rows shown in the per-address table.
        #[arg(long, default_value = "20")]
        top: usize,
        /// Save the result to the attribution database.
        #[arg(long)]
        save: bool,
    },
    /// Summarize saved attributions over a block range.
    Report {
        /// Block range (e.g. 19000000..19000100).
        #[arg(long)]
        range: String,
    },
    /// Print the default configuration.
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Command::Config = cli.command {
        print!("{}", config::default_config_toml());
        return Ok(());
    }

    let config_path = cli
        .config
        .or_else(|| std::env::var("DAPP_GAS_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dapp_gas=info".parse()?),
        )
        .init();

    match cli.command {
        Command::Label { input, addresses } => {
            let mut candidates = match input {
                Some(path) => labeler::read_address_list(&path)?,
                None => Vec::new(),
            };
            candidates.extend(addresses);
            if candidates.is_empty() {
                anyhow::bail!("no addresses given (use --input or --address)");
            }
            let mut labeler = Labeler::new(&config.labeler, &config.storage.labels_path)?;
            let (summary, _) = labeler.run(&candidates).await?;
            println!(
                "labeled: {}, unknown: {}, skipped: {}, failed: {}",
                summary.labeled, summary.unknown, summary.skipped, summary.failed
            );
        }
        Command::Attribute {
            block,
            mode,
            top,
            save,
        } => {
            let block_id = BlockId::parse(&block)
                .ok_or_else(|| anyhow::anyhow!("invalid block: {}", block))?;
            let mode = mode.unwrap_or(config.attribution.mode);
            let labels = LabelTable::load(&config.storage.labels_path).with_context(|| {
                format!("failed to load labels: {}", config.storage.labels_path.display())
            })?;
            let client = NodeClient::new(&config.node)?;
            let outcome = collector::run_attribute(&config, &client, &labels, block_id, mode).await?;
            report::print_outcome(&outcome, &labels, top);
            if save {
                if let BlockOutcome::Attributed {
                    attribution, mode, ..
                } = &outcome
                {
                    let mut db = storage::open_db(&config.storage.db_path)?;
                    storage::save_attribution(&mut db, attribution, *mode)?;
                }
            }
        }
        Command::Report { range } => {
            let (low, high) = parse_range(&range)?;
            let db = storage::open_db(&config.storage.db_path)?;
            report::range_summary(&db, low, high)?;
        }
        Command::Config => {}
    }
    Ok(())
}

fn parse_range(s: &str) -> anyhow::Result<(u64, u64)> {
    let s = s.trim();
    let (a, b) = s
        .split_once("..")
        .ok_or_else(|| anyhow::anyhow!("range must be of form START..END"))?;
    let low: u64 = a
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid range start"))?;
    let high: u64 = b
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid range end"))?;
    if low >= high {
        anyhow::bail!("range start must be less than end");
    }
    Ok((low, high))
}
