//! strata binary
//!
//! Executes a block fixture through the parallel transition and prints the
//! receipts, the partition and the resulting state root.

mod cli;
mod config;
mod fixture;
mod report;

use anyhow::{bail, ensure, Result};
use cli::{Cli, Command, LogFormat};
use config::EngineConfig;
use fixture::BlockFixture;
use std::path::Path;
use strata_scheduler::ParallelExecutor;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(&cli.log_level, cli.log_format);

    let config = EngineConfig::load(cli.config.as_deref())?;
    match &cli.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::Run {
            fixture,
            sequential,
            verify,
        } => run(&config, fixture, *sequential, *verify, cli.json),
    }
}

/// RUST_LOG wins over --log-level. Logs go to stderr.
fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

fn run(config: &EngineConfig, path: &Path, sequential: bool, verify: bool, json: bool) -> Result<()> {
    let fixture = BlockFixture::load(path)?;
    let pre = fixture.pre_state()?;
    tracing::info!(
        accounts = pre.account_count(),
        transactions = fixture.transactions.len(),
        block = fixture.env.number,
        "Loaded fixture {}",
        path.display()
    );

    let executor = ParallelExecutor::new(config.chain.clone(), config.scheduler.clone())?
        .with_pools(config.pools.clone())
        .with_options(config.options);

    let result = if sequential {
        executor.execute_sequential(&pre, &fixture.env, &fixture.transactions)?
    } else {
        executor.execute_block(&pre, &fixture.env, &fixture.transactions)?
    };

    if verify {
        let reference = executor.execute_sequential(&pre, &fixture.env, &fixture.transactions)?;
        if let Some(index) = result
            .receipts
            .iter()
            .zip(&reference.receipts)
            .position(|(a, b)| a != b)
        {
            bail!("parallel and sequential receipts differ at transaction {}", index);
        }
        ensure!(
            result.state_root == reference.state_root,
            "parallel root {} differs from sequential root {}",
            result.state_root.to_hex(),
            reference.state_root.to_hex()
        );
        tracing::info!("Parallel result matches sequential execution");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report::to_json(&result))?);
    } else {
        println!("{}", report::to_text(&result));
    }

    if let Some(expected) = fixture.expected_state_root {
        ensure!(
            expected == result.state_root,
            "state root mismatch: expected {}, got {}",
            expected.to_hex(),
            result.state_root.to_hex()
        );
    }
    Ok(())
}
