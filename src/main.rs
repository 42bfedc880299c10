mod cli;
mod clients;
mod config;
mod db;
mod gate;
mod hdfs;
mod json_mapping;
mod logging;
mod naming;
mod runner;
mod runtime;
mod steps;

use std::sync::Arc;

use anyhow::Result;
use dotenvy::dotenv;
use tracing::{error, info};

use crate::cli::Cli;
use crate::config::ExpatConfig;
use crate::runtime::RuntimeContext;
use crate::steps::{StepContext, StepError};

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse_or_exit();
    if let Err(e) = logging::init_logging(cli.log_level.as_deref()) {
        eprintln!("failed to initialize logging: {e:#}");
    }

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<StepError>() {
            Some(step_err) => error!(step = step_err.step(), "{e:#}"),
            None => error!("{e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = ExpatConfig::load(cli.config.as_deref(), cli.dry_run)?;
    info!(
        action = ?cli.action,
        version = %cli.target_version,
        dry_run = cfg.dry_run,
        "expat starting"
    );
    let runtime = Arc::new(RuntimeContext::new(&cfg.executor));
    let ctx = StepContext::new(Arc::new(cfg), runtime.clone());

    let result = runner::run(&ctx, cli.action, &cli.target_version).await;
    runtime.shutdown().await;
    result
}
