//! Model host status.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use distill_models::{Availability, SessionManager};

use crate::config::ConfigLoader;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Wait up to this many seconds for the model to become available
    #[arg(long, value_name = "SECS")]
    pub wait: Option<u64>,
}

pub async fn run(args: StatusArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let host = config.ollama.build_host();
    println!("Host:  {}", host.base_url());
    println!("Model: {}", host.model_name());

    let manager = SessionManager::new(Arc::new(host));

    let Some(secs) = args.wait else {
        let state = manager.availability().await?;
        println!("State: {state}");
        return Ok(());
    };

    let ready = manager
        .wait_until_ready(POLL_INTERVAL, Duration::from_secs(secs), |state| {
            eprintln!("  {state}");
        })
        .await;

    if ready {
        println!("State: {}", Availability::Available);
        Ok(())
    } else {
        bail!("Model not available after {secs}s");
    }
}
