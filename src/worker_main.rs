// RustyPS worker binary
//
// Runs the reference logistic-regression trainer over a data file against
// the configured server nodes, then shuts its transport down cleanly.

use std::path::Path;
use std::process;

use tracing::info;

use rusty_ps::{cluster, Config, PsError};

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        eprintln!("usage: {} <config.json> <worker-index> <data-file>", args[0]);
        process::exit(2);
    }

    if let Err(e) = run(&args[1], &args[2], &args[3]) {
        eprintln!("rusty-ps-worker: {}", e);
        process::exit(1);
    }
}

fn run(config_path: &str, index: &str, data_path: &str) -> rusty_ps::Result<()> {
    let config = Config::load(config_path)?;
    let index: usize = index
        .parse()
        .map_err(|_| PsError::Config("worker index must be an unsigned integer".into()))?;

    let worker = cluster::start_worker(&config, index)?;
    worker.trainer().train(Path::new(data_path))?;
    worker.stop()?;
    info!(index, "worker finished");
    Ok(())
}
