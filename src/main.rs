// RustyPS server binary
//
// Hosts one parameter-server node of the configured cluster and serves
// until the process is terminated. Liveness of peers is the orchestrator's
// concern, not this binary's.

use std::process;

use tracing::info;

use rusty_ps::{cluster, Config, PsError};

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("usage: {} <config.json> <server-index>", args[0]);
        process::exit(2);
    }

    if let Err(e) = run(&args[1], &args[2]) {
        eprintln!("rusty-ps-server: {}", e);
        process::exit(1);
    }
}

fn run(config_path: &str, index: &str) -> rusty_ps::Result<()> {
    let config = Config::load(config_path)?;
    let index: usize = index
        .parse()
        .map_err(|_| PsError::Config("server index must be an unsigned integer".into()))?;

    let _server = cluster::start_server(&config, index)?;
    info!(index, "serving; terminate the process to shut down");
    loop {
        std::thread::park();
    }
}
