//! # hkv-node
//!
//! Process entry point: reads a config file path from argv[1], starts
//! logging, brings up the HTTP listener, and waits for SIGINT/SIGTERM to
//! drive graceful shutdown (spec.md §6). CLI parsing is intentionally just
//! "read argv[1] as a path" — a `clap` subcommand surface is out of scope
//! per spec.md §1.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hkv_common::NodeConfig;
use hkv_server::{server, NodeState};

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn main() -> ExitCode {
    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("hkv-node: failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    rt.block_on(run())
}

async fn run() -> ExitCode {
    let config_path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: hkv-node <config.toml>");
            return ExitCode::FAILURE;
        }
    };

    let config = match NodeConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("hkv-node: invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.log_format);

    let state = match NodeState::new(&config) {
        Ok(state) => state,
        Err(err) => {
            error!(error = %err, "hkv-node: failed to initialize node state");
            return ExitCode::FAILURE;
        }
    };

    info!(node_id = %state.node_id, address = %state.address, "hkv-node: starting");

    let shutdown = Arc::new(Notify::new());
    let signal_task = tokio::spawn(server::wait_for_shutdown_signal(Arc::clone(&shutdown)));

    let address = state.address.clone();
    let result = server::run(&address, Arc::clone(&state), shutdown).await;

    signal_task.abort();

    match result {
        Ok(()) => {
            info!("hkv-node: clean shutdown");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "hkv-node: server exited with error");
            ExitCode::FAILURE
        }
    }
}
