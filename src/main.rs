//! Shardis - A Sharding TCP Proxy for the RESP Protocol
//!
//! This is the main entry point for the proxy. It parses the command line,
//! sets up logging, starts the proxy, and waits for a shutdown signal.

use shardis::{Config, Proxy};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Parse configuration from command-line arguments
fn config_from_args() -> Config {
    let mut config = Config::default();
    let args: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-addr" | "--addr" => {
                if i + 1 < args.len() {
                    config.addr = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("Error: -addr requires a value");
                    std::process::exit(1);
                }
            }
            "-cluster-addr" | "--cluster-addr" => {
                if i + 1 < args.len() {
                    config.cluster_addrs = args[i + 1]
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                    i += 2;
                } else {
                    eprintln!("Error: -cluster-addr requires a value");
                    std::process::exit(1);
                }
            }
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("shardis version {}", shardis::VERSION);
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    config
}

fn print_help() {
    println!(
        r#"
Shardis - A Sharding TCP Proxy for the RESP Protocol

USAGE:
    shardis [OPTIONS]

OPTIONS:
    -addr <ADDR>             Address to listen on (default: :6380)
    -cluster-addr <ADDRS>    Comma-separated backend addresses
                             (default: localhost:6379)
    -v, --version            Print version information
        --help               Print this help message

EXAMPLES:
    shardis                                              # proxy for a single local node
    shardis -addr :7000                                  # listen on port 7000
    shardis -cluster-addr host1:6379,host2:6379          # shard across two nodes

CONNECTING:
    Use redis-cli or any Redis client to connect:
    $ redis-cli -p 6380
    127.0.0.1:6380> SET {{user1}}:name "Ariz"
    OK
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config_from_args();

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!(
        addr = %config.addr,
        backends = config.cluster_addrs.len(),
        "shardis v{} starting",
        shardis::VERSION
    );

    let proxy = Arc::new(Proxy::new(config));
    let mut runner = {
        let proxy = Arc::clone(&proxy);
        tokio::spawn(async move { proxy.run().await })
    };

    tokio::select! {
        result = &mut runner => {
            // The proxy stopped on its own; surface the reason.
            result??;
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received, stopping proxy...");
            proxy.shutdown();
            let _ = runner.await;
        }
    }

    info!("shutdown complete");
    Ok(())
}
