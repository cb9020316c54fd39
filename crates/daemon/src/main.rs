// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ndmd — the data-agent daemon.
//!
//! Startup: parse the config, take the daemon lock, initialize logging
//! and message routing, bind the control port, then serve connections
//! out of the bounded worker pool.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ndm_daemon::service::{handle_control, ServiceCtx};
use ndm_daemon::{daemon_tables, DaemonConfig};
use ndm_net::{BSock, ConnServer, Family};

fn usage() {
    println!("ndmd {}", env!("CARGO_PKG_VERSION"));
    println!("network data-management backup daemon");
    println!();
    println!("USAGE:");
    println!("    ndmd [-c CONFIG] [-d LEVEL] [-t]");
    println!();
    println!("OPTIONS:");
    println!("    -c CONFIG    configuration file (default /etc/ndm/ndmd.conf)");
    println!("    -d LEVEL     debug level override");
    println!("    -t           parse the configuration, dump it as JSON, exit");
    println!("    -V, --version");
}

struct Args {
    config: PathBuf,
    debug: Option<u32>,
    test_config: bool,
}

fn parse_args() -> Result<Option<Args>, String> {
    let mut args = Args {
        config: ndm_daemon::env::config_path(),
        debug: None,
        test_config: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("ndmd {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "--help" | "-h" | "help" => {
                usage();
                return Ok(None);
            }
            "-c" => {
                args.config = PathBuf::from(
                    it.next().ok_or_else(|| "-c needs a path".to_string())?,
                );
            }
            "-d" => {
                let v = it.next().ok_or_else(|| "-d needs a level".to_string())?;
                args.debug = Some(v.parse().map_err(|_| format!("bad level {}", v))?);
            }
            "-t" => args.test_config = true,
            other => return Err(format!("unknown argument {}", other)),
        }
    }
    Ok(Some(args))
}

fn main() {
    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => return,
        Err(e) => {
            eprintln!("ndmd: {}", e);
            std::process::exit(1);
        }
    };

    if args.test_config {
        match ndm_config::parse_file(&args.config, &daemon_tables()) {
            Ok(config) => match config.dump_json() {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("ndmd: dump failed: {}", e);
                    std::process::exit(1);
                }
            },
            Err(e) => {
                eprintln!("ndmd: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let mut config = match DaemonConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ndmd: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(level) = args.debug {
        config.debug_level = level;
    }

    let lock = match config.acquire_lock() {
        Ok(lock) => lock,
        Err(e) => {
            eprintln!("ndmd: {}", e);
            std::process::exit(1);
        }
    };

    let filter = ndm_daemon::env::log_filter()
        .map(EnvFilter::new)
        .unwrap_or_else(|| {
            if config.debug_level > 0 {
                EnvFilter::new("debug")
            } else {
                EnvFilter::new("info")
            }
        });
    let log_name = format!("{}.log", config.name);
    let appender = tracing_appender::rolling::never(&config.workdir, log_name);
    let (writer, _guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    info!(
        name = %config.name,
        port = config.port,
        config = %args.config.display(),
        "ndmd starting"
    );

    let env = config.build_dispatch_env();
    let tls = match config.build_tls() {
        Ok(tls) => tls,
        Err(e) => {
            eprintln!("ndmd: {}", e);
            std::process::exit(1);
        }
    };
    let port = config.port.to_string();
    let max_connections = config.max_connections;
    let listen: Vec<std::net::SocketAddr> = config
        .listen
        .iter()
        .filter_map(|a| a.parse().ok())
        .collect();
    let ctx = Arc::new(ServiceCtx { config, env, tls });

    let server = if listen.is_empty() {
        ConnServer::bind(None, Family::Unspec, &port)
    } else {
        ConnServer::bind_list(&listen)
    };
    let server = match server {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ndmd: bind: {}", e);
            std::process::exit(1);
        }
    };

    let pool_ctx = Arc::clone(&ctx);
    let pool = ndm_core::WorkQueue::new(max_connections, move |bs: BSock| {
        handle_control(&pool_ctx, bs);
    });

    server.run(&pool);
    let _ = pool.shutdown();
    drop(lock);
}
