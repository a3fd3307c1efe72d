//! # CLI - SlateKV Interactive Shell
//!
//! A REPL-style command-line interface for the SlateKV storage engine.
//! Reads commands from stdin, executes them against the engine, and prints
//! results to stdout. Works interactively and with piped scripts.
//!
//! ## Commands
//!
//! ```text
//! PUT key value      Insert or update a key-value pair
//! GET key            Look up a key (prints value or "(nil)")
//! DEL key            Delete a key (prints "(not found)" if absent)
//! FLUSH              Force flush memtable to SSTable
//! STATS              Print engine debug info
//! VERIFY             Check every SSTable against its merkle tree
//! EXIT / QUIT        Shut down gracefully
//! ```
//!
//! PUT, GET and DEL pass through a fixed-window rate limiter configured by
//! `token_time` and `token_requests`.
//!
//! ## Configuration
//!
//! ```text
//! SLATEKV_CONFIG     YAML config file        (default: "config.yaml")
//! SLATEKV_DATA_DIR   overrides data_dir from the config file
//! RUST_LOG           log filter for env_logger (default: warn)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! SlateKV started (data_dir=data, levels=[0, 0, 0, 0, 0], memtable=0)
//! > PUT name Alice
//! OK
//! > GET name
//! Alice
//! > EXIT
//! bye
//! ```

mod ratelimit;

use anyhow::Result;
use config::EngineConfig;
use engine::Engine;
use log::{info, warn};
use ratelimit::FixedWindowLimiter;
use std::io::{self, BufRead, Write};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config_path = env_or("SLATEKV_CONFIG", "config.yaml");
    let mut config = EngineConfig::load(&config_path)?;
    if let Ok(dir) = std::env::var("SLATEKV_DATA_DIR") {
        config = config.with_data_dir(dir);
    }
    info!("config from {}: {:?}", config_path, config);

    let mut limiter = FixedWindowLimiter::new(config.token_window(), config.token_requests);
    let mut engine = Engine::open(config)?;

    println!(
        "SlateKV started (data_dir={}, levels={:?}, memtable={})",
        engine.data_dir().display(),
        engine.level_table_counts(),
        engine.memtable_len()
    );
    println!("Commands: PUT key value | GET key | DEL key");
    println!("          FLUSH | STATS | VERIFY | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            let cmd = cmd.to_uppercase();
            if matches!(cmd.as_str(), "PUT" | "GET" | "DEL") && !limiter.allow() {
                warn!("rate limit: refused {}", cmd);
                println!("ERR rate limit exceeded, try again later");
                print!("> ");
                io::stdout().flush().ok();
                continue;
            }

            match cmd.as_str() {
                "PUT" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: PUT key value");
                        } else {
                            match engine.put(k, v.into_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR put failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: PUT key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match engine.get(k) {
                            Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {:#}", e),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        match engine.delete(k) {
                            Ok(true) => println!("OK"),
                            Ok(false) => println!("(not found)"),
                            Err(e) => println!("ERR del failed: {:#}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "FLUSH" => match engine.force_flush() {
                    Ok(()) => println!("OK (levels={:?})", engine.level_table_counts()),
                    Err(e) => println!("ERR flush failed: {:#}", e),
                },
                "STATS" => {
                    println!("{:?}", engine);
                }
                "VERIFY" => match engine.verify_sstables() {
                    Ok(report) => {
                        let corrupt = report.iter().filter(|(_, ok)| !ok).count();
                        for (toc, ok) in &report {
                            println!("{} {}", if *ok { "ok     " } else { "CORRUPT" }, toc.display());
                        }
                        println!("({} tables, {} corrupt)", report.len(), corrupt);
                    }
                    Err(e) => println!("ERR verify failed: {:#}", e),
                },
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
