//! Gateway configuration: clap flags, optionally overlaid by a JSON file.

use clap::Parser;
use sattrain_sim::SimConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Parser, Debug, Clone)]
#[command(name = "sattrain-gateway")]
#[command(about = "REST + WebSocket gateway for the satellite operations simulator")]
pub struct GatewayConfig {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// JSON file with simulator settings (see `SimConfig`)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write a JSONL journal of commands and snapshots to this directory
    #[arg(long)]
    pub journal_dir: Option<PathBuf>,

    /// Journal queue depth before entries are dropped
    #[arg(long, default_value_t = 10_000)]
    pub journal_capacity: usize,

    /// Physics tick interval override (ms)
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Fixed anomaly RNG seed
    #[arg(long)]
    pub seed: Option<u64>,
}

/// File overlay. Every field is optional; flags win over the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    journal_dir: Option<PathBuf>,
    sim: SimConfig,
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the simulator config and apply the file's server settings.
    pub fn resolve(&mut self) -> Result<SimConfig, ConfigError> {
        let mut sim = match self.config.clone() {
            Some(path) => {
                let file = load_file(&path)?;
                if self.host == "127.0.0.1" {
                    if let Some(host) = file.host {
                        self.host = host;
                    }
                }
                if self.port == 8080 {
                    if let Some(port) = file.port {
                        self.port = port;
                    }
                }
                if self.journal_dir.is_none() {
                    self.journal_dir = file.journal_dir;
                }
                file.sim
            }
            None => SimConfig::default(),
        };

        if let Some(tick) = self.tick_ms {
            sim.tick_interval_ms = tick;
        }
        if self.seed.is_some() {
            sim.rng_seed = self.seed;
        }
        Ok(sim)
    }
}

fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let mut config =
            GatewayConfig::parse_from(["sattrain-gateway", "--port", "9000", "--tick-ms", "250", "--seed", "3"]);
        let sim = config.resolve().unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(sim.tick_interval_ms, 250);
        assert_eq!(sim.rng_seed, Some(3));
        assert_eq!(sim.mailbox_capacity, SimConfig::default().mailbox_capacity);
    }

    #[test]
    fn test_file_overlay() {
        let path = std::env::temp_dir().join(format!("sattrain-gateway-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"port": 7000, "sim": {"telemetry_interval_ms": 500, "room_capacity": 32}}"#,
        )
        .unwrap();

        let mut config =
            GatewayConfig::parse_from(["sattrain-gateway", "--config", path.to_str().unwrap()]);
        let sim = config.resolve().unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(sim.telemetry_interval_ms, 500);
        assert_eq!(sim.room_capacity, 32);
        assert_eq!(sim.tick_interval_ms, 1_000);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let mut config = GatewayConfig::parse_from(["sattrain-gateway", "--config", "/nonexistent/sattrain.json"]);
        assert!(matches!(config.resolve(), Err(ConfigError::Read { .. })));
    }
}
