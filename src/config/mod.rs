use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

pub fn default_freq() -> f64 {
    1.0
}

pub fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

pub fn default_port() -> u16 {
    1234
}

pub fn default_max_history_samples() -> usize {
    300
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub receiver: ReceiverConfig,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SenderConfig {
    /// Sample frequency in Hz.
    #[serde(default = "default_freq")]
    pub freq: f64,
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ReceiverConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_history_samples")]
    pub max_history_samples: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            freq: default_freq(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            port: default_port(),
            max_history_samples: default_max_history_samples(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

impl SenderConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.freq.is_finite() || self.freq <= 0.0 {
            bail!("sample frequency must be a positive number of Hz, got {}", self.freq);
        }
        if self.port == 0 {
            bail!("receiver port must be in 1..=65535");
        }
        Ok(())
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            bail!("listen port must be in 1..=65535");
        }
        Ok(())
    }
}
