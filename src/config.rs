use anyhow::{anyhow, Error, Result};
use figment::{
    providers::{Env, Format, Toml, Yaml},
    Figment,
};
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;

const DEFAULT_CONFIG_PATH: &str = "/etc/greetd/config.toml";
const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_GRACE_SECS: u64 = 5;
const DEFAULT_CLOSE_SECS: u64 = 5;

#[derive(Deserialize, Clone, Debug, Default)]
pub struct Config {
    pub log: Option<String>,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub shutdown: Shutdown,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Server {
    #[serde(default = "addr_default")]
    pub addr: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            addr: addr_default(),
        }
    }
}

fn addr_default() -> String {
    DEFAULT_SERVER_ADDR.to_string()
}

#[derive(Deserialize, Clone, Debug)]
pub struct Shutdown {
    /// bounded time for inflight requests to finish once a drain starts
    #[serde(default = "grace_default")]
    pub grace_secs: u64,
    /// bounded time for the listener to close remaining connections
    #[serde(default = "close_default")]
    pub close_secs: u64,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self {
            grace_secs: grace_default(),
            close_secs: close_default(),
        }
    }
}

fn grace_default() -> u64 {
    DEFAULT_GRACE_SECS
}

fn close_default() -> u64 {
    DEFAULT_CLOSE_SECS
}

impl Config {
    pub fn load(path: Option<PathBuf>) -> Result<Self, Error> {
        let path = path.unwrap_or(PathBuf::from(DEFAULT_CONFIG_PATH));
        let figment = Figment::new();
        let figment = match path.extension().and_then(OsStr::to_str) {
            Some("toml") => figment.merge(Toml::file(path)),
            Some("yaml") => figment.merge(Yaml::file(path)),
            Some(ext) => return Err(anyhow!("unexpected file extension '{}'", ext)),
            None => return Err(anyhow!("failed to parse path")),
        };

        // double-underscore nesting so underscore-named fields stay
        // addressable, e.g. GREETD_SHUTDOWN__GRACE_SECS -> shutdown.grace_secs
        let config: Config = figment
            .join(Env::prefixed("GREETD_").split("__"))
            .extract()?;
        Ok(config)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown.grace_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown.close_secs)
    }

    pub fn log_level(&self) -> LevelFilter {
        match self
            .log
            .to_owned()
            .unwrap_or_else(|| "INFO".to_string())
            .to_uppercase()
            .as_str()
        {
            "TRACE" => LevelFilter::TRACE,
            "DEBUG" => LevelFilter::DEBUG,
            "ERROR" => LevelFilter::ERROR,
            "INFO" => LevelFilter::INFO,
            _ => LevelFilter::INFO,
        }
    }
}
