use std::env;
use std::fs;
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use log::{Level, debug};

use crate::cidr::{Ipv4Cidr, parse_prefix};
use crate::constants::{
    DEFAULT_FALLBACK_IP, DEFAULT_INTERFACE, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SUBNET_PREFIX,
    DEFAULT_TIMEOUT_SECONDS, ENV_SETTINGS_FILE, FILE_SETTINGS, FILE_STATUS, KEY_FALLBACK_CIDR,
    KEY_FALLBACK_IP, KEY_INTERFACE, KEY_LINK_BACKEND, KEY_LOG_LEVEL, KEY_POLL_INTERVAL_MS,
    KEY_STATUS_FILE, KEY_SUBNET, KEY_TIMEOUT,
};
use crate::error::Error;
use crate::logger::parse_level;
use crate::network::Backend;
use crate::supervisor::BringUpPolicy;

/// Everything one run needs, resolved from all sources.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub policy: BringUpPolicy,
    pub backend: Backend,
    pub status_file: Option<PathBuf>,
    pub log_level: Level,
}

impl Config {
    /// Defaults, then the settings file, then the process environment.
    pub fn load() -> Result<Self, Error> {
        let path = env::var(ENV_SETTINGS_FILE).unwrap_or_else(|_| FILE_SETTINGS.to_string());
        let contents = match fs::read_to_string(&path) {
            Ok(s) => Some(s),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Settings file {} not found, skipping", path);
                None
            }
            Err(e) => {
                return Err(Error::config(format!(
                    "unable to read settings file {}: {}",
                    path, e
                )));
            }
        };
        Self::from_sources(contents.as_deref(), env::vars())
    }

    pub fn from_sources<I>(settings_file: Option<&str>, env: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut settings = Settings::defaults();
        if let Some(contents) = settings_file {
            settings.merge(Settings::from_file_contents(contents)?);
        }
        settings.merge(Settings::from_pairs(env)?);
        settings.into_config()
    }
}

/// One layer of configuration. Unset fields fall through to earlier layers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Settings {
    pub interface: Option<String>,
    pub timeout_seconds: Option<i64>,
    pub fallback_ip: Option<Ipv4Addr>,
    pub subnet_prefix: Option<u8>,
    pub fallback_cidr: Option<Ipv4Cidr>,
    pub poll_interval_ms: Option<u64>,
    pub backend: Option<Backend>,
    /// An empty string disables the status record.
    pub status_file: Option<String>,
    pub log_level: Option<Level>,
}

impl Settings {
    pub fn defaults() -> Self {
        Settings {
            interface: Some(DEFAULT_INTERFACE.to_string()),
            timeout_seconds: Some(DEFAULT_TIMEOUT_SECONDS),
            fallback_ip: Some(DEFAULT_FALLBACK_IP),
            subnet_prefix: Some(DEFAULT_SUBNET_PREFIX),
            fallback_cidr: None,
            poll_interval_ms: Some(DEFAULT_POLL_INTERVAL_MS),
            backend: Some(Backend::default()),
            status_file: Some(FILE_STATUS.to_string()),
            log_level: Some(Level::Info),
        }
    }

    /// Parse `KEY=VALUE` lines. Blank lines, `#` comments and lines without
    /// `=` are skipped.
    pub fn from_file_contents(contents: &str) -> Result<Self, Error> {
        Self::from_pairs(parse_env_lines(contents))
    }

    /// Build a layer from key/value pairs, ignoring unknown keys.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Settings::default();
        for (k, v) in pairs {
            let (key, value) = (k.as_ref(), v.as_ref().trim());
            match key {
                KEY_INTERFACE => settings.interface = Some(value.to_string()),
                KEY_TIMEOUT => settings.timeout_seconds = Some(parse_value(key, value)?),
                KEY_FALLBACK_IP => settings.fallback_ip = Some(parse_value(key, value)?),
                KEY_SUBNET => {
                    settings.subnet_prefix = Some(parse_prefix(value).map_err(|e| keyed(key, e))?)
                }
                KEY_FALLBACK_CIDR => {
                    settings.fallback_cidr = Some(value.parse().map_err(|e| keyed(key, e))?)
                }
                KEY_POLL_INTERVAL_MS => settings.poll_interval_ms = Some(parse_value(key, value)?),
                KEY_LINK_BACKEND => {
                    settings.backend = Some(value.parse().map_err(|e| keyed(key, e))?)
                }
                KEY_STATUS_FILE => settings.status_file = Some(value.to_string()),
                KEY_LOG_LEVEL => {
                    settings.log_level = Some(parse_level(value).map_err(|e| keyed(key, e))?)
                }
                _ => {}
            }
        }
        Ok(settings)
    }

    // A combined CIDR wins within its own layer. A later layer that sets
    // only the address or the subnet replaces an earlier combined CIDR.
    fn merge(&mut self, other: Self) {
        if other.interface.is_some() {
            self.interface = other.interface;
        }
        if other.timeout_seconds.is_some() {
            self.timeout_seconds = other.timeout_seconds;
        }
        if other.fallback_ip.is_some() || other.subnet_prefix.is_some() {
            if let Some(cidr) = self.fallback_cidr.take() {
                self.fallback_ip = Some(cidr.address);
                self.subnet_prefix = Some(cidr.prefix_len);
            }
            if other.fallback_ip.is_some() {
                self.fallback_ip = other.fallback_ip;
            }
            if other.subnet_prefix.is_some() {
                self.subnet_prefix = other.subnet_prefix;
            }
        }
        if other.fallback_cidr.is_some() {
            self.fallback_cidr = other.fallback_cidr;
        }
        if other.poll_interval_ms.is_some() {
            self.poll_interval_ms = other.poll_interval_ms;
        }
        if other.backend.is_some() {
            self.backend = other.backend;
        }
        if other.status_file.is_some() {
            self.status_file = other.status_file;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
    }

    pub fn into_config(self) -> Result<Config, Error> {
        let fallback_cidr = match self.fallback_cidr {
            Some(cidr) => cidr,
            None => Ipv4Cidr::new(
                self.fallback_ip.unwrap_or(DEFAULT_FALLBACK_IP),
                self.subnet_prefix.unwrap_or(DEFAULT_SUBNET_PREFIX),
            )?,
        };
        let policy = BringUpPolicy {
            interface: self
                .interface
                .unwrap_or_else(|| DEFAULT_INTERFACE.to_string()),
            timeout_seconds: self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
            fallback_cidr,
            poll_interval: Duration::from_millis(
                self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
        };
        Ok(Config {
            policy,
            backend: self.backend.unwrap_or_default(),
            status_file: self
                .status_file
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            log_level: self.log_level.unwrap_or(Level::Info),
        })
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| Error::config(format!("invalid {} {:?}: {}", key, value, e)))
}

fn keyed(key: &str, e: Error) -> Error {
    match e {
        Error::Config(msg) => Error::config(format!("invalid {}: {}", key, msg)),
        other => other,
    }
}

fn parse_env_lines(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}
