// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, ErrorKind};

#[derive(Debug, Deserialize, Clone, Copy)]
pub enum LogLevel {
    #[serde(alias = "off")]
    Off,
    #[serde(alias = "error")]
    Error,
    #[serde(alias = "warn")]
    Warn,
    #[serde(alias = "info")]
    Info,
    #[serde(alias = "debug")]
    Debug,
    #[serde(alias = "trace")]
    Trace,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    #[serde(default = "Log::default_console_log")]
    console_log: bool,

    #[serde(default = "Log::default_log_level")]
    log_level: LogLevel,

    #[serde(default = "Log::default_log_file")]
    log_file: Option<String>,
}

impl Log {
    pub const fn default_console_log() -> bool {
        true
    }

    pub const fn default_log_level() -> LogLevel {
        LogLevel::Info
    }

    pub const fn default_log_file() -> Option<String> {
        None
    }

    pub const fn console_log(&self) -> bool {
        self.console_log
    }

    pub const fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn log_file(&self) -> Option<&String> {
        self.log_file.as_ref()
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            console_log: Self::default_console_log(),
            log_level: Self::default_log_level(),
            log_file: Self::default_log_file(),
        }
    }
}

/// Listener bind settings. Only a single plain-TCP listener is
/// modeled -- TLS and websocket listeners are out of scope.
#[derive(Debug, Deserialize, Clone)]
pub struct Listener {
    #[serde(default = "Listener::default_bind_address")]
    bind_address: String,

    #[serde(default = "Listener::default_bind_port")]
    bind_port: u16,

    /// Bytes read from the socket at a time before they're handed to
    /// the connection's persistent input buffer.
    #[serde(default = "Listener::default_read_chunk_size")]
    read_chunk_size: usize,
}

impl Listener {
    pub const fn default_bind_address() -> String {
        String::new()
    }

    pub const fn default_bind_port() -> u16 {
        1883
    }

    pub const fn default_read_chunk_size() -> usize {
        1024
    }

    pub fn bind_address(&self) -> &str {
        if self.bind_address.is_empty() {
            "0.0.0.0"
        } else {
            &self.bind_address
        }
    }

    pub const fn bind_port(&self) -> u16 {
        self.bind_port
    }

    pub const fn read_chunk_size(&self) -> usize {
        self.read_chunk_size
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            bind_address: Self::default_bind_address(),
            bind_port: Self::default_bind_port(),
            read_chunk_size: Self::default_read_chunk_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    listener: Listener,

    #[serde(default)]
    log: Log,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(path).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("Failed to read config file {}: {err}", path.display()),
            )
        })?;
        toml::from_str(&content).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("Failed to parse config file {}: {err}", path.display()),
            )
        })
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    /// Overrides the listener port, used by the CLI's `--port` flag.
    pub fn with_port(mut self, port: u16) -> Self {
        self.listener.bind_port = port;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_to_the_standard_mqtt_port() {
        let config = Config::default();
        assert_eq!(config.listener().bind_address(), "0.0.0.0");
        assert_eq!(config.listener().bind_port(), 1883);
    }

    #[test]
    fn parses_a_minimal_toml_document() {
        let toml = r#"
            [listener]
            bind_port = 18830
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.listener().bind_port(), 18830);
        assert_eq!(config.listener().bind_address(), "0.0.0.0");
    }
}
