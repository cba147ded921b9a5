//! Session configuration for tn3270r
//!
//! One [`SessionConfig`] describes one host session: where to connect, how
//! to secure the link, what terminal to claim and which LUs to ask for. It
//! is stored as JSON; missing fields take their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::lib3270::bind::GeometryLimits;
use crate::lib3270::tn3270e::CandidateLus;

/// Default telnet port
pub const DEFAULT_PORT: u16 = 23;

/// Conventional port for TLS-from-start TN3270
pub const DEFAULT_TLS_PORT: u16 = 992;

/// Screen size of a 3278/3279 model: (rows, cols)
pub fn model_geometry(model: u8) -> Option<(u16, u16)> {
    match model {
        2 => Some((24, 80)),
        3 => Some((32, 80)),
        4 => Some((43, 80)),
        5 => Some((27, 132)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// TLS from the first byte. Unset means "only on port 992".
    pub tls: Option<bool>,
    pub tls_verify: bool,
    /// PEM bundle of extra trusted CAs
    pub tls_ca_bundle: Option<PathBuf>,
    /// Accept a host's offer to negotiate START-TLS
    pub starttls: bool,
    pub terminal_model: u8,
    /// Advertise TN3270E support with the `-E` terminal type suffix
    pub extended: bool,
    /// Replaces the terminal type derived from model and `extended`
    pub terminal_type: Option<String>,
    /// Comma-separated LU names, tried in order
    pub lu_names: Option<String>,
    pub tn3270e: bool,
    /// Hosts that get plain TN3270 even when TN3270E is enabled
    pub tn3270e_disabled_hosts: Vec<String>,
    /// Answer DO TIMING-MARK (BSD telnetd compatibility)
    pub bsd_tm: bool,
    /// Reported as the NEW-ENVIRON USER variable
    pub user: Option<String>,
    pub connect_timeout_secs: u64,
    pub min_rows: u16,
    pub min_cols: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            tls: None,
            tls_verify: true,
            tls_ca_bundle: None,
            starttls: true,
            terminal_model: 4,
            extended: true,
            terminal_type: None,
            lu_names: None,
            tn3270e: true,
            tn3270e_disabled_hosts: Vec::new(),
            bsd_tm: false,
            user: None,
            connect_timeout_secs: 10,
            min_rows: 24,
            min_cols: 80,
        }
    }
}

impl SessionConfig {
    /// Parse `[L:]host[:port]`. The `L:` prefix asks for TLS from the start.
    pub fn from_target(target: &str) -> Result<Self, ConfigError> {
        let mut config = SessionConfig::default();
        let target = target.trim();
        let rest = match target.strip_prefix("L:").or_else(|| target.strip_prefix("l:")) {
            Some(rest) => {
                config.tls = Some(true);
                rest
            }
            None => target,
        };

        let (host, port) = split_host_port(rest)?;
        config.host = host.to_string();
        if let Some(port) = port {
            config.port = port;
        } else if config.tls == Some(true) {
            config.port = DEFAULT_TLS_PORT;
        }
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.display().to_string(),
            source,
        })?;
        let config: SessionConfig = serde_json::from_str(&text)?;
        debug!("Loaded session configuration from {}", path.display());
        Ok(config)
    }

    /// Write the configuration, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let file_error = |source| ConfigError::File {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(file_error)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(file_error)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(invalid("host", &self.host, "host name is empty"));
        }
        if self.port == 0 {
            return Err(invalid("port", "0", "port must be non-zero"));
        }
        let (max_rows, max_cols) = model_geometry(self.terminal_model).ok_or_else(|| {
            invalid(
                "terminal_model",
                &self.terminal_model.to_string(),
                "model must be 2, 3, 4 or 5",
            )
        })?;
        if self.min_rows > max_rows || self.min_cols > max_cols {
            return Err(invalid(
                "min_rows/min_cols",
                &format!("{}x{}", self.min_rows, self.min_cols),
                &format!("larger than the model {} screen {max_rows}x{max_cols}", self.terminal_model),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(invalid("connect_timeout_secs", "0", "timeout must be non-zero"));
        }
        Ok(())
    }

    /// Whether the connection starts with a TLS handshake
    pub fn use_tls(&self) -> bool {
        self.tls.unwrap_or(self.port == DEFAULT_TLS_PORT)
    }

    /// Terminal type sent in TERMINAL-TYPE, e.g. `IBM-3279-4-E`
    pub fn terminal_type(&self) -> String {
        match &self.terminal_type {
            Some(term_type) => term_type.clone(),
            None => format!(
                "IBM-3279-{}{}",
                self.terminal_model,
                if self.extended { "-E" } else { "" }
            ),
        }
    }

    /// The model's screen size: the largest geometry a BIND may ask for
    pub fn model_size(&self) -> (u16, u16) {
        model_geometry(self.terminal_model).unwrap_or((24, 80))
    }

    pub fn geometry_limits(&self) -> GeometryLimits {
        let (max_rows, max_cols) = self.model_size();
        GeometryLimits {
            min_rows: self.min_rows,
            min_cols: self.min_cols,
            max_rows,
            max_cols,
        }
    }

    pub fn candidate_lus(&self) -> CandidateLus {
        CandidateLus::parse(self.lu_names.as_deref().unwrap_or(""))
    }

    /// TN3270E enabled, and not disabled for this host
    pub fn tn3270e_allowed(&self) -> bool {
        self.tn3270e
            && !self
                .tn3270e_disabled_hosts
                .iter()
                .any(|h| h.eq_ignore_ascii_case(&self.host))
    }
}

fn invalid(parameter: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn split_host_port(target: &str) -> Result<(&str, Option<u16>), ConfigError> {
    let parse_port = |p: &str| {
        p.parse::<u16>()
            .map_err(|_| invalid("port", p, "not a port number"))
    };

    // [v6addr]:port
    if let Some(bracketed) = target.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| invalid("host", target, "unterminated '['"))?;
        return match after.strip_prefix(':') {
            Some(port) => Ok((host, Some(parse_port(port)?))),
            None if after.is_empty() => Ok((host, None)),
            None => Err(invalid("host", target, "unexpected text after ']'")),
        };
    }

    match target.rsplit_once(':') {
        // More than one colon without brackets: a bare IPv6 address
        Some((host, _)) if host.contains(':') => Ok((target, None)),
        Some((host, port)) => Ok((host, Some(parse_port(port)?))),
        None => Ok((target, None)),
    }
}

/// Where the configuration lives when no path is given.
/// Priority:
/// 1) TN3270R_CONFIG env var
/// 2) Platform config dir: <config>/tn3270r/session.json
/// 3) Current directory fallback: ./session.json
pub fn default_config_path() -> PathBuf {
    if let Ok(p) = std::env::var("TN3270R_CONFIG") {
        return PathBuf::from(p);
    }
    match dirs::config_dir() {
        Some(base) => base.join("tn3270r").join("session.json"),
        None => PathBuf::from("session.json"),
    }
}
