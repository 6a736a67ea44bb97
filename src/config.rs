use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::wake::MacAddr;

/// Global configuration for the gateway. Built once at startup, validated,
/// then shared read-only by every request.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// The single backend this gateway wakes and forwards to
    pub target: TargetConfig,

    /// Wake-on-LAN transmission settings
    #[serde(default)]
    pub wake: WakeConfig,

    /// Probing, forwarding and interstitial settings
    #[serde(default)]
    pub gateway: GatewaySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Listen port (default: 5000)
    #[serde(default = "default_listen_port")]
    pub port: u16,

    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_listen_port(),
            bind: default_bind_address(),
        }
    }
}

/// URL scheme used when addressing the backend
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Https)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(format!("invalid scheme '{}' (expected http or https)", other)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    /// Backend host or IP address
    pub host: String,

    /// Backend port
    pub port: u16,

    /// Backend scheme (default: http)
    #[serde(default)]
    pub scheme: Scheme,

    /// Hardware address the wake packet is addressed to
    #[serde(deserialize_with = "deserialize_mac")]
    pub mac: MacAddr,
}

fn deserialize_mac<'de, D>(deserializer: D) -> Result<MacAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct WakeConfig {
    /// UDP port the magic packet is sent to (default: 9, the discard port)
    #[serde(default = "default_wake_port")]
    pub port: u16,

    /// Broadcast address for the magic packet (default: 255.255.255.255)
    #[serde(default = "default_wake_broadcast")]
    pub broadcast: String,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            port: default_wake_port(),
            broadcast: default_wake_broadcast(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewaySettings {
    /// Seconds before the interstitial page refreshes itself (default: 30)
    #[serde(default = "default_refresh_delay")]
    pub refresh_delay_secs: u64,

    /// Probe timeout in milliseconds (default: 500). Deliberately much
    /// shorter than the forwarding timeouts so an asleep backend fails fast.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Connect timeout for the forwarding path in seconds (default: 10)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Read timeout for the forwarding path in seconds (default: 120,
    /// generous enough for long polls and downloads)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Verify the backend's TLS certificate when the scheme is https
    /// (default: true; disable for self-signed certificates)
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            refresh_delay_secs: default_refresh_delay(),
            probe_timeout_ms: default_probe_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            verify_tls: default_verify_tls(),
        }
    }
}

// Default value functions
fn default_listen_port() -> u16 {
    5000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_wake_port() -> u16 {
    9
}

fn default_wake_broadcast() -> String {
    "255.255.255.255".to_string()
}

fn default_refresh_delay() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    500
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    120
}

fn default_verify_tls() -> bool {
    true
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the configuration from environment variables. Required:
    /// `TARGET_HOST`, `TARGET_PORT`, `TARGET_MAC_ADDRESS`. Everything else
    /// falls back to the documented defaults. Every problem is reported, not
    /// just the first one.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut errors = Vec::new();

        let host = required_var("TARGET_HOST", &mut errors);
        let port = required_parsed_var::<u16>("TARGET_PORT", &mut errors);
        let mac = required_parsed_var::<MacAddr>("TARGET_MAC_ADDRESS", &mut errors);
        let scheme = parsed_var("TARGET_SCHEME", Scheme::Http, &mut errors);

        let wake_port = parsed_var("WAKE_PORT", default_wake_port(), &mut errors);
        let broadcast =
            optional_var("WAKE_BROADCAST_ADDR").unwrap_or_else(default_wake_broadcast);

        let refresh_delay_secs =
            parsed_var("REFRESH_DELAY_SECS", default_refresh_delay(), &mut errors);
        let probe_timeout_ms =
            parsed_var("PROBE_TIMEOUT_MS", default_probe_timeout(), &mut errors);
        let connect_timeout_secs =
            parsed_var("CONNECT_TIMEOUT_SECS", default_connect_timeout(), &mut errors);
        let read_timeout_secs =
            parsed_var("READ_TIMEOUT_SECS", default_read_timeout(), &mut errors);
        let verify_tls = parsed_var("VERIFY_TLS", default_verify_tls(), &mut errors);

        let listen_port = parsed_var("LISTEN_PORT", default_listen_port(), &mut errors);
        let bind = optional_var("BIND_ADDR").unwrap_or_else(default_bind_address);

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        let mac = mac.ok_or_else(|| anyhow::anyhow!("TARGET_MAC_ADDRESS is not set"))?;
        let port = port.ok_or_else(|| anyhow::anyhow!("TARGET_PORT is not set"))?;

        let config = Config {
            server: ServerConfig {
                port: listen_port,
                bind,
            },
            target: TargetConfig {
                host,
                port,
                scheme,
                mac,
            },
            wake: WakeConfig {
                port: wake_port,
                broadcast,
            },
            gateway: GatewaySettings {
                refresh_delay_secs,
                probe_timeout_ms,
                connect_timeout_secs,
                read_timeout_secs,
                verify_tls,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the whole configuration, reporting every error at once.
    /// A failure here is fatal at startup; there is no partial startup.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if self.target.host.is_empty() {
            errors.push("target host must not be empty".to_string());
        }
        if self.target.port == 0 {
            errors.push("target port must be greater than 0".to_string());
        }
        if self.server.port == 0 {
            errors.push("listen port must be greater than 0".to_string());
        }
        if self.gateway.probe_timeout_ms == 0 {
            errors.push("probe timeout must be greater than 0".to_string());
        }
        if self.gateway.refresh_delay_secs == 0 {
            errors.push("refresh delay must be greater than 0".to_string());
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }

    /// Backend authority (`host:port`), used for the probe and the rewritten
    /// Host header.
    pub fn target_authority(&self) -> String {
        format!("{}:{}", self.target.host, self.target.port)
    }

    /// Backend base URL (`scheme://host:port`), no trailing slash.
    pub fn target_base_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.target.scheme, self.target.host, self.target.port
        )
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway.probe_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.read_timeout_secs)
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn required_var(name: &str, errors: &mut Vec<String>) -> String {
    match optional_var(name) {
        Some(v) => v,
        None => {
            errors.push(format!("missing mandatory environment variable {}", name));
            String::new()
        }
    }
}

fn required_parsed_var<T: FromStr>(name: &str, errors: &mut Vec<String>) -> Option<T>
where
    T::Err: fmt::Display,
{
    match optional_var(name) {
        Some(v) => match v.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                errors.push(format!("{} is not valid: {}", name, e));
                None
            }
        },
        None => {
            errors.push(format!("missing mandatory environment variable {}", name));
            None
        }
    }
}

fn parsed_var<T: FromStr>(name: &str, default: T, errors: &mut Vec<String>) -> T
where
    T::Err: fmt::Display,
{
    match optional_var(name) {
        Some(v) => match v.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                errors.push(format!("{} is not valid: {}", name, e));
                default
            }
        },
        None => default,
    }
}
