//! Gateway configuration – reads/writes `~/.rover/config.toml`.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rover_middleware::GracePeriods;
use rover_types::GatewayError;
use serde::{Deserialize, Serialize};

/// Post-emit grace periods in milliseconds, one per watch kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraceConfig {
    pub motor: u64,
    pub led_output: u64,
    pub rc: u64,
    pub rc_channels: u64,
    pub telemetry: u64,
    pub system: u64,
}

impl Default for GraceConfig {
    fn default() -> Self {
        let periods = GracePeriods::default();
        let ms = |d: Duration| d.as_millis() as u64;
        Self {
            motor: ms(periods.motor),
            led_output: ms(periods.led_output),
            rc: ms(periods.rc),
            rc_channels: ms(periods.rc_channels),
            telemetry: ms(periods.telemetry),
            system: ms(periods.system),
        }
    }
}

impl GraceConfig {
    pub fn periods(&self) -> GracePeriods {
        GracePeriods {
            motor: Duration::from_millis(self.motor),
            led_output: Duration::from_millis(self.led_output),
            rc: Duration::from_millis(self.rc),
            rc_channels: Duration::from_millis(self.rc_channels),
            telemetry: Duration::from_millis(self.telemetry),
            system: Duration::from_millis(self.system),
        }
    }
}

/// Persisted configuration stored in `~/.rover/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address both servers listen on.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// WebSocket port of the watch gateway.
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    /// HTTP port of the REST surface.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Motors fitted to the simulated robot.
    #[serde(default = "default_motor_count")]
    pub motor_count: usize,

    /// Tick period of the simulation thread.
    #[serde(default = "default_sim_period_ms")]
    pub sim_period_ms: u64,

    #[serde(default)]
    pub grace: GraceConfig,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_ws_port() -> u16 {
    9090
}
fn default_http_port() -> u16 {
    8080
}
fn default_motor_count() -> usize {
    4
}
fn default_sim_period_ms() -> u64 {
    50
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            ws_port: default_ws_port(),
            http_port: default_http_port(),
            motor_count: default_motor_count(),
            sim_period_ms: default_sim_period_ms(),
            grace: GraceConfig::default(),
        }
    }
}

impl Config {
    pub fn ws_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.ws_port)
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.http_port)
    }

    pub fn sim_period(&self) -> Duration {
        Duration::from_millis(self.sim_period_ms)
    }
}

/// Return the path to `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, GatewayError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, GatewayError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        GatewayError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| GatewayError::Config(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.  Values that do
/// not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_BIND_ADDRESS` | `bind_address` |
/// | `ROVER_WS_PORT` | `ws_port` |
/// | `ROVER_HTTP_PORT` | `http_port` |
/// | `ROVER_MOTOR_COUNT` | `motor_count` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROVER_BIND_ADDRESS")
        && let Ok(addr) = v.parse::<IpAddr>()
    {
        cfg.bind_address = addr;
    }
    if let Ok(v) = std::env::var("ROVER_WS_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.ws_port = port;
    }
    if let Ok(v) = std::env::var("ROVER_HTTP_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.http_port = port;
    }
    if let Ok(v) = std::env::var("ROVER_MOTOR_COUNT")
        && let Ok(count) = v.parse::<usize>()
    {
        cfg.motor_count = count;
    }
}

/// Save the config to disk, creating `~/.rover/` if necessary.
pub fn save(cfg: &Config) -> Result<(), GatewayError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), GatewayError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            GatewayError::Config(format!("failed to create config directory: {e}"))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                GatewayError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| GatewayError::Config(format!("failed to serialise config: {e}")))?;
    let write_err =
        |e: std::io::Error| GatewayError::Config(format!("failed to write config at {}: {e}", path.display()));
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
