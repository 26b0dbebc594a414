//! Configuration loading and typed config structures for SmartQueue.
//!
//! The configuration lives in `smartqueue.yaml` next to the binary. This
//! module defines strongly-typed structs that mirror the YAML structure and
//! a loader that reads and validates the file. Every field has a default
//! matching the deployed device, so an empty file is a valid configuration.
//!
//! The loaded [`GateConfig`] is immutable after startup: the controller,
//! dispenser, broadcaster and control loop each receive the section they
//! need at construction.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but its values are unusable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `smartqueue.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GateConfig {
    /// Room and queue limits.
    #[serde(default)]
    pub occupancy: OccupancyConfig,

    /// Dispenser timing and motion.
    #[serde(default)]
    pub dispenser: DispenserConfig,

    /// Distance sensor filtering and cadence.
    #[serde(default)]
    pub proximity: ProximityConfig,

    /// Viewer channel limits and keepalive.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Control loop cadence.
    #[serde(default)]
    pub control: ControlConfig,

    /// Wireless network setup.
    #[serde(default)]
    pub network: NetworkConfig,

    /// HTTP listener.
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GateConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `SMARTQUEUE_PORT` overrides `http.port`
    /// - `SMARTQUEUE_WIFI_PASSWORD` overrides `network.password`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, apply environment overrides
    /// and validate the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to an empty map.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override selected values with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SMARTQUEUE_PORT") {
            match val.parse::<u16>() {
                Ok(port) => self.http.port = port,
                Err(e) => tracing::warn!(value = %val, error = %e, "ignoring SMARTQUEUE_PORT"),
            }
        }
        if let Ok(val) = std::env::var("SMARTQUEUE_WIFI_PASSWORD") {
            self.network.set_password(val);
        }
    }

    /// Check the cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::Invalid {
                reason: reason.to_owned(),
            })
        };

        if self.occupancy.capacity == 0 {
            return invalid("occupancy.capacity must be at least 1");
        }
        if self.dispenser.engage_ms == 0 || self.dispenser.return_ms == 0 {
            return invalid("dispenser.engage_ms and dispenser.return_ms must be non-zero");
        }
        if self.proximity.poll_interval_ms == 0 {
            return invalid("proximity.poll_interval_ms must be non-zero");
        }
        let p = &self.proximity;
        if !(p.min_valid_cm.is_finite() && p.max_valid_cm.is_finite() && p.threshold_cm.is_finite())
        {
            return invalid("proximity distances must be finite");
        }
        if p.min_valid_cm >= p.max_valid_cm {
            return invalid("proximity.min_valid_cm must be below proximity.max_valid_cm");
        }
        if p.threshold_cm < p.min_valid_cm || p.threshold_cm > p.max_valid_cm {
            return invalid("proximity.threshold_cm must lie within the valid sensor range");
        }
        if self.broadcast.max_channels == 0 {
            return invalid("broadcast.max_channels must be at least 1");
        }
        if self.broadcast.keepalive_interval_ms == 0 {
            return invalid("broadcast.keepalive_interval_ms must be non-zero");
        }
        if self.broadcast.channel_buffer == 0 {
            return invalid("broadcast.channel_buffer must be at least 1");
        }
        if self.network.ssid().is_empty() {
            return invalid("network.ssid must not be empty");
        }
        if self.network.password().chars().count() < MIN_WIFI_PASSWORD_LEN {
            return invalid("network.password must be at least 8 characters");
        }
        Ok(())
    }
}

/// WPA2 requires passphrases of at least eight characters.
const MIN_WIFI_PASSWORD_LEN: usize = 8;

/// Room and queue limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OccupancyConfig {
    /// Maximum simultaneous occupants.
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Maximum visitors in the wait queue (0 disables queueing).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: u32,

    /// Whether scanning a card that is already inside checks it out.
    #[serde(default = "default_true")]
    pub rescan_exits: bool,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            queue_capacity: default_queue_capacity(),
            rescan_exits: true,
        }
    }
}

/// What to do with an admission's actuation request while the dispenser
/// is mid-cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Drop the request; the admission still counts.
    #[default]
    Drop,
    /// Remember one pending actuation and start it once the dispenser is
    /// idle again. Further requests while one is pending are dropped.
    QueueOne,
}

/// Dispenser timing and motion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DispenserConfig {
    /// Minimum time between accepted proximity triggers.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// How long the dispenser holds the engaged position.
    #[serde(default = "default_phase_ms")]
    pub engage_ms: u64,

    /// How long the dispenser takes to return home.
    #[serde(default = "default_phase_ms")]
    pub return_ms: u64,

    /// Servo angle at rest, in degrees.
    #[serde(default = "default_home_angle")]
    pub home_angle: u8,

    /// Servo angle while engaged, in degrees.
    #[serde(default = "default_trigger_angle")]
    pub trigger_angle: u8,

    /// Handling of admission actuation while busy.
    #[serde(default)]
    pub busy_policy: BusyPolicy,
}

impl Default for DispenserConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            engage_ms: default_phase_ms(),
            return_ms: default_phase_ms(),
            home_angle: default_home_angle(),
            trigger_angle: default_trigger_angle(),
            busy_policy: BusyPolicy::Drop,
        }
    }
}

/// Distance sensor filtering and cadence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProximityConfig {
    /// How often the sensor is sampled.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// A reading at or below this distance is a crossing.
    #[serde(default = "default_threshold_cm")]
    pub threshold_cm: f64,

    /// Readings below this are glitches.
    #[serde(default = "default_min_valid_cm")]
    pub min_valid_cm: f64,

    /// Readings above this are glitches (no echo).
    #[serde(default = "default_max_valid_cm")]
    pub max_valid_cm: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            threshold_cm: default_threshold_cm(),
            min_valid_cm: default_min_valid_cm(),
            max_valid_cm: default_max_valid_cm(),
        }
    }
}

/// Viewer channel limits and keepalive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BroadcastConfig {
    /// Maximum concurrently connected viewers.
    #[serde(default = "default_max_channels")]
    pub max_channels: u32,

    /// Interval between keepalive pings on each channel.
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,

    /// Records buffered per channel before it counts as stalled.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_channels: default_max_channels(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

/// Control loop cadence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlConfig {
    /// Pause between loop passes.
    #[serde(default = "default_loop_interval_ms")]
    pub loop_interval_ms: u64,

    /// Capacity of the command channel from the transport server.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            loop_interval_ms: default_loop_interval_ms(),
            command_buffer: default_command_buffer(),
        }
    }
}

/// Wireless network setup, chosen once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NetworkConfig {
    /// The device broadcasts its own network.
    AccessPoint {
        /// Network name.
        #[serde(default = "default_ssid")]
        ssid: String,
        /// WPA2 passphrase.
        #[serde(default = "default_wifi_password")]
        password: String,
        /// Radio channel.
        #[serde(default = "default_wifi_channel")]
        channel: u8,
    },
    /// The device joins an existing network.
    Station {
        /// Network to join.
        ssid: String,
        /// WPA2 passphrase.
        password: String,
    },
}

impl NetworkConfig {
    /// The configured network name.
    pub fn ssid(&self) -> &str {
        match self {
            Self::AccessPoint { ssid, .. } | Self::Station { ssid, .. } => ssid,
        }
    }

    /// The configured passphrase.
    pub fn password(&self) -> &str {
        match self {
            Self::AccessPoint { password, .. } | Self::Station { password, .. } => password,
        }
    }

    /// Replace the passphrase, keeping the mode.
    pub fn set_password(&mut self, new_password: String) {
        match self {
            Self::AccessPoint { password, .. } | Self::Station { password, .. } => {
                *password = new_password;
            }
        }
    }

    /// Short mode label for logs.
    pub const fn mode_name(&self) -> &'static str {
        match self {
            Self::AccessPoint { .. } => "access_point",
            Self::Station { .. } => "station",
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::AccessPoint {
            ssid: default_ssid(),
            password: default_wifi_password(),
            channel: default_wifi_channel(),
        }
    }
}

/// HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_capacity() -> u32 {
    3
}

const fn default_queue_capacity() -> u32 {
    10
}

const fn default_cooldown_ms() -> u64 {
    1_200
}

const fn default_phase_ms() -> u64 {
    150
}

const fn default_home_angle() -> u8 {
    90
}

const fn default_trigger_angle() -> u8 {
    48
}

const fn default_poll_interval_ms() -> u64 {
    200
}

const fn default_threshold_cm() -> f64 {
    10.0
}

const fn default_min_valid_cm() -> f64 {
    2.0
}

const fn default_max_valid_cm() -> f64 {
    400.0
}

const fn default_max_channels() -> u32 {
    4
}

const fn default_keepalive_interval_ms() -> u64 {
    15_000
}

const fn default_channel_buffer() -> usize {
    32
}

const fn default_loop_interval_ms() -> u64 {
    10
}

const fn default_command_buffer() -> usize {
    64
}

fn default_ssid() -> String {
    "SmartQueue".to_owned()
}

fn default_wifi_password() -> String {
    "password123".to_owned()
}

const fn default_wifi_channel() -> u8 {
    1
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    80
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_device() {
        let config = GateConfig::default();
        assert_eq!(config.occupancy.capacity, 3);
        assert_eq!(config.occupancy.queue_capacity, 10);
        assert_eq!(config.dispenser.cooldown_ms, 1_200);
        assert_eq!(config.dispenser.engage_ms, 150);
        assert_eq!(config.dispenser.return_ms, 150);
        assert_eq!(config.broadcast.max_channels, 4);
        assert_eq!(config.broadcast.keepalive_interval_ms, 15_000);
        assert_eq!(config.proximity.poll_interval_ms, 200);
        assert_eq!(config.network.mode_name(), "access_point");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
occupancy:
  capacity: 5
  queue_capacity: 2
  rescan_exits: false

dispenser:
  cooldown_ms: 800
  engage_ms: 200
  return_ms: 250
  busy_policy: queue_one

proximity:
  poll_interval_ms: 100
  threshold_cm: 15.5

broadcast:
  max_channels: 8
  keepalive_interval_ms: 5000

network:
  mode: station
  ssid: "Library-Staff"
  password: "correct horse"

http:
  port: 8080

logging:
  level: "debug"
"#;

        let config = GateConfig::parse(yaml).unwrap();
        assert_eq!(config.occupancy.capacity, 5);
        assert_eq!(config.occupancy.queue_capacity, 2);
        assert!(!config.occupancy.rescan_exits);
        assert_eq!(config.dispenser.busy_policy, BusyPolicy::QueueOne);
        assert_eq!(config.dispenser.return_ms, 250);
        assert_eq!(config.broadcast.max_channels, 8);
        assert_eq!(config.network.mode_name(), "station");
        assert_eq!(config.network.ssid(), "Library-Staff");
        assert_eq!(config.logging.level, "debug");
        // Unset fields keep their defaults.
        assert_eq!(config.broadcast.channel_buffer, 32);
        assert_eq!(config.dispenser.home_angle, 90);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = GateConfig::parse("occupancy:\n  capacity: 7\n").unwrap();
        assert_eq!(config.occupancy.capacity, 7);
        assert_eq!(config.occupancy.queue_capacity, 10);
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(GateConfig::parse("").is_ok());
    }

    #[test]
    fn access_point_fields_default() {
        let config = GateConfig::parse("network:\n  mode: access_point\n").unwrap();
        assert_eq!(
            config.network,
            NetworkConfig::AccessPoint {
                ssid: "SmartQueue".to_owned(),
                password: "password123".to_owned(),
                channel: 1,
            }
        );
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result = GateConfig::parse("occupancy:\n  capacity: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn zero_channels_is_rejected() {
        let result = GateConfig::parse("broadcast:\n  max_channels: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn short_password_is_rejected() {
        let yaml = "network:\n  mode: station\n  ssid: x\n  password: short\n";
        assert!(matches!(
            GateConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn threshold_outside_sensor_range_is_rejected() {
        let yaml = "proximity:\n  threshold_cm: 500.0\n";
        assert!(matches!(
            GateConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn unknown_network_mode_fails_to_parse() {
        let result = GateConfig::parse("network:\n  mode: mesh\n");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("smartqueue.yaml");
        if path.exists() {
            let config = GateConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
