//! lbsync.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

/// Default location of the daemon configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/lbsync/lbsync.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LbsyncConfig {
    pub daemon: DaemonConfig,
    pub events: EventsConfig,
    pub backend: BackendConfig,
    pub controller: ControllerConfig,
    pub naming: NamingConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Cadence of the poll/advance cycle, and how long the event source may
    /// stay idle before an out-of-cycle update.
    pub update_interval: String,
    /// Upper bound on every individual backend call.
    pub call_timeout: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            update_interval: "5s".to_string(),
            call_timeout: "10s".to_string(),
        }
    }
}

impl DaemonConfig {
    pub fn update_interval(&self) -> Duration {
        parse_duration(&self.update_interval).unwrap_or(Duration::from_secs(5))
    }

    pub fn call_timeout(&self) -> Duration {
        parse_duration(&self.call_timeout).unwrap_or(Duration::from_secs(10))
    }
}

/// Where lifecycle events are read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventsConfig {
    #[default]
    Stdin,
    File {
        path: PathBuf,
    },
}

/// Which backend adapter to load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Synchronous backend that only logs what it is asked to do.
    #[default]
    Dummy,
    /// In-memory asynchronous backend.
    Simulated(SimulatedConfig),
    /// REST job-queue load balancer.
    Lbaas(LbaasConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Dummy => "dummy",
            BackendConfig::Simulated(_) => "simulated",
            BackendConfig::Lbaas(_) => "lbaas",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Number of status polls a job stays pending before it completes.
    pub completes_after: u32,
    /// Jobs whose operands contain any of these substrings report failure.
    pub fail_matching: Vec<String>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            completes_after: 1,
            fail_matching: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LbaasConfig {
    pub host: String,
    /// Keystone host; falls back to `host`.
    pub keystone_host: Option<String>,
    pub username: String,
    pub password: String,
    pub tenant: String,
    /// Pool that route rules fall through to when the path does not match.
    pub default_pool: String,
}

impl Default for LbaasConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            keystone_host: None,
            username: "admin".to_string(),
            password: "passwd".to_string(),
            tenant: "lbms".to_string(),
            default_pool: "pool_default".to_string(),
        }
    }
}

impl LbaasConfig {
    pub fn keystone_host(&self) -> &str {
        self.keystone_host.as_deref().unwrap_or(&self.host)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// When set, routes are attached to (and detached from) this virtual
    /// server as separate operations.
    pub virtual_server: Option<String>,
}

/// Name templates. `%a` expands to the application name and `%n` to the
/// namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub pool_name: String,
    pub route_name: String,
    pub monitor_name: Option<String>,
    pub monitor_path: Option<String>,
    pub monitor_up_code: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            pool_name: "pool_ose_%a_%n_80".to_string(),
            route_name: "irule_ose_%a_%n".to_string(),
            monitor_name: None,
            monitor_path: None,
            monitor_up_code: "1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
    /// Append log output to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl LbsyncConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: LbsyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values that would otherwise silently fall back to defaults.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (field, value) in [
            ("daemon.update_interval", &self.daemon.update_interval),
            ("daemon.call_timeout", &self.daemon.call_timeout),
        ] {
            match parse_duration(value) {
                Some(d) if !d.is_zero() => {}
                _ => bail!("{field}: invalid duration `{value}`"),
            }
        }

        if self.naming.pool_name.trim().is_empty() {
            bail!("naming.pool_name must not be empty");
        }
        if self.naming.route_name.trim().is_empty() {
            bail!("naming.route_name must not be empty");
        }

        // A bare level is the common case; anything with `=` or `,` is an
        // EnvFilter directive and is checked when the subscriber is built.
        let level = self.log.level.trim();
        if !level.contains(['=', ',']) && !LOG_LEVELS.contains(&level) {
            bail!("log.level: invalid value `{level}`");
        }

        if let BackendConfig::Lbaas(lbaas) = &self.backend {
            if lbaas.host.trim().is_empty() {
                bail!("backend.host must not be empty");
            }
        }

        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "2m", or a bare number of
/// seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config = LbsyncConfig::from_toml_str("").unwrap();
        assert_eq!(config.daemon.update_interval(), Duration::from_secs(5));
        assert_eq!(config.daemon.call_timeout(), Duration::from_secs(10));
        assert_eq!(config.events, EventsConfig::Stdin);
        assert_eq!(config.backend.kind(), "dummy");
        assert_eq!(config.naming.pool_name, "pool_ose_%a_%n_80");
        assert_eq!(config.log.level, "debug");
        assert!(config.controller.virtual_server.is_none());
    }

    #[test]
    fn parses_full_lbaas_config() {
        let toml_str = r#"
[daemon]
update_interval = "2s"
call_timeout = "500ms"

[events]
kind = "file"
path = "/var/run/lbsync/events"

[backend]
kind = "lbaas"
host = "lb.example.com"
username = "ose"
tenant = "routing"

[controller]
virtual_server = "ose-vlan"

[naming]
monitor_name = "monitor_%a_%n"
monitor_path = "/%a/health"

[log]
level = "info"
format = "json"
"#;
        let config = LbsyncConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.daemon.update_interval(), Duration::from_secs(2));
        assert_eq!(config.daemon.call_timeout(), Duration::from_millis(500));
        assert_eq!(
            config.events,
            EventsConfig::File {
                path: PathBuf::from("/var/run/lbsync/events")
            }
        );
        match &config.backend {
            BackendConfig::Lbaas(lbaas) => {
                assert_eq!(lbaas.host, "lb.example.com");
                assert_eq!(lbaas.keystone_host(), "lb.example.com");
                assert_eq!(lbaas.username, "ose");
                assert_eq!(lbaas.password, "passwd");
                assert_eq!(lbaas.tenant, "routing");
            }
            other => panic!("unexpected backend {other:?}"),
        }
        assert_eq!(config.controller.virtual_server.as_deref(), Some("ose-vlan"));
        assert_eq!(config.naming.monitor_name.as_deref(), Some("monitor_%a_%n"));
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn parses_simulated_backend() {
        let toml_str = r#"
[backend]
kind = "simulated"
completes_after = 3
fail_matching = ["broken"]
"#;
        let config = LbsyncConfig::from_toml_str(toml_str).unwrap();
        match config.backend {
            BackendConfig::Simulated(sim) => {
                assert_eq!(sim.completes_after, 3);
                assert_eq!(sim.fail_matching, vec!["broken".to_string()]);
            }
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_backend_kind() {
        let err = LbsyncConfig::from_toml_str("[backend]\nkind = \"f5\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn rejects_bad_interval() {
        let err = LbsyncConfig::from_toml_str("[daemon]\nupdate_interval = \"soon\"\n");
        assert!(err.unwrap_err().to_string().contains("update_interval"));

        let err = LbsyncConfig::from_toml_str("[daemon]\ncall_timeout = \"0s\"\n");
        assert!(err.unwrap_err().to_string().contains("call_timeout"));
    }

    #[test]
    fn rejects_bad_log_level() {
        let err = LbsyncConfig::from_toml_str("[log]\nlevel = \"chatty\"\n");
        assert!(err.is_err());

        let ok = LbsyncConfig::from_toml_str("[log]\nlevel = \"info,lbsync_scheduler=trace\"\n");
        assert!(ok.is_ok());
    }

    #[test]
    fn rejects_empty_pool_template() {
        let err = LbsyncConfig::from_toml_str("[naming]\npool_name = \"\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = LbsyncConfig::default();
        config.backend = BackendConfig::Lbaas(LbaasConfig::default());
        config.controller.virtual_server = Some("vs".into());
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("kind = \"lbaas\""));
        let back = LbsyncConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.backend.kind(), "lbaas");
        assert_eq!(back.controller.virtual_server.as_deref(), Some("vs"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[daemon]\nupdate_interval = \"1s\"").unwrap();
        let config = LbsyncConfig::from_file(file.path()).unwrap();
        assert_eq!(config.daemon.update_interval(), Duration::from_secs(1));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = LbsyncConfig::from_file(Path::new("/nonexistent/lbsync.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/lbsync.toml"));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("fast"), None);
    }

    #[test]
    fn oversized_minutes_are_rejected() {
        assert_eq!(parse_duration("400000000000000000m"), None);

        let err = LbsyncConfig::from_toml_str(
            r#"
[daemon]
update_interval = "400000000000000000m"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("daemon.update_interval"));
    }
}
