use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use flotilla_messages::Endpoint;

/// Default consumable resources advertised when none are configured.
pub const DEFAULT_RESOURCES: &str = "cpus:1;mem:1024";

/// Default interval between retransmissions of an unacknowledged status
/// update.
pub const STATUS_UPDATE_RETRY_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Config {
    /// Total consumable resources, `name:value;...` form.
    pub resources: String,
    /// Attributes of the machine, passed through to the master.
    pub attributes: Option<String>,
    /// Where to place framework work directories.
    pub work_dir: Option<String>,
    /// Installation root; fallback location for work directories.
    pub home: Option<String>,
    /// Where to find Hadoop (for fetching executors from HDFS).
    pub hadoop_home: Option<String>,
    /// Whether to run tasks as the submitting user.
    pub switch_user: bool,
    /// Directory prepended to relative executor paths.
    pub frameworks_home: Option<String>,
    /// Retransmission interval for unacknowledged status updates.
    pub status_update_retry_interval: Duration,
    /// Housekeeping tick period for the agent loop.
    pub tick_interval: Duration,
    /// Port the agent endpoint is reachable on.
    pub port: u16,
    /// Statically configured master, announced at startup when set.
    pub master: Option<Endpoint>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let resources =
            std::env::var("FLOTILLA_RESOURCES").unwrap_or_else(|_| DEFAULT_RESOURCES.to_string());

        let attributes = std::env::var("FLOTILLA_ATTRIBUTES").ok();
        let work_dir = std::env::var("FLOTILLA_WORK_DIR").ok();
        let home = std::env::var("FLOTILLA_HOME").ok();
        let hadoop_home = std::env::var("FLOTILLA_HADOOP_HOME").ok();

        let switch_user = std::env::var("FLOTILLA_SWITCH_USER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        let frameworks_home = std::env::var("FLOTILLA_FRAMEWORKS_HOME").ok();

        let status_update_retry_interval = std::env::var("FLOTILLA_STATUS_UPDATE_RETRY_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(STATUS_UPDATE_RETRY_INTERVAL);

        let port = std::env::var("FLOTILLA_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5051);

        let master = match std::env::var("FLOTILLA_MASTER") {
            Ok(s) => Some(s.parse()?),
            Err(_) => None,
        };

        let log_level = std::env::var("FLOTILLA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            resources,
            attributes,
            work_dir,
            home,
            hadoop_home,
            switch_user,
            frameworks_home,
            status_update_retry_interval,
            tick_interval: Duration::from_secs(1),
            port,
            master,
            log_level,
        })
    }

    /// Configuration as key/value pairs for the `vars` introspection dump.
    pub fn entries(&self) -> BTreeMap<String, String> {
        let mut entries = BTreeMap::new();
        entries.insert("resources".to_string(), self.resources.clone());
        if let Some(attributes) = &self.attributes {
            entries.insert("attributes".to_string(), attributes.clone());
        }
        if let Some(work_dir) = &self.work_dir {
            entries.insert("work_dir".to_string(), work_dir.clone());
        }
        if let Some(home) = &self.home {
            entries.insert("home".to_string(), home.clone());
        }
        if let Some(hadoop_home) = &self.hadoop_home {
            entries.insert("hadoop_home".to_string(), hadoop_home.clone());
        }
        entries.insert("switch_user".to_string(), self.switch_user.to_string());
        if let Some(frameworks_home) = &self.frameworks_home {
            entries.insert("frameworks_home".to_string(), frameworks_home.clone());
        }
        entries.insert(
            "status_update_retry_interval".to_string(),
            self.status_update_retry_interval.as_secs().to_string(),
        );
        entries.insert("port".to_string(), self.port.to_string());
        entries
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resources: DEFAULT_RESOURCES.to_string(),
            attributes: None,
            work_dir: None,
            home: None,
            hadoop_home: None,
            switch_user: true,
            frameworks_home: None,
            status_update_retry_interval: STATUS_UPDATE_RETRY_INTERVAL,
            tick_interval: Duration::from_secs(1),
            port: 5051,
            master: None,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let conf = Config::default();
        assert_eq!(conf.resources, "cpus:1;mem:1024");
        assert!(conf.switch_user);
        assert_eq!(conf.status_update_retry_interval, Duration::from_secs(10));
        assert_eq!(conf.port, 5051);
    }

    #[test]
    fn test_entries_include_defaults() {
        let conf = Config::default();
        let entries = conf.entries();
        assert_eq!(entries.get("resources").map(String::as_str), Some("cpus:1;mem:1024"));
        assert_eq!(entries.get("switch_user").map(String::as_str), Some("true"));
        assert!(!entries.contains_key("work_dir"));
    }
}
