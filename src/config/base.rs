use super::ConfValue;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings every application carries under the `base` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConf {
    pub debug: bool,
    /// One of `debug`, `info`, `warn`, `error`; overrides `debug` when set.
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    /// Include source file and line in log output.
    pub log_position: bool,
    /// `3788`, `:3788` or `127.0.0.1:3788`.
    pub port: String,
    pub hot_reload: bool,
}

impl Default for BaseConf {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: String::new(),
            log_dir: String::new(),
            log_file: String::new(),
            log_position: false,
            port: "3788".to_string(),
            hot_reload: true,
        }
    }
}

impl ConfValue for BaseConf {
    fn conf_key() -> &'static str {
        "base"
    }

    fn disable_write() -> bool {
        true
    }
}

impl BaseConf {
    /// Socket address the web server binds to.
    pub fn addr(&self) -> String {
        match self.port.split_once(':') {
            Some(("", port)) => format!("0.0.0.0:{}", port),
            Some(_) => self.port.clone(),
            None => format!("0.0.0.0:{}", self.port),
        }
    }

    /// The port part of `port`, when it is a valid port number.
    pub fn port_number(&self) -> Option<u16> {
        let port = self
            .port
            .rsplit_once(':')
            .map_or(self.port.as_str(), |(_, port)| port);
        port.parse().ok()
    }

    /// Log file location; a directory without a file name logs to `app.log`.
    pub fn log_path(&self) -> Option<PathBuf> {
        match (self.log_dir.is_empty(), self.log_file.is_empty()) {
            (false, true) => Some(PathBuf::from(&self.log_dir).join("app.log")),
            (false, false) => Some(PathBuf::from(&self.log_dir).join(&self.log_file)),
            (true, false) => Some(PathBuf::from(&self.log_file)),
            (true, true) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_accepts_bare_and_prefixed_ports() {
        let mut base = BaseConf::default();
        assert_eq!(base.addr(), "0.0.0.0:3788");
        base.port = ":8080".into();
        assert_eq!(base.addr(), "0.0.0.0:8080");
        base.port = "127.0.0.1:9000".into();
        assert_eq!(base.addr(), "127.0.0.1:9000");
    }

    #[test]
    fn port_number_rejects_garbage() {
        let mut base = BaseConf::default();
        assert_eq!(base.port_number(), Some(3788));
        base.port = "127.0.0.1:9000".into();
        assert_eq!(base.port_number(), Some(9000));
        base.port = ":http".into();
        assert_eq!(base.port_number(), None);
        base.port = "70000".into();
        assert_eq!(base.port_number(), None);
    }

    #[test]
    fn log_path_defaults_file_name_inside_dir() {
        let base = BaseConf {
            log_dir: "logs".into(),
            ..Default::default()
        };
        assert_eq!(base.log_path(), Some(PathBuf::from("logs/app.log")));
        assert_eq!(BaseConf::default().log_path(), None);
    }
}
