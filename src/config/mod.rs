//! Configuration handle shared by every unit.
//!
//! Values come from an optional TOML file, environment overrides and
//! registered defaults. Registered structures are kept in sync with the
//! source through auto-unmarshal bindings, refreshed on every reload.

mod base;
mod event;
mod tree;

pub use base::BaseConf;
pub use event::{ConfigEvent, ConfigEventKind};

use crate::error::{EnsembleError, Result};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Binding = Box<dyn Fn(&Conf) + Send + Sync>;
type Listener = Arc<dyn Fn(&ConfigEvent) + Send + Sync>;

/// A configuration section with a fixed key.
///
/// ```rust,ignore
/// #[derive(Default, Serialize, Deserialize)]
/// #[serde(default)]
/// struct CacheConf { ttl_secs: u64 }
///
/// impl ConfValue for CacheConf {
///     fn conf_key() -> &'static str { "cache" }
/// }
///
/// let cache = conf.register(CacheConf { ttl_secs: 60 })?;
/// ```
pub trait ConfValue: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn conf_key() -> &'static str;

    /// Keep the defaults in memory only; `write()` never persists them.
    fn disable_write() -> bool {
        false
    }
}

/// Configuration handle
pub struct Conf {
    path: Option<PathBuf>,
    env_prefix: Option<String>,
    auto_create: bool,
    values: RwLock<Value>,
    defaults: RwLock<Value>,
    persisted_defaults: RwLock<Value>,
    bindings: Mutex<Vec<Binding>>,
    listeners: RwLock<Vec<Listener>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl Conf {
    /// An empty, in-memory configuration.
    pub fn new() -> Self {
        Self {
            path: None,
            env_prefix: None,
            auto_create: false,
            values: RwLock::new(Value::Object(Map::new())),
            defaults: RwLock::new(Value::Object(Map::new())),
            persisted_defaults: RwLock::new(Value::Object(Map::new())),
            bindings: Mutex::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            watcher: Mutex::new(None),
        }
    }

    /// A configuration backed by a TOML file. A missing file is not an error.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let mut conf = Self::new();
        conf.path = Some(path.into());
        conf.read()?;
        Ok(conf)
    }

    /// Overlay environment variables named `PREFIX_SECTION__KEY`.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into().to_uppercase());
        let mut values = self.values.write();
        self.apply_env(&mut values);
        drop(values);
        self
    }

    /// Write the file once defaults are registered if it does not exist yet.
    pub fn auto_create(mut self, enabled: bool) -> Self {
        self.auto_create = enabled;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-read the backing file and environment, replacing explicit values.
    pub fn read(&self) -> Result<()> {
        let mut values = match &self.path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path)?;
                let table: toml::Table = toml::from_str(&text)?;
                serde_json::to_value(table)?
            }
            _ => Value::Object(Map::new()),
        };
        self.apply_env(&mut values);
        *self.values.write() = values;
        Ok(())
    }

    /// Look up a dotted key. Objects are returned with defaults merged beneath values.
    pub fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.read();
        let defaults = self.defaults.read();
        match (tree::get_path(&defaults, key), tree::get_path(&values, key)) {
            (Some(default), Some(value)) if default.is_object() && value.is_object() => {
                let mut merged = default.clone();
                tree::merge(&mut merged, value.clone());
                Some(merged)
            }
            (_, Some(value)) => Some(value.clone()),
            (default, None) => default.cloned(),
        }
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        tree::set_path(&mut self.values.write(), key, value.into());
    }

    /// Register a default beneath any explicit value for `key`.
    pub fn set_default(&self, key: &str, value: Value, persist: bool) {
        tree::set_path(&mut self.defaults.write(), key, value.clone());
        if persist {
            tree::set_path(&mut self.persisted_defaults.write(), key, value);
        }
    }

    /// Deserialize the section at `key`; a missing section decodes from an empty table.
    pub fn unmarshal<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .get(key)
            .unwrap_or_else(|| Value::Object(Map::new()));
        serde_json::from_value(value).map_err(|e| {
            EnsembleError::config(format!("failed to unmarshal `{}`: {}", key, e))
        })
    }

    /// Keep a structure in sync with `key`; refreshed by [`Conf::auto_unmarshal`].
    pub fn bind<T>(&self, key: &'static str) -> Result<Arc<RwLock<T>>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let binding = Arc::new(RwLock::new(self.unmarshal::<T>(key)?));
        let weak = Arc::downgrade(&binding);
        self.bindings.lock().push(Box::new(move |conf: &Conf| {
            let Some(binding) = weak.upgrade() else {
                return;
            };
            match conf.unmarshal::<T>(key) {
                Ok(value) => *binding.write() = value,
                Err(e) => tracing::warn!("keeping previous `{}` configuration: {}", key, e),
            }
        }));
        Ok(binding)
    }

    /// Register a configuration section's defaults and bind it.
    pub fn register<T: ConfValue>(&self, defaults: T) -> Result<Arc<RwLock<T>>> {
        let value = serde_json::to_value(&defaults)?;
        self.set_default(T::conf_key(), value, !T::disable_write());
        self.bind::<T>(T::conf_key())
    }

    /// Refresh every bound structure from the current source.
    pub fn auto_unmarshal(&self) {
        let bindings = self.bindings.lock();
        for binding in bindings.iter() {
            binding(self);
        }
    }

    /// Persist explicit values merged over persistable defaults.
    pub fn write(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| EnsembleError::config("no configuration file to write"))?;

        let mut merged = self.persisted_defaults.read().clone();
        tree::merge(&mut merged, self.values.read().clone());
        tree::strip_nulls(&mut merged);

        let document = toml::Value::try_from(&merged)?;
        std::fs::write(path, toml::to_string_pretty(&document)?)?;
        Ok(())
    }

    /// Write the file if auto-creation is enabled and it does not exist.
    pub fn create_if_missing(&self) -> Result<bool> {
        match &self.path {
            Some(path) if self.auto_create && !path.exists() => {
                self.write()?;
                tracing::debug!("created configuration file {}", path.display());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Subscribe to change events.
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(&ConfigEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Dispatch a change event to every subscriber.
    pub fn emit(&self, event: &ConfigEvent) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(event);
        }
    }

    /// Watch the backing file; modifications re-read it and emit a write event.
    ///
    /// The parent directory is watched so that saves which replace the file
    /// through a rename keep being picked up. Calling this more than once
    /// keeps the first watcher.
    pub fn watch(self: &Arc<Self>) -> Result<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| EnsembleError::config("no configuration file to watch"))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| EnsembleError::config(format!("{} is not a file", path.display())))?;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }

        let weak = Arc::downgrade(self);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Some(conf) = weak.upgrade() else {
                return;
            };
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("configuration watch error: {}", e);
                    return;
                }
            };
            let Some(target) = event
                .paths
                .iter()
                .find(|p| p.file_name() == Some(file_name.as_os_str()))
            else {
                return;
            };

            let kind = event_kind(&event, target);
            if kind == ConfigEventKind::Write {
                if let Err(e) = conf.read() {
                    tracing::error!("failed to re-read configuration: {}", e);
                    return;
                }
            }
            conf.emit(&ConfigEvent {
                kind,
                path: Some(target.clone()),
            });
        })
        .map_err(|e| EnsembleError::config(format!("failed to create watcher: {}", e)))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| EnsembleError::config(format!("failed to watch {}: {}", dir.display(), e)))?;

        tracing::debug!("watching configuration file {}", path.display());
        *slot = Some(watcher);
        Ok(())
    }

    fn apply_env(&self, values: &mut Value) {
        let Some(prefix) = &self.env_prefix else {
            return;
        };
        let prefix = format!("{}_", prefix);
        for (name, raw) in std::env::vars() {
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            let key = rest
                .split("__")
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join(".");
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            tree::set_path(values, &key, value);
        }
    }
}

/// Content changes, creations and renames onto the file count as writes.
/// Renaming the file away does not.
fn event_kind(event: &notify::Event, target: &Path) -> ConfigEventKind {
    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ConfigEventKind::Other,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both))
            if event.paths.first().map(PathBuf::as_path) == Some(target) =>
        {
            ConfigEventKind::Other
        }
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
        | EventKind::Access(AccessKind::Close(AccessMode::Write)) => ConfigEventKind::Write,
        _ => ConfigEventKind::Other,
    }
}

impl Default for Conf {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Conf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conf")
            .field("path", &self.path)
            .field("env_prefix", &self.env_prefix)
            .field("bindings", &self.bindings.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct CacheConf {
        ttl_secs: u64,
        region: String,
    }

    impl ConfValue for CacheConf {
        fn conf_key() -> &'static str {
            "cache"
        }
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct SecretConf {
        token: String,
    }

    impl ConfValue for SecretConf {
        fn conf_key() -> &'static str {
            "secret"
        }

        fn disable_write() -> bool {
            true
        }
    }

    #[test]
    fn values_override_defaults() {
        let conf = Conf::new();
        conf.set_default("cache", json!({ "ttl_secs": 60, "region": "eu" }), true);
        conf.set("cache.ttl_secs", 5);

        assert_eq!(conf.get("cache.ttl_secs"), Some(json!(5)));
        assert_eq!(conf.get("cache.region"), Some(json!("eu")));
        assert_eq!(
            conf.unmarshal::<CacheConf>("cache").unwrap(),
            CacheConf {
                ttl_secs: 5,
                region: "eu".into()
            }
        );
    }

    #[test]
    fn missing_section_unmarshals_from_defaults_of_the_type() {
        let conf = Conf::new();
        assert_eq!(
            conf.unmarshal::<CacheConf>("cache").unwrap(),
            CacheConf::default()
        );
    }

    #[test]
    fn bindings_refresh_on_auto_unmarshal() {
        let conf = Conf::new();
        let cache = conf
            .register(CacheConf {
                ttl_secs: 60,
                region: "eu".into(),
            })
            .unwrap();
        assert_eq!(cache.read().ttl_secs, 60);

        conf.set("cache.ttl_secs", 120);
        assert_eq!(cache.read().ttl_secs, 60);

        conf.auto_unmarshal();
        assert_eq!(cache.read().ttl_secs, 120);
        assert_eq!(cache.read().region, "eu");
    }

    #[test]
    fn write_skips_memory_only_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        let conf = Conf::from_file(&path).unwrap().auto_create(true);
        conf.register(CacheConf {
            ttl_secs: 30,
            region: "us".into(),
        })
        .unwrap();
        conf.register(SecretConf {
            token: "hunter2".into(),
        })
        .unwrap();

        assert!(conf.create_if_missing().unwrap());
        assert!(!conf.create_if_missing().unwrap());

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("ttl_secs = 30"));
        assert!(!written.contains("hunter2"));
    }

    #[test]
    fn read_picks_up_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "[cache]\nttl_secs = 10\n").unwrap();

        let conf = Conf::from_file(&path).unwrap();
        assert_eq!(conf.get_as::<u64>("cache.ttl_secs"), Some(10));

        std::fs::write(&path, "[cache]\nttl_secs = 20\n").unwrap();
        conf.read().unwrap();
        assert_eq!(conf.get_as::<u64>("cache.ttl_secs"), Some(20));
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "[cache\nttl_secs = ").unwrap();

        let err = Conf::from_file(&path).unwrap_err();
        assert!(matches!(err, EnsembleError::Config(_)));
    }

    #[test]
    fn env_overrides_nested_keys() {
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var("ENSEMBLETESTENV_CACHE__TTL_SECS", "99");
        }
        let conf = Conf::new().with_env_prefix("ensembletestenv");
        assert_eq!(conf.get("cache.ttl_secs"), Some(json!(99)));
    }

    #[test]
    fn emit_reaches_every_listener() {
        let conf = Conf::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for id in 0..2 {
            let seen = Arc::clone(&seen);
            conf.on_change(move |event| seen.lock().push((id, event.kind)));
        }
        conf.emit(&ConfigEvent::write());
        assert_eq!(
            *seen.lock(),
            vec![(0, ConfigEventKind::Write), (1, ConfigEventKind::Write)]
        );
    }

    #[test]
    fn renames_onto_the_file_count_as_writes() {
        use notify::event::{CreateKind, DataChange, RemoveKind};

        let target = PathBuf::from("/etc/app/conf.toml");
        let staged = PathBuf::from("/etc/app/conf.toml.tmp");
        let event = |kind: EventKind, paths: &[&PathBuf]| {
            paths
                .iter()
                .fold(notify::Event::new(kind), |event, path| event.add_path((*path).clone()))
        };

        let write = |kind, paths: &[&PathBuf]| event_kind(&event(kind, paths), &target);
        assert_eq!(
            write(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &[&target]),
            ConfigEventKind::Write
        );
        assert_eq!(
            write(EventKind::Create(CreateKind::File), &[&target]),
            ConfigEventKind::Write
        );
        assert_eq!(
            write(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &[&target]),
            ConfigEventKind::Write
        );
        assert_eq!(
            write(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &[&staged, &target]
            ),
            ConfigEventKind::Write
        );
        assert_eq!(
            write(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &[&target, &staged]
            ),
            ConfigEventKind::Other
        );
        assert_eq!(
            write(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &[&target]),
            ConfigEventKind::Other
        );
        assert_eq!(
            write(EventKind::Remove(RemoveKind::File), &[&target]),
            ConfigEventKind::Other
        );
    }
}
