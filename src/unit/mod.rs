//! The unit contract.
//!
//! A unit is a module or plugin taking part in the staged lifecycle:
//!
//! ```text
//! Registered → Injected → Loaded → Started → Finalized
//! ```
//!
//! Every lifecycle operation has a default, so a unit only writes the ones it
//! needs. Shared resources reach a unit through the capability traits
//! ([`AcceptsApp`], [`AcceptsContainer`], [`AcceptsConfig`],
//! [`AcceptsLogger`]), which `#[derive(Assign)]` implements for the fields it
//! finds.
//!
//! # Example
//!
//! ```rust,ignore
//! use ensemble::prelude::*;
//!
//! #[derive(Default, Assign)]
//! pub struct Cache {
//!     app: App,
//!     entries: usize,
//! }
//!
//! impl Unit for Cache {
//!     fn load(&mut self, _container: &Arc<Container>) -> anyhow::Result<Option<Provided>> {
//!         self.app.log.info("warming up");
//!         Ok(Some(Provided::value(CacheHandle::default())))
//!     }
//! }
//! ```

mod adapter;
mod app;
mod single;

pub use adapter::{LifeCycle, UnitService};
pub use app::App;
pub use single::Single;

use crate::config::Conf;
use crate::di::Container;
use crate::logging::Logger;
use crate::task::Task;
use crate::web::Route;
use std::sync::Arc;

/// A module or plugin driven through load, start and finalize.
pub trait Unit: Assign + Send + Sync + 'static {
    /// Display name; empty means "derive it from the concrete type".
    fn name(&self) -> String {
        String::new()
    }

    /// Scheduled work, collected after every unit has started.
    fn tasks(&self) -> Vec<Task> {
        Vec::new()
    }

    /// Routes, collected after every unit has started.
    fn routes(&self) -> Vec<Route> {
        Vec::new()
    }

    /// Expensive setup. A returned value is published into the container.
    fn load(&mut self, _container: &Arc<Container>) -> anyhow::Result<Option<Provided>> {
        Ok(None)
    }

    /// Runs once every unit has loaded, so cross-unit resolution is safe.
    fn start(&mut self, _container: &Arc<Container>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once every unit has started and this unit's tasks and routes are bound.
    fn finalize(&mut self, _container: &Arc<Container>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Shutdown hook.
    fn stop(&mut self, _container: &Arc<Container>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Units reacting to configuration changes return `Some(self)`.
    fn as_reload(&mut self) -> Option<&mut dyn Reload> {
        None
    }
}

/// Reaction to a configuration change.
pub trait Reload {
    fn reload(&mut self, container: &Arc<Container>) -> anyhow::Result<()>;
}

/// Receives the whole application context.
pub trait AcceptsApp {
    fn accept_app(&mut self, app: &App);
}

pub trait AcceptsContainer {
    fn accept_container(&mut self, container: Arc<Container>);
}

pub trait AcceptsConfig {
    fn accept_config(&mut self, conf: Arc<Conf>);
}

/// Receives a logger scoped to the unit.
pub trait AcceptsLogger {
    fn accept_logger(&mut self, log: Logger);
}

/// Capability probes used by the field injector.
///
/// Implemented by `#[derive(Assign)]`; an empty `impl Assign for T {}` opts a
/// type out of injection entirely.
pub trait Assign {
    fn as_accepts_app(&mut self) -> Option<&mut dyn AcceptsApp> {
        None
    }

    fn as_accepts_container(&mut self) -> Option<&mut dyn AcceptsContainer> {
        None
    }

    fn as_accepts_config(&mut self) -> Option<&mut dyn AcceptsConfig> {
        None
    }

    fn as_accepts_logger(&mut self) -> Option<&mut dyn AcceptsLogger> {
        None
    }
}

type Publish = Box<dyn FnOnce(&Container) + Send>;

/// A value a unit hands to the container from its load phase.
pub enum Provided {
    /// Published as a singleton reachable by its concrete type.
    Value {
        type_name: &'static str,
        publish: Publish,
    },
    /// Published as a factory invoked on every resolution.
    Factory {
        type_name: &'static str,
        publish: Publish,
    },
}

impl Provided {
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::shared(Arc::new(value))
    }

    pub fn shared<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Provided::Value {
            type_name: std::any::type_name::<T>(),
            publish: Box::new(move |container: &Container| {
                container.map_shared(value);
            }),
        }
    }

    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Provided::Factory {
            type_name: std::any::type_name::<T>(),
            publish: Box::new(move |container: &Container| {
                container.provide(factory);
            }),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Provided::Value { type_name, .. } | Provided::Factory { type_name, .. } => type_name,
        }
    }

    pub fn is_factory(&self) -> bool {
        matches!(self, Provided::Factory { .. })
    }

    pub fn publish(self, container: &Container) {
        match self {
            Provided::Value { publish, .. } | Provided::Factory { publish, .. } => {
                publish(container)
            }
        }
    }
}

impl std::fmt::Debug for Provided {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_factory() { "Factory" } else { "Value" };
        f.debug_tuple(kind).field(&self.type_name()).finish()
    }
}

/// Display name derived from a concrete type: last path segment, generics
/// stripped, first letter capitalized.
pub fn type_display_name(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let last = base.rsplit("::").next().unwrap_or(base);
    let mut chars = last.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
