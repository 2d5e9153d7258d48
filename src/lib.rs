//! # Ensemble
//!
//! An application composition runtime for Rust.
//!
//! Ensemble takes independently authored units (modules and plugins), wires
//! shared resources into each of them, drives them through a staged
//! lifecycle and collects what they contribute: provided services, scheduled
//! tasks and HTTP routes. When the configuration file changes, units that
//! asked for it are notified.
//!
//! ## Features
//!
//! - **Staged lifecycle**: load, start and finalize run for every unit before the next phase begins
//! - **Resource injection**: `#[derive(Assign)]` wires container, configuration and a scoped logger into unit fields
//! - **Composition**: [`Multiple`] presents a dynamic group of units as one
//! - **Hot reload**: configuration changes refresh bound sections and call reloadable units
//! - **Tasks and routes**: cron tasks and axum routers declared by units
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ensemble::prelude::*;
//!
//! #[derive(Default, Assign)]
//! pub struct Greeter {
//!     app: App,
//! }
//!
//! struct Greeting(String);
//!
//! impl Unit for Greeter {
//!     fn load(&mut self, _container: &Arc<Container>) -> anyhow::Result<Option<Provided>> {
//!         self.app.log.info("loading greeting");
//!         Ok(Some(Provided::value(Greeting("hello".into()))))
//!     }
//!
//!     fn routes(&self) -> Vec<Route> {
//!         let hello = Router::new().route(
//!             "/",
//!             get(|Inject(greeting): Inject<Greeting>| async move { greeting.0.clone() }),
//!         );
//!         vec![Route::new(hello)]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> ensemble::Result<()> {
//!     Application::builder()
//!         .conf(Conf::from_file("conf.toml")?.auto_create(true))
//!         .module(Greeter::default())
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```

extern crate self as ensemble;

pub mod composite;
pub mod config;
pub mod di;
pub mod error;
pub mod inject;
pub mod lifecycle;
pub mod logging;
pub mod reload;
pub mod task;
pub mod unit;
pub mod web;

// Re-export core types
pub use composite::Multiple;
pub use config::{BaseConf, Conf, ConfValue};
pub use di::{Container, ContainerBuilder, HasContainer, Inject};
pub use error::{EnsembleError, Result};
pub use lifecycle::{Application, ApplicationBuilder, Orchestrator, Phase};
pub use logging::Logger;
pub use unit::{App, Assign, Provided, Reload, Unit};

// Re-export macros
pub use ensemble_macro::Assign;

// Re-export commonly used types from dependencies
pub use anyhow;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use ensemble::prelude::*;
/// ```
pub mod prelude {
    pub use crate::composite::Multiple;
    pub use crate::config::{BaseConf, Conf, ConfValue, ConfigEvent, ConfigEventKind};
    pub use crate::di::{Container, ContainerBuilder, HasContainer, Inject};
    pub use crate::error::{EnsembleError, Result};
    pub use crate::lifecycle::{
        Application, ApplicationBuilder, Orchestrator, Phase, UnitKind, UnitState,
        shutdown_signal,
    };
    pub use crate::logging::Logger;
    pub use crate::reload::ReloadNotifier;
    pub use crate::task::{CronScheduler, Task, TaskScheduler};
    pub use crate::unit::{
        AcceptsApp, AcceptsConfig, AcceptsContainer, AcceptsLogger, App, LifeCycle, Provided,
        Reload, Single, Unit, UnitService,
    };
    pub use crate::Assign;
    pub use crate::web::{Route, RouteBinder, Web, WebState};
    pub use anyhow;
    pub use axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{delete, get, patch, post, put},
    };
    pub use std::sync::Arc;
}
