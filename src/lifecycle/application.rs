//! Application Bootstrap
//!
//! Wires configuration, logging, the resource container, the scheduler and
//! the web binder together, then runs the module pass followed by the plugin
//! pass.

use super::orchestrator::{Orchestrator, UnitKind};
use super::shutdown_signal;
use crate::config::{BaseConf, Conf};
use crate::di::Container;
use crate::error::Result;
use crate::logging;
use crate::reload::ReloadNotifier;
use crate::task::{CronScheduler, TaskScheduler};
use crate::unit::{App, Unit};
use crate::web::{Web, WebState};
use axum::Router;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

type Registrar = Box<dyn FnOnce(&mut Orchestrator) + Send>;

/// A bootstrapped application.
///
/// # Example
///
/// ```rust,ignore
/// use ensemble::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> ensemble::Result<()> {
///     Application::builder()
///         .conf(Conf::from_file("conf.toml")?.auto_create(true))
///         .module(Accounts::default())
///         .plugin(Metrics::default())
///         .build()?
///         .run()
///         .await
/// }
/// ```
pub struct Application {
    app: App,
    base: Arc<RwLock<BaseConf>>,
    modules: Orchestrator,
    plugins: Orchestrator,
    notifier: Arc<ReloadNotifier>,
    scheduler: Option<Arc<CronScheduler>>,
    web: Option<Arc<Web>>,
    listen: watch::Receiver<String>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.app.container
    }

    pub fn conf(&self) -> &Arc<Conf> {
        &self.app.conf
    }

    /// Snapshot of the base configuration.
    pub fn base(&self) -> BaseConf {
        self.base.read().clone()
    }

    pub fn modules(&self) -> &Orchestrator {
        &self.modules
    }

    pub fn plugins(&self) -> &Orchestrator {
        &self.plugins
    }

    pub fn notifier(&self) -> &Arc<ReloadNotifier> {
        &self.notifier
    }

    pub fn web(&self) -> Option<&Arc<Web>> {
        self.web.as_ref()
    }

    /// The bound routes with application state applied, when web is enabled.
    pub fn router(&self) -> Option<Router> {
        self.web
            .as_ref()
            .map(|web| web.into_router(self.web_state()))
    }

    /// Serve until Ctrl+C or SIGTERM, then shut down.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `signal` resolves, then shut down.
    ///
    /// With hot reload on, a changed `base.port` restarts the server on the
    /// new address. Without web the application simply waits for the signal.
    pub async fn run_until<F>(mut self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let served = match self.web.clone() {
            Some(web) => {
                web.serve_rebinding(self.web_state(), self.listen.clone(), signal)
                    .await
            }
            None => {
                signal.await;
                Ok(())
            }
        };
        self.shutdown();
        served
    }

    /// Stop plugins, then modules, then scheduled tasks.
    pub fn shutdown(&mut self) {
        tracing::info!("Shutting down application...");
        self.plugins.stop_all();
        self.modules.stop_all();
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown();
        }
        tracing::info!("Application shutdown complete");
    }

    fn web_state(&self) -> WebState {
        WebState::new(Arc::clone(&self.app.container), Arc::clone(&self.app.conf))
    }
}

/// Builder for [`Application`]
pub struct ApplicationBuilder {
    conf: Option<Conf>,
    container: Option<Arc<Container>>,
    modules: Vec<Registrar>,
    plugins: Vec<Registrar>,
    web: bool,
    scheduler: bool,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            conf: None,
            container: None,
            modules: Vec::new(),
            plugins: Vec::new(),
            web: true,
            scheduler: true,
        }
    }

    /// Configuration source; an empty in-memory one by default.
    pub fn conf(mut self, conf: Conf) -> Self {
        self.conf = Some(conf);
        self
    }

    /// Start from a pre-populated container.
    pub fn container(mut self, container: Arc<Container>) -> Self {
        self.container = Some(container);
        self
    }

    pub fn module<U: Unit>(mut self, unit: U) -> Self {
        self.modules.push(Box::new(move |orchestrator: &mut Orchestrator| {
            orchestrator.register(unit);
        }));
        self
    }

    pub fn plugin<U: Unit>(mut self, unit: U) -> Self {
        self.plugins.push(Box::new(move |orchestrator: &mut Orchestrator| {
            orchestrator.register(unit);
        }));
        self
    }

    /// Bind declared routes and serve them (default: enabled).
    pub fn web(mut self, enabled: bool) -> Self {
        self.web = enabled;
        self
    }

    /// Run declared tasks on a cron scheduler (default: enabled).
    ///
    /// Scheduling needs a tokio runtime, so build inside one when units
    /// declare tasks.
    pub fn scheduler(mut self, enabled: bool) -> Self {
        self.scheduler = enabled;
        self
    }

    /// Bootstrap the application and run both orchestration passes.
    pub fn build(self) -> Result<Application> {
        let conf = Arc::new(self.conf.unwrap_or_default());
        let base = conf.register(BaseConf::default())?;
        let log = logging::init(&base.read(), "")?;

        let container = self.container.unwrap_or_default();
        let app = App::new(Arc::clone(&container), Arc::clone(&conf), log);
        container.map_shared(Arc::clone(&conf));
        container.map_shared(Arc::clone(&base));
        container.map(app.clone());

        let scheduler = self.scheduler.then(|| Arc::new(CronScheduler::new()));
        let web = self.web.then(|| Arc::new(Web::new()));
        let notifier = Arc::new(
            ReloadNotifier::new(Arc::clone(&conf), Arc::clone(&container))
                .watch_file(base.read().hot_reload),
        );

        let (listen_tx, listen) = watch::channel(base.read().addr());
        if web.is_some() {
            let base = Arc::clone(&base);
            notifier.register("BaseConf", move |_| {
                let base = base.read();
                if !base.hot_reload {
                    return Ok(());
                }
                if base.port_number().is_none() {
                    anyhow::bail!("port is not valid: {}", base.port);
                }
                let next = base.addr();
                let changed = listen_tx.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    *current = next.clone();
                    true
                });
                if changed {
                    tracing::info!("base port changed to {}", next);
                }
                Ok(())
            });
        }

        let orchestrator = |kind: UnitKind| {
            let mut orchestrator =
                Orchestrator::new(kind, app.clone()).with_notifier(Arc::clone(&notifier));
            if let Some(scheduler) = &scheduler {
                orchestrator = orchestrator.with_scheduler(scheduler.clone());
            }
            if let Some(web) = &web {
                orchestrator = orchestrator.with_router(web.clone());
            }
            orchestrator
        };

        let mut modules = orchestrator(UnitKind::Module);
        for registrar in self.modules {
            registrar(&mut modules);
        }
        modules.run()?;

        let mut plugins = orchestrator(UnitKind::Plugin);
        for registrar in self.plugins {
            registrar(&mut plugins);
        }
        plugins.run()?;

        if conf.create_if_missing()? {
            app.log.info("configuration file created");
        }

        Ok(Application {
            app,
            base,
            modules,
            plugins,
            notifier,
            scheduler,
            web,
            listen,
        })
    }
}
