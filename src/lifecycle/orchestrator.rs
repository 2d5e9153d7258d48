//! Lifecycle orchestrator
//!
//! Runs one pass over a registry of named units: inject, load, start,
//! finalize. Every phase completes for all units before the next one begins,
//! and units are processed in lexicographic order of their resolved names.

use super::fault::guard;
use super::{Phase, UnitState};
use crate::di::Container;
use crate::error::{EnsembleError, Result};
use crate::inject::{inject_context, inject_logger};
use crate::reload::ReloadNotifier;
use crate::task::TaskScheduler;
use crate::unit::{App, Unit, type_display_name};
use crate::web::RouteBinder;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type UnitRef = Arc<RwLock<dyn Unit>>;

type PublishFn = Box<dyn FnOnce(&Container) + Send>;

/// Label used in log prefixes and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum UnitKind {
    Module,
    Plugin,
}

struct Registration {
    unit: UnitRef,
    type_name: &'static str,
    publish: PublishFn,
}

struct Entry {
    name: String,
    unit: UnitRef,
    state: UnitState,
}

impl Entry {
    fn advance(&mut self, phase: Phase) {
        if let Some(next) = self.state.advance(phase) {
            self.state = next;
        }
    }
}

/// Drives registered units through one orchestration pass.
///
/// # Example
///
/// ```rust,ignore
/// let mut modules = Orchestrator::new(UnitKind::Module, app.clone())
///     .with_scheduler(scheduler)
///     .with_router(web);
/// let cache = modules.register(Cache::default());
/// modules.run()?;
/// ```
pub struct Orchestrator {
    kind: UnitKind,
    app: App,
    registered: Vec<Registration>,
    entries: Vec<Entry>,
    duplicates: Vec<String>,
    scheduler: Option<Arc<dyn TaskScheduler>>,
    router: Option<Arc<dyn RouteBinder>>,
    notifier: Option<Arc<ReloadNotifier>>,
    ran: bool,
}

impl Orchestrator {
    pub fn new(kind: UnitKind, app: App) -> Self {
        Self {
            kind,
            app,
            registered: Vec::new(),
            entries: Vec::new(),
            duplicates: Vec::new(),
            scheduler: None,
            router: None,
            notifier: None,
            ran: false,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_router(mut self, router: Arc<dyn RouteBinder>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<ReloadNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// Register a unit and get back a shared handle to it.
    ///
    /// The same handle is published into the container when the pass runs,
    /// reachable as `RwLock<U>`.
    pub fn register<U: Unit>(&mut self, unit: U) -> Arc<RwLock<U>> {
        let shared = Arc::new(RwLock::new(unit));
        let published = Arc::clone(&shared);
        self.registered.push(Registration {
            unit: shared.clone(),
            type_name: std::any::type_name::<U>(),
            publish: Box::new(move |container: &Container| {
                container.map_shared(published);
            }),
        });
        shared
    }

    /// Units registered but not yet processed, plus processed ones.
    pub fn len(&self) -> usize {
        self.registered.len() + self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolved names in processing order; empty until the pass runs.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Names that were registered more than once and ignored after the first.
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    pub fn state(&self, name: &str) -> Option<UnitState> {
        self.entry(name).map(|e| e.state)
    }

    pub fn unit(&self, name: &str) -> Option<UnitRef> {
        self.entry(name).map(|e| Arc::clone(&e.unit))
    }

    /// Run the pass. Any unit error aborts it and is returned with the unit
    /// name and phase attached.
    pub fn run(&mut self) -> Result<()> {
        if self.ran {
            return Err(EnsembleError::AlreadyRan);
        }
        self.ran = true;

        self.prepare();
        tracing::debug!("{} order: {:?}", self.kind, self.names());

        self.load_all()?;
        self.start_all()?;
        self.finalize_all()?;

        if let Some(notifier) = &self.notifier {
            notifier.watch()?;
        }

        tracing::info!("{} units ready ({})", self.kind, self.entries.len());
        Ok(())
    }

    /// Stop finalized units in reverse processing order. Errors are logged.
    pub fn stop_all(&mut self) {
        let container = Arc::clone(&self.app.container);
        for entry in self.entries.iter_mut().rev() {
            if entry.state != UnitState::Finalized {
                continue;
            }
            match guard(&entry.name, Phase::Stop, || entry.unit.write().stop(&container)) {
                Ok(()) => tracing::debug!("{} {} stopped", self.kind, entry.name),
                Err(e) => self.app.log.error(&e),
            }
            entry.advance(Phase::Stop);
        }
    }

    /// Inject context, resolve names, drop duplicates, scope loggers and
    /// publish, sort.
    fn prepare(&mut self) {
        let mut active: BTreeMap<String, Entry> = BTreeMap::new();

        for registration in self.registered.drain(..) {
            inject_context(&mut *registration.unit.write(), &self.app);
            let name = {
                let reported = registration.unit.read().name();
                if reported.is_empty() {
                    type_display_name(registration.type_name)
                } else {
                    reported
                }
            };

            if active.contains_key(&name) {
                self.app.log.warn(format!(
                    "{} {} is already registered, ignoring the duplicate",
                    self.kind, name
                ));
                self.duplicates.push(name);
                continue;
            }

            let prefix = format!("[{} {}] ", self.kind, name);
            inject_logger(&mut *registration.unit.write(), &self.app, &prefix);
            (registration.publish)(&*self.app.container);

            active.insert(
                name.clone(),
                Entry {
                    name,
                    unit: registration.unit,
                    state: UnitState::Injected,
                },
            );
        }

        self.entries = active.into_values().collect();
    }

    fn load_all(&mut self) -> Result<()> {
        let container = Arc::clone(&self.app.container);
        for entry in &mut self.entries {
            let provided = guard(&entry.name, Phase::Load, || entry.unit.write().load(&container))?;
            if let Some(provided) = provided {
                tracing::debug!("{} {} provides {:?}", self.kind, entry.name, provided);
                provided.publish(&container);
            }
            entry.advance(Phase::Load);
        }
        Ok(())
    }

    fn start_all(&mut self) -> Result<()> {
        let container = Arc::clone(&self.app.container);
        for entry in &mut self.entries {
            guard(&entry.name, Phase::Start, || entry.unit.write().start(&container))?;
            entry.advance(Phase::Start);
        }
        Ok(())
    }

    fn finalize_all(&mut self) -> Result<()> {
        let container = Arc::clone(&self.app.container);
        for entry in &mut self.entries {
            let (tasks, routes) = {
                let unit = entry.unit.read();
                (unit.tasks(), unit.routes())
            };
            let attributed =
                |e: EnsembleError| EnsembleError::lifecycle(&entry.name, Phase::Finalize, e.into());

            if !tasks.is_empty() {
                match &self.scheduler {
                    Some(scheduler) => {
                        for task in &tasks {
                            scheduler.schedule(task).map_err(attributed)?;
                        }
                    }
                    None => tracing::warn!(
                        "{} {} declares {} task(s) but no scheduler is attached",
                        self.kind,
                        entry.name,
                        tasks.len()
                    ),
                }
            }

            if !routes.is_empty() {
                match &self.router {
                    Some(router) => {
                        for route in routes {
                            router.bind(&entry.name, route).map_err(attributed)?;
                        }
                    }
                    None => tracing::warn!(
                        "{} {} declares routes but no router is attached",
                        self.kind,
                        entry.name
                    ),
                }
            }

            guard(&entry.name, Phase::Finalize, || {
                entry.unit.write().finalize(&container)
            })?;
            entry.advance(Phase::Finalize);

            if let Some(notifier) = &self.notifier {
                if entry.unit.write().as_reload().is_some() {
                    let unit = Arc::clone(&entry.unit);
                    notifier.register(entry.name.clone(), move |container| {
                        match unit.write().as_reload() {
                            Some(reload) => reload.reload(container),
                            None => Ok(()),
                        }
                    });
                }
            }
        }
        Ok(())
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("kind", &self.kind)
            .field("units", &self.names())
            .field("pending", &self.registered.len())
            .field("ran", &self.ran)
            .finish()
    }
}
