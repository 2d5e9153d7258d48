use super::{Assign, Provided, Unit};
use crate::di::Container;
use crate::task::Task;
use crate::web::Route;
use std::sync::Arc;

type LoadFn = Box<dyn FnMut(&Arc<Container>) -> anyhow::Result<Option<Provided>> + Send + Sync>;
type HookFn = Box<dyn FnMut(&Arc<Container>) -> anyhow::Result<()> + Send + Sync>;

/// Tasks and routes declared by an adapter unit.
#[derive(Clone, Default)]
pub struct UnitService {
    pub tasks: Vec<Task>,
    pub routes: Vec<Route>,
}

/// A unit assembled from optional callbacks.
///
/// Useful for small plugins that do not warrant their own type:
///
/// ```rust,ignore
/// let metrics = LifeCycle::named("Metrics")
///     .on_load(|_| Ok(Some(Provided::value(Registry::default()))))
///     .on_stop(|c| c.resolve::<Registry>()?.flush());
/// ```
#[derive(Default)]
pub struct LifeCycle {
    name: String,
    on_load: Option<LoadFn>,
    on_start: Option<HookFn>,
    on_finalize: Option<HookFn>,
    on_stop: Option<HookFn>,
    service: Option<UnitService>,
}

impl LifeCycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn on_load<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Arc<Container>) -> anyhow::Result<Option<Provided>> + Send + Sync + 'static,
    {
        self.on_load = Some(Box::new(f));
        self
    }

    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Arc<Container>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_start = Some(Box::new(f));
        self
    }

    pub fn on_finalize<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Arc<Container>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_finalize = Some(Box::new(f));
        self
    }

    pub fn on_stop<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Arc<Container>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_stop = Some(Box::new(f));
        self
    }

    pub fn service(mut self, service: UnitService) -> Self {
        self.service = Some(service);
        self
    }
}

impl Assign for LifeCycle {}

impl Unit for LifeCycle {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn tasks(&self) -> Vec<Task> {
        self.service
            .as_ref()
            .map(|s| s.tasks.clone())
            .unwrap_or_default()
    }

    fn routes(&self) -> Vec<Route> {
        self.service
            .as_ref()
            .map(|s| s.routes.clone())
            .unwrap_or_default()
    }

    fn load(&mut self, container: &Arc<Container>) -> anyhow::Result<Option<Provided>> {
        match self.on_load.as_mut() {
            Some(f) => f(container),
            None => Ok(None),
        }
    }

    fn start(&mut self, container: &Arc<Container>) -> anyhow::Result<()> {
        self.on_start.as_mut().map_or(Ok(()), |f| f(container))
    }

    fn finalize(&mut self, container: &Arc<Container>) -> anyhow::Result<()> {
        self.on_finalize.as_mut().map_or(Ok(()), |f| f(container))
    }

    fn stop(&mut self, container: &Arc<Container>) -> anyhow::Result<()> {
        self.on_stop.as_mut().map_or(Ok(()), |f| f(container))
    }
}
