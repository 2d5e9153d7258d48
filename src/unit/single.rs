use super::{App, Provided, Unit};
use crate::di::Container;
use std::sync::Arc;

type LoadFn = Box<dyn FnMut(&Arc<Container>) -> anyhow::Result<Option<Provided>> + Send + Sync>;
type StartFn = Box<dyn FnMut(&Arc<Container>) -> anyhow::Result<()> + Send + Sync>;
type FinalizeFn<T> = Box<dyn FnMut(&Arc<Container>) -> anyhow::Result<T> + Send + Sync>;

/// A named unit whose finalize step builds one instance of `T`.
///
/// The instance is kept by the unit and published into the container, so
/// both the registration handle and other units can reach it afterwards.
#[derive(crate::Assign)]
pub struct Single<T>
where
    T: Send + Sync + 'static,
{
    app: App,
    label: String,
    load: Option<LoadFn>,
    start: Option<StartFn>,
    finalize: Option<FinalizeFn<T>>,
    instance: Option<Arc<T>>,
}

impl<T> Single<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            app: App::default(),
            label: label.into(),
            load: None,
            start: None,
            finalize: None,
            instance: None,
        }
    }

    pub fn on_load<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Arc<Container>) -> anyhow::Result<Option<Provided>> + Send + Sync + 'static,
    {
        self.load = Some(Box::new(f));
        self
    }

    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Arc<Container>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.start = Some(Box::new(f));
        self
    }

    pub fn on_finalize<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Arc<Container>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.finalize = Some(Box::new(f));
        self
    }

    /// The instance built during finalize, if it ran.
    pub fn instance(&self) -> Option<Arc<T>> {
        self.instance.clone()
    }
}

impl<T> Unit for Single<T>
where
    T: Send + Sync + 'static,
{
    fn name(&self) -> String {
        if self.label.is_empty() {
            "Single".to_string()
        } else {
            format!("Single({})", self.label)
        }
    }

    fn load(&mut self, container: &Arc<Container>) -> anyhow::Result<Option<Provided>> {
        match self.load.as_mut() {
            Some(f) => f(container),
            None => Ok(None),
        }
    }

    fn start(&mut self, container: &Arc<Container>) -> anyhow::Result<()> {
        self.start.as_mut().map_or(Ok(()), |f| f(container))
    }

    fn finalize(&mut self, container: &Arc<Container>) -> anyhow::Result<()> {
        let Some(build) = self.finalize.as_mut() else {
            return Ok(());
        };
        let instance = Arc::new(build(container)?);
        container.map_shared(Arc::clone(&instance));
        self.app.log.debug(format!(
            "instance {} ready",
            std::any::type_name::<T>()
        ));
        self.instance = Some(instance);
        Ok(())
    }
}
