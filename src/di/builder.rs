use crate::di::Container;
use std::sync::Arc;

/// Builder for constructing a resource container before it is shared.
///
/// # Example
/// ```rust,ignore
/// let container = ContainerBuilder::new()
///     .map(Database::new())
///     .bind::<dyn Repository, Database, _>(|db| db as Arc<dyn Repository>)
///     .build();
/// ```
pub struct ContainerBuilder {
    container: Container,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            container: Container::new(),
        }
    }

    /// Map a singleton value
    pub fn map<T: 'static + Send + Sync>(self, instance: T) -> Self {
        self.container.map(instance);
        self
    }

    /// Provide a factory invoked on every resolution
    pub fn provide<T, F>(self, factory: F) -> Self
    where
        T: 'static + Send + Sync,
        F: Fn(&Container) -> anyhow::Result<T> + 'static + Send + Sync,
    {
        self.container.provide(factory);
        self
    }

    /// Bind a trait to a concrete implementation
    pub fn bind<Trait, Impl, F>(self, caster: F) -> Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        Impl: 'static + Send + Sync,
        F: Fn(Arc<Impl>) -> Arc<Trait> + 'static + Send + Sync,
    {
        self.container.bind::<Trait, Impl, F>(caster);
        self
    }

    pub fn build(self) -> Arc<Container> {
        Arc::new(self.container)
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
