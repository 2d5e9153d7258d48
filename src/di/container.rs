use crate::error::{EnsembleError, Result};
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

type Instance = Arc<dyn Any + Send + Sync>;

/// Type alias for a function that can cast an `Arc<dyn Any>` to another `Arc<dyn Any>`.
/// The inner value is usually an `Arc<dyn Trait>`.
type CasterFn = Arc<dyn Fn(Instance) -> Option<Instance> + Send + Sync>;

/// Factory stored for a type; invoked on every resolution.
type FactoryFn = Arc<dyn Fn(&Container) -> anyhow::Result<Instance> + Send + Sync>;

/// Thread-safe resource container shared by every unit of an application.
///
/// Values are keyed by their concrete type. A type is either mapped to a
/// singleton instance or provided through a factory; the latest registration
/// for a type wins.
pub struct Container {
    services: DashMap<TypeId, ServiceEntry>,
    trait_mappings: DashMap<TypeId, TypeId>,
    casters: DashMap<TypeId, CasterFn>,
}

impl Clone for Container {
    fn clone(&self) -> Self {
        Self {
            services: self.services.clone(),
            trait_mappings: self.trait_mappings.clone(),
            casters: self.casters.clone(),
        }
    }
}

#[derive(Clone)]
enum ServiceEntry {
    Value(Instance),
    Factory(FactoryFn),
}

impl Container {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            trait_mappings: DashMap::new(),
            casters: DashMap::new(),
        }
    }

    /// Map a singleton value, reachable by its concrete type.
    pub fn map<T: 'static + Send + Sync>(&self, instance: T) -> &Self {
        self.map_shared(Arc::new(instance))
    }

    /// Map an already shared singleton without re-wrapping it.
    pub fn map_shared<T: 'static + Send + Sync>(&self, instance: Arc<T>) -> &Self {
        tracing::trace!("map {}", std::any::type_name::<T>());
        self.services
            .insert(TypeId::of::<T>(), ServiceEntry::Value(instance));
        self
    }

    /// Provide a factory for `T`, invoked lazily on every resolution.
    pub fn provide<T, F>(&self, factory: F) -> &Self
    where
        T: 'static + Send + Sync,
        F: Fn(&Container) -> anyhow::Result<T> + 'static + Send + Sync,
    {
        tracing::trace!("provide {}", std::any::type_name::<T>());
        let factory: FactoryFn =
            Arc::new(move |container: &Container| Ok(Arc::new(factory(container)?) as Instance));
        self.services
            .insert(TypeId::of::<T>(), ServiceEntry::Factory(factory));
        self
    }

    /// Bind a trait to a concrete implementation
    ///
    /// This enables resolving `Arc<dyn Trait>` to the registered implementation.
    /// The implementation may be mapped before or after the binding.
    pub fn bind<Trait, Impl, F>(&self, caster_fn: F) -> &Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        Impl: 'static + Send + Sync,
        F: Fn(Arc<Impl>) -> Arc<Trait> + 'static + Send + Sync,
    {
        let trait_id = TypeId::of::<Trait>();
        let impl_id = TypeId::of::<Impl>();

        self.trait_mappings.insert(trait_id, impl_id);

        let caster: CasterFn = Arc::new(move |instance: Instance| {
            let concrete = instance.downcast::<Impl>().ok()?;
            let trait_obj: Arc<Trait> = caster_fn(concrete);
            Some(Arc::new(trait_obj) as Instance)
        });

        self.casters.insert(trait_id, caster);
        self
    }

    pub fn resolve<T: 'static + Send + Sync>(&self) -> Result<Arc<T>> {
        let instance = self.instance(TypeId::of::<T>(), std::any::type_name::<T>())?;
        instance
            .downcast::<T>()
            .map_err(|_| EnsembleError::DowncastFailed {
                type_name: std::any::type_name::<T>().to_string(),
            })
    }

    pub fn resolve_trait<T: ?Sized + 'static + Send + Sync>(&self) -> Result<Arc<T>> {
        let requested_type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();

        let caster = self
            .casters
            .get(&requested_type_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EnsembleError::DependencyNotFound {
                type_name: type_name.to_string(),
            })?;

        let impl_type_id = self
            .trait_mappings
            .get(&requested_type_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| EnsembleError::DependencyNotFound {
                type_name: format!("No implementation mapping found for trait '{}'", type_name),
            })?;

        let instance = self.instance(impl_type_id, type_name)?;

        // The caster returns an Arc<dyn Any> which holds an Arc<T>.
        let wrapper = caster(instance)
            .and_then(|cast| cast.downcast::<Arc<T>>().ok())
            .ok_or_else(|| EnsembleError::DowncastFailed {
                type_name: type_name.to_string(),
            })?;
        Ok(wrapper.as_ref().clone())
    }

    /// Invoke `f` with arguments resolved by type from the container.
    ///
    /// ```rust,ignore
    /// let port = container.invoke(|(conf, db): (Arc<Conf>, Option<Arc<Database>>)| {
    ///     conf.get_as::<u16>("base.port")
    /// })?;
    /// ```
    pub fn invoke<A, R, F>(&self, f: F) -> Result<R>
    where
        A: Resolvable,
        F: FnOnce(A) -> R,
    {
        let args = A::resolve_from(self)?;
        Ok(f(args))
    }

    pub fn contains<T: 'static>(&self) -> bool {
        let type_id = TypeId::of::<T>();
        self.services.contains_key(&type_id) || self.trait_mappings.contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    fn instance(&self, type_id: TypeId, type_name: &str) -> Result<Instance> {
        // The entry is cloned out so factories may resolve from the container.
        let entry = self
            .services
            .get(&type_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EnsembleError::DependencyNotFound {
                type_name: type_name.to_string(),
            })?;

        match entry {
            ServiceEntry::Value(instance) => Ok(instance),
            ServiceEntry::Factory(factory) => {
                factory(self).map_err(|e| EnsembleError::Factory {
                    type_name: type_name.to_string(),
                    message: format!("{:#}", e),
                })
            }
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("services", &self.services.len())
            .field("trait_mappings", &self.trait_mappings.len())
            .finish()
    }
}

/// Argument set that [`Container::invoke`] can produce from the container.
pub trait Resolvable: Sized {
    fn resolve_from(container: &Container) -> Result<Self>;
}

impl<T: 'static + Send + Sync> Resolvable for Arc<T> {
    fn resolve_from(container: &Container) -> Result<Self> {
        container.resolve::<T>()
    }
}

impl<T: 'static + Send + Sync> Resolvable for Option<Arc<T>> {
    fn resolve_from(container: &Container) -> Result<Self> {
        match container.resolve::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(EnsembleError::DependencyNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Resolvable for () {
    fn resolve_from(_container: &Container) -> Result<Self> {
        Ok(())
    }
}

macro_rules! impl_resolvable_tuple {
    ($($name:ident),+) => {
        impl<$($name: Resolvable),+> Resolvable for ($($name,)+) {
            fn resolve_from(container: &Container) -> Result<Self> {
                Ok(($($name::resolve_from(container)?,)+))
            }
        }
    };
}

impl_resolvable_tuple!(A);
impl_resolvable_tuple!(A, B);
impl_resolvable_tuple!(A, B, C);
impl_resolvable_tuple!(A, B, C, D);
impl_resolvable_tuple!(A, B, C, D, E);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestService {
        value: i32,
    }

    trait MyTrait: Send + Sync {
        fn get_value(&self) -> i32;
    }

    struct MyTraitImpl {
        value: i32,
    }

    impl MyTrait for MyTraitImpl {
        fn get_value(&self) -> i32 {
            self.value
        }
    }

    #[test]
    fn test_map_and_resolve() {
        let container = Container::new();
        container.map(TestService { value: 42 });
        let service = container.resolve::<TestService>().unwrap();
        assert_eq!(service.value, 42);
    }

    #[test]
    fn test_bind_and_resolve_trait() {
        let container = Container::new();
        container.map(MyTraitImpl { value: 99 });
        container.bind::<dyn MyTrait, MyTraitImpl, _>(|i| i as Arc<dyn MyTrait>);
        let trait_instance = container.resolve_trait::<dyn MyTrait>().unwrap();
        assert_eq!(trait_instance.get_value(), 99);
    }

    #[test]
    fn test_factory_invoked_per_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let container = Container::new();
        container.provide(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(TestService { value: n as i32 })
        });

        assert_eq!(container.resolve::<TestService>().unwrap().value, 0);
        assert_eq!(container.resolve::<TestService>().unwrap().value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_factory_can_resolve_dependencies() {
        let container = Container::new();
        container.map(7_u32);
        container.provide(|c| {
            let base = c.resolve::<u32>()?;
            Ok(TestService {
                value: *base as i32 * 6,
            })
        });
        assert_eq!(container.resolve::<TestService>().unwrap().value, 42);
    }

    #[test]
    fn test_factory_error_is_reported() {
        let container = Container::new();
        container.provide::<TestService, _>(|_| Err(anyhow::anyhow!("no database")));
        let err = container.resolve::<TestService>().unwrap_err();
        assert!(matches!(err, EnsembleError::Factory { .. }));
        assert!(err.to_string().contains("no database"));
    }

    #[test]
    fn test_invoke_resolves_arguments_by_type() {
        let container = Container::new();
        container.map(TestService { value: 5 });
        container.map(String::from("five"));

        let out = container
            .invoke(|(svc, label, missing): (Arc<TestService>, Arc<String>, Option<Arc<u8>>)| {
                assert!(missing.is_none());
                format!("{}={}", label, svc.value)
            })
            .unwrap();
        assert_eq!(out, "five=5");
    }

    #[test]
    fn test_invoke_fails_on_missing_dependency() {
        let container = Container::new();
        let err = container
            .invoke(|(_svc,): (Arc<TestService>,)| ())
            .unwrap_err();
        assert!(matches!(err, EnsembleError::DependencyNotFound { .. }));
    }
}
