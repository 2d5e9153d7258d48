//! Field injector.
//!
//! Wires the shared resources of an [`App`] into whichever capabilities a
//! unit exposes through [`Assign`]. Units without a capability are left
//! untouched; running the injector twice gives the same result as once.

use crate::unit::{App, Assign};
use std::sync::Arc;

/// Inject `app` into `target`, giving it a logger scoped with `prefix`.
///
/// The whole context goes in first so the scoped logger and the individual
/// resources always win over the snapshot.
pub fn inject<T>(target: &mut T, app: &App, prefix: &str)
where
    T: Assign + ?Sized,
{
    inject_context(target, app);
    inject_logger(target, app, prefix);
}

/// The app, container and configuration slots, without the logger.
pub fn inject_context<T>(target: &mut T, app: &App)
where
    T: Assign + ?Sized,
{
    if let Some(accepts) = target.as_accepts_app() {
        accepts.accept_app(app);
    }
    if let Some(accepts) = target.as_accepts_container() {
        accepts.accept_container(Arc::clone(&app.container));
    }
    if let Some(accepts) = target.as_accepts_config() {
        accepts.accept_config(Arc::clone(&app.conf));
    }
}

pub fn inject_logger<T>(target: &mut T, app: &App, prefix: &str)
where
    T: Assign + ?Sized,
{
    if let Some(accepts) = target.as_accepts_logger() {
        accepts.accept_logger(app.log.derive(prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Conf;
    use crate::di::Container;
    use crate::logging::Logger;
    use crate::unit::{Assign, Unit};
    use tracing::level_filters::LevelFilter;

    #[derive(Default)]
    struct Plain {
        hits: usize,
    }

    impl Assign for Plain {}

    #[derive(Default, crate::Assign)]
    struct Standalone {
        container: Arc<Container>,
        conf: Arc<Conf>,
        log: Logger,
        #[assign(skip)]
        spare: Option<Logger>,
    }

    #[derive(Default, crate::Assign)]
    struct Embedded {
        app: App,
    }

    impl Unit for Embedded {}

    fn bundle() -> App {
        App::new(
            Arc::new(Container::new()),
            Arc::new(Conf::new()),
            Logger::new("", LevelFilter::WARN),
        )
    }

    #[test]
    fn units_without_capabilities_are_untouched() {
        let mut plain = Plain { hits: 3 };
        inject(&mut plain, &bundle(), "[Module Plain] ");
        assert_eq!(plain.hits, 3);
    }

    #[test]
    fn standalone_fields_receive_resources() {
        let app = bundle();
        let mut unit = Standalone::default();
        inject(&mut unit, &app, "[Plugin Standalone] ");

        assert!(Arc::ptr_eq(&unit.container, &app.container));
        assert!(Arc::ptr_eq(&unit.conf, &app.conf));
        assert_eq!(unit.log.prefix(), "[Plugin Standalone] ");
        assert_eq!(unit.log.level(), LevelFilter::WARN);
        assert!(unit.spare.is_none());
    }

    #[test]
    fn embedded_app_gets_scoped_logger() {
        let app = bundle();
        let mut unit = Embedded::default();
        inject(&mut unit, &app, "[Module Embedded] ");

        assert!(Arc::ptr_eq(&unit.app.container, &app.container));
        assert!(Arc::ptr_eq(&unit.app.conf, &app.conf));
        assert_eq!(unit.app.log.prefix(), "[Module Embedded] ");
        assert_eq!(unit.app.log.level(), app.log.level());
        assert_eq!(app.log.prefix(), "");
    }

    #[test]
    fn injection_is_idempotent() {
        let app = bundle();
        let mut unit = Embedded::default();
        inject(&mut unit, &app, "[Module Embedded] ");
        let first = (
            Arc::as_ptr(&unit.app.container),
            Arc::as_ptr(&unit.app.conf),
            unit.app.log.prefix().to_string(),
        );

        inject(&mut unit, &app, "[Module Embedded] ");
        assert_eq!(Arc::as_ptr(&unit.app.container), first.0);
        assert_eq!(Arc::as_ptr(&unit.app.conf), first.1);
        assert_eq!(unit.app.log.prefix(), first.2);
    }

    #[test]
    fn works_through_trait_objects() {
        let app = bundle();
        let mut boxed: Box<dyn Unit> = Box::new(Embedded::default());
        inject(boxed.as_mut(), &app, "[Module Boxed] ");
        assert!(boxed.as_accepts_logger().is_some());
    }
}
