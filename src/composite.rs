//! Composite unit.
//!
//! [`Multiple`] holds a named registry of child units and presents them as a
//! single unit: every lifecycle call fans out to the children in insertion
//! order and their tasks and routes are concatenated.
//!
//! ```rust,ignore
//! let mut plugins = Multiple::new();
//! plugins.add("mailer", Mailer::default());
//! plugins.add("billing", Billing::default());
//!
//! Application::builder().plugin(plugins).build()?;
//! ```

use crate::di::Container;
use crate::inject::inject;
use crate::task::Task;
use crate::unit::{App, Provided, Reload, Unit};
use crate::web::Route;
use anyhow::Context;
use std::sync::Arc;

#[derive(Default, crate::Assign)]
pub struct Multiple {
    app: App,
    #[assign(skip)]
    children: Vec<(String, Box<dyn Unit>)>,
    #[assign(skip)]
    loaded: bool,
}

impl Multiple {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add`](Self::add).
    pub fn with<U: Unit>(mut self, name: impl Into<String>, unit: U) -> Self {
        self.add(name, unit);
        self
    }

    /// Add a child. A name already present is rejected with a warning, and so
    /// is any addition once the composite has loaded.
    pub fn add<U: Unit>(&mut self, name: impl Into<String>, unit: U) -> bool {
        self.add_boxed(name, Box::new(unit))
    }

    pub fn add_boxed(&mut self, name: impl Into<String>, unit: Box<dyn Unit>) -> bool {
        let name = name.into();
        if self.loaded {
            self.app
                .log
                .warn(format!("{} added after load, ignoring it", name));
            return false;
        }
        if self.contains(&name) {
            self.app.log.warn(format!(
                "{} is already registered, please check for duplicate names",
                name
            ));
            return false;
        }
        self.children.push((name, unit));
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.children.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Unit> {
        self.children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, unit)| unit.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Unit + 'static)> {
        self.children
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, unit)| unit.as_mut())
    }

    /// Registry names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.children.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn label(name: &str, child: &dyn Unit) -> String {
        let reported = child.name();
        if reported.is_empty() {
            name.to_string()
        } else {
            reported
        }
    }
}

impl Unit for Multiple {
    /// `Multiple [a, b]` from the children that report a name, empty otherwise.
    fn name(&self) -> String {
        let names: Vec<String> = self
            .children
            .iter()
            .map(|(_, child)| child.name())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            String::new()
        } else {
            format!("Multiple [{}]", names.join(", "))
        }
    }

    fn tasks(&self) -> Vec<Task> {
        self.children
            .iter()
            .flat_map(|(_, child)| child.tasks())
            .collect()
    }

    fn routes(&self) -> Vec<Route> {
        self.children
            .iter()
            .flat_map(|(_, child)| child.routes())
            .collect()
    }

    fn load(&mut self, container: &Arc<Container>) -> anyhow::Result<Option<Provided>> {
        self.loaded = true;
        let shared = App::new(
            Arc::clone(container),
            Arc::clone(&self.app.conf),
            self.app.log.clone(),
        );
        let scope = self.app.log.prefix().to_string();
        for (name, child) in &mut self.children {
            inject(child.as_mut(), &shared, &format!("{}[{}] ", scope, name));
        }

        for (name, child) in &mut self.children {
            let provided = child
                .load(container)
                .with_context(|| format!("{} failed to load", Self::label(name, child.as_ref())))?;
            if let Some(provided) = provided {
                provided.publish(container);
            }
        }
        Ok(None)
    }

    fn start(&mut self, container: &Arc<Container>) -> anyhow::Result<()> {
        for (name, child) in &mut self.children {
            child
                .start(container)
                .with_context(|| format!("{} failed to start", Self::label(name, child.as_ref())))?;
        }
        Ok(())
    }

    fn finalize(&mut self, container: &Arc<Container>) -> anyhow::Result<()> {
        for (name, child) in &mut self.children {
            child.finalize(container).with_context(|| {
                format!("{} failed to finalize", Self::label(name, child.as_ref()))
            })?;
        }
        Ok(())
    }

    /// Stops every child in reverse order and reports the first failure.
    fn stop(&mut self, container: &Arc<Container>) -> anyhow::Result<()> {
        let mut first = None;
        for (name, child) in self.children.iter_mut().rev() {
            if let Err(e) = child.stop(container) {
                let label = Self::label(name, child.as_ref());
                self.app.log.error(format!("{} failed to stop: {:#}", label, e));
                first.get_or_insert(e.context(format!("{} failed to stop", label)));
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn as_reload(&mut self) -> Option<&mut dyn Reload> {
        let any = self
            .children
            .iter_mut()
            .any(|(_, child)| child.as_reload().is_some());
        if any { Some(self) } else { None }
    }
}

impl Reload for Multiple {
    /// Every reloadable child is called; the first failure is reported.
    fn reload(&mut self, container: &Arc<Container>) -> anyhow::Result<()> {
        let mut first = None;
        for (name, child) in &mut self.children {
            let label = Self::label(name, child.as_ref());
            let Some(reload) = child.as_reload() else {
                continue;
            };
            if let Err(e) = reload.reload(container) {
                self.app.log.error(format!("{} failed to reload: {:#}", label, e));
                first.get_or_insert(e.context(format!("{} failed to reload", label)));
            }
        }
        first.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Conf;
    use crate::logging::Logger;
    use crate::unit::{Assign, LifeCycle, UnitService};
    use parking_lot::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    fn child(name: &'static str, journal: &Journal) -> LifeCycle {
        let (load, start, finalize) = (journal.clone(), journal.clone(), journal.clone());
        LifeCycle::named(name)
            .on_load(move |_| {
                load.lock().push(format!("{name}:load"));
                Ok(None)
            })
            .on_start(move |_| {
                start.lock().push(format!("{name}:start"));
                Ok(())
            })
            .on_finalize(move |_| {
                finalize.lock().push(format!("{name}:finalize"));
                Ok(())
            })
    }

    #[test]
    fn name_lists_children() {
        let journal = Journal::default();
        let multiple = Multiple::new()
            .with("x", child("x", &journal))
            .with("y", child("y", &journal));
        assert_eq!(multiple.name(), "Multiple [x, y]");

        let anonymous = Multiple::new().with("quiet", LifeCycle::new());
        assert_eq!(anonymous.name(), "");
        assert_eq!(Multiple::new().name(), "");
    }

    #[test]
    fn duplicates_are_rejected() {
        let journal = Journal::default();
        let mut multiple = Multiple::new();
        assert!(multiple.add("x", child("x", &journal)));
        assert!(!multiple.add("x", child("other", &journal)));
        assert_eq!(multiple.names(), vec!["x"]);
        assert_eq!(multiple.get("x").map(|c| c.name()), Some("x".to_string()));
    }

    #[test]
    fn tasks_are_concatenated_in_child_order() {
        let with_tasks = |names: &[&'static str]| {
            LifeCycle::new().service(UnitService {
                tasks: names
                    .iter()
                    .map(|n| Task::new(*n, "0 0 * * * *", || {}))
                    .collect(),
                routes: Vec::new(),
            })
        };
        let multiple = Multiple::new()
            .with("x", with_tasks(&["a", "b"]))
            .with("y", with_tasks(&["c"]));

        let names: Vec<String> = multiple.tasks().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn load_publishes_child_values_and_injects_children() {
        #[derive(Default, crate::Assign)]
        struct Needy {
            container: Arc<Container>,
            log: Logger,
        }
        impl Unit for Needy {
            fn name(&self) -> String {
                "Needy".into()
            }
            fn load(&mut self, _: &Arc<Container>) -> anyhow::Result<Option<Provided>> {
                Ok(Some(Provided::value(self.log.prefix().to_string())))
            }
        }

        let container = Arc::new(Container::new());
        let mut multiple = Multiple::new().with("needy", Needy::default());
        inject(
            &mut multiple,
            &App::new(Arc::clone(&container), Arc::new(Conf::new()), Logger::default()),
            "[Plugin Multiple] ",
        );

        assert!(multiple.load(&container).unwrap().is_none());
        assert_eq!(
            container.resolve::<String>().unwrap().as_str(),
            "[Plugin Multiple] [needy] "
        );
        assert!(!multiple.add("late", LifeCycle::new()));
    }

    #[test]
    fn first_failure_stops_the_fan_out() {
        let journal = Journal::default();
        let mut multiple = Multiple::new()
            .with("x", child("x", &journal).on_start(|_| anyhow::bail!("port taken")))
            .with("y", child("y", &journal));
        let container = Arc::new(Container::new());

        multiple.load(&container).unwrap();
        let err = multiple.start(&container).unwrap_err();

        assert_eq!(format!("{:#}", err), "x failed to start: port taken");
        assert_eq!(*journal.lock(), vec!["x:load", "y:load"]);
    }

    #[test]
    fn load_and_finalize_stop_at_the_first_failure() {
        let journal = Journal::default();
        let container = Arc::new(Container::new());

        let mut loading = Multiple::new()
            .with("x", child("x", &journal).on_load(|_| anyhow::bail!("no disk")))
            .with("y", child("y", &journal));
        let err = loading.load(&container).unwrap_err();
        assert_eq!(format!("{:#}", err), "x failed to load: no disk");
        assert!(journal.lock().is_empty());

        let mut finalizing = Multiple::new()
            .with("x", child("x", &journal).on_finalize(|_| anyhow::bail!("flush failed")))
            .with("y", child("y", &journal));
        finalizing.load(&container).unwrap();
        finalizing.start(&container).unwrap();
        let err = finalizing.finalize(&container).unwrap_err();
        assert_eq!(format!("{:#}", err), "x failed to finalize: flush failed");
        assert_eq!(
            *journal.lock(),
            vec!["x:load", "y:load", "x:start", "y:start"]
        );
    }

    #[test]
    fn reload_reaches_reloadable_children_only() {
        struct Watcher(Journal);
        impl Assign for Watcher {}
        impl Unit for Watcher {
            fn as_reload(&mut self) -> Option<&mut dyn Reload> {
                Some(self)
            }
        }
        impl Reload for Watcher {
            fn reload(&mut self, _: &Arc<Container>) -> anyhow::Result<()> {
                self.0.lock().push("reload".into());
                Ok(())
            }
        }

        let journal = Journal::default();
        let mut plain = Multiple::new().with("x", LifeCycle::new());
        assert!(plain.as_reload().is_none());

        let mut multiple = Multiple::new()
            .with("x", LifeCycle::new())
            .with("w", Watcher(journal.clone()));
        let container = Arc::new(Container::new());
        multiple
            .as_reload()
            .expect("reloadable")
            .reload(&container)
            .unwrap();
        assert_eq!(*journal.lock(), vec!["reload"]);
    }
}
