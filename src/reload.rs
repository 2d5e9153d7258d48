//! Reload notifier.
//!
//! Redistributes configuration changes to the units that asked for them.
//! A single compare-and-swap flag guards the notification pass: an event
//! arriving while a pass is running is dropped.

use crate::config::{Conf, ConfigEvent};
use crate::di::Container;
use crate::error::{EnsembleError, Result};
use crate::lifecycle::{Phase, panic_message};
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub type ReloadCallback = Arc<dyn Fn(&Arc<Container>) -> anyhow::Result<()> + Send + Sync>;

pub struct ReloadNotifier {
    conf: Arc<Conf>,
    container: Arc<Container>,
    busy: AtomicBool,
    watching: AtomicBool,
    watch_file: bool,
    callbacks: Mutex<Vec<(String, ReloadCallback)>>,
}

impl ReloadNotifier {
    pub fn new(conf: Arc<Conf>, container: Arc<Container>) -> Self {
        Self {
            conf,
            container,
            busy: AtomicBool::new(false),
            watching: AtomicBool::new(false),
            watch_file: true,
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Whether [`watch`](Self::watch) also starts a file watcher on the
    /// configuration source. Subscriptions to emitted events are kept either way.
    pub fn watch_file(mut self, enabled: bool) -> Self {
        self.watch_file = enabled;
        self
    }

    /// Append a callback; callbacks run in registration order.
    pub fn register<F>(&self, unit: impl Into<String>, callback: F)
    where
        F: Fn(&Arc<Container>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let unit = unit.into();
        tracing::debug!("reload callback registered for {}", unit);
        self.callbacks.lock().push((unit, Arc::new(callback)));
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Units with a registered callback, in registration order.
    pub fn units(&self) -> Vec<String> {
        self.callbacks
            .lock()
            .iter()
            .map(|(unit, _)| unit.clone())
            .collect()
    }

    /// Handle one change event.
    ///
    /// Returns `true` when a notification pass ran. Events other than writes
    /// and events arriving while a pass is in progress are ignored.
    pub fn handle(&self, event: &ConfigEvent) -> bool {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("reload already in progress, dropping {} event", event.kind);
            return false;
        }

        let ran = event.is_write();
        if ran {
            self.run_pass();
        }

        self.busy.store(false, Ordering::Release);
        ran
    }

    /// Run a pass as if the source had been rewritten.
    pub fn notify(&self) -> bool {
        self.handle(&ConfigEvent::write())
    }

    /// Subscribe to configuration changes. Only the first call subscribes.
    pub fn watch(self: &Arc<Self>) -> Result<bool> {
        if self.watching.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        let weak = Arc::downgrade(self);
        self.conf.on_change(move |event| {
            if let Some(notifier) = weak.upgrade() {
                notifier.handle(event);
            }
        });

        match self.conf.path() {
            Some(path) if self.watch_file && path.exists() => self.conf.watch()?,
            Some(path) if self.watch_file => {
                tracing::debug!("{} does not exist, not watching it", path.display())
            }
            _ => {}
        }
        Ok(true)
    }

    fn run_pass(&self) {
        self.conf.auto_unmarshal();

        let callbacks = self.callbacks.lock().clone();
        tracing::info!("configuration changed, notifying {} unit(s)", callbacks.len());
        for (unit, callback) in callbacks {
            let failure = match catch_unwind(AssertUnwindSafe(|| callback(&self.container))) {
                Ok(Ok(())) => continue,
                Ok(Err(source)) => EnsembleError::Reload { unit, source },
                Err(payload) => EnsembleError::Fault {
                    unit,
                    phase: Phase::Reload,
                    message: panic_message(&*payload),
                },
            };
            tracing::error!("{}", failure);
        }
    }
}

impl std::fmt::Debug for ReloadNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadNotifier")
            .field("callbacks", &self.units())
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .field("watching", &self.watching.load(Ordering::Relaxed))
            .finish()
    }
}
