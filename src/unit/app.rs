use crate::config::Conf;
use crate::di::Container;
use crate::logging::Logger;
use std::sync::Arc;

/// The application context: resource container, configuration and logger.
///
/// Created once per process by [`ApplicationBuilder`](crate::lifecycle::ApplicationBuilder)
/// and handed to every unit by the field injector. Units embed it as a field
/// to get uniform access to shared resources; the default value holds fresh,
/// empty resources until the orchestrator overwrites it.
#[derive(Clone, Debug, Default)]
pub struct App {
    pub container: Arc<Container>,
    pub conf: Arc<Conf>,
    pub log: Logger,
}

impl App {
    pub fn new(container: Arc<Container>, conf: Arc<Conf>, log: Logger) -> Self {
        Self {
            container,
            conf,
            log,
        }
    }
}
