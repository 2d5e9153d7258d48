use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConfigEventKind {
    /// The source content was rewritten.
    Write,
    Other,
}

/// Change notification from the configuration source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEvent {
    pub kind: ConfigEventKind,
    pub path: Option<PathBuf>,
}

impl ConfigEvent {
    pub fn write() -> Self {
        Self {
            kind: ConfigEventKind::Write,
            path: None,
        }
    }

    pub fn other() -> Self {
        Self {
            kind: ConfigEventKind::Other,
            path: None,
        }
    }

    pub fn is_write(&self) -> bool {
        self.kind == ConfigEventKind::Write
    }
}
