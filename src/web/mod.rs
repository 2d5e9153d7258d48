//! Route declarations and the axum-backed binder.
//!
//! A unit declares [`Route`]s. After the unit has started, the orchestrator
//! binds them through a [`RouteBinder`] under the unit's resolved name.

mod server;

pub use server::Web;

use crate::config::Conf;
use crate::di::{Container, HasContainer};
use crate::error::Result;
use axum::Router;
use std::sync::Arc;

/// State shared by every bound route.
#[derive(Clone)]
pub struct WebState {
    pub container: Arc<Container>,
    pub conf: Arc<Conf>,
}

impl WebState {
    pub fn new(container: Arc<Container>, conf: Arc<Conf>) -> Self {
        Self { container, conf }
    }
}

impl HasContainer for WebState {
    fn get_container(&self) -> &Container {
        &self.container
    }
}

/// A router declared by a unit.
///
/// Without an explicit path the binder derives one from the namespace the
/// route is bound under.
#[derive(Clone)]
pub struct Route {
    pub path: Option<String>,
    pub router: Router<WebState>,
}

impl Route {
    pub fn new(router: Router<WebState>) -> Self {
        Self { path: None, router }
    }

    /// A router mounted at a fixed path. `"/"` or `""` merges it at the root.
    pub fn nested(path: impl Into<String>, router: Router<WebState>) -> Self {
        Self {
            path: Some(path.into()),
            router,
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route").field("path", &self.path).finish()
    }
}

/// Accepts declared routes under a namespace.
pub trait RouteBinder: Send + Sync {
    fn bind(&self, namespace: &str, route: Route) -> Result<()>;
}

/// Mount point for a route: the explicit path when given, otherwise the
/// namespace in snake_case. A trailing `index` segment maps to the root.
///
/// Returns `None` for the root.
pub fn mount_path(namespace: &str, explicit: Option<&str>) -> Option<String> {
    let raw = match explicit {
        Some(path) => path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/"),
        None => {
            let ident: String = namespace
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            let snake = snake_case(&ident);
            match snake.strip_suffix("index") {
                Some(rest) if rest.is_empty() || rest.ends_with('_') => {
                    rest.trim_end_matches('_').to_string()
                }
                _ => snake,
            }
        }
    };

    if raw.is_empty() {
        None
    } else {
        Some(format!("/{}", raw))
    }
}

fn snake_case(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    let chars: Vec<char> = ident.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_ascii_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_ascii_uppercase();
            if prev_lower || (prev_upper && next_lower) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(*c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_becomes_snake_case_path() {
        assert_eq!(mount_path("UserAdmin", None).as_deref(), Some("/user_admin"));
        assert_eq!(mount_path("HTTPProxy", None).as_deref(), Some("/http_proxy"));
        assert_eq!(mount_path("Multiple [a, b]", None).as_deref(), Some("/multiple"));
    }

    #[test]
    fn index_maps_to_root() {
        assert_eq!(mount_path("Index", None), None);
        assert_eq!(mount_path("AdminIndex", None).as_deref(), Some("/admin"));
        assert_eq!(mount_path("Reindex", None).as_deref(), Some("/reindex"));
    }

    #[test]
    fn explicit_path_wins() {
        assert_eq!(mount_path("Users", Some("/api/v1/")).as_deref(), Some("/api/v1"));
        assert_eq!(mount_path("Users", Some("/")), None);
        assert_eq!(mount_path("Users", Some("")), None);
    }
}
