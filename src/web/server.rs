use super::{Route, RouteBinder, WebState, mount_path};
use crate::error::{EnsembleError, Result};
use crate::lifecycle::panic_message;
use axum::Router;
use parking_lot::Mutex;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};

/// Accumulates bound routes into one axum router and serves it.
#[derive(Default)]
pub struct Web {
    router: Mutex<Router<WebState>>,
    mounts: Mutex<Vec<String>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Web {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount points bound so far, `/` for routes merged at the root.
    pub fn mounts(&self) -> Vec<String> {
        self.mounts.lock().clone()
    }

    /// The address currently being served, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// The accumulated router with its state applied.
    pub fn into_router(&self, state: WebState) -> Router {
        self.router.lock().clone().with_state(state)
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve<F>(&self, state: WebState, addr: &str, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (_addr_tx, addr_rx) = watch::channel(addr.to_string());
        self.serve_rebinding(state, addr_rx, shutdown).await
    }

    /// Serve until `shutdown` resolves, restarting on the new address
    /// whenever `addr` changes.
    ///
    /// In-flight requests are drained before each restart. When the new
    /// address cannot be bound the server stays on the previous one.
    pub async fn serve_rebinding<F>(
        &self,
        state: WebState,
        mut addr: watch::Receiver<String>,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.into_router(state);
        tokio::pin!(shutdown);
        let mut serving: Option<SocketAddr> = None;

        loop {
            let wanted = addr.borrow_and_update().clone();
            let listener = match (TcpListener::bind(wanted.as_str()).await, serving) {
                (Ok(listener), _) => listener,
                (Err(e), Some(previous)) => {
                    tracing::error!("failed to bind {}: {}, staying on {}", wanted, e, previous);
                    TcpListener::bind(previous).await?
                }
                (Err(e), None) => return Err(e.into()),
            };
            let bound = listener.local_addr()?;
            serving = Some(bound);
            *self.local_addr.lock() = Some(bound);
            tracing::info!("HTTP server listening on {}", bound);

            let (stop_tx, stop_rx) = oneshot::channel::<()>();
            let server = axum::serve(listener, router.clone())
                .with_graceful_shutdown(async move {
                    stop_rx.await.ok();
                })
                .into_future();
            tokio::pin!(server);

            let restart = tokio::select! {
                served = &mut server => {
                    *self.local_addr.lock() = None;
                    served?;
                    return Ok(());
                }
                _ = &mut shutdown => false,
                Ok(()) = addr.changed() => true,
            };

            stop_tx.send(()).ok();
            let served = server.await;
            *self.local_addr.lock() = None;
            served?;

            if !restart {
                break;
            }
            tracing::info!("HTTP server restarting on {}", addr.borrow().as_str());
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

impl RouteBinder for Web {
    fn bind(&self, namespace: &str, route: Route) -> Result<()> {
        let mount = mount_path(namespace, route.path.as_deref());
        let mut router = self.router.lock();
        let current = router.clone();

        // axum panics on overlapping or malformed routes
        let merged = catch_unwind(AssertUnwindSafe(|| match &mount {
            Some(path) => current.nest(path, route.router),
            None => current.merge(route.router),
        }))
        .map_err(|payload| EnsembleError::Route {
            namespace: namespace.to_string(),
            message: panic_message(&*payload),
        })?;

        *router = merged;
        let mount = mount.unwrap_or_else(|| "/".to_string());
        tracing::debug!("bound routes of {} at {}", namespace, mount);
        self.mounts.lock().push(mount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Conf;
    use crate::di::{Container, Inject};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> WebState {
        let container = Arc::new(Container::new());
        container.map(String::from("pong"));
        WebState::new(container, Arc::new(Conf::new()))
    }

    async fn body_text(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn routes_are_nested_under_namespace() {
        let web = Web::new();
        let ping = Router::new().route(
            "/ping",
            get(|Inject(reply): Inject<String>| async move { reply.to_string() }),
        );
        web.bind("HealthCheck", Route::new(ping)).unwrap();
        web.bind("Index", Route::new(Router::new().route("/", get(|| async { "home" }))))
            .unwrap();
        assert_eq!(web.mounts(), vec!["/health_check".to_string(), "/".to_string()]);

        let (status, body) = body_text(web.into_router(state()), "/health_check/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "pong");

        let (status, body) = body_text(web.into_router(state()), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "home");
    }

    #[tokio::test]
    async fn conflicting_routes_are_reported() {
        let web = Web::new();
        let route = || Route::nested("/", Router::new().route("/dup", get(|| async { "a" })));
        web.bind("First", route()).unwrap();

        let err = web.bind("Second", route()).unwrap_err();
        assert!(matches!(err, EnsembleError::Route { ref namespace, .. } if namespace == "Second"));

        let (status, _) = body_text(web.into_router(state()), "/dup").await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn wait_for_addr(
        web: &Web,
        accept: impl Fn(SocketAddr) -> bool,
    ) -> Option<SocketAddr> {
        for _ in 0..500 {
            if let Some(addr) = web.local_addr().filter(|addr| accept(*addr)) {
                return Some(addr);
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        None
    }

    fn free_addr() -> SocketAddr {
        std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .expect("free port")
    }

    #[tokio::test]
    async fn address_changes_restart_the_server() {
        let web = Arc::new(Web::new());
        web.bind("Index", Route::new(Router::new().route("/", get(|| async { "home" }))))
            .unwrap();
        let (addr_tx, addr_rx) = watch::channel("127.0.0.1:0".to_string());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let serving = {
            let web = Arc::clone(&web);
            tokio::spawn(async move {
                web.serve_rebinding(state(), addr_rx, async move {
                    stop_rx.await.ok();
                })
                .await
            })
        };

        let first = wait_for_addr(&web, |_| true).await.expect("server bound");
        let free = free_addr();
        addr_tx.send(free.to_string()).unwrap();
        let second = wait_for_addr(&web, |addr| addr == free)
            .await
            .expect("server rebound");
        assert_ne!(first, second);
        tokio::net::TcpStream::connect(second)
            .await
            .expect("new address accepts connections");

        stop_tx.send(()).unwrap();
        serving.await.unwrap().unwrap();
        assert!(web.local_addr().is_none());
    }
}
