//! The shared application: one route table served by every listener.
//!
//! Routes live in an axum [`Router`] guarded by a lock. Each incoming request
//! dispatches through a clone of the router as it is at that moment, so a
//! route added while listeners are serving is visible to the next request on
//! any port.

use axum::extract::Request;
use axum::handler::Handler;
use axum::http::Method;
use axum::response::Response;
use axum::routing::{on, MethodFilter};
use axum::{Extension, Router};
use portfleet_common::{Result, ServerError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tower::ServiceExt;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Extra route metadata.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Human-readable route name
    pub name: Option<String>,
    /// Short description shown in route listings
    pub summary: Option<String>,
}

impl RouteOptions {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// A registered route, as reported by [`Application::routes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub path: String,
    pub methods: Vec<Method>,
    pub name: Option<String>,
    pub summary: Option<String>,
}

/// Identity of the listener serving a request.
///
/// Inserted as a request extension, so handlers can take
/// `Extension<ListenerContext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerContext {
    pub host: String,
    pub port: u16,
}

#[derive(Default)]
struct RouteTable {
    router: Router,
    routes: Vec<RouteInfo>,
}

/// Shared route table plus handler bindings.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct Application {
    title: Arc<str>,
    table: Arc<RwLock<RouteTable>>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("title", &self.title)
            .field("routes", &self.routes().len())
            .finish()
    }
}

impl Application {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Arc::from(title.into()),
            table: Arc::new(RwLock::new(RouteTable::default())),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Register `handler` at `path` for `methods`. An empty method list
    /// means `GET`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Route`] when the path is malformed or one of the
    /// methods is already bound at that path.
    pub fn add_route<H, T>(
        &self,
        path: &str,
        handler: H,
        methods: &[Method],
        options: RouteOptions,
    ) -> Result<()>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        validate_path(path)?;

        let methods = if methods.is_empty() {
            vec![Method::GET]
        } else {
            dedup_methods(methods)
        };
        let filter = method_filter(&methods)?;

        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(taken) = table
            .routes
            .iter()
            .filter(|r| r.path == path)
            .flat_map(|r| r.methods.iter())
            .find(|m| methods.contains(m))
        {
            return Err(ServerError::Route(format!(
                "{taken} {path} is already registered"
            )));
        }

        let current = table.router.clone();
        let router = catch_unwind(AssertUnwindSafe(move || current.route(path, on(filter, handler))))
            .map_err(|_| ServerError::Route(format!("router rejected path {path}")))?;

        table.router = router;
        table.routes.push(RouteInfo {
            path: path.to_string(),
            methods: methods.clone(),
            name: options.name,
            summary: options.summary,
        });
        drop(table);

        info!(path, ?methods, "Route added");
        Ok(())
    }

    /// Routes registered so far, in registration order.
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .routes
            .clone()
    }

    fn snapshot(&self) -> Router {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .router
            .clone()
    }

    /// Route one request through the current table.
    pub async fn dispatch(&self, req: Request) -> Response {
        let router = self.snapshot();
        debug!(method = %req.method(), uri = %req.uri(), "Dispatching request");
        match router.oneshot(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }

    /// The router a single listener serves: a fallback that re-reads the
    /// shared table on every request.
    pub(crate) fn listener_router(&self, context: ListenerContext) -> Router {
        let app = self.clone();
        Router::new()
            .fallback(move |req: Request| {
                let app = app.clone();
                async move { app.dispatch(req).await }
            })
            .layer(Extension(context))
            .layer(TraceLayer::new_for_http())
    }
}

fn validate_path(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(ServerError::Route(format!("path must start with '/': {path:?}")));
    }
    if path
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return Err(ServerError::Route(format!(
            "use `{{param}}` captures instead of `:param` or `*rest`: {path}"
        )));
    }
    Ok(())
}

fn dedup_methods(methods: &[Method]) -> Vec<Method> {
    let mut out: Vec<Method> = Vec::with_capacity(methods.len());
    for m in methods {
        if !out.contains(m) {
            out.push(m.clone());
        }
    }
    out
}

fn method_filter(methods: &[Method]) -> Result<MethodFilter> {
    let mut filters = methods.iter().map(|m| {
        MethodFilter::try_from(m.clone())
            .map_err(|_| ServerError::Route(format!("unsupported method: {m}")))
    });
    // `methods` is never empty here
    let first = filters
        .next()
        .ok_or_else(|| ServerError::Route("no methods given".into()))??;
    filters.try_fold(first, |acc, f| Ok(acc.or(f?)))
}

/// Parse method names such as `"get"` or `"POST"`.
pub fn parse_methods<S: AsRef<str>>(names: &[S]) -> Result<Vec<Method>> {
    names
        .iter()
        .map(|name| {
            let name = name.as_ref().trim().to_ascii_uppercase();
            Method::from_bytes(name.as_bytes())
                .map_err(|_| ServerError::Route(format!("invalid method: {name}")))
        })
        .collect()
}
