//! Engine backed by a directory of pre-rendered pages.
//!
//! A dist directory holds `index.html`, the original document served when a
//! resilient render fails, and `routes.toml`, which lists the URL paths the
//! engine answers for:
//!
//! ```toml
//! [[routes]]
//! path = "/"
//! page = "pages/index.html"
//! headers = [["Cache-Control", "no-cache"]]
//!
//! [[routes]]
//! path = "/broken"
//! fail = "Rejected on purpose"
//!
//! [[routes]]
//! path = "/redirecting"
//! abort = true
//! ```
//!
//! Lookup is exact; anything not listed is reported as unrecognized so the
//! next handler in the pipeline can take over.

use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_stream::try_stream;
use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use futures::Stream;
use serde::Deserialize;
use thiserror::Error;
use tokio::{io::AsyncReadExt, sync::RwLock};
use tracing::{debug, info, warn};

use super::{
    engine::RenderEngine,
    error::{RenderError, RenderFailure},
    types::{BodyError, RenderBody, RenderRequest, RenderResult},
};

const SHELL_FILE: &str = "index.html";
const MANIFEST_FILE: &str = "routes.toml";
const PAGE_CHUNK_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Serve the original document instead of failing when a render fails.
    pub resilient: bool,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid route manifest `{}`: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid route `{route}`: {reason}")]
    Route { route: String, reason: String },
}

impl EngineError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn route(route: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Route {
            route: route.into(),
            reason: reason.into(),
        }
    }
}

/// Renders routes out of a dist directory. Cheap to share behind an `Arc`;
/// [`DistEngine::reload`] swaps the directory for subsequent visits.
pub struct DistEngine {
    options: EngineOptions,
    app: RwLock<Arc<DistApp>>,
}

impl DistEngine {
    pub fn open(dist_path: impl AsRef<Path>, options: EngineOptions) -> Result<Self, EngineError> {
        let app = DistApp::load(dist_path.as_ref())?;
        info!(
            dist_path = %app.root.display(),
            routes = app.routes.len(),
            resilient = options.resilient,
            "render engine loaded"
        );
        Ok(Self {
            options,
            app: RwLock::new(Arc::new(app)),
        })
    }

    /// Load another dist directory and serve it from now on.
    ///
    /// Visits already in flight finish against the previous directory. On
    /// error the current directory stays in place.
    pub async fn reload(&self, dist_path: impl AsRef<Path>) -> Result<(), EngineError> {
        let app = DistApp::load(dist_path.as_ref())?;
        info!(
            dist_path = %app.root.display(),
            routes = app.routes.len(),
            "render engine reloaded"
        );
        *self.app.write().await = Arc::new(app);
        Ok(())
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub async fn dist_path(&self) -> PathBuf {
        self.app.read().await.root.clone()
    }
}

#[async_trait]
impl RenderEngine for DistEngine {
    async fn visit(&self, request: RenderRequest) -> Result<RenderResult, RenderError> {
        let app = Arc::clone(&*self.app.read().await);
        let route = normalize_route(request.route());

        let Some(entry) = app.routes.get(route) else {
            debug!(route, "no route entry");
            return Err(RenderError::unrecognized(request.path()));
        };

        match &entry.action {
            RouteAction::Abort => Err(RenderError::aborted(request.path())),
            RouteAction::Fail(message) => {
                let failure = RenderFailure::new(message.clone())
                    .with_name("Error")
                    .with_stack(format!("Error: {message}\n    at render ({route})"));
                if self.options.resilient {
                    warn!(route, error = %failure, "render failed, serving original document");
                    Ok(RenderResult::ok(RenderBody::text(app.shell.clone())).with_fallback(failure))
                } else {
                    Err(RenderError::failed(failure))
                }
            }
            RouteAction::Page(file) => Ok(RenderResult {
                status: entry.status,
                headers: entry.headers.clone(),
                body: RenderBody::stream(page_chunks(file.clone())),
                fallback: None,
            }),
        }
    }
}

fn normalize_route(route: &str) -> &str {
    let trimmed = route.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

fn page_chunks(path: PathBuf) -> impl Stream<Item = Result<Bytes, BodyError>> + Send + 'static {
    try_stream! {
        let mut file = tokio::fs::File::open(&path).await?;
        let mut buffer = vec![0u8; PAGE_CHUNK_BYTES];
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buffer[..read]);
        }
    }
}

struct DistApp {
    root: PathBuf,
    shell: String,
    routes: HashMap<String, Route>,
}

struct Route {
    status: StatusCode,
    headers: Vec<(String, String)>,
    action: RouteAction,
}

enum RouteAction {
    Page(PathBuf),
    Fail(String),
    Abort,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    routes: Vec<RawRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRoute {
    path: String,
    page: Option<PathBuf>,
    fail: Option<String>,
    #[serde(default)]
    abort: bool,
    status: Option<u16>,
    #[serde(default)]
    headers: Vec<(String, String)>,
}

impl DistApp {
    fn load(root: &Path) -> Result<Self, EngineError> {
        let shell_path = root.join(SHELL_FILE);
        let shell = std::fs::read_to_string(&shell_path)
            .map_err(|err| EngineError::io(&shell_path, err))?;

        let manifest_path = root.join(MANIFEST_FILE);
        let manifest = std::fs::read_to_string(&manifest_path)
            .map_err(|err| EngineError::io(&manifest_path, err))?;
        let manifest: RawManifest =
            toml::from_str(&manifest).map_err(|source| EngineError::Manifest {
                path: manifest_path.clone(),
                source,
            })?;

        let mut routes = HashMap::with_capacity(manifest.routes.len());
        for raw in manifest.routes {
            let path = raw.path.clone();
            if !path.starts_with('/') {
                return Err(EngineError::route(path, "path must start with `/`"));
            }
            let route = Route::from_raw(root, raw)?;
            let key = normalize_route(&path).to_string();
            if routes.insert(key, route).is_some() {
                return Err(EngineError::route(path, "declared more than once"));
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            shell,
            routes,
        })
    }
}

impl Route {
    fn from_raw(root: &Path, raw: RawRoute) -> Result<Self, EngineError> {
        let RawRoute {
            path,
            page,
            fail,
            abort,
            status,
            headers,
        } = raw;

        let action = match (page, fail, abort) {
            (Some(page), None, false) => {
                if page.is_absolute() || page.components().any(|c| matches!(c, Component::ParentDir))
                {
                    return Err(EngineError::route(
                        path,
                        "page must be a relative path inside the dist directory",
                    ));
                }
                RouteAction::Page(root.join(page))
            }
            (None, Some(message), false) => RouteAction::Fail(message),
            (None, None, true) => RouteAction::Abort,
            _ => {
                return Err(EngineError::route(
                    path,
                    "exactly one of `page`, `fail` or `abort` must be set",
                ));
            }
        };

        let status = match status {
            Some(code) => StatusCode::from_u16(code)
                .map_err(|err| EngineError::route(path.clone(), format!("invalid status: {err}")))?,
            None => StatusCode::OK,
        };

        Ok(Self {
            status,
            headers,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use axum::http::{HeaderMap, Method, Uri};
    use tempfile::TempDir;

    use super::*;
    use crate::render::RenderContext;

    fn dist(shell: &str, manifest: &str, pages: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(SHELL_FILE), shell).expect("write shell");
        fs::write(dir.path().join(MANIFEST_FILE), manifest).expect("write manifest");
        for (name, contents) in pages {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("create page dir");
            }
            fs::write(path, contents).expect("write page");
        }
        dir
    }

    fn request(path: &str) -> RenderRequest {
        RenderRequest::new(
            path,
            RenderContext {
                method: Method::GET,
                uri: path.parse::<Uri>().expect("uri"),
                headers: HeaderMap::new(),
            },
        )
    }

    const MANIFEST: &str = r#"
[[routes]]
path = "/"
page = "pages/index.html"
headers = [["X-Rendered-By", "dist"], ["Cache-Control", "no-cache"]]

[[routes]]
path = "/about"
page = "pages/about.html"
status = 203

[[routes]]
path = "/broken"
fail = "Rejected on purpose"

[[routes]]
path = "/redirecting"
abort = true
"#;

    fn sample() -> TempDir {
        dist(
            "<body>Original body</body>",
            MANIFEST,
            &[
                ("pages/index.html", "<h1>Welcome</h1>"),
                ("pages/about.html", "<h1>About</h1>"),
            ],
        )
    }

    #[tokio::test]
    async fn renders_listed_page_with_headers() {
        let dir = sample();
        let engine = DistEngine::open(dir.path(), EngineOptions::default()).expect("open");

        let result = engine.visit(request("/")).await.expect("rendered");
        assert_eq!(result.status, StatusCode::OK);
        assert_eq!(
            result.headers,
            vec![
                ("X-Rendered-By".to_string(), "dist".to_string()),
                ("Cache-Control".to_string(), "no-cache".to_string()),
            ]
        );
        assert!(result.fallback.is_none());
        assert_eq!(result.body.into_text().await.expect("body"), "<h1>Welcome</h1>");
    }

    #[tokio::test]
    async fn matching_ignores_query_and_trailing_slash() {
        let dir = sample();
        let engine = DistEngine::open(dir.path(), EngineOptions::default()).expect("open");

        let result = engine.visit(request("/about/?ref=nav")).await.expect("rendered");
        assert_eq!(result.status, StatusCode::NON_AUTHORITATIVE_INFORMATION);
        assert_eq!(result.body.into_text().await.expect("body"), "<h1>About</h1>");
    }

    #[tokio::test]
    async fn unlisted_path_is_unrecognized() {
        let dir = sample();
        let engine = DistEngine::open(dir.path(), EngineOptions::default()).expect("open");

        let err = engine.visit(request("/foo-bar-baz/non-existent")).await.expect_err("missing");
        assert_eq!(err, RenderError::unrecognized("/foo-bar-baz/non-existent"));
    }

    #[tokio::test]
    async fn abort_route_reports_aborted_transition() {
        let dir = sample();
        let engine = DistEngine::open(dir.path(), EngineOptions::default()).expect("open");

        let err = engine.visit(request("/redirecting")).await.expect_err("aborted");
        assert_eq!(err, RenderError::aborted("/redirecting"));
    }

    #[tokio::test]
    async fn failing_route_surfaces_error_with_stack() {
        let dir = sample();
        let engine = DistEngine::open(dir.path(), EngineOptions::default()).expect("open");

        let err = engine.visit(request("/broken")).await.expect_err("failed");
        let failure = match err {
            RenderError::Failed(failure) => failure,
            other => panic!("expected failure, got {other:?}"),
        };
        assert_eq!(failure.name.as_deref(), Some("Error"));
        assert_eq!(failure.message, "Rejected on purpose");
        assert!(failure.diagnostic().contains("at render (/broken)"));
    }

    #[tokio::test]
    async fn resilient_mode_serves_original_document() {
        let dir = sample();
        let engine =
            DistEngine::open(dir.path(), EngineOptions { resilient: true }).expect("open");

        let result = engine.visit(request("/broken")).await.expect("fallback");
        assert_eq!(result.status, StatusCode::OK);
        assert_eq!(
            result.fallback.as_ref().map(|f| f.message.as_str()),
            Some("Rejected on purpose")
        );
        assert_eq!(
            result.body.into_text().await.expect("body"),
            "<body>Original body</body>"
        );
    }

    #[tokio::test]
    async fn missing_page_fails_while_reading_body() {
        let dir = dist("<body></body>", MANIFEST, &[("pages/about.html", "about")]);
        let engine = DistEngine::open(dir.path(), EngineOptions::default()).expect("open");

        let result = engine.visit(request("/")).await.expect("rendered");
        let err = result.body.into_text().await.expect_err("page is missing");
        assert!(matches!(err, BodyError::Io(_)));
    }

    #[tokio::test]
    async fn reload_switches_directory() {
        let first = sample();
        let second = dist(
            "<body></body>",
            "[[routes]]\npath = \"/\"\npage = \"home.html\"\n",
            &[("home.html", "Goodbye")],
        );
        let engine = DistEngine::open(first.path(), EngineOptions::default()).expect("open");

        engine.reload(second.path()).await.expect("reload");
        assert_eq!(engine.dist_path().await, second.path());

        let result = engine.visit(request("/")).await.expect("rendered");
        assert_eq!(result.body.into_text().await.expect("body"), "Goodbye");
        assert!(engine.visit(request("/about")).await.is_err());
    }

    #[tokio::test]
    async fn failed_reload_keeps_current_directory() {
        let first = sample();
        let engine = DistEngine::open(first.path(), EngineOptions::default()).expect("open");

        let missing = first.path().join("does-not-exist");
        let err = engine.reload(&missing).await.expect_err("reload should fail");
        assert!(matches!(err, EngineError::Io { .. }));
        assert_eq!(engine.dist_path().await, first.path());
    }

    #[test]
    fn missing_shell_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(MANIFEST_FILE), "").expect("write manifest");
        let err = DistEngine::open(dir.path(), EngineOptions::default()).err();
        assert!(matches!(err, Some(EngineError::Io { path, .. }) if path.ends_with(SHELL_FILE)));
    }

    #[test]
    fn malformed_manifest_is_rejected() {
        let dir = dist("", "[[routes]]\npath = 3\n", &[]);
        let err = DistEngine::open(dir.path(), EngineOptions::default()).err();
        assert!(matches!(err, Some(EngineError::Manifest { .. })));
    }

    #[test]
    fn route_needs_exactly_one_action() {
        let dir = dist(
            "",
            "[[routes]]\npath = \"/\"\npage = \"a.html\"\nfail = \"nope\"\n",
            &[],
        );
        let err = DistEngine::open(dir.path(), EngineOptions::default()).err();
        assert!(matches!(err, Some(EngineError::Route { .. })));

        let dir = dist("", "[[routes]]\npath = \"/\"\n", &[]);
        let err = DistEngine::open(dir.path(), EngineOptions::default()).err();
        assert!(matches!(err, Some(EngineError::Route { .. })));
    }

    #[test]
    fn page_cannot_escape_dist_directory() {
        let dir = dist("", "[[routes]]\npath = \"/\"\npage = \"../secret.html\"\n", &[]);
        let err = DistEngine::open(dir.path(), EngineOptions::default()).err();
        assert!(matches!(err, Some(EngineError::Route { route, .. }) if route == "/"));
    }

    #[test]
    fn duplicate_routes_are_rejected() {
        let manifest = "[[routes]]\npath = \"/a\"\nabort = true\n\n[[routes]]\npath = \"/a/\"\nabort = true\n";
        let dir = dist("", manifest, &[]);
        let err = DistEngine::open(dir.path(), EngineOptions::default()).err();
        assert!(matches!(err, Some(EngineError::Route { .. })));
    }

    #[test]
    fn relative_route_paths_are_rejected() {
        let dir = dist("", "[[routes]]\npath = \"about\"\nabort = true\n", &[]);
        let err = DistEngine::open(dir.path(), EngineOptions::default()).err();
        assert!(matches!(err, Some(EngineError::Route { .. })));
    }
}
