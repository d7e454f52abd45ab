// ABOUTME: Dev server for the slidev pipeline
// ABOUTME: Watches the deck, re-transforms changed files and serves modules and shared state over HTTP

use log::{debug, error, info, warn};
use std::io::Read;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use notify_debouncer_full::new_debouncer;
use parking_lot::RwLock;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tungstenite::Message;
use url::Url;

use crate::config::PluginOptions;
use crate::errors::{Result, SlidevError};
use crate::pipeline::{Pipeline, TransformOutcome};
use crate::server_ref::{ServerRef, StateUpdate};
use crate::unit::FileKind;
use crate::utils;
use crate::virtual_modules::VirtualModuleId;

/// Configuration for the dev server
pub struct DevServerConfig {
    /// Deck markdown entry
    pub entry: PathBuf,

    /// Explicit theme; otherwise the deck headmatter decides
    pub theme: Option<String>,

    pub client_root: Option<PathBuf>,

    pub options: PluginOptions,

    /// Debounce time in milliseconds
    pub debounce_ms: u64,

    /// HTTP port; shared state is pushed over a websocket on `port + 1`
    pub port: u16,

    /// Whether shared state is synchronized between server and clients
    pub sync: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            entry: PathBuf::from("slides.md"),
            theme: None,
            client_root: None,
            options: PluginOptions::default(),
            debounce_ms: 300,
            port: 3030,
            sync: false,
        }
    }
}

const INDEX_HTML: &str = "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n</head>\n\
<body>\n<div id=\"app\"></div>\n<script type=\"module\" src=\"/@slidev/entry\"></script>\n\
</body>\n</html>\n";

/// State shared by the watcher loop and the request handlers
struct DevSession {
    config: DevServerConfig,
    server_ref: Arc<ServerRef>,
    pipeline: RwLock<Arc<Pipeline>>,
    version: AtomicU64,
}

impl DevSession {
    fn assemble(config: &DevServerConfig, server_ref: &Arc<ServerRef>) -> Result<Pipeline> {
        let mut builder = Pipeline::builder(&config.entry)
            .options(config.options.clone())
            .server_ref(server_ref.clone());
        if let Some(theme) = &config.theme {
            builder = builder.theme(theme.clone());
        }
        if let Some(client_root) = &config.client_root {
            builder = builder.client_root(client_root.clone());
        }
        builder.build()
    }

    fn pipeline(&self) -> Arc<Pipeline> {
        self.pipeline.read().clone()
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Transform one file or slide module, returning the code to serve.
    ///
    /// A request overtaken by a newer version of the same file still gets
    /// code; it just does not feed the utility stylesheet.
    fn transform(&self, file_id: &str, source: &str) -> Result<String> {
        let version = self.next_version();
        let pipeline = self.pipeline();
        let unit = match pipeline.transform_version(file_id, version, source)? {
            TransformOutcome::Emitted(unit) => unit,
            TransformOutcome::Superseded => {
                debug!("Serving uncommitted result for superseded {}", file_id);
                pipeline.preview(file_id, source)?
            }
        };
        for degradation in &unit.degradations {
            debug!("{}: {}", file_id, degradation);
        }
        Ok(unit.code)
    }

    fn rebuild(&self) {
        match self.pipeline().full_build() {
            Ok(output) => {
                for failure in &output.failures {
                    warn!("{}: {}", failure.file_id, failure.message);
                }
                info!(
                    "Built {} files and {} modules",
                    output.units.len(),
                    output.modules.len()
                );
            }
            Err(e) => error!("Build failed: {}", e),
        }
    }

    /// React to a batch of changed paths
    fn handle_changes(&self, paths: &[PathBuf]) {
        let pipeline = self.pipeline();

        match pipeline.needs_reassembly_for(paths) {
            Ok(true) => {
                info!("Theme or utility config changed, assembling the pipeline again");
                match Self::assemble(&self.config, &self.server_ref) {
                    Ok(fresh) => {
                        *self.pipeline.write() = Arc::new(fresh);
                        self.rebuild();
                    }
                    Err(e) => error!("Failed to assemble pipeline: {}", e),
                }
                return;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Failed to read deck: {}", e);
                return;
            }
        }

        pipeline.invalidate();

        for path in paths {
            if path == &pipeline.layout().entry {
                self.rescan_slides(&pipeline);
                continue;
            }
            let id = path.to_string_lossy().to_string();
            if !path.is_file() || !pipeline.utility_styles().matches(&id) {
                continue;
            }
            match std::fs::read_to_string(path) {
                Ok(source) => {
                    if let Err(e) = self.transform(&id, &source) {
                        error!("{}", e);
                    }
                }
                Err(e) => error!("Failed to read {:?}: {}", path, e),
            }
        }
    }

    fn rescan_slides(&self, pipeline: &Pipeline) {
        let state = match pipeline.deck_state() {
            Ok(state) => state,
            Err(e) => {
                error!("Failed to load deck: {}", e);
                return;
            }
        };
        for (no, slide) in state.visible_slides() {
            let id = VirtualModuleId::Slide(no).as_string();
            let result = slide
                .markdown(&id)
                .and_then(|markdown| self.transform(&id, &markdown));
            if let Err(e) = result {
                error!("{}", e);
            }
        }
    }

    /// Resolve a request path to the code served for it
    fn serve_path(&self, path: &str) -> Result<Option<(Vec<u8>, &'static str)>> {
        if path == "/" || path == "/index.html" {
            return Ok(Some((INDEX_HTML.as_bytes().to_vec(), "text/html")));
        }

        let pipeline = self.pipeline();
        if let Some(module) = VirtualModuleId::parse(path) {
            let code = match pipeline.load(path)? {
                Some(code) => code,
                None => return Ok(None),
            };
            return match module {
                // Slide markdown goes through the normal markdown route
                VirtualModuleId::Slide(_) => Ok(Some((
                    self.transform(&module.as_string(), &code)?.into_bytes(),
                    "application/javascript",
                ))),
                VirtualModuleId::WindiCss => Ok(Some((code.into_bytes(), "text/css"))),
                _ => Ok(Some((code.into_bytes(), "application/javascript"))),
            };
        }

        if path.split('/').any(|part| part == "..") {
            return Ok(None);
        }
        let file = match path.strip_prefix("/@fs") {
            Some(abs) => PathBuf::from(abs),
            None => pipeline.layout().deck_root.join(path.trim_start_matches('/')),
        };
        if !file.is_file() || !is_servable(&file, &self.servable_roots(&pipeline)) {
            return Ok(None);
        }

        let content_type = content_type(&file);
        let id = file.to_string_lossy().to_string();
        // Images, media and fonts are served as stored
        if FileKind::from_id(&id) == FileKind::Other {
            return Ok(Some((std::fs::read(&file)?, content_type)));
        }
        let source = std::fs::read_to_string(&file)?;
        Ok(Some((self.transform(&id, &source)?.into_bytes(), content_type)))
    }

    /// Directories files may be served from
    fn servable_roots(&self, pipeline: &Pipeline) -> Vec<PathBuf> {
        let layout = pipeline.layout();
        vec![
            layout.deck_root.clone(),
            layout.theme_root.clone(),
            layout.client_root.clone(),
            pipeline.options().remote_assets.cache_dir.clone(),
        ]
    }
}

/// Whether `file` lies inside one of `roots` once symlinks and `..` are resolved
fn is_servable(file: &Path, roots: &[PathBuf]) -> bool {
    let file = match file.canonicalize() {
        Ok(file) => file,
        Err(_) => return false,
    };
    let allowed = roots
        .iter()
        .filter_map(|root| root.canonicalize().ok())
        .any(|root| file.starts_with(root));
    if !allowed {
        warn!("Refusing to serve {:?} outside the deck", file);
    }
    allowed
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("woff2") => "font/woff2",
        _ => "application/javascript",
    }
}

fn respond(request: Request, status: u16, body: impl Into<Vec<u8>>, content_type: &str) {
    let mut response = Response::from_data(body.into()).with_status_code(StatusCode(status));
    if let Ok(header) = Header::from_bytes("Content-Type", content_type) {
        response = response.with_header(header);
    }
    if let Err(e) = request.respond(response) {
        error!("Failed to send response: {}", e);
    }
}

fn handle_state(session: &DevSession, mut request: Request) {
    if *request.method() == Method::Post {
        let mut body = String::new();
        if let Err(e) = request.as_reader().read_to_string(&mut body) {
            respond(request, 400, format!("Failed to read body: {}", e), "text/plain");
            return;
        }
        let update: StateUpdate = match serde_json::from_str(&body) {
            Ok(update) => update,
            Err(e) => {
                respond(request, 400, format!("Invalid state update: {}", e), "text/plain");
                return;
            }
        };
        match session.server_ref.apply_client_update(&update) {
            Ok(applied) => debug!("State update {:?} applied: {}", update, applied),
            Err(e) => {
                respond(request, 400, e.to_string(), "text/plain");
                return;
            }
        }
    }

    let snapshot = serde_json::json!({
        "session": session.server_ref.session().to_string(),
        "sync": session.server_ref.sync(),
        "state": session.server_ref.snapshot(),
    });
    respond(request, 200, snapshot.to_string(), "application/json");
}

fn handle_request(session: &DevSession, request: Request) {
    let path = match Url::parse("http://localhost")
        .and_then(|base| base.join(request.url()))
    {
        Ok(url) => url.path().to_string(),
        Err(e) => {
            respond(request, 400, format!("Bad request: {}", e), "text/plain");
            return;
        }
    };
    debug!("{} {}", request.method(), path);

    if path == "/@server-ref/state.json" {
        handle_state(session, request);
        return;
    }
    if *request.method() == Method::Post && path == "/@server-ref/state" {
        handle_state(session, request);
        return;
    }

    match session.serve_path(&path) {
        Ok(Some((body, content_type))) => respond(request, 200, body, content_type),
        Ok(None) => respond(request, 404, "404 Not Found".to_string(), "text/plain"),
        // A failed file shows its error in place of its output
        Err(e) => {
            error!("{}", e);
            respond(request, 500, e.to_string(), "text/plain");
        }
    }
}

fn start_server(session: Arc<DevSession>, port: u16) -> Result<()> {
    let server = Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| SlidevError::WatchError(format!("Failed to start HTTP server: {}", e)))?;

    thread::spawn(move || {
        info!("Dev server listening on http://localhost:{}", port);
        println!("Dev server listening on http://localhost:{}", port);

        for request in server.incoming_requests() {
            let session = session.clone();
            thread::spawn(move || handle_request(&session, request));
        }
    });

    Ok(())
}

/// Push shared state updates to websocket clients
fn start_state_push(server_ref: Arc<ServerRef>, port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .map_err(|e| SlidevError::WatchError(format!("Failed to bind state socket: {}", e)))?;
    info!("Shared state pushed on ws://localhost:{}", port);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("State socket accept failed: {}", e);
                    continue;
                }
            };
            let updates = server_ref.subscribe();
            let snapshot = server_ref.snapshot();
            thread::spawn(move || {
                let mut socket = match tungstenite::accept(stream) {
                    Ok(socket) => socket,
                    Err(e) => {
                        warn!("Websocket handshake failed: {}", e);
                        return;
                    }
                };
                for (key, value) in snapshot {
                    let initial = StateUpdate { key, value };
                    if let Ok(text) = serde_json::to_string(&initial) {
                        if socket.send(Message::Text(text)).is_err() {
                            return;
                        }
                    }
                }
                for update in updates {
                    let text = match serde_json::to_string(&update) {
                        Ok(text) => text,
                        Err(_) => continue,
                    };
                    if let Err(e) = socket.send(Message::Text(text)) {
                        debug!("State client disconnected: {}", e);
                        break;
                    }
                }
            });
        }
    });

    Ok(())
}

/// Checks if a changed path can affect the build
fn is_relevant_path(path: &Path) -> bool {
    let excluded = path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("node_modules") | Some(".git") | Some("dist") | Some(".slidev")
        )
    });
    if excluded {
        return false;
    }
    if path.file_name().and_then(|n| n.to_str()) == Some("windi.config.json") {
        return true;
    }
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            matches!(
                ext.as_str(),
                "md" | "vue" | "ts" | "tsx" | "js" | "css" | "html"
            )
        }
        None => false,
    }
}

/// Run the dev server until the watcher channel closes
pub fn serve(config: DevServerConfig) -> Result<()> {
    utils::validate_file_exists(&config.entry)?;

    // The shared state lives exactly as long as this session
    let server_ref = Arc::new(ServerRef::new(config.sync));
    let pipeline = DevSession::assemble(&config, &server_ref)?;
    let deck_root = pipeline.layout().deck_root.clone();
    let port = config.port;
    let debounce_ms = config.debounce_ms;
    let sync = config.sync;

    let session = Arc::new(DevSession {
        config,
        server_ref: server_ref.clone(),
        pipeline: RwLock::new(Arc::new(pipeline)),
        version: AtomicU64::new(0),
    });

    session.rebuild();
    start_server(session.clone(), port)?;
    if sync {
        start_state_push(server_ref, port.saturating_add(1))?;
    }

    let (tx, rx) = mpsc::channel();
    let mut debouncer = new_debouncer(Duration::from_millis(debounce_ms), None, tx)
        .map_err(|e| SlidevError::WatchError(format!("Failed to create file watcher: {}", e)))?;

    debouncer
        .watcher()
        .watch(&deck_root, RecursiveMode::Recursive)
        .map_err(|e| {
            SlidevError::WatchError(format!("Failed to watch {:?}: {}", deck_root, e))
        })?;

    info!("Watching for changes in {:?}", deck_root);
    println!(
        "Watching for changes in {:?} (Press Ctrl+C to stop)",
        deck_root
    );

    for result in rx {
        match result {
            Ok(events) => {
                let mut changed: Vec<PathBuf> = events
                    .iter()
                    .flat_map(|event| event.paths.iter())
                    .filter(|path| is_relevant_path(path))
                    .cloned()
                    .collect();
                changed.sort();
                changed.dedup();

                if changed.is_empty() {
                    continue;
                }
                debug!("Relevant changes: {:?}", changed);
                session.handle_changes(&changed);
            }
            Err(errors) => {
                for e in errors {
                    error!("Watch error: {:?}", e);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevant_paths() {
        assert!(is_relevant_path(Path::new("/deck/slides.md")));
        assert!(is_relevant_path(Path::new("/deck/components/Counter.vue")));
        assert!(is_relevant_path(Path::new("/deck/windi.config.json")));
        assert!(!is_relevant_path(Path::new("/deck/node_modules/x/index.md")));
        assert!(!is_relevant_path(Path::new("/deck/.slidev/remote-assets/a.png")));
        assert!(!is_relevant_path(Path::new("/deck/image.png")));
    }

    #[test]
    fn test_only_files_under_known_roots_are_servable() {
        let deck = tempfile::TempDir::new().unwrap();
        let outside = tempfile::TempDir::new().unwrap();
        let slide_image = deck.path().join("public/logo.png");
        std::fs::create_dir_all(slide_image.parent().unwrap()).unwrap();
        std::fs::write(&slide_image, b"png").unwrap();
        let secret = outside.path().join("id_rsa");
        std::fs::write(&secret, "key").unwrap();

        let roots = vec![deck.path().to_path_buf()];
        assert!(is_servable(&slide_image, &roots));
        assert!(!is_servable(&secret, &roots));
        // `..` segments are resolved before the check
        let escaped = deck
            .path()
            .join("public/../..")
            .join(outside.path().file_name().unwrap())
            .join("id_rsa");
        assert!(!is_servable(&escaped, &roots));
        assert!(!is_servable(&deck.path().join("missing.png"), &roots));
    }

    fn session(dir: &Path) -> DevSession {
        for pkg in ["node_modules/@slidev/client", "node_modules/@slidev/theme-default"] {
            std::fs::create_dir_all(dir.join(pkg)).unwrap();
        }
        std::fs::write(dir.join("slides.md"), "# One\n").unwrap();
        let config = DevServerConfig {
            entry: dir.join("slides.md"),
            ..DevServerConfig::default()
        };
        let server_ref = Arc::new(ServerRef::new(config.sync));
        let pipeline = DevSession::assemble(&config, &server_ref).unwrap();
        DevSession {
            config,
            server_ref,
            pipeline: RwLock::new(Arc::new(pipeline)),
            version: AtomicU64::new(0),
        }
    }

    #[test]
    fn test_superseded_request_still_gets_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let session = session(dir.path());
        let id = dir.path().join("Card.vue").to_string_lossy().to_string();

        // A newer edit of the same file is already in flight
        let newer = session
            .pipeline()
            .transform_version(&id, 1000, "<div class=\"grid\"/>")
            .unwrap();
        assert!(matches!(newer, TransformOutcome::Emitted(_)));

        let code = session.transform(&id, "<div class=\"flex\"/>").unwrap();
        assert!(code.contains("class=\"flex\""));

        let css = session.pipeline().utility_styles().stylesheet();
        assert!(css.contains(".grid {"));
        assert!(!css.contains(".flex {"));
    }

    #[test]
    fn test_dev_server_defaults_to_unsynced_state() {
        assert!(!DevServerConfig::default().sync);
        let dir = tempfile::TempDir::new().unwrap();
        assert!(!session(dir.path()).server_ref.sync());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(Path::new("a.css")), "text/css");
        assert_eq!(content_type(Path::new("a.vue")), "application/javascript");
        assert_eq!(content_type(Path::new("logo.PNG")), "image/png");
    }
}
