//! Development server with on-demand rendering and live reload

use anyhow::Result;
use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{Request, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use notify_debouncer_mini::{new_debouncer, notify::RecursiveMode, DebounceEventResult};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::cms::ReleaseRef;
use crate::generator::{Generator, RenderOutcome};
use crate::helpers::uid_from_path;
use crate::Spacetraveling;

/// Live reload script injected into HTML pages
const LIVE_RELOAD_SCRIPT: &str = r#"
<script>
(function() {
    var ws = new WebSocket('ws://' + location.host + '/__livereload');
    ws.onmessage = function(msg) {
        if (msg.data === 'reload') {
            location.reload();
        }
    };
    ws.onclose = function() {
        console.log('Live reload disconnected. Attempting to reconnect...');
        setTimeout(function() { location.reload(); }, 1000);
    };
})();
</script>
</body>
"#;

/// Server state
struct ServerState {
    base_dir: PathBuf,
    release: Option<ReleaseRef>,
    /// Replaced when `_config.yml` changes
    generator: RwLock<Arc<Generator>>,
    /// Held for the duration of a full rebuild
    rebuilding: Mutex<()>,
    reload_tx: broadcast::Sender<()>,
    live_reload: bool,
}

impl ServerState {
    fn new(generator: Generator, release: Option<ReleaseRef>, live_reload: bool) -> Self {
        let (reload_tx, _) = broadcast::channel::<()>(16);
        Self {
            base_dir: generator.site().base_dir.clone(),
            release,
            generator: RwLock::new(Arc::new(generator)),
            rebuilding: Mutex::new(()),
            reload_tx,
            live_reload,
        }
    }

    async fn generator(&self) -> Arc<Generator> {
        self.generator.read().await.clone()
    }

    /// Regenerate the whole site and tell connected browsers to reload
    async fn rebuild(&self) -> Result<()> {
        let _guard = self.rebuilding.lock().await;
        let generator = self.generator().await;
        let report = generator.generate().await?;
        if !report.failed.is_empty() {
            tracing::warn!("{} article(s) failed to render", report.failed.len());
        }
        let _ = self.reload_tx.send(());
        Ok(())
    }

    /// Re-read `_config.yml` and swap in a generator built from it
    async fn reload_config(&self) -> Result<()> {
        let site = Spacetraveling::new(&self.base_dir)?;
        let source = site.content_source()?;
        let generator = Generator::new(&site, source, self.release.clone())?;
        *self.generator.write().await = Arc::new(generator);
        tracing::info!("Configuration reloaded");
        Ok(())
    }
}

/// Start the development server
pub async fn start(
    site: &Spacetraveling,
    release: Option<ReleaseRef>,
    ip: &str,
    port: u16,
    open: bool,
) -> Result<()> {
    let source = site.content_source()?;
    let generator = Generator::new(site, source, release.clone())?;
    let state = Arc::new(ServerState::new(generator, release, true));

    // Pages missing after a failed build are still rendered on demand
    tracing::info!("Generating static files...");
    if let Err(e) = state.rebuild().await {
        tracing::error!("Initial generation failed: {:#}", e);
    }

    let app = router(state.clone());

    // Parse address - handle "localhost" specially
    let bind_ip = if ip == "localhost" { "127.0.0.1" } else { ip };
    let addr: SocketAddr = format!("{}:{}", bind_ip, port).parse()?;

    let url = format!("http://{}:{}", ip, port);
    println!("Server running at {}", url);
    if state.release.is_some() {
        println!("Preview mode: unpublished content is visible.");
    }
    println!("Press Ctrl+C to stop.");

    if open {
        if let Err(e) = open_browser(&url) {
            tracing::warn!("Failed to open browser: {}", e);
        }
    }

    if site.config.revalidate > 0 {
        let state = state.clone();
        let period = Duration::from_secs(site.config.revalidate);
        tokio::spawn(async move { revalidate(state, period).await });
    }

    {
        let state = state.clone();
        let config_path = site.base_dir.join("_config.yml");
        let source_dir = site.source_dir.clone();
        tokio::spawn(async move {
            if let Err(e) = watch_and_reload(state, config_path, source_dir).await {
                tracing::error!("File watcher error: {}", e);
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/__livereload", get(livereload_handler))
        .fallback(fallback_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Regenerate the site every `period`
async fn revalidate(state: Arc<ServerState>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately; the site was just built
    interval.tick().await;

    loop {
        interval.tick().await;
        tracing::info!("Revalidating content...");
        if let Err(e) = state.rebuild().await {
            tracing::error!("Revalidation failed: {:#}", e);
        }
    }
}

/// Watch the configuration and source assets, regenerating on change
async fn watch_and_reload(
    state: Arc<ServerState>,
    config_path: PathBuf,
    source_dir: PathBuf,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<DebounceEventResult>();

    // Create debouncer to avoid multiple rapid rebuilds
    let mut debouncer = new_debouncer(Duration::from_millis(500), move |res| {
        let _ = tx.send(res);
    })?;

    if config_path.exists() {
        debouncer
            .watcher()
            .watch(&config_path, RecursiveMode::NonRecursive)?;
        tracing::debug!("Watching: {:?}", config_path);
    }

    if source_dir.exists() {
        debouncer
            .watcher()
            .watch(&source_dir, RecursiveMode::Recursive)?;
        tracing::debug!("Watching: {:?}", source_dir);
    }

    while let Some(result) = rx.recv().await {
        let events = match result {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("Watch error: {:?}", e);
                continue;
            }
        };

        let relevant: Vec<_> = events
            .iter()
            .filter(|e| {
                let path_str = e.path.to_string_lossy();
                !path_str.contains(".DS_Store") && !path_str.ends_with('~')
            })
            .collect();
        if relevant.is_empty() {
            continue;
        }

        for event in &relevant {
            tracing::info!("File changed: {}", event.path.display());
        }

        if relevant.iter().any(|e| e.path == config_path) {
            if let Err(e) = state.reload_config().await {
                tracing::error!("Failed to reload configuration: {:#}", e);
                continue;
            }
        }

        match state.rebuild().await {
            Ok(()) => tracing::info!("Regenerated successfully"),
            Err(e) => tracing::error!("Generation failed: {:#}", e),
        }
    }

    Ok(())
}

/// WebSocket handler for live reload
async fn livereload_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    let reload_rx = state.reload_tx.subscribe();
    ws.on_upgrade(move |socket| handle_livereload_socket(socket, reload_rx))
}

/// Handle WebSocket connection for live reload
async fn handle_livereload_socket(mut socket: WebSocket, mut reload_rx: broadcast::Receiver<()>) {
    tracing::debug!("Live reload client connected");

    loop {
        tokio::select! {
            result = reload_rx.recv() => {
                match result {
                    Ok(_) => {
                        if socket.send(Message::Text("reload".to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }

    tracing::debug!("Live reload client disconnected");
}

/// Serve generated files, rendering article pages that do not exist yet
async fn fallback_handler(
    State(state): State<Arc<ServerState>>,
    request: Request<Body>,
) -> Response {
    let generator = state.generator().await;
    let site = generator.site();
    let path = request.uri().path().to_string();

    if let Some(file_path) = existing_file(&site.public_dir, &path) {
        if is_html(&file_path) {
            return serve_html(&state, &file_path, StatusCode::OK).await;
        }
        let mut service = ServeDir::new(&site.public_dir).append_index_html_on_directories(true);
        return match service.try_call(request).await {
            Ok(response) => response.into_response(),
            Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Server error").into_response(),
        };
    }

    let not_found = site.public_dir.join("404.html");
    let Some(uid) = uid_from_path(&site.config, &path) else {
        return serve_html(&state, &not_found, StatusCode::NOT_FOUND).await;
    };

    tracing::info!("Rendering {} on demand", uid);
    match generator.render_article(&uid).await {
        Ok(RenderOutcome::Rendered(file_path)) => {
            serve_html(&state, &file_path, StatusCode::OK).await
        }
        Ok(RenderOutcome::NotFound(file_path)) => {
            serve_html(&state, &file_path, StatusCode::NOT_FOUND).await
        }
        Err(e) => {
            tracing::error!("Failed to render {}: {:#}", uid, e);
            (StatusCode::BAD_GATEWAY, "Content service unavailable").into_response()
        }
    }
}

/// File under `public_dir` addressed by a request path, if it exists
fn existing_file(public_dir: &Path, path: &str) -> Option<PathBuf> {
    let clean_path = path.trim_start_matches('/');
    if clean_path.split('/').any(|segment| segment == "..") {
        return None;
    }

    let candidate = public_dir.join(clean_path);
    if candidate.is_dir() {
        let index = candidate.join("index.html");
        return index.is_file().then_some(index);
    }
    if candidate.is_file() {
        return Some(candidate);
    }

    let with_html = public_dir.join(format!("{}.html", clean_path.trim_end_matches('/')));
    with_html.is_file().then_some(with_html)
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == "html" || ext == "htm")
        .unwrap_or(false)
}

async fn serve_html(state: &ServerState, file_path: &Path, status: StatusCode) -> Response {
    match tokio::fs::read_to_string(file_path).await {
        Ok(content) => {
            let body = if state.live_reload {
                inject_live_reload(&content)
            } else {
                content
            };
            (status, Html(body)).into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

/// Inject live reload script into HTML content
fn inject_live_reload(html: &str) -> String {
    if html.contains("</body>") {
        html.replace("</body>", LIVE_RELOAD_SCRIPT)
    } else {
        // If no </body> tag, append to end
        format!("{}{}", html, LIVE_RELOAD_SCRIPT)
    }
}

/// Open a URL in the default browser
fn open_browser(url: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/c", "start", url])
            .spawn()?;
    }

    Ok(())
}
