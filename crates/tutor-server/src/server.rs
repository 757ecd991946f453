use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use tutor_engine::Pipeline;
use tutor_settings::ServerSettings;
use tutor_store::SessionStore;

use crate::handlers;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerSettings::default().into()
    }
}

impl From<ServerSettings> for ServerConfig {
    fn from(settings: ServerSettings) -> Self {
        Self {
            host: settings.host,
            port: settings.port,
            cors_origins: settings.cors_origins,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Root of every request's cancellation token.
    pub shutdown: CancellationToken,
}

/// CORS policy from configured origins. `*` allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/tutor/analyze", post(handlers::analyze))
        .route("/api/v1/tutor/analyze-image", post(handlers::analyze_image))
        .route("/api/v1/tutor/chat", post(handlers::chat))
        .route("/api/v1/tutor/session/{id}", delete(handlers::delete_session))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
}

/// Periodically drop expired sessions that nobody has read since they lapsed.
fn start_session_sweeper(sessions: Arc<SessionStore>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = sessions.purge_expired();
                    debug!(purged, remaining = sessions.len(), "session sweep");
                }
            }
        }
    })
}

/// Bind and start serving. Returns a handle to shut it down.
pub async fn start(config: ServerConfig, pipeline: Arc<Pipeline>) -> Result<ServerHandle, std::io::Error> {
    let shutdown = CancellationToken::new();
    let sweeper = start_session_sweeper(Arc::clone(pipeline.sessions()), SESSION_SWEEP_INTERVAL, shutdown.clone());

    let state = AppState {
        pipeline,
        shutdown: shutdown.clone(),
    };
    let router = build_router(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "tutor server started");

    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        let graceful = async move { signal.cancelled().await };
        if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(graceful).await {
            error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle {
        addr,
        shutdown,
        server,
        sweeper,
    })
}

/// Handle returned by [`start`]. Keeps the server and its background tasks alive.
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    server: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Cancel in-flight streams, stop accepting connections, and wait for the server to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.server.await {
            warn!(error = %e, "server task ended abnormally");
        }
        let _ = self.sweeper.await;
        info!("tutor server stopped");
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tutor_core::provider::AgentRole;
    use tutor_engine::PipelineConfig;
    use tutor_llm::mock::{MockModels, MockResponse};

    use super::*;

    const PRE: &str = r#"{"sentences": [], "overall_difficulty": 3, "focus_summary": ["reading"]}"#;

    fn models() -> MockModels {
        MockModels::new()
            .with(AgentRole::Supervisor, vec![MockResponse::text(PRE)])
            .with(AgentRole::Reading, vec![MockResponse::tokens(&["slash ", "reading"])])
            .with(AgentRole::Grammar, vec![MockResponse::tokens(&["grammar"])])
            .with(AgentRole::Vocabulary, vec![MockResponse::text("## ubiquitous\n어디에나 있는")])
            .with(AgentRole::Chat, vec![MockResponse::text("답변입니다.")])
    }

    async fn serve(models: MockModels) -> (ServerHandle, Arc<Pipeline>, String) {
        let pipeline = Arc::new(Pipeline::new(
            Arc::new(models),
            Arc::new(SessionStore::with_ttl_hours(24)),
            PipelineConfig::default(),
        ));
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        };
        let handle = start(config, Arc::clone(&pipeline)).await.unwrap();
        let base = format!("http://127.0.0.1:{}/api/v1", handle.port());
        (handle, pipeline, base)
    }

    #[tokio::test]
    async fn health() {
        let (handle, _, base) = serve(MockModels::new()).await;
        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn analyze_streams_sse() {
        let (handle, _, base) = serve(models()).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/tutor/analyze"))
            .json(&serde_json::json!({ "text": "The cat sat on the mat.", "level": 2 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "text/event-stream");
        assert_eq!(resp.headers()["x-accel-buffering"], "no");

        let body = resp.text().await.unwrap();
        assert!(body.contains("event: reading_token\ndata: {\"token\":\"slash \"}"));
        assert!(body.contains("event: grammar_done"));
        assert!(body.contains("event: vocabulary_chunk"));
        assert!(body.contains("\"word\":\"ubiquitous\""));
        let done = body.find("event: done").unwrap();
        assert!(body.find("event: vocabulary_done").unwrap() < done);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_streaming() {
        let (handle, _, base) = serve(models()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/tutor/analyze"))
            .json(&serde_json::json!({ "text": "short", "level": 3 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 422);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "validation_error");

        let resp = client
            .post(format!("{base}/tutor/analyze"))
            .json(&serde_json::json!({ "text": "Long enough text here.", "level": 9 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 422);

        let resp = client
            .post(format!("{base}/tutor/analyze-image"))
            .json(&serde_json::json!({ "image_data": "aGk=", "mime_type": "image/gif", "level": 3 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "invalid_image");

        let resp = client
            .post(format!("{base}/tutor/chat"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 422);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn chat_then_delete_session() {
        let (handle, pipeline, base) = serve(models()).await;
        let client = reqwest::Client::new();

        let body = client
            .post(format!("{base}/tutor/chat"))
            .json(&serde_json::json!({ "question": "What is a gerund?" }))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("event: chat_chunk"));
        assert!(body.contains("\"role\":\"assistant\""));
        assert_eq!(pipeline.sessions().len(), 1);

        let data = body
            .lines()
            .skip_while(|l| *l != "event: done")
            .nth(1)
            .and_then(|l| l.strip_prefix("data: "))
            .unwrap();
        let done: serde_json::Value = serde_json::from_str(data).unwrap();
        let id = done["session_id"].as_str().unwrap().to_string();

        let resp = client.delete(format!("{base}/tutor/session/{id}")).send().await.unwrap();
        assert_eq!(resp.status(), 204);
        let resp = client.delete(format!("{base}/tutor/session/{id}")).send().await.unwrap();
        assert_eq!(resp.status(), 404);
        assert!(pipeline.sessions().is_empty());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_ends_open_streams() {
        let hanging = MockModels::new()
            .with(AgentRole::Supervisor, vec![MockResponse::Hang]);
        let (handle, _, base) = serve(hanging).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/tutor/analyze"))
            .json(&serde_json::json!({ "text": "The cat sat on the mat." }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let reader = tokio::spawn(async move {
            let mut body = resp.bytes_stream();
            while let Some(chunk) = body.next().await {
                if chunk.is_err() {
                    break;
                }
            }
        });
        handle.shutdown().await;
        tokio::time::timeout(Duration::from_secs(5), reader).await.unwrap().unwrap();
    }

    #[test]
    fn wildcard_and_listed_origins() {
        let _ = cors_layer(&["*".to_string()]);
        let _ = cors_layer(&["http://localhost:3000".to_string(), "bad\norigin".to_string()]);
    }
}
