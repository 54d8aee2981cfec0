use crate::config::ProviderSettings;
use crate::error::{AppError, AppResult};
use crate::providers::ProviderRegistry;
use crate::upstream::DEFAULT_STREAM_TIMEOUT;
use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::{Arc, Once, OnceLock};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Application context, built once at startup and cloned into handlers.
/// Nothing in it is mutated after construction.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub registry: Arc<ProviderRegistry>,
    pub http: reqwest::Client,
    pub metrics: PrometheusHandle,
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_ERROR: OnceLock<AppError> = OnceLock::new();
static METRICS_INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    pub metrics_path: String,
    pub upstream_timeout: Duration,
    pub apk_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8000".to_string(),
            metrics_path: "/metrics".to_string(),
            upstream_timeout: DEFAULT_STREAM_TIMEOUT,
            apk_dir: PathBuf::from("app/static/apk"),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let listen = env_non_blank("CHATRELAY_LISTEN").unwrap_or(defaults.listen);
        let metrics_path =
            env_non_blank("CHATRELAY_METRICS_PATH").unwrap_or(defaults.metrics_path);
        let upstream_timeout = env_non_blank("CHATRELAY_UPSTREAM_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.upstream_timeout);
        let apk_dir = env_non_blank("CHATRELAY_APK_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.apk_dir);
        Self {
            listen,
            metrics_path,
            upstream_timeout,
            apk_dir,
        }
    }
}

fn env_non_blank(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub async fn load_state() -> AppResult<AppState> {
    load_state_with(RuntimeConfig::from_env(), ProviderSettings::from_env()).await
}

pub async fn load_state_with(
    runtime: RuntimeConfig,
    providers: ProviderSettings,
) -> AppResult<AppState> {
    let http = reqwest::Client::builder()
        .user_agent("chatrelay/0.1")
        .build()
        .map_err(|err| AppError::internal("http_client_init_failed", err.to_string()))?;

    ensure_apk_dir(&runtime.apk_dir)
        .await
        .map_err(|err| AppError::internal("apk_dir_init_failed", err))?;

    let registry = ProviderRegistry::new(&providers);
    let configured = registry.configured_models();
    if configured.is_empty() {
        tracing::warn!("no upstream provider is configured; every chat request will fail");
    } else {
        tracing::info!(models = ?configured, "provider registry ready");
    }

    let metrics = init_metrics()?;

    Ok(AppState {
        runtime: Arc::new(runtime),
        registry: Arc::new(registry),
        http,
        metrics,
    })
}

fn init_metrics() -> AppResult<PrometheusHandle> {
    METRICS_INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(err) => {
                let _ = METRICS_ERROR
                    .set(AppError::internal("metrics_init_failed", err.to_string()));
            }
        }
    });

    if let Some(err) = METRICS_ERROR.get() {
        return Err(err.clone());
    }
    METRICS_HANDLE
        .get()
        .cloned()
        .ok_or_else(|| AppError::internal("metrics_init_failed", "metrics recorder not available"))
}

async fn ensure_apk_dir(dir: &std::path::Path) -> Result<(), String> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| format!("apk_dir_create_failed: {err}"))
}

pub fn build_app(state: AppState) -> Router {
    let metrics_path = state.runtime.metrics_path.clone();
    Router::<AppState>::new()
        .nest("/api", build_api_router())
        .route(&metrics_path, get(crate::handlers::metrics))
        .with_state(state)
        .layer(CorsLayer::very_permissive())
        .layer(SetRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        .layer(TraceLayer::new_for_http())
}

fn build_api_router() -> Router<AppState> {
    Router::new()
        .route("/chat/", post(crate::handlers::chat))
        .route("/chat", post(crate::handlers::chat))
        .route("/chat/models", get(crate::handlers::list_models))
        .route("/update/check", get(crate::update::check_update))
        .route("/update/download", get(crate::update::download_apk))
}
