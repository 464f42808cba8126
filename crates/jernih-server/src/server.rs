//! Web server entrypoints live here.

use std::{
    future::Future,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use axum::{
    Extension, Form, Json, Router,
    body::Body,
    extract::{
        DefaultBodyLimit, FromRequest, MatchedPath, Multipart, State,
        connect_info::ConnectInfo,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{
        HeaderMap, HeaderName, HeaderValue, Request, StatusCode,
        header::{CONTENT_TYPE, RETRY_AFTER},
    },
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post},
};
use governor::clock::Clock;
use governor::{DefaultKeyedRateLimiter, Quota, clock::DefaultClock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    net::TcpListener,
    sync::watch,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tower_http::{
    add_extension::AddExtensionLayer,
    classify::ServerErrorsFailureClass,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::cleanse::{
    CleanseError, CleanseErrorKind, CleanseProvider, FILE_DESCRIPTION, FileUpload,
    TEXT_DESCRIPTION, is_csv_file_name,
};
use crate::config::{RateLimitConfig, RouteLimitConfig, ServerConfig};

const HEALTHZ_PATH: &str = "/v1/healthz";
const TEXT_PATH: &str = "/v1/text-processing";
const FILE_PATH: &str = "/v1/upload-file";
const HEALTHZ_STATUS: &str = "ok";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);
const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";
const TEXT_FIELD: &str = "text";
const FILE_FIELD: &str = "file";
const COLUMN_FIELD: &str = "column";
const MAX_COLUMN_LEN: usize = 128;
const ERROR_INVALID_PARAMETER: &str = "invalid_parameter";
const ERROR_PAYLOAD_TOO_LARGE: &str = "payload_too_large";
const ERROR_NOT_FOUND: &str = "not_found";
const ERROR_METHOD_NOT_ALLOWED: &str = "method_not_allowed";
const ERROR_RATE_LIMITED: &str = "rate_limited";
const ERROR_INTERNAL: &str = "internal_server_error";
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Serialize, Copy, Clone, PartialEq, Eq)]
struct HealthzResponse {
    status: &'static str,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ShutdownEvent {
    Pending,
    CtrlC,
    SigTerm,
    ListenerFailed,
}

#[derive(Debug, Deserialize)]
struct TextForm {
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct TextResponse {
    status_code: u16,
    description: &'static str,
    data: String,
    persisted: bool,
}

#[derive(Debug, Serialize)]
struct FileResponse {
    status_code: u16,
    description: &'static str,
    cleansed_file: String,
    rows: usize,
    persisted: bool,
}

pub type DynCleanseProvider = Arc<dyn CleanseProvider>;
type ApiStateHandle = Arc<ApiState>;

#[derive(Clone)]
struct ApiState {
    provider: DynCleanseProvider,
}

impl ApiState {
    fn new(provider: DynCleanseProvider) -> Self {
        Self { provider }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ApiErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

#[derive(Debug, Clone)]
struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listen address may not be empty")]
    EmptyListenAddr,
    #[error("invalid listen address `{address}`: {source}")]
    InvalidListenAddr {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to determine local address: {source}")]
    LocalAddr {
        #[source]
        source: std::io::Error,
    },
    #[error("axum server error: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
    #[error("invalid rate limit configuration for {route}: {reason}")]
    RateLimitConfig { route: &'static str, reason: String },
}

/// One keyed limiter per cleansing route, keyed by the peer address.
struct RouteLimiters {
    text: DefaultKeyedRateLimiter<IpAddr>,
    file: DefaultKeyedRateLimiter<IpAddr>,
}

impl RouteLimiters {
    fn try_new(cfg: &RateLimitConfig) -> Result<Arc<Self>, ServerError> {
        debug_assert!(cfg.window_ms.get() > 0);
        let window = Duration::from_millis(cfg.window_ms.get());
        Ok(Arc::new(Self {
            text: build_keyed_limiter("text", &cfg.text, window)?,
            file: build_keyed_limiter("file", &cfg.file, window)?,
        }))
    }

    fn for_path(&self, path: &str) -> Option<(&'static str, &DefaultKeyedRateLimiter<IpAddr>)> {
        match path {
            TEXT_PATH => Some(("text", &self.text)),
            FILE_PATH => Some(("file", &self.file)),
            _ => None,
        }
    }

    /// Drops clients whose quota has fully replenished.
    fn prune(&self) {
        self.text.retain_recent();
        self.file.retain_recent();
        self.text.shrink_to_fit();
        self.file.shrink_to_fit();
        tracing::debug!(
            text_clients = self.text.len(),
            file_clients = self.file.len(),
            "pruned idle rate limit entries"
        );
    }
}

fn build_keyed_limiter(
    route: &'static str,
    limits: &RouteLimitConfig,
    window: Duration,
) -> Result<DefaultKeyedRateLimiter<IpAddr>, ServerError> {
    // `max_requests` cells replenish per window; up to `burst` may be spent at once.
    let period = window / limits.max_requests.get();
    let quota = Quota::with_period(period).ok_or_else(|| ServerError::RateLimitConfig {
        route,
        reason: format!(
            "window of {}ms cannot replenish {} requests",
            window.as_millis(),
            limits.max_requests
        ),
    })?;
    Ok(DefaultKeyedRateLimiter::keyed(quota.allow_burst(limits.burst)))
}

fn spawn_limiter_pruning(limiters: Arc<RouteLimiters>, every: Duration) -> JoinHandle<()> {
    debug_assert!(!every.is_zero());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            limiters.prune();
        }
    })
}

async fn rate_limit_middleware(
    State(limiters): State<Arc<RouteLimiters>>,
    req: Request<Body>,
    next: Next,
) -> axum::response::Response {
    let path = matched_path_or_uri(&req);
    let Some((route, limiter)) = limiters.for_path(&path) else {
        return next.run(req).await;
    };

    // Requests served without connection info share one bucket.
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let Err(negative) = limiter.check_key(&ip) else {
        return next.run(req).await;
    };
    let wait = negative.wait_time_from(DefaultClock::default().now());
    let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX).max(1);
    tracing::debug!(%ip, route, wait_ms, "cleanse request rate limited");

    let mut response = ApiError::rate_limited(wait_ms)
        .with_request_id(header_request_id(req.headers()).as_deref())
        .into_response();
    // Retry-After is whole seconds, at least one.
    let secs = wait_ms.div_ceil(1000).max(1);
    response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs));
    response
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            body: ApiErrorBody {
                error,
                message: message.into(),
                field: None,
                retry_after_ms: None,
                request_id: None,
            },
        }
    }

    fn with_field(mut self, field: &str) -> Self {
        debug_assert!(!field.is_empty());
        self.body.field = Some(field.to_string());
        self
    }

    fn with_request_id(mut self, request_id: Option<&str>) -> Self {
        if let Some(id) = request_id {
            debug_assert!(!id.is_empty());
            self.body.request_id = Some(id.to_string());
        }
        self
    }

    fn with_retry_after(mut self, retry_after_ms: u64) -> Self {
        debug_assert!(retry_after_ms > 0);
        self.body.retry_after_ms = Some(retry_after_ms);
        self
    }

    fn invalid_param(field: &str, message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, ERROR_INVALID_PARAMETER, message).with_field(field)
    }

    fn internal() -> Self {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ERROR_INTERNAL,
            "internal server error",
        )
    }

    fn resource_not_found(path: &str) -> Self {
        debug_assert!(path.starts_with('/'));
        ApiError::new(
            StatusCode::NOT_FOUND,
            ERROR_NOT_FOUND,
            format!("resource `{path}` not found"),
        )
    }

    fn method_not_allowed(method: &str, path: &str) -> Self {
        debug_assert!(!method.is_empty());
        ApiError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            ERROR_METHOD_NOT_ALLOWED,
            format!("method `{method}` not allowed for `{path}`"),
        )
    }

    fn rate_limited(retry_after_ms: u64) -> Self {
        ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            ERROR_RATE_LIMITED,
            "rate limit exceeded; retry after backoff",
        )
        .with_retry_after(retry_after_ms)
    }

    fn from_rejection(field: &str, status: StatusCode, message: String) -> Self {
        ApiError::new(status, ERROR_INVALID_PARAMETER, message).with_field(field)
    }

    fn from_multipart(field: &str, error: MultipartError) -> Self {
        let status = error.status();
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            ERROR_PAYLOAD_TOO_LARGE
        } else {
            ERROR_INVALID_PARAMETER
        };
        ApiError::new(status, code, error.body_text()).with_field(field)
    }
}

impl From<CleanseError> for ApiError {
    fn from(error: CleanseError) -> Self {
        match error.kind {
            CleanseErrorKind::InvalidParameter => {
                let field = error.field.unwrap_or_else(|| "parameter".to_string());
                ApiError::invalid_param(&field, error.message)
            }
            CleanseErrorKind::Internal => {
                tracing::error!(message = %error.message, "cleanse request failed");
                ApiError::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn sanitize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

async fn read_upload(multipart: &mut Multipart) -> Result<FileUpload, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut column = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::from_multipart(FILE_FIELD, err))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) => {
                let file_name = field.file_name().map(str::to_string).unwrap_or_default();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::from_multipart(FILE_FIELD, err))?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some(COLUMN_FIELD) => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| ApiError::from_multipart(COLUMN_FIELD, err))?;
                column = sanitize_optional(Some(value));
            }
            other => {
                tracing::debug!(field = ?other, "ignoring unexpected multipart field");
            }
        }
    }

    let Some((file_name, bytes)) = file else {
        return Err(ApiError::invalid_param(
            FILE_FIELD,
            "multipart body must contain a `file` part",
        ));
    };
    if !is_csv_file_name(&file_name) {
        return Err(ApiError::invalid_param(
            FILE_FIELD,
            format!("`{file_name}` is not a .csv file"),
        ));
    }
    if let Some(name) = column.as_deref()
        && name.len() > MAX_COLUMN_LEN
    {
        return Err(ApiError::invalid_param(
            COLUMN_FIELD,
            format!("must be at most {MAX_COLUMN_LEN} bytes"),
        ));
    }

    Ok(FileUpload {
        file_name,
        bytes,
        column,
    })
}

/// Routes with provider state attached; no middleware.
pub fn build_api_router(provider: DynCleanseProvider) -> Router {
    debug_assert!(HEALTHZ_PATH.starts_with("/v1/"));
    debug_assert!(TEXT_PATH.starts_with("/v1/"));
    debug_assert!(FILE_PATH.starts_with("/v1/"));

    let state: ApiStateHandle = Arc::new(ApiState::new(provider));
    Router::new()
        .route(
            HEALTHZ_PATH,
            get(healthz).fallback(method_not_allowed_handler),
        )
        .route(
            TEXT_PATH,
            post(text_processing).fallback(method_not_allowed_handler),
        )
        .route(
            FILE_PATH,
            post(upload_file).fallback(method_not_allowed_handler),
        )
        .layer(AddExtensionLayer::new(state))
}

pub async fn serve(config: ServerConfig, provider: DynCleanseProvider) -> Result<(), ServerError> {
    debug_assert!(config.listen_addr.len() <= 128);
    debug_assert!(!config.listen_addr.contains('\n'));

    let listen_addr = parse_listen_addr(&config.listen_addr)?;
    let (app, limiters) = build_router(&config, provider)?;

    let listener = bind_listener(listen_addr).await?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::LocalAddr { source })?;
    tracing::info!(%local_addr, "jernih server listening");

    let pruning = limiters.map(|limiters| spawn_limiter_pruning(limiters, LIMITER_PRUNE_INTERVAL));

    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownEvent::Pending);

    let shutdown_future = broadcast_shutdown(shutdown_tx);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    let mut server_future = Box::pin(async move {
        axum::serve(listener, make_service)
            .with_graceful_shutdown(shutdown_future)
            .await
    });

    let drain_rx = shutdown_rx.clone();
    let mut drain_timeout = Box::pin(drain_timeout_future(drain_rx));

    let outcome = tokio::select! {
        result = server_future.as_mut() => result.map_err(|source| ServerError::Serve { source }),
        // Timeout elapsed; dropping the server future forces termination.
        _ = drain_timeout.as_mut() => Ok(()),
    };
    if let Some(pruning) = pruning {
        pruning.abort();
    }
    outcome?;

    let final_event = *shutdown_rx.borrow();
    if final_event == ShutdownEvent::Pending {
        tracing::info!("server stopped without external shutdown signal");
    } else {
        tracing::info!(?final_event, "server shutdown complete");
    }

    Ok(())
}

/// Full application router: API routes plus tracing, request ids, body
/// limits and the optional per-client rate limit.
pub fn build_app_router(
    config: &ServerConfig,
    provider: DynCleanseProvider,
) -> Result<Router, ServerError> {
    build_router(config, provider).map(|(router, _)| router)
}

fn build_router(
    config: &ServerConfig,
    provider: DynCleanseProvider,
) -> Result<(Router, Option<Arc<RouteLimiters>>), ServerError> {
    debug_assert_eq!(HEALTHZ_STATUS, "ok");
    debug_assert!(config.max_upload_bytes > 0);

    let mut router = Router::new()
        .merge(build_api_router(provider))
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            let path = matched_path_or_uri(request);
            let request_id =
                header_request_id(request.headers()).unwrap_or_else(|| "-".to_string());
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                path = %path,
                request_id = %request_id
            )
        })
        .on_response(
            |response: &axum::response::Response, latency: Duration, span: &tracing::Span| {
                let status = response.status().as_u16();
                let latency_ms = latency.as_millis().min(u128::from(u64::MAX)) as u64;
                tracing::info!(parent: span, status, latency_ms, "request completed");
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, span: &tracing::Span| {
                let latency_ms = latency.as_millis().min(u128::from(u64::MAX)) as u64;
                tracing::error!(parent: span, latency_ms, error = %error, "request failed");
            },
        );

    let limiters = if config.rate_limit.enabled {
        let limiters = RouteLimiters::try_new(&config.rate_limit)?;
        let rate_layer =
            middleware::from_fn_with_state(Arc::clone(&limiters), rate_limit_middleware);
        router = router.layer(rate_layer);
        Some(limiters)
    } else {
        None
    };

    router = router.layer(trace_layer);

    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);
    router = router
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(
            request_id_header,
            MakeRequestUuid::default(),
        ));

    Ok((router, limiters))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(MULTIPART_CONTENT_TYPE))
}

/// Reads the `text` field from either a urlencoded or a multipart form.
async fn read_text_field(request: Request<Body>) -> Result<Option<String>, ApiError> {
    if !is_multipart(request.headers()) {
        let Form(form) = Form::<TextForm>::from_request(request, &())
            .await
            .map_err(|rejection| {
                ApiError::from_rejection(TEXT_FIELD, rejection.status(), rejection.body_text())
            })?;
        return Ok(form.text);
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| {
            ApiError::from_rejection(TEXT_FIELD, rejection.status(), rejection.body_text())
        })?;
    let mut text = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::from_multipart(TEXT_FIELD, err))?
    {
        if text.is_some() || field.name() != Some(TEXT_FIELD) {
            continue;
        }
        let value = field
            .text()
            .await
            .map_err(|err| ApiError::from_multipart(TEXT_FIELD, err))?;
        text = Some(value);
    }
    Ok(text)
}

async fn text_processing(
    Extension(state): Extension<ApiStateHandle>,
    request: Request<Body>,
) -> Result<Json<TextResponse>, ApiError> {
    let text = read_text_field(request)
        .await?
        .ok_or_else(|| ApiError::invalid_param(TEXT_FIELD, "must be provided"))?;

    let cleansed = state
        .provider
        .cleanse_text(text)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(TextResponse {
        status_code: StatusCode::OK.as_u16(),
        description: TEXT_DESCRIPTION,
        data: cleansed.output,
        persisted: cleansed.persisted,
    }))
}

async fn upload_file(
    Extension(state): Extension<ApiStateHandle>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<FileResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        ApiError::from_rejection(FILE_FIELD, rejection.status(), rejection.body_text())
    })?;
    let upload = read_upload(&mut multipart).await?;
    tracing::debug!(
        file_name = %upload.file_name,
        bytes = upload.bytes.len(),
        "received csv upload"
    );

    let cleansed = state
        .provider
        .cleanse_file(upload)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(FileResponse {
        status_code: StatusCode::OK.as_u16(),
        description: FILE_DESCRIPTION,
        cleansed_file: cleansed.csv,
        rows: cleansed.rows,
        persisted: cleansed.persisted,
    }))
}

async fn healthz() -> impl IntoResponse {
    debug_assert!(HEALTHZ_STATUS.chars().all(|c| c.is_ascii_lowercase()));

    Json(HealthzResponse {
        status: HEALTHZ_STATUS,
    })
}

async fn method_not_allowed_handler(request: Request<Body>) -> axum::response::Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let request_id = header_request_id(request.headers());
    ApiError::method_not_allowed(&method, &path)
        .with_request_id(request_id.as_deref())
        .into_response()
}

async fn not_found_handler(request: Request<Body>) -> axum::response::Response {
    let path = request.uri().path().to_string();
    let request_id = header_request_id(request.headers());
    ApiError::resource_not_found(&path)
        .with_request_id(request_id.as_deref())
        .into_response()
}

fn matched_path_or_uri<B>(request: &Request<B>) -> String {
    if let Some(path) = request.extensions().get::<MatchedPath>() {
        return path.as_str().to_string();
    }
    request.uri().path().to_string()
}

fn header_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
}

async fn wait_for_shutdown() -> ShutdownEvent {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ShutdownEvent::CtrlC,
            Err(error) => {
                tracing::warn!(%error, "failed to capture Ctrl+C signal");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => match term.recv().await {
                Some(_) => ShutdownEvent::SigTerm,
                None => ShutdownEvent::ListenerFailed,
            },
            Err(error) => {
                tracing::warn!(%error, "failed to capture SIGTERM");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending();

    tokio::select! {
        event = ctrl_c => event,
        event = sigterm => event,
    }
}

fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ServerError> {
    let trimmed = addr.trim();
    if trimmed.is_empty() {
        return Err(ServerError::EmptyListenAddr);
    }

    trimmed
        .parse()
        .map_err(|source| ServerError::InvalidListenAddr {
            address: trimmed.to_string(),
            source,
        })
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            address: addr.to_string(),
            source,
        })
}

fn broadcast_shutdown(
    sender: watch::Sender<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    debug_assert!(!sender.is_closed());
    async move {
        let event = wait_for_shutdown().await;
        debug_assert!(event != ShutdownEvent::Pending);
        if let Err(error) = sender.send(event) {
            tracing::warn!(?event, %error, "failed to broadcast shutdown event");
        }
    }
}

fn drain_timeout_future(
    mut receiver: watch::Receiver<ShutdownEvent>,
) -> impl Future<Output = ()> + Send + 'static {
    debug_assert!(DRAIN_TIMEOUT.as_secs() >= 1);
    async move {
        if receiver.changed().await.is_ok() {
            let event = *receiver.borrow_and_update();
            tracing::info!(?event, "shutdown signal received; draining connections");
            tokio::time::sleep(DRAIN_TIMEOUT).await;
            tracing::warn!(
                ?event,
                seconds = DRAIN_TIMEOUT.as_secs(),
                "graceful shutdown timed out; continuing shutdown"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanse::{FileCleansed, TextCleansed};
    use axum::http::{Method, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const BOUNDARY: &str = "jernih-test-boundary";

    struct MockCleanseProvider;

    #[async_trait::async_trait]
    impl CleanseProvider for MockCleanseProvider {
        async fn cleanse_text(&self, text: String) -> Result<TextCleansed, CleanseError> {
            Ok(TextCleansed {
                output: text.to_lowercase(),
                persisted: true,
            })
        }

        async fn cleanse_file(&self, upload: FileUpload) -> Result<FileCleansed, CleanseError> {
            match upload.column.as_deref() {
                Some("Missing") => Err(CleanseError::invalid_param(
                    "column",
                    "column `Missing` not found",
                )),
                Some("Boom") => Err(CleanseError::internal("disk on fire")),
                column => Ok(FileCleansed {
                    csv: format!("{}\n", column.unwrap_or("Tweet")),
                    rows: upload.bytes.len(),
                    persisted: false,
                }),
            }
        }
    }

    fn mock_provider() -> DynCleanseProvider {
        Arc::new(MockCleanseProvider)
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> String {
        let mut body = String::new();
        for (name, file_name, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match file_name {
                Some(file_name) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: text/csv\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn upload_request(body: String) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(FILE_PATH)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request builds")
    }

    fn text_request(body: &'static str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(TEXT_PATH)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("request builds")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body must be readable")
            .to_bytes();
        serde_json::from_slice(bytes.as_ref()).expect("body must be json")
    }

    #[tokio::test]
    async fn text_processing_wraps_provider_output() {
        let response = build_api_router(mock_provider())
            .oneshot(text_request("text=Halo+USER"))
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::OK);
        let value = json_body(response).await;
        assert_eq!(
            value,
            json!({
                "status_code": 200,
                "description": "Teks yang sudah diproses",
                "data": "halo user",
                "persisted": true,
            })
        );
    }

    #[tokio::test]
    async fn text_processing_requires_text_field() {
        let response = build_api_router(mock_provider())
            .oneshot(text_request("other=1"))
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value = json_body(response).await;
        assert_eq!(value["error"], json!("invalid_parameter"));
        assert_eq!(value["field"], json!("text"));
    }

    #[tokio::test]
    async fn text_processing_rejects_wrong_content_type() {
        let request = Request::builder()
            .method(Method::POST)
            .uri(TEXT_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"text\":\"hi\"}"))
            .expect("request builds");
        let response = build_api_router(mock_provider())
            .oneshot(request)
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let value = json_body(response).await;
        assert_eq!(value["field"], json!("text"));
    }

    #[tokio::test]
    async fn text_processing_accepts_multipart_form() {
        let body = multipart_body(&[("note", None, "skip"), ("text", None, "Halo DARI Form")]);
        let request = Request::builder()
            .method(Method::POST)
            .uri(TEXT_PATH)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request builds");
        let response = build_api_router(mock_provider())
            .oneshot(request)
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::OK);
        let value = json_body(response).await;
        assert_eq!(value["data"], json!("halo dari form"));
    }

    #[tokio::test]
    async fn multipart_text_without_text_part_is_rejected() {
        let body = multipart_body(&[("file", Some("a.csv"), "Tweet\n")]);
        let request = Request::builder()
            .method(Method::POST)
            .uri(TEXT_PATH)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request builds");
        let response = build_api_router(mock_provider())
            .oneshot(request)
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value = json_body(response).await;
        assert_eq!(value["field"], json!("text"));
    }

    #[tokio::test]
    async fn text_route_rejects_get() {
        let request = Request::builder()
            .method(Method::GET)
            .uri(TEXT_PATH)
            .body(Body::empty())
            .expect("request builds");
        let response = build_api_router(mock_provider())
            .oneshot(request)
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let value = json_body(response).await;
        assert_eq!(value["error"], json!("method_not_allowed"));
    }

    #[tokio::test]
    async fn upload_passes_column_and_reports_persistence() {
        let body = multipart_body(&[
            ("file", Some("tweets.CSV"), "Tweet\nhalo\n"),
            ("column", None, " Text "),
        ]);
        let response = build_api_router(mock_provider())
            .oneshot(upload_request(body))
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::OK);
        let value = json_body(response).await;
        assert_eq!(value["description"], json!("File processed"));
        assert_eq!(value["cleansed_file"], json!("Text\n"));
        assert_eq!(value["persisted"], json!(false));
    }

    #[tokio::test]
    async fn upload_rejects_non_csv_names() {
        let body = multipart_body(&[("file", Some("tweets.xlsx"), "whatever")]);
        let response = build_api_router(mock_provider())
            .oneshot(upload_request(body))
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value = json_body(response).await;
        assert_eq!(value["field"], json!("file"));
    }

    #[tokio::test]
    async fn upload_requires_file_part() {
        let body = multipart_body(&[("column", None, "Tweet")]);
        let response = build_api_router(mock_provider())
            .oneshot(upload_request(body))
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value = json_body(response).await;
        assert_eq!(value["field"], json!("file"));
    }

    #[tokio::test]
    async fn provider_errors_map_to_status_codes() {
        let missing = multipart_body(&[
            ("file", Some("a.csv"), "Tweet\n"),
            ("column", None, "Missing"),
        ]);
        let response = build_api_router(mock_provider())
            .oneshot(upload_request(missing))
            .await
            .expect("handler responds");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["field"], json!("column"));

        let boom = multipart_body(&[("file", Some("a.csv"), "Tweet\n"), ("column", None, "Boom")]);
        let response = build_api_router(mock_provider())
            .oneshot(upload_request(boom))
            .await
            .expect("handler responds");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let value = json_body(response).await;
        assert_eq!(value["error"], json!("internal_server_error"));
        assert_eq!(value["message"], json!("internal server error"));
    }

    #[tokio::test]
    async fn unknown_route_returns_json_404_with_request_id() {
        let router = build_app_router(&ServerConfig::default(), mock_provider()).expect("router");
        let request = Request::builder()
            .method(Method::GET)
            .uri("/v1/nope")
            .header(REQUEST_ID_HEADER, "req-42")
            .body(Body::empty())
            .expect("request builds");
        let response = router.oneshot(request).await.expect("handler responds");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response
                .headers()
                .get(REQUEST_ID_HEADER)
                .expect("request id propagated"),
            "req-42"
        );
        let value = json_body(response).await;
        assert_eq!(value["error"], json!("not_found"));
        assert_eq!(value["request_id"], json!("req-42"));
    }

    #[tokio::test]
    async fn rate_limit_rejects_requests_over_burst() {
        let mut config = ServerConfig::default();
        config.rate_limit.text = RouteLimitConfig::default();
        config.rate_limit.window_ms = std::num::NonZeroU64::new(60_000).expect("non-zero");
        let router = build_app_router(&config, mock_provider()).expect("router");

        let first = router
            .clone()
            .oneshot(text_request("text=a"))
            .await
            .expect("first responds");
        assert_eq!(first.status(), StatusCode::OK);

        let second = router
            .clone()
            .oneshot(text_request("text=b"))
            .await
            .expect("second responds");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().get(RETRY_AFTER).is_some());
        let value = json_body(second).await;
        assert_eq!(value["error"], json!("rate_limited"));

        let health = router
            .oneshot(
                Request::builder()
                    .uri(HEALTHZ_PATH)
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("healthz responds");
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[test]
    fn listen_addr_is_validated() {
        assert!(matches!(
            parse_listen_addr("   "),
            Err(ServerError::EmptyListenAddr)
        ));
        assert!(matches!(
            parse_listen_addr("localhost"),
            Err(ServerError::InvalidListenAddr { .. })
        ));
        let addr = parse_listen_addr(" 127.0.0.1:5000 ").expect("valid addr");
        assert_eq!(addr.port(), 5000);
    }

    #[tokio::test]
    async fn idle_clients_are_pruned_from_limiters() {
        let config = RateLimitConfig {
            window_ms: std::num::NonZeroU64::new(1).expect("non-zero"),
            text: RouteLimitConfig::default(),
            file: RouteLimitConfig::default(),
            ..RateLimitConfig::default()
        };
        let limiters = RouteLimiters::try_new(&config).expect("limiters build");
        for last in 0..=255u8 {
            let ip = IpAddr::from([10, 0, 0, last]);
            assert!(limiters.text.check_key(&ip).is_ok());
        }
        assert!(limiters.file.check_key(&IpAddr::from([10, 0, 1, 1])).is_ok());
        assert_eq!(limiters.text.len(), 256);

        let pruning = spawn_limiter_pruning(Arc::clone(&limiters), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(200)).await;
        pruning.abort();

        assert_eq!(limiters.text.len(), 0);
        assert_eq!(limiters.file.len(), 0);
    }

    #[test]
    fn pruning_keeps_clients_still_waiting() {
        let config = RateLimitConfig {
            window_ms: std::num::NonZeroU64::new(60_000).expect("non-zero"),
            text: RouteLimitConfig::default(),
            ..RateLimitConfig::default()
        };
        let limiters = RouteLimiters::try_new(&config).expect("limiters build");
        let ip = IpAddr::from([192, 168, 0, 9]);
        assert!(limiters.text.check_key(&ip).is_ok());

        limiters.prune();

        assert_eq!(limiters.text.len(), 1);
        assert!(limiters.text.check_key(&ip).is_err());
    }

    #[test]
    fn limiters_map_only_cleansing_routes() {
        let limiters = RouteLimiters::try_new(&RateLimitConfig::default()).expect("limiters build");
        assert_eq!(limiters.for_path(TEXT_PATH).map(|(route, _)| route), Some("text"));
        assert_eq!(limiters.for_path(FILE_PATH).map(|(route, _)| route), Some("file"));
        assert!(limiters.for_path(HEALTHZ_PATH).is_none());
    }
}
