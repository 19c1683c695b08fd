use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::trace::TraceLayer;

use parcelflow_broker::{
    EpisodeFinalisationTracker, PublisherRegistry, SubscriptionRegistry, TaskDistributor,
};

use crate::{config::AppConfig, handlers, metrics, sweeper, transport::MailboxTransport};

/// Broker services shared by every request handler.
///
/// Built once at startup; handlers receive clones of the `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub publishers: Arc<PublisherRegistry>,
    pub finalisation: Arc<EpisodeFinalisationTracker>,
    pub transport: Arc<MailboxTransport>,
    pub distributor: Arc<TaskDistributor>,
    pub metrics_enabled: bool,
}

impl AppState {
    pub fn new(cfg: &AppConfig) -> Self {
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let publishers = Arc::new(PublisherRegistry::new());
        let finalisation = Arc::new(EpisodeFinalisationTracker::new());
        let transport = Arc::new(MailboxTransport::new(&cfg.transport));
        let distributor = Arc::new(TaskDistributor::new(
            subscriptions.clone(),
            finalisation.clone(),
            transport.clone(),
            transport.clone(),
        ));

        Self {
            subscriptions,
            publishers,
            finalisation,
            transport,
            distributor,
            metrics_enabled: cfg.metrics.enabled,
        }
    }
}

pub fn build_app(cfg: &AppConfig, state: AppState) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics_text))
        // Subscription registry
        .route(
            "/subscriptions",
            get(handlers::list_subscriptions)
                .post(handlers::add_subscription)
                .delete(handlers::remove_subscription),
        )
        .route("/subscriptions/match", post(handlers::match_subscribers))
        // Publisher registry
        .route(
            "/publishers",
            get(handlers::list_publishers).post(handlers::register_publisher),
        )
        .route("/publishers/{instance}", delete(handlers::unregister_publisher))
        .route(
            "/publishers/{instance}/activity",
            put(handlers::touch_publisher),
        )
        .route(
            "/publishers/services/{service}",
            get(handlers::service_providers),
        )
        .route(
            "/publishers/services/{service}/subscriptions",
            post(handlers::subscribe_to_publisher),
        )
        .route(
            "/publishers/subscriptions",
            get(handlers::list_publisher_subscriptions),
        )
        // Distribution
        .route("/tasks/distribute", post(handlers::distribute_task))
        // Finalisation tracking
        .route("/episodes", get(handlers::list_episodes))
        .route(
            "/episodes/{id}",
            get(handlers::get_episode).delete(handlers::remove_episode),
        )
        .route(
            "/episodes/{id}/finalisation",
            get(handlers::episode_finalisation),
        )
        .route("/episodes/{id}/interest", put(handlers::register_interest))
        .route(
            "/episodes/{id}/downstream",
            put(handlers::register_downstream),
        )
        // Mailbox transport
        .route("/mailboxes", get(handlers::list_mailboxes))
        .route(
            "/mailboxes/{endpoint}",
            post(handlers::open_mailbox).delete(handlers::close_mailbox),
        )
        .route("/mailboxes/{endpoint}/tasks", get(handlers::drain_mailbox))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status().as_u16();
                        span.record("http.status_code", tracing::field::display(status));
                        tracing::debug!(
                            http.status = status,
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::middleware::from_fn(record_request_metrics))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

async fn record_request_metrics(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = req.method().clone();
    let started = std::time::Instant::now();
    let response = next.run(req).await;
    metrics::record_http_request(method.as_str(), response.status().as_u16(), started.elapsed());
    response
}

pub struct ParcelflowServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    config: AppConfig,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> ParcelflowServer {
        if self.config.metrics.enabled {
            metrics::init_metrics();
        }
        let state = AppState::new(&self.config);
        let app = build_app(&self.config, state.clone());

        ParcelflowServer {
            addr: self.addr,
            app,
            state,
            config: self.config,
        }
    }
}

impl ParcelflowServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let sweeper = self.config.finalisation.sweep_enabled.then(|| {
            tracing::info!(
                interval_secs = self.config.finalisation.sweep_interval_secs,
                "Episode sweeper started"
            );
            sweeper::start_episode_sweeper(
                self.state.finalisation.clone(),
                self.config.sweep_interval(),
            )
        });

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(handle) = sweeper {
            handle.abort();
        }
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
