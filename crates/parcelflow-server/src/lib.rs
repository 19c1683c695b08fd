pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod observability;
pub mod server;
pub mod sweeper;
pub mod transport;

pub use config::{
    AppConfig, FinalisationConfig, LoggingConfig, MetricsConfig, RemoteEgressRoute, ServerConfig,
    TransportConfig,
};
pub use error::ApiError;
pub use observability::init_tracing;
pub use server::{AppState, ParcelflowServer, ServerBuilder, build_app};
pub use transport::MailboxTransport;
