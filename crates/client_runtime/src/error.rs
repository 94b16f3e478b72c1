use shared::{
    domain::{ComponentId, ModuleRef},
    error::ApiError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("component {0} is not mounted")]
    ComponentNotFound(ComponentId),
    #[error("no action handler registered for module {0}")]
    HandlerNotFound(ModuleRef),
    #[error("handler {module}.{action} failed: {source}")]
    Handler {
        module: ModuleRef,
        action: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("action chain exceeded {limit} steps (last action {action} on {target})")]
    ActionChainTooDeep {
        limit: usize,
        action: String,
        target: ComponentId,
    },
    #[error("action {action} is missing required param {param}")]
    MissingParam { action: String, param: &'static str },
    #[error("no route registered for page module {0}")]
    RouteNotFound(ModuleRef),
    #[error("runtime must be built inside a tokio runtime")]
    NoAsyncRuntime,
}

/// Outcome of a failed transport round trip. These never reach dispatch
/// callers: the command queue and prefetch cache absorb them.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("transport is disconnected")]
    Disconnected,
    #[error("server rejected request: {0:?}")]
    Rejected(ApiError),
    #[error("http error: {0}")]
    Http(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },
}
