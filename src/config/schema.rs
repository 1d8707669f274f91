//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::dispatch::classify::{LOCK_NOT_AVAILABLE, SERIALIZATION_FAILURE};

/// In-memory budget for multipart forms before file parts spill to disk.
pub const DEFAULT_MULTIPART_MAX_MEMORY: usize = 32 << 20;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Dispatch and retry settings.
    pub dispatch: DispatchConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Dispatch configuration. Read-only once the server is built.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Handler invocations per request when the store reports transient
    /// conflicts. Must be positive.
    pub max_attempts: u32,

    /// Bytes of a multipart form kept in memory.
    pub multipart_max_memory: usize,

    /// Upper bound on any request body.
    pub max_body_bytes: usize,

    /// SQLSTATE codes treated as transient conflicts.
    pub transient_sqlstates: Vec<String>,

    /// Chunks buffered between an event-feed handler and the transport.
    pub stream_buffer: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multipart_max_memory: DEFAULT_MULTIPART_MAX_MEMORY,
            max_body_bytes: 64 << 20,
            transient_sqlstates: vec![SERIALIZATION_FAILURE.to_string(), LOCK_NOT_AVAILABLE.to_string()],
            stream_buffer: 1,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive, overridden by `RUST_LOG`.
    pub log_filter: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "jsonhttp=info,tower_http=info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
