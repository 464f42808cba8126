use std::num::{NonZeroU32, NonZeroU64};

use serde::Deserialize;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_listen_addr")]
    pub listen_addr: String,
    /// Upper bound on request bodies, applied to CSV uploads.
    #[serde(default = "ServerConfig::default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl ServerConfig {
    fn default_listen_addr() -> String {
        DEFAULT_LISTEN_ADDR.to_string()
    }

    fn default_max_upload_bytes() -> usize {
        DEFAULT_MAX_UPLOAD_BYTES
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            max_upload_bytes: Self::default_max_upload_bytes(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "RateLimitConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "RateLimitConfig::default_window_ms")]
    pub window_ms: NonZeroU64,
    #[serde(default = "RateLimitConfig::default_text_limit")]
    pub text: RouteLimitConfig,
    #[serde(default = "RateLimitConfig::default_file_limit")]
    pub file: RouteLimitConfig,
}

impl RateLimitConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_window_ms() -> NonZeroU64 {
        NonZeroU64::new(1_000).expect("non-zero window defaults to 1000ms")
    }

    fn default_text_limit() -> RouteLimitConfig {
        RouteLimitConfig::text_defaults()
    }

    fn default_file_limit() -> RouteLimitConfig {
        RouteLimitConfig::file_defaults()
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            window_ms: Self::default_window_ms(),
            text: Self::default_text_limit(),
            file: Self::default_file_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouteLimitConfig {
    #[serde(default = "RouteLimitConfig::default_requests")]
    pub max_requests: NonZeroU32,
    #[serde(default = "RouteLimitConfig::default_burst")]
    pub burst: NonZeroU32,
}

impl RouteLimitConfig {
    fn default_requests() -> NonZeroU32 {
        NonZeroU32::new(1).expect("default requests bound must be non-zero")
    }

    fn default_burst() -> NonZeroU32 {
        NonZeroU32::new(1).expect("default burst bound must be non-zero")
    }

    fn text_defaults() -> Self {
        Self {
            max_requests: NonZeroU32::new(20).expect("text default must be non-zero"),
            burst: NonZeroU32::new(40).expect("text burst must be non-zero"),
        }
    }

    fn file_defaults() -> Self {
        Self {
            max_requests: NonZeroU32::new(2).expect("file default must be non-zero"),
            burst: NonZeroU32::new(4).expect("file burst must be non-zero"),
        }
    }
}

impl Default for RouteLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: Self::default_requests(),
            burst: Self::default_burst(),
        }
    }
}
