//! Client configuration: transport, proxy, TLS, timeouts, retries, and
//! upload tuning, composed into one [`ClientConfig`] that [`crate::ClientBuilder`]
//! consumes. The same options `ClientBuilder` exposes individually (origin,
//! timeout, retry bounds) are organized here into serializable sub-structs so
//! a host application can load a whole configuration from a file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for a [`crate::Client`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

/// Where and how requests are sent: the API origin, and an optional proxy
/// and TLS override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// The API command server origin, e.g. `https://g.api.mega.co.nz`.
    pub origin: String,
    /// Whether to request the `ssl=2` transfer variant on downloads/uploads.
    pub force_https_transfers: bool,
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            origin: crate::DEFAULT_API_ORIGIN.to_string(),
            force_https_transfers: false,
            proxy: None,
            tls: TlsConfig::default(),
        }
    }
}

/// An HTTP(S) proxy to route API and transfer traffic through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// TLS verification behavior. `accept_invalid_certs` exists for testing
/// against self-hosted/staging endpoints and should stay `false` in
/// production use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            accept_invalid_certs: false,
        }
    }
}

/// Wall-clock timeouts for the different kinds of calls this crate makes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(with = "humantime_secs")]
    pub command: Duration,
    #[serde(with = "humantime_secs")]
    pub transfer: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command: Duration::from_secs(30),
            transfer: Duration::from_secs(120),
        }
    }
}

/// Batch/transfer retry tuning, consumed by [`crate::pipeline::Pipeline`]
/// and the `HttpClient` implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    #[serde(with = "humantime_secs")]
    pub min_retry_delay: Duration,
    #[serde(with = "humantime_secs")]
    pub max_retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 8,
            min_retry_delay: Duration::from_millis(250),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

mod humantime_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Upload chunking, concurrency, and media-attribute tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// How many chunks may be in flight (encrypting, MAC'ing, or uploading)
    /// at once.
    pub max_concurrent_uploads: usize,
    /// Whether `Client::upload_thumbnail` is allowed to run. Generating the
    /// thumbnail's pixels is the caller's job; this only gates the wire
    /// upload of bytes the caller already produced.
    pub auto_thumbnail: bool,
    /// Whether `Client::upload_preview_image` is allowed to run, mirroring
    /// `auto_thumbnail` for the preview-image attribute.
    pub auto_preview: bool,
    /// The timestamp an external video probe should sample a frame from
    /// when producing thumbnail/preview source pixels; this crate never
    /// decodes video itself, so the value is only read back via
    /// `Client::video_frame_time` for the host application's own probe.
    #[serde(with = "humantime_secs")]
    pub video_frame_time: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: 4,
            auto_thumbnail: true,
            auto_preview: true,
            video_frame_time: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = ClientConfig::default();
        let encoded = json::to_string(&config).unwrap();
        let decoded: ClientConfig = json::from_str(&encoded).unwrap();
        assert_eq!(decoded.retry.max_retries, config.retry.max_retries);
        assert_eq!(decoded.transport.origin, config.transport.origin);
    }
}
