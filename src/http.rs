use std::fmt;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::warn;

use crate::error::EdgesetError;

/// Settings applied uniformly to every request of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// `addr:port` or full proxy URL, used for both http and https.
    pub proxy: Option<String>,
    pub timeout: Option<Duration>,
    /// Base delay of the linear backoff between attempts. Zero retries
    /// immediately.
    pub retry_delay: Duration,
}

impl TransportOptions {
    /// Parses the CLI proxy argument, where `none` disables the proxy.
    pub fn with_proxy_arg(mut self, proxy: &str) -> Self {
        let proxy = proxy.trim();
        self.proxy = if proxy.is_empty() || proxy.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(proxy.to_string())
        };
        self
    }
}

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    Status(u16),
    Connection(String),
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFailure::Status(status) => write!(f, "HTTP status {status}"),
            TransportFailure::Connection(message) => write!(f, "{message}"),
        }
    }
}

/// One GET request, no retries. Non-2xx responses are failures.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportFailure>;

    fn retry_delay(&self) -> Duration {
        Duration::ZERO
    }
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    retry_delay: Duration,
}

impl HttpTransport {
    pub fn new(options: &TransportOptions) -> Result<Self, EdgesetError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("edgeset/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| EdgesetError::HttpClient(err.to_string()))?,
        );
        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(proxy) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|err| EdgesetError::HttpClient(format!("proxy {proxy}: {err}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|err| EdgesetError::HttpClient(err.to_string()))?;
        Ok(Self {
            client,
            retry_delay: options.retry_delay,
        })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| TransportFailure::Connection(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportFailure::Status(status.as_u16()));
        }
        let body = response
            .bytes()
            .map_err(|err| TransportFailure::Connection(err.to_string()))?;
        Ok(body.to_vec())
    }

    fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

/// Issues `url` up to `max_retries` times and returns the first successful
/// body. The last failure is reported once every attempt is spent.
pub fn fetch_with_retries<T>(
    transport: &T,
    url: &str,
    max_retries: usize,
) -> Result<Vec<u8>, EdgesetError>
where
    T: Transport + ?Sized,
{
    fetch_with_retries_as(transport, url, url, max_retries)
}

/// Same as [`fetch_with_retries`], but logs and reports `shown_url` in place
/// of `url`, for request urls that carry credentials.
pub fn fetch_with_retries_as<T>(
    transport: &T,
    url: &str,
    shown_url: &str,
    max_retries: usize,
) -> Result<Vec<u8>, EdgesetError>
where
    T: Transport + ?Sized,
{
    if max_retries == 0 {
        return Err(EdgesetError::InvalidConfig(
            "max_retries must be at least 1".to_string(),
        ));
    }
    let base_delay = transport.retry_delay();
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match transport.get(url) {
            Ok(body) => return Ok(body),
            Err(failure) => {
                warn!(url = %shown_url, attempt, max_retries, "request failed: {failure}");
                if attempt >= max_retries {
                    return Err(EdgesetError::Transport {
                        url: shown_url.to_string(),
                        attempts: attempt,
                        cause: failure.to_string(),
                    });
                }
                if !base_delay.is_zero() {
                    thread::sleep(base_delay * attempt as u32);
                }
            }
        }
    }
}
