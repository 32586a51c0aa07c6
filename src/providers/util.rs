use crate::core::error::ProviderError;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub(crate) const USER_AGENT: &str = concat!("valutatrade/", env!("CARGO_PKG_VERSION"));

pub(crate) fn http_client(provider: &str, timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Http {
            provider: provider.to_string(),
            status: None,
            message: format!("failed to build client: {e}"),
        })
}

/// Maps a transport error onto the provider error taxonomy.
pub(crate) fn classify(provider: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
        }
    } else if err.is_decode() {
        ProviderError::Parse {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    } else {
        ProviderError::Http {
            provider: provider.to_string(),
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Sends a GET and decodes a 2xx JSON body.
pub(crate) async fn get_json<T: DeserializeOwned>(
    provider: &str,
    client: &reqwest::Client,
    url: reqwest::Url,
) -> Result<T, ProviderError> {
    debug!("Requesting rates from {}", redact(&url));
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        let message = match status.as_u16() {
            429 => "too many requests".to_string(),
            401 | 403 => "invalid or blocked API key".to_string(),
            s if (500..=599).contains(&s) => "server error".to_string(),
            _ => {
                let body = response.text().await.unwrap_or_default();
                body.chars().take(200).collect()
            }
        };
        return Err(ProviderError::Http {
            provider: provider.to_string(),
            status: Some(status.as_u16()),
            message,
        });
    }

    let text = response.text().await.map_err(|e| classify(provider, e))?;
    serde_json::from_str(&text).map_err(|e| ProviderError::Parse {
        provider: provider.to_string(),
        message: e.to_string(),
    })
}

/// URL for logging, without path segments that may carry secrets.
fn redact(url: &reqwest::Url) -> String {
    format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default())
}

/// Retries an async provider call on transient failures
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful result or the error of the last attempt
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries || !err.is_transient() {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
