//! Single-attempt HTTP dispatch and outcome classification.

use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Request, StatusCode,
};
use tracing::{info, warn};
use url::Url;

use super::sink::OutcomeSink;
use crate::error::DispatchError;
use crate::message::{Disposition, Outcome, RequestDescriptor};

/// Issues the POST described by a [`RequestDescriptor`].
///
/// Cheap to clone: clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Client,
    timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with its own pooled HTTP client.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().pool_max_idle_per_host(100).build()?;
        Ok(Self::with_client(client, timeout))
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Make exactly one attempt and push the completed descriptor to `sink`.
    ///
    /// Never retries and never fails towards the caller: every failure ends
    /// up in the outcome.
    pub async fn dispatch(&self, descriptor: RequestDescriptor, sink: &OutcomeSink) {
        let outcome = self.attempt(&descriptor).await;

        info!(
            message_id = %descriptor.message_id,
            disposition = outcome.disposition.as_str(),
            status = %outcome.status_text,
            error = ?outcome.disposition.error().map(|e| e.to_string()),
            retry_count = descriptor.retry_count,
            "dispatch_complete"
        );

        sink.report(descriptor.with_outcome(outcome)).await;
    }

    /// Perform the HTTP call and classify the result.
    pub async fn attempt(&self, descriptor: &RequestDescriptor) -> Outcome {
        let request = match self.build_request(descriptor) {
            Ok(request) => request,
            Err(err) => {
                warn!(
                    message_id = %descriptor.message_id,
                    url = %descriptor.url,
                    error = %err,
                    "dispatch_request_invalid"
                );
                return Outcome {
                    status_text: err.to_string(),
                    response_body: String::new(),
                    disposition: Disposition::Dropped(err),
                };
            }
        };

        info!(
            message_id = %descriptor.message_id,
            url = %descriptor.url,
            timeout_seconds = self.timeout.as_secs_f64(),
            "dispatch_request_sending"
        );

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                let err = DispatchError::Transport {
                    message: e.to_string(),
                    timed_out: e.is_timeout(),
                };
                if e.is_timeout() {
                    warn!(
                        message_id = %descriptor.message_id,
                        url = %descriptor.url,
                        timeout_seconds = self.timeout.as_secs_f64(),
                        error = %e,
                        "dispatch_request_timeout"
                    );
                } else {
                    warn!(
                        message_id = %descriptor.message_id,
                        url = %descriptor.url,
                        error = %e,
                        "dispatch_request_error"
                    );
                }
                return Outcome {
                    status_text: err.to_string(),
                    response_body: String::new(),
                    disposition: Disposition::RetryEligible(err),
                };
            }
        };

        let status = response.status();
        let status_text = status_line(status);

        // The body is informational; losing it does not change the verdict.
        let response_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    message_id = %descriptor.message_id,
                    status = %status_text,
                    error = %e,
                    "dispatch_response_body_unreadable"
                );
                format!("error reading response body: {}", e)
            }
        };

        let disposition = classify(status.as_u16(), &status_text);

        Outcome {
            status_text,
            response_body,
            disposition,
        }
    }

    fn build_request(&self, descriptor: &RequestDescriptor) -> Result<Request, DispatchError> {
        let url = Url::parse(&descriptor.url)
            .map_err(|e| DispatchError::Construction(format!("{}: {}", descriptor.url, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(DispatchError::Construction(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        self.client
            .post(url)
            .timeout(self.timeout)
            .headers(header_map(descriptor)?)
            .body(descriptor.body.clone())
            .build()
            .map_err(|e| DispatchError::Construction(e.to_string()))
    }
}

/// One value per header name. Names are case-insensitive, so keys differing
/// only in case replace each other instead of being sent twice.
fn header_map(descriptor: &RequestDescriptor) -> Result<HeaderMap, DispatchError> {
    let mut headers = HeaderMap::with_capacity(descriptor.headers.len());
    for (key, value) in &descriptor.headers {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            DispatchError::Construction(format!("header name '{}': {}", key, e))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            DispatchError::Construction(format!("header '{}' value: {}", key, e))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Map a response status to a disposition.
///
/// 4xx is checked first: the request itself is wrong and will never succeed.
pub fn classify(status: u16, status_text: &str) -> Disposition {
    match status {
        400..=499 => Disposition::Dropped(DispatchError::ClientStatus {
            status,
            status_text: status_text.to_string(),
        }),
        200..=299 => Disposition::Accepted,
        _ => Disposition::RetryEligible(DispatchError::UnexpectedStatus {
            status,
            status_text: status_text.to_string(),
        }),
    }
}

/// "404 Not Found" style status line.
fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
