mod json_ext;

use crate::observability::metrics::HTTP_REQUEST_DURATION_SECONDS;
use crate::prelude::*;
use async_trait::async_trait;
use reqwest_middleware::RequestBuilder;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use std::time::Duration;
use task_local_extensions::Extensions;

pub(crate) mod prelude {
    pub(crate) use super::json_ext::RequestBuilderJsonExt as _;
}

pub(crate) type Client = reqwest_middleware::ClientWithMiddleware;

pub(crate) fn default_retry_policy() -> ExponentialBackoff {
    // Retry exponentially increasing intervals between attempts.
    ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(100), Duration::from_secs(2))
        .build_with_max_retries(3)
}

pub(crate) fn create_client(timeout: Duration) -> Result<Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .fatal_ctx(|| "Failed to build the HTTP client")?;

    let client = reqwest_middleware::ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(
            default_retry_policy(),
        ))
        .with(ObservingMiddleware)
        .with_init(|request_builder: RequestBuilder| {
            request_builder.header(
                "User-Agent",
                concat!("sportcast-tg/", env!("CARGO_PKG_VERSION")),
            )
        })
        .build();

    Ok(client)
}

/// Logs and measures every real request, so retries appear as separate entries
struct ObservingMiddleware;

#[async_trait]
impl reqwest_middleware::Middleware for ObservingMiddleware {
    async fn handle(
        &self,
        request: reqwest::Request,
        extensions: &mut Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let span = info_span!(
            "request",
            method = %request.method(),
            url = %request.url(),
        );

        let host = request.url().host_str().unwrap_or("{unknown}").to_owned();
        let method = request.method().to_string();

        let (result, duration) = next
            .run(request, extensions)
            .instrument(span.clone())
            .with_duration()
            .await;

        let status = match &result {
            Ok(response) => response.status().as_u16().to_string(),
            Err(_) => "{fatal}".to_owned(),
        };

        metrics::histogram!(
            HTTP_REQUEST_DURATION_SECONDS,
            duration.as_secs_f64(),
            "host" => host,
            "method" => method,
            "status" => status
        );

        span.in_scope(|| log_response(&result, duration));

        result
    }
}

fn log_response(result: &reqwest_middleware::Result<reqwest::Response>, duration: Duration) {
    let duration = tracing_duration(duration);

    let response = match result {
        Ok(response) => response,
        Err(err) => {
            error!(duration, err = tracing_err(err), "Network request failed");
            return;
        }
    };

    let status = response.status();

    let Err(err) = response.error_for_status_ref() else {
        info!(duration, %status, "Network request succeeded");
        return;
    };

    warn!(
        err = tracing_err(&err),
        duration,
        %status,
        "Network request failed (error status)"
    );
}

/// Errors at the layer of the HTTP API
#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    #[error("HTTP request failed")]
    Request { source: reqwest_middleware::Error },

    #[error("Failed to read HTTP response")]
    ReadPayload { source: reqwest::Error },

    #[error("Failed to serialize the HTTP request body")]
    SerializeRequest { source: serde_json::Error },

    #[error("HTTP request has failed (HTTP status code: {status}):\n{body}")]
    BadResponseStatusCode {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Received an unexpected response JSON object")]
    UnexpectedResponseJsonShape { source: serde_json::Error },
}
