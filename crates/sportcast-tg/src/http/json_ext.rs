use super::HttpClientError;
use crate::prelude::*;
use async_trait::async_trait;
use easy_ext::ext;
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use reqwest_middleware::RequestBuilder;
use serde::{de::DeserializeOwned, Serialize};

#[ext(RequestBuilderJsonExt)]
#[async_trait]
pub(crate) impl RequestBuilder {
    async fn send_and_read_json<Req: Serialize + Send + Sync, Res: DeserializeOwned>(
        self,
        req: Req,
    ) -> Result<Res> {
        let body = serde_json::to_vec(&req).map_err(err_ctx!(HttpClientError::SerializeRequest))?;

        self.header(CONTENT_TYPE, "application/json")
            .body(body)
            .read_json()
            .await
    }

    async fn read_json<Res: DeserializeOwned>(self) -> Result<Res> {
        let bytes = self
            .try_send()
            .await?
            .bytes()
            .await
            .map_err(err_ctx!(HttpClientError::ReadPayload))?;

        serde_json::from_slice(&bytes).map_err(|err| {
            match std::str::from_utf8(&bytes) {
                Ok(response_body) => warn!(%response_body, "Bad JSON response"),
                Err(utf8_decode_err) => warn!(
                    response_body = ?bytes,
                    ?utf8_decode_err,
                    "Bad JSON response"
                ),
            };
            err!(HttpClientError::UnexpectedResponseJsonShape { source: err })
        })
    }

    /// Better version of [`RequestBuilder::send`] that returns an error
    /// if the error response status code is returned.
    async fn try_send(self) -> Result<Response> {
        let response = self
            .send()
            .await
            .map_err(err_ctx!(HttpClientError::Request))?;

        let status = response.status();

        if !status.is_client_error() && !status.is_server_error() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_else(|err| {
            format!(
                "Could not collect the error response body text: {}",
                err.display_chain()
            )
        });

        Err(err!(HttpClientError::BadResponseStatusCode { status, body }))
    }
}
