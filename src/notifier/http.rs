use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::DeliveryError;
use crate::notifier::Transport;

pub const PUSH_TIMEOUT_SECS: u64 = 10;

/// `reqwest`-backed transport. URLs are stripped from errors because several
/// providers carry the secret key in the path.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, Report<DeliveryError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PUSH_TIMEOUT_SECS))
            .build()
            .change_context(DeliveryError::Client)?;
        Ok(Self { client })
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, Report<DeliveryError>> {
        let status = response.status();
        response
            .json::<Value>()
            .await
            .map_err(reqwest::Error::without_url)
            .change_context(DeliveryError::ResponseParse)
            .attach_with(|| format!("HTTP status: {status}"))
    }
}

impl Transport for HttpTransport {
    fn post_json<'a>(
        &'a self,
        url: &'a str,
        body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, Report<DeliveryError>>> {
        Box::pin(async move {
            let response = self
                .client
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(reqwest::Error::without_url)
                .change_context(DeliveryError::Request)?;
            Self::read_json(response).await
        })
    }

    fn post_form<'a>(
        &'a self,
        url: &'a str,
        form: &'a [(&'static str, String)],
    ) -> BoxFuture<'a, Result<Value, Report<DeliveryError>>> {
        Box::pin(async move {
            let response = self
                .client
                .post(url)
                .form(form)
                .send()
                .await
                .map_err(reqwest::Error::without_url)
                .change_context(DeliveryError::Request)?;
            Self::read_json(response).await
        })
    }

    fn post_json_bearer<'a>(
        &'a self,
        url: &'a str,
        token: &'a str,
        body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, Report<DeliveryError>>> {
        Box::pin(async move {
            let response = self
                .client
                .post(url)
                .bearer_auth(token)
                .json(body)
                .send()
                .await
                .map_err(reqwest::Error::without_url)
                .change_context(DeliveryError::Request)?;
            Self::read_json(response).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds() {
        assert!(HttpTransport::new().is_ok());
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_unreachable_host_is_request_error() {
        let transport = HttpTransport::new().unwrap();
        let result = transport
            .post_json("http://127.0.0.1:9/push", &serde_json::json!({}))
            .await;
        let report = result.unwrap_err();
        assert!(matches!(report.current_context(), DeliveryError::Request));
    }
}
