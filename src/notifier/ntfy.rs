use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Value, json};

use crate::config::NtfyConfig;
use crate::model::{ChannelKind, Notification, NotifyResult};
use crate::notifier::{Channel, Transport, to_result};

/// ntfy: JSON publish to the server root, authenticated with a bearer access
/// token. Renders markdown, an icon and a click-through URL.
pub struct Ntfy {
    url: String,
    topic: String,
    token: String,
    tags: Vec<String>,
    transport: Arc<dyn Transport>,
}

impl Ntfy {
    pub fn from_config(config: &NtfyConfig, transport: Arc<dyn Transport>) -> Option<Self> {
        let topic = config.topic.trim();
        let token = config.token.trim();
        if topic.is_empty() || token.is_empty() {
            return None;
        }
        let tags = config
            .tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect();
        Some(Self {
            url: format!("{}/", config.server.trim_end_matches('/')),
            topic: topic.to_owned(),
            token: token.to_owned(),
            tags,
            transport,
        })
    }

    fn payload(&self, notification: &Notification) -> Value {
        let mut payload = json!({
            "topic": self.topic,
            "title": notification.title,
            "message": notification.body,
            "markdown": true,
        });
        if !self.tags.is_empty() {
            payload["tags"] = json!(self.tags);
        }
        if let Some(icon) = &notification.icon {
            payload["icon"] = json!(icon);
        }
        if let Some(url) = &notification.url {
            payload["click"] = json!(url);
        }
        payload
    }
}

/// A published message is echoed back with `"event": "message"`; failures
/// carry an `error` string.
fn check(body: &Value) -> Result<(), String> {
    if body.get("event").and_then(Value::as_str) == Some("message") {
        return Ok(());
    }
    Err(body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_owned())
}

impl Channel for Ntfy {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Ntfy
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, NotifyResult> {
        Box::pin(async move {
            let payload = self.payload(notification);
            let verdict = match self
                .transport
                .post_json_bearer(&self.url, &self.token, &payload)
                .await
            {
                Ok(body) => check(&body),
                Err(e) => Err(format!("{e:#}")),
            };
            to_result(self.kind(), verdict)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::testing::FakeTransport;

    const URL: &str = "https://ntfy.example.com/";

    fn ntfy(tags: Option<&str>, transport: FakeTransport) -> (Ntfy, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let config = NtfyConfig {
            enabled: true,
            server: "https://ntfy.example.com/".into(),
            topic: "rebalance".into(),
            token: " tk_secret ".into(),
            tags: tags.map(str::to_owned),
        };
        (Ntfy::from_config(&config, transport.clone()).unwrap(), transport)
    }

    #[test]
    fn topic_and_token_required() {
        let transport: Arc<dyn Transport> = Arc::new(FakeTransport::default());
        let no_token = NtfyConfig {
            enabled: true,
            topic: "rebalance".into(),
            ..NtfyConfig::default()
        };
        assert!(Ntfy::from_config(&no_token, transport.clone()).is_none());
        let no_topic = NtfyConfig {
            enabled: true,
            token: "tk".into(),
            ..NtfyConfig::default()
        };
        assert!(Ntfy::from_config(&no_topic, transport).is_none());
    }

    #[tokio::test]
    async fn publishes_with_bearer_token_and_rich_fields() {
        let (channel, transport) = ntfy(
            Some("chart_with_upwards_trend, moneybag"),
            FakeTransport::default()
                .respond(URL, json!({"id": "a1", "event": "message", "topic": "rebalance"})),
        );
        let notification = Notification {
            icon: Some("https://img/buy.png".into()),
            url: Some("https://detail".into()),
            ..Notification::new("🟢 买入", "300660")
        };
        let result = channel.send(&notification).await;
        assert!(result.success, "{}", result.message);

        assert_eq!(transport.bearer_tokens(), vec!["tk_secret".to_owned()]);
        let (url, body) = &transport.calls()[0];
        assert_eq!(url, URL);
        assert_eq!(body["topic"], "rebalance");
        assert_eq!(body["message"], "300660");
        assert_eq!(body["icon"], "https://img/buy.png");
        assert_eq!(body["click"], "https://detail");
        assert_eq!(body["tags"], json!(["chart_with_upwards_trend", "moneybag"]));
    }

    #[tokio::test]
    async fn rejected_token_reports_error_field() {
        let (channel, transport) = ntfy(
            None,
            FakeTransport::default()
                .respond(URL, json!({"code": 40101, "http": 401, "error": "unauthorized"})),
        );
        let result = channel.send(&Notification::new("t", "b")).await;
        assert!(!result.success);
        assert_eq!(result.message, "unauthorized");
        assert!(transport.calls()[0].1.get("tags").is_none());
    }
}
