use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Value, json};

use crate::config::BarkConfig;
use crate::model::{ChannelKind, Notification, NotifyResult};
use crate::notifier::{Channel, ResponseRule, Transport};

const RULE: ResponseRule = ResponseRule {
    code_field: "code",
    success_code: 200,
    message_field: "message",
};

/// Bark (iOS). Fans out to every configured device key and renders an icon
/// and a click-through URL.
pub struct Bark {
    device_keys: Vec<String>,
    server: String,
    group: String,
    sound: String,
    icon: Option<String>,
    url: Option<String>,
    transport: Arc<dyn Transport>,
}

impl Bark {
    pub fn from_config(config: &BarkConfig, transport: Arc<dyn Transport>) -> Option<Self> {
        let device_keys = split_device_keys(&config.device_key);
        if device_keys.is_empty() {
            return None;
        }
        Some(Self {
            device_keys,
            server: config.server.trim_end_matches('/').to_owned(),
            group: config.group.clone(),
            sound: config.sound.clone(),
            icon: config.icon.clone(),
            url: config.url.clone(),
            transport,
        })
    }

    fn payload(&self, notification: &Notification) -> Value {
        let mut payload = json!({
            "title": notification.title,
            "body": notification.body,
            "group": self.group,
            "sound": self.sound,
        });
        // Per-message values win over the configured defaults.
        if let Some(icon) = notification.icon.as_ref().or(self.icon.as_ref()) {
            payload["icon"] = json!(icon);
        }
        if let Some(url) = notification.url.as_ref().or(self.url.as_ref()) {
            payload["url"] = json!(url);
        }
        payload
    }
}

fn split_device_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .collect()
}

impl Channel for Bark {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Bark
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, NotifyResult> {
        Box::pin(async move {
            let payload = self.payload(notification);
            let total = self.device_keys.len();
            let mut failures = Vec::new();

            for (index, key) in self.device_keys.iter().enumerate() {
                let url = format!("{}/{}", self.server, key);
                let response = self.transport.post_json(&url, &payload).await;
                // Devices are reported by position so keys never reach the logs.
                if let Err(message) = RULE.judge(response) {
                    failures.push(format!("device {}: {message}", index + 1));
                }
            }

            let succeeded = total - failures.len();
            if failures.is_empty() {
                NotifyResult::delivered(self.kind(), format!("delivered ({succeeded}/{total} devices)"))
            } else if succeeded > 0 {
                // Partial delivery still counts as channel success.
                NotifyResult::delivered(
                    self.kind(),
                    format!(
                        "partial success ({succeeded}/{total} devices), failed: {}",
                        failures.join("; ")
                    ),
                )
            } else {
                NotifyResult::failed(
                    self.kind(),
                    format!("all failed ({total} devices): {}", failures.join("; ")),
                )
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::testing::FakeTransport;

    fn bark(device_key: &str, transport: FakeTransport) -> (Bark, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let config = BarkConfig {
            enabled: true,
            device_key: device_key.into(),
            server: "https://bark.example.com/".into(),
            icon: Some("https://example.com/default.png".into()),
            ..BarkConfig::default()
        };
        (Bark::from_config(&config, transport.clone()).unwrap(), transport)
    }

    #[test]
    fn device_keys_split_on_commas() {
        assert_eq!(split_device_keys(" a, ,b,"), vec!["a", "b"]);
        assert!(split_device_keys(" , ").is_empty());
    }

    #[test]
    fn requires_a_device_key() {
        let config = BarkConfig {
            enabled: true,
            ..BarkConfig::default()
        };
        assert!(Bark::from_config(&config, Arc::new(FakeTransport::default())).is_none());
    }

    #[tokio::test]
    async fn delivers_to_every_device_with_icon_and_url() {
        let ok = json!({"code": 200, "message": "success"});
        let (bark, transport) = bark(
            "k1,k2",
            FakeTransport::default()
                .respond("https://bark.example.com/k1", ok.clone())
                .respond("https://bark.example.com/k2", ok),
        );
        let notification = Notification {
            icon: Some("https://example.com/buy.png".into()),
            url: Some("https://example.com/detail".into()),
            ..Notification::new("🟢 买入", "300660")
        };

        let result = bark.send(&notification).await;
        assert!(result.success);
        assert_eq!(result.message, "delivered (2/2 devices)");

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1["icon"], "https://example.com/buy.png");
        assert_eq!(calls[0].1["url"], "https://example.com/detail");
        assert_eq!(calls[0].1["group"], "股票监控");
        assert_eq!(calls[0].1["sound"], "default");
    }

    #[tokio::test]
    async fn falls_back_to_configured_icon() {
        let (bark, transport) = bark(
            "k1",
            FakeTransport::default().respond("https://bark.example.com/k1", json!({"code": 200})),
        );
        bark.send(&Notification::new("t", "b")).await;
        let calls = transport.calls();
        assert_eq!(calls[0].1["icon"], "https://example.com/default.png");
        assert!(calls[0].1.get("url").is_none());
    }

    #[tokio::test]
    async fn partial_delivery_counts_as_success() {
        let (bark, _) = bark(
            "k1,k2",
            FakeTransport::default().respond("https://bark.example.com/k1", json!({"code": 200})),
        );
        let result = bark.send(&Notification::new("t", "b")).await;
        assert!(result.success);
        assert!(result.message.starts_with("partial success (1/2 devices)"));
        assert!(result.message.contains("device 2"));
        assert!(!result.message.contains("k2"));
    }

    #[tokio::test]
    async fn all_devices_failing_is_failure() {
        let (bark, _) = bark(
            "k1,k2",
            FakeTransport::default()
                .respond("https://bark.example.com/k1", json!({"code": 400, "message": "bad key"})),
        );
        let result = bark.send(&Notification::new("t", "b")).await;
        assert!(!result.success);
        assert!(result.message.starts_with("all failed (2 devices)"));
        assert!(result.message.contains("device 1: bad key"));
    }
}
