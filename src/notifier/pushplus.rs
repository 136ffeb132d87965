use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Value, json};

use crate::config::PushPlusConfig;
use crate::model::{ChannelKind, Notification, NotifyResult};
use crate::notifier::{Channel, ResponseRule, Transport, to_result};

const PUSHPLUS_URL: &str = "https://www.pushplus.plus/send";
const RULE: ResponseRule = ResponseRule {
    code_field: "code",
    success_code: 200,
    message_field: "msg",
};

/// PushPlus: token-authenticated JSON push to WeChat and other targets.
pub struct PushPlus {
    token: String,
    template: String,
    channel: String,
    topic: Option<String>,
    transport: Arc<dyn Transport>,
}

impl PushPlus {
    pub fn from_config(config: &PushPlusConfig, transport: Arc<dyn Transport>) -> Option<Self> {
        let token = config.token.trim();
        if token.is_empty() {
            return None;
        }
        Some(Self {
            token: token.to_owned(),
            template: config.template.clone(),
            channel: config.channel.clone(),
            topic: config.topic.clone(),
            transport,
        })
    }

    fn payload(&self, notification: &Notification) -> Value {
        let mut payload = json!({
            "token": self.token,
            "title": notification.title,
            "content": notification.body,
            "template": self.template,
            "channel": self.channel,
        });
        if let Some(topic) = &self.topic {
            payload["topic"] = json!(topic);
        }
        payload
    }
}

impl Channel for PushPlus {
    fn kind(&self) -> ChannelKind {
        ChannelKind::PushPlus
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, NotifyResult> {
        Box::pin(async move {
            let payload = self.payload(notification);
            let response = self.transport.post_json(PUSHPLUS_URL, &payload).await;
            to_result(self.kind(), RULE.judge(response))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::testing::FakeTransport;

    fn pushplus(topic: Option<&str>, transport: FakeTransport) -> (PushPlus, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let config = PushPlusConfig {
            enabled: true,
            token: "tok".into(),
            topic: topic.map(str::to_owned),
            ..PushPlusConfig::default()
        };
        (PushPlus::from_config(&config, transport.clone()).unwrap(), transport)
    }

    #[tokio::test]
    async fn sends_token_template_and_topic() {
        let (channel, transport) = pushplus(
            Some("team"),
            FakeTransport::default().respond(PUSHPLUS_URL, json!({"code": 200, "msg": "请求成功"})),
        );
        let result = channel.send(&Notification::new("t", "b")).await;
        assert!(result.success);

        let body = &transport.calls()[0].1;
        assert_eq!(body["token"], "tok");
        assert_eq!(body["content"], "b");
        assert_eq!(body["template"], "markdown");
        assert_eq!(body["channel"], "wechat");
        assert_eq!(body["topic"], "team");
    }

    #[tokio::test]
    async fn error_code_reports_msg_field() {
        let (channel, transport) = pushplus(
            None,
            FakeTransport::default().respond(PUSHPLUS_URL, json!({"code": 903, "msg": "无效的用户token"})),
        );
        let result = channel.send(&Notification::new("t", "b")).await;
        assert!(!result.success);
        assert_eq!(result.message, "无效的用户token");
        assert!(transport.calls()[0].1.get("topic").is_none());
    }
}
