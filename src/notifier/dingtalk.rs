use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Value, json};

use crate::config::DingTalkConfig;
use crate::model::{ChannelKind, Notification, NotifyResult};
use crate::notifier::{Channel, ResponseRule, Transport, to_result};

const RULE: ResponseRule = ResponseRule {
    code_field: "errcode",
    success_code: 0,
    message_field: "errmsg",
};

/// DingTalk custom robot: incoming webhook taking a markdown message.
pub struct DingTalk {
    webhook: String,
    transport: Arc<dyn Transport>,
}

impl DingTalk {
    pub fn from_config(config: &DingTalkConfig, transport: Arc<dyn Transport>) -> Option<Self> {
        let webhook = config.webhook.trim();
        if webhook.is_empty() {
            return None;
        }
        Some(Self {
            webhook: webhook.to_owned(),
            transport,
        })
    }
}

fn markdown_payload(notification: &Notification) -> Value {
    json!({
        "msgtype": "markdown",
        "markdown": {
            "title": notification.title,
            "text": format!("## {}\n\n{}", notification.title, notification.body),
        }
    })
}

impl Channel for DingTalk {
    fn kind(&self) -> ChannelKind {
        ChannelKind::DingTalk
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, NotifyResult> {
        Box::pin(async move {
            let payload = markdown_payload(notification);
            let response = self.transport.post_json(&self.webhook, &payload).await;
            to_result(self.kind(), RULE.judge(response))
        })
    }
}
