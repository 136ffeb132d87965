use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::ServerChanConfig;
use crate::model::{ChannelKind, Notification, NotifyResult};
use crate::notifier::{Channel, ResponseRule, Transport, to_result};

const SERVER_CHAN_BASE_URL: &str = "https://sctapi.ftqq.com";
const MAX_TITLE_CHARS: usize = 256;
const RULE: ResponseRule = ResponseRule {
    code_field: "code",
    success_code: 0,
    message_field: "message",
};

/// ServerChan: the push key is part of the URL, payload is form-encoded.
pub struct ServerChan {
    push_key: String,
    base_url: String,
    transport: Arc<dyn Transport>,
}

impl ServerChan {
    pub fn from_config(config: &ServerChanConfig, transport: Arc<dyn Transport>) -> Option<Self> {
        let push_key = config.push_key.trim();
        if push_key.is_empty() {
            return None;
        }
        Some(Self {
            push_key: push_key.to_owned(),
            base_url: SERVER_CHAN_BASE_URL.into(),
            transport,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}.send", self.base_url, self.push_key)
    }
}

impl Channel for ServerChan {
    fn kind(&self) -> ChannelKind {
        ChannelKind::ServerChan
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, NotifyResult> {
        Box::pin(async move {
            let url = self.endpoint();
            let form = [
                (
                    "title",
                    notification.title.chars().take(MAX_TITLE_CHARS).collect::<String>(),
                ),
                ("desp", notification.body.clone()),
            ];
            let response = self.transport.post_form(&url, &form).await;
            to_result(self.kind(), RULE.judge(response))
        })
    }
}
