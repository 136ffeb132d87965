pub mod bark;
pub mod dingtalk;
pub mod http;
pub mod ntfy;
pub mod pushplus;
pub mod server_chan;

use std::sync::Arc;

use error_stack::Report;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::config::NotifierConfig;
use crate::error::DeliveryError;
use crate::model::{ChannelKind, Notification, NotifyResult};

use bark::Bark;
use dingtalk::DingTalk;
use ntfy::Ntfy;
use pushplus::PushPlus;
use server_chan::ServerChan;

/// A push notification provider.
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Deliver `notification`. Never fails: every error is folded into the
    /// returned `NotifyResult`.
    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, NotifyResult>;
}

/// HTTP POST seam shared by all channels. Responses are returned as parsed
/// JSON; judging success is left to each channel.
pub trait Transport: Send + Sync {
    fn post_json<'a>(
        &'a self,
        url: &'a str,
        body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, Report<DeliveryError>>>;

    fn post_form<'a>(
        &'a self,
        url: &'a str,
        form: &'a [(&'static str, String)],
    ) -> BoxFuture<'a, Result<Value, Report<DeliveryError>>>;

    /// JSON POST with an `Authorization: Bearer` header.
    fn post_json_bearer<'a>(
        &'a self,
        url: &'a str,
        token: &'a str,
        body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, Report<DeliveryError>>>;
}

/// Provider-specific success convention: a numeric code in the JSON body.
#[derive(Debug, Clone, Copy)]
pub struct ResponseRule {
    pub code_field: &'static str,
    pub success_code: i64,
    pub message_field: &'static str,
}

impl ResponseRule {
    /// `Ok(())` when the body carries the success code, otherwise the
    /// provider's error message.
    pub fn check(&self, body: &Value) -> Result<(), String> {
        if body.get(self.code_field).and_then(Value::as_i64) == Some(self.success_code) {
            return Ok(());
        }
        Err(body
            .get(self.message_field)
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_owned())
    }

    /// Fold a whole request outcome into a single-line verdict.
    pub fn judge(&self, response: Result<Value, Report<DeliveryError>>) -> Result<(), String> {
        match response {
            Ok(body) => self.check(&body),
            Err(e) => Err(format!("{e:#}")),
        }
    }
}

fn to_result(kind: ChannelKind, verdict: Result<(), String>) -> NotifyResult {
    match verdict {
        Ok(()) => NotifyResult::delivered(kind, "delivered"),
        Err(message) => NotifyResult::failed(kind, message),
    }
}

/// Build every enabled channel whose configuration is usable, in
/// `ChannelKind::ALL` order. Enabled but incomplete channels are skipped with
/// a warning.
pub fn build_channels(
    config: &NotifierConfig,
    transport: Arc<dyn Transport>,
) -> Vec<Box<dyn Channel>> {
    ChannelKind::ALL
        .into_iter()
        .filter(|kind| config.is_enabled(*kind))
        .filter_map(|kind| {
            let transport = Arc::clone(&transport);
            let channel: Option<Box<dyn Channel>> = match kind {
                ChannelKind::ServerChan => ServerChan::from_config(&config.server_chan, transport)
                    .map(|c| Box::new(c) as Box<dyn Channel>),
                ChannelKind::Bark => {
                    Bark::from_config(&config.bark, transport).map(|c| Box::new(c) as Box<dyn Channel>)
                }
                ChannelKind::PushPlus => PushPlus::from_config(&config.pushplus, transport)
                    .map(|c| Box::new(c) as Box<dyn Channel>),
                ChannelKind::DingTalk => DingTalk::from_config(&config.dingtalk, transport)
                    .map(|c| Box::new(c) as Box<dyn Channel>),
                ChannelKind::Ntfy => {
                    Ntfy::from_config(&config.ntfy, transport).map(|c| Box::new(c) as Box<dyn Channel>)
                }
            };
            if channel.is_none() {
                tracing::warn!(channel = %kind, "channel enabled but not configured, skipping");
            }
            channel
        })
        .collect()
}
