use tracing::{info, warn};

use crate::config::IconConfig;
use crate::model::{ChannelKind, Notification, NotifyResult, Record};
use crate::notifier::Channel;

const BUY_MARKER: &str = "买";
const SELL_MARKER: &str = "卖";
const BUY_TITLE: &str = "🟢 买入";
const SELL_TITLE: &str = "🔴 卖出";

/// Per-channel results of one dispatch, in invocation order.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub results: Vec<NotifyResult>,
}

impl DispatchReport {
    pub fn any_success(&self) -> bool {
        self.results.iter().any(|r| r.success)
    }

    pub fn all_success(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.success)
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Formats changed records and fans them out to every channel.
pub struct Dispatcher {
    channels: Vec<Box<dyn Channel>>,
    icons: IconConfig,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Channel>>, icons: IconConfig) -> Self {
        Self { channels, icons }
    }

    pub fn channel_kinds(&self) -> Vec<ChannelKind> {
        self.channels.iter().map(|c| c.kind()).collect()
    }

    pub async fn notify(&self, record: &Record) -> DispatchReport {
        let notification = format_notification(record, &self.icons);
        self.send(&notification).await
    }

    /// Deliver to every channel in turn. A failing channel never stops the
    /// remaining ones.
    pub async fn send(&self, notification: &Notification) -> DispatchReport {
        if self.channels.is_empty() {
            warn!("no notification channel enabled, nothing sent");
            return DispatchReport::default();
        }

        let plain = notification.plain();
        let mut results = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let kind = channel.kind();
            let message = if kind.supports_rich_fields() {
                notification
            } else {
                &plain
            };

            let result = channel.send(message).await;
            if result.success {
                info!(channel = %kind, message = %result.message, "notification sent");
            } else {
                warn!(channel = %kind, message = %result.message, "notification failed");
            }
            results.push(result);
        }

        let report = DispatchReport { results };
        info!(
            succeeded = report.success_count(),
            total = report.len(),
            "dispatch complete"
        );
        report
    }
}

/// Build title, body and icon for a record.
pub fn format_notification(record: &Record, icons: &IconConfig) -> Notification {
    let (title, icon) = if record.trade_type.contains(BUY_MARKER) {
        (BUY_TITLE.to_owned(), icons.buy.clone())
    } else if record.trade_type.contains(SELL_MARKER) {
        (SELL_TITLE.to_owned(), icons.sell.clone())
    } else {
        (format!("📈 {}", record.trade_type), None)
    };

    Notification {
        title,
        body: format_body(record),
        icon,
        url: record.detail_url.clone(),
    }
}

fn format_body(record: &Record) -> String {
    let mut lines = Vec::new();
    if !record.instrument_code.is_empty() {
        lines.push(record.instrument_code.clone());
    }

    let detail: Vec<&str> = [record.price.as_str(), record.position_change.as_str()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    if !detail.is_empty() {
        lines.push(detail.join(" | "));
    }

    lines.join("\n")
}
