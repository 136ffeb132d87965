use std::fmt;

/// One scraped rebalancing event: the top entry of the trade record page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub trade_type: String,
    pub instrument_code: String,
    pub position_change: String,
    pub trade_time: String,
    pub price: String,
    pub reason: String,
    pub detail_url: Option<String>,
}

impl Record {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            instrument_code: self.instrument_code.clone(),
            trade_time: self.trade_time.clone(),
            trade_type: self.trade_type.clone(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "trade type:      {}", self.trade_type)?;
        writeln!(f, "instrument:      {}", self.instrument_code)?;
        writeln!(f, "position change: {}", self.position_change)?;
        writeln!(f, "trade time:      {}", self.trade_time)?;
        writeln!(f, "price:           {}", self.price)?;
        write!(f, "reason:          {}", self.reason)
    }
}

/// Identity of a record for change detection.
///
/// Price, reason and position change are deliberately excluded: two records
/// with the same key are the same event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub instrument_code: String,
    pub trade_time: String,
    pub trade_type: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.instrument_code, self.trade_time, self.trade_type
        )
    }
}

/// Push channel identity. The set is closed; every variant has exactly one
/// implementation in `notifier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    ServerChan,
    Bark,
    PushPlus,
    DingTalk,
    Ntfy,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 5] = [
        ChannelKind::ServerChan,
        ChannelKind::Bark,
        ChannelKind::PushPlus,
        ChannelKind::DingTalk,
        ChannelKind::Ntfy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServerChan => "server_chan",
            Self::Bark => "bark",
            Self::PushPlus => "pushplus",
            Self::DingTalk => "dingtalk",
            Self::Ntfy => "ntfy",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ServerChan => "ServerChan push (https://sct.ftqq.com)",
            Self::Bark => "Bark iOS push, multiple devices (https://github.com/Finb/Bark)",
            Self::PushPlus => "PushPlus push to WeChat and others (https://www.pushplus.plus)",
            Self::DingTalk => "DingTalk robot webhook, markdown message",
            Self::Ntfy => "ntfy topic push, bearer token auth (https://ntfy.sh)",
        }
    }

    /// Whether the channel renders an icon and a click-through URL.
    pub fn supports_rich_fields(self) -> bool {
        matches!(self, Self::Bark | Self::Ntfy)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A formatted message ready to be pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub url: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: None,
            url: None,
        }
    }

    /// Copy without icon and click-through URL.
    pub fn plain(&self) -> Self {
        Self {
            title: self.title.clone(),
            body: self.body.clone(),
            icon: None,
            url: None,
        }
    }
}

/// Outcome of one delivery attempt on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyResult {
    pub success: bool,
    pub channel: ChannelKind,
    pub message: String,
}

impl NotifyResult {
    pub fn delivered(channel: ChannelKind, message: impl Into<String>) -> Self {
        Self {
            success: true,
            channel,
            message: message.into(),
        }
    }

    pub fn failed(channel: ChannelKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            channel,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(price: &str, reason: &str) -> Record {
        Record {
            trade_type: "买入".into(),
            instrument_code: "300660".into(),
            position_change: "0% → 10%".into(),
            trade_time: "2024-05-06 10:31".into(),
            price: price.into(),
            reason: reason.into(),
            detail_url: None,
        }
    }

    #[test]
    fn key_ignores_price_and_reason() {
        assert_eq!(record("1元", "a").key(), record("2元", "b").key());
    }

    #[test]
    fn key_display_joins_fields() {
        assert_eq!(
            record("1元", "").key().to_string(),
            "300660|2024-05-06 10:31|买入"
        );
    }

    #[test]
    fn rich_fields_only_on_bark_and_ntfy() {
        let rich: Vec<_> = ChannelKind::ALL
            .into_iter()
            .filter(|k| k.supports_rich_fields())
            .collect();
        assert_eq!(rich, vec![ChannelKind::Bark, ChannelKind::Ntfy]);
    }

    #[test]
    fn plain_strips_icon_and_url() {
        let n = Notification {
            icon: Some("i".into()),
            url: Some("u".into()),
            ..Notification::new("t", "b")
        };
        assert_eq!(n.plain(), Notification::new("t", "b"));
    }
}
