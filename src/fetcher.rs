pub mod browser;

use std::path::Path;

use error_stack::Report;
use futures::future::BoxFuture;
use serde::Deserialize;

use crate::error::FetchError;
use crate::model::Record;

/// Source of the current top record.
///
/// Uses `BoxFuture` instead of `async fn` in trait to keep the trait
/// object-safe (`dyn Fetcher`).
pub trait Fetcher: Send {
    /// Fetch the top record. `Ok(None)` means the page had no matching record;
    /// errors are reserved for transport and browser failures.
    fn fetch(&self) -> BoxFuture<'_, Result<Option<Record>, Report<FetchError>>>;

    /// Save a full-page screenshot of whatever is currently loaded.
    fn screenshot<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), Report<FetchError>>>;

    /// Release the underlying browser session.
    fn shutdown(&mut self) -> BoxFuture<'_, ()>;
}

const UNKNOWN_TRADE_TYPE: &str = "未知";

/// Cell texts extracted from the first record element, before cleanup.
#[derive(Debug, Default, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub trade_type: String,
    #[serde(default)]
    pub instrument: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub reason: String,
}

impl RawRecord {
    pub fn into_record(self, detail_url: Option<String>) -> Record {
        let trade_type = self.trade_type.trim();
        Record {
            trade_type: if trade_type.is_empty() {
                UNKNOWN_TRADE_TYPE.to_owned()
            } else {
                trade_type.to_owned()
            },
            instrument_code: self.instrument.trim().to_owned(),
            position_change: strip_label(&self.position),
            trade_time: strip_label(&self.time),
            price: strip_label(&self.price),
            reason: self.reason.trim().to_owned(),
            detail_url,
        }
    }
}

/// Reduce `"个股仓位：13.94% → 29.95%"` to `"13.94% → 29.95%"`. Text without a
/// full-width colon is returned trimmed.
pub fn strip_label(text: &str) -> String {
    let text = text.trim();
    match text.split_once('：') {
        Some((_, value)) => value.trim().to_owned(),
        None => text.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_label_takes_text_after_first_fullwidth_colon() {
        assert_eq!(strip_label(" 个股仓位：13.94% → 29.95% "), "13.94% → 29.95%");
        assert_eq!(strip_label("调仓时间：2024-05-06 10:31：00"), "2024-05-06 10:31：00");
        assert_eq!(strip_label("52.28元"), "52.28元");
        assert_eq!(strip_label(""), "");
    }

    #[test]
    fn raw_record_cleans_cells() {
        let raw: RawRecord = serde_json::from_str(
            r#"{
                "trade_type": " 买入 ",
                "instrument": "中科创达 300660\n",
                "position": "个股仓位：13.94% → 29.95%",
                "time": "调仓时间：2024-05-06 10:31",
                "price": "成交价格：52.28元",
                "reason": " 看好 "
            }"#,
        )
        .unwrap();
        let record = raw.into_record(Some("https://example.com".into()));
        assert_eq!(record.trade_type, "买入");
        assert_eq!(record.instrument_code, "中科创达 300660");
        assert_eq!(record.position_change, "13.94% → 29.95%");
        assert_eq!(record.trade_time, "2024-05-06 10:31");
        assert_eq!(record.price, "52.28元");
        assert_eq!(record.reason, "看好");
        assert_eq!(record.detail_url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn missing_trade_type_becomes_unknown() {
        let raw: RawRecord = serde_json::from_str(r#"{"instrument": "300660"}"#).unwrap();
        let record = raw.into_record(None);
        assert_eq!(record.trade_type, UNKNOWN_TRADE_TYPE);
        assert_eq!(record.price, "");
    }
}
