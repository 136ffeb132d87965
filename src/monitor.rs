use error_stack::{Report, ResultExt};
use tracing::{info, warn};

use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::error::MonitorError;
use crate::fetcher::Fetcher;
use crate::model::{Record, RecordKey};

/// Process-lifetime state of the poll loop. Nothing here survives a restart.
#[derive(Debug, Default)]
pub struct MonitorState {
    pub last_seen_key: Option<RecordKey>,
    pub check_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// First observation since start; remembered without notifying.
    Baseline,
    Changed,
    Unchanged,
}

/// Compare `record` against the last seen key and remember it.
///
/// Only the latest key is kept, so returning to an older key counts as a change.
pub fn detect(state: &mut MonitorState, record: &Record) -> Detection {
    let key = record.key();
    match &state.last_seen_key {
        None => {
            state.last_seen_key = Some(key);
            Detection::Baseline
        }
        Some(last) if *last == key => Detection::Unchanged,
        Some(_) => {
            state.last_seen_key = Some(key);
            Detection::Changed
        }
    }
}

#[derive(Debug)]
pub enum CheckOutcome {
    NoData,
    Baseline(Record),
    Unchanged,
    Changed(Record, DispatchReport),
}

/// Fetch -> detect -> dispatch pipeline for one check.
pub struct Monitor {
    fetcher: Box<dyn Fetcher>,
    dispatcher: Dispatcher,
    state: MonitorState,
}

impl Monitor {
    pub fn new(fetcher: Box<dyn Fetcher>, dispatcher: Dispatcher) -> Self {
        Self {
            fetcher,
            dispatcher,
            state: MonitorState::default(),
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub async fn check_once(&mut self) -> Result<CheckOutcome, Report<MonitorError>> {
        self.state.check_count += 1;
        info!(check = self.state.check_count, "checking");

        let record = self
            .fetcher
            .fetch()
            .await
            .change_context(MonitorError::Fetch)?;

        let Some(record) = record else {
            warn!("no record fetched, check selectors or network");
            return Ok(CheckOutcome::NoData);
        };

        match detect(&mut self.state, &record) {
            Detection::Baseline => {
                info!(
                    instrument = %record.instrument_code,
                    trade_type = %record.trade_type,
                    trade_time = %record.trade_time,
                    "baseline recorded"
                );
                Ok(CheckOutcome::Baseline(record))
            }
            Detection::Unchanged => {
                info!("no change");
                Ok(CheckOutcome::Unchanged)
            }
            Detection::Changed => {
                info!(
                    instrument = %record.instrument_code,
                    trade_type = %record.trade_type,
                    trade_time = %record.trade_time,
                    "new rebalancing detected"
                );
                let report = self.dispatcher.notify(&record).await;
                Ok(CheckOutcome::Changed(record, report))
            }
        }
    }

    pub async fn shutdown(&mut self) {
        self.fetcher.shutdown().await;
    }
}
