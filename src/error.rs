use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read {source_name}")]
    Read { source_name: String },
    #[display("failed to parse {what}")]
    Parse { what: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum FetchError {
    #[display("failed to launch browser")]
    Launch,
    #[display("failed to load page {url}")]
    Navigation { url: String },
    #[display("failed to extract record from page")]
    Extract,
    #[display("failed to save screenshot")]
    Screenshot,
}

#[derive(Debug, Display, Error)]
pub enum DeliveryError {
    #[display("failed to build http client")]
    Client,
    #[display("push request failed")]
    Request,
    #[display("failed to parse push response")]
    ResponseParse,
}

#[derive(Debug, Display, Error)]
pub enum ScheduleError {
    #[display("invalid cron expression \"{expression}\"")]
    InvalidCron { expression: String },
    #[display("{expression} has no future trigger")]
    NeverFires { expression: String },
    #[display("invalid utc offset: {hours}h")]
    InvalidOffset { hours: i32 },
}

#[derive(Debug, Display, Error)]
pub enum MonitorError {
    #[display("fetch failed")]
    Fetch,
}
