use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use error_stack::Report;

use crate::error::ConfigError;
use crate::model::ChannelKind;

const DEFAULT_TARGET_URL: &str =
    "https://m.stock.pingan.com/invest/zuhe/tradeRecord.html?productNo=5149";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1";
const DEFAULT_BUY_ICON: &str =
    "https://raw.githubusercontent.com/SoftwarePianist/sbPush/main/assets/buy_icon.png";
const DEFAULT_SELL_ICON: &str =
    "https://raw.githubusercontent.com/SoftwarePianist/sbPush/main/assets/sell_icon.png";
const DEFAULT_BARK_SERVER: &str = "https://api.day.app";
const DEFAULT_NTFY_SERVER: &str = "https://ntfy.sh";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub target_url: String,
    pub schedule: ScheduleConfig,
    pub browser: BrowserConfig,
    pub cookies: CookieConfig,
    pub icons: IconConfig,
    pub notifiers: NotifierConfig,
}

#[derive(Debug, Clone)]
pub struct GeneralConfig {
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    pub log_format: String,
    /// Also append log lines to this file when set.
    pub log_file: Option<PathBuf>,
}

/// How checks are triggered. A cron expression wins over the interval when
/// both are configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleConfig {
    Interval { seconds: u64 },
    Cron { expression: String, utc_offset_hours: i32 },
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub page_timeout: Duration,
    pub render_wait: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieSource {
    None,
    Inline(String),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub source: CookieSource,
    /// Trusted domain suffix; cookies for other domains are dropped.
    pub domain: String,
}

#[derive(Debug, Clone)]
pub struct IconConfig {
    pub buy: Option<String>,
    pub sell: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    pub server_chan: ServerChanConfig,
    pub bark: BarkConfig,
    pub pushplus: PushPlusConfig,
    pub dingtalk: DingTalkConfig,
    pub ntfy: NtfyConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ServerChanConfig {
    pub enabled: bool,
    pub push_key: String,
}

#[derive(Debug, Clone)]
pub struct BarkConfig {
    pub enabled: bool,
    /// Comma-separated list of device keys.
    pub device_key: String,
    pub server: String,
    pub group: String,
    pub sound: String,
    pub icon: Option<String>,
    pub url: Option<String>,
}

impl Default for BarkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device_key: String::new(),
            server: DEFAULT_BARK_SERVER.into(),
            group: "股票监控".into(),
            sound: "default".into(),
            icon: None,
            url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PushPlusConfig {
    pub enabled: bool,
    pub token: String,
    pub channel: String,
    pub template: String,
    pub topic: Option<String>,
}

impl Default for PushPlusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            channel: "wechat".into(),
            template: "markdown".into(),
            topic: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DingTalkConfig {
    pub enabled: bool,
    pub webhook: String,
}

#[derive(Debug, Clone)]
pub struct NtfyConfig {
    pub enabled: bool,
    pub server: String,
    pub topic: String,
    /// Access token sent as `Authorization: Bearer`.
    pub token: String,
    /// Comma-separated ntfy tags (emoji shortcodes).
    pub tags: Option<String>,
}

impl Default for NtfyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: DEFAULT_NTFY_SERVER.into(),
            topic: String::new(),
            token: String::new(),
            tags: None,
        }
    }
}

impl NotifierConfig {
    pub fn is_enabled(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::ServerChan => self.server_chan.enabled,
            ChannelKind::Bark => self.bark.enabled,
            ChannelKind::PushPlus => self.pushplus.enabled,
            ChannelKind::DingTalk => self.dingtalk.enabled,
            ChannelKind::Ntfy => self.ntfy.enabled,
        }
    }

    pub fn any_enabled(&self) -> bool {
        ChannelKind::ALL.into_iter().any(|k| self.is_enabled(k))
    }
}

/// Load an `AppConfig` from the process environment.
pub fn load() -> Result<AppConfig, Report<ConfigError>> {
    load_with(|key| std::env::var(key).ok())
}

/// Load an `AppConfig` reading every key through `lookup`.
///
/// Empty values are treated as unset.
pub fn load_with<F>(lookup: F) -> Result<AppConfig, Report<ConfigError>>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };

    let schedule = match env.string("CRON_EXPRESSION") {
        Some(expression) => ScheduleConfig::Cron {
            expression,
            utc_offset_hours: env.number("CRON_UTC_OFFSET", 8)?,
        },
        None => ScheduleConfig::Interval {
            seconds: env.number("CHECK_INTERVAL", 300)?,
        },
    };

    // A cookies file wins over inline cookies.
    let cookie_source = match (env.string("COOKIES_FILE"), env.string("COOKIES")) {
        (Some(path), _) => CookieSource::File(PathBuf::from(path)),
        (None, Some(inline)) => CookieSource::Inline(inline),
        (None, None) => CookieSource::None,
    };

    let config = AppConfig {
        general: GeneralConfig {
            log_level: env.string_or("LOG_LEVEL", "info"),
            log_format: env.string_or("LOG_FORMAT", "text"),
            log_file: env.string("LOG_FILE").map(PathBuf::from),
        },
        target_url: env.string_or("TARGET_URL", DEFAULT_TARGET_URL),
        schedule,
        browser: BrowserConfig {
            headless: env.flag("HEADLESS", true),
            page_timeout: Duration::from_millis(env.number("PAGE_TIMEOUT_MS", 30_000)?),
            render_wait: Duration::from_millis(env.number("RENDER_WAIT_MS", 3_000)?),
            user_agent: env.string_or("USER_AGENT", DEFAULT_USER_AGENT),
        },
        cookies: CookieConfig {
            source: cookie_source,
            domain: env.string_or("COOKIE_DOMAIN", "pingan.com"),
        },
        icons: IconConfig {
            buy: Some(env.string_or("BUY_ICON_URL", DEFAULT_BUY_ICON)),
            sell: Some(env.string_or("SELL_ICON_URL", DEFAULT_SELL_ICON)),
        },
        notifiers: NotifierConfig {
            server_chan: ServerChanConfig {
                enabled: env.flag("NOTIFIER_SERVER_CHAN_ENABLED", false),
                push_key: env.string_or("NOTIFIER_SERVER_CHAN_PUSH_KEY", ""),
            },
            bark: BarkConfig {
                enabled: env.flag("NOTIFIER_BARK_ENABLED", false),
                device_key: env.string_or("NOTIFIER_BARK_DEVICE_KEY", ""),
                server: env.string_or("NOTIFIER_BARK_SERVER", DEFAULT_BARK_SERVER),
                group: env.string_or("NOTIFIER_BARK_GROUP", "股票监控"),
                sound: env.string_or("NOTIFIER_BARK_SOUND", "default"),
                icon: env.string("NOTIFIER_BARK_ICON"),
                url: env.string("NOTIFIER_BARK_URL"),
            },
            pushplus: PushPlusConfig {
                enabled: env.flag("NOTIFIER_PUSHPLUS_ENABLED", false),
                token: env.string_or("NOTIFIER_PUSHPLUS_TOKEN", ""),
                channel: env.string_or("NOTIFIER_PUSHPLUS_CHANNEL", "wechat"),
                template: env.string_or("NOTIFIER_PUSHPLUS_TEMPLATE", "markdown"),
                topic: env.string("NOTIFIER_PUSHPLUS_TOPIC"),
            },
            dingtalk: DingTalkConfig {
                enabled: env.flag("NOTIFIER_DINGTALK_ENABLED", false),
                webhook: env.string_or("NOTIFIER_DINGTALK_WEBHOOK", ""),
            },
            ntfy: NtfyConfig {
                enabled: env.flag("NOTIFIER_NTFY_ENABLED", false),
                server: env.string_or("NOTIFIER_NTFY_SERVER", DEFAULT_NTFY_SERVER),
                topic: env.string_or("NOTIFIER_NTFY_TOPIC", ""),
                token: env.string_or("NOTIFIER_NTFY_TOKEN", ""),
                tags: env.string("NOTIFIER_NTFY_TAGS"),
            },
        },
    };

    validate(&config)?;

    Ok(config)
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if let ScheduleConfig::Interval { seconds: 0 } = config.schedule {
        return Err(Report::new(ConfigError::Validation {
            field: "CHECK_INTERVAL must be greater than zero".into(),
        }));
    }

    if !VALID_LOG_FORMATS.contains(&config.general.log_format.as_str()) {
        return Err(Report::new(ConfigError::Validation {
            field: format!(
                "LOG_FORMAT \"{}\" is not one of {:?}",
                config.general.log_format, VALID_LOG_FORMATS
            ),
        }));
    }

    if !config.target_url.starts_with("http://") && !config.target_url.starts_with("https://") {
        return Err(Report::new(ConfigError::Validation {
            field: format!("TARGET_URL \"{}\" is not an http(s) url", config.target_url),
        }));
    }

    Ok(())
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.string(key).unwrap_or_else(|| default.to_owned())
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.string(key) {
            Some(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
            None => default,
        }
    }

    fn number<T: FromStr>(&self, key: &str, default: T) -> Result<T, Report<ConfigError>> {
        match self.string(key) {
            Some(v) => v.parse().map_err(|_| {
                Report::new(ConfigError::Validation {
                    field: format!("{key}: \"{v}\" is not a valid number"),
                })
            }),
            None => Ok(default),
        }
    }
}
