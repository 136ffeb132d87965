use std::path::{Path, PathBuf};

use error_stack::{Report, ResultExt};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{CookieConfig, CookieSource};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    /// Anything outside `Strict | Lax | None` is treated as `Lax`.
    fn normalize(raw: Option<&str>) -> Self {
        match raw {
            Some("Strict") => Self::Strict,
            Some("None") => Self::None,
            _ => Self::Lax,
        }
    }
}

/// A session cookie to inject into the browser before navigating.
#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub same_site: SameSite,
    pub secure: bool,
    /// Seconds since the unix epoch.
    pub expires: Option<f64>,
}

impl Cookie {
    fn session(name: String, value: String, domain: &str) -> Self {
        Self {
            name,
            value,
            domain: format!(".{}", domain.trim_start_matches('.')),
            path: "/".into(),
            same_site: SameSite::Lax,
            secure: false,
            expires: None,
        }
    }
}

/// Cookie as exported by browser extensions (JSON array element).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportedCookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    same_site: Option<String>,
    #[serde(default)]
    secure: bool,
    #[serde(default, alias = "expirationDate")]
    expires: Option<f64>,
}

/// Parse a raw `name=value; name=value` header string.
///
/// Whitespace around names and values is trimmed; fragments without `=` or
/// with an empty name are skipped.
pub fn parse_cookie_header(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|part| {
            let (name, value) = part.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_owned(), value.trim().to_owned()))
        })
        .collect()
}

/// Render cookies back to the `name=value; name=value` header form.
pub fn format_cookie_header<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse cookie content: a JSON array when it starts with `[`, otherwise a raw
/// header string. Only cookies belonging to `trusted_domain` are kept.
pub fn parse_cookies(content: &str, trusted_domain: &str) -> Result<Vec<Cookie>, Report<ConfigError>> {
    let content = content.trim();
    if !content.starts_with('[') {
        return Ok(parse_cookie_header(content)
            .into_iter()
            .map(|(name, value)| Cookie::session(name, value, trusted_domain))
            .collect());
    }

    let exported: Vec<ExportedCookie> =
        serde_json::from_str(content).change_context(ConfigError::Parse {
            what: "cookie json".into(),
        })?;

    let cookies = exported
        .into_iter()
        .filter_map(|c| {
            let domain = c
                .domain
                .unwrap_or_else(|| format!(".{}", trusted_domain.trim_start_matches('.')));
            if !domain_matches(&domain, trusted_domain) {
                warn!(name = %c.name, domain = %domain, "dropping cookie for untrusted domain");
                return None;
            }
            Some(Cookie {
                name: c.name,
                value: c.value,
                domain,
                path: c.path.filter(|p| !p.is_empty()).unwrap_or_else(|| "/".into()),
                same_site: SameSite::normalize(c.same_site.as_deref()),
                secure: c.secure,
                expires: c.expires,
            })
        })
        .collect();

    Ok(cookies)
}

fn domain_matches(domain: &str, trusted: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    let trusted = trusted.trim_start_matches('.');
    domain == trusted || domain.ends_with(&format!(".{trusted}"))
}

/// Load cookies from the configured source.
///
/// A missing file or malformed content is logged and yields no cookies; the
/// page is then scraped without a session.
pub fn load(config: &CookieConfig) -> Vec<Cookie> {
    let loaded = match &config.source {
        CookieSource::None => return Vec::new(),
        CookieSource::File(path) => read_file(path).and_then(|c| parse_cookies(&c, &config.domain)),
        CookieSource::Inline(raw) => parse_cookies(raw, &config.domain),
    };

    match loaded {
        Ok(cookies) => {
            info!(count = cookies.len(), "cookies loaded");
            cookies
        }
        Err(e) => {
            warn!(error = ?e, "failed to load cookies, continuing without session");
            Vec::new()
        }
    }
}

/// Configured cookie source, checked without reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    NotConfigured,
    Inline,
    File(PathBuf),
    FileMissing(PathBuf),
}

pub fn source_status(config: &CookieConfig) -> SourceStatus {
    match &config.source {
        CookieSource::None => SourceStatus::NotConfigured,
        CookieSource::Inline(_) => SourceStatus::Inline,
        CookieSource::File(path) if path.exists() => SourceStatus::File(path.clone()),
        CookieSource::File(path) => SourceStatus::FileMissing(path.clone()),
    }
}

fn read_file(path: &Path) -> Result<String, Report<ConfigError>> {
    std::fs::read_to_string(path)
        .change_context(ConfigError::Read {
            source_name: "cookie file".into(),
        })
        .attach_with(|| format!("path: {}", path.display()))
}
