use std::path::Path;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, CookieSameSite, TimeSinceEpoch};
use chromiumoxide::page::{Page, ScreenshotParams};
use error_stack::{Report, ResultExt};
use futures::StreamExt;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::cookie::{Cookie, SameSite};
use crate::error::FetchError;
use crate::fetcher::{Fetcher, RawRecord};
use crate::model::Record;

/// iPhone X viewport.
const VIEWPORT: (u32, u32) = (375, 812);
const SHUTDOWN_GRACE_SECS: u64 = 5;

/// Reads the first `.record-invest-outside` element into a JSON string.
/// Returns the string `"null"` when the page has no record.
const EXTRACT_RECORD_JS: &str = r#"(() => {
    const record = document.querySelector('.record-invest-outside');
    if (!record) return JSON.stringify(null);
    const text = (el) => (el && el.innerText) ? el.innerText.trim() : '';
    const darker = record.querySelectorAll('td.darker');
    const weaker = record.querySelectorAll('td.weaker');
    return JSON.stringify({
        trade_type: text(record.querySelector('.stock-sale-icon span')),
        instrument: darker.length > 0
            ? text(darker[0])
            : text(record.querySelector('.trade-info-lock p')),
        position: text(darker[1]),
        time: text(weaker[0]),
        price: text(weaker[1]),
        reason: text(record.querySelector('.reason-info')),
    });
})()"#;

/// Scrapes the trade record page with a Chromium session kept open between
/// checks.
pub struct BrowserFetcher {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    target_url: String,
    page_timeout: Duration,
    render_wait: Duration,
}

impl BrowserFetcher {
    pub async fn launch(
        config: &BrowserConfig,
        target_url: &str,
        cookies: &[Cookie],
    ) -> Result<Self, Report<FetchError>> {
        let mut builder = LaunchConfig::builder()
            .window_size(VIEWPORT.0, VIEWPORT.1)
            .request_timeout(config.page_timeout)
            .arg(format!("--user-agent={}", config.user_agent));
        if !config.headless {
            builder = builder.with_head();
        }
        let launch_config = builder
            .build()
            .map_err(|reason| Report::new(FetchError::Launch).attach(reason))?;

        let (browser, mut handler) = Browser::launch(launch_config)
            .await
            .change_context(FetchError::Launch)?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .change_context(FetchError::Launch)?;

        if !cookies.is_empty() {
            let params = cookies
                .iter()
                .map(to_cookie_param)
                .collect::<Result<Vec<_>, _>>()?;
            page.set_cookies(params)
                .await
                .change_context(FetchError::Launch)
                .attach("failed to inject cookies")?;
        }

        info!(headless = config.headless, "browser started");

        Ok(Self {
            browser,
            page,
            handler,
            target_url: target_url.to_owned(),
            page_timeout: config.page_timeout,
            render_wait: config.render_wait,
        })
    }

    async fn load_and_extract(&self) -> Result<Option<Record>, Report<FetchError>> {
        let navigation = || FetchError::Navigation {
            url: self.target_url.clone(),
        };

        tokio::time::timeout(self.page_timeout, self.page.goto(self.target_url.as_str()))
            .await
            .change_context_lazy(navigation)?
            .change_context_lazy(navigation)?;

        // The record list is rendered by scripts after load.
        tokio::time::sleep(self.render_wait).await;

        let json: String = self
            .page
            .evaluate_expression(EXTRACT_RECORD_JS)
            .await
            .change_context(FetchError::Extract)?
            .into_value()
            .change_context(FetchError::Extract)?;

        let raw: Option<RawRecord> =
            serde_json::from_str(&json).change_context(FetchError::Extract)?;

        match raw {
            Some(raw) => {
                let record = raw.into_record(Some(self.target_url.clone()));
                debug!(?record, "record extracted");
                Ok(Some(record))
            }
            None => {
                warn!(url = %self.target_url, "no trade record found on page");
                Ok(None)
            }
        }
    }
}

impl Fetcher for BrowserFetcher {
    fn fetch(&self) -> BoxFuture<'_, Result<Option<Record>, Report<FetchError>>> {
        Box::pin(self.load_and_extract())
    }

    fn screenshot<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), Report<FetchError>>> {
        Box::pin(async move {
            let params = ScreenshotParams::builder().full_page(true).build();
            self.page
                .save_screenshot(params, path)
                .await
                .change_context(FetchError::Screenshot)
                .attach_with(|| format!("path: {}", path.display()))?;
            info!(path = %path.display(), "screenshot saved");
            Ok(())
        })
    }

    fn shutdown(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self.browser.close().await {
                warn!(error = %e, "failed to close browser cleanly");
            }
            if let Err(e) = self.browser.wait().await {
                warn!(error = %e, "failed to wait for browser process");
            }
            let grace = Duration::from_secs(SHUTDOWN_GRACE_SECS);
            if tokio::time::timeout(grace, &mut self.handler).await.is_err() {
                self.handler.abort();
            }
            info!("browser closed");
        })
    }
}

fn to_cookie_param(cookie: &Cookie) -> Result<CookieParam, Report<FetchError>> {
    let same_site = match cookie.same_site {
        SameSite::Strict => CookieSameSite::Strict,
        SameSite::Lax => CookieSameSite::Lax,
        SameSite::None => CookieSameSite::None,
    };

    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .secure(cookie.secure)
        .same_site(same_site);
    if let Some(expires) = cookie.expires {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }

    builder.build().map_err(|reason| {
        Report::new(FetchError::Launch).attach(format!("cookie {}: {reason}", cookie.name))
    })
}
