use crate::config::BrowserSettings;
use crate::scrapers::traits::{PageFetch, PageSource, WaitFor};
use anyhow::{Context, Result};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Headless Chrome session: one browser, one tab, reused for every page.
///
/// The tab is closed on drop and the browser process exits with it, so the
/// session is released however the scrape ends.
pub struct ChromeSession {
    // Field order matters: the tab must go before the browser.
    tab: Arc<Tab>,
    _browser: Browser,
    consent_button: Option<String>,
    debug_dir: Option<PathBuf>,
    snapshots: usize,
}

impl ChromeSession {
    /// Launch Chrome and open the working tab
    pub fn launch(
        settings: &BrowserSettings,
        consent_button: Option<String>,
        wait_timeout: Duration,
    ) -> Result<Self> {
        info!("Launching headless Chrome...");

        let args: Vec<&OsStr> = vec![OsStr::new("--disable-dev-shm-usage")];
        let options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .sandbox(settings.sandbox)
            .idle_browser_timeout(wait_timeout.max(Duration::from_secs(30)) * 3)
            .args(args)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab().context("Failed to open browser tab")?;
        if let Some(agent) = &settings.user_agent {
            tab.set_user_agent(agent, None, None)
                .context("Failed to set user agent")?;
        }

        Ok(Self {
            tab,
            _browser: browser,
            consent_button,
            debug_dir: settings.debug_dir.clone(),
            snapshots: 0,
        })
    }

    fn accept_cookies(&self) {
        let Some(selector) = &self.consent_button else {
            return;
        };
        let Ok(quoted) = serde_json::to_string(selector) else {
            return;
        };
        let script = format!(
            "(() => {{ const button = document.querySelector({}); if (button) button.click(); }})()",
            quoted
        );
        if let Err(e) = self.tab.evaluate(&script, false) {
            debug!("Consent click failed: {}", e);
        }
    }

    /// Save HTML and a screenshot of the current page for later inspection
    fn capture_snapshot(&mut self, url: &str) -> Result<()> {
        let Some(dir) = self.debug_dir.clone() else {
            return Ok(());
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        self.snapshots += 1;
        let stem = dir.join(format!("page-{:03}", self.snapshots));

        let html = self.tab.get_content().context("Failed to read page HTML")?;
        std::fs::write(stem.with_extension("html"), &html)?;

        let png = self
            .tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .context("Failed to capture screenshot")?;
        std::fs::write(stem.with_extension("png"), png)?;

        info!("Saved snapshot of {} to {}.{{html,png}}", url, stem.display());
        Ok(())
    }
}

impl PageSource for ChromeSession {
    fn fetch(&mut self, url: &str, wait: &WaitFor) -> Result<PageFetch> {
        self.tab
            .navigate_to(url)
            .with_context(|| format!("Navigation to {} failed", url))?
            .wait_until_navigated()
            .with_context(|| format!("Page load of {} failed", url))?;

        self.accept_cookies();

        let waited = self
            .tab
            .wait_for_element_with_custom_timeout(&wait.selector, wait.timeout)
            .map(|_| ());
        if let Err(e) = waited {
            debug!("Waiting for {:?} on {}: {}", wait.selector, url, e);
            if let Err(e) = self.capture_snapshot(url) {
                warn!("Could not save debug snapshot: {:#}", e);
            }
            return Ok(PageFetch::ContainerMissing);
        }

        let html = self
            .tab
            .get_content()
            .with_context(|| format!("Failed to read HTML of {}", url))?;
        debug!("Downloaded {} bytes of HTML", html.len());

        Ok(PageFetch::Ready(html))
    }

    fn source_name(&self) -> &'static str {
        "headless Chrome"
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        match self.tab.close(true) {
            Ok(_) => debug!("Browser tab closed"),
            Err(e) => debug!("Browser tab close failed: {}", e),
        }
    }
}
