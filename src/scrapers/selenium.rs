use super::{analyze_property_page, PageFindings, PropertyLookup, PropertyPage};
use crate::config::{ProcessingSettings, SiteSettings};
use crate::extraction_fallbacks::{default_city_strategies, CityStrategy};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use thirtyfour::prelude::*;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One Chrome session reused for every lead of a batch
pub struct SeleniumLookup {
    driver: Option<WebDriver>,
    site: SiteSettings,
    timings: ProcessingSettings,
    strategies: Vec<Box<dyn CityStrategy>>,
}

impl SeleniumLookup {
    /// Start a Chrome session through the configured ChromeDriver
    pub async fn connect(site: &SiteSettings, processing: &ProcessingSettings) -> Result<Self> {
        let strategies = default_city_strategies(&site.state_code)
            .with_context(|| format!("Invalid state code {:?}", site.state_code))?;

        let mut args = vec![
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--window-size=1920,1080",
            "--disable-blink-features=AutomationControlled",
            "--disable-notifications",
        ];
        if processing.headless_mode {
            args.insert(0, "--headless=new");
        }

        let waits = processing.lookup_waits(site.search_selectors.len());
        if processing.lookup_timeout() <= waits {
            warn!(
                "lookup_timeout_secs ({}) does not cover the lookup waits ({}s); slow listings will time out",
                processing.lookup_timeout_secs,
                waits.as_secs()
            );
        }

        let mut caps = DesiredCapabilities::chrome();
        caps.add_chrome_option("args", args)?;

        info!("Connecting to ChromeDriver at {}", site.webdriver_url);
        let driver = WebDriver::new(site.webdriver_url.as_str(), caps)
            .await
            .context("Failed to connect to ChromeDriver")?;

        if let Err(e) = driver
            .set_page_load_timeout(Duration::from_secs(processing.page_load_timeout_secs))
            .await
        {
            warn!("Could not set page load timeout: {}", e);
        }

        Ok(Self {
            driver: Some(driver),
            site: site.clone(),
            timings: processing.clone(),
            strategies,
        })
    }

    async fn find_search_box(driver: &WebDriver, site: &SiteSettings, wait: Duration) -> Result<WebElement> {
        for selector in &site.search_selectors {
            match driver.query(By::Css(selector.as_str())).wait(wait, POLL_INTERVAL).first().await {
                Ok(element) => return Ok(element),
                Err(e) => debug!("Search box selector {:?} failed: {}", selector, e),
            }
        }
        Err(anyhow!("Search box element not found on {}", site.base_url))
    }
}

#[async_trait]
impl PropertyLookup for SeleniumLookup {
    async fn lookup(&mut self, property_id: &str) -> Result<PropertyPage> {
        let driver = self
            .driver
            .as_ref()
            .ok_or_else(|| anyhow!("Browser session already closed"))?;
        let site = &self.site;
        let timings = &self.timings;

        debug!("Opening {}", site.base_url);
        driver
            .goto(site.base_url.as_str())
            .await
            .context("Failed to navigate to search page")?;
        tokio::time::sleep(Duration::from_secs(timings.page_settle_secs)).await;

        let search_box =
            Self::find_search_box(driver, site, Duration::from_secs(timings.search_wait_secs)).await?;
        search_box.clear().await.context("Failed to clear search box")?;
        search_box
            .send_keys(property_id)
            .await
            .context("Failed to type property code")?;
        search_box
            .send_keys(Key::Enter.to_string())
            .await
            .context("Failed to submit search")?;

        tokio::time::sleep(Duration::from_secs(timings.search_settle_secs)).await;

        // Either marker is enough; a missing one is judged from the source below
        let marker = driver
            .query(By::Css(site.location_selector.as_str()))
            .or(By::Css(site.not_found_selector.as_str()))
            .wait(Duration::from_secs(timings.location_wait_secs), POLL_INTERVAL)
            .first()
            .await;
        if let Err(e) = marker {
            debug!("No result marker for {}: {}", property_id, e);
        }

        let url = driver
            .current_url()
            .await
            .context("Failed to read current URL")?
            .to_string();
        let source = driver.source().await.context("Failed to get page source")?;

        let findings = analyze_property_page(&source, site, &self.strategies);
        match &findings {
            PageFindings::NotAvailable => info!("{}: property not available", property_id),
            PageFindings::Available { city: Some(found) } => {
                info!("{}: city {} ({})", property_id, found.city, found.strategy)
            }
            PageFindings::Available { city: None } => warn!("{}: city not found on page", property_id),
        }

        Ok(PropertyPage { url, findings })
    }

    async fn quit(&mut self) -> Result<()> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await.context("Failed to quit browser")?;
            info!("Browser closed");
        }
        Ok(())
    }
}
