pub mod selenium;

pub use selenium::SeleniumLookup;

use crate::config::SiteSettings;
use crate::extraction_fallbacks::{extract_city, CityMatch, CityStrategy, LocationMarkup};
use anyhow::Result;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

/// What the listing page says about a property code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageFindings {
    NotAvailable,
    Available { city: Option<CityMatch> },
}

/// Page reached after searching for a property code
#[derive(Debug, Clone)]
pub struct PropertyPage {
    pub url: String,
    pub findings: PageFindings,
}

/// Searches the auction site for one property code at a time.
///
/// An `Err` means the lookup itself broke (selector missing, connection,
/// browser gone); callers classify it and move on to the next lead.
#[async_trait]
pub trait PropertyLookup: Send {
    async fn lookup(&mut self, property_id: &str) -> Result<PropertyPage>;

    /// Release the browser session. Called once, after the last lead;
    /// later lookups fail.
    async fn quit(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Deterministic search URL used when the lookup gives no page URL
pub fn fallback_url(site: &SiteSettings, property_id: &str) -> String {
    site.fallback_url_template
        .replace("{base}", &site.base_url)
        .replace("{code}", &urlencoding::encode(property_id))
}

/// Rendered text of an element, one line per text node
fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read availability and city from the listing page source.
///
/// The "not found" heading wins over everything; city extraction is only
/// attempted for available listings.
pub fn analyze_property_page(
    html: &str,
    site: &SiteSettings,
    strategies: &[Box<dyn CityStrategy>],
) -> PageFindings {
    let document = Html::parse_document(html);

    if let Ok(selector) = Selector::parse(&site.not_found_selector) {
        let not_found = document
            .select(&selector)
            .any(|heading| element_text(&heading).contains(&site.not_found_text));
        if not_found {
            return PageFindings::NotAvailable;
        }
    }

    let selector = match Selector::parse(&site.location_selector) {
        Ok(selector) => selector,
        Err(_) => return PageFindings::Available { city: None },
    };
    let markup = document.select(&selector).next().map(|location| LocationMarkup {
        inner_html: location.inner_html(),
        text: element_text(&location),
    });

    let city = markup.and_then(|markup| extract_city(&markup, strategies));
    PageFindings::Available { city }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction_fallbacks::default_city_strategies;

    fn analyze(html: &str) -> PageFindings {
        let site = SiteSettings::default();
        let strategies = default_city_strategies(&site.state_code).unwrap();
        analyze_property_page(html, &site, &strategies)
    }

    #[test]
    fn test_not_found_heading() {
        let html = r#"<html><body><div class="container"><h1>Imóvel não encontrado</h1></div>
            <div class="info-destaque localizacao">Rua A <br> Campinas- SP</div></body></html>"#;
        assert_eq!(analyze(html), PageFindings::NotAvailable);
    }

    #[test]
    fn test_city_from_location_block() {
        let html = r#"<html><body><div class="container"><h1>Casa em Campinas</h1></div>
            <div class="info-destaque localizacao">Rua das Flores, s/n <br> Campinas- SP</div></body></html>"#;
        match analyze(html) {
            PageFindings::Available { city: Some(found) } => {
                assert_eq!(found.city, "Campinas");
                assert_eq!(found.strategy, "markup-linebreak");
            }
            other => panic!("unexpected findings: {:?}", other),
        }
    }

    #[test]
    fn test_missing_location_block() {
        let html = "<html><body><p>Nada aqui</p></body></html>";
        assert_eq!(analyze(html), PageFindings::Available { city: None });
    }

    #[test]
    fn test_fallback_url() {
        let site = SiteSettings::default();
        assert_eq!(
            fallback_url(&site, "CX08444425765084SP"),
            "https://viahouseleiloes.com.br/search?q=CX08444425765084SP"
        );
    }
}
