//! Extraction Fallbacks Module
//!
//! City extraction from the listing's location block, as an ordered chain
//! of strategies. The first strategy that yields a city wins:
//! - Markup: text between a `<br>` and the `- <STATE>` suffix
//! - Plain text: the same pattern against the rendered text
//! - Strip: drop the state code and keep the last comma-separated segment
//!
//! Markup changes on the site are handled by adding a strategy, not by
//! editing the existing ones.

use regex::Regex;

/// Location element as read from the listing page
#[derive(Debug, Clone, Default)]
pub struct LocationMarkup {
    pub inner_html: String,
    /// Rendered text, one line per text node
    pub text: String,
}

/// A city found by one of the strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityMatch {
    pub city: String,
    pub strategy: &'static str,
}

pub trait CityStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn try_extract(&self, markup: &LocationMarkup) -> Option<String>;
}

/// `Rua X, s/n <br> Campinas- SP` in the inner HTML
pub struct LineBreakMarkup {
    pattern: Regex,
}

impl LineBreakMarkup {
    pub fn new(state: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"(?i)<br\s*/?>\s*([^-<]+)-\s*{}", regex::escape(state)))?;
        Ok(Self { pattern })
    }
}

impl CityStrategy for LineBreakMarkup {
    fn name(&self) -> &'static str {
        "markup-linebreak"
    }

    fn try_extract(&self, markup: &LocationMarkup) -> Option<String> {
        self.pattern
            .captures(&markup.inner_html)
            .and_then(|caps| caps.get(1))
            .and_then(|m| clean_city(m.as_str()))
    }
}

/// `Campinas- SP` on its own line of rendered text
pub struct PlainTextSuffix {
    pattern: Regex,
}

impl PlainTextSuffix {
    pub fn new(state: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"([^-\n]+)-\s*{}", regex::escape(state)))?;
        Ok(Self { pattern })
    }
}

impl CityStrategy for PlainTextSuffix {
    fn name(&self) -> &'static str {
        "text-suffix"
    }

    fn try_extract(&self, markup: &LocationMarkup) -> Option<String> {
        self.pattern
            .captures(&markup.text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| clean_city(m.as_str()))
    }
}

/// Last resort: remove the state code and dashes, keep the part after the last comma
pub struct StripAddress {
    state: String,
}

impl StripAddress {
    pub fn new(state: &str) -> Self {
        Self { state: state.to_string() }
    }
}

impl CityStrategy for StripAddress {
    fn name(&self) -> &'static str {
        "text-strip"
    }

    fn try_extract(&self, markup: &LocationMarkup) -> Option<String> {
        let mut text = markup.text.replace('-', "");
        if !self.state.is_empty() {
            text = text.replace(&self.state, "");
        }
        let segment = text.rsplit(',').next().unwrap_or("");
        clean_city(segment)
    }
}

/// The chain used against the auction site, in priority order
pub fn default_city_strategies(state: &str) -> Result<Vec<Box<dyn CityStrategy>>, regex::Error> {
    Ok(vec![
        Box::new(LineBreakMarkup::new(state)?),
        Box::new(PlainTextSuffix::new(state)?),
        Box::new(StripAddress::new(state)),
    ])
}

/// Run the strategies in order and return the first city found
pub fn extract_city(markup: &LocationMarkup, strategies: &[Box<dyn CityStrategy>]) -> Option<CityMatch> {
    strategies.iter().find_map(|strategy| {
        strategy.try_extract(markup).map(|city| CityMatch {
            city,
            strategy: strategy.name(),
        })
    })
}

/// Collapse whitespace; empty results count as no match
fn clean_city(raw: &str) -> Option<String> {
    let city = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if city.is_empty() {
        None
    } else {
        Some(city)
    }
}
