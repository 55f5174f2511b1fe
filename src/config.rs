//! Settings Module
//!
//! JSON-backed operator settings, passed explicitly into every component.
//! Loading merges the file over the built-in defaults recursively, so keys
//! missing from the file get defaults and unknown keys survive a save.

use crate::compose::{validate_templates, TemplateError};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_NORMAL_TEMPLATE: &str = "{{greeting}} {{name}}! tudo bem?\n\nVi que demonstrou interesse nesse imóvel da CAIXA em {{city}}, nós somos uma imobiliária credenciada pela Caixa e lhe damos assessoria de ponta á ponta no processo de arremate desse imóvel, e de forma completamente gratuita nas modalidades de Venda Online e Compra Direta (somos remunerados pela CAIXA). Você já tem conhecimento de como os arremates funcionam?\n\nSegue o link do imóvel abaixo:\n{{property_url}}";

pub const DEFAULT_UNAVAILABLE_TEMPLATE: &str = "Bom dia {{name}}! tudo bem?\nVi que demonstrou interesse em um imóvel da CAIXA, porém ele já foi arrematado ou está fora do ar por algum outro motivo!\nNós somos uma imobiliária credenciada pela Caixa e lhe damos assessoria de ponta á ponta no processo de arremate desse imóvel, e de forma completamente gratuita nas modalidades de Venda Online e Compra Direta (somos remunerados pela CAIXA).\nVocê já tem conhecimento de como os arremates funcionam?\nEncontre seu investimento ou imóvel dos sonhos por preços bem abaixo do praticado no mercado aqui no próprio site da CAIXA:\nvenda-imoveis.caixa.gov.br/sistema/busca-imovel.asp?sltTipoBusca=imoveis";

pub const DEFAULT_PENDING_TEMPLATE: &str = "{{greeting}} {{name}}! tudo bem?\n\nVi que demonstrou interesse em um imóvel da CAIXA, nós somos uma imobiliária credenciada pela Caixa e lhe damos assessoria de ponta á ponta no processo de arremate desse imóvel, e de forma completamente gratuita nas modalidades de Venda Online e Compra Direta (somos remunerados pela CAIXA). Você já tem conhecimento de como os arremates funcionam?\n\nSegue o link do imóvel abaixo:\n{{property_url}}";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Setting path is empty")]
    EmptyPath,

    #[error("Setting '{0}' is not an object")]
    NotAnObject(String),

    #[error("Setting value does not fit: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Root settings object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app_version: String,
    pub last_opened: Option<String>,
    pub file_paths: FilePaths,
    pub processing: ProcessingSettings,
    pub site: SiteSettings,
    pub whatsapp: WhatsappSettings,
    pub message_templates: MessageTemplates,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePaths {
    pub leads_file: String,
    pub last_export_dir: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    pub headless_mode: bool,
    pub max_history_entries: usize,
    /// Budget for one whole lookup
    pub lookup_timeout_secs: u64,
    pub page_load_timeout_secs: u64,
    /// Wait for the search box
    pub search_wait_secs: u64,
    /// Wait for the location block on the listing page
    pub location_wait_secs: u64,
    pub page_settle_secs: u64,
    pub search_settle_secs: u64,
    pub inter_lead_pause_ms: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProcessingSettings {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn inter_lead_pause(&self) -> Duration {
        Duration::from_millis(self.inter_lead_pause_ms)
    }

    /// Longest a lookup can spend in fixed sleeps and element waits when
    /// every search selector has to time out but the last, not counting
    /// page loads
    pub fn lookup_waits(&self, search_selectors: usize) -> Duration {
        Duration::from_secs(
            self.page_settle_secs
                + self.search_wait_secs * search_selectors.max(1) as u64
                + self.search_settle_secs
                + self.location_wait_secs,
        )
    }
}

/// Contract with the auction site. Selectors are tried in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub base_url: String,
    pub webdriver_url: String,
    pub search_selectors: Vec<String>,
    pub not_found_selector: String,
    pub not_found_text: String,
    pub location_selector: String,
    pub state_code: String,
    /// `{base}` and `{code}` are replaced
    pub fallback_url_template: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsappSettings {
    pub prefer_app_over_web: bool,
    pub country_code: String,
    pub write_fallback_files: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    pub normal_lead: String,
    pub unavailable_lead: String,
    pub pending_review_lead: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            last_opened: None,
            file_paths: FilePaths::default(),
            processing: ProcessingSettings::default(),
            site: SiteSettings::default(),
            whatsapp: WhatsappSettings::default(),
            message_templates: MessageTemplates::default(),
            extra: Map::new(),
        }
    }
}

impl Default for FilePaths {
    fn default() -> Self {
        Self {
            leads_file: "leads.txt".to_string(),
            last_export_dir: String::new(),
            extra: Map::new(),
        }
    }
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            headless_mode: true,
            max_history_entries: 100,
            lookup_timeout_secs: 90,
            page_load_timeout_secs: 30,
            search_wait_secs: 15,
            location_wait_secs: 10,
            page_settle_secs: 2,
            search_settle_secs: 5,
            inter_lead_pause_ms: 500,
            extra: Map::new(),
        }
    }
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            base_url: "https://viahouseleiloes.com.br/".to_string(),
            webdriver_url: "http://localhost:9515".to_string(),
            search_selectors: vec![
                "input[placeholder*='Digite condomínio, região, bairro ou cidade']".to_string(),
                "input[type='text'][name='q']".to_string(),
            ],
            not_found_selector: ".container h1".to_string(),
            not_found_text: "Imóvel não encontrado".to_string(),
            location_selector: ".info-destaque.localizacao".to_string(),
            state_code: "SP".to_string(),
            fallback_url_template: "{base}search?q={code}".to_string(),
            extra: Map::new(),
        }
    }
}

impl Default for WhatsappSettings {
    fn default() -> Self {
        Self {
            prefer_app_over_web: true,
            country_code: "55".to_string(),
            write_fallback_files: true,
            extra: Map::new(),
        }
    }
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            normal_lead: DEFAULT_NORMAL_TEMPLATE.to_string(),
            unavailable_lead: DEFAULT_UNAVAILABLE_TEMPLATE.to_string(),
            pending_review_lead: DEFAULT_PENDING_TEMPLATE.to_string(),
            extra: Map::new(),
        }
    }
}

/// Recursively merge `update` into `base`. Objects merge key by key,
/// anything else replaces.
pub fn deep_merge(base: &mut Value, update: Value) {
    match (base, update) {
        (Value::Object(base_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                let nested = value.is_object() && base_map.get(&key).is_some_and(Value::is_object);
                if nested {
                    if let Some(existing) = base_map.get_mut(&key) {
                        deep_merge(existing, value);
                    }
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base, update) => *base = update,
    }
}

impl Settings {
    /// Defaults with `loaded` merged over them
    pub fn from_json_value(loaded: Value) -> Result<Self, SettingsError> {
        let mut merged = serde_json::to_value(Settings::default())?;
        deep_merge(&mut merged, loaded);
        Ok(serde_json::from_value(merged)?)
    }

    /// Load from disk. A missing file gives defaults; an unreadable or
    /// malformed one gives defaults with a warning.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Settings::default();
        }

        let loaded = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))
            .and_then(|content| {
                serde_json::from_str::<Value>(&content).context("Failed to parse settings JSON")
            })
            .and_then(|value| Settings::from_json_value(value).map_err(anyhow::Error::from));

        match loaded {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Error loading settings, using defaults: {:#}", e);
                Settings::default()
            }
        }
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.last_opened = Some(chrono::Local::now().to_rfc3339());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write settings to {:?}", path))?;
        Ok(())
    }

    /// Read a value by dot path, e.g. `processing.max_history_entries`
    pub fn get_path(&self, key_path: &str) -> Option<Value> {
        let mut value = serde_json::to_value(self).ok()?;
        for key in key_path.split('.') {
            value = value.get_mut(key)?.take();
        }
        Some(value)
    }

    /// Set a value by dot path, creating intermediate objects
    pub fn set_path(&mut self, key_path: &str, new_value: Value) -> Result<(), SettingsError> {
        let keys: Vec<&str> = key_path.split('.').filter(|k| !k.is_empty()).collect();
        let (last, parents) = keys.split_last().ok_or(SettingsError::EmptyPath)?;

        let mut root = serde_json::to_value(&*self)?;
        let mut current = &mut root;
        for key in parents {
            let map = current
                .as_object_mut()
                .ok_or_else(|| SettingsError::NotAnObject(key.to_string()))?;
            current = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        current
            .as_object_mut()
            .ok_or_else(|| SettingsError::NotAnObject(key_path.to_string()))?
            .insert(last.to_string(), new_value);

        *self = serde_json::from_value(root)?;
        Ok(())
    }

    /// Replace the message templates after checking their placeholders
    pub fn set_templates(
        &mut self,
        normal: &str,
        unavailable: &str,
        pending: &str,
    ) -> Result<(), TemplateError> {
        validate_templates(normal, unavailable, pending)?;
        self.message_templates.normal_lead = normal.trim().to_string();
        self.message_templates.unavailable_lead = unavailable.trim().to_string();
        self.message_templates.pending_review_lead = pending.trim().to_string();
        Ok(())
    }

    pub fn reset_templates(&mut self) {
        let extra = std::mem::take(&mut self.message_templates.extra);
        self.message_templates = MessageTemplates { extra, ..MessageTemplates::default() };
    }
}

/// On-disk layout under one explicit root directory
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Per-user data directory, or the working directory when there is none
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("lead-courier"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir().join("settings.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.data_dir().join("processing_history.json")
    }

    pub fn manual_leads_file(&self) -> PathBuf {
        self.data_dir().join("manual_leads_backup.json")
    }

    pub fn processed_leads_file(&self) -> PathBuf {
        self.data_dir().join("processed_leads.json")
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.config_dir(), self.data_dir()] {
            fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;
        }
        Ok(())
    }
}
