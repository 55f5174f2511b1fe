use serde::{Deserialize, Serialize};

/// Display text used when the lookup could not read the city
pub const CITY_PENDING_REVIEW: &str = "PENDENTE - Revisar manualmente";
pub const CITY_PENDING_TIMEOUT: &str = "PENDENTE - Timeout na busca";
pub const CITY_PENDING_ERROR: &str = "PENDENTE - Erro na extração";
pub const CITY_NOT_AVAILABLE: &str = "N/A - Imóvel não disponível";

/// A customer lead copied from a notification e-mail.
///
/// Created by the extractor, filled in by the lookup/classifier and read
/// by the message composer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Lead {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub property_id: String,
    #[serde(default)]
    pub property_url: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub manual_review_needed: bool,
    #[serde(default)]
    pub manual_review_reason: String,
    #[serde(default)]
    pub property_not_available: bool,
}

impl Lead {
    pub fn new(name: String, phone: String, email: Option<String>, property_id: String) -> Self {
        Self {
            name,
            phone,
            email,
            property_id,
            property_url: String::new(),
            city: String::new(),
            status: LeadStatus::New,
            manual_review_needed: false,
            manual_review_reason: String::new(),
            property_not_available: false,
        }
    }

    /// True once the lead can be handed to the composer: it either has a
    /// listing URL or carries one of the flags that select another template.
    pub fn is_ready_for_message(&self) -> bool {
        !self.property_url.is_empty() || self.property_not_available || self.manual_review_needed
    }

    /// City text for operator-facing tables. Sentinels never leak into `city`.
    pub fn city_display(&self) -> &str {
        if !self.city.is_empty() {
            return &self.city;
        }
        if self.property_not_available {
            return CITY_NOT_AVAILABLE;
        }
        match &self.status {
            LeadStatus::Error { bucket: ErrorBucket::Timeout, .. } => CITY_PENDING_TIMEOUT,
            LeadStatus::Error { .. } => CITY_PENDING_ERROR,
            LeadStatus::PendingCityReview => CITY_PENDING_REVIEW,
            _ => "",
        }
    }

    /// Operator typed the city in after reviewing the listing.
    pub fn set_city_manually(&mut self, city: &str) {
        let city = city.trim();
        if city.is_empty() {
            return;
        }
        self.city = city.to_string();
        self.manual_review_needed = false;
        self.manual_review_reason.clear();
        self.status = LeadStatus::Complete;
    }
}

/// Terminal status of a lead after one lookup attempt
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeadStatus {
    /// Extracted but not looked up yet
    #[default]
    New,
    Complete,
    PendingCityReview,
    Unavailable,
    Error {
        bucket: ErrorBucket,
        summary: String,
    },
}

impl LeadStatus {
    /// Portuguese label shown to the operator
    pub fn label(&self) -> String {
        match self {
            LeadStatus::New => "Novo".to_string(),
            LeadStatus::Complete => "✅ Completo".to_string(),
            LeadStatus::PendingCityReview => "⚠️ Pendente - Revisar cidade manualmente".to_string(),
            LeadStatus::Unavailable => "⚠️ Imóvel não disponível - Usar mensagem especial".to_string(),
            LeadStatus::Error { bucket, summary } => match bucket {
                ErrorBucket::Timeout => "⚠️ Erro - Timeout na busca".to_string(),
                ErrorBucket::Connection => "⚠️ Erro - Problema de conexão".to_string(),
                ErrorBucket::PageChanged => "⚠️ Erro - Página alterada".to_string(),
                ErrorBucket::Generic => format!("❌ Erro - {}", summary),
                ErrorBucket::Critical => format!("❌ Erro crítico - {}", summary),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LeadStatus::Error { .. })
    }
}

/// Display-only sub-classification of lookup errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorBucket {
    Timeout,
    Connection,
    PageChanged,
    Generic,
    Critical,
}

/// What a single property lookup produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Listing page reached; `city` is `None` when no strategy matched
    Found { url: String, city: Option<String> },
    /// Site shows its "not found" heading for the code
    NotAvailable { url: String },
    Timeout { reason: String },
    Failed { error: String },
    /// Lookup panicked or broke outside the browser calls
    Critical { error: String },
}

/// Fields pulled out of one e-mail block before validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialLead {
    pub property_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl PartialLead {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.property_id.as_deref().map_or(true, str::is_empty) {
            missing.push("property_id");
        }
        if self.name.as_deref().map_or(true, str::is_empty) {
            missing.push("name");
        }
        if self.phone.as_deref().map_or(true, str::is_empty) {
            missing.push("phone");
        }
        missing
    }
}
