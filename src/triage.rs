//! Triage Module
//!
//! Turns lookup outcomes into lead statuses and produces the run reports.
//!
//! Precedence:
//! - Unavailable: the site shows its "not found" heading
//! - Complete: a city was extracted
//! - Pending: listing found but no city, hand to the operator
//! - Error: timeout, lookup failure or critical failure, with a fallback URL
//!
//! Error buckets only change the text shown to the operator.

use crate::config::SiteSettings;
use crate::scrapers::fallback_url;
use crate::types::{ErrorBucket, Lead, LeadStatus, LookupOutcome};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const SUMMARY_MAX_CHARS: usize = 50;
const REASON_MAX_CHARS: usize = 100;

pub const REASON_CITY_NOT_FOUND: &str = "Cidade não encontrada automaticamente";

impl ErrorBucket {
    /// Guess the failure kind from the error text
    pub fn from_error_text(error: &str) -> Self {
        let lower = error.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            ErrorBucket::Timeout
        } else if lower.contains("connection") {
            ErrorBucket::Connection
        } else if lower.contains("element not found") || lower.contains("no such element") {
            ErrorBucket::PageChanged
        } else {
            ErrorBucket::Generic
        }
    }
}

/// First line of an error, short enough for a status label
fn error_summary(error: &str) -> String {
    truncate_str(error.lines().next().unwrap_or("").trim(), SUMMARY_MAX_CHARS)
}

/// Status for a lookup outcome. Total over every outcome.
pub fn classify(outcome: &LookupOutcome) -> LeadStatus {
    match outcome {
        LookupOutcome::NotAvailable { .. } => LeadStatus::Unavailable,
        LookupOutcome::Found { city: Some(city), .. } if !city.trim().is_empty() => LeadStatus::Complete,
        LookupOutcome::Found { .. } => LeadStatus::PendingCityReview,
        LookupOutcome::Timeout { reason } => LeadStatus::Error {
            bucket: ErrorBucket::Timeout,
            summary: error_summary(reason),
        },
        LookupOutcome::Failed { error } => LeadStatus::Error {
            bucket: ErrorBucket::from_error_text(error),
            summary: error_summary(error),
        },
        LookupOutcome::Critical { error } => LeadStatus::Error {
            bucket: ErrorBucket::Critical,
            summary: error_summary(error),
        },
    }
}

/// Record a lookup outcome on the lead
pub fn apply_outcome(lead: &mut Lead, outcome: LookupOutcome, site: &SiteSettings) {
    lead.status = classify(&outcome);

    match outcome {
        LookupOutcome::Found { url, city } => {
            lead.property_url = url;
            match city.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()) {
                Some(city) => lead.city = city,
                None => {
                    lead.manual_review_needed = true;
                    lead.manual_review_reason = REASON_CITY_NOT_FOUND.to_string();
                }
            }
        }
        LookupOutcome::NotAvailable { url } => {
            lead.property_url = url;
            lead.property_not_available = true;
        }
        LookupOutcome::Timeout { reason } => {
            lead.property_url = fallback_url(site, &lead.property_id);
            lead.manual_review_needed = true;
            lead.manual_review_reason = reason;
        }
        LookupOutcome::Failed { error } => {
            lead.property_url = fallback_url(site, &lead.property_id);
            lead.manual_review_needed = true;
            let prefix = match ErrorBucket::from_error_text(&error) {
                ErrorBucket::Timeout => "Timeout",
                _ => "Erro",
            };
            lead.manual_review_reason = format!("{}: {}", prefix, truncate_str(&error, REASON_MAX_CHARS));
        }
        LookupOutcome::Critical { error } => {
            if lead.property_url.is_empty() {
                lead.property_url = fallback_url(site, &lead.property_id);
            }
            lead.manual_review_needed = true;
            lead.manual_review_reason = format!("Erro crítico: {}", truncate_str(&error, REASON_MAX_CHARS));
        }
    }
}

/// Counts per status for one run
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageStats {
    pub total: usize,
    pub complete: usize,
    pub pending_review: usize,
    pub unavailable: usize,
    pub errors: usize,
    pub not_processed: usize,
    pub error_buckets: HashMap<ErrorBucket, usize>,
}

impl TriageStats {
    /// Share of leads that ended complete, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.complete as f64 / self.total as f64 * 100.0
        }
    }

    pub fn bucket_count(&self, bucket: ErrorBucket) -> usize {
        self.error_buckets.get(&bucket).copied().unwrap_or(0)
    }
}

pub fn summarize(leads: &[Lead]) -> TriageStats {
    let mut stats = TriageStats {
        total: leads.len(),
        ..Default::default()
    };

    for lead in leads {
        match &lead.status {
            LeadStatus::New => stats.not_processed += 1,
            LeadStatus::Complete => stats.complete += 1,
            LeadStatus::PendingCityReview => stats.pending_review += 1,
            LeadStatus::Unavailable => stats.unavailable += 1,
            LeadStatus::Error { bucket, .. } => {
                stats.errors += 1;
                *stats.error_buckets.entry(*bucket).or_insert(0) += 1;
            }
        }
    }

    stats
}

fn push_lead_table(report: &mut String, leads: &[&Lead], with_reason: bool) {
    if with_reason {
        report.push_str("| # | Nome | Código | Motivo |\n");
        report.push_str("|---|------|--------|--------|\n");
    } else {
        report.push_str("| # | Nome | Código |\n");
        report.push_str("|---|------|--------|\n");
    }
    for (i, lead) in leads.iter().enumerate() {
        if with_reason {
            report.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                i + 1,
                truncate_str(&lead.name, 40),
                lead.property_id,
                truncate_str(&lead.manual_review_reason, 60)
            ));
        } else {
            report.push_str(&format!("| {} | {} | {} |\n", i + 1, truncate_str(&lead.name, 40), lead.property_id));
        }
    }
    report.push('\n');
}

/// Markdown summary of a processing run
pub fn generate_summary_md(leads: &[Lead], stats: &TriageStats, source: &str) -> String {
    let mut report = String::new();

    report.push_str("# Resumo do Processamento\n\n");
    report.push_str(&format!("**Gerado em:** {}\n", Local::now().format("%d/%m/%Y %H:%M:%S")));
    if !source.is_empty() {
        report.push_str(&format!("**Arquivo:** {}\n", source));
    }
    report.push_str("\n---\n\n");

    report.push_str("## Estatísticas\n\n");
    report.push_str("| Status | Quantidade |\n");
    report.push_str("|--------|------------|\n");
    report.push_str(&format!("| Total | {} |\n", stats.total));
    report.push_str(&format!("| ✅ Completos | {} |\n", stats.complete));
    report.push_str(&format!("| ⚠️ Revisão manual | {} |\n", stats.pending_review));
    report.push_str(&format!("| ⚠️ Indisponíveis | {} |\n", stats.unavailable));
    report.push_str(&format!("| ❌ Erros | {} |\n", stats.errors));
    if stats.not_processed > 0 {
        report.push_str(&format!("| Não processados | {} |\n", stats.not_processed));
    }
    report.push_str(&format!("\n**Taxa de sucesso:** {:.1}%\n\n", stats.success_rate()));

    if stats.errors > 0 {
        report.push_str("### Erros por tipo\n\n");
        for (bucket, label) in [
            (ErrorBucket::Timeout, "Timeout"),
            (ErrorBucket::Connection, "Conexão"),
            (ErrorBucket::PageChanged, "Página alterada"),
            (ErrorBucket::Generic, "Outros"),
            (ErrorBucket::Critical, "Críticos"),
        ] {
            let count = stats.bucket_count(bucket);
            if count > 0 {
                report.push_str(&format!("- {}: {}\n", label, count));
            }
        }
        report.push('\n');
    }

    report.push_str("---\n\n");

    let unavailable: Vec<&Lead> = leads.iter().filter(|l| l.status == LeadStatus::Unavailable).collect();
    if !unavailable.is_empty() {
        report.push_str(&format!("## Imóveis indisponíveis ({})\n\n", unavailable.len()));
        push_lead_table(&mut report, &unavailable, false);
    }

    let pending: Vec<&Lead> = leads
        .iter()
        .filter(|l| l.status == LeadStatus::PendingCityReview)
        .collect();
    if !pending.is_empty() {
        report.push_str(&format!("## Revisão manual de cidade ({})\n\n", pending.len()));
        push_lead_table(&mut report, &pending, true);
    }

    let failed: Vec<&Lead> = leads.iter().filter(|l| l.status.is_error()).collect();
    if !failed.is_empty() {
        report.push_str(&format!("## Falhas técnicas ({})\n\n", failed.len()));
        push_lead_table(&mut report, &failed, true);
    }

    report
}

/// CSV export of processed leads
pub fn generate_leads_csv(leads: &[Lead]) -> String {
    let mut csv = String::from("name,phone,email,property_id,city,property_url,status,manual_review_reason\n");

    for lead in leads {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            escape_csv(&lead.name),
            escape_csv(&lead.phone),
            escape_csv(lead.email.as_deref().unwrap_or("")),
            escape_csv(&lead.property_id),
            escape_csv(lead.city_display()),
            escape_csv(&lead.property_url),
            escape_csv(&lead.status.label()),
            escape_csv(&lead.manual_review_reason),
        ));
    }

    csv
}

/// Helper to truncate string on char boundaries
fn truncate_str(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count > max_chars {
        let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", truncated)
    } else {
        s.to_string()
    }
}

/// Helper to escape CSV fields
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_lead() -> Lead {
        Lead::new(
            "Maria Souza".to_string(),
            "11912345678".to_string(),
            Some("maria@example.com".to_string()),
            "CX123SP".to_string(),
        )
    }

    #[test]
    fn test_error_buckets() {
        assert_eq!(ErrorBucket::from_error_text("Operation TIMEOUT reached"), ErrorBucket::Timeout);
        assert_eq!(ErrorBucket::from_error_text("connection refused"), ErrorBucket::Connection);
        assert_eq!(ErrorBucket::from_error_text("no such element: .x"), ErrorBucket::PageChanged);
        assert_eq!(ErrorBucket::from_error_text("Search box element not found on x"), ErrorBucket::PageChanged);
        assert_eq!(ErrorBucket::from_error_text("boom"), ErrorBucket::Generic);
    }

    #[test]
    fn test_classify_precedence() {
        let url = "https://site/imovel/1".to_string();
        assert_eq!(classify(&LookupOutcome::NotAvailable { url: url.clone() }), LeadStatus::Unavailable);
        assert_eq!(
            classify(&LookupOutcome::Found { url: url.clone(), city: Some("Santos".to_string()) }),
            LeadStatus::Complete
        );
        assert_eq!(
            classify(&LookupOutcome::Found { url: url.clone(), city: Some("  ".to_string()) }),
            LeadStatus::PendingCityReview
        );
        assert_eq!(classify(&LookupOutcome::Found { url, city: None }), LeadStatus::PendingCityReview);

        match classify(&LookupOutcome::Failed { error: "connection reset\nstack".to_string() }) {
            LeadStatus::Error { bucket, summary } => {
                assert_eq!(bucket, ErrorBucket::Connection);
                assert_eq!(summary, "connection reset");
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_apply_found_without_city() {
        let site = SiteSettings::default();
        let mut lead = create_test_lead();
        apply_outcome(&mut lead, LookupOutcome::Found { url: "https://site/x".to_string(), city: None }, &site);

        assert_eq!(lead.status, LeadStatus::PendingCityReview);
        assert_eq!(lead.property_url, "https://site/x");
        assert!(lead.city.is_empty());
        assert!(lead.manual_review_needed);
        assert_eq!(lead.manual_review_reason, REASON_CITY_NOT_FOUND);
        assert!(lead.is_ready_for_message());
    }

    #[test]
    fn test_apply_timeout_uses_fallback_url() {
        let site = SiteSettings::default();
        let mut lead = create_test_lead();
        apply_outcome(&mut lead, LookupOutcome::Timeout { reason: "Timeout após 30s".to_string() }, &site);

        assert_eq!(lead.property_url, "https://viahouseleiloes.com.br/search?q=CX123SP");
        assert_eq!(lead.manual_review_reason, "Timeout após 30s");
        assert!(matches!(lead.status, LeadStatus::Error { bucket: ErrorBucket::Timeout, .. }));
        assert!(lead.city.is_empty());
    }

    #[test]
    fn test_apply_failure_truncates_reason() {
        let site = SiteSettings::default();
        let mut lead = create_test_lead();
        let long = "x".repeat(300);
        apply_outcome(&mut lead, LookupOutcome::Failed { error: long }, &site);

        assert!(lead.manual_review_reason.starts_with("Erro: "));
        assert_eq!(lead.manual_review_reason.chars().count(), "Erro: ".len() + REASON_MAX_CHARS);
    }

    #[test]
    fn test_apply_failure_mentioning_timeout() {
        let site = SiteSettings::default();
        let mut lead = create_test_lead();
        let error = "Failed to navigate to search page: timed out receiving message from renderer".to_string();
        apply_outcome(&mut lead, LookupOutcome::Failed { error }, &site);

        assert!(lead.manual_review_needed);
        assert!(lead.manual_review_reason.starts_with("Timeout: Failed to navigate"));
        assert_eq!(lead.property_url, fallback_url(&site, &lead.property_id));
        assert!(matches!(lead.status, LeadStatus::Error { bucket: ErrorBucket::Timeout, .. }));
    }

    #[test]
    fn test_summarize_and_report() {
        let site = SiteSettings::default();
        let mut leads = vec![create_test_lead(), create_test_lead(), create_test_lead(), create_test_lead()];
        apply_outcome(&mut leads[0], LookupOutcome::Found { url: "u".to_string(), city: Some("Santos".to_string()) }, &site);
        apply_outcome(&mut leads[1], LookupOutcome::NotAvailable { url: "u".to_string() }, &site);
        apply_outcome(&mut leads[2], LookupOutcome::Critical { error: "panic".to_string() }, &site);

        let stats = summarize(&leads);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.complete, 1);
        assert_eq!(stats.unavailable, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.not_processed, 1);
        assert_eq!(stats.bucket_count(ErrorBucket::Critical), 1);
        assert!((stats.success_rate() - 25.0).abs() < f64::EPSILON);

        let report = generate_summary_md(&leads, &stats, "leads.txt");
        assert!(report.contains("**Taxa de sucesso:** 25.0%"));
        assert!(report.contains("## Imóveis indisponíveis (1)"));
        assert!(report.contains("## Falhas técnicas (1)"));
        assert!(report.contains("- Críticos: 1"));
    }

    #[test]
    fn test_csv_escaping() {
        let mut lead = create_test_lead();
        lead.name = "Souza, Maria".to_string();
        let csv = generate_leads_csv(&[lead]);
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("name,phone"));
        assert!(lines.next().unwrap().starts_with("\"Souza, Maria\",11912345678,maria@example.com,CX123SP"));
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("çççççççççççç", 6), "ççç...");
    }
}
