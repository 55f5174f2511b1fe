//! Lead Extraction Module
//!
//! Turns text pasted from lead notification e-mails into `Lead` records:
//! - Splits the text on the greeting that opens every notification
//! - Captures property code, name, e-mail and phone per block
//! - Hands incomplete blocks to a `ManualEntry` callback, drops them otherwise
//!
//! Also validates leads typed in by the operator and bulk-pasted lead text.

use crate::types::{Lead, PartialLead};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, info, warn};

static LEAD_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"Olá\s*,").unwrap());
static PROPERTY_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)imóvel\s+(CX[0-9A-Z]+):").unwrap());
static NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Nome:\s+([^\r\n]+)").unwrap());
static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)E-mail:\s+([^\r\n]+)").unwrap());
static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Telefone:\s+([^\r\n]+)").unwrap());
static BULK_LEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)imóvel\s+(CX\w+).*?Nome:\s*([^\n\r]+).*?E-mail:\s*([^\n\r]+).*?Telefone:\s*([^\n\r]+)",
    )
    .unwrap()
});
static VALID_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

/// Minimum digits for a phone typed in by the operator
const MIN_PHONE_DIGITS: usize = 10;

/// Called for each block that lacks a property code, name or phone.
///
/// Return the completed fields to keep the lead, or `None` to drop it.
pub trait ManualEntry {
    fn complete(&mut self, partial: &PartialLead, block: &str) -> Option<PartialLead>;
}

impl<F> ManualEntry for F
where
    F: FnMut(&PartialLead, &str) -> Option<PartialLead>,
{
    fn complete(&mut self, partial: &PartialLead, block: &str) -> Option<PartialLead> {
        self(partial, block)
    }
}

/// Batch behaviour: log what is missing and skip the block
pub struct SkipIncomplete;

impl ManualEntry for SkipIncomplete {
    fn complete(&mut self, partial: &PartialLead, _block: &str) -> Option<PartialLead> {
        warn!(
            missing = ?partial.missing_fields(),
            "Incomplete lead block, skipping"
        );
        None
    }
}

/// Capitalize every whitespace-separated word, lowercasing the rest
pub fn title_case_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Split raw text into lead blocks, each starting at the greeting.
/// Text before the first greeting is kept as its own block; blank blocks are dropped.
pub fn split_lead_blocks(text: &str) -> Vec<&str> {
    let mut starts: Vec<usize> = LEAD_START.find_iter(text).map(|m| m.start()).collect();
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    let mut blocks = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        let block = &text[start..end];
        if !block.trim().is_empty() {
            blocks.push(block);
        }
    }
    blocks
}

/// Apply the independent field captures to one block
pub fn parse_block(block: &str) -> PartialLead {
    let capture = |re: &Regex| {
        re.captures(block)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    };

    PartialLead {
        property_id: capture(&PROPERTY_ID),
        name: capture(&NAME).map(|n| title_case_name(&n)),
        email: capture(&EMAIL),
        phone: capture(&PHONE).map(|p| digits_only(&p)).filter(|p| !p.is_empty()),
    }
}

/// Normalize and accept a partial lead if the required fields are present
fn into_lead(partial: PartialLead) -> Option<Lead> {
    let property_id = partial.property_id?.trim().to_string();
    let name = title_case_name(&partial.name?);
    let phone = digits_only(&partial.phone?);

    if property_id.is_empty() || name.is_empty() || phone.is_empty() {
        return None;
    }

    Some(Lead::new(name, phone, partial.email, property_id))
}

/// Extract every complete lead from pasted e-mail text, in input order
pub fn extract_leads<M: ManualEntry>(text: &str, manual: &mut M) -> Vec<Lead> {
    if text.trim().is_empty() {
        warn!("Lead text is empty");
        return vec![];
    }

    let blocks = split_lead_blocks(text);
    info!("Found {} lead blocks", blocks.len());

    let mut leads = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        let partial = parse_block(block);

        let partial = if partial.missing_fields().is_empty() {
            partial
        } else {
            debug!(block = i + 1, missing = ?partial.missing_fields(), "Asking for manual entry");
            match manual.complete(&partial, block) {
                Some(completed) => completed,
                None => continue,
            }
        };

        match into_lead(partial) {
            Some(lead) => {
                info!("Extracted lead: {} ({})", lead.name, lead.property_id);
                leads.push(lead);
            }
            None => warn!("Lead block #{} is still incomplete, skipping", i + 1),
        }
    }

    info!("Extracted {} leads", leads.len());
    leads
}

/// Read a leads file and extract from it. A missing or unreadable file
/// yields an empty list; the problem is logged, not raised.
pub fn extract_leads_from_file<M: ManualEntry>(path: &Path, manual: &mut M) -> Vec<Lead> {
    info!("Extracting leads from file: {}", path.display());

    if !path.exists() {
        error!("File not found: {}", path.display());
        return vec![];
    }

    match fs::read_to_string(path) {
        Ok(content) => extract_leads(&content, manual),
        Err(e) => {
            error!("Failed to read leads file {}: {}", path.display(), e);
            vec![]
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManualLeadError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid e-mail: {0}")]
    InvalidEmail(String),

    #[error("invalid phone (minimum 10 digits): {0}")]
    InvalidPhone(String),

    #[error("e-mail already added: {0}")]
    DuplicateEmail(String),
}

/// Validate a lead typed in by the operator
pub fn validate_manual_lead(
    name: &str,
    email: &str,
    phone: &str,
    property_id: &str,
) -> Result<Lead, ManualLeadError> {
    let name = name.trim();
    let email = email.trim();
    let property_id = property_id.trim();

    for (field, value) in [
        ("name", name),
        ("email", email),
        ("phone", phone.trim()),
        ("property_id", property_id),
    ] {
        if value.is_empty() {
            return Err(ManualLeadError::MissingField(field));
        }
    }

    if !VALID_EMAIL.is_match(email) {
        return Err(ManualLeadError::InvalidEmail(email.to_string()));
    }

    let phone = digits_only(phone);
    if phone.len() < MIN_PHONE_DIGITS {
        return Err(ManualLeadError::InvalidPhone(phone));
    }

    Ok(Lead::new(
        name.to_string(),
        phone,
        Some(email.to_string()),
        property_id.to_string(),
    ))
}

/// Result of scanning a bulk paste
#[derive(Debug, Default)]
pub struct BulkParseResult {
    pub accepted: Vec<Lead>,
    pub problems: Vec<String>,
}

/// Scan pasted text for lead groups and validate each one. E-mails already
/// present in `existing` (or earlier in the paste) are rejected.
pub fn parse_bulk_leads(text: &str, existing: &[Lead]) -> BulkParseResult {
    let mut result = BulkParseResult::default();

    for caps in BULK_LEAD.captures_iter(text) {
        let property_id = &caps[1];
        let name = caps[2].trim();
        let email = caps[3].trim();
        let phone = &caps[4];

        let lead = match validate_manual_lead(name, email, phone, property_id) {
            Ok(lead) => lead,
            Err(e) => {
                let who = if name.is_empty() { "Nome vazio" } else { name };
                result.problems.push(format!("{}: {}", who, e));
                continue;
            }
        };

        let duplicate = existing
            .iter()
            .chain(result.accepted.iter())
            .any(|l| l.email.as_deref() == Some(email));
        if duplicate {
            result
                .problems
                .push(ManualLeadError::DuplicateEmail(email.to_string()).to_string());
            continue;
        }

        result.accepted.push(lead);
    }

    info!(
        "Bulk paste: {} leads accepted, {} problems",
        result.accepted.len(),
        result.problems.len()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case_name() {
        assert_eq!(title_case_name("joão silva"), "João Silva");
        assert_eq!(title_case_name("  MARIA   da SOUZA "), "Maria Da Souza");
        assert_eq!(title_case_name(""), "");
    }

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("(11) 98765-4321"), "11987654321");
        assert_eq!(digits_only("+55 11 9.8765"), "551198765");
    }

    #[test]
    fn test_split_keeps_prefix_and_drops_blank() {
        let text = "header\nOlá ,\nfirst\nOlá,\nsecond\n";
        let blocks = split_lead_blocks(text);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], "header\n");
        assert!(blocks[1].starts_with("Olá ,"));
        assert!(blocks[2].starts_with("Olá,"));

        assert!(split_lead_blocks("   \n").is_empty());
    }

    #[test]
    fn test_parse_block_fields() {
        let block = "Olá ,\nVocê possui um novo lead para o imóvel CX08444425765084SP:\nNome: joão silva\nE-mail: joao@x.com\nTelefone: (11) 98765-4321\n";
        let partial = parse_block(block);
        assert_eq!(partial.property_id.as_deref(), Some("CX08444425765084SP"));
        assert_eq!(partial.name.as_deref(), Some("João Silva"));
        assert_eq!(partial.email.as_deref(), Some("joao@x.com"));
        assert_eq!(partial.phone.as_deref(), Some("11987654321"));
    }

    #[test]
    fn test_extract_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let leads = extract_leads_from_file(&dir.path().join("leads.txt"), &mut SkipIncomplete);
        assert!(leads.is_empty());
    }

    #[test]
    fn test_extract_from_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.txt");
        fs::write(&path, "").unwrap();
        assert!(extract_leads_from_file(&path, &mut SkipIncomplete).is_empty());
    }

    #[test]
    fn test_extract_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.txt");
        fs::write(
            &path,
            "Olá ,\nVocê possui um novo lead para o imóvel CX08444425765084SP:\nNome: joão silva\nE-mail: joao@x.com\nTelefone: (11) 98765-4321\n\
             Olá ,\nVocê possui um novo lead para o imóvel CX99:\nNome: maria\nTelefone: 21912345678\n",
        )
        .unwrap();

        let leads = extract_leads_from_file(&path, &mut SkipIncomplete);
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].property_id, "CX08444425765084SP");
        assert_eq!(leads[0].name, "João Silva");
        assert_eq!(leads[1].phone, "21912345678");
    }

    #[test]
    fn test_manual_entry_callback_completes_block() {
        let text = "Olá ,\nimóvel CX123:\nNome: ana\n";
        let mut calls = 0;
        let mut fill = |partial: &PartialLead, _block: &str| {
            calls += 1;
            let mut done = partial.clone();
            done.phone = Some("(21) 91234-5678".to_string());
            Some(done)
        };

        let leads = extract_leads(text, &mut fill);
        assert_eq!(calls, 1);
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].phone, "21912345678");
        assert_eq!(leads[0].name, "Ana");
    }

    #[test]
    fn test_validate_manual_lead() {
        let lead = validate_manual_lead("Ana", "ana@x.com.br", "(11) 98765-4321", "CX1").unwrap();
        assert_eq!(lead.phone, "11987654321");

        assert_eq!(
            validate_manual_lead("", "ana@x.com", "11987654321", "CX1"),
            Err(ManualLeadError::MissingField("name"))
        );
        assert!(matches!(
            validate_manual_lead("Ana", "ana@", "11987654321", "CX1"),
            Err(ManualLeadError::InvalidEmail(_))
        ));
        assert!(matches!(
            validate_manual_lead("Ana", "ana@x.com", "1234", "CX1"),
            Err(ManualLeadError::InvalidPhone(_))
        ));
    }

    #[test]
    fn test_parse_bulk_leads_rejects_duplicates() {
        let text = "imóvel CX111SP: Nome: Ana\nE-mail: ana@x.com\nTelefone: 11987654321\n\
                    imóvel CX222SP: Nome: Bia\nE-mail: ana@x.com\nTelefone: 11987654322\n\
                    imóvel CX333SP: Nome: Caio\nE-mail: caio@x.com\nTelefone: 123\n";
        let result = parse_bulk_leads(text, &[]);
        assert_eq!(result.accepted.len(), 1);
        assert_eq!(result.accepted[0].property_id, "CX111SP");
        assert_eq!(result.problems.len(), 2);
    }
}
