//! Message Composer Module
//!
//! Fills the operator's message templates with lead data. Placeholders are
//! `{{name}}`, `{{city}}`, `{{property_url}}`, `{{telephone}}` and
//! `{{greeting}}`; substitution is a single pass, so a value that happens to
//! contain a placeholder is never expanded again.

use crate::config::MessageTemplates;
use crate::types::Lead;
use chrono::{Local, Timelike};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

pub const PLACEHOLDER_NAME: &str = "{{name}}";
pub const PLACEHOLDER_CITY: &str = "{{city}}";
pub const PLACEHOLDER_URL: &str = "{{property_url}}";
pub const PLACEHOLDER_PHONE: &str = "{{telephone}}";
pub const PLACEHOLDER_GREETING: &str = "{{greeting}}";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("{template} template is missing required placeholders: {}", .missing.join(", "))]
    MissingPlaceholders {
        template: &'static str,
        missing: Vec<&'static str>,
    },

    #[error("lead is missing fields for the normal message: {}", .0.join(", "))]
    MissingLeadFields(Vec<&'static str>),

    #[error("lead {0} has not been looked up yet")]
    NotReady(String),
}

/// Time-of-day greeting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Greeting {
    Morning,
    Afternoon,
    Evening,
}

impl Greeting {
    pub fn for_hour(hour: u32) -> Self {
        if hour < 12 {
            Greeting::Morning
        } else if hour < 18 {
            Greeting::Afternoon
        } else {
            Greeting::Evening
        }
    }

    pub fn now() -> Self {
        Greeting::for_hour(Local::now().hour())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Greeting::Morning => "Bom dia",
            Greeting::Afternoon => "Boa tarde",
            Greeting::Evening => "Boa noite",
        }
    }
}

/// Which of the operator's templates a lead gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Normal,
    Unavailable,
    PendingReview,
}

impl TemplateKind {
    pub fn for_lead(lead: &Lead) -> Self {
        if lead.property_not_available {
            TemplateKind::Unavailable
        } else if lead.manual_review_needed || lead.city.is_empty() {
            TemplateKind::PendingReview
        } else {
            TemplateKind::Normal
        }
    }

    pub fn template<'a>(&self, templates: &'a MessageTemplates) -> &'a str {
        match self {
            TemplateKind::Normal => &templates.normal_lead,
            TemplateKind::Unavailable => &templates.unavailable_lead,
            TemplateKind::PendingReview => &templates.pending_review_lead,
        }
    }
}

/// Replace every known placeholder in one pass. Unknown placeholders stay as written.
pub fn render_template(template: &str, lead: &Lead, greeting: Greeting) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "name" => lead.name.clone(),
            "city" => lead.city.clone(),
            "property_url" => lead.property_url.clone(),
            "telephone" => lead.phone.clone(),
            "greeting" => greeting.as_str().to_string(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Pick the lead's template and fill it in
pub fn compose_message(
    lead: &Lead,
    templates: &MessageTemplates,
    greeting: Greeting,
) -> Result<String, TemplateError> {
    if !lead.is_ready_for_message() {
        return Err(TemplateError::NotReady(lead.property_id.clone()));
    }

    let kind = TemplateKind::for_lead(lead);

    if kind == TemplateKind::Normal {
        let mut missing = Vec::new();
        if lead.name.is_empty() {
            missing.push("name");
        }
        if lead.property_url.is_empty() {
            missing.push("property_url");
        }
        if !missing.is_empty() {
            return Err(TemplateError::MissingLeadFields(missing));
        }
    }

    Ok(render_template(kind.template(templates), lead, greeting))
}

fn check_placeholders(
    template: &str,
    name: &'static str,
    required: &[&'static str],
) -> Result<(), TemplateError> {
    let missing: Vec<&'static str> = required
        .iter()
        .copied()
        .filter(|placeholder| !template.contains(placeholder))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(TemplateError::MissingPlaceholders { template: name, missing })
    }
}

/// Guard against an operator saving a template that cannot work
pub fn validate_templates(normal: &str, unavailable: &str, pending: &str) -> Result<(), TemplateError> {
    check_placeholders(normal, "normal", &[PLACEHOLDER_NAME, PLACEHOLDER_CITY, PLACEHOLDER_URL])?;
    check_placeholders(unavailable, "unavailable", &[PLACEHOLDER_NAME])?;
    check_placeholders(pending, "pending review", &[PLACEHOLDER_NAME, PLACEHOLDER_URL])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LeadStatus;

    fn complete_lead() -> Lead {
        let mut lead = Lead::new(
            "João Silva".to_string(),
            "11987654321".to_string(),
            None,
            "CX08444425765084SP".to_string(),
        );
        lead.city = "Campinas".to_string();
        lead.property_url = "https://viahouseleiloes.com.br/imovel/1".to_string();
        lead.status = LeadStatus::Complete;
        lead
    }

    #[test]
    fn test_greeting_boundaries() {
        assert_eq!(Greeting::for_hour(0), Greeting::Morning);
        assert_eq!(Greeting::for_hour(11), Greeting::Morning);
        assert_eq!(Greeting::for_hour(12), Greeting::Afternoon);
        assert_eq!(Greeting::for_hour(17), Greeting::Afternoon);
        assert_eq!(Greeting::for_hour(18), Greeting::Evening);
        assert_eq!(Greeting::for_hour(23).as_str(), "Boa noite");
    }

    #[test]
    fn test_render_all_placeholders() {
        let template = "{{greeting}} {{name}} ({{telephone}}) - {{city}}: {{property_url}} {{unknown}}";
        let out = render_template(template, &complete_lead(), Greeting::Afternoon);
        assert_eq!(
            out,
            "Boa tarde João Silva (11987654321) - Campinas: https://viahouseleiloes.com.br/imovel/1 {{unknown}}"
        );
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let mut lead = complete_lead();
        lead.name = "{{city}}".to_string();
        let out = render_template("{{name}}/{{city}}", &lead, Greeting::Morning);
        assert_eq!(out, "{{city}}/Campinas");
    }

    #[test]
    fn test_template_selection() {
        let templates = MessageTemplates::default();
        let mut lead = complete_lead();
        assert_eq!(TemplateKind::for_lead(&lead), TemplateKind::Normal);

        lead.manual_review_needed = true;
        assert_eq!(TemplateKind::for_lead(&lead), TemplateKind::PendingReview);

        lead.property_not_available = true;
        lead.city.clear();
        lead.property_url.clear();
        assert_eq!(TemplateKind::for_lead(&lead), TemplateKind::Unavailable);

        let message = compose_message(&lead, &templates, Greeting::Morning).unwrap();
        assert!(message.starts_with("Bom dia João Silva!"));
        assert!(!message.contains("{{"));
    }

    #[test]
    fn test_unprocessed_lead_is_not_composed() {
        let lead = Lead::new(
            "Ana".to_string(),
            "11987654321".to_string(),
            None,
            "CX1".to_string(),
        );
        let err = compose_message(&lead, &MessageTemplates::default(), Greeting::Morning).unwrap_err();
        assert_eq!(err, TemplateError::NotReady("CX1".to_string()));
    }

    #[test]
    fn test_validate_templates() {
        assert!(validate_templates("{{name}} {{city}} {{property_url}}", "{{name}}", "{{name}} {{property_url}}").is_ok());

        let err = validate_templates("{{name}}", "{{name}}", "{{name}} {{property_url}}").unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingPlaceholders {
                template: "normal",
                missing: vec![PLACEHOLDER_CITY, PLACEHOLDER_URL],
            }
        );

        assert!(validate_templates("{{name}} {{city}} {{property_url}}", "Olá", "{{name}} {{property_url}}").is_err());
    }
}
