//! Outbound handoff to WhatsApp
//!
//! The operator sends every message by hand. This module builds the deep
//! links that open WhatsApp with the message filled in, and writes text/HTML
//! copies of the message for copy-paste when the link does not open.

use crate::config::WhatsappSettings;
use crate::extract::digits_only;
use crate::types::Lead;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Digits only, with the country code prepended when absent
pub fn whatsapp_phone(phone: &str, country_code: &str) -> String {
    let phone = digits_only(phone);
    if phone.is_empty() || phone.starts_with(country_code) {
        phone
    } else {
        format!("{}{}", country_code, phone)
    }
}

/// `whatsapp://` link for the desktop app
pub fn whatsapp_app_link(phone: &str, message: &str) -> String {
    format!(
        "whatsapp://send?phone={}&text={}",
        phone,
        urlencoding::encode(message)
    )
}

/// Browser link, used when the app is not preferred or not installed
pub fn whatsapp_web_link(phone: &str, message: &str) -> String {
    format!(
        "https://api.whatsapp.com/send?phone={}&text={}",
        phone,
        urlencoding::encode(message)
    )
}

/// Preferred link for a lead according to the settings
pub fn whatsapp_link(lead: &Lead, message: &str, settings: &WhatsappSettings) -> String {
    let phone = whatsapp_phone(&lead.phone, &settings.country_code);
    if settings.prefer_app_over_web {
        whatsapp_app_link(&phone, message)
    } else {
        whatsapp_web_link(&phone, message)
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Page showing the message with a button that opens the deep link
pub fn render_fallback_html(message: &str, link: &str) -> String {
    let body = escape_html(message).replace('\n', "<br>\n");
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Mensagem para WhatsApp</title>
</head>
<body>
    <h1>Mensagem para WhatsApp - Copie e Cole no App</h1>
    <div class="message" id="messageText">{body}</div>
    <p><a href="{link}">Abrir WhatsApp</a></p>
    <textarea id="originalMessage" style="display:none;">{raw}</textarea>
</body>
</html>
"#,
        body = body,
        link = escape_html(link),
        raw = escape_html(message),
    )
}

/// File-name-safe version of the lead's name
fn file_stem(lead: &Lead) -> String {
    let name: String = lead
        .name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' || c == '-' { c } else { '_' })
        .collect();
    let name = name.trim();
    if name.is_empty() {
        "mensagem_desconhecido".to_string()
    } else {
        format!("mensagem_{}", name)
    }
}

/// Write `mensagem_<name>.txt` and `.html` into `dir`; returns both paths
pub fn write_fallback_files(dir: &Path, lead: &Lead, message: &str, link: &str) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;

    let stem = file_stem(lead);
    let txt_path = dir.join(format!("{}.txt", stem));
    let html_path = dir.join(format!("{}.html", stem));

    fs::write(&txt_path, message).with_context(|| format!("Failed to write {:?}", txt_path))?;
    fs::write(&html_path, render_fallback_html(message, link))
        .with_context(|| format!("Failed to write {:?}", html_path))?;

    info!("Message for {} saved to {}", lead.name, txt_path.display());
    Ok((txt_path, html_path))
}
