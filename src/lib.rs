//! Lead Courier Library
//!
//! Turns pasted lead-notification e-mails into ready-to-send WhatsApp
//! messages: extraction, property lookup through a browser, triage and
//! message composition.

pub mod compose;
pub mod config;
pub mod extract;
pub mod extraction_fallbacks;
pub mod handoff;
pub mod logging;
pub mod pipeline;
pub mod scrapers;
pub mod storage;
pub mod triage;
pub mod types;

pub use types::*;
