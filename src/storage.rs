use std::fs;
use std::path::Path;
use anyhow::{Result, Context};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::triage::TriageStats;
use crate::types::Lead;

/// One processing run, as kept in the history file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    #[serde(default)]
    pub source_file: String,
    pub stats: TriageStats,
}

impl HistoryEntry {
    pub fn new(source_file: &str, stats: TriageStats) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339(),
            source_file: source_file.to_string(),
            stats,
        }
    }
}

/// Manually entered leads, saved so a crash does not lose them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualLeadsBackup {
    pub leads: Vec<Lead>,
    pub timestamp: String,
    pub count: usize,
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

/// Missing file reads as `None`; a corrupt file is reported and also reads as `None`
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;

    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("Ignoring unreadable file {:?}: {}", path, e);
            Ok(None)
        }
    }
}

pub fn load_history(path: &Path) -> Result<Vec<HistoryEntry>> {
    Ok(read_json(path)?.unwrap_or_default())
}

/// Append a run to the history, dropping the oldest entries beyond `max_entries`
pub fn append_history(path: &Path, entry: HistoryEntry, max_entries: usize) -> Result<Vec<HistoryEntry>> {
    let mut history = load_history(path)?;
    history.push(entry);

    if history.len() > max_entries {
        let excess = history.len() - max_entries;
        history.drain(..excess);
    }

    write_json(path, &history)?;
    debug!("History now has {} entries", history.len());
    Ok(history)
}

/// Back up manual leads. An empty list leaves the existing backup alone.
pub fn save_manual_leads(path: &Path, leads: &[Lead]) -> Result<()> {
    if leads.is_empty() {
        return Ok(());
    }

    let backup = ManualLeadsBackup {
        leads: leads.to_vec(),
        timestamp: Local::now().to_rfc3339(),
        count: leads.len(),
    };
    write_json(path, &backup)
}

pub fn load_manual_leads(path: &Path) -> Result<Vec<Lead>> {
    let backup: Option<ManualLeadsBackup> = read_json(path)?;
    Ok(backup.map(|b| b.leads).unwrap_or_default())
}

/// Leads of the last run, read back by `compose`
pub fn save_processed_leads(path: &Path, leads: &[Lead]) -> Result<()> {
    write_json(path, leads)
}

pub fn load_processed_leads(path: &Path) -> Result<Vec<Lead>> {
    Ok(read_json(path)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LeadStatus;

    fn lead(name: &str) -> Lead {
        Lead::new(name.to_string(), "11987654321".to_string(), None, "CX1".to_string())
    }

    #[test]
    fn test_history_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/history.json");

        for i in 0..5 {
            let stats = TriageStats { total: i, ..Default::default() };
            append_history(&path, HistoryEntry::new("leads.txt", stats), 3).unwrap();
        }

        let history = load_history(&path).unwrap();
        let totals: Vec<usize> = history.iter().map(|h| h.stats.total).collect();
        assert_eq!(totals, vec![2, 3, 4]);
    }

    #[test]
    fn test_missing_and_corrupt_files_read_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        assert!(load_history(&path).unwrap().is_empty());

        fs::write(&path, "{not json").unwrap();
        assert!(load_history(&path).unwrap().is_empty());
    }

    #[test]
    fn test_manual_backup_empty_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manual.json");

        save_manual_leads(&path, &[lead("Ana")]).unwrap();
        save_manual_leads(&path, &[]).unwrap();

        let loaded = load_manual_leads(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Ana");

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["count"], 1);
    }

    #[test]
    fn test_processed_leads_keep_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        let mut done = lead("João");
        done.status = LeadStatus::Complete;
        done.city = "São Paulo".to_string();

        save_processed_leads(&path, &[done.clone()]).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("São Paulo"));
        assert_eq!(load_processed_leads(&path).unwrap(), vec![done]);
    }
}
