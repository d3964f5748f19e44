//! Persistence layer.
//!
//! The only durable artifact is the symbol-set snapshot written at
//! shutdown: a JSON array of symbols in scan order.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

/// Save the symbol set to a JSON file.
pub fn save_snapshot(symbols: &[String], path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(symbols).context("Failed to serialise symbol snapshot")?;

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create snapshot directory {}", parent.display()))?;
    }

    std::fs::write(path, json).with_context(|| format!("Failed to write snapshot to {path}"))?;

    debug!(path, symbols = symbols.len(), "Snapshot saved");
    Ok(())
}

/// Load a previously written snapshot.
/// Returns None if the file doesn't exist.
pub fn load_snapshot(path: &str) -> Result<Option<Vec<String>>> {
    if !Path::new(path).exists() {
        debug!(path, "No previous snapshot");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read snapshot from {path}"))?;
    let symbols: Vec<String> =
        serde_json::from_str(&json).with_context(|| format!("Failed to parse snapshot {path}"))?;

    info!(path, symbols = symbols.len(), "Previous snapshot loaded");
    Ok(Some(symbols))
}

/// Delete the snapshot file if present.
pub fn delete_snapshot(path: &str) -> Result<()> {
    if Path::new(path).exists() {
        std::fs::remove_file(path).with_context(|| format!("Failed to delete snapshot {path}"))?;
    }
    Ok(())
}

/// Symbols added and removed relative to a previous snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SnapshotDiff {
    pub fn between(previous: &[String], current: &[String]) -> Self {
        Self {
            added: current.iter().filter(|s| !previous.contains(*s)).cloned().collect(),
            removed: previous.iter().filter(|s| !current.contains(*s)).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
