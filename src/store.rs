use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;

/// Durable ledger of message ids that were successfully forwarded.
///
/// Backed by a single file holding a JSON array of ids. The file is rewritten
/// in full on every record: the current on-disk set is re-read, the new id
/// merged in, and the union written back, so a partially-appended tail can
/// never corrupt the ledger. Ids are never removed.
///
/// Persistence failures degrade rather than fail: the id stays in the
/// in-memory set for the rest of the run (the message will not be forwarded
/// twice within this process), and the next successful write will include it.
pub struct ForwardedStore {
    path: PathBuf,
    ids: HashSet<String>,
}

impl ForwardedStore {
    /// Load the ledger. Missing or corrupt storage yields an empty set and a
    /// log line; it never fails the process.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = if path.exists() {
            match read_ids(&path) {
                Ok(ids) => {
                    log::debug!("loaded {} forwarded id(s) from {}", ids.len(), path.display());
                    ids
                }
                Err(e) => {
                    log::warn!(
                        "forwarded-id store {} unreadable, starting with empty set: {e:#}",
                        path.display()
                    );
                    HashSet::new()
                }
            }
        } else {
            log::debug!("no forwarded-id store at {}, starting fresh", path.display());
            HashSet::new()
        };
        ForwardedStore { path, ids }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Record a successful forward. Call this only after the send completed
    /// without error.
    pub fn record(&mut self, id: &str) {
        self.ids.insert(id.to_string());

        // Merge with whatever is on disk right now before rewriting, so a
        // concurrent one-shot invocation's ids are not lost.
        if let Ok(on_disk) = read_ids(&self.path) {
            self.ids.extend(on_disk);
        }

        if let Err(e) = self.persist() {
            log::warn!(
                "failed to persist forwarded-id store {}; continuing with in-memory dedup: {e:#}",
                self.path.display()
            );
        }
    }

    fn persist(&self) -> anyhow::Result<()> {
        let mut sorted: Vec<&String> = self.ids.iter().collect();
        sorted.sort();
        let json = serde_json::to_string_pretty(&sorted)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

fn read_ids(path: &Path) -> anyhow::Result<HashSet<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let ids: Vec<String> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(ids.into_iter().collect())
}
