//! Entry registry: creates, reconfigures and removes configuration records.

use crate::config::{EntryConfig, EntryInput};
use crate::defaults::DefaultsStore;
use anyhow::Result;
use tracing::info;

pub struct ConfigFlow {
    entries: Vec<EntryConfig>,
    defaults: DefaultsStore,
}

impl ConfigFlow {
    pub fn new(defaults: DefaultsStore) -> Self {
        Self {
            entries: Vec::new(),
            defaults,
        }
    }

    /// Validates `input` and registers it. Fails if an entry with the same
    /// display id already exists.
    pub fn create_entry(&mut self, input: EntryInput) -> Result<EntryConfig> {
        let entry = input.resolve(self.defaults.min_time_between_requests())?;
        if self.get(&entry.id).is_some() {
            anyhow::bail!("entry '{}' is already configured", entry.id);
        }
        self.defaults
            .set_min_time_between_requests(entry.min_time_between_requests);
        info!("Created entry '{}'", entry.title());
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Replaces the record for `id` wholesale. The new input may rename the
    /// entry as long as the new id is not taken by another entry.
    pub fn reconfigure(&mut self, id: &str, input: EntryInput) -> Result<EntryConfig> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| anyhow::anyhow!("no entry '{}' to reconfigure", id))?;
        let entry = input.resolve(self.defaults.min_time_between_requests())?;
        if entry.id != id && self.get(&entry.id).is_some() {
            anyhow::bail!("entry '{}' is already configured", entry.id);
        }
        self.defaults
            .set_min_time_between_requests(entry.min_time_between_requests);
        info!("Reconfigured entry '{}'", entry.title());
        self.entries[pos] = entry.clone();
        Ok(entry)
    }

    pub fn remove_entry(&mut self, id: &str) -> Option<EntryConfig> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        info!("Removed entry '{}'", id);
        Some(self.entries.remove(pos))
    }

    pub fn get(&self, id: &str) -> Option<&EntryConfig> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[EntryConfig] {
        &self.entries
    }

    pub fn defaults(&self) -> &DefaultsStore {
        &self.defaults
    }
}
