//! Saved recipients, persisted as a JSON list in the app directory.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub address: String,
}

/// In-memory copy of the address book. Every mutation is written through.
#[derive(Debug)]
pub struct AddressBook {
    path: PathBuf,
    entries: Vec<Contact>,
}

impl AddressBook {
    /// A missing or unreadable file is an empty book.
    pub fn load(path: PathBuf) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Vec<Contact>>(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), "ignoring unreadable address book: {e}");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Self { path, entries }
    }

    pub fn entries(&self) -> &[Contact] {
        &self.entries
    }

    /// Adds a contact, or renames the existing entry for the same address.
    pub fn save_contact(&mut self, name: &str, address: &str) -> Result<(), ClientError> {
        let (name, address) = (name.trim(), address.trim());
        if address.is_empty() {
            return Err(ClientError::Validation("Enter an address first".to_string()));
        }
        if name.is_empty() {
            return Err(ClientError::Validation("Enter a contact name".to_string()));
        }
        match self.entries.iter_mut().find(|c| c.address == address) {
            Some(existing) => existing.name = name.to_string(),
            None => self.entries.push(Contact {
                name: name.to_string(),
                address: address.to_string(),
            }),
        }
        self.persist()
    }

    pub fn rename(&mut self, index: usize, name: &str) -> Result<(), ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::Validation("Enter a contact name".to_string()));
        }
        let entry = self.entries.get_mut(index).ok_or_else(|| no_such(index))?;
        entry.name = name.to_string();
        self.persist()
    }

    pub fn remove(&mut self, index: usize) -> Result<Contact, ClientError> {
        if index >= self.entries.len() {
            return Err(no_such(index));
        }
        let removed = self.entries.remove(index);
        self.persist()?;
        Ok(removed)
    }

    /// Case-insensitive substring match on name or address. An empty query
    /// matches nothing.
    pub fn search(&self, query: &str) -> Vec<&Contact> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|c| {
                c.name.to_lowercase().contains(&query) || c.address.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// Maps a contact name to its address. Anything else is taken as an address.
    pub fn resolve<'a>(&'a self, recipient: &'a str) -> &'a str {
        let wanted = recipient.trim();
        self.entries
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(wanted))
            .map(|c| c.address.as_str())
            .unwrap_or(wanted)
    }

    fn persist(&self) -> Result<(), ClientError> {
        write_book(&self.path, &self.entries).map_err(|e| {
            warn!(path = %self.path.display(), "failed to save address book: {e:#}");
            ClientError::ActionFailed(format!("Failed to save address book: {e}"))
        })?;
        debug!(entries = self.entries.len(), "address book saved");
        Ok(())
    }
}

fn no_such(index: usize) -> ClientError {
    ClientError::Validation(format!("No contact #{}", index + 1))
}

fn write_book(path: &Path, entries: &[Contact]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(entries)?)?;
    Ok(())
}
