use std::sync::Arc;

use call_signaling::PeerId;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

const SELECTION_BUFFER: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("user {0} is not in the directory")]
    UnknownUser(PeerId),
}

/// A user picked from the directory; the orchestrator turns it into a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSelected {
    pub user: PeerId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub id: PeerId,
    pub selected: bool,
}

#[derive(Debug, Default)]
struct DirectoryState {
    entries: Vec<UserEntry>,
    talking_with: Option<PeerId>,
}

/// The online-user list. Cloning shares the same list and subscribers.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    state: Arc<Mutex<DirectoryState>>,
    selections: broadcast::Sender<UserSelected>,
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl UserDirectory {
    pub fn new() -> Self {
        let (selections, _) = broadcast::channel(SELECTION_BUFFER);
        Self {
            state: Arc::new(Mutex::new(DirectoryState::default())),
            selections,
        }
    }

    /// Adds an entry for every id not already listed. Returns how many were new.
    pub fn update_user_list(&self, users: &[PeerId]) -> usize {
        let mut state = self.state.lock();
        let mut added = 0;
        for user in users {
            if state.entries.iter().any(|entry| &entry.id == user) {
                continue;
            }
            state.entries.push(UserEntry {
                id: user.clone(),
                selected: false,
            });
            added += 1;
        }
        if added > 0 {
            debug!(target = "call", added, total = state.entries.len(), "user list updated");
        }
        added
    }

    pub fn remove_user(&self, user: &PeerId) -> bool {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|entry| &entry.id != user);
        if state.talking_with.as_ref() == Some(user) {
            state.talking_with = None;
        }
        state.entries.len() != before
    }

    /// Marks `user` as the only selected entry and notifies every subscriber.
    pub fn select(&self, user: &PeerId) -> Result<(), DirectoryError> {
        {
            let mut state = self.state.lock();
            if !state.entries.iter().any(|entry| &entry.id == user) {
                return Err(DirectoryError::UnknownUser(user.clone()));
            }
            for entry in state.entries.iter_mut() {
                entry.selected = &entry.id == user;
            }
            state.talking_with = Some(user.clone());
        }
        // Nobody listening is fine; the selection itself still stands.
        let _ = self.selections.send(UserSelected { user: user.clone() });
        Ok(())
    }

    /// Selects by 1-based position in the rendered list.
    pub fn select_index(&self, index: usize) -> Result<PeerId, DirectoryError> {
        let user = {
            let state = self.state.lock();
            index
                .checked_sub(1)
                .and_then(|i| state.entries.get(i))
                .map(|entry| entry.id.clone())
        }
        .ok_or_else(|| DirectoryError::UnknownUser(PeerId::new(index.to_string())))?;
        self.select(&user)?;
        Ok(user)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserSelected> {
        self.selections.subscribe()
    }

    pub fn entries(&self) -> Vec<UserEntry> {
        self.state.lock().entries.clone()
    }

    pub fn contains(&self, user: &PeerId) -> bool {
        self.state.lock().entries.iter().any(|entry| &entry.id == user)
    }

    pub fn selected(&self) -> Option<PeerId> {
        self.state
            .lock()
            .entries
            .iter()
            .find(|entry| entry.selected)
            .map(|entry| entry.id.clone())
    }

    pub fn talking_with_label(&self) -> Option<String> {
        self.state
            .lock()
            .talking_with
            .as_ref()
            .map(|user| format!("Talking with: \"Socket: {user}\""))
    }

    /// One line per user, numbered, with the selected entry marked.
    pub fn render(&self) -> Vec<String> {
        let state = self.state.lock();
        state
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let marker = if entry.selected { '*' } else { ' ' };
                format!("{marker} {:>2}. User: {}", i + 1, entry.id)
            })
            .collect()
    }
}
