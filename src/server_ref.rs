// ABOUTME: Shared state bridge between the build process and the running slide application
// ABOUTME: Holds the page/tab state map for one session and pushes changes when sync is on

use crate::errors::{Result, SlidevError};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};
use uuid::Uuid;

/// Keys every session starts with, and their defaults
pub const STATE_SCHEMA: &[(&str, u64)] = &[("page", 0), ("tab", 0)];

pub type StateMap = BTreeMap<String, u64>;

/// A change pushed to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub key: String,
    pub value: u64,
}

/// Session-scoped shared state. Create one per session and drop it when the
/// session ends; nothing is persisted.
pub struct ServerRef {
    session: Uuid,
    sync: bool,
    state: RwLock<StateMap>,
    subscribers: Mutex<Vec<Sender<StateUpdate>>>,
}

impl ServerRef {
    pub fn new(sync: bool) -> Self {
        let session = Uuid::new_v4();
        info!("Shared state session {} started (sync: {})", session, sync);
        Self {
            session,
            sync,
            state: RwLock::new(Self::defaults()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn defaults() -> StateMap {
        STATE_SCHEMA
            .iter()
            .map(|(key, value)| (key.to_string(), *value))
            .collect()
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn sync(&self) -> bool {
        self.sync
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.state.read().get(key).copied()
    }

    pub fn snapshot(&self) -> StateMap {
        self.state.read().clone()
    }

    fn replace(&self, key: &str, value: u64) -> Result<()> {
        let mut state = self.state.write();
        match state.get_mut(key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(SlidevError::ValidationError(format!(
                "Unknown shared state key: {}",
                key
            ))),
        }
    }

    /// Server-side mutation; pushed to subscribers when sync is on
    pub fn set(&self, key: &str, value: u64) -> Result<()> {
        self.replace(key, value)?;
        if self.sync {
            self.broadcast(StateUpdate {
                key: key.to_string(),
                value,
            });
        }
        Ok(())
    }

    /// Mutation coming from the application. Returns whether it was applied;
    /// without sync the server keeps its own state.
    pub fn apply_client_update(&self, update: &StateUpdate) -> Result<bool> {
        if !self.sync {
            debug!("Ignoring client update for {} (sync off)", update.key);
            return Ok(false);
        }
        self.replace(&update.key, update.value)?;
        self.broadcast(update.clone());
        Ok(true)
    }

    pub fn subscribe(&self) -> Receiver<StateUpdate> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    fn broadcast(&self, update: StateUpdate) {
        // Dropped receivers are pruned here
        self.subscribers
            .lock()
            .retain(|tx| tx.send(update.clone()).is_ok());
    }

    /// Source of the `/@server-ref/state` module
    pub fn module_code(&self) -> String {
        let state = serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string());
        format!(
            "import {{ reactive }} from 'vue'\n\
             export const sync = {}\n\
             export const state = reactive({})\n\
             export default state\n",
            self.sync, state
        )
    }
}
