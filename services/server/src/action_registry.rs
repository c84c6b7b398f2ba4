//! `ActionRegistry` (§4.7, §4.9): a name→handler map dispatched from an
//! `action` frame. Handlers run synchronously against the caller's
//! connection context — `Cell::set` already does its own notification
//! fan-out, so a handler that mutates several keys gets exactly the pushes
//! `StateMap`'s onChange wiring would produce for the same mutations made
//! any other way — and against the full `Client`, not just its `StateMap`,
//! so a handler may also broadcast or send a targeted message per §4.9
//! ("Handlers may mutate server-owned state, broadcast, or send targeted
//! messages").
//!
//! Grounded on the teacher's `ws_receiver.rs` command-dispatch table
//! (name → handler lookup, "not found" turned into a reply rather than a
//! dropped connection).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::client::Client;
use crate::error::ActionError;

type ActionHandler = Box<dyn Fn(&Arc<Client>, Value) + Send + Sync>;

#[derive(Default)]
pub struct ActionRegistry {
    handlers: RwLock<HashMap<String, ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any handler previously
    /// registered under the same name.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&Arc<Client>, Value) + Send + Sync + 'static,
    ) {
        self.handlers
            .write()
            .unwrap()
            .insert(name.into(), Box::new(handler));
    }

    /// Looks up `name` and, if found, runs its handler against `client`. An
    /// unregistered name is reported to the caller rather than treated as
    /// fatal — the connection stays open (§4.7, §9).
    pub fn dispatch(&self, client: &Arc<Client>, name: &str, payload: Value) -> Result<(), ActionError> {
        let handlers = self.handlers.read().unwrap();
        match handlers.get(name) {
            Some(handler) => {
                handler(client, payload);
                Ok(())
            }
            None => Err(ActionError::NotFound(name.to_owned())),
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.read().unwrap().contains_key(name)
    }
}
