use std::sync::{Arc, RwLock};

use crate::domain::hook::HookBody;
use crate::domain::hook::event::HookEventKind;
use crate::domain::ids::HookName;
use crate::error::{Error, Result};

struct HookEntry {
    name: HookName,
    event: HookEventKind,
    enabled: bool,
    /// Attached by `import`. A created-but-never-imported hook is skipped
    /// by dispatch.
    body: Option<Arc<dyn HookBody>>,
}

/// One element of a dispatch snapshot. Holds its own `Arc` of the body, so
/// deleting the hook from the registry never invalidates a dispatch that
/// already started.
#[derive(Clone)]
pub struct RegisteredHook {
    pub name: HookName,
    pub event: HookEventKind,
    pub body: Arc<dyn HookBody>,
}

/// Process-wide table of event hooks.
///
/// Mutated only by the administrative calls (single-writer discipline);
/// dispatch reads it through `snapshot`, which clones out the enabled hooks
/// in registration order and then releases the lock, so a slow hook body
/// never stalls registry mutation.
pub struct HookRegistry {
    entries: RwLock<Vec<HookEntry>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry { entries: RwLock::new(Vec::new()) }
    }

    /// Registers a new hook name for an event. The body comes later via
    /// `import`.
    pub fn create(&self, name: HookName, event: HookEventKind, enabled: bool) -> Result<()> {
        let mut entries = self.entries.write().expect("RwLock poisoned");
        if entries.iter().any(|e| e.name == name) {
            return Err(Error::AlreadyExists(format!("hook '{}'", name)));
        }
        log::info!("hook '{}' created for event {}", name, event);
        entries.push(HookEntry { name, event, enabled, body: None });
        Ok(())
    }

    /// Attaches (or replaces) the executable body of an existing hook.
    pub fn import(&self, name: &HookName, body: Arc<dyn HookBody>) -> Result<()> {
        let mut entries = self.entries.write().expect("RwLock poisoned");
        let entry = entries
            .iter_mut()
            .find(|e| &e.name == name)
            .ok_or_else(|| Error::UnknownEntity(format!("hook '{}'", name)))?;
        entry.body = Some(body);
        log::info!("hook '{}' imported", name);
        Ok(())
    }

    pub fn delete(&self, name: &HookName) -> Result<()> {
        let mut entries = self.entries.write().expect("RwLock poisoned");
        let pos = entries
            .iter()
            .position(|e| &e.name == name)
            .ok_or_else(|| Error::UnknownEntity(format!("hook '{}'", name)))?;
        entries.remove(pos);
        log::info!("hook '{}' deleted", name);
        Ok(())
    }

    pub fn set_enabled(&self, name: &HookName, enabled: bool) -> Result<()> {
        let mut entries = self.entries.write().expect("RwLock poisoned");
        let entry = entries
            .iter_mut()
            .find(|e| &e.name == name)
            .ok_or_else(|| Error::UnknownEntity(format!("hook '{}'", name)))?;
        entry.enabled = enabled;
        Ok(())
    }

    /// Stable snapshot of the enabled, imported hooks subscribed to `event`,
    /// in registration order.
    pub fn snapshot(&self, event: HookEventKind) -> Vec<RegisteredHook> {
        let entries = self.entries.read().expect("RwLock poisoned");
        entries
            .iter()
            .filter(|e| e.event == event && e.enabled)
            .filter_map(|e| {
                e.body.as_ref().map(|body| RegisteredHook {
                    name: e.name.clone(),
                    event: e.event,
                    body: body.clone(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("RwLock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
