//! Type-addressed shared objects.
//!
//! A context is registered by one owner and discovered by others through its
//! type alone. Looking one up through `Mountable::use_context` subscribes the
//! caller: whenever the context's owner (or the context itself, when it is a
//! mount point too) writes a cell, the subscriber's effects are re-evaluated.
//!
//! ```rust
//! use std::rc::Rc;
//! use rehook_core::*;
//!
//! struct Counter {
//!     count: ContextState<i32>,
//! }
//! impl Context for Counter {}
//!
//! let registry = Registry::new();
//! let foo = registry.mount();
//! let count = foo.use_state(1);
//! let _ctx = foo.create_context(Rc::new(Counter { count: ContextState::new(&count) }));
//!
//! let bar = registry.mount();
//! let ctx = bar.use_context::<Counter>().unwrap();
//! assert_eq!(ctx.count.get(), Some(1));
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::config::ContextScan;
use crate::registry::{Owner, OwnerId, OwnerToken, Registry};

/// Marker for objects that can be shared by type.
pub trait Context: Any {
    /// The context's own mount point, when it declares cells or effects of
    /// its own. Writes to those cells notify the context's subscribers.
    fn mount(&self) -> Option<&Owner> {
        None
    }
}

/// Registry key for a context type.
#[derive(Clone, Copy)]
pub struct ContextKey {
    id: TypeId,
    name: &'static str,
}

impl ContextKey {
    pub fn of<C: Context>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: type_name::<C>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ContextKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ContextKey {}

impl Hash for ContextKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub(crate) struct ContextEntry {
    instance: Weak<dyn Any>,
    owner_id: OwnerId,
    owner: Weak<OwnerToken>,
    mount_id: Option<OwnerId>,
    subscribers: Vec<OwnerId>,
}

impl ContextEntry {
    fn owner_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }

    pub(crate) fn is_live(&self) -> bool {
        self.owner_alive() && self.instance.strong_count() > 0
    }

    fn downcast<C: Context>(&self) -> Option<Rc<C>> {
        self.instance.upgrade()?.downcast::<C>().ok()
    }

    fn add_subscriber(&mut self, id: OwnerId) -> bool {
        if self.subscribers.contains(&id) {
            return false;
        }
        self.subscribers.push(id);
        true
    }

    /// Returns how many were removed.
    pub(crate) fn retain_subscribers(&mut self, keep: impl Fn(OwnerId) -> bool) -> usize {
        let before = self.subscribers.len();
        self.subscribers.retain(|id| keep(*id));
        before - self.subscribers.len()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Registry {
    /// Registers `instance` under its type, replacing any previous entry and
    /// its subscribers. The registry holds the instance weakly; its lifetime
    /// in the table is bound to `owner`.
    pub fn register_context<C: Context>(&self, instance: &Rc<C>, owner: &Owner) {
        let key = ContextKey::of::<C>();
        let weak: Weak<C> = Rc::downgrade(instance);
        let entry = ContextEntry {
            instance: weak,
            owner_id: owner.id(),
            owner: owner.liveness(),
            mount_id: instance.mount().map(Owner::id),
            subscribers: Vec::new(),
        };
        let previous = self.shared.tables.borrow_mut().contexts.insert(key, entry);
        if previous.is_some() {
            log::debug!("context {} replaced", key.name());
        } else {
            log::trace!("context {} registered by {:?}", key.name(), owner.id());
        }
    }

    /// Looks the context up by type. An entry whose owner is gone is evicted
    /// and reported as absent. Does not subscribe the caller.
    pub fn resolve_context<C: Context>(&self) -> Option<Rc<C>> {
        let key = ContextKey::of::<C>();
        let found = {
            let mut tables = self.shared.tables.borrow_mut();
            let lookup = tables
                .contexts
                .get(&key)
                .map(|entry| (entry.owner_alive(), entry.downcast::<C>()));
            match lookup {
                None => None,
                Some((false, _)) => {
                    tables.contexts.remove(&key);
                    log::debug!("context {} released", key.name());
                    None
                }
                Some((true, instance)) => instance,
            }
        };
        self.after_lookup();
        found
    }

    pub fn add_subscriber<C: Context>(&self, subscriber: OwnerId) -> bool {
        self.add_subscriber_by_key(ContextKey::of::<C>(), subscriber)
    }

    /// Idempotent. Returns true if `subscriber` was newly added.
    pub fn add_subscriber_by_key(&self, key: ContextKey, subscriber: OwnerId) -> bool {
        let mut tables = self.shared.tables.borrow_mut();
        match tables.contexts.get_mut(&key) {
            Some(entry) => entry.add_subscriber(subscriber),
            None => false,
        }
    }

    pub fn subscribers(&self, key: ContextKey) -> Vec<OwnerId> {
        self.shared
            .tables
            .borrow()
            .contexts
            .get(&key)
            .map(|e| e.subscribers.clone())
            .unwrap_or_default()
    }

    /// Re-evaluates every live subscriber's node and drops the dead ones.
    /// Returns how many nodes were re-evaluated. Order across subscribers is
    /// not guaranteed.
    pub fn notify_subscribers(&self, key: ContextKey) -> usize {
        let subscribers = self.subscribers(key);
        let mut dead = Vec::new();
        let mut notified = 0;
        for id in subscribers {
            if !self.is_alive(id) {
                dead.push(id);
                continue;
            }
            if let Some(node) = self.mount_node_for(id, None) {
                node.reevaluate();
                notified += 1;
            }
        }
        if !dead.is_empty() {
            if let Some(entry) = self.shared.tables.borrow_mut().contexts.get_mut(&key) {
                entry.retain_subscribers(|id| !dead.contains(&id));
            }
            log::debug!("context {} dropped subscribers {dead:?}", key.name());
        }
        notified
    }

    /// Keys of contexts registered by `owner`, following the configured
    /// `ContextScan` policy.
    pub fn contexts_owned_by(&self, owner: OwnerId) -> Vec<ContextKey> {
        let keys = {
            let tables = self.shared.tables.borrow();
            match self.shared.config.context_scan {
                ContextScan::PerEntry => tables
                    .contexts
                    .iter()
                    .filter(|(_, e)| e.owner_id == owner && e.owner_alive())
                    .map(|(k, _)| *k)
                    .collect(),
                ContextScan::EarlyExit => {
                    let mut keys = Vec::new();
                    for (key, entry) in tables.contexts.iter() {
                        if !entry.owner_alive() {
                            keys.clear();
                            break;
                        }
                        if entry.owner_id == owner {
                            keys.push(*key);
                        }
                    }
                    keys
                }
            }
        };
        self.after_lookup();
        keys
    }

    /// Keys of contexts whose instance is itself mounted at `id`.
    pub fn contexts_mounted_at(&self, id: OwnerId) -> Vec<ContextKey> {
        self.shared
            .tables
            .borrow()
            .contexts
            .iter()
            .filter(|(_, e)| e.mount_id == Some(id) && e.owner_alive())
            .map(|(k, _)| *k)
            .collect()
    }
}
