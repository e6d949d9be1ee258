use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use slotmap::{SecondaryMap, SlotMap};

use crate::config::{IdleHook, RegistryConfig, SweepPolicy};
use crate::context::{ContextEntry, ContextKey};
use crate::error::RegistryError;
use crate::node::MountNode;
use crate::state::{AsDependency, State};

slotmap::new_key_type! {
    /// Identity of a mount point. Generation-checked: a key whose owner has
    /// been swept never resolves again, even if its slot is reused.
    pub struct OwnerId;
}

/// Liveness token. Strongly held by the `Owner` only.
pub(crate) struct OwnerToken;

#[derive(Default)]
pub(crate) struct Tables {
    pub(crate) owners: SlotMap<OwnerId, Weak<OwnerToken>>,
    pub(crate) nodes: SecondaryMap<OwnerId, Rc<MountNode>>,
    pub(crate) contexts: HashMap<ContextKey, ContextEntry>,
}

impl Tables {
    pub(crate) fn is_alive(&self, id: OwnerId) -> bool {
        self.owners
            .get(id)
            .is_some_and(|token| token.strong_count() > 0)
    }
}

pub(crate) struct Shared {
    pub(crate) config: RegistryConfig,
    pub(crate) tables: RefCell<Tables>,
    sweep_pending: Cell<bool>,
    idle: RefCell<Option<Box<dyn IdleHook>>>,
}

/// Table of mount points and contexts.
///
/// A `Registry` is a cheap handle; clones share the same tables. It is
/// confined to the thread that created it (`!Send`), and every call runs
/// synchronously on that thread.
#[derive(Clone)]
pub struct Registry {
    pub(crate) shared: Rc<Shared>,
}

#[derive(Clone)]
pub(crate) struct WeakRegistry(Weak<Shared>);

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Option<Registry> {
        self.0.upgrade().map(|shared| Registry { shared })
    }
}

/// Entries removed by one `sweep`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub nodes: usize,
    pub contexts: usize,
    pub owners: usize,
    pub cells: usize,
    pub subscribers: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == SweepReport::default()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub owners: usize,
    pub live_owners: usize,
    pub nodes: usize,
    pub effects: usize,
    pub cells: usize,
    pub live_cells: usize,
    pub contexts: usize,
    pub subscribers: usize,
    pub sweep_pending: bool,
}

/// A mount point's identity and liveness.
///
/// Collaborators embed one and hand it to the registry. Dropping it marks the
/// identity dead: its cells stop triggering effects and its entries are
/// collected by the next sweep.
pub struct Owner {
    id: OwnerId,
    token: Rc<OwnerToken>,
    registry: Registry,
}

impl Owner {
    pub fn id(&self) -> OwnerId {
        self.id
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn liveness(&self) -> Weak<OwnerToken> {
        Rc::downgrade(&self.token)
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owner").field(&self.id).finish()
    }
}

impl Drop for Owner {
    fn drop(&mut self) {
        log::trace!("owner {:?} dropped", self.id);
        self.registry.request_sweep();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            shared: Rc::new(Shared {
                config,
                tables: RefCell::new(Tables::default()),
                sweep_pending: Cell::new(false),
                idle: RefCell::new(None),
            }),
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.shared.config
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Rc::downgrade(&self.shared))
    }

    pub fn ptr_eq(&self, other: &Registry) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Issues a fresh identity.
    pub fn mount(&self) -> Owner {
        let token = Rc::new(OwnerToken);
        let id = self
            .shared
            .tables
            .borrow_mut()
            .owners
            .insert(Rc::downgrade(&token));
        log::trace!("mounted owner {id:?}");
        Owner {
            id,
            token,
            registry: self.clone(),
        }
    }

    pub fn is_alive(&self, id: OwnerId) -> bool {
        self.shared.tables.borrow().is_alive(id)
    }

    /// Lookup-or-create.
    ///
    /// A node whose owner is gone is evicted and reported as absent; it is
    /// never handed out again. A missing node is created only when `owner` is
    /// given and belongs to this registry.
    pub fn mount_node_for(&self, id: OwnerId, owner: Option<&Owner>) -> Option<Rc<MountNode>> {
        let found = self.lookup_node(id, owner);
        self.after_lookup();
        found
    }

    fn lookup_node(&self, id: OwnerId, owner: Option<&Owner>) -> Option<Rc<MountNode>> {
        let mut evicted = None;
        let found = {
            let mut tables = self.shared.tables.borrow_mut();
            match tables.nodes.get(id).cloned() {
                Some(node) if node.can_be_released() => {
                    evicted = tables.nodes.remove(id);
                    log::debug!("mount node {id:?} released");
                    None
                }
                Some(node) => Some(node),
                None => match owner {
                    Some(owner) if owner.id == id && owner.registry.ptr_eq(self) => {
                        if tables.is_alive(id) {
                            let node = Rc::new(MountNode::new(id, owner.liveness()));
                            tables.nodes.insert(id, node.clone());
                            Some(node)
                        } else {
                            None
                        }
                    }
                    Some(owner) => {
                        log::warn!("owner {:?} cannot create a node for {id:?}", owner.id);
                        None
                    }
                    None => None,
                },
            }
        };
        // Effect closures may own things whose drop calls back in.
        drop(evicted);
        found
    }

    /// Creates a cell on `owner`. Writing it re-evaluates the owner's effects
    /// and notifies subscribers of contexts tied to the owner.
    pub fn declare_state<T: 'static>(&self, initial: T, owner: &Owner) -> State<T> {
        let id = owner.id;
        let liveness = owner.liveness();
        let registry = self.downgrade();
        let state = State::with_hook(
            initial,
            Box::new(move || {
                if liveness.strong_count() == 0 {
                    return;
                }
                if let Some(registry) = registry.upgrade() {
                    registry.trigger_effects(id);
                }
            }),
        );
        match self.mount_node_for(id, Some(owner)) {
            Some(node) => node.append_cell(state.dependency()),
            None => log::warn!("state declared on unmounted owner {id:?}; it will not be tracked"),
        }
        state
    }

    /// Registers `body` on the owner's node and runs it once.
    pub fn declare_effect(
        &self,
        body: impl Fn() + 'static,
        deps: &[&dyn AsDependency],
        owner: &Owner,
    ) {
        match self.mount_node_for(owner.id, Some(owner)) {
            Some(node) => node.register_effect(Rc::new(body), deps),
            None => log::warn!("effect declared on unmounted owner {:?}; dropped", owner.id),
        }
    }

    /// Re-evaluates the node of `id`, then notifies subscribers of every
    /// context owned by `id` and of any context that is itself mounted at
    /// `id`.
    pub fn trigger_effects(&self, id: OwnerId) {
        log::trace!("trigger effects for {id:?}");
        if let Some(node) = self.mount_node_for(id, None) {
            node.reevaluate();
        }
        let mut keys = self.contexts_owned_by(id);
        for key in self.contexts_mounted_at(id) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        for key in keys {
            self.notify_subscribers(key);
        }
    }

    pub fn set_idle_hook(&self, hook: impl IdleHook) {
        *self.shared.idle.borrow_mut() = Some(Box::new(hook));
    }

    pub fn sweep_pending(&self) -> bool {
        self.shared.sweep_pending.get()
    }

    /// Marks a sweep as pending and pokes the idle hook once per pending
    /// period. No-op under `SweepPolicy::Manual`.
    pub fn request_sweep(&self) {
        if self.shared.config.sweep == SweepPolicy::Manual {
            return;
        }
        if self.shared.sweep_pending.replace(true) {
            return;
        }
        if let Ok(hook) = self.shared.idle.try_borrow()
            && let Some(hook) = hook.as_ref()
        {
            hook.schedule();
        }
    }

    pub(crate) fn after_lookup(&self) {
        match self.shared.config.sweep {
            SweepPolicy::Deferred => self.request_sweep(),
            SweepPolicy::Eager => {
                self.sweep();
            }
            SweepPolicy::Manual => {}
        }
    }

    /// Idle signal from the host loop. Runs the pending sweep, if any.
    pub fn on_idle(&self) -> Option<SweepReport> {
        if !self.shared.sweep_pending.get() {
            return None;
        }
        Some(self.sweep())
    }

    /// Removes nodes, contexts, subscribers, cells and identities whose owner
    /// is gone.
    pub fn sweep(&self) -> SweepReport {
        self.shared.sweep_pending.set(false);
        let mut report = SweepReport::default();
        let mut released = Vec::new();
        {
            let mut tables = self.shared.tables.borrow_mut();
            let Tables {
                owners,
                nodes,
                contexts,
            } = &mut *tables;

            let dead: Vec<OwnerId> = nodes
                .iter()
                .filter(|(_, node)| node.can_be_released())
                .map(|(id, _)| id)
                .collect();
            for id in dead {
                if let Some(node) = nodes.remove(id) {
                    log::debug!("mount node {id:?} released");
                    released.push(node);
                }
            }
            for (_, node) in nodes.iter() {
                report.cells += node.prune_cells();
            }

            let before = contexts.len();
            contexts.retain(|key, entry| {
                let live = entry.is_live();
                if !live {
                    log::debug!("context {} released", key.name());
                }
                live
            });
            report.contexts = before - contexts.len();

            let alive = |id: OwnerId| owners.get(id).is_some_and(|t| t.strong_count() > 0);
            for entry in contexts.values_mut() {
                report.subscribers += entry.retain_subscribers(|id| alive(id));
            }

            let before = owners.len();
            owners.retain(|_, token| token.strong_count() > 0);
            report.owners = before - owners.len();
        }
        report.nodes = released.len();
        drop(released);
        if !report.is_empty() {
            log::debug!("sweep: {report:?}");
        }
        report
    }

    pub fn nodes(&self) -> Vec<Rc<MountNode>> {
        self.shared
            .tables
            .borrow()
            .nodes
            .values()
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let tables = self.shared.tables.borrow();
        let mut stats = RegistryStats {
            owners: tables.owners.len(),
            live_owners: tables
                .owners
                .values()
                .filter(|t| t.strong_count() > 0)
                .count(),
            nodes: tables.nodes.len(),
            contexts: tables.contexts.len(),
            sweep_pending: self.sweep_pending(),
            ..RegistryStats::default()
        };
        for node in tables.nodes.values() {
            stats.effects += node.effect_count();
            stats.cells += node.cell_count();
            stats.live_cells += node.live_cell_count();
        }
        stats.subscribers = tables
            .contexts
            .values()
            .map(|e| e.subscriber_count())
            .sum();
        stats
    }

    pub fn check_invariants(&self) -> Result<(), RegistryError> {
        for node in self.nodes() {
            node.check()?;
        }
        Ok(())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}
