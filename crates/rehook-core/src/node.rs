use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::error::RegistryError;
use crate::registry::{OwnerId, OwnerToken};
use crate::state::{AsDependency, Signature, Tracked};
use crate::weak::WeakHandle;

pub(crate) type Snapshot = SmallVec<[Signature; 4]>;

struct EffectSlot {
    body: Rc<dyn Fn()>,
    deps: SmallVec<[WeakHandle<dyn Tracked>; 4]>,
    running: Cell<bool>,
}

impl EffectSlot {
    fn signature(&self) -> Snapshot {
        self.deps.iter().map(|d| d.signature()).collect()
    }
}

// Clears the running flag even if the body unwinds.
struct RunGuard<'a> {
    node: &'a MountNode,
    index: usize,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.node.slots.try_borrow_mut() {
            let slots = &mut *slots;
            let effect = &slots.effects[self.index];
            effect.running.set(false);
            // Writes made by the body itself are not a reason to run again.
            slots.snapshots[self.index] = effect.signature();
        }
    }
}

#[derive(Default)]
struct Slots {
    cells: Vec<WeakHandle<dyn Tracked>>,
    effects: Vec<EffectSlot>,
    // snapshots[i] is the last signature effects[i] ran against.
    snapshots: Vec<Snapshot>,
}

/// Per-owner record of declared cells and registered effects.
pub struct MountNode {
    id: OwnerId,
    owner: Weak<OwnerToken>,
    slots: RefCell<Slots>,
}

impl MountNode {
    pub(crate) fn new(id: OwnerId, owner: Weak<OwnerToken>) -> Self {
        Self {
            id,
            owner,
            slots: RefCell::new(Slots::default()),
        }
    }

    pub fn id(&self) -> OwnerId {
        self.id
    }

    pub fn append_cell(&self, cell: Weak<dyn Tracked>) {
        self.slots.borrow_mut().cells.push(WeakHandle::new(cell));
    }

    /// Stores the effect with a snapshot of its dependencies, then runs it
    /// once.
    pub fn register_effect(&self, body: Rc<dyn Fn()>, deps: &[&dyn AsDependency]) {
        let slot = EffectSlot {
            body: body.clone(),
            deps: deps
                .iter()
                .map(|d| WeakHandle::new(d.dependency()))
                .collect(),
            running: Cell::new(true),
        };
        let index = {
            let mut slots = self.slots.borrow_mut();
            let snapshot = slot.signature();
            slots.effects.push(slot);
            slots.snapshots.push(snapshot);
            slots.effects.len() - 1
        };
        self.assert_consistent();
        log::trace!("effect registered on {:?} with {} deps", self.id, deps.len());
        let _guard = RunGuard { node: self, index };
        body();
    }

    /// Runs every effect whose dependency signature moved since its last run.
    /// Returns how many ran.
    ///
    /// Effects fire in registration order. A body may write cells and so
    /// re-enter this method; an effect that is still running is skipped by
    /// the re-entrant pass, and once it returns its snapshot absorbs its own
    /// writes.
    pub fn reevaluate(&self) -> usize {
        self.assert_consistent();
        let mut ran = 0;
        let mut index = 0;
        loop {
            let (i, body) = {
                let mut slots = self.slots.borrow_mut();
                if index >= slots.effects.len() {
                    break;
                }
                let i = index;
                index += 1;
                let effect = &slots.effects[i];
                if effect.running.get() {
                    continue;
                }
                let current = effect.signature();
                if current == slots.snapshots[i] {
                    continue;
                }
                effect.running.set(true);
                let body = effect.body.clone();
                slots.snapshots[i] = current;
                (i, body)
            };
            log::trace!("effect {i} on {:?} re-run", self.id);
            let _guard = RunGuard { node: self, index: i };
            body();
            ran += 1;
        }
        ran
    }

    pub fn can_be_released(&self) -> bool {
        self.owner.strong_count() == 0
    }

    pub fn check(&self) -> Result<(), RegistryError> {
        let slots = self.slots.borrow();
        if slots.effects.len() != slots.snapshots.len() {
            return Err(RegistryError::SnapshotMismatch {
                owner: self.id,
                effects: slots.effects.len(),
                snapshots: slots.snapshots.len(),
            });
        }
        Ok(())
    }

    fn assert_consistent(&self) {
        if let Err(e) = self.check() {
            panic!("{e}");
        }
    }

    pub fn effect_count(&self) -> usize {
        self.slots.borrow().effects.len()
    }

    pub fn cell_count(&self) -> usize {
        self.slots.borrow().cells.len()
    }

    pub fn live_cell_count(&self) -> usize {
        self.slots
            .borrow()
            .cells
            .iter()
            .filter(|c| !c.is_empty())
            .count()
    }

    /// Drops weak slots of released cells. Returns how many went away.
    pub(crate) fn prune_cells(&self) -> usize {
        let mut slots = self.slots.borrow_mut();
        let before = slots.cells.len();
        slots.cells.retain(|c| !c.is_empty());
        before - slots.cells.len()
    }
}

impl fmt::Debug for MountNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountNode")
            .field("id", &self.id)
            .field("released", &self.can_be_released())
            .field("cells", &self.cell_count())
            .field("effects", &self.effect_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;
    use slotmap::SlotMap;

    fn node_with_owner() -> (MountNode, Rc<OwnerToken>) {
        let mut ids: SlotMap<OwnerId, ()> = SlotMap::with_key();
        let token = Rc::new(OwnerToken);
        let node = MountNode::new(ids.insert(()), Rc::downgrade(&token));
        (node, token)
    }

    #[test]
    fn test_effect_runs_on_registration_only_once() {
        let (node, _token) = node_with_owner();
        let a = State::detached(1);
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        node.register_effect(Rc::new(move || c.set(c.get() + 1)), &[&a]);
        assert_eq!(calls.get(), 1);

        assert_eq!(node.reevaluate(), 0);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_reevaluate_only_changed() {
        let (node, _token) = node_with_owner();
        let a = State::detached(1);
        let b = State::detached(1);
        let hits_a = Rc::new(Cell::new(0));
        let hits_b = Rc::new(Cell::new(0));
        {
            let h = hits_a.clone();
            node.register_effect(Rc::new(move || h.set(h.get() + 1)), &[&a]);
            let h = hits_b.clone();
            node.register_effect(Rc::new(move || h.set(h.get() + 1)), &[&b]);
        }

        a.set(1);
        assert_eq!(node.reevaluate(), 1);
        assert_eq!((hits_a.get(), hits_b.get()), (2, 1));
    }

    #[test]
    fn test_released_dependency_counts_as_change() {
        let (node, _token) = node_with_owner();
        let a = State::detached(0);
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        node.register_effect(Rc::new(move || c.set(c.get() + 1)), &[&a]);

        drop(a);
        assert_eq!(node.reevaluate(), 1);
        // Released stays released; no further runs.
        assert_eq!(node.reevaluate(), 0);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_can_be_released_follows_owner() {
        let (node, token) = node_with_owner();
        assert!(!node.can_be_released());
        drop(token);
        assert!(node.can_be_released());
    }

    #[test]
    fn test_prune_cells() {
        let (node, _token) = node_with_owner();
        let a = State::detached(1);
        let b = State::detached(2);
        node.append_cell(a.dependency());
        node.append_cell(b.dependency());
        drop(b);
        assert_eq!(node.live_cell_count(), 1);
        assert_eq!(node.prune_cells(), 1);
        assert_eq!(node.cell_count(), 1);
    }

    #[test]
    fn test_check_reports_mismatch() {
        let (node, _token) = node_with_owner();
        node.slots.borrow_mut().snapshots.push(Snapshot::new());
        assert_eq!(
            node.check(),
            Err(RegistryError::SnapshotMismatch {
                owner: node.id(),
                effects: 0,
                snapshots: 1,
            })
        );
    }

    #[test]
    #[should_panic(expected = "dependency snapshots")]
    fn test_mismatch_is_fatal() {
        let (node, _token) = node_with_owner();
        node.slots.borrow_mut().snapshots.push(Snapshot::new());
        node.reevaluate();
    }

    #[test]
    fn test_running_effect_skipped_by_nested_pass() {
        let (node, _token) = node_with_owner();
        let node = Rc::new(node);
        let a = State::detached(15);
        let calls = Rc::new(Cell::new(0));
        let nested = Rc::new(Cell::new(usize::MAX));
        {
            let (c, n, cell) = (calls.clone(), nested.clone(), a.clone());
            let weak = Rc::downgrade(&node);
            node.register_effect(
                Rc::new(move || {
                    c.set(c.get() + 1);
                    cell.set(cell.get().min(10));
                    if let Some(node) = weak.upgrade() {
                        n.set(node.reevaluate());
                    }
                }),
                &[&a],
            );
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(nested.get(), 0);
        assert_eq!(a.get(), 10);
        // Its own write was absorbed once it returned.
        assert_eq!(node.reevaluate(), 0);

        a.set(20);
        assert_eq!(node.reevaluate(), 1);
        assert_eq!(calls.get(), 2);
        assert_eq!(a.get(), 10);
    }
}
