use std::rc::Rc;

use crate::context::Context;
use crate::registry::Owner;
use crate::state::{AsDependency, State};

/// The hook surface for any object that hosts cells and effects.
///
/// Implementors only supply their `Owner`; the hooks route through the
/// owner's registry.
///
/// Effect bodies are stored by the registry for as long as the owner lives.
/// Capture cells or weak references in them, never the implementor itself,
/// or the owner can never be released.
pub trait Mountable {
    fn owner(&self) -> &Owner;

    fn use_state<T: 'static>(&self, initial: T) -> State<T> {
        let owner = self.owner();
        owner.registry().declare_state(initial, owner)
    }

    /// Runs `body` now and again whenever any of `deps` is written.
    fn use_effect(&self, body: impl Fn() + 'static, deps: &[&dyn AsDependency]) {
        let owner = self.owner();
        owner.registry().declare_effect(body, deps, owner);
    }

    /// Resolves a context by type and subscribes this mount point to it.
    fn use_context<C: Context>(&self) -> Option<Rc<C>> {
        let owner = self.owner();
        let context = owner.registry().resolve_context::<C>()?;
        owner.registry().add_subscriber::<C>(owner.id());
        Some(context)
    }

    /// Registers `instance` under its type, replacing any earlier one.
    fn create_context<C: Context>(&self, instance: Rc<C>) -> Rc<C> {
        let owner = self.owner();
        owner.registry().register_context(&instance, owner);
        instance
    }
}

impl Mountable for Owner {
    fn owner(&self) -> &Owner {
        self
    }
}
