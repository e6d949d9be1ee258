use std::fmt;
use std::rc::{Rc, Weak};

use crate::state::{AsDependency, Inner, Signature, State, Tracked};

/// Non-owning reference used wherever the registry must not keep a cell or
/// owner alive.
pub struct WeakHandle<T: ?Sized>(Weak<T>);

impl<T: ?Sized> WeakHandle<T> {
    pub fn new(weak: Weak<T>) -> Self {
        Self(weak)
    }

    pub fn from_rc(rc: &Rc<T>) -> Self {
        Self(Rc::downgrade(rc))
    }

    pub fn upgrade(&self) -> Option<Rc<T>> {
        self.0.upgrade()
    }

    /// True once the target has been dropped.
    pub fn is_empty(&self) -> bool {
        self.0.strong_count() == 0
    }

    pub fn as_weak(&self) -> &Weak<T> {
        &self.0
    }
}

impl<T: Tracked + ?Sized> WeakHandle<T> {
    pub fn signature(&self) -> Signature {
        self.0.upgrade().map(|t| t.version())
    }
}

impl<T: ?Sized> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for WeakHandle<T> {
    fn default() -> Self {
        Self(Weak::new())
    }
}

impl<T: ?Sized> fmt::Debug for WeakHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("empty", &self.is_empty())
            .finish()
    }
}

/// A cell shared into a context without the context owning it.
///
/// The context's owner keeps the `State<T>`; the context only looks through
/// to it. Once the owner lets go, reads return `None` and effects depending on
/// it see the released signature.
pub struct ContextState<T: 'static>(WeakHandle<Inner<T>>);

impl<T: 'static> ContextState<T> {
    pub fn new(state: &State<T>) -> Self {
        Self(WeakHandle::new(state.downgrade_inner()))
    }

    pub fn state(&self) -> Option<State<T>> {
        self.0.upgrade().map(State::from_inner)
    }

    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.state().map(|s| s.get())
    }

    /// Writes through to the shared cell. Returns false if it is gone.
    pub fn set(&self, v: T) -> bool {
        match self.state() {
            Some(state) => {
                state.set(v);
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: 'static> Clone for ContextState<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: 'static> From<&State<T>> for ContextState<T> {
    fn from(state: &State<T>) -> Self {
        Self::new(state)
    }
}

impl<T: 'static> AsDependency for ContextState<T> {
    fn dependency(&self) -> Weak<dyn Tracked> {
        let weak: Weak<Inner<T>> = self.0.as_weak().clone();
        weak
    }
}
