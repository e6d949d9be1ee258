use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Version stamp of a cell. Every write produces a new one, even when the
/// written value equals the old one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    pub const INITIAL: Version = Version(0);

    pub fn next(self) -> Self {
        Version(self.0.wrapping_add(1))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// What an effect remembers about one dependency. `None` means the cell has
/// been released; it never equals a live version.
pub type Signature = Option<Version>;

/// Anything whose changes can be observed through its version.
pub trait Tracked {
    fn version(&self) -> Version;
}

/// Values that can be listed as effect dependencies.
pub trait AsDependency {
    fn dependency(&self) -> Weak<dyn Tracked>;
}

pub(crate) type ChangeHook = Box<dyn Fn()>;

/// A versioned, mutable value slot.
///
/// `State<T>` is a cheap handle; clones point at the same cell. The mount
/// point only keeps a weak reference, so the cell lives as long as some
/// handle does.
pub struct State<T: 'static>(Rc<Inner<T>>);

pub(crate) struct Inner<T> {
    value: RefCell<T>,
    version: Cell<Version>,
    on_change: ChangeHook,
}

impl<T> Tracked for Inner<T> {
    fn version(&self) -> Version {
        self.version.get()
    }
}

impl<T: 'static> State<T> {
    /// A cell that belongs to no mount point. Writes still bump the version,
    /// so it can be used as a dependency, but they trigger nothing by
    /// themselves.
    pub fn detached(value: T) -> Self {
        Self::with_hook(value, Box::new(|| {}))
    }

    pub(crate) fn with_hook(value: T, on_change: ChangeHook) -> Self {
        Self(Rc::new(Inner {
            value: RefCell::new(value),
            version: Cell::new(Version::INITIAL),
            on_change,
        }))
    }

    pub(crate) fn from_inner(inner: Rc<Inner<T>>) -> Self {
        Self(inner)
    }

    pub(crate) fn downgrade_inner(&self) -> Weak<Inner<T>> {
        Rc::downgrade(&self.0)
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.0.value.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.value.borrow())
    }

    pub fn version(&self) -> Version {
        self.0.version.get()
    }

    /// Replaces the value and notifies the owning mount point.
    pub fn set(&self, v: T) {
        drop(self.0.value.replace(v));
        self.touch();
    }

    pub fn replace(&self, v: T) -> T {
        let old = self.0.value.replace(v);
        self.touch();
        old
    }

    pub fn update<F: FnOnce(&mut T)>(&self, f: F) {
        f(&mut self.0.value.borrow_mut());
        self.touch();
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // The value borrow must be released here: effects read the cell.
    fn touch(&self) {
        self.0.version.set(self.0.version.get().next());
        (self.0.on_change)();
    }
}

impl<T: 'static> Clone for State<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: 'static> AsDependency for State<T> {
    fn dependency(&self) -> Weak<dyn Tracked> {
        let weak: Weak<Inner<T>> = Rc::downgrade(&self.0);
        weak
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("value", &*self.0.value.borrow())
            .field("version", &self.version())
            .finish()
    }
}

pub fn detached_state<T: 'static>(value: T) -> State<T> {
    State::detached(value)
}
