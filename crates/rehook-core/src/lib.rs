//! # Cells, Effects, and Contexts
//!
//! Rehook attaches hook-style state to plain objects without subclassing or
//! wrapping them. There are three main pieces:
//!
//! - `State<T>` — a versioned cell declared on a mount point.
//! - `use_effect` — a closure re-run whenever one of its dependency cells is
//!   written.
//! - `Context` — a shared object other mount points discover by type.
//!
//! ## Mount points
//!
//! Anything that embeds an `Owner` can host hooks by implementing
//! `Mountable`. The `Owner` comes from a `Registry`, which is an explicit
//! value: build one at start-up and pass it to whatever creates mount points.
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use rehook_core::*;
//!
//! struct Screen {
//!     owner: Owner,
//!     count: State<i32>,
//! }
//!
//! impl Mountable for Screen {
//!     fn owner(&self) -> &Owner {
//!         &self.owner
//!     }
//! }
//!
//! let registry = Registry::new();
//! let owner = registry.mount();
//! let count = owner.use_state(1);
//! let screen = Screen { owner, count };
//!
//! let runs = Rc::new(Cell::new(0));
//! screen.use_effect(
//!     {
//!         let runs = runs.clone();
//!         move || runs.set(runs.get() + 1)
//!     },
//!     &[&screen.count],
//! );
//! assert_eq!(runs.get(), 1); // effects run once on registration
//!
//! screen.count.set(2);
//! screen.count.set(2); // same value, still a new version
//! assert_eq!(runs.get(), 3);
//! ```
//!
//! ## Change detection
//!
//! Every write bumps the cell's `Version`; values are never compared. An
//! effect keeps the versions its dependencies had when it last ran and runs
//! again as soon as any differs. A dependency that has been dropped reads as
//! released, which also counts as a change.
//!
//! Everything runs synchronously on the writing thread. Effects on one mount
//! point fire in registration order.
//!
//! ## Reclamation
//!
//! The registry never keeps a mount point alive. Dropping an `Owner` makes
//! its cells inert and leaves a stale entry that is skipped on every lookup
//! and removed by `Registry::sweep`. Hosts call `Registry::on_idle` from their
//! event loop (optionally prompted by an `IdleHook`) to run pending sweeps.

pub mod config;
pub mod context;
pub mod error;
pub mod mount;
pub mod node;
pub mod prelude;
pub mod registry;
pub mod state;
pub mod weak;

pub use config::*;
pub use context::*;
pub use error::*;
pub use mount::*;
pub use node::*;
pub use prelude::*;
pub use registry::*;
pub use state::*;
pub use weak::*;
