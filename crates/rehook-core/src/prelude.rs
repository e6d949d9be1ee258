pub use crate::config::{ContextScan, IdleHook, RegistryConfig, SweepPolicy};
pub use crate::context::{Context, ContextKey};
pub use crate::error::RegistryError;
pub use crate::mount::Mountable;
pub use crate::node::MountNode;
pub use crate::registry::{Owner, OwnerId, Registry, RegistryStats, SweepReport};
pub use crate::state::{AsDependency, Signature, State, Tracked, Version, detached_state};
pub use crate::weak::{ContextState, WeakHandle};
