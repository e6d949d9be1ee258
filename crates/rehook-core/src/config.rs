//! Registry configuration and the idle hook the host event loop plugs in.

/// When stale registry entries are collected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SweepPolicy {
    /// Lookups and owner drops mark a sweep as pending and poke the idle
    /// hook; the host calls `Registry::on_idle` when it has time.
    #[default]
    Deferred,
    /// Every lookup is followed by a full sweep.
    Eager,
    /// Nothing is scheduled; only explicit `Registry::sweep` collects.
    Manual,
}

/// How `contexts_owned_by` treats entries whose owner is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ContextScan {
    /// Skip dead entries, keep scanning.
    #[default]
    PerEntry,
    /// Any dead entry met during the scan yields an empty result, hiding live
    /// contexts of the same owner until the next sweep. Kept for hosts that
    /// relied on the older behaviour.
    EarlyExit,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    pub sweep: SweepPolicy,
    pub context_scan: ContextScan,
}

impl RegistryConfig {
    pub fn with_sweep(mut self, sweep: SweepPolicy) -> Self {
        self.sweep = sweep;
        self
    }

    pub fn with_context_scan(mut self, scan: ContextScan) -> Self {
        self.context_scan = scan;
        self
    }
}

/// Host-side idle signal. `schedule` is called when a sweep becomes pending;
/// the host later calls `Registry::on_idle` from its main loop.
pub trait IdleHook: 'static {
    fn schedule(&self);
}

impl<F: Fn() + 'static> IdleHook for F {
    fn schedule(&self) {
        self()
    }
}
