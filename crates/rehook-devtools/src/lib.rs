use bitflags::bitflags;
use web_time::{Duration, Instant};

use rehook_core::{Registry, SweepReport};

bitflags! {
    /// Sections included in `Inspector::lines`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DumpFlags: u8 {
        const SUMMARY = 1 << 0;
        const NODES = 1 << 1;
        const SWEEPS = 1 << 2;
    }
}

impl Default for DumpFlags {
    fn default() -> Self {
        DumpFlags::SUMMARY | DumpFlags::SWEEPS
    }
}

/// Installs `env_logger` honouring `RUST_LOG`. Safe to call more than once.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// Watches a registry from the host loop: runs idle sweeps, keeps totals and
/// renders them as short text lines.
pub struct Inspector {
    pub flags: DumpFlags,
    sweeps: u64,
    collected: SweepReport,
    last_sweep: Option<Instant>,
    last_sweep_cost: Duration,
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspector {
    pub fn new() -> Self {
        Self {
            flags: DumpFlags::default(),
            sweeps: 0,
            collected: SweepReport::default(),
            last_sweep: None,
            last_sweep_cost: Duration::ZERO,
        }
    }

    pub fn with_flags(mut self, flags: DumpFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Forwards an idle signal to the registry and records what it collected.
    pub fn idle(&mut self, registry: &Registry) -> Option<SweepReport> {
        let start = Instant::now();
        let report = registry.on_idle()?;
        self.record(report, start);
        Some(report)
    }

    /// Forces a sweep regardless of the registry's policy.
    pub fn sweep(&mut self, registry: &Registry) -> SweepReport {
        let start = Instant::now();
        let report = registry.sweep();
        self.record(report, start);
        report
    }

    fn record(&mut self, report: SweepReport, start: Instant) {
        let now = Instant::now();
        self.sweeps += 1;
        self.last_sweep = Some(now);
        self.last_sweep_cost = now - start;
        self.collected.nodes += report.nodes;
        self.collected.contexts += report.contexts;
        self.collected.owners += report.owners;
        self.collected.cells += report.cells;
        self.collected.subscribers += report.subscribers;
        if !report.is_empty() {
            log::info!(
                "swept {} nodes, {} contexts, {} owners",
                report.nodes,
                report.contexts,
                report.owners
            );
        }
    }

    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    /// Totals over every sweep this inspector ran.
    pub fn collected(&self) -> SweepReport {
        self.collected
    }

    pub fn lines(&self, registry: &Registry) -> Vec<String> {
        let mut lines = Vec::new();
        if self.flags.contains(DumpFlags::SUMMARY) {
            let s = registry.stats();
            lines.push(format!("owners: {}/{}", s.live_owners, s.owners));
            lines.push(format!("nodes: {}", s.nodes));
            lines.push(format!("effects: {}", s.effects));
            lines.push(format!("cells: {}/{}", s.live_cells, s.cells));
            lines.push(format!("contexts: {} ({} subs)", s.contexts, s.subscribers));
            if s.sweep_pending {
                lines.push("sweep pending".to_string());
            }
        }
        if self.flags.contains(DumpFlags::NODES) {
            for node in registry.nodes() {
                let state = if node.can_be_released() { "released" } else { "live" };
                lines.push(format!(
                    "{:?}: {} cells, {} effects, {state}",
                    node.id(),
                    node.live_cell_count(),
                    node.effect_count()
                ));
            }
        }
        if self.flags.contains(DumpFlags::SWEEPS) {
            lines.push(format!("sweeps: {}", self.sweeps));
            if let Some(at) = self.last_sweep {
                lines.push(format!(
                    "last sweep: {:.2} ms, {:.1} s ago",
                    self.last_sweep_cost.as_secs_f64() * 1000.0,
                    at.elapsed().as_secs_f32()
                ));
            }
        }
        lines
    }

    pub fn hud_text(&self, registry: &Registry) -> String {
        self.lines(registry).join("  |  ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rehook_core::Mountable;

    #[test]
    fn test_summary_lines() {
        let registry = Registry::new();
        let owner = registry.mount();
        let count = owner.use_state(0);
        owner.use_effect(|| {}, &[&count]);

        let inspector = Inspector::new().with_flags(DumpFlags::SUMMARY);
        let lines = inspector.lines(&registry);
        assert!(lines.contains(&"owners: 1/1".to_string()));
        assert!(lines.contains(&"effects: 1".to_string()));
        assert!(lines.contains(&"cells: 1/1".to_string()));
    }

    #[test]
    fn test_idle_records_sweeps() {
        let registry = Registry::new();
        let owner = registry.mount();
        let _count = owner.use_state(0);
        drop(owner);

        let mut inspector = Inspector::new();
        let report = inspector.idle(&registry).unwrap();
        assert_eq!(report.nodes, 1);
        assert_eq!(inspector.sweeps(), 1);
        assert_eq!(inspector.collected().owners, 1);
        assert!(inspector.idle(&registry).is_none());
        assert!(inspector.hud_text(&registry).contains("sweeps: 1"));
    }

    #[test]
    fn test_node_lines() {
        let registry = Registry::new();
        let owner = registry.mount();
        let _a = owner.use_state(1);
        let inspector = Inspector::new().with_flags(DumpFlags::NODES);
        let lines = inspector.lines(&registry);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("1 cells, 0 effects, live"));
    }
}
