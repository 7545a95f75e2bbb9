//! Trait for components driven by the two-phase master clock.

/// A component that advances in two clock phases.
///
/// Phase 0 samples inputs and evaluates; phase 1 commits outputs. Every
/// component observes the same phase boundary: no phase-1 effect is visible
/// to any phase-0 evaluation of the same cycle.
pub trait Tickable {
    /// Sample inputs and evaluate one cycle of work.
    fn tick_phase0(&mut self);

    /// Commit the outputs evaluated in the preceding phase 0.
    fn tick_phase1(&mut self);

    /// Run one complete cycle (both phases).
    fn tick(&mut self) {
        self.tick_phase0();
        self.tick_phase1();
    }
}
