//! Passes over a design.
mod backward_propagate;
mod dead_component_removal;
mod forward_propagate;
mod latency_summary;
mod propagate;
mod well_formed;

pub use backward_propagate::BackwardPropagate;
pub use dead_component_removal::DeadComponentRemoval;
pub use forward_propagate::ForwardPropagate;
pub use latency_summary::LatencySummary;
pub use propagate::Propagate;
pub use well_formed::WellFormed;
