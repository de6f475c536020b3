use crate::traversal::{Action, Named, Order, VisResult, Visitor};
use lim_ir::{CompIdx, Design};

/// Pushes constant and identity information forward through every
/// component once. Components are visited in data flow order so that one
/// pass over an acyclic design reaches its fixed point.
#[derive(Default)]
pub struct ForwardPropagate {
    /// Components whose ports or buses changed.
    updated: usize,
}

impl ForwardPropagate {
    /// True if the traversal changed any value.
    pub fn modified(&self) -> bool {
        self.updated > 0
    }
}

impl Named for ForwardPropagate {
    fn name() -> &'static str {
        "forward-propagate"
    }

    fn description() -> &'static str {
        "push constant and identity bits forward through the design"
    }
}

impl Visitor for ForwardPropagate {
    fn iteration_order() -> Order {
        Order::DataFlow
    }

    fn unhandled(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        if design.push_values_forward(comp)? {
            log::trace!("forward: updated {}", design.describe(comp));
            self.updated += 1;
        }
        Ok(Action::Continue)
    }

    fn finish_design(&mut self, _design: &mut Design) -> VisResult {
        log::debug!("forward propagation updated {} components", self.updated);
        Ok(Action::Continue)
    }
}
