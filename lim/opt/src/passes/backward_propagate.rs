use crate::traversal::{Action, Named, Order, VisResult, Visitor};
use lim_ir::{CompIdx, Design};

/// Pushes don't-care information from consumers back to the buses driving
/// them, visiting every module from its OutBufs to its InBuf.
#[derive(Default)]
pub struct BackwardPropagate {
    updated: usize,
}

impl BackwardPropagate {
    /// True if the traversal changed any value.
    pub fn modified(&self) -> bool {
        self.updated > 0
    }
}

impl Named for BackwardPropagate {
    fn name() -> &'static str {
        "backward-propagate"
    }

    fn description() -> &'static str {
        "mark bits that no consumer reads as don't-care"
    }
}

impl Visitor for BackwardPropagate {
    fn iteration_order() -> Order {
        Order::ReverseDataFlow
    }

    fn unhandled(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        if design.push_values_backward(comp)? {
            log::trace!("backward: updated {}", design.describe(comp));
            self.updated += 1;
        }
        Ok(Action::Continue)
    }

    fn finish_design(&mut self, _design: &mut Design) -> VisResult {
        log::debug!("backward propagation updated {} components", self.updated);
        Ok(Action::Continue)
    }
}
