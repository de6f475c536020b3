//! Implements a visitor for the component hierarchy of a [Design].
//! Program passes implemented as the Visitor are directly invoked on a
//! [Design] and walk every root component and, recursively, the children of
//! every module.
use super::action::{Action, VisResult};
use super::order::{self, Order};
use super::{ConstructVisitor, Named};
use lim_ir::{CompIdx, Design, NodeKind};
use lim_utils::LimResult;

/// The visiting interface for the components of a [Design].
/// Contains three kinds of functions:
/// 1. start_<module>: Called when visiting a module top-down.
/// 2. finish_<module>: Called when visiting a module bottom-up.
/// 3. <leaf>: Called once for every leaf component.
///
/// Every `start_*` and leaf hook that a pass does not override calls
/// [Visitor::unhandled], which by default continues the traversal. A pass
/// will usually override one or more functions and rely on the defaults to
/// reach the rest of the design.
pub trait Visitor {
    /// Precondition for this pass to run on the design. If this function
    /// returns None, the pass triggers. Otherwise it aborts and logs the
    /// string as the reason.
    fn precondition(_design: &Design) -> Option<String>
    where
        Self: Sized,
    {
        None
    }

    /// Define the order in which the children of a module are visited.
    #[inline(always)]
    fn iteration_order() -> Order
    where
        Self: Sized,
    {
        Order::Scanner
    }

    /// Define the traversal over a design.
    /// Calls [Visitor::start_design], visits every root component, and
    /// finally calls [Visitor::finish_design].
    fn traverse_design(&mut self, design: &mut Design) -> LimResult<()>
    where
        Self: Sized,
    {
        let order = Self::iteration_order();
        self.start_design(design)?
            .and_then(|| design_roots(design, order).visit(self, design, order))?
            .pop()
            .and_then(|| self.finish_design(design))?;
        Ok(())
    }

    /// Run the visitor on a given [Design].
    fn do_pass(&mut self, design: &mut Design) -> LimResult<()>
    where
        Self: Sized + ConstructVisitor + Named,
    {
        if let Some(msg) = Self::precondition(&*design) {
            log::info!("Skipping `{}': {msg}", Self::name());
            return Ok(());
        }
        self.traverse_design(design)
    }

    /// Build an instance of this pass with [ConstructVisitor::from] and call
    /// [Visitor::do_pass] using it.
    #[inline(always)]
    fn do_pass_default(design: &mut Design) -> LimResult<Self>
    where
        Self: ConstructVisitor + Sized + Named,
    {
        let mut visitor = Self::from(&*design)?;
        visitor.do_pass(design)?;
        Ok(visitor)
    }

    /// Executed before the traversal begins.
    fn start_design(&mut self, _design: &mut Design) -> VisResult {
        Ok(Action::Continue)
    }

    /// Executed after the traversal ends.
    fn finish_design(&mut self, _design: &mut Design) -> VisResult {
        Ok(Action::Continue)
    }

    /// Executed by every `start_*` and leaf hook that is not overridden.
    fn unhandled(&mut self, _comp: CompIdx, _design: &mut Design) -> VisResult {
        Ok(Action::Continue)
    }

    // ========================= Modules ============================

    /// Executed before visiting the children of a block.
    fn start_block(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    /// Executed after visiting the children of a block.
    fn finish_block(&mut self, _comp: CompIdx, _design: &mut Design) -> VisResult {
        Ok(Action::Continue)
    }

    /// Executed before visiting the cases of a switch.
    fn start_switch(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    fn finish_switch(
        &mut self,
        _comp: CompIdx,
        _design: &mut Design,
    ) -> VisResult {
        Ok(Action::Continue)
    }

    /// Executed before visiting the init block, body and registers of a loop.
    fn start_loop(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    fn finish_loop(&mut self, _comp: CompIdx, _design: &mut Design) -> VisResult {
        Ok(Action::Continue)
    }

    /// Executed before visiting the children of a while, until or for body.
    fn start_loop_body(
        &mut self,
        comp: CompIdx,
        design: &mut Design,
    ) -> VisResult {
        self.unhandled(comp, design)
    }

    fn finish_loop_body(
        &mut self,
        _comp: CompIdx,
        _design: &mut Design,
    ) -> VisResult {
        Ok(Action::Continue)
    }

    fn start_branch(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    fn finish_branch(
        &mut self,
        _comp: CompIdx,
        _design: &mut Design,
    ) -> VisResult {
        Ok(Action::Continue)
    }

    fn start_decision(
        &mut self,
        comp: CompIdx,
        design: &mut Design,
    ) -> VisResult {
        self.unhandled(comp, design)
    }

    fn finish_decision(
        &mut self,
        _comp: CompIdx,
        _design: &mut Design,
    ) -> VisResult {
        Ok(Action::Continue)
    }

    fn start_latch(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    fn finish_latch(&mut self, _comp: CompIdx, _design: &mut Design) -> VisResult {
        Ok(Action::Continue)
    }

    // ========================= Leaves ============================

    fn constant(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    /// Executed at an operator. Gates have their own hook.
    fn op(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    fn gate(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    fn reg(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    fn mux(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    fn noop(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    fn call(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    fn in_buf(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    fn out_buf(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }

    fn referee(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        self.unhandled(comp, design)
    }
}

/// The top level components of `design`: procedure bodies and other
/// components without an owner, followed by the call of every task.
pub fn design_roots(design: &Design, order: Order) -> Vec<CompIdx> {
    let mut roots = design.roots();
    roots.extend(design.tasks().iter().map(|t| t.call));
    match order {
        Order::Scanner => roots,
        Order::DataFlow => order::data_flow(design, &roots),
        Order::ReverseDataFlow => {
            let mut roots = order::data_flow(design, &roots);
            roots.reverse();
            roots
        }
    }
}

/// Describes types that can be visited by things implementing [Visitor].
/// This performs a recursive walk of the component hierarchy.
///
/// It calls `Visitor::start_*` on the way down, and `Visitor::finish_*` on
/// the way up.
pub trait Visitable {
    /// Perform the traversal.
    fn visit(
        &self,
        visitor: &mut dyn Visitor,
        design: &mut Design,
        order: Order,
    ) -> VisResult;
}

/// Visit the children of `module`. Children removed or moved out of the
/// module while the traversal runs are skipped.
fn visit_children(
    module: CompIdx,
    visitor: &mut dyn Visitor,
    design: &mut Design,
    order: Order,
) -> VisResult {
    for child in order::module_children(design, module, order) {
        let present = design
            .find_comp(child)
            .is_some_and(|c| c.owner() == Some(module));
        if !present {
            continue;
        }
        if child.visit(visitor, design, order)? == Action::Stop {
            return Ok(Action::Stop);
        }
    }
    Ok(Action::Continue)
}

impl Visitable for CompIdx {
    fn visit(
        &self,
        visitor: &mut dyn Visitor,
        design: &mut Design,
        order: Order,
    ) -> VisResult {
        let comp = *self;
        // A hook may have removed the component already.
        let Some(kind) = design.find_comp(comp).map(|c| c.node_kind()) else {
            return Ok(Action::Continue);
        };
        let res = match kind {
            NodeKind::Constant => visitor.constant(comp, design)?,
            NodeKind::Op(_) => visitor.op(comp, design)?,
            NodeKind::Gate(_) => visitor.gate(comp, design)?,
            NodeKind::Reg => visitor.reg(comp, design)?,
            NodeKind::Mux => visitor.mux(comp, design)?,
            NodeKind::NoOp => visitor.noop(comp, design)?,
            NodeKind::Call => visitor.call(comp, design)?,
            NodeKind::InBuf => visitor.in_buf(comp, design)?,
            NodeKind::OutBuf => visitor.out_buf(comp, design)?,
            NodeKind::Referee => visitor.referee(comp, design)?,
            NodeKind::Block => visitor
                .start_block(comp, design)?
                .and_then(|| visit_children(comp, visitor, design, order))?
                .pop()
                .and_then(|| visitor.finish_block(comp, design))?,
            NodeKind::Switch => visitor
                .start_switch(comp, design)?
                .and_then(|| visit_children(comp, visitor, design, order))?
                .pop()
                .and_then(|| visitor.finish_switch(comp, design))?,
            NodeKind::Loop => visitor
                .start_loop(comp, design)?
                .and_then(|| visit_children(comp, visitor, design, order))?
                .pop()
                .and_then(|| visitor.finish_loop(comp, design))?,
            NodeKind::LoopBody(_) => visitor
                .start_loop_body(comp, design)?
                .and_then(|| visit_children(comp, visitor, design, order))?
                .pop()
                .and_then(|| visitor.finish_loop_body(comp, design))?,
            NodeKind::Branch => visitor
                .start_branch(comp, design)?
                .and_then(|| visit_children(comp, visitor, design, order))?
                .pop()
                .and_then(|| visitor.finish_branch(comp, design))?,
            NodeKind::Decision => visitor
                .start_decision(comp, design)?
                .and_then(|| visit_children(comp, visitor, design, order))?
                .pop()
                .and_then(|| visitor.finish_decision(comp, design))?,
            NodeKind::Latch => visitor
                .start_latch(comp, design)?
                .and_then(|| visit_children(comp, visitor, design, order))?
                .pop()
                .and_then(|| visitor.finish_latch(comp, design))?,
        };
        Ok(res)
    }
}

/// Blanket implementation for Vectors of Visitables
impl<V: Visitable> Visitable for Vec<V> {
    fn visit(
        &self,
        visitor: &mut dyn Visitor,
        design: &mut Design,
        order: Order,
    ) -> VisResult {
        for t in self {
            match t.visit(visitor, design, order)? {
                Action::Continue | Action::SkipChildren => continue,
                Action::Stop => return Ok(Action::Stop),
            }
        }
        Ok(Action::Continue)
    }
}
