//! Ready made behaviours for the hooks a pass does not override.
//!
//! A plain [Visitor] walks the whole design transparently. A pass that should
//! not look below the roots it is handed returns [skip_unhandled] from
//! [Visitor::unhandled], and a pass that must handle every node explicitly
//! returns [fail_unhandled]. Passes that treat whole categories of components
//! alike implement [FilteredVisitor] and run as [Filtered].
use super::{Action, Named, VisResult, Visitor};
use lim_ir::{CompIdx, Design, NodeKind};
use lim_utils::{Error, LimResult};

/// Do not descend into anything the pass does not handle.
pub fn skip_unhandled() -> VisResult {
    Ok(Action::SkipChildren)
}

/// Abort the traversal: pass `P` reached a node it has no hook for.
pub fn fail_unhandled<P: Named>(comp: CompIdx, design: &Design) -> VisResult {
    Err(Error::unexpected_node(P::name(), design.describe(comp)))
}

/// Hooks that treat components by category instead of by kind.
///
/// Every component first goes through [FilteredVisitor::pre_filter]; the
/// ones it accepts go to [FilteredVisitor::filter], which by default hands
/// them to the hook of their category. Every category hook defaults to
/// [FilteredVisitor::any].
pub trait FilteredVisitor {
    /// Returning false skips `comp` and, for a module, everything in it.
    fn pre_filter(&mut self, _comp: CompIdx, _design: &Design) -> bool {
        true
    }

    /// Whether to visit the children of `module` once it has been filtered.
    fn traverse(&mut self, _module: CompIdx, _design: &Design) -> bool {
        true
    }

    fn filter(&mut self, comp: CompIdx, design: &mut Design) -> LimResult<()> {
        match design.comp(comp).node_kind() {
            NodeKind::Constant | NodeKind::Op(_) | NodeKind::Gate(_) => {
                self.operation(comp, design)
            }
            NodeKind::Call => self.call(comp, design),
            kind if kind.is_module() => self.module(comp, design),
            _ => self.primitive(comp, design),
        }
    }

    /// Constants, operators and gates.
    fn operation(&mut self, comp: CompIdx, design: &mut Design) -> LimResult<()> {
        self.any(comp, design)
    }

    /// Registers, multiplexers, no-ops, referees and module boundary buffers.
    fn primitive(&mut self, comp: CompIdx, design: &mut Design) -> LimResult<()> {
        self.any(comp, design)
    }

    fn module(&mut self, comp: CompIdx, design: &mut Design) -> LimResult<()> {
        self.any(comp, design)
    }

    fn call(&mut self, comp: CompIdx, design: &mut Design) -> LimResult<()> {
        self.any(comp, design)
    }

    fn any(&mut self, _comp: CompIdx, _design: &mut Design) -> LimResult<()> {
        Ok(())
    }
}

/// Runs a [FilteredVisitor] as a [Visitor].
#[derive(Default)]
pub struct Filtered<F>(pub F);

impl<F> Filtered<F> {
    pub fn into_inner(self) -> F {
        self.0
    }
}

impl<F: Named> Named for Filtered<F> {
    fn name() -> &'static str {
        F::name()
    }

    fn description() -> &'static str {
        F::description()
    }

    fn opts() -> Vec<super::PassOpt> {
        F::opts()
    }
}

impl<F: FilteredVisitor> Visitor for Filtered<F> {
    fn unhandled(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        if !self.0.pre_filter(comp, design) {
            return Ok(Action::SkipChildren);
        }
        self.0.filter(comp, design)?;
        let Some(c) = design.find_comp(comp) else {
            return Ok(Action::SkipChildren);
        };
        if c.is_module() && !self.0.traverse(comp, design) {
            Ok(Action::SkipChildren)
        } else {
            Ok(Action::Continue)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::Visitor;
    use lim_ir::{Id, OpKind, Resource};

    #[derive(Default)]
    struct Census {
        operations: usize,
        primitives: usize,
        modules: usize,
    }

    impl Named for Census {
        fn name() -> &'static str {
            "census"
        }

        fn description() -> &'static str {
            "counts components by category"
        }
    }

    impl FilteredVisitor for Census {
        fn operation(&mut self, _: CompIdx, _: &mut Design) -> LimResult<()> {
            self.operations += 1;
            Ok(())
        }

        fn primitive(&mut self, _: CompIdx, _: &mut Design) -> LimResult<()> {
            self.primitives += 1;
            Ok(())
        }

        fn module(&mut self, _: CompIdx, _: &mut Design) -> LimResult<()> {
            self.modules += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RootsOnly {
        seen: Vec<CompIdx>,
    }

    impl Named for RootsOnly {
        fn name() -> &'static str {
            "roots-only"
        }

        fn description() -> &'static str {
            "records the roots"
        }
    }

    impl Visitor for RootsOnly {
        fn unhandled(&mut self, comp: CompIdx, _: &mut Design) -> VisResult {
            self.seen.push(comp);
            skip_unhandled()
        }
    }

    fn sample() -> (Design, CompIdx) {
        let mut design = Design::new("test");
        let c = design.make_constant("c", 1, 4, false).unwrap();
        let add = design.make_op("add", OpKind::Add, 4, false).unwrap();
        let reg = design.make_reg("r", 4, false).unwrap();
        let block = design.make_block("blk", vec![c, add, reg]).unwrap();
        (design, block)
    }

    #[test]
    fn filtered_hooks_see_categories() {
        let (mut design, _) = sample();
        let census = Filtered::<Census>::do_pass_default(&mut design)
            .unwrap()
            .into_inner();
        assert_eq!(census.operations, 2);
        // The register and both boundary buffers.
        assert_eq!(census.primitives, 3);
        assert_eq!(census.modules, 1);
    }

    #[test]
    fn referees_are_primitives() {
        let mut design = Design::new("test");
        let pin = Resource::Pin {
            name: Id::new("led"),
            width: 1,
        };
        let referee = design.make_referee("led_referee", pin).unwrap();
        design.make_block("blk", vec![referee]).unwrap();
        let census = Filtered::<Census>::do_pass_default(&mut design)
            .unwrap()
            .into_inner();
        assert_eq!(census.primitives, 3);
        assert_eq!(census.modules, 1);
    }

    #[test]
    fn skipping_stays_at_the_roots() {
        let (mut design, block) = sample();
        let pass = RootsOnly::do_pass_default(&mut design).unwrap();
        assert_eq!(pass.seen, vec![block]);
    }
}
