use crate::traversal::{Action, Named, VisResult, Visitor};
use lim_ir::{CompIdx, ComponentKind, Design, ModuleShape};
use lim_utils::LimResult;

/// Warn if dead component removal loops more than this number of times
const LOOP_THRESHOLD: u64 = 5;

/// Removes constants, operators and gates from blocks when nothing reads
/// their results.
#[derive(Default)]
pub struct DeadComponentRemoval {
    /// Components that may be removable.
    candidates: Vec<CompIdx>,
    removed: usize,
}

impl Named for DeadComponentRemoval {
    fn name() -> &'static str {
        "dead-component-removal"
    }

    fn description() -> &'static str {
        "removes operators and constants whose results are never used"
    }
}

impl DeadComponentRemoval {
    /// True if `comp` computes a value nothing consumes and can be dropped
    /// without changing the control flow of its block.
    fn is_dead(design: &Design, comp: CompIdx) -> bool {
        let Some(c) = design.find_comp(comp) else {
            return false;
        };
        if c.non_removable
            || !matches!(
                c.kind,
                ComponentKind::Constant(_)
                    | ComponentKind::Op(_)
                    | ComponentKind::Gate(_)
            )
        {
            return false;
        }
        let in_block = c.owner().is_some_and(|m| {
            matches!(
                design.module(m).shape,
                ModuleShape::Block(_) | ModuleShape::Switch(_)
            )
        });
        in_block
            && c.exits().all(|(_, exit)| {
                design.exit(exit).data_buses().iter().all(|b| {
                    let bus = design.bus(*b);
                    !bus.used
                        && bus.peer().is_none()
                        && bus.ports().is_empty()
                        && bus.logical_dependents().is_empty()
                })
            })
    }

    /// Remove `comp`, handing the entries its exits drove to the exit that
    /// drove it.
    fn remove(design: &mut Design, comp: CompIdx) -> LimResult<()> {
        let upstream = design
            .comp(comp)
            .entries()
            .first()
            .and_then(|e| design.entry(*e).driving_exit());
        let exits: Vec<_> = design.comp(comp).exits().map(|(_, e)| e).collect();
        for exit in exits {
            for entry in design.exit(exit).drivens().to_vec() {
                design.set_driving_exit(entry, upstream);
            }
        }
        let Some(owner) = design.comp(comp).owner() else {
            return Ok(());
        };
        log::debug!("`{}' is unused", design.describe(comp));
        design.remove_component(owner, comp)
    }
}

impl Visitor for DeadComponentRemoval {
    fn constant(&mut self, comp: CompIdx, _design: &mut Design) -> VisResult {
        self.candidates.push(comp);
        Ok(Action::Continue)
    }

    fn op(&mut self, comp: CompIdx, _design: &mut Design) -> VisResult {
        self.candidates.push(comp);
        Ok(Action::Continue)
    }

    fn gate(&mut self, comp: CompIdx, _design: &mut Design) -> VisResult {
        self.candidates.push(comp);
        Ok(Action::Continue)
    }

    fn finish_design(&mut self, design: &mut Design) -> VisResult {
        // Removing a component can make the components feeding it dead.
        let mut count = 0;
        loop {
            let dead: Vec<CompIdx> = self
                .candidates
                .iter()
                .copied()
                .filter(|c| Self::is_dead(design, *c))
                .collect();
            if dead.is_empty() {
                break;
            }
            for comp in &dead {
                Self::remove(design, *comp)?;
            }
            self.removed += dead.len();
            self.candidates.retain(|c| !dead.contains(c));
            count += 1;
            if count == LOOP_THRESHOLD {
                log::warn!(
                    "{} looped more than {count} times",
                    Self::name()
                );
            }
        }
        log::info!("{}: removed {} components", Self::name(), self.removed);
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::DeadComponentRemoval;
    use crate::traversal::Visitor;
    use lim_ir::{DepKind, Design, ExitTag, OpKind};

    #[test]
    fn unused_chains_are_removed() {
        let mut design = Design::new("test");
        let a = design.make_constant("a", 1, 4, false).unwrap();
        let b = design.make_constant("b", 2, 4, false).unwrap();
        let add = design.make_op("add", OpKind::Add, 4, false).unwrap();
        let kept = design.make_constant("kept", 7, 4, false).unwrap();
        design.comp_mut(kept).non_removable = true;
        let block = design.make_block("blk", vec![a, b, add, kept]).unwrap();
        let entry = design.comp(add).entries()[0];
        for (i, src) in [a, b].into_iter().enumerate() {
            let port = design.comp(add).data_ports()[i];
            let bus = design.result_bus(src).unwrap();
            design.add_dependency(entry, port, bus, DepKind::Data).unwrap();
        }

        let pass = DeadComponentRemoval::do_pass_default(&mut design).unwrap();
        assert_eq!(pass.removed, 3);
        for c in [a, b, add] {
            assert!(design.find_comp(c).is_none());
        }
        assert_eq!(design.module(block).sequence(), Some(&[kept][..]));
        // `kept` is now entered straight from the InBuf.
        let in_exit = design.main_exit(design.in_buf(block));
        let entry = design.comp(kept).entries()[0];
        assert_eq!(design.entry(entry).driving_exit(), Some(in_exit));
    }

    #[test]
    fn used_results_stay() {
        let mut design = Design::new("test");
        let a = design.make_constant("a", 1, 4, false).unwrap();
        let body = design.make_procedure_body("body", vec![a]).unwrap();
        let ret = design.exit_of(body, ExitTag::RETURN).unwrap();
        let bus = design.make_data_bus(ret);
        let out_buf = design.out_buf(ret).unwrap();
        let port = design.bus(bus).peer().unwrap();
        let entry = design.comp(out_buf).entries()[0];
        let src = design.result_bus(a).unwrap();
        design.add_dependency(entry, port, src, DepKind::Data).unwrap();

        let pass = DeadComponentRemoval::do_pass_default(&mut design).unwrap();
        assert_eq!(pass.removed, 0);
        assert!(design.find_comp(a).is_some());
    }
}
