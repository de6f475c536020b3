use crate::traversal::{FilteredVisitor, Named};
use lim_ir::{CompIdx, Design, ExitTag, Id, Latency};
use lim_utils::LimResult;

/// Logs the latency of every exit of every component outside of the module
/// boundaries.
#[derive(Default)]
pub struct LatencySummary {
    exits: Vec<(Id, ExitTag, Latency)>,
}

impl LatencySummary {
    /// Every exit seen, in traversal order.
    pub fn exits(&self) -> &[(Id, ExitTag, Latency)] {
        &self.exits
    }
}

impl Named for LatencySummary {
    fn name() -> &'static str {
        "latency-summary"
    }

    fn description() -> &'static str {
        "log the latency of every exit"
    }
}

impl FilteredVisitor for LatencySummary {
    fn pre_filter(&mut self, comp: CompIdx, design: &Design) -> bool {
        !design.comp(comp).node_kind().is_buffer()
    }

    fn any(&mut self, comp: CompIdx, design: &mut Design) -> LimResult<()> {
        let c = design.comp(comp);
        for (tag, exit) in c.exits() {
            let latency = design.exit(exit).latency.clone();
            log::info!("{}.{tag}: {latency}", c.name);
            self.exits.push((c.name, tag, latency));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::LatencySummary;
    use crate::traversal::{Filtered, Visitor};
    use lim_ir::{Design, ExitTag, Latency};

    #[test]
    fn registers_take_a_clock() {
        let mut design = Design::new("test");
        let c = design.make_constant("c", 1, 4, false).unwrap();
        let r = design.make_reg("r", 4, false).unwrap();
        design.make_block("blk", vec![c, r]).unwrap();

        let summary = Filtered::<LatencySummary>::do_pass_default(&mut design)
            .unwrap()
            .into_inner();
        let find = |name: &str| {
            summary
                .exits()
                .iter()
                .find(|(n, tag, _)| *n == name && *tag == ExitTag::DONE)
                .map(|(_, _, l)| l.clone())
        };
        assert_eq!(find("c"), Some(Latency::ZERO));
        assert_eq!(find("r"), Some(Latency::ONE));
        assert!(find("blk").is_some());
        assert!(find("blk_inbuf").is_none());
    }
}
