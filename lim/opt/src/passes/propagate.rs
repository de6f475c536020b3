use super::{BackwardPropagate, ForwardPropagate};
use crate::traversal::{
    Action, ConstructVisitor, Named, ParseVal, PassOpt, VisResult, Visitor,
};
use lim_ir::Design;
use lim_utils::LimResult;

const DEFAULT_MAX_ROUNDS: u64 = 64;

/// Alternates forward and backward propagation until neither changes the
/// design or the round limit is reached.
pub struct Propagate {
    max_rounds: u64,
    backward: bool,
    /// Rounds run by the last traversal.
    rounds: u64,
}

impl Propagate {
    pub fn rounds(&self) -> u64 {
        self.rounds
    }
}

impl Named for Propagate {
    fn name() -> &'static str {
        "propagate"
    }

    fn description() -> &'static str {
        "run value propagation to a fixed point"
    }

    fn opts() -> Vec<PassOpt> {
        vec![
            PassOpt::new(
                "max-rounds",
                "give up after this many rounds",
                ParseVal::Num(DEFAULT_MAX_ROUNDS as i64),
                PassOpt::parse_num,
            ),
            PassOpt::new(
                "backward",
                "also propagate don't-care bits backward",
                ParseVal::Bool(true),
                PassOpt::parse_bool,
            ),
        ]
    }
}

impl ConstructVisitor for Propagate {
    fn from(design: &Design) -> LimResult<Self> {
        let opts = Self::get_opts(design);
        let max_rounds = match opts["max-rounds"].pos_num() {
            Some(0) | None => {
                log::warn!(
                    "{}: max-rounds must be positive, using {DEFAULT_MAX_ROUNDS}",
                    Self::name()
                );
                DEFAULT_MAX_ROUNDS
            }
            Some(n) => n,
        };
        Ok(Propagate {
            max_rounds,
            backward: opts["backward"].bool(),
            rounds: 0,
        })
    }

    fn clear_data(&mut self) {
        self.rounds = 0;
    }
}

impl Visitor for Propagate {
    fn start_design(&mut self, design: &mut Design) -> VisResult {
        self.clear_data();
        loop {
            self.rounds += 1;
            let mut forward = ForwardPropagate::default();
            forward.do_pass(design)?;
            let mut modified = forward.modified();
            if self.backward {
                let mut backward = BackwardPropagate::default();
                backward.do_pass(design)?;
                modified |= backward.modified();
            }
            if !modified {
                log::info!("propagation converged after {} rounds", self.rounds);
                break;
            }
            if self.rounds >= self.max_rounds {
                log::warn!(
                    "propagation stopped after {} rounds without converging",
                    self.rounds
                );
                break;
            }
        }
        // The rounds above already walked the whole design.
        Ok(Action::Stop)
    }
}
