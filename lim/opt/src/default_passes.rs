//! Defines the default passes available to [PassManager].
use crate::passes::{
    BackwardPropagate, DeadComponentRemoval, ForwardPropagate, LatencySummary,
    Propagate, WellFormed,
};
use crate::traversal::{Filtered, Named};
use crate::{pass_manager::PassManager, register_alias};
use lim_utils::LimResult;

impl PassManager {
    pub fn default_passes() -> LimResult<Self> {
        // Construct the pass manager and register all passes.
        let mut pm = PassManager::default();

        // Validation passes
        pm.register_pass::<WellFormed>()?;

        // Propagation passes
        pm.register_pass::<ForwardPropagate>()?;
        pm.register_pass::<BackwardPropagate>()?;
        pm.register_pass::<Propagate>()?;

        // Optimization passes
        pm.register_pass::<DeadComponentRemoval>()?;

        // Reporting passes
        pm.register_pass::<Filtered<LatencySummary>>()?;

        register_alias!(pm, "validate", [WellFormed]);
        register_alias!(
            pm,
            "optimize",
            [Propagate, DeadComponentRemoval, "validate"]
        );
        register_alias!(pm, "all", ["validate", "optimize", LatencySummary]);

        Ok(pm)
    }
}
