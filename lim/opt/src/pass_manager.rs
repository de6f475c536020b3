//! Define the PassManager structure that is used to construct and run
//! passes.
use crate::traversal;
use lim_ir::{Design, Printer};
use lim_utils::{Error, LimResult};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::time::Instant;

pub type PassResult<T> = LimResult<T>;

/// Top-level type for all passes that transform a [Design]
pub type PassClosure = Box<dyn Fn(&mut Design) -> PassResult<()>>;

/// Structure that tracks all registered passes for the compiler.
#[derive(Default)]
pub struct PassManager {
    /// All registered passes
    passes: HashMap<String, PassClosure>,
    /// Tracks alias for groups of passes that run together.
    aliases: HashMap<String, Vec<String>>,
    // Track the help information for passes
    help: HashMap<String, String>,
}

impl PassManager {
    /// Register a new pass and return an error if another pass with the
    /// same name has already been registered.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let mut pm = PassManager::default();
    /// pm.register_pass::<WellFormed>()?;
    /// ```
    pub fn register_pass<Pass>(&mut self) -> PassResult<()>
    where
        Pass:
            traversal::Visitor + traversal::ConstructVisitor + traversal::Named,
    {
        let name = Pass::name().to_string();
        if self.passes.contains_key(&name) {
            return Err(Error::misc(format!(
                "Pass with name '{name}' is already registered."
            )));
        }
        self.passes.insert(
            name.clone(),
            Box::new(|design| {
                Pass::do_pass_default(design)?;
                Ok(())
            }),
        );
        let mut help = format!("- {}: {}", name, Pass::description());
        for opt in Pass::opts() {
            let _ = write!(
                &mut help,
                "\n  * {}: {} (default: {})",
                opt.name(),
                opt.description(),
                opt.default()
            );
        }
        self.help.insert(name, help);
        Ok(())
    }

    /// Adds a new alias for groups of passes. An alias is a list of strings
    /// that represent valid pass names OR an alias.
    /// The passes and aliases are executed in the order given.
    pub fn add_alias(
        &mut self,
        name: String,
        passes: Vec<String>,
    ) -> PassResult<()> {
        if self.aliases.contains_key(&name) {
            return Err(Error::misc(format!(
                "Alias with name '{name}' already registered."
            )));
        }
        // Expand any aliases used in defining this alias.
        let mut all_passes = Vec::with_capacity(passes.len());
        for pass in passes {
            if let Some(expanded) = self.aliases.get(&pass) {
                all_passes.extend(expanded.iter().cloned());
            } else if self.passes.contains_key(&pass) {
                all_passes.push(pass);
            } else {
                return Err(Error::misc(format!(
                    "No pass or alias named: {pass}"
                )));
            }
        }
        self.aliases.insert(name, all_passes);
        Ok(())
    }

    /// Return the help string for a specific pass.
    pub fn specific_help(&self, pass: &str) -> Option<String> {
        self.help.get(pass).cloned().or_else(|| {
            self.aliases.get(pass).map(|passes| {
                let pass_str = passes
                    .iter()
                    .map(|p| format!("- {p}"))
                    .collect::<Vec<String>>()
                    .join("\n");
                format!("`{pass}' is an alias for pass pipeline:\n{pass_str}")
            })
        })
    }

    /// Return a string representation to show all available passes and
    /// aliases. Appropriate for help text.
    pub fn complete_help(&self) -> String {
        let mut ret = String::with_capacity(1000);

        let mut pass_names = self.passes.keys().collect::<Vec<_>>();
        pass_names.sort();
        ret.push_str("Passes:\n");
        for pass in pass_names {
            let _ = writeln!(ret, "{}", self.help[pass]);
        }

        let mut aliases = self.aliases.iter().collect::<Vec<_>>();
        aliases.sort_by(|kv1, kv2| kv1.0.cmp(kv2.0));
        ret.push_str("\nAliases:\n");
        for (alias, passes) in aliases {
            let _ = writeln!(ret, "- {}: {}", alias, passes.join(", "));
        }
        ret
    }

    /// Attempts to resolve the alias name. If there is no alias with this
    /// name, assumes that this is a pass instead.
    fn resolve_alias(&self, maybe_alias: &str) -> Vec<String> {
        self.aliases
            .get(maybe_alias)
            .cloned()
            .unwrap_or_else(|| vec![maybe_alias.to_string()])
    }

    /// Creates a plan using an inclusion and exclusion list which might
    /// contain aliases.
    pub fn create_plan(
        &self,
        incls: &[String],
        excls: &[String],
    ) -> PassResult<(Vec<String>, HashSet<String>)> {
        let passes = incls
            .iter()
            .flat_map(|maybe_alias| self.resolve_alias(maybe_alias))
            .collect::<Vec<_>>();

        let excl_set = excls
            .iter()
            .flat_map(|maybe_alias| self.resolve_alias(maybe_alias))
            .collect::<HashSet<String>>();

        // Validate that names of passes in incl and excl sets are known
        if let Some(pass) = passes
            .iter()
            .chain(excl_set.iter())
            .find(|pass| !self.passes.contains_key(*pass))
        {
            return Err(Error::misc(format!(
                "Unknown pass: {pass}. Run with --list-passes to view registered passes."
            )));
        }

        Ok((passes, excl_set))
    }

    /// Executes a given "plan" constructed using the incl and excl lists.
    pub fn execute_plan(
        &self,
        design: &mut Design,
        incl: &[String],
        excl: &[String],
        dump_ir: bool,
    ) -> PassResult<()> {
        let (passes, excl_set) = self.create_plan(incl, excl)?;

        for name in passes {
            if excl_set.contains(&name) {
                log::info!("{name}: Ignored");
                continue;
            }
            // Known to exist because create_plan validates the names.
            let pass = &self.passes[&name];
            let start = Instant::now();
            pass(design)?;
            if dump_ir {
                Printer::write_design(design, &mut std::io::stdout())?;
            }
            let elapsed = start.elapsed();
            if elapsed.as_secs() > 5 {
                log::warn!("{name}: {}ms", elapsed.as_millis());
            } else {
                log::info!("{name}: {}ms", elapsed.as_millis());
            }
        }

        Ok(())
    }
}

/// Simple macro to register an alias with a pass manager.
///
/// ## Example
/// ```rust,ignore
/// let mut pm = PassManager::default();
/// register_alias!(pm, "validate", [WellFormed, Propagate]);
/// ```
#[macro_export]
macro_rules! register_alias {
    (@unwrap_name $pass:ident) => {
        $pass::name().to_string()
    };

    (@unwrap_name $pass:literal) => {
        $pass.to_string()
    };

    ($manager:expr, $alias:literal, [ $($pass:tt),* $(,)? ]) => {
        $manager.add_alias($alias.to_string(), vec![
            $(register_alias!(@unwrap_name $pass)),*
        ])?;
    };
}

#[cfg(test)]
mod tests {
    use super::PassManager;
    use lim_utils::Error;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn aliases_expand_in_order() {
        let pm = PassManager::default_passes().unwrap();
        let (plan, excl) = pm
            .create_plan(&names(&["all"]), &names(&["dead-component-removal"]))
            .unwrap();
        assert_eq!(plan.first().map(String::as_str), Some("well-formed"));
        assert!(plan.iter().any(|p| p == "propagate"));
        assert!(excl.contains("dead-component-removal"));
    }

    #[test]
    fn unknown_passes_are_rejected() {
        let pm = PassManager::default_passes().unwrap();
        let res = pm.create_plan(&names(&["no-such-pass"]), &[]);
        assert!(matches!(res, Err(Error::Misc(_))));
    }

    #[test]
    fn help_lists_options() {
        let pm = PassManager::default_passes().unwrap();
        let help = pm.complete_help();
        assert!(help.contains("- propagate:"));
        assert!(help.contains("max-rounds"));
        assert!(pm.specific_help("all").unwrap().contains("alias"));
        assert!(pm.specific_help("nothing").is_none());
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut pm = PassManager::default_passes().unwrap();
        assert!(pm.register_pass::<crate::passes::WellFormed>().is_err());
    }
}
