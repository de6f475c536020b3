use crate::Id;
use std::collections::{HashMap, HashSet};

/// HashMap-based name generator that hands out unique names per prefix.
#[derive(Clone, Debug, Default)]
pub struct NameGenerator {
    name_hash: HashMap<Id, i64>,
    generated_names: HashSet<Id>,
}

impl NameGenerator {
    /// Create a NameGenerator that will never produce any of `names`.
    pub fn with_prev_defined_names(names: HashSet<Id>) -> Self {
        NameGenerator {
            generated_names: names,
            name_hash: HashMap::default(),
        }
    }

    /// Reserve additional names.
    pub fn add_names(&mut self, names: HashSet<Id>) {
        self.generated_names.extend(names)
    }

    /// Returns a new name that starts with `prefix`.
    /// The first request for a prefix returns the prefix itself, later ones
    /// append a counter:
    /// ```
    /// # use lim_utils::NameGenerator;
    /// let mut namegen = NameGenerator::default();
    /// assert_eq!(namegen.gen_name("add"), "add");
    /// assert_eq!(namegen.gen_name("add"), "add0");
    /// ```
    pub fn gen_name<S>(&mut self, prefix: S) -> Id
    where
        S: Into<Id>,
    {
        let mut cur_prefix: Id = prefix.into();
        loop {
            let count = self
                .name_hash
                .entry(cur_prefix)
                .and_modify(|v| *v += 1)
                .or_insert(-1);

            let name = if *count == -1 {
                cur_prefix
            } else {
                Id::from(cur_prefix.to_string() + &count.to_string())
            };

            if !self.generated_names.contains(&name) {
                self.generated_names.insert(name);
                return name;
            }

            // Collided with a reserved name; extend the prefix and retry.
            cur_prefix = name;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_reserved_names() {
        let mut namegen =
            NameGenerator::with_prev_defined_names(HashSet::from([
                Id::new("reg"),
            ]));
        assert_eq!(namegen.gen_name("reg"), "reg0");
        assert_eq!(namegen.gen_name("reg"), "reg1");
        assert_eq!(namegen.gen_name("mux"), "mux");
    }
}
