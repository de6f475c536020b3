use super::Visitor;
use itertools::Itertools;
use lim_ir::Design;
use lim_utils::LimResult;
use linked_hash_map::LinkedHashMap;

#[derive(Clone, Debug, PartialEq)]
/// The value returned from parsing an option.
pub enum ParseVal {
    /// A boolean option.
    Bool(bool),
    /// A number option.
    Num(i64),
    /// A list of values.
    List(Vec<ParseVal>),
}

impl ParseVal {
    pub fn bool(&self) -> bool {
        let ParseVal::Bool(b) = self else {
            panic!("Expected bool, got {self}");
        };
        *b
    }

    pub fn num(&self) -> i64 {
        let ParseVal::Num(n) = self else {
            panic!("Expected number, got {self}");
        };
        *n
    }

    pub fn pos_num(&self) -> Option<u64> {
        let n = self.num();
        if n < 0 { None } else { Some(n as u64) }
    }

    pub fn num_list(&self) -> Vec<i64> {
        match self {
            ParseVal::List(l) => l.iter().map(ParseVal::num).collect(),
            _ => panic!("Expected list of numbers, got {self}"),
        }
    }
}

impl std::fmt::Display for ParseVal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseVal::Bool(b) => write!(f, "{b}"),
            ParseVal::Num(n) => write!(f, "{n}"),
            ParseVal::List(l) => write!(f, "[{}]", l.iter().join(", ")),
        }
    }
}

/// Option that can be passed to a pass.
pub struct PassOpt {
    name: &'static str,
    description: &'static str,
    default: ParseVal,
    parse: fn(&str) -> Option<ParseVal>,
}

impl PassOpt {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        default: ParseVal,
        parse: fn(&str) -> Option<ParseVal>,
    ) -> Self {
        Self {
            name,
            description,
            default,
            parse,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn description(&self) -> &'static str {
        self.description
    }

    pub const fn default(&self) -> &ParseVal {
        &self.default
    }

    fn parse(&self, s: &str) -> Option<ParseVal> {
        (self.parse)(s)
    }

    /// Parse of list using parser for the elements.
    /// Returns `None` if any of the elements fail to parse.
    fn parse_list(
        s: &str,
        parse: fn(&str) -> Option<ParseVal>,
    ) -> Option<ParseVal> {
        let mut res = Vec::new();
        for e in s.split(',') {
            res.push(parse(e)?);
        }
        Some(ParseVal::List(res))
    }

    pub fn parse_bool(s: &str) -> Option<ParseVal> {
        match s {
            "true" => Some(ParseVal::Bool(true)),
            "false" => Some(ParseVal::Bool(false)),
            _ => None,
        }
    }

    /// Parse a number from a string.
    pub fn parse_num(s: &str) -> Option<ParseVal> {
        s.parse::<i64>().ok().map(ParseVal::Num)
    }

    /// Parse a list of numbers from a string.
    pub fn parse_num_list(s: &str) -> Option<ParseVal> {
        Self::parse_list(s, Self::parse_num)
    }
}

/// Trait that describes named things. Calling [`do_pass`](Visitor::do_pass)
/// and [`do_pass_default`](Visitor::do_pass_default) require this to be
/// implemented.
///
/// This has to be a separate trait from [`Visitor`] because these methods
/// don't receive `self` which means that it is impossible to create dynamic
/// trait objects.
pub trait Named {
    /// The name of a pass. Is used for identifying passes.
    fn name() -> &'static str;
    /// A short description of the pass.
    fn description() -> &'static str;
    /// Set of options that can be passed to the pass.
    fn opts() -> Vec<PassOpt> {
        vec![]
    }
}

/// Trait defining method that can be used to construct a Visitor from a
/// [Design].
/// This is useful when a pass needs to read its options or inspect the
/// design *before* visiting it.
///
/// For passes that don't need to use the design, this trait can be
/// automatically be derived from [Default].
pub trait ConstructVisitor {
    fn get_opts(design: &Design) -> LinkedHashMap<&'static str, ParseVal>
    where
        Self: Named,
    {
        let opts = Self::opts();
        let n = Self::name();
        let mut values: LinkedHashMap<&'static str, ParseVal> = design
            .extra_opts
            .iter()
            .filter_map(|opt| {
                // The format is either -x pass:opt or -x pass:opt=val
                let (pass, rest) = opt.split_once(':')?;
                if pass != n {
                    return None;
                }
                let mut splits = rest.split('=');
                let opt = splits.next()?;
                let Some(opt) = opts.iter().find(|o| o.name == opt) else {
                    log::warn!("Ignoring unknown option for pass `{n}`: {opt}");
                    return None;
                };
                let val = if let Some(v) = splits.next() {
                    let Some(v) = opt.parse(v) else {
                        log::warn!(
                            "Ignoring invalid value for option `{n}:{}`: {v}",
                            opt.name(),
                        );
                        return None;
                    };
                    v
                } else {
                    ParseVal::Bool(true)
                };
                Some((opt.name(), val))
            })
            .collect();

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "Extra options for {}: {}",
                Self::name(),
                values.iter().map(|(o, v)| format!("{o}->{v}")).join(", ")
            );
        }

        // For all options that were not provided with values, fill in the
        // defaults.
        for opt in opts {
            if !values.contains_key(opt.name()) {
                values.insert(opt.name(), opt.default.clone());
            }
        }

        values
    }

    /// Construct the visitor using information from the Design.
    fn from(_design: &Design) -> LimResult<Self>
    where
        Self: Sized;

    /// Clear the data stored in the visitor.
    fn clear_data(&mut self);
}

/// Derive ConstructVisitor when [Default] is provided for a visitor.
impl<T: Default + Sized + Visitor> ConstructVisitor for T {
    fn from(_design: &Design) -> LimResult<Self> {
        Ok(T::default())
    }

    fn clear_data(&mut self) {
        *self = T::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::Visitor;

    struct WithOpts {
        rounds: i64,
        verbose: bool,
    }

    impl Named for WithOpts {
        fn name() -> &'static str {
            "with-opts"
        }

        fn description() -> &'static str {
            "test pass"
        }

        fn opts() -> Vec<PassOpt> {
            vec![
                PassOpt::new(
                    "rounds",
                    "number of rounds",
                    ParseVal::Num(3),
                    PassOpt::parse_num,
                ),
                PassOpt::new(
                    "verbose",
                    "print more",
                    ParseVal::Bool(false),
                    PassOpt::parse_bool,
                ),
            ]
        }
    }

    impl ConstructVisitor for WithOpts {
        fn from(design: &Design) -> LimResult<Self> {
            let opts = Self::get_opts(design);
            Ok(WithOpts {
                rounds: opts["rounds"].num(),
                verbose: opts["verbose"].bool(),
            })
        }

        fn clear_data(&mut self) {}
    }

    impl Visitor for WithOpts {}

    #[test]
    fn options_come_from_the_design() {
        let mut design = Design::new("test");
        let pass = <WithOpts as ConstructVisitor>::from(&design).unwrap();
        assert_eq!((pass.rounds, pass.verbose), (3, false));

        design.extra_opts = vec![
            "with-opts:rounds=10".to_string(),
            "with-opts:verbose".to_string(),
            "other:rounds=1".to_string(),
        ];
        let pass = <WithOpts as ConstructVisitor>::from(&design).unwrap();
        assert_eq!((pass.rounds, pass.verbose), (10, true));
    }

    #[test]
    fn bad_options_fall_back_to_defaults() {
        let mut design = Design::new("test");
        design.extra_opts = vec![
            "with-opts:rounds=many".to_string(),
            "with-opts:colour=red".to_string(),
        ];
        let pass = <WithOpts as ConstructVisitor>::from(&design).unwrap();
        assert_eq!(pass.rounds, 3);
        assert_eq!(
            PassOpt::parse_num_list("1,2,3").map(|v| v.num_list()),
            Some(vec![1, 2, 3])
        );
    }
}
