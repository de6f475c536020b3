//! Command line parsing for the LIM compiler.
use argh::FromArgs;
use lim_utils::OutputFile;
use std::path::PathBuf;

#[derive(FromArgs, Debug)]
#[argh(help_triggers("-h", "--help"))]
/// The LIM compiler
pub struct Opts {
    /// input design in JSON
    #[argh(positional)]
    pub file: Option<PathBuf>,

    /// output file, default is stdout
    #[argh(
        option,
        short = 'o',
        long = "output",
        default = "OutputFile::Stdout"
    )]
    pub output: OutputFile,

    /// passes or aliases to run, in order (default: all)
    #[argh(option, short = 'p', long = "pass")]
    pass: Vec<String>,

    /// passes or aliases to skip
    #[argh(option, short = 'd', long = "disable-pass")]
    pub disable_pass: Vec<String>,

    /// extra options passed to the passes, written as `pass:opt[=value]`
    #[argh(option, short = 'x', long = "extra-opt")]
    pub extra_opts: Vec<String>,

    /// list all the registered passes and aliases
    #[argh(switch, long = "list-passes")]
    pub list_passes: bool,

    /// print the design after every pass
    #[argh(switch, long = "dump-ir")]
    pub dump_ir: bool,

    /// logging level
    #[argh(option, long = "log-level", default = "log::LevelFilter::Warn")]
    pub log_level: log::LevelFilter,
}

impl Opts {
    /// Parse the options from the process arguments.
    pub fn get_opts() -> Self {
        argh::from_env()
    }

    /// The pipeline to run.
    pub fn passes(&self) -> Vec<String> {
        if self.pass.is_empty() {
            vec!["all".to_string()]
        } else {
            self.pass.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Opts;
    use argh::FromArgs;
    use lim_utils::OutputFile;

    #[test]
    fn defaults_run_everything() {
        let opts = Opts::from_args(&["lim"], &["design.json"]).unwrap();
        assert_eq!(opts.passes(), vec!["all".to_string()]);
        assert_eq!(opts.output, OutputFile::Stdout);
        assert_eq!(opts.log_level, log::LevelFilter::Warn);
        assert!(!opts.dump_ir);
    }

    #[test]
    fn repeated_options_accumulate() {
        let opts = Opts::from_args(
            &["lim"],
            &[
                "design.json",
                "-p",
                "propagate",
                "-p",
                "well-formed",
                "-x",
                "propagate:max-rounds=4",
                "-o",
                "<null>",
                "--log-level",
                "debug",
            ],
        )
        .unwrap();
        assert_eq!(opts.passes(), vec!["propagate", "well-formed"]);
        assert_eq!(opts.extra_opts, vec!["propagate:max-rounds=4"]);
        assert_eq!(opts.output, OutputFile::Null);
        assert_eq!(opts.log_level, log::LevelFilter::Debug);
    }
}
