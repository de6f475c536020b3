//! Driver for the LIM compiler.
use crate::cmdline::Opts;
use lim_ir::{Printer, from_json};
use lim_opt::pass_manager::PassManager;
use lim_utils::{Error, LimResult};
use std::io::Write;

/// Run the compiler from the command line.
pub fn run_compiler() -> LimResult<()> {
    let opts = Opts::get_opts();

    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(opts.log_level)
        .target(env_logger::Target::Stderr)
        .init();

    let pm = PassManager::default_passes()?;

    // list all the available passes when --list-passes is given
    if opts.list_passes {
        println!("{}", pm.complete_help());
        return Ok(());
    }

    let Some(file) = &opts.file else {
        return Err(Error::misc("no input design given"));
    };
    let mut design = from_json::design_from_file(file)?;
    // Extra options for the passes
    design.extra_opts = opts.extra_opts.clone();

    pm.execute_plan(
        &mut design,
        &opts.passes(),
        &opts.disable_pass,
        opts.dump_ir,
    )?;

    let mut out = opts.output.get_write()?;
    Printer::write_design(&design, &mut out)?;
    out.flush()?;
    Ok(())
}
