//! Runs passes end to end over designs read from JSON.
use lim_ir::{CompIdx, Design, ExitTag, from_json::design_from_str};
use lim_opt::pass_manager::PassManager;
use lim_opt::passes::{Propagate, WellFormed};
use lim_opt::traversal::{Named, VisResult, Visitor, fail_unhandled};
use lim_utils::Error;

const CONST_SUM: &str = r#"{
    "name": "main",
    "procedures": [{
        "name": "f",
        "body": [
            { "name": "three", "kind": "const", "value": 3, "width": 8, "signed": true },
            { "name": "five", "kind": "const", "value": 5, "width": 8, "signed": true },
            { "name": "unused", "kind": "const", "value": 9, "width": 8 },
            { "name": "sum", "kind": "add", "width": 8, "signed": true, "args": ["three", "five"] }
        ],
        "result": "sum"
    }],
    "tasks": [{ "procedure": "f" }]
}"#;

fn body(design: &Design) -> CompIdx {
    design.procedure(design.procedures()[0]).body()
}

fn child(design: &Design, name: &str) -> Option<CompIdx> {
    design
        .module(body(design))
        .components()
        .iter()
        .copied()
        .find(|c| design.comp(*c).name == name)
}

#[test]
fn constant_operands_fold() {
    let mut design = design_from_str(CONST_SUM).unwrap();
    Propagate::do_pass_default(&mut design).unwrap();
    let sum = child(&design, "sum").unwrap();
    let bus = design.result_bus(sum).unwrap();
    let value = design.bus(bus).value().unwrap();
    assert!(value.is_constant());
    assert_eq!(value.as_i64(), Some(8));
}

#[test]
fn full_pipeline_drops_unused_constants() {
    let mut design = design_from_str(CONST_SUM).unwrap();
    let pm = PassManager::default_passes().unwrap();
    pm.execute_plan(&mut design, &["all".to_string()], &[], false)
        .unwrap();
    assert!(child(&design, "unused").is_none());
    // Feeds the procedure result.
    assert!(child(&design, "sum").is_some());
    WellFormed::do_pass_default(&mut design).unwrap();
}

#[test]
fn extra_options_reach_passes() {
    let mut design = design_from_str(CONST_SUM).unwrap();
    design.extra_opts = vec!["propagate:max-rounds=1".to_string()];
    let pass = Propagate::do_pass_default(&mut design).unwrap();
    assert_eq!(pass.rounds(), 1);
}

#[test]
fn out_buf_tracks_exit_buses() {
    let mut design = design_from_str(CONST_SUM).unwrap();
    let body = body(&design);
    let ret = design.exit_of(body, ExitTag::RETURN).unwrap();
    design.make_data_bus(ret);
    design.make_data_bus(ret);
    let out_buf = design.out_buf(ret).unwrap();
    assert_eq!(design.exit(ret).data_buses().len(), 3);
    assert_eq!(design.comp(out_buf).data_ports().len(), 3);
    WellFormed::do_pass_default(&mut design).unwrap();
}

/// Handles blocks and procedure bodies only.
#[derive(Default)]
struct ModulesOnly;

impl Named for ModulesOnly {
    fn name() -> &'static str {
        "modules-only"
    }

    fn description() -> &'static str {
        "rejects anything but modules"
    }
}

impl Visitor for ModulesOnly {
    fn start_block(&mut self, _: CompIdx, _: &mut Design) -> VisResult {
        Ok(lim_opt::traversal::Action::Continue)
    }

    fn unhandled(&mut self, comp: CompIdx, design: &mut Design) -> VisResult {
        fail_unhandled::<Self>(comp, design)
    }
}

#[test]
fn strict_passes_name_the_node() {
    let mut design = Design::new("test");
    let c = design.make_constant("c", 1, 4, false).unwrap();
    design.make_block("blk", vec![c]).unwrap();
    let Err(Error::UnexpectedNode { pass, node }) =
        ModulesOnly::do_pass_default(&mut design)
    else {
        panic!("expected the traversal to fail")
    };
    assert_eq!(pass, "modules-only");
    // The InBuf is the first child visited.
    assert!(node.contains("blk"), "{node}");
}
