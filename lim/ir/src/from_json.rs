//! Builds a [Design] from a JSON description. A description lists
//! procedures, each a flat block of constants, operators and registers wired
//! by name, and tasks that call them.
//!
//! ```json
//! {
//!   "name": "main",
//!   "procedures": [{
//!     "name": "f",
//!     "inputs": [{ "name": "a", "width": 8, "signed": true }],
//!     "body": [
//!       { "name": "three", "kind": "const", "value": 3, "width": 8, "signed": true },
//!       { "name": "sum", "kind": "add", "width": 8, "signed": true, "args": ["a", "three"] }
//!     ],
//!     "result": "sum"
//!   }],
//!   "tasks": [{ "procedure": "f" }]
//! }
//! ```
use crate::{BusIdx, CompIdx, DepKind, Design, ExitTag, GateKind, OpKind, Value};
use ahash::AHashMap;
use lim_utils::{Error, Id, LimResult};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct DesignDesc {
    pub name: String,
    #[serde(default)]
    pub procedures: Vec<ProcedureDesc>,
    #[serde(default)]
    pub tasks: Vec<TaskDesc>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ProcedureDesc {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<InputDesc>,
    #[serde(default)]
    pub body: Vec<NodeDesc>,
    /// Component whose result the procedure returns.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub shared: bool,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct InputDesc {
    pub name: String,
    pub width: usize,
    #[serde(default)]
    pub signed: bool,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct NodeDesc {
    pub name: String,
    /// `const`, `noop`, `reg`, `cast`, `promote`, `gate-and`, `gate-or`,
    /// `gate-xor`, `gate-not` or the name of an operator.
    pub kind: String,
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub signed: bool,
    /// Value of a constant.
    #[serde(default)]
    pub value: Option<i64>,
    /// Value of a constant as bit symbols, most significant first.
    #[serde(default)]
    pub bits: Option<String>,
    /// Inputs, each the name of an input of the procedure or of an earlier
    /// component.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub keep: bool,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct TaskDesc {
    pub procedure: String,
    #[serde(default)]
    pub kickable: bool,
}

const DEFAULT_WIDTH: usize = 32;

/// Parse and build a design from JSON text.
pub fn design_from_str(src: &str) -> LimResult<Design> {
    let desc: DesignDesc = serde_json::from_str(src)?;
    build_design(&desc)
}

/// Parse and build a design from a JSON file.
pub fn design_from_file(path: &Path) -> LimResult<Design> {
    let src = std::fs::read_to_string(path)?;
    design_from_str(&src)
}

/// Build a design from its description.
pub fn build_design(desc: &DesignDesc) -> LimResult<Design> {
    let mut design = Design::new(desc.name.as_str());
    let mut procedures = AHashMap::new();
    for p in &desc.procedures {
        if procedures.contains_key(p.name.as_str()) {
            return Err(Error::malformed_structure(format!(
                "procedure {} is defined twice",
                p.name
            )));
        }
        let idx = build_procedure(&mut design, p)?;
        procedures.insert(p.name.as_str(), idx);
    }
    for task in &desc.tasks {
        let Some(idx) = procedures.get(task.procedure.as_str()) else {
            return Err(Error::unknown_reference(format!(
                "task calls undefined procedure {}",
                task.procedure
            )));
        };
        let call = design.make_call(*idx)?;
        design.add_task(call, task.kickable);
    }
    log::info!(
        "built design {} with {} components",
        design.name,
        design.component_count()
    );
    Ok(design)
}

fn build_node(design: &mut Design, node: &NodeDesc) -> LimResult<CompIdx> {
    let width = node.width.unwrap_or(DEFAULT_WIDTH);
    let prefix = node.name.as_str();
    let comp = match node.kind.as_str() {
        "const" => match (&node.bits, node.value) {
            (Some(bits), _) => {
                design.make_constant_value(prefix, Value::parse(bits, node.signed)?)?
            }
            (None, Some(v)) => {
                design.make_constant(prefix, v, width, node.signed)?
            }
            (None, None) => {
                return Err(Error::malformed_structure(format!(
                    "constant {} has no value",
                    node.name
                )));
            }
        },
        "noop" => design.make_noop(prefix)?,
        "reg" => design.make_reg(prefix, width, node.signed)?,
        "cast" => design.make_op(
            prefix,
            OpKind::Cast { size: width, signed: node.signed },
            width,
            node.signed,
        )?,
        "promote" => design.make_op(
            prefix,
            OpKind::NumericPromotion { size: width, signed: node.signed },
            width,
            node.signed,
        )?,
        "gate-and" => design.make_gate(prefix, GateKind::And, node.args.len())?,
        "gate-or" => design.make_gate(prefix, GateKind::Or, node.args.len())?,
        "gate-xor" => design.make_gate(prefix, GateKind::Xor, node.args.len())?,
        "gate-not" => design.make_gate(prefix, GateKind::Not, 1)?,
        other => match OpKind::from_name(other) {
            Some(op) => design.make_op(prefix, op, width, node.signed)?,
            None => {
                return Err(Error::malformed_structure(format!(
                    "unknown component kind `{other}` for {}",
                    node.name
                )));
            }
        },
    };
    design.comp_mut(comp).non_removable = node.keep;
    Ok(comp)
}

fn build_procedure(
    design: &mut Design,
    desc: &ProcedureDesc,
) -> LimResult<crate::ProcIdx> {
    let mut comps = Vec::with_capacity(desc.body.len());
    let mut names: AHashMap<&str, CompIdx> = AHashMap::new();
    for node in &desc.body {
        if names.contains_key(node.name.as_str()) {
            return Err(Error::malformed_structure(format!(
                "{} is defined twice in procedure {}",
                node.name, desc.name
            )));
        }
        let comp = build_node(design, node)?;
        names.insert(node.name.as_str(), comp);
        comps.push(comp);
    }
    let body = design.make_procedure_body(&format!("{}_body", desc.name), comps)?;

    // Inputs continue inside the body as data buses of its InBuf.
    let mut sources: AHashMap<&str, BusIdx> = AHashMap::new();
    for input in &desc.inputs {
        let port = design.make_data_port(body);
        design.port_mut(port).name = Id::new(&input.name);
        design.set_port_size(port, input.width, input.signed)?;
        let Some(bus) = design.port(port).peer() else {
            unreachable!("module data ports have a peer")
        };
        sources.insert(input.name.as_str(), bus);
    }
    for (name, comp) in &names {
        if let Some(bus) = design.result_bus(*comp) {
            sources.insert(*name, bus);
        }
    }

    let lookup = |name: &str| -> LimResult<BusIdx> {
        sources.get(name).copied().ok_or_else(|| {
            Error::unknown_reference(format!(
                "{name} in procedure {}",
                desc.name
            ))
        })
    };
    for node in &desc.body {
        let comp = names[node.name.as_str()];
        let ports = design.comp(comp).data_ports().to_vec();
        if node.args.len() > ports.len() {
            return Err(Error::malformed_structure(format!(
                "{} takes {} inputs, found {}",
                node.name,
                ports.len(),
                node.args.len()
            )));
        }
        let entry = design.comp(comp).entries()[0];
        for (port, arg) in ports.into_iter().zip(&node.args) {
            design.add_dependency(entry, port, lookup(arg)?, DepKind::Data)?;
        }
    }

    if let Some(result) = &desc.result {
        let source = lookup(result)?;
        let Some(exit) = design.exit_of(body, ExitTag::RETURN) else {
            return Err(Error::malformed_structure(format!(
                "procedure {} never returns",
                desc.name
            )));
        };
        let bus = design.make_data_bus(exit);
        design.bus_mut(bus).used = true;
        let (Some(out_buf), Some(port)) =
            (design.out_buf(exit), design.bus(bus).peer())
        else {
            unreachable!("module exits have an OutBuf")
        };
        let entry = design.comp(out_buf).entries()[0];
        design.add_dependency(entry, port, source, DepKind::Data)?;
    }

    let idx = design.make_procedure(desc.name.as_str(), body)?;
    design.procedure_mut(idx).shared = desc.shared;
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::design_from_str;
    use crate::ExitTag;
    use lim_utils::Error;

    const SUM: &str = r#"{
        "name": "main",
        "procedures": [{
            "name": "f",
            "inputs": [{ "name": "a", "width": 8, "signed": true }],
            "body": [
                { "name": "three", "kind": "const", "value": 3, "width": 8, "signed": true },
                { "name": "sum", "kind": "add", "width": 8, "signed": true, "args": ["a", "three"] }
            ],
            "result": "sum"
        }],
        "tasks": [{ "procedure": "f", "kickable": true }]
    }"#;

    #[test]
    fn builds_procedures_and_tasks() {
        let design = design_from_str(SUM).unwrap();
        assert_eq!(design.name, "main");
        let proc = design.procedures()[0];
        let body = design.procedure(proc).body();
        assert_eq!(design.comp(body).data_ports().len(), 1);
        assert!(design.has_return_value(proc));
        let ret = design.exit_of(body, ExitTag::RETURN).unwrap();
        assert_eq!(design.exit(ret).data_buses().len(), 1);
        assert_eq!(design.tasks().len(), 1);
        assert!(design.tasks()[0].kickable);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let src = SUM.replace(r#"["a", "three"]"#, r#"["a", "four"]"#);
        assert!(matches!(
            design_from_str(&src),
            Err(Error::UnknownReference(_))
        ));
        let src = SUM.replace(r#""add""#, r#""frobnicate""#);
        assert!(design_from_str(&src).is_err());
        assert!(matches!(design_from_str("{"), Err(Error::Json(_))));
    }
}
