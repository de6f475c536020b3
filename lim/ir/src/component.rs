//! The closed set of component kinds and the data each of them carries.
use crate::{
    BusIdx, CompIdx, EntryIdx, ExitIdx, ExitTag, PortIdx, ProcIdx, RefereeData,
    Value,
};
use lim_utils::{GetName, Id};
use linked_hash_map::LinkedHashMap;

/// Operators whose semantics are fixed by the source language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Xor,
    Complement,
    Not,
    Minus,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    LeftShift,
    RightShift,
    RightShiftUnsigned,
    ConditionalAnd,
    ConditionalOr,
    /// Explicit conversion to `size` bits.
    Cast { size: usize, signed: bool },
    /// Implicit widening of an operand.
    NumericPromotion { size: usize, signed: bool },
}

impl OpKind {
    /// Number of data inputs.
    pub fn arity(&self) -> usize {
        match self {
            OpKind::Complement
            | OpKind::Not
            | OpKind::Minus
            | OpKind::Cast { .. }
            | OpKind::NumericPromotion { .. } => 1,
            _ => 2,
        }
    }

    /// Operators producing a single bit truth value.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            OpKind::Equal
                | OpKind::NotEqual
                | OpKind::LessThan
                | OpKind::LessThanEqual
                | OpKind::GreaterThan
                | OpKind::GreaterThanEqual
                | OpKind::Not
                | OpKind::ConditionalAnd
                | OpKind::ConditionalOr
        )
    }

    /// Operators that combine their inputs bit by bit.
    pub fn is_bitwise(&self) -> bool {
        matches!(
            self,
            OpKind::And | OpKind::Or | OpKind::Xor | OpKind::Complement
        )
    }

    pub fn is_shift(&self) -> bool {
        matches!(
            self,
            OpKind::LeftShift | OpKind::RightShift | OpKind::RightShiftUnsigned
        )
    }

    /// Name used when printing and when reading a design description.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Subtract => "sub",
            OpKind::Multiply => "mul",
            OpKind::Divide => "div",
            OpKind::Modulo => "mod",
            OpKind::And => "and",
            OpKind::Or => "or",
            OpKind::Xor => "xor",
            OpKind::Complement => "complement",
            OpKind::Not => "not",
            OpKind::Minus => "minus",
            OpKind::Equal => "eq",
            OpKind::NotEqual => "neq",
            OpKind::LessThan => "lt",
            OpKind::LessThanEqual => "le",
            OpKind::GreaterThan => "gt",
            OpKind::GreaterThanEqual => "ge",
            OpKind::LeftShift => "lsh",
            OpKind::RightShift => "rsh",
            OpKind::RightShiftUnsigned => "ursh",
            OpKind::ConditionalAnd => "cand",
            OpKind::ConditionalOr => "cor",
            OpKind::Cast { .. } => "cast",
            OpKind::NumericPromotion { .. } => "promote",
        }
    }

    /// Inverse of [OpKind::name] for the operators without parameters.
    pub fn from_name(name: &str) -> Option<OpKind> {
        let op = match name {
            "add" => OpKind::Add,
            "sub" => OpKind::Subtract,
            "mul" => OpKind::Multiply,
            "div" => OpKind::Divide,
            "mod" => OpKind::Modulo,
            "and" => OpKind::And,
            "or" => OpKind::Or,
            "xor" => OpKind::Xor,
            "complement" => OpKind::Complement,
            "not" => OpKind::Not,
            "minus" => OpKind::Minus,
            "eq" => OpKind::Equal,
            "neq" => OpKind::NotEqual,
            "lt" => OpKind::LessThan,
            "le" => OpKind::LessThanEqual,
            "gt" => OpKind::GreaterThan,
            "ge" => OpKind::GreaterThanEqual,
            "lsh" => OpKind::LeftShift,
            "rsh" => OpKind::RightShift,
            "ursh" => OpKind::RightShiftUnsigned,
            "cand" => OpKind::ConditionalAnd,
            "cor" => OpKind::ConditionalOr,
            _ => return None,
        };
        Some(op)
    }
}

/// Single bit logic gates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GateKind {
    And,
    Or,
    Not,
    Xor,
}

impl GateKind {
    pub fn name(&self) -> &'static str {
        match self {
            GateKind::And => "and",
            GateKind::Or => "or",
            GateKind::Not => "not",
            GateKind::Xor => "xor",
        }
    }
}

/// Ports of a register in the order of its data ports.
#[derive(Clone, Debug)]
pub struct RegData {
    pub data: PortIdx,
    pub set: PortIdx,
    pub internal_reset: PortIdx,
    pub enable: PortIdx,
    /// Value loaded on reset.
    pub init: Option<Value>,
}

/// A multiplexer: each pair is a select port and the data port it enables.
#[derive(Clone, Debug, Default)]
pub struct MuxData {
    pub pairs: Vec<(PortIdx, PortIdx)>,
}

/// One invocation of a procedure. Every port, exit and bus of the call
/// corresponds to one of the procedure body.
#[derive(Clone, Debug)]
pub struct CallData {
    pub procedure: ProcIdx,
    pub ports: LinkedHashMap<PortIdx, PortIdx>,
    pub exits: LinkedHashMap<ExitIdx, ExitIdx>,
    pub buses: LinkedHashMap<BusIdx, BusIdx>,
}

/// Boundary component that fans a module's inputs into its contents. The go
/// signal is the done bus of its exit.
#[derive(Clone, Copy, Debug)]
pub struct InBufData {
    pub clock: BusIdx,
    pub reset: BusIdx,
}

/// Boundary component collecting the values for one exit of a module.
#[derive(Clone, Copy, Debug)]
pub struct OutBufData {
    pub exit: ExitIdx,
}

/// A block executes its components in sequence.
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    pub sequence: Vec<CompIdx>,
    pub procedure_body: bool,
}

/// Number of loop iterations when known.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Iterations {
    #[default]
    Unknown,
    Count(u64),
}

#[derive(Clone, Debug)]
pub struct LoopData {
    pub init_block: Option<CompIdx>,
    pub body: Option<CompIdx>,
    /// Holds the go signal across the feedback path.
    pub control_reg: Option<CompIdx>,
    pub data_regs: Vec<CompIdx>,
    pub latches: Vec<CompIdx>,
    pub iterations: Iterations,
    /// Entry of the body driven by the init block.
    pub body_init_entry: Option<EntryIdx>,
    /// Entry of the body driven by the feedback path.
    pub body_feedback_entry: Option<EntryIdx>,
}

/// Whether the test of a loop body runs before or after its body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoopBodyKind {
    While,
    Until,
    For,
}

#[derive(Clone, Debug)]
pub struct LoopBodyData {
    pub kind: LoopBodyKind,
    pub decision: Option<CompIdx>,
    pub body: Option<CompIdx>,
    /// Only present for `For` loop bodies.
    pub update: Option<CompIdx>,
}

impl LoopBodyData {
    /// True if the decision executes before the body.
    pub fn is_decision_first(&self) -> bool {
        !matches!(self.kind, LoopBodyKind::Until)
    }
}

#[derive(Clone, Debug)]
pub struct BranchData {
    pub decision: Option<CompIdx>,
    pub true_branch: Option<CompIdx>,
    pub false_branch: Option<CompIdx>,
}

#[derive(Clone, Debug)]
pub struct DecisionData {
    pub test_block: Option<CompIdx>,
    /// The component whose result is the tested condition.
    pub test_component: CompIdx,
    pub not: Option<CompIdx>,
    pub true_and: Option<CompIdx>,
    pub false_and: Option<CompIdx>,
}

#[derive(Clone, Debug)]
pub struct LatchData {
    pub reg: CompIdx,
    pub mux: CompIdx,
    pub result: BusIdx,
}

/// Shape specific data of a module.
#[derive(Clone, Debug)]
pub enum ModuleShape {
    Block(BlockData),
    /// A block whose cases are traversed as one unit.
    Switch(BlockData),
    Loop(LoopData),
    LoopBody(LoopBodyData),
    Branch(BranchData),
    Decision(DecisionData),
    Latch(LatchData),
}

/// A component that contains other components.
#[derive(Clone, Debug)]
pub struct Module {
    /// Every contained component in insertion order, boundary buffers
    /// included.
    pub(crate) components: Vec<CompIdx>,
    pub(crate) in_buf: CompIdx,
    pub shape: ModuleShape,
}

impl Module {
    pub fn components(&self) -> &[CompIdx] {
        &self.components
    }

    pub fn in_buf(&self) -> CompIdx {
        self.in_buf
    }

    pub fn sequence(&self) -> Option<&[CompIdx]> {
        match &self.shape {
            ModuleShape::Block(b) | ModuleShape::Switch(b) => Some(&b.sequence),
            _ => None,
        }
    }

    /// Components named by the shape, in the order they are wired.
    pub fn ordered_children(&self) -> Vec<CompIdx> {
        match &self.shape {
            ModuleShape::Block(b) | ModuleShape::Switch(b) => b.sequence.clone(),
            ModuleShape::Loop(l) => l
                .init_block
                .into_iter()
                .chain(l.body)
                .chain(l.control_reg)
                .chain(l.data_regs.iter().copied())
                .chain(l.latches.iter().copied())
                .collect(),
            ModuleShape::LoopBody(lb) => match lb.kind {
                LoopBodyKind::Until => {
                    lb.body.into_iter().chain(lb.decision).collect()
                }
                LoopBodyKind::While | LoopBodyKind::For => lb
                    .decision
                    .into_iter()
                    .chain(lb.body)
                    .chain(lb.update)
                    .collect(),
            },
            ModuleShape::Branch(b) => b
                .decision
                .into_iter()
                .chain(b.true_branch)
                .chain(b.false_branch)
                .collect(),
            ModuleShape::Decision(d) => d
                .test_block
                .into_iter()
                .chain(d.not)
                .chain(d.true_and)
                .chain(d.false_and)
                .collect(),
            ModuleShape::Latch(l) => vec![l.reg, l.mux],
        }
    }
}

/// What a component computes.
#[derive(Clone, Debug)]
pub enum ComponentKind {
    Constant(Value),
    Op(OpKind),
    Gate(GateKind),
    Reg(RegData),
    Mux(MuxData),
    NoOp,
    Call(CallData),
    InBuf(InBufData),
    OutBuf(OutBufData),
    Referee(RefereeData),
    Module(Box<Module>),
}

/// Discriminant of [ComponentKind] with modules split by shape. Traversals
/// dispatch on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Constant,
    Op(OpKind),
    Gate(GateKind),
    Reg,
    Mux,
    NoOp,
    Call,
    InBuf,
    OutBuf,
    Referee,
    Block,
    Switch,
    Loop,
    LoopBody(LoopBodyKind),
    Branch,
    Decision,
    Latch,
}

impl NodeKind {
    pub fn is_module(&self) -> bool {
        matches!(
            self,
            NodeKind::Block
                | NodeKind::Switch
                | NodeKind::Loop
                | NodeKind::LoopBody(_)
                | NodeKind::Branch
                | NodeKind::Decision
                | NodeKind::Latch
        )
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self, NodeKind::InBuf | NodeKind::OutBuf)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Constant => write!(f, "Constant"),
            NodeKind::Op(op) => write!(f, "Op[{}]", op.name()),
            NodeKind::Gate(g) => write!(f, "Gate[{}]", g.name()),
            NodeKind::Reg => write!(f, "Reg"),
            NodeKind::Mux => write!(f, "Mux"),
            NodeKind::NoOp => write!(f, "NoOp"),
            NodeKind::Referee => write!(f, "Referee"),
            NodeKind::Call => write!(f, "Call"),
            NodeKind::InBuf => write!(f, "InBuf"),
            NodeKind::OutBuf => write!(f, "OutBuf"),
            NodeKind::Block => write!(f, "Block"),
            NodeKind::Switch => write!(f, "Switch"),
            NodeKind::Loop => write!(f, "Loop"),
            NodeKind::LoopBody(k) => write!(f, "{k:?}Body"),
            NodeKind::Branch => write!(f, "Branch"),
            NodeKind::Decision => write!(f, "Decision"),
            NodeKind::Latch => write!(f, "Latch"),
        }
    }
}

/// Which of the standard control signals a component actually consumes or
/// produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlFlags {
    pub consumes_go: bool,
    pub produces_done: bool,
    pub consumes_clock: bool,
    pub consumes_reset: bool,
}

impl ControlFlags {
    /// Purely combinational logic.
    pub const COMBINATIONAL: ControlFlags = ControlFlags {
        consumes_go: false,
        produces_done: false,
        consumes_clock: false,
        consumes_reset: false,
    };

    pub const SEQUENTIAL: ControlFlags = ControlFlags {
        consumes_go: true,
        produces_done: true,
        consumes_clock: true,
        consumes_reset: true,
    };
}

impl Default for ControlFlags {
    fn default() -> Self {
        ControlFlags::COMBINATIONAL
    }
}

/// The basic unit of computation: a set of input ports and one or more exits.
#[derive(Clone, Debug)]
pub struct Component {
    pub name: Id,
    pub kind: ComponentKind,
    /// Set for components that optimizations must keep.
    pub non_removable: bool,
    pub flags: ControlFlags,
    pub(crate) owner: Option<CompIdx>,
    pub(crate) clock: PortIdx,
    pub(crate) reset: PortIdx,
    pub(crate) go: PortIdx,
    pub(crate) this: Option<PortIdx>,
    pub(crate) data_ports: Vec<PortIdx>,
    pub(crate) exits: LinkedHashMap<ExitTag, ExitIdx>,
    pub(crate) entries: Vec<EntryIdx>,
}

impl GetName for Component {
    fn name(&self) -> Id {
        self.name
    }
}

impl Component {
    /// The module containing this component.
    pub fn owner(&self) -> Option<CompIdx> {
        self.owner
    }

    pub fn clock(&self) -> PortIdx {
        self.clock
    }

    pub fn reset(&self) -> PortIdx {
        self.reset
    }

    pub fn go(&self) -> PortIdx {
        self.go
    }

    /// The object reference port of an instance method.
    pub fn this_port(&self) -> Option<PortIdx> {
        self.this
    }

    pub fn data_ports(&self) -> &[PortIdx] {
        &self.data_ports
    }

    /// Every port: clock, reset, go, `this` when present, then data ports.
    pub fn ports(&self) -> impl Iterator<Item = PortIdx> + '_ {
        [self.clock, self.reset, self.go]
            .into_iter()
            .chain(self.this)
            .chain(self.data_ports.iter().copied())
    }

    pub fn exit(&self, tag: ExitTag) -> Option<ExitIdx> {
        self.exits.get(&tag).copied()
    }

    /// The DONE exit.
    pub fn main_exit(&self) -> Option<ExitIdx> {
        self.exit(ExitTag::DONE)
    }

    pub fn exits(&self) -> impl Iterator<Item = (ExitTag, ExitIdx)> + '_ {
        self.exits.iter().map(|(t, e)| (*t, *e))
    }

    pub fn exit_count(&self) -> usize {
        self.exits.len()
    }

    pub fn entries(&self) -> &[EntryIdx] {
        &self.entries
    }

    pub fn node_kind(&self) -> NodeKind {
        match &self.kind {
            ComponentKind::Constant(_) => NodeKind::Constant,
            ComponentKind::Op(op) => NodeKind::Op(*op),
            ComponentKind::Gate(g) => NodeKind::Gate(*g),
            ComponentKind::Reg(_) => NodeKind::Reg,
            ComponentKind::Mux(_) => NodeKind::Mux,
            ComponentKind::NoOp => NodeKind::NoOp,
            ComponentKind::Call(_) => NodeKind::Call,
            ComponentKind::InBuf(_) => NodeKind::InBuf,
            ComponentKind::OutBuf(_) => NodeKind::OutBuf,
            ComponentKind::Referee(_) => NodeKind::Referee,
            ComponentKind::Module(m) => match &m.shape {
                ModuleShape::Block(_) => NodeKind::Block,
                ModuleShape::Switch(_) => NodeKind::Switch,
                ModuleShape::Loop(_) => NodeKind::Loop,
                ModuleShape::LoopBody(lb) => NodeKind::LoopBody(lb.kind),
                ModuleShape::Branch(_) => NodeKind::Branch,
                ModuleShape::Decision(_) => NodeKind::Decision,
                ModuleShape::Latch(_) => NodeKind::Latch,
            },
        }
    }

    pub fn is_module(&self) -> bool {
        matches!(self.kind, ComponentKind::Module(_))
    }

    pub fn module(&self) -> Option<&Module> {
        match &self.kind {
            ComponentKind::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn module_mut(&mut self) -> Option<&mut Module> {
        match &mut self.kind {
            ComponentKind::Module(m) => Some(m),
            _ => None,
        }
    }
}
