//! Representation of the physical and logical connections between components.
use crate::{Latency, Value};
use lim_idx::impl_index;
use lim_utils::Id;
use linked_hash_map::LinkedHashMap;
use smallvec::SmallVec;

/// Handle to a [crate::Component].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct CompIdx(pub(crate) u32);
impl_index!(CompIdx);

/// Handle to a [Port].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct PortIdx(pub(crate) u32);
impl_index!(PortIdx);

/// Handle to a [Bus].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct BusIdx(pub(crate) u32);
impl_index!(BusIdx);

/// Handle to an [Exit].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ExitIdx(pub(crate) u32);
impl_index!(ExitIdx);

/// Handle to an [Entry].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct EntryIdx(pub(crate) u32);
impl_index!(EntryIdx);

/// Handle to a [Dependency].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct DepIdx(pub(crate) u32);
impl_index!(DepIdx);

/// Handle to a [crate::Procedure].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ProcIdx(pub(crate) u32);
impl_index!(ProcIdx);

/// Kind of signal carried by a port or bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ConnTag {
    #[default]
    Normal,
    /// Signals that travel outside of the normal data path.
    Sideband,
}

/// The sink half of a physical connection.
#[derive(Debug, Clone)]
pub struct Port {
    pub name: Id,
    /// Component that consumes this port.
    pub owner: CompIdx,
    /// Set once the port participates in the generated hardware.
    pub used: bool,
    pub tag: ConnTag,
    pub(crate) bus: Option<BusIdx>,
    /// Continuation of this port on the other side of a module boundary.
    pub(crate) peer: Option<BusIdx>,
    pub(crate) value: Option<Value>,
}

impl Port {
    pub(crate) fn new(name: Id, owner: CompIdx) -> Self {
        Self {
            name,
            owner,
            used: false,
            tag: ConnTag::Normal,
            bus: None,
            peer: None,
            value: None,
        }
    }

    /// The bus physically driving this port.
    pub fn bus(&self) -> Option<BusIdx> {
        self.bus
    }

    pub fn is_connected(&self) -> bool {
        self.bus.is_some()
    }

    pub fn peer(&self) -> Option<BusIdx> {
        self.peer
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn size(&self) -> usize {
        self.value.as_ref().map_or(0, Value::size)
    }
}

/// The source half of a physical connection.
#[derive(Debug, Clone)]
pub struct Bus {
    pub name: Id,
    pub owner: ExitIdx,
    pub used: bool,
    /// A floating bus has no driver inside its component.
    pub float: bool,
    pub tag: ConnTag,
    pub(crate) ports: Vec<PortIdx>,
    pub(crate) logical_dependents: Vec<DepIdx>,
    pub(crate) peer: Option<PortIdx>,
    pub(crate) value: Option<Value>,
    pub(crate) forced: bool,
}

impl Bus {
    pub(crate) fn new(name: Id, owner: ExitIdx) -> Self {
        Self {
            name,
            owner,
            used: false,
            float: false,
            tag: ConnTag::Normal,
            ports: Vec::new(),
            logical_dependents: Vec::new(),
            peer: None,
            value: None,
            forced: false,
        }
    }

    /// Ports physically connected to this bus.
    pub fn ports(&self) -> &[PortIdx] {
        &self.ports
    }

    /// Dependencies that name this bus as their logical source.
    pub fn logical_dependents(&self) -> &[DepIdx] {
        &self.logical_dependents
    }

    pub fn peer(&self) -> Option<PortIdx> {
        self.peer
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn size(&self) -> usize {
        self.value.as_ref().map_or(0, Value::size)
    }

    /// True once the value has been committed for code generation.
    pub fn is_forced(&self) -> bool {
        self.forced
    }
}

/// Category of an [Exit].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExitType {
    Done,
    Return,
    Break,
    Continue,
    Exception,
    Sideband,
}

impl std::fmt::Display for ExitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitType::Done => "done",
            ExitType::Return => "return",
            ExitType::Break => "break",
            ExitType::Continue => "continue",
            ExitType::Exception => "exception",
            ExitType::Sideband => "sideband",
        };
        f.write_str(s)
    }
}

/// Identifies an exit within its component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExitTag {
    pub kind: ExitType,
    pub label: Option<Id>,
}

impl ExitTag {
    pub const DONE: ExitTag = ExitTag::new(ExitType::Done);
    pub const RETURN: ExitTag = ExitTag::new(ExitType::Return);

    pub const fn new(kind: ExitType) -> Self {
        Self { kind, label: None }
    }

    pub fn labeled<S: Into<Id>>(kind: ExitType, label: S) -> Self {
        Self {
            kind,
            label: Some(label.into()),
        }
    }

    /// Taken by a decision whose condition holds.
    pub fn true_branch() -> Self {
        Self::labeled(ExitType::Done, "true")
    }

    /// Taken by a decision whose condition does not hold.
    pub fn false_branch() -> Self {
        Self::labeled(ExitType::Done, "false")
    }

    /// Taken by a loop body that wants another iteration.
    pub fn feedback() -> Self {
        Self::labeled(ExitType::Done, "#feedback#")
    }
}

impl std::fmt::Display for ExitTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.label {
            Some(label) => write!(f, "{}({label})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// One way of completing a component: a done signal, data results and the
/// time it takes to get there.
#[derive(Debug, Clone)]
pub struct Exit {
    pub tag: ExitTag,
    pub owner: CompIdx,
    pub latency: Latency,
    pub(crate) done: BusIdx,
    pub(crate) data_buses: SmallVec<[BusIdx; 2]>,
    /// Entries that this exit drives.
    pub(crate) drivens: Vec<EntryIdx>,
    /// The OutBuf collecting this exit inside a module.
    pub(crate) peer: Option<CompIdx>,
}

impl Exit {
    pub fn done(&self) -> BusIdx {
        self.done
    }

    pub fn data_buses(&self) -> &[BusIdx] {
        &self.data_buses
    }

    pub fn drivens(&self) -> &[EntryIdx] {
        &self.drivens
    }

    pub fn peer(&self) -> Option<CompIdx> {
        self.peer
    }

    /// The done bus followed by the data buses.
    pub fn buses(&self) -> impl Iterator<Item = BusIdx> + '_ {
        std::iter::once(self.done).chain(self.data_buses.iter().copied())
    }
}

/// The dependencies feeding one invocation of a component, all of them
/// satisfied by the completion of a single driving exit.
#[derive(Debug, Clone)]
pub struct Entry {
    pub owner: CompIdx,
    pub(crate) driving_exit: Option<ExitIdx>,
    pub(crate) deps: LinkedHashMap<PortIdx, Vec<DepIdx>>,
}

impl Entry {
    pub fn driving_exit(&self) -> Option<ExitIdx> {
        self.driving_exit
    }

    /// The dependencies recorded for `port`, in insertion order.
    pub fn dependencies(&self, port: PortIdx) -> &[DepIdx] {
        self.deps.get(&port).map_or(&[], Vec::as_slice)
    }

    /// Ports with at least one recorded dependency.
    pub fn ports(&self) -> impl Iterator<Item = PortIdx> + '_ {
        self.deps.keys().copied()
    }

    pub fn all_dependencies(&self) -> impl Iterator<Item = DepIdx> + '_ {
        self.deps.values().flatten().copied()
    }
}

/// Category of a [Dependency].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepKind {
    Control,
    Data,
    Clock,
    Reset,
    /// Ordering imposed by a shared resource, satisfied `delay_clocks` after
    /// the source completes.
    Resource { delay_clocks: u32 },
    Wait,
}

impl std::fmt::Display for DepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepKind::Control => write!(f, "control"),
            DepKind::Data => write!(f, "data"),
            DepKind::Clock => write!(f, "clock"),
            DepKind::Reset => write!(f, "reset"),
            DepKind::Resource { delay_clocks } => {
                write!(f, "resource+{delay_clocks}")
            }
            DepKind::Wait => write!(f, "wait"),
        }
    }
}

/// A logical edge: `port` of the entry owner is satisfied by `logical_bus`.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub kind: DepKind,
    pub(crate) entry: EntryIdx,
    pub(crate) port: PortIdx,
    pub(crate) logical_bus: BusIdx,
}

impl Dependency {
    pub fn entry(&self) -> EntryIdx {
        self.entry
    }

    pub fn port(&self) -> PortIdx {
        self.port
    }

    pub fn logical_bus(&self) -> BusIdx {
        self.logical_bus
    }
}
