use std::fmt;
use std::hash::Hash;
use std::path::PathBuf;

/// An address in the profiled program's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub u64);

impl Address {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address(value)
    }
}

/// File and line of a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub path: String,
    pub line: u32,
}

/// Builds addresses from the raw values found in profile records.
pub trait AddressFactory {
    fn create_address(&self, value: u64) -> Address {
        Address(value)
    }
}

/// Maps program addresses to symbols.
///
/// `Symbol` is the identity a call-graph node is keyed on, so two addresses
/// inside the same function must resolve to equal values.
pub trait SymbolResolver: AddressFactory {
    type Symbol: Clone + Eq + Hash + fmt::Debug;

    /// Returns the symbol containing `addr`, or `None` for addresses outside
    /// every known function (PLT stubs, stripped library code...).
    fn symbol_at(&self, addr: Address) -> Option<Self::Symbol>;

    /// Source location of `addr`, if line information is available.
    fn source_location(&self, _addr: Address) -> Option<SourceLocation> {
        None
    }
}

/// Program and project an arc was recorded against. Carried on every arc
/// for consumers; the decoder never looks inside.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramContext {
    pub program: PathBuf,
    pub project: Option<String>,
}

impl ProgramContext {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            project: None,
        }
    }

    pub fn with_project<S: Into<String>>(mut self, project: S) -> Self {
        self.project = Some(project.into());
        self
    }
}
