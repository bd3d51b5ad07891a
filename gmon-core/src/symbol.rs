pub mod eh_frame;
pub mod lines;
pub mod symtab;

pub use eh_frame::parse_eh_frame;
pub use lines::LineTable;
pub use symtab::{functions_from_symtab, ElfSym};

/// Stable identity of a function within one [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSymbol {
    pub name: String,
    pub start: u64,
    pub end: u64,
    pub size: u64,
}

impl FunctionSymbol {
    /// `None` when `start + size` does not fit in the address space.
    pub fn from_range(name: String, start: u64, size: u64) -> Option<Self> {
        let end = start.checked_add(size)?;
        Some(Self {
            name,
            start,
            end,
            size,
        })
    }

    pub fn contains(&self, addr: u64) -> bool {
        if self.size == 0 {
            addr == self.start
        } else {
            self.start <= addr && addr < self.end
        }
    }
}

/// Functions of a program sorted by start address.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    functions: Vec<FunctionSymbol>,
}

impl SymbolTable {
    /// Builds a table; aliases sharing a start address keep the first name seen.
    pub fn new(mut functions: Vec<FunctionSymbol>) -> Self {
        functions.sort_by_key(|f| f.start);
        functions.dedup_by_key(|f| f.start);
        Self { functions }
    }

    /// Finds the function whose range contains `addr`.
    pub fn lookup(&self, addr: u64) -> Option<SymbolId> {
        let idx = self.functions.partition_point(|f| f.start <= addr);
        let candidate = idx.checked_sub(1)?;
        self.functions[candidate]
            .contains(addr)
            .then_some(SymbolId(candidate))
    }

    pub fn get(&self, id: SymbolId) -> Option<&FunctionSymbol> {
        self.functions.get(id.0)
    }

    pub fn by_name(&self, name: &str) -> Option<SymbolId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(SymbolId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &FunctionSymbol)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (SymbolId(i), f))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
