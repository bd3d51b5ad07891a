use crate::program::{Address, AddressFactory, SourceLocation, SymbolResolver};
use crate::symbol::lines::section_bytes;
use crate::symbol::{
    functions_from_symtab, parse_eh_frame, FunctionSymbol, LineTable, SymbolId, SymbolTable,
};
use anyhow::{bail, Context, Result};
use byteorder::{BE, LE};
use gimli::RunTimeEndian;
use goblin::elf::section_header::SHN_UNDEF;
use goblin::elf::Elf;
use goblin::Object;
use std::io::Read;
use std::path::{Path, PathBuf};

/// A profiled ELF program: its functions, imports and line information.
#[derive(Debug)]
pub struct Binary {
    pub path: PathBuf,
    pub is_64: bool,
    pub little_endian: bool,
    pub entry: u64,
    /// True when functions came from `.eh_frame` instead of `.symtab`.
    pub is_stripped: bool,
    pub symbols: SymbolTable,
    /// Names of undefined (imported) symbols, static and dynamic.
    pub undefined_symbols: Vec<String>,
    lines: Option<LineTable>,
}

impl Binary {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Self::parse(path, &buf)
    }

    pub fn parse<P: Into<PathBuf>>(path: P, buf: &[u8]) -> Result<Self> {
        let path = path.into();
        match Object::parse(buf)? {
            Object::Elf(elf) => Self::from_elf(path, &elf, buf),
            _ => bail!("{}: not an ELF binary", path.display()),
        }
    }

    fn from_elf(path: PathBuf, elf: &Elf, buf: &[u8]) -> Result<Self> {
        let symtab = section_bytes(elf, buf, ".symtab");
        let strtab = section_bytes(elf, buf, ".strtab");

        let mut is_stripped = false;
        let functions = if !symtab.is_empty() {
            let functions = if elf.little_endian {
                functions_from_symtab::<LE>(symtab, strtab, elf.is_64)?
            } else {
                functions_from_symtab::<BE>(symtab, strtab, elf.is_64)?
            };
            log::info!("Found {} functions in .symtab", functions.len());
            functions
        } else {
            is_stripped = true;
            log::warn!("No .symtab in {}; using .eh_frame", path.display());
            Self::functions_from_eh_frame(elf, buf)?
        };

        let lines = match LineTable::load(elf, buf) {
            Ok(lines) => lines,
            Err(e) => {
                log::warn!("Ignoring debug info of {}: {e:#}", path.display());
                None
            }
        };
        if lines.is_none() {
            log::debug!("No line information; call sites will have no source location");
        }

        Ok(Self {
            path,
            is_64: elf.is_64,
            little_endian: elf.little_endian,
            entry: elf.header.e_entry,
            is_stripped,
            symbols: SymbolTable::new(functions),
            undefined_symbols: Self::collect_undefined(elf),
            lines,
        })
    }

    fn functions_from_eh_frame(elf: &Elf, buf: &[u8]) -> Result<Vec<FunctionSymbol>> {
        let Some(sh) = elf
            .section_headers
            .iter()
            .find(|sh| elf.shdr_strtab.get_at(sh.sh_name) == Some(".eh_frame"))
        else {
            log::warn!(".eh_frame not found");
            return Ok(Vec::new());
        };

        let endian = if elf.little_endian {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let data = section_bytes(elf, buf, ".eh_frame");
        let mut functions = parse_eh_frame(data, sh.sh_addr, endian)?;
        log::info!("Found {} functions in .eh_frame", functions.len());

        let entry_addr = elf.header.e_entry;
        if let Some(entry_func) = functions.iter_mut().find(|f| f.start == entry_addr) {
            log::info!(
                "Entry function found at {:#x}, renaming {} -> entry",
                entry_func.start,
                entry_func.name
            );
            entry_func.name = "entry".to_string();
        }
        Ok(functions)
    }

    fn collect_undefined(elf: &Elf) -> Vec<String> {
        let statics = elf
            .syms
            .iter()
            .filter(|s| s.st_shndx == SHN_UNDEF as usize && s.st_name != 0)
            .filter_map(|s| elf.strtab.get_at(s.st_name));
        let dynamics = elf
            .dynsyms
            .iter()
            .filter(|s| s.st_shndx == SHN_UNDEF as usize && s.st_name != 0)
            .filter_map(|s| elf.dynstrtab.get_at(s.st_name));

        let mut names: Vec<String> = statics.chain(dynamics).map(str::to_string).collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn function(&self, id: SymbolId) -> Option<&FunctionSymbol> {
        self.symbols.get(id)
    }

    pub fn symbol_name(&self, id: SymbolId) -> &str {
        self.symbols.get(id).map_or("<unknown>", |f| f.name.as_str())
    }

    pub fn has_line_info(&self) -> bool {
        self.lines.is_some()
    }
}

impl AddressFactory for Binary {}

impl SymbolResolver for Binary {
    type Symbol = SymbolId;

    fn symbol_at(&self, addr: Address) -> Option<SymbolId> {
        self.symbols.lookup(addr.as_u64())
    }

    fn source_location(&self, addr: Address) -> Option<SourceLocation> {
        self.lines.as_ref()?.location(addr.as_u64())
    }
}
