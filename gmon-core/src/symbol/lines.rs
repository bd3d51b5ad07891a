use crate::program::SourceLocation;
use addr2line::gimli::{self, EndianArcSlice, RunTimeEndian};
use addr2line::Context;
use anyhow::{Context as _, Result};
use goblin::elf::Elf;
use std::sync::Arc;

/// DWARF line information of a program, for call-site locations.
pub struct LineTable {
    ctx: Context<EndianArcSlice<RunTimeEndian>>,
}

impl std::fmt::Debug for LineTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineTable").finish_non_exhaustive()
    }
}

impl LineTable {
    /// Loads DWARF from the sections of `elf`. Returns `Ok(None)` when the
    /// program carries no `.debug_info`.
    pub fn load(elf: &Elf, data: &[u8]) -> Result<Option<Self>> {
        if section_bytes(elf, data, ".debug_info").is_empty() {
            return Ok(None);
        }

        let endian = if elf.little_endian {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let load_section = |id: gimli::SectionId| {
            let bytes = section_bytes(elf, data, id.name());
            Ok::<_, gimli::Error>(EndianArcSlice::new(Arc::from(bytes), endian))
        };

        let dwarf = gimli::Dwarf::load(load_section)?;
        let ctx = Context::from_dwarf(dwarf).context("Failed to load DWARF line information")?;
        Ok(Some(Self { ctx }))
    }

    pub fn location(&self, addr: u64) -> Option<SourceLocation> {
        let loc = self.ctx.find_location(addr).ok()??;
        Some(SourceLocation {
            path: loc.file?.to_string(),
            line: loc.line.unwrap_or(0),
        })
    }
}

/// Contents of the named section, or an empty slice.
pub(crate) fn section_bytes<'a>(elf: &Elf, data: &'a [u8], name: &str) -> &'a [u8] {
    elf.section_headers
        .iter()
        .find(|sh| elf.shdr_strtab.get_at(sh.sh_name) == Some(name))
        .and_then(|sh| {
            let start = sh.sh_offset as usize;
            data.get(start..start.checked_add(sh.sh_size as usize)?)
        })
        .unwrap_or(&[])
}
