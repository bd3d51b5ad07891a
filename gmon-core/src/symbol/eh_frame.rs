use crate::symbol::FunctionSymbol;
use anyhow::Result;
use gimli::{BaseAddresses, EhFrame, RunTimeEndian, UnwindSection};

/// Recovers function ranges from `.eh_frame` FDEs for binaries without a
/// `.symtab`. Names are synthetic (`FUNC_0x…`).
pub fn parse_eh_frame(
    data: &[u8],
    base_address: u64,
    endian: RunTimeEndian,
) -> Result<Vec<FunctionSymbol>> {
    let mut functions = Vec::new();
    let eh_frame = EhFrame::new(data, endian);
    let bases = BaseAddresses::default().set_eh_frame(base_address);

    let mut entries = eh_frame.entries(&bases);
    while let Some(entry) = entries.next()? {
        if let gimli::CieOrFde::Fde(partial_fde) = entry {
            if let Ok(fde) = partial_fde.parse(|_, bases, o| eh_frame.cie_from_offset(bases, o)) {
                let start = fde.initial_address();
                let name = format!("FUNC_{:#x}", start);
                match FunctionSymbol::from_range(name, start, fde.len()) {
                    Some(func) => functions.push(func),
                    None => log::warn!("Skipping FDE at {:#x}: range overflows", start),
                }
            }
        }
    }

    functions.sort_by_key(|f| f.start);
    Ok(functions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_has_no_functions() {
        let funcs = parse_eh_frame(&[], 0x2000, RunTimeEndian::Little).unwrap();
        assert!(funcs.is_empty());
    }
}
