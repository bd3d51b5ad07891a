use crate::symbol::FunctionSymbol;
use anyhow::bail;
use byteorder::{ByteOrder, ReadBytesExt};
use goblin::elf::section_header::SHN_UNDEF;
use goblin::elf::sym::STT_FUNC;
use std::io::{self, Cursor};

/// One `.symtab` entry, widened to the 64-bit layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfSym {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

impl ElfSym {
    pub const SIZE_32: usize = 16;
    pub const SIZE_64: usize = 24;

    fn read_64<B: ByteOrder, R: io::Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            st_name: reader.read_u32::<B>()?,
            st_info: reader.read_u8()?,
            st_other: reader.read_u8()?,
            st_shndx: reader.read_u16::<B>()?,
            st_value: reader.read_u64::<B>()?,
            st_size: reader.read_u64::<B>()?,
        })
    }

    // Elf32_Sym orders value and size before info.
    fn read_32<B: ByteOrder, R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let st_name = reader.read_u32::<B>()?;
        let st_value = reader.read_u32::<B>()? as u64;
        let st_size = reader.read_u32::<B>()? as u64;
        Ok(Self {
            st_name,
            st_info: reader.read_u8()?,
            st_other: reader.read_u8()?,
            st_shndx: reader.read_u16::<B>()?,
            st_value,
            st_size,
        })
    }

    /// Parses every entry of a raw `.symtab` section.
    pub fn from_section<B: ByteOrder>(
        symtab_data: &[u8],
        is_64: bool,
    ) -> anyhow::Result<Vec<ElfSym>> {
        let entry_size = if is_64 { Self::SIZE_64 } else { Self::SIZE_32 };
        if symtab_data.len() % entry_size != 0 {
            bail!(
                "Invalid symtab size {} for {}-bit",
                symtab_data.len(),
                if is_64 { 64 } else { 32 }
            );
        }

        let num_symbols = symtab_data.len() / entry_size;
        let mut symbols = Vec::with_capacity(num_symbols);
        let mut reader = Cursor::new(symtab_data);
        for _ in 0..num_symbols {
            let sym = if is_64 {
                Self::read_64::<B, _>(&mut reader)?
            } else {
                Self::read_32::<B, _>(&mut reader)?
            };
            symbols.push(sym);
        }
        Ok(symbols)
    }

    pub fn sym_type(&self) -> u8 {
        self.st_info & 0xf
    }

    pub fn is_defined_function(&self) -> bool {
        self.sym_type() == STT_FUNC
            && self.st_shndx != SHN_UNDEF as u16
            && self.st_value != 0
            && self.st_size != 0
    }

    /// Looks the name up in `.strtab`; unnamed symbols become `FUNC_0x…`.
    pub fn name(&self, strtab_data: &[u8]) -> String {
        let name = if (self.st_name as usize) < strtab_data.len() {
            let name_start = self.st_name as usize;
            let name_end = strtab_data[name_start..]
                .iter()
                .position(|&b| b == 0)
                .map(|pos| name_start + pos)
                .unwrap_or(strtab_data.len());

            std::str::from_utf8(&strtab_data[name_start..name_end]).unwrap_or("<invalid_utf8>")
        } else {
            "<invalid_name>"
        };

        if name.is_empty() {
            format!("FUNC_{:#x}", self.st_value)
        } else {
            name.to_string()
        }
    }
}

/// Defined functions of a `.symtab` section.
pub fn functions_from_symtab<B: ByteOrder>(
    symtab_data: &[u8],
    strtab_data: &[u8],
    is_64: bool,
) -> anyhow::Result<Vec<FunctionSymbol>> {
    let functions = ElfSym::from_section::<B>(symtab_data, is_64)?
        .into_iter()
        .filter(ElfSym::is_defined_function)
        .filter_map(|sym| {
            let name = sym.name(strtab_data);
            let func = FunctionSymbol::from_range(name, sym.st_value, sym.st_size);
            if func.is_none() {
                log::warn!(
                    "Skipping symbol at {:#x}: size {:#x} overflows the address space",
                    sym.st_value,
                    sym.st_size
                );
            }
            func
        })
        .collect();
    Ok(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{WriteBytesExt, BE, LE};

    const STRTAB: &[u8] = b"\0main\0counter\0";

    fn sym64(name: u32, info: u8, shndx: u16, value: u64, size: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<LE>(name).unwrap();
        out.write_u8(info).unwrap();
        out.write_u8(0).unwrap();
        out.write_u16::<LE>(shndx).unwrap();
        out.write_u64::<LE>(value).unwrap();
        out.write_u64::<LE>(size).unwrap();
        out
    }

    #[test]
    fn keeps_only_defined_functions() {
        let mut data = sym64(0, 0, 0, 0, 0);
        data.extend(sym64(1, 0x12, 14, 0x1139, 0x2a)); // GLOBAL FUNC
        data.extend(sym64(6, 0x11, 24, 0x4010, 4)); // GLOBAL OBJECT
        data.extend(sym64(0, 0x12, 0, 0, 0)); // undefined import
        let funcs = functions_from_symtab::<LE>(&data, STRTAB, true).unwrap();
        assert_eq!(
            funcs,
            vec![FunctionSymbol {
                name: "main".into(),
                start: 0x1139,
                end: 0x1163,
                size: 0x2a,
            }]
        );
    }

    #[test]
    fn skips_function_whose_range_overflows() {
        let mut data = sym64(1, 0x12, 14, u64::MAX - 2, 16);
        data.extend(sym64(6, 0x12, 14, 0x1200, 0x10));
        let funcs = functions_from_symtab::<LE>(&data, STRTAB, true).unwrap();
        assert_eq!(funcs.len(), 1);
        assert_eq!((funcs[0].name.as_str(), funcs[0].end), ("counter", 0x1210));
    }

    #[test]
    fn parses_big_endian_elf32() {
        let mut data = Vec::new();
        data.write_u32::<BE>(1).unwrap();
        data.write_u32::<BE>(0x8000_0400).unwrap();
        data.write_u32::<BE>(0x10).unwrap();
        data.write_u8(0x12).unwrap();
        data.write_u8(0).unwrap();
        data.write_u16::<BE>(7).unwrap();

        let syms = ElfSym::from_section::<BE>(&data, false).unwrap();
        assert_eq!(syms.len(), 1);
        assert_eq!(syms[0].st_value, 0x8000_0400);
        assert!(syms[0].is_defined_function());
        assert_eq!(syms[0].name(STRTAB), "main");
    }

    #[test]
    fn rejects_ragged_section() {
        assert!(ElfSym::from_section::<LE>(&[0u8; 25], true).is_err());
    }

    #[test]
    fn unnamed_symbol_gets_synthetic_name() {
        let sym = ElfSym {
            st_name: 0,
            st_info: 0x12,
            st_other: 0,
            st_shndx: 1,
            st_value: 0x401000,
            st_size: 8,
        };
        assert_eq!(sym.name(STRTAB), "FUNC_0x401000");
        assert_eq!(
            ElfSym { st_name: 99, ..sym }.name(STRTAB),
            "<invalid_name>"
        );
    }
}
