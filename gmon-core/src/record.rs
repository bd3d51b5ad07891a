use byteorder::{ByteOrder, ReadBytesExt, BE};
use std::io;

/// Layout of the count field of a call-graph record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
    /// Count is a signed 32-bit integer.
    #[default]
    Standard,
    /// Count is read like an address: unsigned 32-bit.
    Bsd,
}

/// Width of the address words in a profile file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressWidth {
    #[default]
    Bits32,
    /// Pointer-sized words written by 64-bit targets.
    Bits64,
}

impl AddressWidth {
    pub fn for_program(is_64: bool) -> Self {
        if is_64 {
            AddressWidth::Bits64
        } else {
            AddressWidth::Bits32
        }
    }

    pub fn bytes(self) -> u64 {
        match self {
            AddressWidth::Bits32 => 4,
            AddressWidth::Bits64 => 8,
        }
    }
}

/// One raw caller/callee observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallGraphRecord {
    /// Return address inside the caller.
    pub from_pc: u64,
    /// Entry address of the callee.
    pub self_pc: u64,
    pub count: i64,
}

impl CallGraphRecord {
    /// Size of a 32-bit record on disk; both layouts use three 4-byte words.
    pub const SIZE: usize = 12;

    /// Reads a big-endian record.
    pub fn read<R: io::Read>(reader: &mut R, format: RecordFormat) -> io::Result<Self> {
        Self::read_with::<BE, R>(reader, format)
    }

    /// Reads a record with 32-bit addresses using byte order `B`.
    ///
    /// Fails with the underlying I/O error if the stream ends mid-record; the
    /// partially consumed bytes are lost.
    pub fn read_with<B: ByteOrder, R: io::Read>(
        reader: &mut R,
        format: RecordFormat,
    ) -> io::Result<Self> {
        Self::read_sized::<B, R>(reader, format, AddressWidth::Bits32)
    }

    /// Reads a record whose address words are `width` wide. The standard
    /// count stays a signed 32-bit word; the BSD count is address-sized.
    pub fn read_sized<B: ByteOrder, R: io::Read>(
        reader: &mut R,
        format: RecordFormat,
        width: AddressWidth,
    ) -> io::Result<Self> {
        let from_pc = read_address_sized::<B, _>(reader, width)?;
        let self_pc = read_address_sized::<B, _>(reader, width)?;
        let count = match format {
            RecordFormat::Bsd => {
                let raw = read_address_sized::<B, _>(reader, width)?;
                i64::try_from(raw).unwrap_or(i64::MAX)
            }
            RecordFormat::Standard => reader.read_i32::<B>()? as i64,
        };

        Ok(Self {
            from_pc,
            self_pc,
            count,
        })
    }
}

/// Reads a 32-bit address, always zero-extended.
pub fn read_address<B: ByteOrder, R: io::Read>(reader: &mut R) -> io::Result<u64> {
    Ok(reader.read_u32::<B>()? as u64)
}

/// Reads an address word of the given width, zero-extended.
pub fn read_address_sized<B: ByteOrder, R: io::Read>(
    reader: &mut R,
    width: AddressWidth,
) -> io::Result<u64> {
    match width {
        AddressWidth::Bits32 => read_address::<B, _>(reader),
        AddressWidth::Bits64 => reader.read_u64::<B>(),
    }
}
