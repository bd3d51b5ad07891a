//! Whole-file `gmon.out` decoding.
//!
//! Two container layouts are understood:
//!
//! - GNU: a 20-byte header starting with the `gmon` cookie, followed by
//!   records each introduced by a one-byte tag (histogram, call-graph arc,
//!   basic-block counts).
//! - BSD: a fixed header (old or 4.4BSD form), the histogram bins, then
//!   call-graph records until end of file.
//!
//! Words are in the profiled program's byte order, and address words are as
//! wide as its pointers.

pub mod histogram;
pub use histogram::Histogram;

use crate::binary::Binary;
use crate::call_graph::{CallGraph, CallGraphDecoder, DecodeStats};
use crate::error::GmonError;
use crate::program::{ProgramContext, SymbolResolver};
use crate::record::{read_address_sized, AddressWidth, RecordFormat};
use byteorder::{ByteOrder, ReadBytesExt, BE, LE};
use std::io::{self, Cursor, Read};
use std::path::Path;

pub const GMON_MAGIC: &[u8; 4] = b"gmon";
pub const GMON_VERSION: u32 = 1;
pub const BSD_GMON_VERSION: u32 = 0x0005_1879;

const GNU_HEADER_LEN: usize = 20;
/// Bytes after the two address words of an old BSD header (`ncnt`).
const BSD_OLD_HEADER_TAIL: u64 = 4;
/// `ncnt`, version, profrate and three spare words.
const BSD_HEADER_TAIL: u64 = 24;

const TAG_TIME_HIST: u8 = 0;
const TAG_CG_ARC: u8 = 1;
const TAG_BB_COUNT: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GmonFormat {
    Gnu,
    Bsd,
}

/// Everything decoded from one `gmon.out`.
#[derive(Debug)]
pub struct GmonProfile<S> {
    pub format: GmonFormat,
    pub version: u32,
    pub histogram: Option<Histogram>,
    pub call_graph: CallGraph<S>,
    pub stats: DecodeStats,
}

/// Decodes `gmon.out` contents against `program`.
pub struct GmonDecoder<'p, P: SymbolResolver> {
    program: &'p P,
    little_endian: bool,
    address_width: AddressWidth,
    context: ProgramContext,
}

impl<'p, P: SymbolResolver> GmonDecoder<'p, P> {
    /// Decoder for a program with 32-bit addresses.
    pub fn new(program: &'p P, little_endian: bool, context: ProgramContext) -> Self {
        Self {
            program,
            little_endian,
            address_width: AddressWidth::Bits32,
            context,
        }
    }

    pub fn with_address_width(mut self, width: AddressWidth) -> Self {
        self.address_width = width;
        self
    }

    pub fn read_file<Q: AsRef<Path>>(self, path: Q) -> Result<GmonProfile<P::Symbol>, GmonError> {
        let data = std::fs::read(path.as_ref())?;
        self.decode(&data)
    }

    pub fn read<R: Read>(self, mut reader: R) -> Result<GmonProfile<P::Symbol>, GmonError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.decode(&data)
    }

    pub fn decode(self, data: &[u8]) -> Result<GmonProfile<P::Symbol>, GmonError> {
        if self.little_endian {
            self.decode_with::<LE>(data)
        } else {
            self.decode_with::<BE>(data)
        }
    }

    fn decode_with<B: ByteOrder>(self, data: &[u8]) -> Result<GmonProfile<P::Symbol>, GmonError> {
        let width = self.address_width;
        let mut decoder = CallGraphDecoder::new(self.program, self.context);
        let mut cur = Cursor::new(data);

        let (format, version, histogram) = if data.starts_with(GMON_MAGIC) {
            let (version, histogram) = read_gnu::<B, P>(&mut cur, &mut decoder, width)?;
            (GmonFormat::Gnu, version, histogram)
        } else {
            let (version, histogram) = read_bsd::<B, P>(&mut cur, &mut decoder, width)?;
            (GmonFormat::Bsd, version, histogram)
        };

        let stats = decoder.stats();
        log::info!(
            "Decoded {:?} gmon.out: {} arcs over {} functions ({} records, {} dropped)",
            format,
            decoder.graph().arc_count(),
            decoder.graph().node_count(),
            stats.records,
            stats.dropped
        );

        Ok(GmonProfile {
            format,
            version,
            histogram,
            call_graph: decoder.into_graph(),
            stats,
        })
    }
}

impl<'p> GmonDecoder<'p, Binary> {
    /// Decoder using the byte order and pointer size of an ELF program.
    pub fn for_binary(binary: &'p Binary, context: ProgramContext) -> Self {
        Self::new(binary, binary.little_endian, context)
            .with_address_width(AddressWidth::for_program(binary.is_64))
    }
}

fn read_gnu<B: ByteOrder, P: SymbolResolver>(
    cur: &mut Cursor<&[u8]>,
    decoder: &mut CallGraphDecoder<'_, P>,
    width: AddressWidth,
) -> Result<(u32, Option<Histogram>), GmonError> {
    let mut header = [0u8; GNU_HEADER_LEN];
    cur.read_exact(&mut header)
        .map_err(GmonError::truncated("header"))?;
    let version = B::read_u32(&header[4..8]);
    if version > GMON_VERSION {
        return Err(GmonError::UnsupportedVersion(version));
    }

    let mut histogram: Option<Histogram> = None;
    loop {
        let offset = cur.position();
        let tag = match cur.read_u8() {
            Ok(tag) => tag,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };

        match tag {
            TAG_TIME_HIST => {
                let hist = Histogram::read_gnu::<B, _>(cur, width)
                    .map_err(GmonError::truncated("histogram"))?;
                match histogram.as_mut() {
                    Some(existing) => existing.merge(hist)?,
                    None => histogram = Some(hist),
                }
            }
            TAG_CG_ARC => decoder
                .decode_call_graph_record_with::<B, _>(cur, RecordFormat::Standard, width)
                .map_err(GmonError::truncated("call-graph"))?,
            TAG_BB_COUNT => skip_basic_blocks::<B>(cur, width)?,
            tag => return Err(GmonError::UnknownTag { tag, offset }),
        }
    }
    Ok((version, histogram))
}

/// Each basic-block entry is an address and an execution count, both
/// address-sized.
fn skip_basic_blocks<B: ByteOrder>(
    cur: &mut Cursor<&[u8]>,
    width: AddressWidth,
) -> Result<(), GmonError> {
    let truncated = GmonError::truncated("basic-block");
    let count = cur.read_u32::<B>().map_err(truncated)?;
    for _ in 0..count {
        read_address_sized::<B, _>(cur, width).map_err(truncated)?;
        read_address_sized::<B, _>(cur, width).map_err(truncated)?;
    }
    log::debug!("Skipped {count} basic-block counts");
    Ok(())
}

fn read_bsd<B: ByteOrder, P: SymbolResolver>(
    cur: &mut Cursor<&[u8]>,
    decoder: &mut CallGraphDecoder<'_, P>,
    width: AddressWidth,
) -> Result<(u32, Option<Histogram>), GmonError> {
    let truncated = GmonError::truncated("BSD header");
    let low_pc = read_address_sized::<B, _>(cur, width).map_err(truncated)?;
    let high_pc = read_address_sized::<B, _>(cur, width).map_err(truncated)?;
    let ncnt = cur.read_u32::<B>().map_err(truncated)? as u64;

    let mut version = 0;
    let mut prof_rate = 0;
    let mut header_len = 2 * width.bytes() + BSD_OLD_HEADER_TAIL;
    let rest = &cur.get_ref()[cur.position() as usize..];
    if rest.len() >= 4 && B::read_u32(&rest[..4]) == BSD_GMON_VERSION {
        version = cur.read_u32::<B>().map_err(truncated)?;
        prof_rate = cur.read_u32::<B>().map_err(truncated)?;
        let mut spare = [0u8; 12];
        cur.read_exact(&mut spare).map_err(truncated)?;
        header_len = 2 * width.bytes() + BSD_HEADER_TAIL;
    }

    let bin_count = ncnt.saturating_sub(header_len) / 2;
    let bins = histogram::read_bins::<B, _>(cur, bin_count as usize)
        .map_err(GmonError::truncated("histogram"))?;
    let histogram = (low_pc < high_pc && !bins.is_empty()).then(|| Histogram {
        low_pc,
        high_pc,
        prof_rate,
        dimension: "seconds".to_string(),
        dimension_abbrev: 's',
        bins,
    });

    decoder.decode_call_graph_records_with::<B, _>(cur, RecordFormat::Bsd, width)?;
    Ok((version, histogram))
}
