use crate::error::GmonError;
use crate::record::{read_address_sized, AddressWidth};
use byteorder::{ByteOrder, ReadBytesExt};
use std::io;

/// PC-sampling histogram: `bins` evenly split `[low_pc, high_pc)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    pub low_pc: u64,
    pub high_pc: u64,
    /// Samples per second; 0 when the file does not say.
    pub prof_rate: u32,
    pub dimension: String,
    pub dimension_abbrev: char,
    pub bins: Vec<u16>,
}

impl Histogram {
    /// Reads a GNU histogram record body (after the tag byte).
    pub(crate) fn read_gnu<B: ByteOrder, R: io::Read>(
        reader: &mut R,
        width: AddressWidth,
    ) -> io::Result<Self> {
        let low_pc = read_address_sized::<B, _>(reader, width)?;
        let high_pc = read_address_sized::<B, _>(reader, width)?;
        let hist_size = reader.read_u32::<B>()?;
        let prof_rate = reader.read_u32::<B>()?;

        let mut dimen = [0u8; 15];
        reader.read_exact(&mut dimen)?;
        let dimen_len = dimen.iter().position(|&b| b == 0).unwrap_or(dimen.len());
        let dimension = String::from_utf8_lossy(&dimen[..dimen_len]).into_owned();
        let dimension_abbrev = reader.read_u8()? as char;

        let bins = read_bins::<B, _>(reader, hist_size as usize)?;
        Ok(Self {
            low_pc,
            high_pc,
            prof_rate,
            dimension,
            dimension_abbrev,
            bins,
        })
    }

    /// Adds the bins of another histogram covering the same range.
    pub fn merge(&mut self, other: Histogram) -> Result<(), GmonError> {
        if self.low_pc != other.low_pc
            || self.high_pc != other.high_pc
            || self.bins.len() != other.bins.len()
        {
            return Err(GmonError::HistogramMismatch(format!(
                "[{:#x}, {:#x}) x{} vs [{:#x}, {:#x}) x{}",
                self.low_pc,
                self.high_pc,
                self.bins.len(),
                other.low_pc,
                other.high_pc,
                other.bins.len()
            )));
        }
        for (bin, add) in self.bins.iter_mut().zip(other.bins) {
            *bin = bin.saturating_add(add);
        }
        Ok(())
    }

    /// Start address of bin `i`.
    pub fn bin_address(&self, i: usize) -> u64 {
        let span = self.high_pc.saturating_sub(self.low_pc) as u128;
        let n = self.bins.len().max(1) as u128;
        self.low_pc + (i as u128 * span / n) as u64
    }

    /// Samples whose bin starts inside `[start, end)`.
    pub fn samples_in(&self, start: u64, end: u64) -> u64 {
        self.bins
            .iter()
            .enumerate()
            .filter(|&(i, _)| {
                let addr = self.bin_address(i);
                start <= addr && addr < end
            })
            .map(|(_, &b)| b as u64)
            .sum()
    }

    pub fn total(&self) -> u64 {
        self.bins.iter().map(|&b| b as u64).sum()
    }

    /// Share of all samples falling in `[start, end)`, in percent.
    pub fn percent_in(&self, start: u64, end: u64) -> f32 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        100.0 * self.samples_in(start, end) as f32 / total as f32
    }
}

pub(crate) fn read_bins<B: ByteOrder, R: io::Read>(
    reader: &mut R,
    count: usize,
) -> io::Result<Vec<u16>> {
    let mut bins = Vec::with_capacity(count.min(1 << 20));
    for _ in 0..count {
        bins.push(reader.read_u16::<B>()?);
    }
    Ok(bins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{WriteBytesExt, LE};
    use std::io::Cursor;

    fn hist(bins: Vec<u16>) -> Histogram {
        Histogram {
            low_pc: 0x1000,
            high_pc: 0x1000 + 4 * bins.len() as u64,
            prof_rate: 100,
            dimension: "seconds".into(),
            dimension_abbrev: 's',
            bins,
        }
    }

    #[test]
    fn reads_gnu_record() {
        let mut data = Vec::new();
        data.write_u32::<LE>(0x1000).unwrap();
        data.write_u32::<LE>(0x1008).unwrap();
        data.write_u32::<LE>(2).unwrap();
        data.write_u32::<LE>(100).unwrap();
        data.extend_from_slice(b"seconds\0\0\0\0\0\0\0\0");
        data.push(b's');
        data.write_u16::<LE>(7).unwrap();
        data.write_u16::<LE>(9).unwrap();

        let h =
            Histogram::read_gnu::<LE, _>(&mut Cursor::new(data), AddressWidth::Bits32).unwrap();
        assert_eq!(h, hist(vec![7, 9]));
    }

    #[test]
    fn reads_gnu_record_with_wide_pcs() {
        let mut data = Vec::new();
        data.write_u64::<LE>(0x40_1000).unwrap();
        data.write_u64::<LE>(0x40_1008).unwrap();
        data.write_u32::<LE>(1).unwrap();
        data.write_u32::<LE>(100).unwrap();
        data.extend_from_slice(b"seconds\0\0\0\0\0\0\0\0");
        data.push(b's');
        data.write_u16::<LE>(4).unwrap();

        let h =
            Histogram::read_gnu::<LE, _>(&mut Cursor::new(data), AddressWidth::Bits64).unwrap();
        assert_eq!((h.low_pc, h.high_pc, h.bins), (0x40_1000, 0x40_1008, vec![4]));
    }

    #[test]
    fn samples_by_range() {
        let h = hist(vec![1, 2, 3, 4]);
        assert_eq!(h.total(), 10);
        assert_eq!(h.samples_in(0x1004, 0x100c), 5);
        assert_eq!(h.samples_in(0x2000, 0x3000), 0);
        assert!((h.percent_in(0x1000, 0x1004) - 10.0).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_histogram_has_zero_percent() {
        assert_eq!(hist(vec![0, 0]).percent_in(0x1000, 0x1008), 0.0);
    }

    #[test]
    fn merge_requires_same_shape() {
        let mut h = hist(vec![1, 2]);
        h.merge(hist(vec![3, u16::MAX])).unwrap();
        assert_eq!(h.bins, vec![4, u16::MAX]);
        assert!(h.merge(hist(vec![1, 2, 3])).is_err());
    }
}
