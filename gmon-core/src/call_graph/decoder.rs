use super::{CallGraph, CallGraphNode, CallGraphSink};
use crate::program::{Address, ProgramContext, SymbolResolver};
use crate::record::{AddressWidth, CallGraphRecord, RecordFormat};
use byteorder::{ByteOrder, BE};
use indexmap::IndexMap;
use std::io;

/// Record counters for one decoding session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Complete records read.
    pub records: u64,
    /// Records discarded because an address had no symbol.
    pub dropped: u64,
}

/// Builds a [`CallGraph`] from call-graph records, resolving addresses
/// through `program`. One decoder per profile; it is not meant to be shared
/// across threads.
pub struct CallGraphDecoder<'p, P: SymbolResolver> {
    program: &'p P,
    graph: CallGraph<P::Symbol>,
    stats: DecodeStats,
}

impl<'p, P: SymbolResolver> CallGraphDecoder<'p, P> {
    pub fn new(program: &'p P, context: ProgramContext) -> Self {
        Self {
            program,
            graph: CallGraph::new(context),
            stats: DecodeStats::default(),
        }
    }

    /// Decodes one big-endian record from `stream`.
    pub fn decode_call_graph_record<R: io::Read>(
        &mut self,
        stream: &mut R,
        format: RecordFormat,
    ) -> io::Result<()> {
        self.decode_call_graph_record_with::<BE, R>(stream, format, AddressWidth::Bits32)
    }

    /// Decodes one record in byte order `B` with `width`-wide addresses.
    ///
    /// A record whose caller or callee does not resolve to a symbol leaves
    /// the graph untouched.
    pub fn decode_call_graph_record_with<B: ByteOrder, R: io::Read>(
        &mut self,
        stream: &mut R,
        format: RecordFormat,
        width: AddressWidth,
    ) -> io::Result<()> {
        let record = CallGraphRecord::read_sized::<B, R>(stream, format, width)?;
        self.stats.records += 1;
        self.add_record(record);
        Ok(())
    }

    /// Decodes records until the stream is exhausted on a record boundary.
    /// Returns how many records were read.
    pub fn decode_call_graph_records<R: io::Read>(
        &mut self,
        stream: &mut R,
        format: RecordFormat,
    ) -> io::Result<u64> {
        self.decode_call_graph_records_with::<BE, R>(stream, format, AddressWidth::Bits32)
    }

    pub fn decode_call_graph_records_with<B: ByteOrder, R: io::Read>(
        &mut self,
        stream: &mut R,
        format: RecordFormat,
        width: AddressWidth,
    ) -> io::Result<u64> {
        let before = self.stats.records;
        loop {
            match self.decode_call_graph_record_with::<B, R>(stream, format, width) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
        }
        let read = self.stats.records - before;
        log::debug!(
            "Decoded {} call-graph records ({} dropped so far)",
            read,
            self.stats.dropped
        );
        Ok(read)
    }

    fn add_record(&mut self, record: CallGraphRecord) {
        let parent_address = self.program.create_address(record.from_pc);
        let child_address = self.program.create_address(record.self_pc);

        let parent = self.program.symbol_at(parent_address);
        let child = self.program.symbol_at(child_address);
        let (Some(parent), Some(child)) = (parent, child) else {
            log::trace!(
                "Dropping arc {} -> {}: no symbol",
                parent_address,
                child_address
            );
            self.stats.dropped += 1;
            return;
        };

        self.add_call_arc(parent, parent_address, child, record.count);
    }

    /// Adds `count` calls from `parent` to `child`, creating nodes and the
    /// arc as needed. Order of calls does not affect the final counts.
    pub fn add_call_arc(
        &mut self,
        parent: P::Symbol,
        parent_address: Address,
        child: P::Symbol,
        count: i64,
    ) {
        let (arc, created) = self
            .graph
            .add_call_arc(parent, parent_address, child, count);
        if created {
            self.graph.arc_mut(arc).parent_location = self.program.source_location(parent_address);
        }
    }

    /// Live view of the node registry.
    pub fn get_nodes(&self) -> &IndexMap<P::Symbol, CallGraphNode<P::Symbol>> {
        self.graph.get_nodes()
    }

    pub fn graph(&self) -> &CallGraph<P::Symbol> {
        &self.graph
    }

    pub fn into_graph(self) -> CallGraph<P::Symbol> {
        self.graph
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    pub fn populate<K: CallGraphSink<P::Symbol> + ?Sized>(&self, sink: &mut K) {
        self.graph.populate(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{AddressFactory, SourceLocation};
    use std::io::Cursor;

    struct Stub;

    impl AddressFactory for Stub {}

    impl SymbolResolver for Stub {
        type Symbol = &'static str;

        fn symbol_at(&self, addr: Address) -> Option<&'static str> {
            match addr.0 {
                0x1000..=0x10ff => Some("main"),
                0x2000 => Some("foo"),
                _ => None,
            }
        }

        fn source_location(&self, addr: Address) -> Option<SourceLocation> {
            Some(SourceLocation {
                path: "main.c".into(),
                line: (addr.0 & 0xff) as u32,
            })
        }
    }

    fn encode(records: &[(u32, u32, i32)]) -> Vec<u8> {
        let mut out = Vec::new();
        for &(from, to, count) in records {
            out.extend_from_slice(&from.to_be_bytes());
            out.extend_from_slice(&to.to_be_bytes());
            out.extend_from_slice(&count.to_be_bytes());
        }
        out
    }

    #[test]
    fn unresolved_record_changes_nothing() {
        let mut dec = CallGraphDecoder::new(&Stub, ProgramContext::default());
        let data = encode(&[(0x1000, 0x2000, 1), (0x9999, 0x2000, 4), (0x1000, 0x7777, 4)]);
        let mut cur = Cursor::new(data);

        dec.decode_call_graph_record(&mut cur, RecordFormat::Standard)
            .unwrap();
        let (nodes, arcs) = (dec.graph().node_count(), dec.graph().arc_count());

        dec.decode_call_graph_record(&mut cur, RecordFormat::Standard)
            .unwrap();
        dec.decode_call_graph_record(&mut cur, RecordFormat::Standard)
            .unwrap();
        assert_eq!(dec.graph().node_count(), nodes);
        assert_eq!(dec.graph().arc_count(), arcs);
        assert_eq!(dec.graph().find_arc(&"main", &"foo").unwrap().count, 1);
        assert_eq!(
            dec.stats(),
            DecodeStats {
                records: 3,
                dropped: 2
            }
        );
    }

    #[test]
    fn call_site_location_comes_from_first_record() {
        let mut dec = CallGraphDecoder::new(&Stub, ProgramContext::default());
        let data = encode(&[(0x1010, 0x2000, 1), (0x1020, 0x2000, 1)]);
        dec.decode_call_graph_records(&mut Cursor::new(data), RecordFormat::Standard)
            .unwrap();

        let arc = dec.graph().find_arc(&"main", &"foo").unwrap();
        assert_eq!(arc.count, 2);
        assert_eq!(arc.parent_address, Address(0x1010));
        assert_eq!(arc.parent_location.as_ref().map(|l| l.line), Some(0x10));
    }

    #[test]
    fn loop_stops_at_end_of_stream() {
        let mut dec = CallGraphDecoder::new(&Stub, ProgramContext::default());
        let mut data = encode(&[(0x1000, 0x2000, 1), (0x1000, 0x2000, 2)]);
        // trailing partial record
        data.extend_from_slice(&[0, 0, 0x10]);
        let read = dec
            .decode_call_graph_records(&mut Cursor::new(data), RecordFormat::Standard)
            .unwrap();
        assert_eq!(read, 2);
        assert_eq!(dec.get_nodes().len(), 2);
    }

    #[test]
    fn single_record_on_empty_stream_is_io_error() {
        let mut dec = CallGraphDecoder::new(&Stub, ProgramContext::default());
        let err = dec
            .decode_call_graph_record(&mut Cursor::new(Vec::new()), RecordFormat::Bsd)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(dec.stats().records, 0);
    }
}
