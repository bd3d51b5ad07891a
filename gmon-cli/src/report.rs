use gmon_core::{Binary, CallGraph, CallGraphNode, CallGraphSink, Histogram, SymbolId};
use serde::Serialize;
use tabled::Tabled;

#[derive(Debug, Serialize, Tabled)]
pub struct FunctionRow {
    pub function: String,
    #[tabled(rename = "%time")]
    #[serde(skip)]
    pub time: String,
    #[tabled(skip)]
    pub percent: f32,
    pub samples: u64,
    pub calls: i64,
    pub callers: usize,
    pub callees: usize,
}

#[derive(Debug, Serialize, Tabled)]
pub struct ArcRow {
    pub caller: String,
    pub callee: String,
    pub calls: i64,
    #[tabled(rename = "call site")]
    pub call_site: String,
}

/// Flat rows built from a decoded call graph: one per function, one per arc.
pub struct CallGraphReport<'a> {
    binary: &'a Binary,
    histogram: Option<&'a Histogram>,
    pub functions: Vec<FunctionRow>,
    pub arcs: Vec<ArcRow>,
}

impl<'a> CallGraphReport<'a> {
    pub fn new(binary: &'a Binary, histogram: Option<&'a Histogram>) -> Self {
        Self {
            binary,
            histogram,
            functions: Vec::new(),
            arcs: Vec::new(),
        }
    }

    /// Orders functions by samples, then by calls received.
    pub fn finish(mut self) -> Self {
        self.functions
            .sort_by(|a, b| b.samples.cmp(&a.samples).then(b.calls.cmp(&a.calls)));
        self
    }
}

impl CallGraphSink<SymbolId> for CallGraphReport<'_> {
    fn add_call_graph_node(&mut self, graph: &CallGraph<SymbolId>, node: &CallGraphNode<SymbolId>) {
        let name = self.binary.symbol_name(*node.symbol()).to_string();

        let (samples, percent) = match (self.histogram, self.binary.function(*node.symbol())) {
            (Some(hist), Some(func)) => (
                hist.samples_in(func.start, func.end),
                hist.percent_in(func.start, func.end),
            ),
            _ => (0, 0.0),
        };
        let calls = graph
            .node_id(node.symbol())
            .map_or(0, |id| graph.calls_to(id));

        self.functions.push(FunctionRow {
            function: name.clone(),
            time: format!("{percent:.2}"),
            percent,
            samples,
            calls,
            callers: node.parents().len(),
            callees: node.children().len(),
        });

        for id in node.children() {
            let arc = graph.arc(*id);
            let callee = graph.node(arc.child).symbol();
            let call_site = match &arc.parent_location {
                Some(loc) => format!("{}:{}", loc.path, loc.line),
                None => arc.parent_address.to_string(),
            };
            self.arcs.push(ArcRow {
                caller: name.clone(),
                callee: self.binary.symbol_name(*callee).to_string(),
                calls: arc.count,
                call_site,
            });
        }
    }
}
