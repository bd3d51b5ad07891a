pub mod decoder;
pub use decoder::*;

use crate::program::{Address, ProgramContext, SourceLocation};
use indexmap::map::Entry;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Index of a node in its [`CallGraph`]. Node ids follow registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Index of an arc in its [`CallGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArcId(pub usize);

/// One function of the profiled program.
#[derive(Debug, Clone)]
pub struct CallGraphNode<S> {
    symbol: S,
    children: Vec<ArcId>,
    parents: Vec<ArcId>,
}

impl<S> CallGraphNode<S> {
    fn new(symbol: S) -> Self {
        Self {
            symbol,
            children: Vec::new(),
            parents: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &S {
        &self.symbol
    }

    /// Outgoing arcs, in creation order.
    pub fn children(&self) -> &[ArcId] {
        &self.children
    }

    /// Incoming arcs, in creation order.
    pub fn parents(&self) -> &[ArcId] {
        &self.parents
    }
}

/// All calls observed from one function to another.
#[derive(Debug, Clone)]
pub struct CallGraphArc {
    pub parent: NodeId,
    pub child: NodeId,
    /// Sum of the counts of every record for this caller/callee pair.
    pub count: i64,
    /// Call-site address of the first record that created the arc.
    pub parent_address: Address,
    pub parent_location: Option<SourceLocation>,
    pub context: Arc<ProgramContext>,
}

/// Receives every node of a finished graph, e.g. to build a view tree.
pub trait CallGraphSink<S> {
    fn add_call_graph_node(&mut self, graph: &CallGraph<S>, node: &CallGraphNode<S>);
}

/// Caller/callee multigraph keyed by symbol.
///
/// Holds at most one node per symbol and one arc per (parent, child) pair.
/// Nodes and arcs live in arenas and refer to each other by index.
#[derive(Debug, Clone)]
pub struct CallGraph<S> {
    nodes: IndexMap<S, CallGraphNode<S>>,
    arcs: Vec<CallGraphArc>,
    arc_index: HashMap<(NodeId, NodeId), ArcId>,
    context: Arc<ProgramContext>,
}

impl<S: Clone + Eq + Hash> Default for CallGraph<S> {
    fn default() -> Self {
        Self::new(ProgramContext::default())
    }
}

impl<S: Clone + Eq + Hash> CallGraph<S> {
    pub fn new(context: ProgramContext) -> Self {
        Self {
            nodes: IndexMap::new(),
            arcs: Vec::new(),
            arc_index: HashMap::new(),
            context: Arc::new(context),
        }
    }

    pub fn context(&self) -> &ProgramContext {
        &self.context
    }

    fn node_id_or_insert(&mut self, symbol: S) -> NodeId {
        match self.nodes.entry(symbol) {
            Entry::Occupied(o) => NodeId(o.index()),
            Entry::Vacant(v) => {
                let id = NodeId(v.index());
                let node = CallGraphNode::new(v.key().clone());
                v.insert(node);
                id
            }
        }
    }

    /// Records `count` calls from `parent` to `child`.
    ///
    /// Creates missing nodes, then either creates the arc or adds `count` to
    /// the existing one. Returns the arc and whether it was just created.
    pub fn add_call_arc(
        &mut self,
        parent: S,
        parent_address: Address,
        child: S,
        count: i64,
    ) -> (ArcId, bool) {
        let parent_id = self.node_id_or_insert(parent);
        let child_id = self.node_id_or_insert(child);

        if let Some(&arc_id) = self.arc_index.get(&(parent_id, child_id)) {
            let arc = &mut self.arcs[arc_id.0];
            arc.count = arc.count.saturating_add(count);
            return (arc_id, false);
        }

        let arc_id = ArcId(self.arcs.len());
        self.arcs.push(CallGraphArc {
            parent: parent_id,
            child: child_id,
            count,
            parent_address,
            parent_location: None,
            context: Arc::clone(&self.context),
        });
        self.arc_index.insert((parent_id, child_id), arc_id);
        self.nodes[parent_id.0].children.push(arc_id);
        self.nodes[child_id.0].parents.push(arc_id);
        (arc_id, true)
    }

    pub(crate) fn arc_mut(&mut self, id: ArcId) -> &mut CallGraphArc {
        &mut self.arcs[id.0]
    }

    /// Live view of the registry, symbol to node, in insertion order.
    pub fn get_nodes(&self) -> &IndexMap<S, CallGraphNode<S>> {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &CallGraphNode<S> {
        &self.nodes[id.0]
    }

    pub fn node_id(&self, symbol: &S) -> Option<NodeId> {
        self.nodes.get_index_of(symbol).map(NodeId)
    }

    pub fn node_by_symbol(&self, symbol: &S) -> Option<&CallGraphNode<S>> {
        self.nodes.get(symbol)
    }

    pub fn arc(&self, id: ArcId) -> &CallGraphArc {
        &self.arcs[id.0]
    }

    pub fn find_arc(&self, parent: &S, child: &S) -> Option<&CallGraphArc> {
        let key = (self.node_id(parent)?, self.node_id(child)?);
        self.arc_index.get(&key).map(|id| &self.arcs[id.0])
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &CallGraphNode<S>)> {
        self.nodes.values().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn arcs(&self) -> impl Iterator<Item = &CallGraphArc> {
        self.arcs.iter()
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &CallGraphArc> {
        self.nodes[id.0].children.iter().map(|a| &self.arcs[a.0])
    }

    pub fn parents(&self, id: NodeId) -> impl Iterator<Item = &CallGraphArc> {
        self.nodes[id.0].parents.iter().map(|a| &self.arcs[a.0])
    }

    /// Total calls received by a node across all of its callers.
    pub fn calls_to(&self, id: NodeId) -> i64 {
        self.parents(id)
            .fold(0i64, |acc, arc| acc.saturating_add(arc.count))
    }

    /// Hands every node to `sink` once, in registry order.
    pub fn populate<K: CallGraphSink<S> + ?Sized>(&self, sink: &mut K) {
        for node in self.nodes.values() {
            sink.add_call_graph_node(self, node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> CallGraph<&'static str> {
        CallGraph::new(ProgramContext::new("a.out").with_project("demo"))
    }

    #[test]
    fn repeated_pair_accumulates_into_one_arc() {
        let mut g = graph();
        let (first, created) = g.add_call_arc("a", Address(0x10), "b", 3);
        assert!(created);
        g.add_call_arc("c", Address(0x30), "d", 5);
        let (again, created) = g.add_call_arc("a", Address(0x14), "b", 7);
        assert!(!created);
        assert_eq!(first, again);

        assert_eq!(g.arc_count(), 2);
        let ab = g.find_arc(&"a", &"b").unwrap();
        assert_eq!(ab.count, 10);
        assert_eq!(ab.parent_address, Address(0x10));
        assert_eq!(g.find_arc(&"c", &"d").unwrap().count, 5);
    }

    #[test]
    fn arc_is_shared_by_both_endpoints() {
        let mut g = graph();
        let (arc, _) = g.add_call_arc("main", Address(1), "foo", 1);
        let main = g.node_id(&"main").unwrap();
        let foo = g.node_id(&"foo").unwrap();

        assert_eq!(g.node(main).children(), &[arc]);
        assert_eq!(g.node(foo).parents(), &[arc]);
        assert!(g.node(main).parents().is_empty());
        assert_eq!(g.arc(arc).parent, main);
        assert_eq!(g.arc(arc).child, foo);
    }

    #[test]
    fn recursion_creates_self_arc_on_single_node() {
        let mut g = graph();
        g.add_call_arc("fib", Address(0x40), "fib", 2);
        g.add_call_arc("fib", Address(0x40), "fib", 2);
        assert_eq!(g.node_count(), 1);
        let fib = g.node_id(&"fib").unwrap();
        assert_eq!(g.node(fib).children().len(), 1);
        assert_eq!(g.node(fib).parents().len(), 1);
        assert_eq!(g.calls_to(fib), 4);
    }

    #[test]
    fn arcs_carry_the_graph_context() {
        let mut g = graph();
        g.add_call_arc("a", Address(0), "b", 1);
        let arc = g.arcs().next().unwrap();
        assert_eq!(arc.context.project.as_deref(), Some("demo"));
        assert!(Arc::ptr_eq(&arc.context, &g.context));
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        let mut g = graph();
        g.add_call_arc("a", Address(0), "b", i64::MAX);
        g.add_call_arc("a", Address(0), "b", 1);
        assert_eq!(g.find_arc(&"a", &"b").unwrap().count, i64::MAX);
    }

    struct Collect(Vec<&'static str>);

    impl CallGraphSink<&'static str> for Collect {
        fn add_call_graph_node(
            &mut self,
            _graph: &CallGraph<&'static str>,
            node: &CallGraphNode<&'static str>,
        ) {
            self.0.push(*node.symbol());
        }
    }

    #[test]
    fn populate_visits_each_node_once_in_insertion_order() {
        let mut g = graph();
        g.add_call_arc("main", Address(0), "foo", 1);
        g.add_call_arc("bar", Address(0), "foo", 1);
        g.add_call_arc("main", Address(0), "bar", 1);

        let mut sink = Collect(Vec::new());
        g.populate(&mut sink);
        assert_eq!(sink.0, vec!["main", "foo", "bar"]);
    }

    struct Calls(Vec<(&'static str, i64)>);

    impl CallGraphSink<&'static str> for Calls {
        fn add_call_graph_node(
            &mut self,
            graph: &CallGraph<&'static str>,
            node: &CallGraphNode<&'static str>,
        ) {
            let calls = graph
                .node_id(node.symbol())
                .map_or(0, |id| graph.calls_to(id));
            self.0.push((*node.symbol(), calls));
        }
    }

    #[test]
    fn sink_sees_calls_summed_over_all_callers() {
        let mut g = graph();
        g.add_call_arc("main", Address(0), "foo", 2);
        g.add_call_arc("bar", Address(0), "foo", 5);
        g.add_call_arc("main", Address(4), "foo", 1);
        g.add_call_arc("main", Address(0), "bar", 1);

        let mut sink = Calls(Vec::new());
        g.populate(&mut sink);
        assert_eq!(sink.0, vec![("main", 0), ("foo", 8), ("bar", 1)]);
    }
}
