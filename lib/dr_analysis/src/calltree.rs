//! Call tree of an application: every resolved call edge, plus the edges
//! the framework is responsible for (application start, component
//! lifecycles), below a single virtual root.

use crate::components::Components;
use crate::hierarchy::Hierarchy;
use crate::resolvers::{callbacks_of, CallEdge, EdgeKind};
use dr_bytecode::MethodDescr;
use petgraph::prelude::*;
use petgraph::visit::{Bfs, Dfs, Reversed};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

const ROOT_ORIGIN: &str = "root";
const LIFECYCLE_ORIGIN: &str = "lifecycle";
const HOSTING_ORIGIN: &str = "hosting";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vertex {
    /// Entry point of the application, calling the main activity.
    Root,
    Method(MethodDescr),
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Root => write!(f, "<root>"),
            Self::Method(m) => m.fmt(f),
        }
    }
}

impl Vertex {
    #[must_use]
    pub const fn method(&self) -> Option<&MethodDescr> {
        match self {
            Self::Root => None,
            Self::Method(m) => Some(m),
        }
    }
}

type Parents = BTreeMap<NodeIndex, Option<NodeIndex>>;

#[derive(Debug)]
pub struct CallTree {
    inner: DiGraph<Vertex, EdgeKind>,
    ids: BTreeMap<MethodDescr, NodeIndex>,
    root: NodeIndex,
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTree {
    #[must_use]
    pub fn new() -> Self {
        let mut inner = DiGraph::new();
        let root = inner.add_node(Vertex::Root);
        Self {
            inner,
            ids: BTreeMap::new(),
            root,
        }
    }

    fn vertex(&mut self, method: &MethodDescr) -> NodeIndex {
        if let Some(id) = self.ids.get(method) {
            return *id;
        }
        let id = self.inner.add_node(Vertex::Method(method.clone()));
        self.ids.insert(method.clone(), id);
        id
    }

    fn node_of(&mut self, vertex: &Vertex) -> NodeIndex {
        match vertex {
            Vertex::Root => self.root,
            Vertex::Method(m) => self.vertex(m),
        }
    }

    fn node_id(&self, vertex: &Vertex) -> Option<NodeIndex> {
        match vertex {
            Vertex::Root => Some(self.root),
            Vertex::Method(m) => self.ids.get(m).copied(),
        }
    }

    fn connect(&mut self, src: NodeIndex, dst: NodeIndex, kind: EdgeKind) -> bool {
        if self
            .inner
            .edges_connecting(src, dst)
            .any(|e| *e.weight() == kind)
        {
            return false;
        }
        self.inner.add_edge(src, dst, kind);
        true
    }

    /// Inserts a call edge. Returns `false` if the very same edge (same kind
    /// included) was already there.
    pub fn add_edge(&mut self, edge: &CallEdge) -> bool {
        let src = self.vertex(&edge.source);
        let dst = self.vertex(&edge.target);
        self.connect(src, dst, edge.kind)
    }

    /// Calls the given method (the main activity constructor) from the root.
    pub fn add_root_edge(&mut self, target: &MethodDescr) {
        let dst = self.vertex(target);
        self.connect(self.root, dst, EdgeKind::Synthetic(ROOT_ORIGIN));
    }

    /// Links each component constructor to the lifecycle callbacks its class
    /// declares or inherits, and each activity constructor to the
    /// constructors of the fragments it hosts. Returns the number of new
    /// edges.
    pub fn add_lifecycle_edges(&mut self, hierarchy: &Hierarchy, components: &Components) -> usize {
        let mut nb = 0;
        for component in components.snapshot() {
            let src = self.vertex(component.constructor());
            let callbacks = callbacks_of(
                hierarchy,
                component.name(),
                component.type_().lifecycle_callbacks(),
            );
            for callback in callbacks {
                let dst = self.vertex(&callback);
                if self.connect(src, dst, EdgeKind::Synthetic(LIFECYCLE_ORIGIN)) {
                    nb += 1;
                }
            }
            for fragment in component.fragments() {
                let Some(fragment) = components.read(fragment) else {
                    continue;
                };
                let dst = self.vertex(fragment.constructor());
                if self.connect(src, dst, EdgeKind::Synthetic(HOSTING_ORIGIN)) {
                    nb += 1;
                }
            }
        }
        nb
    }

    #[must_use]
    pub fn contains(&self, method: &MethodDescr) -> bool {
        self.ids.contains_key(method)
    }

    pub fn nb_vertices(&self) -> usize {
        self.inner.node_count()
    }

    pub fn nb_edges(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn nb_edges_of(&self, kind: EdgeKind) -> usize {
        self.inner.edge_weights().filter(|k| **k == kind).count()
    }

    pub fn nb_synthetic_edges(&self) -> usize {
        self.inner
            .edge_weights()
            .filter(|k| matches!(k, EdgeKind::Synthetic(_)))
            .count()
    }

    /// All the edges, as (caller, callee, kind).
    pub fn edges(&self) -> impl Iterator<Item = (&Vertex, &Vertex, EdgeKind)> {
        self.inner.edge_references().map(|e| {
            (
                &self.inner[e.source()],
                &self.inner[e.target()],
                *e.weight(),
            )
        })
    }

    /// Kinds of the edges going from a vertex to another.
    pub fn edge_kinds(&self, src: &Vertex, dst: &Vertex) -> Vec<EdgeKind> {
        let (Some(src), Some(dst)) = (self.node_id(src), self.node_id(dst)) else {
            return Vec::new();
        };
        self.inner
            .edges_connecting(src, dst)
            .map(|e| *e.weight())
            .collect()
    }

    fn neighbors(&self, method: &MethodDescr, dir: Direction) -> Vec<(&Vertex, EdgeKind)> {
        let Some(id) = self.ids.get(method) else {
            return Vec::new();
        };
        self.inner
            .edges_directed(*id, dir)
            .map(|e| {
                let other = if dir == Outgoing { e.target() } else { e.source() };
                (&self.inner[other], *e.weight())
            })
            .collect()
    }

    /// Callees of a method.
    pub fn outgoing(&self, method: &MethodDescr) -> Vec<(&Vertex, EdgeKind)> {
        self.neighbors(method, Outgoing)
    }

    /// Callers of a method (the root included).
    pub fn incoming(&self, method: &MethodDescr) -> Vec<(&Vertex, EdgeKind)> {
        self.neighbors(method, Incoming)
    }

    /// First method matching the predicate, searched breadth-first from the
    /// root, then among the methods unreachable from the root.
    pub fn find<P>(&self, predicate: P) -> Option<&MethodDescr>
    where
        P: Fn(&MethodDescr) -> bool,
    {
        let mut seen = BTreeSet::new();
        let mut bfs = Bfs::new(&self.inner, self.root);
        while let Some(id) = bfs.next(&self.inner) {
            seen.insert(id);
            if let Some(m) = self.inner[id].method().filter(|m| predicate(m)) {
                return Some(m);
            }
        }
        self.inner
            .node_indices()
            .filter(|id| !seen.contains(id))
            .filter_map(|id| self.inner[id].method())
            .find(|m| predicate(m))
    }

    /// Sub-tree made of the vertices from which a method matching the
    /// predicate can be reached.
    #[must_use]
    pub fn filter<P>(&self, predicate: P) -> Self
    where
        P: Fn(&MethodDescr) -> bool,
    {
        let mut keep = BTreeSet::new();
        let reversed = Reversed(&self.inner);
        let mut dfs = Dfs::empty(reversed);
        for id in self.inner.node_indices() {
            if self.inner[id].method().is_some_and(|m| predicate(m)) {
                dfs.move_to(id);
                while let Some(keep_id) = dfs.next(reversed) {
                    keep.insert(keep_id);
                }
            }
        }

        let mut res = Self::new();
        for id in &keep {
            res.node_of(&self.inner[*id]);
        }
        for e in self.inner.edge_references() {
            if keep.contains(&e.source()) && keep.contains(&e.target()) {
                let src = res.node_of(&self.inner[e.source()]);
                let dst = res.node_of(&self.inner[e.target()]);
                res.connect(src, dst, *e.weight());
            }
        }
        res
    }

    /// Methods reachable from the root.
    pub fn reachable_from_root(&self) -> BTreeSet<&MethodDescr> {
        let mut res = BTreeSet::new();
        let mut bfs = Bfs::new(&self.inner, self.root);
        while let Some(id) = bfs.next(&self.inner) {
            if let Some(m) = self.inner[id].method() {
                res.insert(m);
            }
        }
        res
    }

    /// Shortest call chain between two methods, both ends included.
    pub fn shortest_path(&self, src: &MethodDescr, dst: &MethodDescr) -> Option<Vec<&Vertex>> {
        let path = self.path_between(*self.ids.get(src)?, *self.ids.get(dst)?)?;
        Some(self.vertices(&path))
    }

    /// Shortest call chain from the root to a method, root included.
    pub fn shortest_path_from_root(&self, dst: &MethodDescr) -> Option<Vec<&Vertex>> {
        let path = self.path_between(self.root, *self.ids.get(dst)?)?;
        Some(self.vertices(&path))
    }

    /// Shortest call chain from the root going through each waypoint in
    /// order. No partial chain is returned if one of the segments is
    /// unreachable.
    pub fn shortest_path_through(&self, waypoints: &[MethodDescr]) -> Option<Vec<&Vertex>> {
        let mut path = vec![self.root];
        for waypoint in waypoints {
            let Some(dst) = self.ids.get(waypoint) else {
                log::debug!("{waypoint} is not part of the call tree");
                return None;
            };
            let current = *path.last()?;
            let Some(segment) = self.path_between(current, *dst) else {
                log::debug!("no path from {} to {waypoint}", self.inner[current]);
                return None;
            };
            path.extend(segment.into_iter().skip(1));
        }
        Some(self.vertices(&path))
    }

    /// Number of calls of the shortest chain between two methods.
    pub fn distance(&self, src: &MethodDescr, dst: &MethodDescr) -> Option<usize> {
        self.path_between(*self.ids.get(src)?, *self.ids.get(dst)?)
            .map(|p| p.len() - 1)
    }

    fn vertices(&self, path: &[NodeIndex]) -> Vec<&Vertex> {
        path.iter().map(|id| &self.inner[*id]).collect()
    }

    // Bidirectional breadth-first search, one full level at a time on the
    // smallest frontier: the first meeting vertex lies on a shortest path.
    fn path_between(&self, src: NodeIndex, dst: NodeIndex) -> Option<Vec<NodeIndex>> {
        if src == dst {
            return Some(vec![src]);
        }
        let mut forward: Parents = BTreeMap::from([(src, None)]);
        let mut backward: Parents = BTreeMap::from([(dst, None)]);
        let mut fqueue = VecDeque::from([src]);
        let mut bqueue = VecDeque::from([dst]);

        while !fqueue.is_empty() && !bqueue.is_empty() {
            let meet = if fqueue.len() <= bqueue.len() {
                self.expand(&mut fqueue, &mut forward, &backward, Outgoing)
            } else {
                self.expand(&mut bqueue, &mut backward, &forward, Incoming)
            };
            if let Some(meet) = meet {
                let mut path = unwind(&forward, meet);
                path.reverse();
                path.extend(unwind(&backward, meet).into_iter().skip(1));
                return Some(path);
            }
        }
        None
    }

    fn expand(
        &self,
        queue: &mut VecDeque<NodeIndex>,
        parents: &mut Parents,
        other: &Parents,
        dir: Direction,
    ) -> Option<NodeIndex> {
        for _ in 0..queue.len() {
            let Some(id) = queue.pop_front() else {
                break;
            };
            for next in self.inner.neighbors_directed(id, dir) {
                if parents.contains_key(&next) {
                    continue;
                }
                parents.insert(next, Some(id));
                if other.contains_key(&next) {
                    return Some(next);
                }
                queue.push_back(next);
            }
        }
        None
    }
}

fn unwind(parents: &Parents, from: NodeIndex) -> Vec<NodeIndex> {
    let mut path = vec![from];
    let mut current = from;
    while let Some(Some(parent)) = parents.get(&current) {
        path.push(*parent);
        current = *parent;
    }
    path
}
