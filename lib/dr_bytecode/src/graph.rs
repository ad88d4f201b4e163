//! Per-method instruction graph.
//!
//! Nodes are instructions, indexed from 0 in method order, and an edge
//! `a -> b` states that `b` may execute right after `a`. The disassembler
//! computes this relation (fallthrough, branches, switches and exception
//! handlers); the analyses only walk it backward through predecessors.

use crate::errors::{BytecodeError, BytecodeResult};
use crate::instrs::Instr;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw serialized form of an instruction graph.
///
/// When `predecessors` is missing, instructions are considered as
/// straight-line code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCode {
    pub instructions: Vec<Instr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predecessors: Option<Vec<Vec<usize>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "RawCode", into = "RawCode")]
pub struct InstrGraph {
    inner: DiGraph<Instr, ()>,
}

impl TryFrom<RawCode> for InstrGraph {
    type Error = BytecodeError;

    fn try_from(raw: RawCode) -> BytecodeResult<Self> {
        match raw.predecessors {
            None => Ok(Self::sequential(raw.instructions)),
            Some(preds) => Self::from_predecessors(raw.instructions, preds),
        }
    }
}

impl From<InstrGraph> for RawCode {
    fn from(graph: InstrGraph) -> Self {
        let predecessors = (0..graph.len())
            .map(|i| graph.predecessors(i).collect())
            .collect();
        Self {
            instructions: graph.inner.node_weights().cloned().collect(),
            predecessors: Some(predecessors),
        }
    }
}

impl fmt::Display for InstrGraph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, instr) in self.iter() {
            writeln!(f, "{i:5}: {instr}")?;
        }
        Ok(())
    }
}

impl InstrGraph {
    /// Builds the graph of straight-line code: each instruction has the
    /// previous one as unique predecessor.
    #[must_use]
    pub fn sequential(instrs: Vec<Instr>) -> Self {
        let mut inner = DiGraph::with_capacity(instrs.len(), instrs.len());
        let mut prev = None;
        for instr in instrs {
            let id = inner.add_node(instr);
            if let Some(prev) = prev {
                inner.add_edge(prev, id, ());
            }
            prev = Some(id);
        }
        Self { inner }
    }

    /// Builds a graph from explicit predecessor lists, one per instruction.
    pub fn from_predecessors(instrs: Vec<Instr>, preds: Vec<Vec<usize>>) -> BytecodeResult<Self> {
        if instrs.len() != preds.len() {
            return Err(BytecodeError::MalformedGraph(format!(
                "{} instructions but {} predecessor lists",
                instrs.len(),
                preds.len()
            )));
        }
        let mut graph = Self {
            inner: DiGraph::with_capacity(instrs.len(), instrs.len()),
        };
        for instr in instrs {
            graph.inner.add_node(instr);
        }
        for (index, ps) in preds.into_iter().enumerate() {
            for pred in ps {
                if graph.inner.contains_edge(NodeIndex::new(pred), NodeIndex::new(index)) {
                    log::debug!("duplicate predecessor {pred} of instruction {index}");
                }
                graph.add_edge(pred, index)?;
            }
        }
        let roots = graph.roots();
        if roots.len() > 1 {
            log::warn!(
                "instruction graph has {} roots, {:?} will be taken as method entries",
                roots.len(),
                roots
            );
        }
        Ok(graph)
    }

    /// Adds a control flow edge: `to` may execute right after `from`.
    pub fn add_edge(&mut self, from: usize, to: usize) -> BytecodeResult<()> {
        let len = self.len();
        if from >= len || to >= len {
            return Err(BytecodeError::InvalidPredecessor {
                index: to,
                pred: from,
                len,
            });
        }
        self.inner
            .update_edge(NodeIndex::new(from), NodeIndex::new(to), ());
        Ok(())
    }

    /// Removes the control flow edge `from -> to`, if present.
    pub fn remove_edge(&mut self, from: usize, to: usize) {
        if let Some(e) = self
            .inner
            .find_edge(NodeIndex::new(from), NodeIndex::new(to))
        {
            self.inner.remove_edge(e);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    #[must_use]
    pub fn instr(&self, index: usize) -> Option<&Instr> {
        self.inner.node_weight(NodeIndex::new(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Instr)> {
        self.inner
            .node_indices()
            .map(move |id| (id.index(), &self.inner[id]))
    }

    /// Predecessors of an instruction, in increasing index order.
    pub fn predecessors(&self, index: usize) -> impl Iterator<Item = usize> {
        self.neighbors(index, Direction::Incoming).into_iter()
    }

    /// Successors of an instruction, in increasing index order.
    pub fn successors(&self, index: usize) -> impl Iterator<Item = usize> {
        self.neighbors(index, Direction::Outgoing).into_iter()
    }

    /// Instructions without predecessor, in increasing index order.
    #[must_use]
    pub fn roots(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.is_root(i)).collect()
    }

    /// Checks whether the instruction is a root (no predecessor).
    #[must_use]
    pub fn is_root(&self, index: usize) -> bool {
        self.predecessors(index).next().is_none()
    }

    fn neighbors(&self, index: usize, dir: Direction) -> Vec<usize> {
        if index >= self.len() {
            return Vec::new();
        }
        let mut ids: Vec<usize> = self
            .inner
            .neighbors_directed(NodeIndex::new(index), dir)
            .map(NodeIndex::index)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::Reg;

    fn nop() -> Instr {
        Instr::Other {
            mnemonic: "nop".to_string(),
            dst: None,
            srcs: Vec::new(),
        }
    }

    #[test]
    fn sequential_graph() {
        let g = InstrGraph::sequential(vec![nop(), nop(), nop()]);
        assert_eq!(g.len(), 3);
        assert!(g.is_root(0));
        assert_eq!(g.predecessors(2).collect::<Vec<_>>(), vec![1]);
        assert_eq!(g.successors(0).collect::<Vec<_>>(), vec![1]);
        assert!(g.predecessors(10).next().is_none());
    }

    #[test]
    fn join_points() {
        let preds = vec![vec![], vec![0], vec![0], vec![2, 1]];
        let g = InstrGraph::from_predecessors(vec![nop(), nop(), nop(), nop()], preds).unwrap();
        assert_eq!(g.predecessors(3).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn duplicated_predecessors_and_extra_roots() {
        // 2 is only reachable from an exception edge the disassembler dropped
        let preds = vec![vec![], vec![0, 0], vec![], vec![1, 2, 1]];
        let g = InstrGraph::from_predecessors(vec![nop(), nop(), nop(), nop()], preds).unwrap();
        assert_eq!(g.predecessors(1).collect::<Vec<_>>(), vec![0]);
        assert_eq!(g.predecessors(3).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(g.roots(), vec![0, 2]);
        assert_eq!(InstrGraph::sequential(vec![nop(), nop()]).roots(), vec![0]);
    }

    #[test]
    fn invalid_predecessor() {
        let res = InstrGraph::from_predecessors(vec![nop()], vec![vec![4]]);
        assert!(matches!(
            res,
            Err(BytecodeError::InvalidPredecessor { pred: 4, .. })
        ));
        let res = InstrGraph::from_predecessors(vec![nop()], vec![]);
        assert!(matches!(res, Err(BytecodeError::MalformedGraph(_))));
    }

    #[test]
    fn deserialize_raw_code() {
        let json = r#"{
            "instructions": [
                {"op": "const", "dst": 0, "value": 1},
                {"op": "return", "src": 0}
            ]
        }"#;
        let g: InstrGraph = serde_json::from_str(json).unwrap();
        assert_eq!(g.len(), 2);
        assert_eq!(
            g.instr(1),
            Some(&Instr::Return {
                src: Some(Reg::from(0u8))
            })
        );
        assert_eq!(g.predecessors(1).collect::<Vec<_>>(), vec![0]);
    }
}
