// src/sid/diagram.rs
//
// The SID diagram: a typed graph of operator nodes connected by ordered
// input ports. Cycle detection is iterative (stack-based DFS), never
// recursive, since a malicious or generated diagram can be arbitrarily deep
// and a recursive walk would blow the call stack.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Operator {
    P,
    #[serde(rename = "S+")]
    Splus,
    #[serde(rename = "S-")]
    Sminus,
    O,
    C,
    T,
}

impl Operator {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "P" => Some(Operator::P),
            "S+" => Some(Operator::Splus),
            "S-" => Some(Operator::Sminus),
            "O" => Some(Operator::O),
            "C" => Some(Operator::C),
            "T" => Some(Operator::T),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::P => "P",
            Operator::Splus => "S+",
            Operator::Sminus => "S-",
            Operator::O => "O",
            Operator::C => "C",
            Operator::T => "T",
        }
    }

    /// Whether this operator commits an irreversible projection. `O` nodes
    /// are the ones flagged irreversible, including `O` nodes freshly
    /// minted by a rewrite (SS4.E).
    pub fn is_irreversible(self) -> bool {
        matches!(self, Operator::O)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SidNode {
    pub id: String,
    pub op: Operator,
    /// Ordered input node ids feeding this node's ports.
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub dof_refs: Vec<String>,
    #[serde(default)]
    pub atom_args: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Diagram {
    nodes: HashMap<String, SidNode>,
    order: Vec<String>,
}

impl Default for Diagram {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagram {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&SidNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut SidNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes_in_order(&self) -> impl Iterator<Item = &SidNode> {
        self.order.iter().filter_map(move |id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Inserts or replaces a node. Replacing an existing node keeps its
    /// position in the iteration order.
    pub fn upsert_node(&mut self, node: SidNode) {
        if !self.nodes.contains_key(&node.id) {
            self.order.push(node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn remove_node(&mut self, id: &str) -> Option<SidNode> {
        self.order.retain(|n| n != id);
        self.nodes.remove(id)
    }

    /// Iterative DFS cycle check over the `inputs` adjacency (edges point
    /// from a node to the nodes that feed it). Returns the first cycle
    /// found, as a list of node ids, or `None` if the diagram is a DAG.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();

        for start in &self.order {
            if marks.contains_key(start.as_str()) {
                continue;
            }

            // Explicit stack of (node_id, next_child_index) frames.
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            marks.insert(start.as_str(), Mark::Visiting);
            let mut path: Vec<String> = vec![start.clone()];

            while let Some(&mut (node_id, ref mut next_idx)) = stack.last_mut() {
                let children = self
                    .nodes
                    .get(node_id)
                    .map(|n| n.inputs.as_slice())
                    .unwrap_or(&[]);

                if *next_idx < children.len() {
                    let child = children[*next_idx].as_str();
                    *next_idx += 1;

                    match marks.get(child) {
                        Some(Mark::Visiting) => {
                            let mut cycle = path.clone();
                            cycle.push(child.to_string());
                            return Some(cycle);
                        }
                        Some(Mark::Done) => continue,
                        None => {
                            marks.insert(child, Mark::Visiting);
                            path.push(child.to_string());
                            stack.push((child, 0));
                        }
                    }
                } else {
                    marks.insert(node_id, Mark::Done);
                    path.pop();
                    stack.pop();
                }
            }
        }

        None
    }

    pub fn is_acyclic(&self) -> bool {
        self.find_cycle().is_none()
    }

    /// All node ids currently referenced as an input but not present as a
    /// node — a diagram invariant violation.
    pub fn dangling_references(&self) -> HashSet<String> {
        let mut missing = HashSet::new();
        for node in self.nodes.values() {
            for input in &node.inputs {
                if !self.nodes.contains_key(input) {
                    missing.insert(input.clone());
                }
            }
        }
        missing
    }
}
