//! Caller/callee adjacency and call-site records.
//!
//! Only USR-to-USR adjacency lives in memory; full call-site detail is
//! potentially large and is read on demand from the parse cache.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A single call with its exact location. Uniqueness is the 4-tuple
/// `(caller_usr, callee_usr, file, line)`; the column is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub caller_usr: String,
    pub callee_usr: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// In-memory forward and reverse call edges for the current session.
#[derive(Debug, Default)]
pub struct CallGraph {
    forward: HashMap<String, HashSet<String>>,
    reverse: HashMap<String, HashSet<String>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_call(&mut self, caller_usr: &str, callee_usr: &str) {
        if caller_usr.is_empty() || callee_usr.is_empty() {
            return;
        }
        self.forward
            .entry(caller_usr.to_string())
            .or_default()
            .insert(callee_usr.to_string());
        self.reverse
            .entry(callee_usr.to_string())
            .or_default()
            .insert(caller_usr.to_string());
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }

    /// USRs called by `usr`.
    pub fn callees(&self, usr: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .forward
            .get(usr)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// USRs that call `usr`.
    pub fn callers(&self, usr: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .reverse
            .get(usr)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Remove a symbol and every edge touching it.
    pub fn remove_symbol(&mut self, usr: &str) {
        if let Some(callees) = self.forward.remove(usr) {
            for callee in callees {
                if let Some(callers) = self.reverse.get_mut(&callee) {
                    callers.remove(usr);
                    if callers.is_empty() {
                        self.reverse.remove(&callee);
                    }
                }
            }
        }
        if let Some(callers) = self.reverse.remove(usr) {
            for caller in callers {
                if let Some(callees) = self.forward.get_mut(&caller) {
                    callees.remove(usr);
                    if callees.is_empty() {
                        self.forward.remove(&caller);
                    }
                }
            }
        }
    }

    /// True if any edge references `usr`.
    pub fn references(&self, usr: &str) -> bool {
        self.forward.contains_key(usr) || self.reverse.contains_key(usr)
    }

    /// Enumerate call paths from `from` to `to`, bounded by `max_depth`
    /// edges. A visited set keeps recursive cycles from looping.
    pub fn call_paths(&self, from: &str, to: &str, max_depth: usize) -> Vec<Vec<String>> {
        if from == to {
            return vec![vec![from.to_string()]];
        }
        let mut paths = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(from.to_string());
        let mut current = vec![from.to_string()];
        self.dfs_paths(from, to, max_depth, &mut visited, &mut current, &mut paths);
        paths
    }

    fn dfs_paths(
        &self,
        at: &str,
        to: &str,
        budget: usize,
        visited: &mut HashSet<String>,
        current: &mut Vec<String>,
        paths: &mut Vec<Vec<String>>,
    ) {
        if budget == 0 {
            return;
        }
        let Some(callees) = self.forward.get(at) else {
            return;
        };
        let mut ordered: Vec<&String> = callees.iter().collect();
        ordered.sort();
        for callee in ordered {
            if callee == to {
                let mut path = current.clone();
                path.push(to.to_string());
                paths.push(path);
                continue;
            }
            if visited.contains(callee.as_str()) {
                continue;
            }
            visited.insert(callee.clone());
            current.push(callee.clone());
            self.dfs_paths(callee, to, budget - 1, visited, current, paths);
            current.pop();
            visited.remove(callee.as_str());
        }
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(HashSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_and_reverse_stay_in_sync() {
        let mut graph = CallGraph::new();
        graph.add_call("a", "b");
        graph.add_call("a", "c");
        graph.add_call("b", "c");

        assert_eq!(graph.callees("a"), vec!["b", "c"]);
        assert_eq!(graph.callers("c"), vec!["a", "b"]);
        assert_eq!(graph.edge_count(), 3);

        graph.remove_symbol("b");
        assert_eq!(graph.callees("a"), vec!["c"]);
        assert_eq!(graph.callers("c"), vec!["a"]);
        assert!(!graph.references("b"));
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut graph = CallGraph::new();
        graph.add_call("a", "b");
        graph.add_call("a", "b");
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn call_paths_are_bounded_and_cycle_safe() {
        let mut graph = CallGraph::new();
        graph.add_call("a", "b");
        graph.add_call("b", "c");
        graph.add_call("c", "a"); // cycle
        graph.add_call("a", "c");

        let paths = graph.call_paths("a", "c", 10);
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&vec!["a".to_string(), "c".to_string()]));
        assert!(paths.contains(&vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string()
        ]));

        // Depth 1 only finds the direct edge.
        let short = graph.call_paths("a", "c", 1);
        assert_eq!(short.len(), 1);

        // Self-path is the trivial path.
        assert_eq!(graph.call_paths("a", "a", 5), vec![vec!["a".to_string()]]);
    }
}
