use serde::{Deserialize, Serialize};
use slograph_core::{Adjacency, Result, SloGraphError};
use std::collections::HashMap;
use tracing::debug;

const UNVISITED: usize = usize::MAX;

/// A strongly connected component with more than one member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StronglyConnectedComponent {
    /// Sorted member ids.
    pub members: Vec<String>,
}

impl StronglyConnectedComponent {
    pub fn contains(&self, business_id: &str) -> bool {
        self.members
            .binary_search_by(|m| m.as_str().cmp(business_id))
            .is_ok()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Per-call bookkeeping for Tarjan's algorithm. Built fresh on every
/// invocation and dropped at the end of it.
struct TarjanState {
    index: Vec<usize>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: usize,
}

impl TarjanState {
    fn new(node_count: usize) -> Self {
        Self {
            index: vec![UNVISITED; node_count],
            lowlink: vec![0; node_count],
            on_stack: vec![false; node_count],
            stack: Vec::new(),
            next_index: 0,
        }
    }

    fn discover(&mut self, v: usize) {
        self.index[v] = self.next_index;
        self.lowlink[v] = self.next_index;
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack[v] = true;
    }

    fn pop_component(&mut self, root: usize) -> Result<Vec<usize>> {
        let mut component = Vec::new();
        loop {
            let w = self.stack.pop().ok_or_else(|| {
                SloGraphError::internal(format!(
                    "tarjan stack exhausted before reaching component root {}",
                    root
                ))
            })?;
            self.on_stack[w] = false;
            component.push(w);
            if w == root {
                return Ok(component);
            }
        }
    }
}

/// Iterative Tarjan strongly-connected-components detection.
///
/// Holds no state between calls, so one instance can be shared across
/// concurrent requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleDetector;

impl CycleDetector {
    pub fn new() -> Self {
        Self
    }

    /// All components with more than one member, members sorted and
    /// components ordered by their first member. Targets that never appear as
    /// keys are treated as sinks.
    pub fn detect(&self, adjacency: &Adjacency) -> Result<Vec<StronglyConnectedComponent>> {
        let (names, successors) = Self::index_graph(adjacency);
        let mut state = TarjanState::new(names.len());
        let mut components: Vec<StronglyConnectedComponent> = Vec::new();
        // (node, position of the next successor to examine)
        let mut call_stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..names.len() {
            if state.index[root] != UNVISITED {
                continue;
            }
            state.discover(root);
            call_stack.push((root, 0));

            while let Some(frame) = call_stack.last_mut() {
                let v = frame.0;
                if let Some(&w) = successors[v].get(frame.1) {
                    frame.1 += 1;
                    if state.index[w] == UNVISITED {
                        state.discover(w);
                        call_stack.push((w, 0));
                    } else if state.on_stack[w] {
                        state.lowlink[v] = state.lowlink[v].min(state.index[w]);
                    }
                    continue;
                }

                call_stack.pop();
                if let Some(&(parent, _)) = call_stack.last() {
                    state.lowlink[parent] = state.lowlink[parent].min(state.lowlink[v]);
                }
                if state.lowlink[v] == state.index[v] {
                    let members = state.pop_component(v)?;
                    if members.len() > 1 {
                        let mut members: Vec<String> =
                            members.into_iter().map(|i| names[i].to_string()).collect();
                        members.sort();
                        components.push(StronglyConnectedComponent { members });
                    }
                }
            }
        }

        if !state.stack.is_empty() {
            return Err(SloGraphError::internal(format!(
                "tarjan finished with {} nodes still on the stack",
                state.stack.len()
            )));
        }

        components.sort();
        debug!(
            nodes = names.len(),
            components = components.len(),
            "strongly connected components detected"
        );
        Ok(components)
    }

    /// Component containing `business_id`, if it sits on a cycle.
    pub fn component_of<'a>(
        components: &'a [StronglyConnectedComponent],
        business_id: &str,
    ) -> Option<&'a StronglyConnectedComponent> {
        components.iter().find(|c| c.contains(business_id))
    }

    fn index_graph(adjacency: &Adjacency) -> (Vec<&str>, Vec<Vec<usize>>) {
        let mut names: Vec<&str> = Vec::with_capacity(adjacency.len());
        let mut ids: HashMap<&str, usize> = HashMap::with_capacity(adjacency.len());

        for key in adjacency.keys() {
            ids.entry(key.as_str()).or_insert_with(|| {
                names.push(key.as_str());
                names.len() - 1
            });
        }
        for targets in adjacency.values() {
            for target in targets {
                ids.entry(target.as_str()).or_insert_with(|| {
                    names.push(target.as_str());
                    names.len() - 1
                });
            }
        }

        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
        for (key, targets) in adjacency {
            let from = ids[key.as_str()];
            successors[from] = targets.iter().map(|t| ids[t.as_str()]).collect();
        }
        (names, successors)
    }
}
