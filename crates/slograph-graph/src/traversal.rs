use slograph_core::{
    DependencyEdge, EdgeKey, GraphSnapshot, Result, SloGraphError, Subgraph, SubgraphNode,
    TraversalDepth, TraversalDirection,
};
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::debug;

/// Nodes reached by one directional walk, keyed by id with their depth.
struct Walk {
    nodes: BTreeMap<String, u32>,
    edges: BTreeMap<EdgeKey, DependencyEdge>,
}

/// Depth-bounded, cycle-safe subgraph extraction over a [`GraphSnapshot`].
///
/// Downstream follows `source -> target` (what the start depends on),
/// upstream follows edges in reverse (who depends on the start).
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphTraversal;

impl GraphTraversal {
    pub fn new() -> Self {
        Self
    }

    pub fn subgraph(
        &self,
        snapshot: &GraphSnapshot,
        start: &str,
        direction: TraversalDirection,
        max_depth: TraversalDepth,
        include_stale: bool,
    ) -> Result<Subgraph> {
        if !snapshot.contains_service(start) {
            return Err(SloGraphError::NotFound(start.to_string()));
        }

        let mut reached: BTreeMap<String, SubgraphNode> = BTreeMap::new();
        let mut edges: BTreeMap<EdgeKey, DependencyEdge> = BTreeMap::new();

        let directions: &[TraversalDirection] = match direction {
            TraversalDirection::Both => &[TraversalDirection::Downstream, TraversalDirection::Upstream],
            TraversalDirection::Downstream => &[TraversalDirection::Downstream],
            TraversalDirection::Upstream => &[TraversalDirection::Upstream],
        };

        for &dir in directions {
            let walk = self.walk(snapshot, start, dir, max_depth.get(), include_stale);
            for (id, depth) in walk.nodes {
                reached
                    .entry(id.clone())
                    .and_modify(|node| {
                        node.depth = node.depth.min(depth);
                        if node.reached_via != dir {
                            node.reached_via = TraversalDirection::Both;
                        }
                    })
                    .or_insert(SubgraphNode {
                        business_id: id,
                        depth,
                        reached_via: dir,
                    });
            }
            edges.extend(walk.edges);
        }

        let mut nodes: Vec<SubgraphNode> = reached.into_values().collect();
        nodes.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then_with(|| a.business_id.cmp(&b.business_id))
        });

        debug!(
            start,
            %direction,
            depth = max_depth.get(),
            nodes = nodes.len(),
            edges = edges.len(),
            "extracted subgraph"
        );

        Ok(Subgraph {
            root: start.to_string(),
            direction,
            max_depth,
            nodes,
            edges: edges.into_values().collect(),
        })
    }

    /// Breadth-first walk in one direction. Each node is expanded at most
    /// once, so cyclic graphs terminate and every node gets its minimal depth.
    fn walk(
        &self,
        snapshot: &GraphSnapshot,
        start: &str,
        direction: TraversalDirection,
        max_depth: u32,
        include_stale: bool,
    ) -> Walk {
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, u32)> = VecDeque::new();
        let mut walk = Walk {
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
        };

        visited.insert(start.to_string());
        queue.push_back((start.to_string(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }

            let edges = match direction {
                TraversalDirection::Upstream => snapshot.incoming_edges(&current, include_stale),
                _ => snapshot.outgoing_edges(&current, include_stale),
            };

            for edge in edges {
                let next = match direction {
                    TraversalDirection::Upstream => &edge.source,
                    _ => &edge.target,
                };
                walk.edges.insert(edge.key(), edge.clone());
                if visited.insert(next.clone()) {
                    walk.nodes.insert(next.clone(), depth + 1);
                    queue.push_back((next.clone(), depth + 1));
                }
            }
        }

        walk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slograph_core::{DiscoverySource, Service};

    fn graph(edges: &[(&str, &str)]) -> GraphSnapshot {
        let mut services: Vec<Service> = Vec::new();
        for (s, t) in edges {
            services.push(Service::new(*s));
            services.push(Service::new(*t));
        }
        let edges = edges
            .iter()
            .map(|(s, t)| DependencyEdge::new(*s, *t, DiscoverySource::Mesh))
            .collect();
        GraphSnapshot::empty().with_batch(services, edges)
    }

    fn depth(d: u32) -> TraversalDepth {
        TraversalDepth::new(d).unwrap()
    }

    #[test]
    fn downstream_respects_depth() {
        let snap = graph(&[("a", "b"), ("b", "c"), ("c", "d")]);
        let sub = GraphTraversal::new()
            .subgraph(&snap, "a", TraversalDirection::Downstream, depth(2), false)
            .unwrap();
        assert_eq!(sub.node_ids(), vec!["b", "c"]);
        assert_eq!(sub.edges.len(), 2);
    }

    #[test]
    fn upstream_follows_reverse_edges() {
        let snap = graph(&[("a", "c"), ("b", "c"), ("c", "d")]);
        let sub = GraphTraversal::new()
            .subgraph(&snap, "c", TraversalDirection::Upstream, depth(3), false)
            .unwrap();
        assert_eq!(sub.node_ids(), vec!["a", "b"]);
        assert!(sub.nodes.iter().all(|n| n.reached_via == TraversalDirection::Upstream));
    }

    #[test]
    fn both_merges_directions_without_duplicates() {
        let snap = graph(&[("a", "b"), ("b", "a"), ("b", "c")]);
        let sub = GraphTraversal::new()
            .subgraph(&snap, "b", TraversalDirection::Both, depth(1), false)
            .unwrap();
        assert_eq!(sub.node_ids(), vec!["a", "c"]);
        let a = sub.nodes.iter().find(|n| n.business_id == "a").unwrap();
        assert_eq!(a.reached_via, TraversalDirection::Both);
        assert_eq!(sub.edges.len(), 3);
        assert!(!sub.contains("b"));
    }

    #[test]
    fn cycle_terminates_and_excludes_start() {
        let snap = graph(&[("a", "b"), ("b", "c"), ("c", "a")]);
        let sub = GraphTraversal::new()
            .subgraph(&snap, "a", TraversalDirection::Downstream, depth(10), false)
            .unwrap();
        assert_eq!(sub.node_ids(), vec!["b", "c"]);
        assert_eq!(sub.edges.len(), 3);
    }

    #[test]
    fn stale_edges_are_skipped_unless_requested() {
        let snap = GraphSnapshot::empty().with_batch(
            vec![Service::new("a"), Service::new("b")],
            vec![DependencyEdge::new("a", "b", DiscoverySource::Trace).stale()],
        );
        let t = GraphTraversal::new();
        let without = t
            .subgraph(&snap, "a", TraversalDirection::Downstream, depth(1), false)
            .unwrap();
        let with = t
            .subgraph(&snap, "a", TraversalDirection::Downstream, depth(1), true)
            .unwrap();
        assert!(without.nodes.is_empty());
        assert_eq!(with.node_ids(), vec!["b"]);
    }

    #[test]
    fn unknown_start_is_not_found() {
        let snap = graph(&[("a", "b")]);
        let err = GraphTraversal::new()
            .subgraph(&snap, "zz", TraversalDirection::Both, depth(1), false)
            .unwrap_err();
        assert!(matches!(err, SloGraphError::NotFound(_)));
    }
}
