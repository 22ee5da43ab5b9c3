//! Stage assignment for newly constructed vessels.
//!
//! Components form an undirected graph; the payload is stage 0 and every
//! other component's stage is the minimum cumulative staging weight over any
//! path from the payload, where traversing an edge `u → v` costs
//! `stage_pre_add(u) + stage_add(v)`. Disconnected components land on
//! stage 1.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::content::ContentCatalog;
use crate::ids::ComponentTypeId;

/// Minimal view of one placed component for staging purposes.
#[derive(Debug, Clone, Copy)]
pub struct StagingNode {
    pub kind: ComponentTypeId,
}

/// Find the payload component (`is_payload` attribute). Falls back to node 0
/// when the request carries none.
pub fn detect_payload_index(nodes: &[StagingNode], catalog: &ContentCatalog) -> Option<usize> {
    nodes
        .iter()
        .position(|n| catalog.attrs(n.kind).is_payload)
}

/// Assign a stage to every node.
///
/// `connections` are undirected index pairs; out-of-range or self edges are
/// ignored. Two adjacent nodes both declaring `stage_add` would double-count
/// a separation event, so before running the search one endpoint of each such
/// edge keeps its flag (the endpoint closer to the root node 0; ties break on
/// the lower index) and the other's `stage_add` is masked to zero for this
/// computation only.
pub fn assign_stages(
    nodes: &[StagingNode],
    connections: &[(usize, usize)],
    catalog: &ContentCatalog,
    payload_index: Option<usize>,
) -> Vec<u32> {
    let n = nodes.len();
    if n == 0 {
        return Vec::new();
    }
    let payload = payload_index
        .or_else(|| detect_payload_index(nodes, catalog))
        .unwrap_or(0);

    let mut adj = vec![Vec::new(); n];
    for &(a, b) in connections {
        if a < n && b < n && a != b {
            adj[a].push(b);
            adj[b].push(a);
        }
    }

    let stage_adds: Vec<u32> = nodes
        .iter()
        .map(|node| catalog.attrs(node.kind).stage_add)
        .collect();
    let pre_adds: Vec<u32> = nodes
        .iter()
        .map(|node| catalog.attrs(node.kind).stage_pre_add)
        .collect();

    // Hop distance from node 0 decides which endpoint of a
    // stage_add/stage_add edge keeps its flag.
    let hop_dist = bfs_hops(&adj, 0);
    let mut masked = vec![false; n];
    for &(a, b) in connections {
        if a >= n || b >= n || a == b {
            continue;
        }
        if stage_adds[a] > 0 && stage_adds[b] > 0 {
            let (da, db) = (hop_dist[a], hop_dist[b]);
            let child = if da == db {
                a.max(b)
            } else if da < db {
                b
            } else {
                a
            };
            masked[child] = true;
        }
    }
    let effective_add = |i: usize| if masked[i] { 0 } else { stage_adds[i] };

    // Dijkstra from the payload with edge weight pre_add(u) + add(v).
    let mut dist = vec![u32::MAX; n];
    dist[payload] = 0;
    let mut heap = BinaryHeap::new();
    heap.push(Reverse((0u32, payload)));
    while let Some(Reverse((d, u))) = heap.pop() {
        if d != dist[u] {
            continue;
        }
        for &v in &adj[u] {
            let cand = d + pre_adds[u] + effective_add(v);
            if cand < dist[v] {
                dist[v] = cand;
                heap.push(Reverse((cand, v)));
            }
        }
    }

    (0..n)
        .map(|i| {
            if dist[i] == u32::MAX {
                u32::from(i != payload)
            } else {
                dist[i]
            }
        })
        .collect()
}

fn bfs_hops(adj: &[Vec<usize>], root: usize) -> Vec<usize> {
    let mut dist = vec![usize::MAX; adj.len()];
    if root >= adj.len() {
        return dist;
    }
    dist[root] = 0;
    let mut queue = std::collections::VecDeque::from([root]);
    while let Some(u) = queue.pop_front() {
        for &v in &adj[u] {
            if dist[v] == usize::MAX {
                dist[v] = dist[u] + 1;
                queue.push_back(v);
            }
        }
    }
    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ComponentAttributes, ComponentDef, ContentCatalog};

    const PAYLOAD: ComponentTypeId = ComponentTypeId(1);
    const HULL: ComponentTypeId = ComponentTypeId(2);
    const DECOUPLER: ComponentTypeId = ComponentTypeId(3);
    const BOOSTER: ComponentTypeId = ComponentTypeId(4);
    const FAIRING_PRE: ComponentTypeId = ComponentTypeId(5);

    fn catalog() -> ContentCatalog {
        let mut c = ContentCatalog::default();
        let mut add = |id: ComponentTypeId, attrs: ComponentAttributes| {
            c.components.insert(
                id,
                ComponentDef {
                    name: format!("part {}", id.0),
                    mass_kg: 100.0,
                    attributes: attrs,
                    ..ComponentDef::default()
                },
            );
        };
        add(
            PAYLOAD,
            ComponentAttributes {
                is_payload: true,
                ..ComponentAttributes::default()
            },
        );
        add(HULL, ComponentAttributes::default());
        add(
            DECOUPLER,
            ComponentAttributes {
                stage_add: 1,
                ..ComponentAttributes::default()
            },
        );
        add(
            BOOSTER,
            ComponentAttributes {
                stage_add: 1,
                ..ComponentAttributes::default()
            },
        );
        add(
            FAIRING_PRE,
            ComponentAttributes {
                stage_pre_add: 1,
                ..ComponentAttributes::default()
            },
        );
        c
    }

    fn nodes(kinds: &[ComponentTypeId]) -> Vec<StagingNode> {
        kinds.iter().map(|k| StagingNode { kind: *k }).collect()
    }

    #[test]
    fn payload_is_stage_zero_and_chain_increments_on_stage_add() {
        let c = catalog();
        // payload - hull - decoupler - hull
        let stages = assign_stages(
            &nodes(&[PAYLOAD, HULL, DECOUPLER, HULL]),
            &[(0, 1), (1, 2), (2, 3)],
            &c,
            Some(0),
        );
        assert_eq!(stages, vec![0, 0, 1, 1]);
    }

    #[test]
    fn pre_add_bumps_successors_but_not_itself() {
        let c = catalog();
        // payload - fairing(pre) - hull: fairing stays with payload, hull bumps.
        let stages = assign_stages(
            &nodes(&[PAYLOAD, FAIRING_PRE, HULL]),
            &[(0, 1), (1, 2)],
            &c,
            Some(0),
        );
        assert_eq!(stages, vec![0, 0, 1]);
    }

    #[test]
    fn disconnected_nodes_default_to_stage_one() {
        let c = catalog();
        let stages = assign_stages(&nodes(&[PAYLOAD, HULL, HULL]), &[(0, 1)], &c, Some(0));
        assert_eq!(stages, vec![0, 0, 1]);
    }

    #[test]
    fn minimum_path_wins_across_parallel_routes() {
        let c = catalog();
        // Two routes from payload to node 3: via decoupler (cost 1 + entering
        // hull 0) and via hull (cost 0). The free route wins.
        let stages = assign_stages(
            &nodes(&[PAYLOAD, DECOUPLER, HULL, HULL]),
            &[(0, 1), (1, 3), (0, 2), (2, 3)],
            &c,
            Some(0),
        );
        assert_eq!(stages[3], 0);
    }

    #[test]
    fn adjacent_stage_adds_mask_the_farther_endpoint() {
        let c = catalog();
        // payload(0) - decoupler(1) - booster(2): both 1 and 2 declare
        // stage_add. Node 1 is closer to the root, so node 2's flag is masked
        // and the pair separates as one stage.
        let stages = assign_stages(
            &nodes(&[PAYLOAD, DECOUPLER, BOOSTER]),
            &[(0, 1), (1, 2)],
            &c,
            Some(0),
        );
        assert_eq!(stages, vec![0, 1, 1]);
    }

    #[test]
    fn adjacent_stage_adds_tie_breaks_on_lower_index() {
        let c = catalog();
        // Symmetric boosters both at hop distance 1 from the root: the lower
        // index keeps its flag, the other is masked for the whole search.
        let stages = assign_stages(
            &nodes(&[PAYLOAD, DECOUPLER, BOOSTER]),
            &[(0, 1), (0, 2), (1, 2)],
            &c,
            Some(0),
        );
        assert_eq!(stages[0], 0);
        assert_eq!(stages[1], 1);
        assert_eq!(stages[2], 0);
    }

    #[test]
    fn staging_handles_cycles_without_hanging() {
        let c = catalog();
        let stages = assign_stages(
            &nodes(&[PAYLOAD, HULL, HULL, HULL]),
            &[(0, 1), (1, 2), (2, 3), (3, 0)],
            &c,
            Some(0),
        );
        assert_eq!(stages, vec![0, 0, 0, 0]);
    }
}
