//! C2: Tarjan's strongly-connected-components partitioner (spec §4.2),
//! restricted to a query neighborhood. Deterministic given a fixed vertex
//! order; singleton SCCs without a self-loop are discarded since they
//! cannot participate in a cycle.

use std::collections::{HashMap, HashSet};

use crate::graph::TenantGraph;
use crate::model::WalletId;

/// A strongly-connected component: its vertex set plus the intra-SCC
/// edges (as adjacency restricted to `vertices`).
#[derive(Debug, Clone)]
pub struct Scc {
    pub vertices: Vec<WalletId>,
    pub adjacency: HashMap<WalletId, Vec<(WalletId, crate::model::NftId)>>,
}

struct TarjanState<'a> {
    graph: &'a TenantGraph,
    allowed: &'a HashSet<WalletId>,
    consider_collections: bool,
    index_of: HashMap<WalletId, usize>,
    lowlink: HashMap<WalletId, usize>,
    on_stack: HashSet<WalletId>,
    stack: Vec<WalletId>,
    next_index: usize,
    result: Vec<Scc>,
}

/// Partitions `vertices` (typically `TenantGraph::neighborhood(seed, depth)`)
/// into non-trivial SCCs, reported in DFS post-order. `vertices` must be
/// iterated in a stable order by the caller (it already is: `neighborhood`
/// returns wallet-id order via its `BTreeSet`/sorted construction upstream,
/// and this function additionally sorts defensively). `consider_collections`
/// gates whether collection-derived want edges participate in the traversal
/// (spec §6 `considerCollections`).
pub fn partition(graph: &TenantGraph, vertices: &HashSet<WalletId>, consider_collections: bool) -> Vec<Scc> {
    let mut ordered: Vec<WalletId> = vertices.iter().cloned().collect();
    ordered.sort();

    let mut state = TarjanState {
        graph,
        allowed: vertices,
        consider_collections,
        index_of: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        next_index: 0,
        result: Vec::new(),
    };

    for v in &ordered {
        if !state.index_of.contains_key(v) {
            strongconnect(&mut state, v);
        }
    }
    state.result
}

/// Explicit-stack (non-recursive) Tarjan to keep the inner loop free of
/// unbounded recursion depth, per spec's O(V+E) / bounded-allocation
/// contract.
fn strongconnect(state: &mut TarjanState<'_>, start: &WalletId) {
    enum Frame {
        Enter(WalletId),
        AfterChild(WalletId, WalletId),
    }

    let mut work: Vec<Frame> = vec![Frame::Enter(start.clone())];
    // neighbor cursor per vertex being explored
    let mut cursor: HashMap<WalletId, usize> = HashMap::new();

    while let Some(frame) = work.pop() {
        match frame {
            Frame::Enter(v) => {
                if state.index_of.contains_key(&v) {
                    continue;
                }
                state.index_of.insert(v.clone(), state.next_index);
                state.lowlink.insert(v.clone(), state.next_index);
                state.next_index += 1;
                state.stack.push(v.clone());
                state.on_stack.insert(v.clone());
                cursor.insert(v.clone(), 0);

                process_neighbors(state, &mut work, &mut cursor, &v);
            }
            Frame::AfterChild(v, w) => {
                let w_low = *state.lowlink.get(&w).unwrap();
                let v_low = *state.lowlink.get(&v).unwrap();
                state.lowlink.insert(v.clone(), v_low.min(w_low));
                process_neighbors(state, &mut work, &mut cursor, &v);
            }
        }
    }

    fn process_neighbors(
        state: &mut TarjanState<'_>,
        work: &mut Vec<Frame>,
        cursor: &mut HashMap<WalletId, usize>,
        v: &WalletId,
    ) {
        let edges = state.graph.edges_from_considering(v, state.consider_collections);
        let mut neighbors: Vec<WalletId> = edges
            .into_iter()
            .map(|e| e.wanter)
            .filter(|w| state.allowed.contains(w))
            .collect();
        neighbors.sort();
        neighbors.dedup();

        let pos = cursor.get_mut(v).unwrap();
        while *pos < neighbors.len() {
            let w = neighbors[*pos].clone();
            *pos += 1;
            if !state.index_of.contains_key(&w) {
                work.push(Frame::AfterChild(v.clone(), w.clone()));
                work.push(Frame::Enter(w));
                return;
            } else if state.on_stack.contains(&w) {
                let w_index = *state.index_of.get(&w).unwrap();
                let v_low = *state.lowlink.get(v).unwrap();
                state.lowlink.insert(v.clone(), v_low.min(w_index));
            }
        }

        // Finished exploring all neighbors of v: if v is a root, pop the SCC.
        if state.lowlink.get(v) == state.index_of.get(v) {
            let mut members = Vec::new();
            loop {
                let w = state.stack.pop().unwrap();
                state.on_stack.remove(&w);
                members.push(w.clone());
                if w == *v {
                    break;
                }
            }
            members.sort();
            let has_self_loop = members.len() == 1
                && state
                    .graph
                    .edges_from_considering(&members[0], state.consider_collections)
                    .iter()
                    .any(|e| e.wanter == members[0]);
            if members.len() > 1 || has_self_loop {
                let member_set: HashSet<WalletId> = members.iter().cloned().collect();
                let mut adjacency = HashMap::new();
                for m in &members {
                    let edges: Vec<_> = state
                        .graph
                        .edges_from_considering(m, state.consider_collections)
                        .into_iter()
                        .filter(|e| member_set.contains(&e.wanter))
                        .map(|e| (e.wanter, e.nft))
                        .collect();
                    adjacency.insert(m.clone(), edges);
                }
                state.result.push(Scc {
                    vertices: members,
                    adjacency,
                });
            }
        }
    }
}
