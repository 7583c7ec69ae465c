//! C3: Johnson's elementary-cycle enumerator (spec §4.3), bounded by a
//! maximum cycle length `k`, a wall-clock time budget, and a cycle-count
//! budget per SCC. Never panics; exhausting either budget yields a
//! `truncated` result instead.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::model::{LoopStep, NftId, WalletId};
use crate::scc::Scc;

#[derive(Debug, Clone)]
pub struct RawCycle {
    /// Steps in traversal order; the loop closes from the last step's `to`
    /// back to the first step's `from`.
    pub steps: Vec<LoopStep>,
}

pub struct EnumerationResult {
    pub cycles: Vec<RawCycle>,
    pub truncated: bool,
}

/// Enumerates elementary cycles within a single SCC, up to length `k`
/// (spec's hard cap of 15 is enforced by [`crate::config::DiscoverySettings`]
/// upstream, not here; `k` arrives already clamped).
pub fn enumerate(
    scc: &Scc,
    k: usize,
    time_budget: Duration,
    cycle_count_budget: usize,
) -> EnumerationResult {
    let started = Instant::now();
    let mut vertices: Vec<WalletId> = scc.vertices.clone();
    vertices.sort();

    let mut cycles = Vec::new();
    let mut truncated = false;

    'outer: for (start_idx, start) in vertices.iter().enumerate() {
        // Johnson restricts the search, per start vertex, to the
        // subgraph induced by vertices >= start in the fixed order, so
        // cycles aren't reported once per rotation.
        let allowed: HashSet<WalletId> = vertices[start_idx..].iter().cloned().collect();

        let mut blocked: HashSet<WalletId> = HashSet::new();
        let mut block_map: HashMap<WalletId, HashSet<WalletId>> = HashMap::new();
        let mut path: Vec<(WalletId, Option<NftId>)> = vec![(start.clone(), None)];
        let mut path_set: HashSet<WalletId> = HashSet::from([start.clone()]);

        let (stop, _found) = circuit(
            scc,
            start,
            start,
            &allowed,
            &mut blocked,
            &mut block_map,
            &mut path,
            &mut path_set,
            k,
            &mut cycles,
            &started,
            time_budget,
            cycle_count_budget,
            &mut truncated,
        );
        if stop || truncated {
            break 'outer;
        }
    }

    EnumerationResult { cycles, truncated }
}

/// Returns `(stop, found_cycle_through_current)`: `stop` signals the caller
/// to abandon enumeration entirely (budget exhausted); `found_cycle_through_current`
/// is Johnson's own unblocking signal — whether any cycle was discovered
/// while `current` was on the path, which determines whether `current`
/// stays blocked or gets unblocked for the next start vertex.
#[allow(clippy::too_many_arguments)]
fn circuit(
    scc: &Scc,
    start: &WalletId,
    current: &WalletId,
    allowed: &HashSet<WalletId>,
    blocked: &mut HashSet<WalletId>,
    block_map: &mut HashMap<WalletId, HashSet<WalletId>>,
    path: &mut Vec<(WalletId, Option<NftId>)>,
    path_set: &mut HashSet<WalletId>,
    k: usize,
    cycles: &mut Vec<RawCycle>,
    started: &Instant,
    time_budget: Duration,
    cycle_count_budget: usize,
    truncated: &mut bool,
) -> (bool, bool) {
    // Budget checks happen at each outer-loop iteration (spec §5: the only
    // permitted suspension points are budget-check boundaries inside C3).
    if started.elapsed() > time_budget || cycles.len() >= cycle_count_budget {
        *truncated = true;
        return (true, false);
    }
    if path.len() > k {
        return (false, false);
    }

    let mut found = false;
    blocked.insert(current.clone());

    let mut neighbors: Vec<(WalletId, NftId)> = scc
        .adjacency
        .get(current)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|(w, _)| allowed.contains(w))
        .collect();
    neighbors.sort_by(|a, b| a.0.cmp(&b.0));

    for (next, nft) in neighbors {
        if started.elapsed() > time_budget || cycles.len() >= cycle_count_budget {
            *truncated = true;
            return (true, found);
        }
        if next == *start {
            if path.len() >= 2 {
                // path[i] -> path[i+1] carries path[i+1]'s incoming nft; the
                // closing edge path[last] -> start carries `nft`.
                let mut steps = Vec::with_capacity(path.len());
                for i in 0..path.len() {
                    let from = path[i].0.clone();
                    let (to, step_nft) = if i + 1 < path.len() {
                        (path[i + 1].0.clone(), path[i + 1].1.clone().unwrap())
                    } else {
                        (start.clone(), nft.clone())
                    };
                    steps.push(LoopStep { from, to, nft: step_nft });
                }
                cycles.push(RawCycle { steps });
                found = true;
            }
        } else if !path_set.contains(&next) && path.len() < k && !blocked.contains(&next) {
            path.push((next.clone(), Some(nft.clone())));
            path_set.insert(next.clone());
            let (stop, child_found) = circuit(
                scc,
                start,
                &next,
                allowed,
                blocked,
                block_map,
                path,
                path_set,
                k,
                cycles,
                started,
                time_budget,
                cycle_count_budget,
                truncated,
            );
            found = found || child_found;
            path.pop();
            path_set.remove(&next);
            if stop {
                return (true, found);
            }
        }
    }

    if found {
        unblock(current, blocked, block_map);
    } else {
        for (next, _) in scc
            .adjacency
            .get(current)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|(w, _)| allowed.contains(w))
        {
            block_map.entry(next).or_default().insert(current.clone());
        }
    }

    (false, found)
}

fn unblock(v: &WalletId, blocked: &mut HashSet<WalletId>, block_map: &mut HashMap<WalletId, HashSet<WalletId>>) {
    blocked.remove(v);
    if let Some(dependents) = block_map.remove(v) {
        for w in dependents {
            if blocked.contains(&w) {
                unblock(&w, blocked, block_map);
            }
        }
    }
}
