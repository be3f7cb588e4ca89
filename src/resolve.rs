//! Build order for the asset graph.
//!
//! Kahn-style layering over an adjacency list indexed by [`AssetId`]: each
//! pass emits every remaining asset whose dependencies have all been emitted
//! by an earlier pass. Readiness is judged against the remaining set as it was
//! when the pass started, so one pass is exactly one layer. A pass that emits
//! nothing means the rest of the graph is cyclic.

use crate::asset::AssetId;

/// The graph has a cycle; `remaining` holds every asset that could not be
/// ordered, in input order.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("cyclic dependency among {} assets", remaining.len())]
pub struct CycleError {
    pub remaining: Vec<AssetId>,
}

/// Order assets so that every dependency precedes its dependents.
///
/// `deps[i]` lists the dependencies of asset `i`. Edges to ids outside the
/// graph are ignored. Within one layer the input order is kept.
pub fn topological_sort(deps: &[Vec<AssetId>]) -> Result<Vec<AssetId>, CycleError> {
    let n = deps.len();
    let mut done = vec![false; n];
    let mut remaining: Vec<usize> = (0..n).collect();
    let mut order = Vec::with_capacity(n);

    while !remaining.is_empty() {
        let layer: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| {
                deps[i]
                    .iter()
                    .all(|dep| dep.index() >= n || done[dep.index()])
            })
            .collect();
        if layer.is_empty() {
            return Err(CycleError {
                remaining: remaining.into_iter().map(id).collect(),
            });
        }
        for &i in &layer {
            done[i] = true;
        }
        remaining.retain(|&i| !done[i]);
        order.extend(layer.into_iter().map(id));
    }
    Ok(order)
}

fn id(index: usize) -> AssetId {
    AssetId::from_index(index)
}
