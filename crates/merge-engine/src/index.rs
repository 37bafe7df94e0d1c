//! Live-community catalog with a √n checkpoint accelerator, plus the
//! node → communities inverse index.
//!
//! The catalog is a singly linked chain of live community ids in strictly
//! increasing id order, stored in a slab so removals never invalidate
//! references. Point lookups are guided by a checkpoint list: each
//! checkpoint covers a contiguous segment of the chain and records the
//! segment's first node and maximum id. With ⌊√n⌋ segments of ⌊√n⌋ nodes a
//! lookup or removal costs O(√n); appends are O(1) against the last
//! checkpoint and the structure is rebuilt after a bounded number of
//! unindexed tail appends, so the amortized cost per mutation stays O(√n).
//! The workload is dominated by tail appends with occasional arbitrary
//! deletes.
//!
//! Exactly one logical thread of control owns the structure per process; no
//! internal locking.

use crate::community::{CommunityData, CommunityTable};
use crate::error::{EngineError, Result};
use crate::sets;

#[derive(Debug)]
struct CatalogNode {
    id: u32,
    next: Option<usize>,
}

/// One accelerator segment: the slab position of its first chain node and
/// the largest id the segment covered when it was last indexed.
#[derive(Debug)]
struct Checkpoint {
    max_id: u32,
    first: usize,
}

/// Sorted, append-friendly list of live community ids.
#[derive(Debug, Default)]
pub struct Catalog {
    /// Slab of chain nodes. Removed nodes are unlinked but the slots stay;
    /// nothing is reclaimed mid-run.
    nodes: Vec<CatalogNode>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    checkpoints: Vec<Checkpoint>,
    /// ⌊√len⌋ at the last rebuild.
    base_segments: usize,
    appends_since_rebuild: usize,
    append_budget: usize,
}

fn isqrt(n: usize) -> usize {
    (n as f64).sqrt().floor() as usize
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Highest live id, i.e. the chain tail.
    pub fn max_id(&self) -> Option<u32> {
        self.tail.map(|idx| self.nodes[idx].id)
    }

    /// Number of accelerator segments.
    pub fn segment_count(&self) -> usize {
        self.checkpoints.len()
    }

    /// Ids in chain order.
    pub fn iter(&self) -> CatalogIter<'_> {
        CatalogIter {
            catalog: self,
            cursor: self.head,
        }
    }

    /// Exact-match point lookup, guided by the accelerator: narrow to the
    /// first segment whose max id covers `id`, then scan the chain.
    pub fn find(&self, id: u32) -> Option<u32> {
        let start = self.segment_for(id)?;
        let mut cursor = Some(self.checkpoints[start].first);

        while let Some(idx) = cursor {
            let node = &self.nodes[idx];
            if node.id == id {
                return Some(node.id);
            }
            if node.id > id {
                return None;
            }
            cursor = node.next;
        }

        None
    }

    pub fn contains(&self, id: u32) -> bool {
        self.find(id).is_some()
    }

    /// O(1) tail append. `id` must exceed every id currently in the chain.
    pub fn append(&mut self, id: u32) -> Result<()> {
        if let Some(max) = self.max_id() {
            if id <= max {
                return Err(EngineError::IndexCorruption(format!(
                    "append of id {id} violates tail order (max is {max})"
                )));
            }
        }

        let idx = self.nodes.len();
        self.nodes.push(CatalogNode { id, next: None });

        match self.tail {
            Some(tail) => {
                self.nodes[tail].next = Some(idx);
                self.tail = Some(idx);
                // Only the last segment learns about the new tail; the
                // degeneration budget bounds how long it may grow.
                if let Some(last) = self.checkpoints.last_mut() {
                    last.max_id = id;
                }
                self.len += 1;
                self.appends_since_rebuild += 1;
                if self.appends_since_rebuild > self.append_budget {
                    self.rebuild();
                }
            }
            None => {
                self.head = Some(idx);
                self.tail = Some(idx);
                self.len = 1;
                self.rebuild();
            }
        }

        Ok(())
    }

    /// Remove `id` from the chain. Absence is an integrity failure: removal
    /// is only ever requested for ids the caller just validated as live.
    pub fn remove(&mut self, id: u32) -> Result<()> {
        let seg = self.segment_for(id).ok_or_else(|| {
            EngineError::IndexCorruption(format!("remove of id {id} not covered by any segment"))
        })?;

        // Start one segment early so the predecessor of a segment anchor is
        // found during the same scan.
        let start = self.checkpoints[seg.saturating_sub(1)].first;
        let mut prev: Option<usize> = None;
        let mut cursor = if seg == 0 { self.head } else { Some(start) };

        let target = loop {
            let idx = match cursor {
                Some(idx) => idx,
                None => {
                    return Err(EngineError::IndexCorruption(format!(
                        "remove of id {id} which is not live"
                    )))
                }
            };
            let node = &self.nodes[idx];
            if node.id == id {
                break idx;
            }
            if node.id > id {
                return Err(EngineError::IndexCorruption(format!(
                    "remove of id {id} which is not live (scan passed {})",
                    node.id
                )));
            }
            prev = Some(idx);
            cursor = node.next;
        };

        let next = self.nodes[target].next;

        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        if self.tail == Some(target) {
            self.tail = prev;
        }
        self.len -= 1;

        // If the removed node anchored a segment, migrate the anchor to its
        // right neighbor unless that neighbor already anchors the next
        // segment, in which case the segment collapsed and we rebuild.
        let mut needs_rebuild = false;
        if let Some(anchor) = self.checkpoints.iter().position(|c| c.first == target) {
            match next {
                Some(next_idx)
                    if !self.checkpoints.iter().any(|c| c.first == next_idx) =>
                {
                    self.checkpoints[anchor].first = next_idx;
                }
                _ => needs_rebuild = true,
            }
        }

        if self.len == 0 {
            self.checkpoints.clear();
            self.base_segments = 0;
            return Ok(());
        }

        if needs_rebuild || isqrt(self.len) != self.base_segments {
            self.rebuild();
        }

        Ok(())
    }

    /// Recompute ⌊√n⌋ evenly sized segments (plus one remainder segment)
    /// over the live chain and reset the degeneration budget.
    pub fn rebuild(&mut self) {
        self.checkpoints.clear();
        self.appends_since_rebuild = 0;

        if self.len == 0 {
            self.base_segments = 0;
            self.append_budget = 2;
            return;
        }
        let Some(tail_idx) = self.tail else { return };

        let seg = isqrt(self.len).max(1);
        self.base_segments = seg;
        self.append_budget = 2 * seg;

        let mut cursor = self.head;
        for _ in 0..seg {
            let first = match cursor {
                Some(idx) => idx,
                None => break,
            };
            let mut last = first;
            for _ in 0..seg {
                match cursor {
                    Some(idx) => {
                        last = idx;
                        cursor = self.nodes[idx].next;
                    }
                    None => break,
                }
            }
            self.checkpoints.push(Checkpoint {
                max_id: self.nodes[last].id,
                first,
            });
        }

        // Leftover nodes from rounding ⌊√n⌋ down become one final segment.
        if let Some(first) = cursor {
            self.checkpoints.push(Checkpoint {
                max_id: self.nodes[tail_idx].id,
                first,
            });
        }
    }

    /// First segment whose max id covers `id`. Falls back to the last
    /// segment for ids beyond every checkpoint (fresh tail appends).
    fn segment_for(&self, id: u32) -> Option<usize> {
        if self.checkpoints.is_empty() {
            return None;
        }
        let pos = self
            .checkpoints
            .iter()
            .position(|c| c.max_id >= id)
            .unwrap_or(self.checkpoints.len() - 1);
        Some(pos)
    }

    /// Verify chain and accelerator invariants. Any violation means the
    /// structure can no longer be trusted for lookups.
    pub fn check_integrity(&self) -> Result<()> {
        let mut count = 0;
        let mut last_id: Option<u32> = None;
        let mut cursor = self.head;

        while let Some(idx) = cursor {
            let node = &self.nodes[idx];
            if let Some(prev) = last_id {
                if node.id <= prev {
                    return Err(EngineError::IndexCorruption(format!(
                        "chain order broken at id {} (previous {prev})",
                        node.id
                    )));
                }
            }
            last_id = Some(node.id);
            count += 1;
            cursor = node.next;
        }

        if count != self.len {
            return Err(EngineError::IndexCorruption(format!(
                "chain holds {count} nodes but len is {}",
                self.len
            )));
        }
        if self.tail.map(|idx| self.nodes[idx].id) != last_id {
            return Err(EngineError::IndexCorruption("tail pointer is stale".into()));
        }

        let mut prev_max: Option<u32> = None;
        for cp in &self.checkpoints {
            let first_id = self.nodes[cp.first].id;
            if first_id > cp.max_id {
                return Err(EngineError::IndexCorruption(format!(
                    "checkpoint max {} precedes its anchor {first_id}",
                    cp.max_id
                )));
            }
            if let Some(prev) = prev_max {
                if cp.max_id <= prev {
                    return Err(EngineError::IndexCorruption(format!(
                        "checkpoint max ids not increasing at {}",
                        cp.max_id
                    )));
                }
            }
            prev_max = Some(cp.max_id);
        }

        Ok(())
    }
}

pub struct CatalogIter<'a> {
    catalog: &'a Catalog,
    cursor: Option<usize>,
}

impl Iterator for CatalogIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let idx = self.cursor?;
        let node = &self.catalog.nodes[idx];
        self.cursor = node.next;
        Some(node.id)
    }
}

/// Per-process replica of the community state: the arena of records, the
/// catalog of live ids, and the inverse index from node to the communities
/// that have ever contained it.
#[derive(Debug)]
pub struct CommunityIndex {
    table: CommunityTable,
    catalog: Catalog,
    /// inverse[node] lists community ids, not deduplicated and never pruned;
    /// stale entries are resolved lazily through the redirection table.
    inverse: Vec<Vec<u32>>,
}

impl CommunityIndex {
    /// Build the index from an initial, already validated community
    /// collection (sorted unique node sets). Ids are issued densely in the
    /// order given, identically on every process.
    pub fn new(node_count: usize, communities: Vec<Vec<u32>>) -> Result<Self> {
        let mut index = Self {
            table: CommunityTable::new(),
            catalog: Catalog::new(),
            inverse: vec![Vec::new(); node_count],
        };

        for nodes in communities {
            let id = index.table.next_id();
            for &node in &nodes {
                index.inverse[node as usize].push(id);
            }
            index.table.insert_live(nodes, None);
            index.catalog.append(id)?;
        }
        index.catalog.rebuild();

        Ok(index)
    }

    pub fn node_count(&self) -> usize {
        self.inverse.len()
    }

    pub fn live_count(&self) -> usize {
        self.catalog.len()
    }

    pub fn max_live_id(&self) -> Option<u32> {
        self.catalog.max_id()
    }

    /// The id the next accepted merge must carry.
    pub fn next_id(&self) -> u32 {
        self.table.next_id()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Community ids (live or stale) recorded for `node`.
    pub fn node_communities(&self, node: u32) -> &[u32] {
        &self.inverse[node as usize]
    }

    /// Payload of `id` if it is live in the catalog.
    pub fn lookup(&self, id: u32) -> Option<&CommunityData> {
        self.catalog.find(id)?;
        self.table.data(id)
    }

    pub fn is_live(&self, id: u32) -> bool {
        self.catalog.contains(id)
    }

    /// Follow redirects to the live representative of `id`.
    pub fn resolve_live(&self, id: u32) -> u32 {
        self.table.resolve(id)
    }

    /// Payload of a record by id regardless of catalog membership.
    pub fn data(&self, id: u32) -> Option<&CommunityData> {
        self.table.data(id)
    }

    /// Cache a computed spectral value on a live record.
    pub fn set_spectral(&mut self, id: u32, value: f64) {
        self.table.set_spectral(id, value);
    }

    /// Apply the merge of live communities `a` and `b` into `merged_id`.
    ///
    /// This is the single deterministic state transition of the replication
    /// protocol: given the same update sequence, every replica ends up with
    /// the same index state. Returns `Ok(false)` without touching anything
    /// when either id is no longer live, which makes replay of a stale or
    /// duplicated update a counted no-op rather than an error.
    pub fn apply_update(&mut self, a: u32, b: u32, merged_id: u32) -> Result<bool> {
        if a == b {
            return Err(EngineError::InvalidMessage(format!(
                "merge of id {a} with itself"
            )));
        }
        if !self.is_live(a) || !self.is_live(b) {
            return Ok(false);
        }
        if merged_id != self.table.next_id() {
            return Err(EngineError::IndexCorruption(format!(
                "merged id {merged_id} does not match local issuance {}",
                self.table.next_id()
            )));
        }

        let nodes = match (self.table.data(a), self.table.data(b)) {
            (Some(da), Some(db)) => sets::union(&da.nodes, &db.nodes),
            _ => {
                return Err(EngineError::IndexCorruption(format!(
                    "catalog lists ids {a},{b} but the arena disagrees"
                )))
            }
        };

        self.catalog.remove(a)?;
        self.catalog.remove(b)?;

        let id = self.table.insert_live(nodes, None);
        debug_assert_eq!(id, merged_id);
        self.table.redirect(a, merged_id)?;
        self.table.redirect(b, merged_id)?;

        // The merged record is reachable through the stale inverse-index
        // entries of both inputs, so the inverse index is left untouched.
        self.catalog.append(merged_id)?;

        Ok(true)
    }

    /// Integrity check over catalog and arena consistency.
    pub fn check_integrity(&self) -> Result<()> {
        self.catalog.check_integrity()?;
        for id in self.catalog.iter() {
            if self.table.data(id).is_none() {
                return Err(EngineError::IndexCorruption(format!(
                    "catalog id {id} has no live record"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(ids: &[u32]) -> Catalog {
        let mut catalog = Catalog::new();
        for &id in ids {
            catalog.append(id).unwrap();
        }
        catalog.rebuild();
        catalog
    }

    #[test]
    fn chain_stays_sorted_under_append_and_remove() {
        let mut catalog = catalog_with(&(0..50).collect::<Vec<_>>());
        for id in [0, 13, 49, 27, 1] {
            catalog.remove(id).unwrap();
        }
        catalog.append(50).unwrap();
        catalog.append(51).unwrap();

        let ids: Vec<u32> = catalog.iter().collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(ids, sorted);
        assert_eq!(catalog.len(), 47);
        catalog.check_integrity().unwrap();
    }

    #[test]
    fn append_out_of_order_is_corruption() {
        let mut catalog = catalog_with(&[3, 9]);
        assert!(matches!(
            catalog.append(9),
            Err(EngineError::IndexCorruption(_))
        ));
    }

    #[test]
    fn find_hits_every_present_id_and_misses_absent() {
        let ids: Vec<u32> = (0..40).map(|i| i * 3).collect();
        let catalog = catalog_with(&ids);

        for &id in &ids {
            assert_eq!(catalog.find(id), Some(id));
        }
        for absent in [1, 2, 4, 118, 500] {
            assert_eq!(catalog.find(absent), None);
        }
    }

    #[test]
    fn segment_count_is_isqrt_after_rebuild() {
        for n in [1usize, 4, 10, 16, 17, 100, 101, 144] {
            let catalog = catalog_with(&(0..n as u32).collect::<Vec<_>>());
            let seg = isqrt(n);
            assert!(
                catalog.segment_count() == seg || catalog.segment_count() == seg + 1,
                "n={n}: got {} segments, expected {seg} (+1)",
                catalog.segment_count()
            );
        }
    }

    #[test]
    fn removing_a_segment_anchor_migrates_or_rebuilds() {
        let mut catalog = catalog_with(&(0..25).collect::<Vec<_>>());
        // Segment anchors sit at ids 0, 5, 10, 15, 20 after a clean rebuild.
        catalog.remove(10).unwrap();
        catalog.check_integrity().unwrap();
        for id in 0..25u32 {
            assert_eq!(catalog.find(id).is_some(), id != 10);
        }
        // Remove the migrated anchor too; its neighbor path forces either a
        // second migration or a rebuild, both of which must keep lookups exact.
        catalog.remove(11).unwrap();
        catalog.check_integrity().unwrap();
        assert!(catalog.find(12).is_some());
    }

    #[test]
    fn remove_of_absent_id_is_corruption() {
        let mut catalog = catalog_with(&[2, 4, 6]);
        assert!(matches!(
            catalog.remove(3),
            Err(EngineError::IndexCorruption(_))
        ));
    }

    #[test]
    fn heavy_append_churn_keeps_lookup_exact() {
        let mut catalog = catalog_with(&(0..9).collect::<Vec<_>>());
        // Appends past the degeneration budget trigger periodic rebuilds.
        for id in 9..200u32 {
            catalog.append(id).unwrap();
        }
        catalog.check_integrity().unwrap();
        assert_eq!(catalog.find(137), Some(137));
        assert_eq!(catalog.find(200), None);
    }

    fn small_index() -> CommunityIndex {
        // Five nodes, three communities: {0,1,2}, {2,3,4}, {0,4}.
        CommunityIndex::new(5, vec![vec![0, 1, 2], vec![2, 3, 4], vec![0, 4]]).unwrap()
    }

    #[test]
    fn inverse_index_records_membership() {
        let index = small_index();
        assert_eq!(index.node_communities(2), &[0, 1]);
        assert_eq!(index.node_communities(4), &[1, 2]);
        assert_eq!(index.live_count(), 3);
    }

    #[test]
    fn apply_update_ghosts_inputs_and_appends_once() {
        let mut index = small_index();
        let merged = index.next_id();
        assert!(index.apply_update(0, 1, merged).unwrap());

        assert!(!index.is_live(0));
        assert!(!index.is_live(1));
        assert!(index.is_live(merged));
        assert_eq!(index.lookup(merged).unwrap().nodes, vec![0, 1, 2, 3, 4]);
        assert_eq!(index.live_count(), 2);
        index.check_integrity().unwrap();
    }

    #[test]
    fn ghost_resolution_reaches_final_record_through_chains() {
        let mut index = small_index();
        let m1 = index.next_id();
        index.apply_update(0, 1, m1).unwrap();
        let m2 = index.next_id();
        index.apply_update(m1, 2, m2).unwrap();

        for stale in [0, 1, 2, m1] {
            assert_eq!(index.resolve_live(stale), m2);
        }
        assert_eq!(index.lookup(m2).unwrap().nodes, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn replaying_an_update_is_a_noop() {
        let mut index = small_index();
        let merged = index.next_id();
        assert!(index.apply_update(0, 1, merged).unwrap());
        // Same update again: both ids are ghosts now, nothing may change.
        assert!(!index.apply_update(0, 1, index.next_id()).unwrap());
        assert_eq!(index.live_count(), 2);
        index.check_integrity().unwrap();
    }

    #[test]
    fn self_merge_is_invalid() {
        let mut index = small_index();
        assert!(matches!(
            index.apply_update(1, 1, index.next_id()),
            Err(EngineError::InvalidMessage(_))
        ));
    }
}
