//! Community records and the id-keyed redirection arena.
//!
//! Ids are dense `u32`s issued in strictly increasing order by a single
//! authority (initial load, then the coordinator). A merge never rewrites the
//! records it consumes in place: the consumed ids become `Redirect` entries
//! pointing at the successor, and any stale reference held elsewhere (most
//! importantly the inverse index) is resolved lazily by chasing redirects to
//! the live fixed point. Slots are never reclaimed mid-run.

use serde::Serialize;

use crate::error::{EngineError, Result};

/// Payload of a live community.
#[derive(Debug, Clone, Serialize)]
pub struct CommunityData {
    /// Member node ids, strictly sorted ascending.
    pub nodes: Vec<u32>,
    /// Second-smallest normalized-Laplacian eigenvalue of the induced
    /// subgraph. `None` means not yet computed; a genuine 0.0 is possible
    /// for disconnected induced subgraphs and must stay distinguishable.
    pub spectral: Option<f64>,
}

impl CommunityData {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// One arena slot: either a live record or a ghost redirecting to the record
/// its community was merged into.
#[derive(Debug, Clone)]
pub enum Slot {
    Live(CommunityData),
    Redirect(u32),
}

/// Append-only arena of community records, indexed by id.
#[derive(Debug, Default)]
pub struct CommunityTable {
    slots: Vec<Slot>,
}

impl CommunityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next `insert_live` will receive.
    pub fn next_id(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Insert a live record and return its id.
    pub fn insert_live(&mut self, nodes: Vec<u32>, spectral: Option<f64>) -> u32 {
        let id = self.next_id();
        self.slots.push(Slot::Live(CommunityData { nodes, spectral }));
        id
    }

    /// Payload of `id` if the slot exists and is live.
    pub fn data(&self, id: u32) -> Option<&CommunityData> {
        match self.slots.get(id as usize) {
            Some(Slot::Live(data)) => Some(data),
            _ => None,
        }
    }

    /// Cache a computed spectral value on a live record.
    pub fn set_spectral(&mut self, id: u32, value: f64) {
        if let Some(Slot::Live(data)) = self.slots.get_mut(id as usize) {
            data.spectral = Some(value);
        }
    }

    /// Turn `id` into a ghost pointing at `target`. The old payload is
    /// dropped; anything still referencing `id` resolves through the
    /// redirect from now on.
    pub fn redirect(&mut self, id: u32, target: u32) -> Result<()> {
        match self.slots.get_mut(id as usize) {
            Some(slot @ Slot::Live(_)) => {
                *slot = Slot::Redirect(target);
                Ok(())
            }
            Some(Slot::Redirect(_)) => Err(EngineError::IndexCorruption(format!(
                "redirecting id {id} which is already a ghost"
            ))),
            None => Err(EngineError::IndexCorruption(format!(
                "redirecting unknown id {id}"
            ))),
        }
    }

    /// Follow redirects from `id` to the live fixed point.
    ///
    /// Redirects always point at strictly larger ids, so the chase
    /// terminates without cycle bookkeeping.
    pub fn resolve(&self, mut id: u32) -> u32 {
        while let Some(Slot::Redirect(target)) = self.slots.get(id as usize) {
            id = *target;
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_issue_densely() {
        let mut table = CommunityTable::new();
        assert_eq!(table.insert_live(vec![0, 1], None), 0);
        assert_eq!(table.insert_live(vec![2], None), 1);
        assert_eq!(table.next_id(), 2);
    }

    #[test]
    fn resolve_chases_redirect_chain() {
        let mut table = CommunityTable::new();
        let a = table.insert_live(vec![0], None);
        let b = table.insert_live(vec![1], None);
        let m1 = table.insert_live(vec![0, 1], None);
        table.redirect(a, m1).unwrap();
        table.redirect(b, m1).unwrap();
        let m2 = table.insert_live(vec![0, 1, 2], None);
        table.redirect(m1, m2).unwrap();

        assert_eq!(table.resolve(a), m2);
        assert_eq!(table.resolve(b), m2);
        assert_eq!(table.resolve(m2), m2);
        assert!(table.data(a).is_none());
        assert_eq!(table.data(m2).unwrap().nodes, vec![0, 1, 2]);
    }

    #[test]
    fn double_redirect_is_corruption() {
        let mut table = CommunityTable::new();
        let a = table.insert_live(vec![0], None);
        let b = table.insert_live(vec![1], None);
        table.redirect(a, b).unwrap();
        assert!(table.redirect(a, b).is_err());
    }

    #[test]
    fn spectral_zero_is_distinct_from_unset() {
        let mut table = CommunityTable::new();
        let id = table.insert_live(vec![0, 5], None);
        assert_eq!(table.data(id).unwrap().spectral, None);
        table.set_spectral(id, 0.0);
        assert_eq!(table.data(id).unwrap().spectral, Some(0.0));
    }
}
