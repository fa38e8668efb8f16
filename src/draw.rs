// src/draw.rs
//! The draw: one scan over the stored bets, winners grouped by agency.

use std::collections::HashMap;

use anyhow::Result;

use crate::store::Store;

/// Winning document ids per agency, in store scan order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Winners {
    by_agency: HashMap<u32, Vec<String>>,
}

impl Winners {
    /// The winning documents for one agency; empty if it had none.
    pub fn for_agency(&self, agency: u32) -> &[String] {
        self.by_agency.get(&agency).map_or(&[], Vec::as_slice)
    }

    pub fn total(&self) -> usize {
        self.by_agency.values().map(Vec::len).sum()
    }
}

/// Run the draw over the current store contents.
///
/// Pure function of the store; the orchestrator guarantees it runs exactly
/// once per execution, after every agency has finished appending.
pub async fn run_draw(store: &Store) -> Result<Winners> {
    let mut winners = Winners::default();
    for bet in store.load_all().await? {
        if bet.has_won() {
            winners
                .by_agency
                .entry(bet.agency)
                .or_default()
                .push(bet.document);
        }
    }
    Ok(winners)
}
