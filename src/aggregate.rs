//! Page aggregation module.
//!
//! Folds transfer pages into running per-node and per-edge totals. Values are
//! kept as integer micro-USD so the fold is order independent.

use crate::schemas::TransferRecord;
use std::collections::HashMap;

const MICROS_PER_USD: f64 = 1_000_000.0;

/// Convert an absolute USD amount to whole micro-dollars.
pub fn to_micros(usd: f64) -> u128 {
    if !usd.is_finite() || usd <= 0.0 {
        return 0;
    }
    (usd * MICROS_PER_USD).round() as u128
}

pub fn from_micros(micros: u128) -> f64 {
    micros as f64 / MICROS_PER_USD
}

/// Directed (sender, receiver) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub sender: String,
    pub receiver: String,
}

impl EdgeKey {
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
        }
    }
}

/// Running totals for one directed pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeTotals {
    pub value_micros: u128,
    pub count: u64,
}

/// Address -> total absolute value seen as sender or receiver
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeAccumulator {
    totals: HashMap<String, u128>,
}

impl NodeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, address: &str, micros: u128) {
        // Avoid allocating a key for addresses already present.
        match self.totals.get_mut(address) {
            Some(total) => *total = total.saturating_add(micros),
            None => {
                self.totals.insert(address.to_string(), micros);
            }
        }
    }

    pub fn value_micros(&self, address: &str) -> Option<u128> {
        self.totals.get(address).copied()
    }

    /// Total in USD
    pub fn value(&self, address: &str) -> Option<f64> {
        self.value_micros(address).map(from_micros)
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u128)> {
        self.totals.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Directed pair -> total absolute value and transfer count
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EdgeAccumulator {
    totals: HashMap<EdgeKey, EdgeTotals>,
}

impl EdgeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sender: &str, receiver: &str, micros: u128) {
        let entry = self
            .totals
            .entry(EdgeKey::new(sender, receiver))
            .or_default();
        entry.value_micros = entry.value_micros.saturating_add(micros);
        entry.count += 1;
    }

    pub fn get(&self, sender: &str, receiver: &str) -> Option<EdgeTotals> {
        self.totals.get(&EdgeKey::new(sender, receiver)).copied()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EdgeKey, &EdgeTotals)> {
        self.totals.iter()
    }
}

/// Fold one page into the accumulators.
///
/// Each record adds `|amount|` to both endpoint nodes and to the directed
/// edge, and bumps that edge's count by one. Missing addresses resolve to the
/// sentinel identifiers.
pub fn fold_page(page: &[TransferRecord], nodes: &mut NodeAccumulator, edges: &mut EdgeAccumulator) {
    for transfer in page {
        let micros = to_micros(transfer.usd());
        let sender = transfer.sender_address();
        let receiver = transfer.receiver_address();

        nodes.add(sender, micros);
        nodes.add(receiver, micros);
        edges.add(sender, receiver, micros);
    }
}
