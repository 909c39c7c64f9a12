use crate::event::{Level, OrderBookDelta, OrderBookSnapshot};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;

/// Failure applying an [`OrderBookDelta`] to a local [`OrderBook`].
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum BookError {
    /// The delta does not chain onto the local sequence id: a fresh snapshot must be
    /// fetched and applied atomically before continuing.
    #[error("book sequence gap: local last_update_id={local} delta first_update_id={first}")]
    SequenceGap { local: u64, first: u64 },

    /// Delta predates the local snapshot entirely and can be discarded.
    #[error("stale delta: local last_update_id={local} delta last_update_id={last}")]
    Stale { local: u64, last: u64 },
}

/// Locally maintained order book for one symbol.
///
/// A snapshot replaces all state; deltas mutate it level-by-level with a level amount
/// of zero removing the price.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct OrderBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_update_id: u64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    /// Replace the full book state with the provided snapshot.
    pub fn apply_snapshot(&mut self, snapshot: &OrderBookSnapshot) {
        self.bids = snapshot
            .bids
            .iter()
            .map(|level| (level.price, level.amount))
            .collect();
        self.asks = snapshot
            .asks
            .iter()
            .map(|level| (level.price, level.amount))
            .collect();
        self.last_update_id = snapshot.last_update_id;
    }

    /// Apply an incremental update, enforcing sequence continuity.
    pub fn apply_delta(&mut self, delta: &OrderBookDelta) -> Result<(), BookError> {
        if delta.last_update_id <= self.last_update_id {
            return Err(BookError::Stale {
                local: self.last_update_id,
                last: delta.last_update_id,
            });
        }
        if delta.first_update_id > self.last_update_id + 1 {
            return Err(BookError::SequenceGap {
                local: self.last_update_id,
                first: delta.first_update_id,
            });
        }

        for level in &delta.bids {
            Self::apply_level(&mut self.bids, level);
        }
        for level in &delta.asks {
            Self::apply_level(&mut self.asks, level);
        }
        self.last_update_id = delta.last_update_id;
        Ok(())
    }

    fn apply_level(side: &mut BTreeMap<Decimal, Decimal>, level: &Level) {
        if level.amount.is_zero() {
            side.remove(&level.price);
        } else {
            side.insert(level.price, level.amount);
        }
    }

    /// Highest bid level, if any.
    pub fn best_bid(&self) -> Option<Level> {
        self.bids
            .iter()
            .next_back()
            .map(|(price, amount)| Level::new(*price, *amount))
    }

    /// Lowest ask level, if any.
    pub fn best_ask(&self) -> Option<Level> {
        self.asks
            .iter()
            .next()
            .map(|(price, amount)| Level::new(*price, *amount))
    }

    /// Export the top `depth` levels each side, bids descending and asks ascending.
    pub fn snapshot(&self, depth: usize) -> OrderBookSnapshot {
        OrderBookSnapshot {
            last_update_id: self.last_update_id,
            bids: self
                .bids
                .iter()
                .rev()
                .take(depth)
                .map(|(price, amount)| Level::new(*price, *amount))
                .collect(),
            asks: self
                .asks
                .iter()
                .take(depth)
                .map(|(price, amount)| Level::new(*price, *amount))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot() -> OrderBookSnapshot {
        OrderBookSnapshot::new(
            100,
            vec![
                Level::new(dec!(99), dec!(1)),
                Level::new(dec!(98), dec!(2)),
            ],
            vec![
                Level::new(dec!(101), dec!(1)),
                Level::new(dec!(102), dec!(2)),
            ],
        )
    }

    #[test]
    fn test_snapshot_replaces_book() {
        let mut book = OrderBook::new();
        book.apply_snapshot(&snapshot());
        assert_eq!(book.best_bid(), Some(Level::new(dec!(99), dec!(1))));
        assert_eq!(book.best_ask(), Some(Level::new(dec!(101), dec!(1))));
        assert_eq!(book.last_update_id(), 100);
    }

    #[test]
    fn test_delta_applies_and_removes_levels() {
        let mut book = OrderBook::new();
        book.apply_snapshot(&snapshot());

        let delta = OrderBookDelta::new(
            101,
            102,
            vec![
                Level::new(dec!(99), dec!(0)),
                Level::new(dec!(97), dec!(5)),
            ],
            vec![Level::new(dec!(101), dec!(3))],
        );
        book.apply_delta(&delta).unwrap();

        assert_eq!(book.best_bid(), Some(Level::new(dec!(98), dec!(2))));
        assert_eq!(book.best_ask(), Some(Level::new(dec!(101), dec!(3))));
        assert_eq!(book.last_update_id(), 102);
    }

    #[test]
    fn test_sequence_gap_forces_resync() {
        let mut book = OrderBook::new();
        book.apply_snapshot(&snapshot());

        let delta = OrderBookDelta::new(105, 106, vec![], vec![]);
        assert_eq!(
            book.apply_delta(&delta),
            Err(BookError::SequenceGap {
                local: 100,
                first: 105
            })
        );
    }

    #[test]
    fn test_resync_recovers_from_gap() {
        let mut book = OrderBook::new();
        book.apply_snapshot(&snapshot());

        let gapped = OrderBookDelta::new(105, 106, vec![Level::new(dec!(97), dec!(1))], vec![]);
        assert!(book.apply_delta(&gapped).is_err());

        // A fresh snapshot replaces the book atomically; the delta chain resumes.
        let fresh = OrderBookSnapshot::new(
            105,
            vec![Level::new(dec!(99.5), dec!(3))],
            vec![Level::new(dec!(100.5), dec!(3))],
        );
        book.apply_snapshot(&fresh);
        let next = OrderBookDelta::new(106, 106, vec![Level::new(dec!(99.6), dec!(1))], vec![]);
        book.apply_delta(&next).unwrap();
        assert_eq!(book.best_bid(), Some(Level::new(dec!(99.6), dec!(1))));
    }

    #[test]
    fn test_stale_delta_discarded() {
        let mut book = OrderBook::new();
        book.apply_snapshot(&snapshot());

        let delta = OrderBookDelta::new(99, 100, vec![], vec![]);
        assert_eq!(
            book.apply_delta(&delta),
            Err(BookError::Stale {
                local: 100,
                last: 100
            })
        );
    }
}
