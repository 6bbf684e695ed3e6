//! Fungible-unit ledgers with zero-sum transfer semantics.
//!
//! A [`Ledger`] maps a card kind to a non-negative count. Every movement of
//! units between ledgers goes through [`Ledger::transfer`] or
//! [`Ledger::transfer_all`], which verify the source balance before moving
//! anything: a failed transfer leaves both ledgers untouched. Units are only
//! minted by the genesis constructors ([`bank`], [`dev_deck`]), so for the
//! life of a game the total of each kind across all ledgers is constant.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;

/// The five resource card kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ResourceKind {
    Brick,
    Lumber,
    Ore,
    Grain,
    Wool,
}

impl ResourceKind {
    /// All resource kinds.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Brick,
        ResourceKind::Lumber,
        ResourceKind::Ore,
        ResourceKind::Grain,
        ResourceKind::Wool,
    ];
}

/// The five development card kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum DevCard {
    /// Move the robber and steal; counts toward the largest army
    Soldier,
    /// Worth one point, never played
    VictoryPoint,
    /// Place two roads for free
    RoadBuilding,
    /// Draw any two resources from the bank
    YearOfPlenty,
    /// Collect every copy of one resource from every opponent
    Monopoly,
}

impl DevCard {
    /// All development card kinds.
    pub const ALL: [DevCard; 5] = [
        DevCard::Soldier,
        DevCard::VictoryPoint,
        DevCard::RoadBuilding,
        DevCard::YearOfPlenty,
        DevCard::Monopoly,
    ];
}

/// Raised when a transfer is attempted without sufficient balance on the
/// source ledger. No partial transfer ever occurs.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("insufficient {kind}: needed {needed}, have {available}")]
pub struct ResourceShortfall {
    /// Debug name of the lacking kind
    pub kind: String,
    pub needed: u32,
    pub available: u32,
}

/// A kind-to-count container. Used for resource hands, the bank, both
/// development card piles per player, the development deck, trade sides and
/// discard selections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger<K: Ord> {
    counts: BTreeMap<K, u32>,
}

impl<K: Copy + Ord + Hash + Debug> Ledger<K> {
    /// An empty ledger.
    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Build a ledger from explicit (kind, count) pairs.
    pub fn from_counts(counts: &[(K, u32)]) -> Self {
        let mut ledger = Self::new();
        for &(kind, n) in counts {
            ledger.grant(kind, n);
        }
        ledger
    }

    /// Count of one kind.
    pub fn count(&self, kind: K) -> u32 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Total units across all kinds.
    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    /// Whether the ledger holds nothing.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Iterate over (kind, count) pairs with non-zero counts, in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (K, u32)> + '_ {
        self.counts.iter().map(|(k, n)| (*k, *n))
    }

    /// Mint `n` units of `kind` into this ledger.
    ///
    /// Only genesis constructors and tests should mint; gameplay moves units
    /// exclusively through transfers.
    pub fn grant(&mut self, kind: K, n: u32) {
        if n > 0 {
            *self.counts.entry(kind).or_insert(0) += n;
        }
    }

    /// Whether this ledger holds at least `amounts` of every kind.
    pub fn covers(&self, amounts: &Ledger<K>) -> bool {
        self.deficit(amounts).is_none()
    }

    /// The first kind (in kind order) for which this ledger cannot cover
    /// `amounts`, as a ready-made shortfall error.
    pub fn deficit(&self, amounts: &Ledger<K>) -> Option<ResourceShortfall> {
        for (kind, needed) in amounts.iter() {
            let available = self.count(kind);
            if available < needed {
                return Some(ResourceShortfall {
                    kind: format!("{kind:?}"),
                    needed,
                    available,
                });
            }
        }
        None
    }

    /// Move `n` units of `kind` into `dest`. Verifies the balance first; on
    /// failure neither ledger changes.
    pub fn transfer(
        &mut self,
        dest: &mut Ledger<K>,
        kind: K,
        n: u32,
    ) -> Result<(), ResourceShortfall> {
        let available = self.count(kind);
        if available < n {
            return Err(ResourceShortfall {
                kind: format!("{kind:?}"),
                needed: n,
                available,
            });
        }
        self.remove(kind, n);
        dest.grant(kind, n);
        Ok(())
    }

    /// Move `amounts` of every kind into `dest` as one all-or-nothing
    /// operation.
    pub fn transfer_all(
        &mut self,
        dest: &mut Ledger<K>,
        amounts: &Ledger<K>,
    ) -> Result<(), ResourceShortfall> {
        if let Some(shortfall) = self.deficit(amounts) {
            return Err(shortfall);
        }
        for (kind, n) in amounts.iter() {
            self.remove(kind, n);
            dest.grant(kind, n);
        }
        Ok(())
    }

    /// Pick one unit uniformly at random across every unit in the ledger
    /// (a kind held 3 times is three times as likely as a kind held once).
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<K> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let mut pick = rng.gen_range(0..total);
        for (kind, n) in self.iter() {
            if pick < n {
                return Some(kind);
            }
            pick -= n;
        }
        None
    }

    fn remove(&mut self, kind: K, n: u32) {
        if n == 0 {
            return;
        }
        // Zero entries are dropped so equality never depends on history.
        if let Some(count) = self.counts.get_mut(&kind) {
            *count -= n;
            if *count == 0 {
                self.counts.remove(&kind);
            }
        }
    }
}

/// The bank at game start: 19 of each resource kind.
pub fn bank() -> Ledger<ResourceKind> {
    Ledger::from_counts(&ResourceKind::ALL.map(|kind| (kind, 19)))
}

/// The development deck at game start: 25 cards.
pub fn dev_deck() -> Ledger<DevCard> {
    Ledger::from_counts(&[
        (DevCard::Soldier, 14),
        (DevCard::VictoryPoint, 5),
        (DevCard::RoadBuilding, 2),
        (DevCard::YearOfPlenty, 2),
        (DevCard::Monopoly, 2),
    ])
}

/// Build costs, expressed as ledgers to transfer into the bank.
pub mod costs {
    use super::{Ledger, ResourceKind};

    /// Road: 1 brick, 1 lumber.
    pub fn road() -> Ledger<ResourceKind> {
        Ledger::from_counts(&[(ResourceKind::Brick, 1), (ResourceKind::Lumber, 1)])
    }

    /// Settlement: 1 brick, 1 lumber, 1 grain, 1 wool.
    pub fn settlement() -> Ledger<ResourceKind> {
        Ledger::from_counts(&[
            (ResourceKind::Brick, 1),
            (ResourceKind::Lumber, 1),
            (ResourceKind::Grain, 1),
            (ResourceKind::Wool, 1),
        ])
    }

    /// City upgrade: 3 ore, 2 grain.
    pub fn city() -> Ledger<ResourceKind> {
        Ledger::from_counts(&[(ResourceKind::Ore, 3), (ResourceKind::Grain, 2)])
    }

    /// Development card: 1 ore, 1 grain, 1 wool.
    pub fn dev_card() -> Ledger<ResourceKind> {
        Ledger::from_counts(&[
            (ResourceKind::Ore, 1),
            (ResourceKind::Grain, 1),
            (ResourceKind::Wool, 1),
        ])
    }
}
