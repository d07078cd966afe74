//! Import committer collection strategies.

use aims_core::enums::{CollectionKind, CollectionStrategy};
use serde::{Deserialize, Serialize};

/// Strategy per child collection type. Fixed for a deployment, never chosen
/// per call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub participants: CollectionStrategy,
    #[serde(default)]
    pub sectors: CollectionStrategy,
    #[serde(default)]
    pub locations: CollectionStrategy,
    #[serde(default)]
    pub budgets: CollectionStrategy,
    #[serde(default)]
    pub transactions: CollectionStrategy,
    #[serde(default)]
    pub results: CollectionStrategy,
}

impl StrategyConfig {
    #[must_use]
    pub const fn for_kind(&self, kind: CollectionKind) -> CollectionStrategy {
        match kind {
            CollectionKind::Participants => self.participants,
            CollectionKind::Sectors => self.sectors,
            CollectionKind::Locations => self.locations,
            CollectionKind::Budgets => self.budgets,
            CollectionKind::Transactions => self.transactions,
            CollectionKind::Results => self.results,
        }
    }

    #[must_use]
    pub const fn with(mut self, kind: CollectionKind, strategy: CollectionStrategy) -> Self {
        match kind {
            CollectionKind::Participants => self.participants = strategy,
            CollectionKind::Sectors => self.sectors = strategy,
            CollectionKind::Locations => self.locations = strategy,
            CollectionKind::Budgets => self.budgets = strategy,
            CollectionKind::Transactions => self.transactions = strategy,
            CollectionKind::Results => self.results = strategy,
        }
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImportConfig {
    #[serde(default)]
    pub strategies: StrategyConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_collection_defaults_to_replace() {
        let config = StrategyConfig::default();
        for kind in CollectionKind::ALL {
            assert_eq!(config.for_kind(kind), CollectionStrategy::Replace);
        }
    }

    #[test]
    fn with_overrides_one_collection() {
        let config =
            StrategyConfig::default().with(CollectionKind::Transactions, CollectionStrategy::Append);
        assert_eq!(
            config.for_kind(CollectionKind::Transactions),
            CollectionStrategy::Append
        );
        assert_eq!(
            config.for_kind(CollectionKind::Budgets),
            CollectionStrategy::Replace
        );
    }
}
