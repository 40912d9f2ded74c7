//! Policy table for automatic conflict resolution
//!
//! Maps entity kinds to resolution strategies from configuration. Invalid
//! entries are logged and skipped; `keep-both` is only honored for
//! append-only kinds, where a "conflict" is really two independent inserts.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use matchline_core::config::ConflictsConfig;
use matchline_core::domain::conflict::ConflictStrategy;
use matchline_core::domain::newtypes::EntityKind;

/// Returns true for kinds whose rows are only ever appended
///
/// Append-only kinds may use `keep-both`: both versions are retained as
/// separate rows and nothing needs merging.
#[must_use]
pub fn is_append_only(kind: EntityKind) -> bool {
    matches!(
        kind,
        EntityKind::Message | EntityKind::Swipe | EntityKind::Achievement
    )
}

/// Per-entity-kind strategy table
pub struct StrategyPolicy {
    default: ConflictStrategy,
    per_kind: BTreeMap<EntityKind, ConflictStrategy>,
}

impl StrategyPolicy {
    /// Builds the policy from configuration
    ///
    /// Unparseable kinds or strategies are logged and skipped; a
    /// `keep-both` entry on a non-append-only kind falls back to the
    /// default strategy.
    #[must_use]
    pub fn from_config(config: &ConflictsConfig) -> Self {
        let default = config
            .default_strategy
            .parse::<ConflictStrategy>()
            .unwrap_or_else(|_| {
                warn!(
                    strategy = %config.default_strategy,
                    "Invalid default conflict strategy, using server-wins"
                );
                ConflictStrategy::ServerWins
            });

        let mut per_kind = BTreeMap::new();
        for (table, strategy) in &config.strategies {
            let kind = match table.parse::<EntityKind>() {
                Ok(k) => k,
                Err(_) => {
                    warn!(table = %table, "Skipping conflict rule for unknown table");
                    continue;
                }
            };
            let strategy = match strategy.parse::<ConflictStrategy>() {
                Ok(s) => s,
                Err(_) => {
                    warn!(table = %table, strategy = %strategy, "Skipping invalid conflict strategy");
                    continue;
                }
            };
            if strategy == ConflictStrategy::KeepBoth && !is_append_only(kind) {
                warn!(
                    table = %table,
                    "keep-both only applies to append-only tables, using default"
                );
                continue;
            }
            per_kind.insert(kind, strategy);
        }

        debug!(
            rules = per_kind.len(),
            default = %default,
            "Conflict strategy policy initialized"
        );

        Self { default, per_kind }
    }

    /// The strategy to apply for a given entity kind
    #[must_use]
    pub fn strategy_for(&self, kind: EntityKind) -> ConflictStrategy {
        self.per_kind.get(&kind).copied().unwrap_or(self.default)
    }
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        Self::from_config(&ConflictsConfig::default())
    }
}
