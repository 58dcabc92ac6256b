//! Logical tables of the persisted state.

use std::fmt;

/// One logical table of the persisted state layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// Registered token specs, keyed by token id.
    Tokens,
    /// Account balances, keyed by `(token, account)`.
    Balances,
    /// Total supply per token.
    Supplies,
    /// Custodian set, merchant set and quorum threshold.
    Registry,
    /// Append-only custody request log, keyed by big-endian request id.
    Requests,
    /// Pool reserve state, keyed by pool id.
    Pools,
    /// Schema version and sequence counters.
    Meta,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Tokens,
        Table::Balances,
        Table::Supplies,
        Table::Registry,
        Table::Requests,
        Table::Pools,
        Table::Meta,
    ];

    /// Database name used by backends that keep one named database per table.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Tokens => "tokens",
            Table::Balances => "balances",
            Table::Supplies => "supplies",
            Table::Registry => "registry",
            Table::Requests => "requests",
            Table::Pools => "pools",
            Table::Meta => "meta",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
