use std::cmp::Ordering;
use std::sync::Arc;

/// A total order over opaque keys.
///
/// Every ordered structure in the engine (skip list, blocks, tables, merge
/// iterators, merged indices) is handed one of these instead of assuming
/// lexicographic byte order.
///
/// Contract:
/// - `compare` is a total order.
/// - `Equal` is returned only for byte-identical keys. Bloom filters and
///   per-key shadowing depend on this.
/// - Prefix lookups are only served when `supports_prefix_scan` returns
///   `true`, which promises that keys sharing a prefix sort contiguously,
///   starting at the prefix itself.
///
/// `name()` is persisted with every immutable index; reopening an index
/// under a differently named order is rejected.
pub trait KeyOrder: Send + Sync {
    /// Stable identifier of this order.
    fn name(&self) -> &str;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Whether every key sorts ahead of its own extensions, so a prefix
    /// lookup can seek to the prefix and stop at the first mismatch.
    ///
    /// Off unless an order opts in; a wrong `true` makes prefix lookups
    /// silently drop keys.
    fn supports_prefix_scan(&self) -> bool {
        false
    }
}

/// Shared handle threaded through every ordered structure.
pub type OrderRef = Arc<dyn KeyOrder>;

/// Plain lexicographic byte order.
#[derive(Debug, Default, Clone, Copy)]
pub struct Bytewise;

impl KeyOrder for Bytewise {
    fn name(&self) -> &str {
        "bytewise"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn supports_prefix_scan(&self) -> bool {
        true
    }
}

/// Descending byte order.
#[derive(Debug, Default, Clone, Copy)]
pub struct Reverse;

impl KeyOrder for Reverse {
    fn name(&self) -> &str {
        "reverse-bytewise"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        b.cmp(a)
    }
}

/// The default order handle.
pub fn bytewise() -> OrderRef {
    Arc::new(Bytewise)
}
