//! Process-wide memory accounting for foreign heap allocations.
//!
//! The ledger never allocates itself; callers consult it before requesting
//! large foreign heap regions and release their reservation afterwards.

/// Allocation ledger with a configurable ceiling and scoped reservations.
pub mod budget;

pub use budget::{BudgetReservation, MemoryBudgetGuard};
