use std::fmt;
use std::sync::Arc;

use constants::memory::{DEFAULT_BUDGET_MB, MIB};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{PipelineError, Result};

#[derive(Debug)]
struct Ledger {
    ceiling: u64,
    allocated: u64,
}

/// Admission-control gate tracking bytes handed to the foreign heap.
///
/// Clones share one ledger. Construct separate instances for isolated tests.
#[derive(Clone)]
pub struct MemoryBudgetGuard {
    ledger: Arc<Mutex<Ledger>>,
}

impl MemoryBudgetGuard {
    /// Create a guard with a ceiling in bytes.
    pub fn new(ceiling: u64) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger {
                ceiling,
                allocated: 0,
            })),
        }
    }

    /// Create a guard with a ceiling in MiB.
    pub fn with_ceiling_mb(ceiling_mb: u64) -> Self {
        Self::new(ceiling_mb * MIB)
    }

    /// Would `size` more bytes still fit under the ceiling?
    pub fn can_allocate(&self, size: u64) -> bool {
        let ledger = self.ledger.lock();
        fits(&ledger, size)
    }

    /// Record `size` bytes. Returns false and leaves the ledger untouched when
    /// the ceiling would be exceeded.
    pub fn allocate(&self, size: u64) -> bool {
        let mut ledger = self.ledger.lock();
        if !fits(&ledger, size) {
            return false;
        }
        ledger.allocated += size;
        true
    }

    /// Release `size` bytes, saturating at zero.
    pub fn free(&self, size: u64) {
        let mut ledger = self.ledger.lock();
        ledger.allocated = ledger.allocated.saturating_sub(size);
    }

    /// Reserve `size` bytes for the lifetime of the returned guard.
    pub fn reserve(&self, size: u64) -> Result<BudgetReservation> {
        let mut ledger = self.ledger.lock();
        if !fits(&ledger, size) {
            return Err(PipelineError::MemoryBudgetExceeded {
                requested: size,
                in_use: ledger.allocated,
                ceiling: ledger.ceiling,
            });
        }
        ledger.allocated += size;
        debug!(
            "Reserved {} bytes ({} of {} in use)",
            size, ledger.allocated, ledger.ceiling
        );

        Ok(BudgetReservation {
            guard: self.clone(),
            size,
        })
    }

    /// Bytes currently recorded.
    pub fn in_use(&self) -> u64 {
        self.ledger.lock().allocated
    }

    /// Configured ceiling in bytes.
    pub fn ceiling(&self) -> u64 {
        self.ledger.lock().ceiling
    }

    /// Ledger usage as "x.xxMB".
    pub fn usage(&self) -> String {
        format!("{:.2}MB", self.in_use() as f64 / MIB as f64)
    }
}

impl Default for MemoryBudgetGuard {
    fn default() -> Self {
        Self::with_ceiling_mb(DEFAULT_BUDGET_MB)
    }
}

impl fmt::Debug for MemoryBudgetGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ledger = self.ledger.lock();
        f.debug_struct("MemoryBudgetGuard")
            .field("allocated", &ledger.allocated)
            .field("ceiling", &ledger.ceiling)
            .finish()
    }
}

fn fits(ledger: &Ledger, size: u64) -> bool {
    ledger
        .allocated
        .checked_add(size)
        .is_some_and(|total| total <= ledger.ceiling)
}

/// Scoped ledger entry; the bytes are freed when this is dropped.
#[must_use = "dropping the reservation releases it immediately"]
#[derive(Debug)]
pub struct BudgetReservation {
    guard: MemoryBudgetGuard,
    size: u64,
}

impl BudgetReservation {
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for BudgetReservation {
    fn drop(&mut self) {
        self.guard.free(self.size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ceiling_is_500_mib() {
        assert_eq!(MemoryBudgetGuard::default().ceiling(), 500 * MIB);
    }

    #[test]
    fn allocate_refuses_without_touching_ledger() {
        let guard = MemoryBudgetGuard::new(100);
        assert!(guard.allocate(60));
        assert!(!guard.can_allocate(41));
        assert!(!guard.allocate(41));
        assert_eq!(guard.in_use(), 60);
        assert!(guard.allocate(40));
        assert_eq!(guard.in_use(), 100);
    }

    #[test]
    fn free_saturates_at_zero() {
        let guard = MemoryBudgetGuard::new(100);
        assert!(guard.allocate(10));
        guard.free(25);
        assert_eq!(guard.in_use(), 0);
    }

    #[test]
    fn reservation_releases_on_drop_and_reports_denial() {
        let guard = MemoryBudgetGuard::new(1_000);
        {
            let held = guard.reserve(600).unwrap();
            assert_eq!(held.size(), 600);
            assert_eq!(guard.in_use(), 600);

            let denied = guard.reserve(500).unwrap_err();
            assert_eq!(
                denied,
                PipelineError::MemoryBudgetExceeded {
                    requested: 500,
                    in_use: 600,
                    ceiling: 1_000,
                }
            );
        }
        assert_eq!(guard.in_use(), 0);
    }

    #[test]
    fn clones_share_one_ledger() {
        let guard = MemoryBudgetGuard::new(MIB);
        let other = guard.clone();
        assert!(other.allocate(MIB / 2));
        assert_eq!(guard.in_use(), MIB / 2);
        assert_eq!(guard.usage(), "0.50MB");
    }
}
