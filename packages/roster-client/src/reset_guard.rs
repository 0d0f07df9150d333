//! Page-reset guard.
//!
//! A data change normally sends the grid back to page 0. A mutation the user
//! just made should not do that, so dispatching one disarms the guard for the
//! next render cycle that sees a change.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageResetGuard {
    /// Data changes reset the page index
    #[default]
    Armed,
    /// The next cycle that observes a data change keeps the page index
    DisarmedForNextCycle,
    /// Inside the skipped cycle; re-arms when the cycle ends
    RearmPending,
}

impl PageResetGuard {
    /// Called when a mutation is dispatched.
    pub fn disarm(&mut self) {
        *self = PageResetGuard::DisarmedForNextCycle;
    }

    /// Starts a render cycle and returns whether the page index must reset.
    pub fn begin_cycle(&mut self, data_changed: bool) -> bool {
        match *self {
            PageResetGuard::Armed | PageResetGuard::RearmPending => data_changed,
            PageResetGuard::DisarmedForNextCycle => {
                if data_changed {
                    *self = PageResetGuard::RearmPending;
                }
                false
            }
        }
    }

    /// Ends a render cycle.
    pub fn end_cycle(&mut self) {
        if *self == PageResetGuard::RearmPending {
            *self = PageResetGuard::Armed;
        }
    }

    pub fn is_armed(&self) -> bool {
        *self == PageResetGuard::Armed
    }
}
