//! # Reentrancy Guard
//!
//! One marker per contract. Every mutating entry point calls
//! [`ReentrancyGuard::enter`] first and holds the returned [`GuardToken`]
//! until it returns; the marker clears when the token drops, including on
//! early `?` returns. A nested call made while the token is alive (an asset
//! transfer hook, an adapter calling back in) gets [`Reentered`] instead of
//! touching half-finished state.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Returned when an entry point is called while another is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("reentrant call")]
pub struct Reentered;

/// The in-progress marker.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    entered: AtomicBool,
}

impl ReentrancyGuard {
    /// A guard that is not held.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the contract as busy until the token is dropped.
    pub fn enter(&self) -> Result<GuardToken<'_>, Reentered> {
        self.entered
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| Reentered)?;
        Ok(GuardToken { guard: self })
    }

    /// Whether a call is currently in progress.
    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

/// Proof that the guard is held. Releases it on drop.
#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.entered.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_enter_fails_while_held() {
        let guard = ReentrancyGuard::new();
        let token = guard.enter().unwrap();
        assert!(guard.is_entered());
        assert_eq!(guard.enter().unwrap_err(), Reentered);
        drop(token);
        assert!(!guard.is_entered());
        assert!(guard.enter().is_ok());
    }

    #[test]
    fn released_on_early_return() {
        fn fails(guard: &ReentrancyGuard) -> Result<(), &'static str> {
            let _token = guard.enter().map_err(|_| "reentered")?;
            Err("boom")
        }
        let guard = ReentrancyGuard::new();
        assert_eq!(fails(&guard), Err("boom"));
        assert!(!guard.is_entered());
    }
}
