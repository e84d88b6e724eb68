//! Link credit management.
//!
//! The controller refills credit to the full window only once outstanding
//! credit has dropped below half of it, so a steady stream of deliveries
//! produces one flow update per half-window rather than one per delivery.

use std::num::NonZeroU32;

use log::debug;

use crate::intent::Intent;

/// A credit update to send to the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreditGrant {
    /// Outstanding credit after the update.
    pub outstanding: u32,
    /// Credit added by the update.
    pub added: u32,
}

impl CreditGrant {
    /// Flow intent realising this grant.
    pub(crate) fn into_intent(self) -> Intent {
        #[cfg(feature = "metrics")]
        crate::metrics::record_credit(self.added, self.outstanding);
        Intent::Flow {
            credit: self.outstanding,
        }
    }
}

/// Hysteresis-based credit window.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroU32;
///
/// use amqp_receiver::credit::CreditController;
///
/// let controller = CreditController::new(NonZeroU32::new(10).expect("non-zero"));
/// assert_eq!(controller.replenish(7), None);
/// assert_eq!(controller.replenish(4).map(|grant| grant.outstanding), Some(10));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CreditController {
    window: NonZeroU32,
}

impl CreditController {
    /// Create a controller for `window` outstanding credit.
    #[must_use]
    pub fn new(window: NonZeroU32) -> Self { Self { window } }

    /// Configured window.
    #[must_use]
    pub fn window(&self) -> u32 { self.window.get() }

    /// Credit level below which a refill is issued.
    #[must_use]
    pub fn threshold(&self) -> u32 { self.window.get() / 2 }

    /// Full-window grant issued when the link opens.
    #[must_use]
    pub fn grant_initial(&self) -> CreditGrant {
        let window = self.window.get();
        debug!("initial credit granted: window={window}");
        CreditGrant {
            outstanding: window,
            added: window,
        }
    }

    /// Refill to the full window when `current` has fallen below the
    /// threshold.
    ///
    /// A window of one has a threshold of zero, so exhausted credit is
    /// always refilled. Credit at or above the window is never topped up.
    #[must_use]
    pub fn replenish(&self, current: u32) -> Option<CreditGrant> {
        let window = self.window.get();
        if current >= window || (current >= self.threshold() && current != 0) {
            return None;
        }
        let added = window - current;
        debug!("credit replenished: current={current}, added={added}, window={window}");
        Some(CreditGrant {
            outstanding: window,
            added,
        })
    }
}
