//! Bounded concurrency around inference calls

use crate::provider::ExecutionProvider;
use crossbeam_channel::{bounded, Receiver, Sender};

/// Counting semaphore shared by every caller of one backend.
///
/// Permits are tokens in a bounded channel: acquiring receives a token,
/// dropping the permit sends it back. Unbounded guards never block.
#[derive(Debug)]
pub struct ConcurrencyGuard {
    permits: Option<(Sender<()>, Receiver<()>)>,
}

impl ConcurrencyGuard {
    /// Guard admitting at most `permits` concurrent calls (minimum 1)
    pub fn bounded(permits: usize) -> Self {
        let permits = permits.max(1);
        let (tx, rx) = bounded(permits);
        for _ in 0..permits {
            // Capacity equals the token count, so the fill never blocks or fails.
            let _ = tx.try_send(());
        }
        Self {
            permits: Some((tx, rx)),
        }
    }

    /// Guard that never blocks
    pub fn unbounded() -> Self {
        Self { permits: None }
    }

    /// Single permit when any selected backend needs serial access, otherwise no-op
    pub fn for_providers(providers: &[ExecutionProvider]) -> Self {
        if providers.iter().any(|p| p.requires_serial_inference()) {
            Self::bounded(1)
        } else {
            Self::unbounded()
        }
    }

    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.permits.is_some()
    }

    /// Permits currently free; `None` for unbounded guards
    #[must_use]
    pub fn available(&self) -> Option<usize> {
        self.permits.as_ref().map(|(_, rx)| rx.len())
    }

    /// Block until a permit is available; the permit is returned on drop.
    pub fn acquire(&self) -> GuardPermit<'_> {
        match &self.permits {
            // The guard owns a sender, so the channel never disconnects.
            Some((tx, rx)) if rx.recv().is_ok() => GuardPermit { returns: Some(tx) },
            _ => GuardPermit { returns: None },
        }
    }
}

/// RAII permit of a [`ConcurrencyGuard`]
#[must_use = "the permit is released as soon as it is dropped"]
pub struct GuardPermit<'a> {
    returns: Option<&'a Sender<()>>,
}

impl Drop for GuardPermit<'_> {
    fn drop(&mut self) {
        if let Some(tx) = self.returns {
            let _ = tx.try_send(());
        }
    }
}
