use std::time::Duration;

use crate::{
    clock::Clock,
    settle::{wait_until_settled, SettleOptions},
    surface::{Locator, Scope, Surface},
    types::{ExportError, WaitStage},
};

/// Heuristics for "the report is still rendering". Any match means busy.
pub const BUSY_SIGNALS: [&str; 5] = [
    "//*[@aria-busy='true']",
    "//*[contains(@class,'busy') or contains(@class,'loading') or contains(@class,'spinner')]",
    "//*[@role='progressbar']",
    "//div[contains(@class,'powerbi-loader')]",
    "//div[contains(@class,'waitSpinner')]",
];

lazy_static! {
    pub static ref BUSY_LOCATOR: Locator = Locator::any_of(&BUSY_SIGNALS);
}

pub struct ReadinessDetector<'a> {
    surface: &'a dyn Surface,
    clock: &'a dyn Clock,
    poll: Duration,
}

impl<'a> ReadinessDetector<'a> {
    pub fn new(surface: &'a dyn Surface, clock: &'a dyn Clock, poll: Duration) -> Self {
        ReadinessDetector {
            surface,
            clock,
            poll,
        }
    }

    /// Busy if any readable document shows a busy signal. Embedded documents
    /// that cannot be read (cross-origin or sandboxed frames) are skipped; a
    /// failed read of the top-level document counts as busy.
    pub fn is_busy(&self) -> bool {
        let embedded = match self.surface.embedded_count() {
            Ok(n) => n,
            Err(e) => {
                debug!("could not list embedded documents, checking top only: {}", e);
                0
            }
        };
        std::iter::once(Scope::Top)
            .chain((0..embedded).map(Scope::Embedded))
            .any(|scope| match self.surface.count(scope, &BUSY_LOCATOR) {
                Ok(n) => n > 0,
                Err(e) if scope == Scope::Top => {
                    debug!("busy check failed in {}: {}", scope, e);
                    true
                }
                Err(e) => {
                    debug!("skipping {} for the busy check: {}", scope, e);
                    false
                }
            })
    }

    /// Waits until no busy signal has been seen for `stable_for`.
    pub fn wait_idle(
        &self,
        timeout: Duration,
        stable_for: Duration,
        report: &str,
    ) -> Result<(), ExportError> {
        let mut window_open = false;
        let options = SettleOptions {
            poll: self.poll,
            hold: stable_for,
            timeout,
        };
        let res = wait_until_settled(self.clock, options, || {
            if self.is_busy() {
                window_open = false;
                None
            } else {
                if !window_open {
                    info!("[{}] no loading indicators, starting stability window", report);
                    window_open = true;
                }
                Some(())
            }
        });
        match res {
            Ok(()) => {
                info!("[{}] stable for {:?}", report, stable_for);
                Ok(())
            }
            Err(e) => Err(ExportError::Timeout {
                report: report.into(),
                stage: WaitStage::Readiness,
                waited: e.waited,
            }),
        }
    }
}
