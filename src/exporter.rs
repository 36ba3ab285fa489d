use crate::{
    clock::Clock,
    navigator::MenuNavigator,
    readiness::ReadinessDetector,
    runner::RunnerOptions,
    surface::{ElementRef, Finder, Locator, Scope, Surface},
    types::{AttemptMode, ExportAttemptResult, ExportError, Variant},
};

/// Follow-up click needed after the direct export button: pick the PDF format.
pub const PDF_FORMAT_BUTTON: &str = "//button[@data-testid='export-to-pdf-btn']";
pub const PDF_FORMAT_FALLBACK: &str = "//button[.//span[contains(text(),'PDF')]]";

/// Known confirm buttons of the export dialog, in the order they are tried.
pub const CONFIRM_BUTTONS: [&str; 5] = [
    "//*[@id='okButton']",
    "//button[@data-testid='dialog-ok-btn']",
    "//button[normalize-space(.)='OK']",
    "//button[normalize-space(.)='Exportar']",
    "//button[normalize-space(.)='Export']",
];

pub const ANY_BUTTON: &str = "//button";
pub const CONFIRM_LABELS: [&str; 3] = ["ok", "exportar", "export"];

#[derive(Debug)]
pub enum ExportState {
    Navigating { mode: AttemptMode, attempt: usize },
    Confirming { mode: AttemptMode, attempt: usize, variant: Variant },
    Reloading { next: usize },
    FallbackIdleWait,
    Done(Variant),
    Failed(ExportError),
}

/// Drives one report from a loaded surface to a confirmed export dialog.
///
/// Immediate attempts come first (each failure reloads the surface); once
/// they are used up, or when immediate mode is off, the exporter waits for
/// the report to go idle and makes one last attempt.
pub struct Exporter<'a> {
    surface: &'a dyn Surface,
    clock: &'a dyn Clock,
    options: &'a RunnerOptions,
}

impl<'a> Exporter<'a> {
    pub fn new(surface: &'a dyn Surface, clock: &'a dyn Clock, options: &'a RunnerOptions) -> Self {
        Exporter {
            surface,
            clock,
            options,
        }
    }

    fn finder(&self) -> Finder<'a> {
        Finder::new(
            self.surface,
            self.clock,
            self.options.element_timeout,
            self.options.sweep_interval,
            self.options.menu_pause,
        )
    }

    fn initial_state(&self) -> ExportState {
        if self.options.force_immediate && self.options.immediate_tries > 0 {
            ExportState::Navigating {
                mode: AttemptMode::Immediate,
                attempt: 1,
            }
        } else {
            ExportState::FallbackIdleWait
        }
    }

    pub fn export(&self, report: &str) -> Result<Variant, ExportError> {
        let mut state = self.initial_state();
        loop {
            debug!("[{}] export state {:?}", report, state);
            state = match state {
                ExportState::Done(variant) => {
                    info!("[{}] export triggered via {}", report, variant);
                    return Ok(variant);
                }
                ExportState::Failed(e) => return Err(e),
                ExportState::Navigating { mode, attempt } => {
                    self.navigate(mode, attempt, report)
                }
                ExportState::Confirming {
                    mode,
                    attempt,
                    variant,
                } => {
                    let outcome = self.confirm(report);
                    self.after_attempt(
                        ExportAttemptResult {
                            mode,
                            attempt,
                            variant: Some(variant),
                            outcome,
                        },
                        report,
                    )
                }
                ExportState::Reloading { next } => {
                    if let Err(e) = self.surface.reload() {
                        warn!("[{}] reload failed: {}", report, e);
                    }
                    self.clock.sleep(self.options.reload_cooldown);
                    if next <= self.options.immediate_tries {
                        ExportState::Navigating {
                            mode: AttemptMode::Immediate,
                            attempt: next,
                        }
                    } else {
                        ExportState::FallbackIdleWait
                    }
                }
                ExportState::FallbackIdleWait => {
                    info!("[{}] falling back to an idle-gated export", report);
                    let readiness =
                        ReadinessDetector::new(self.surface, self.clock, self.options.idle_poll);
                    match readiness.wait_idle(
                        self.options.idle_timeout,
                        self.options.idle_stable,
                        report,
                    ) {
                        Ok(()) => ExportState::Navigating {
                            mode: AttemptMode::Fallback,
                            attempt: 1,
                        },
                        Err(e) => ExportState::Failed(e),
                    }
                }
            };
        }
    }

    fn navigate(&self, mode: AttemptMode, attempt: usize, report: &str) -> ExportState {
        if mode == AttemptMode::Immediate {
            info!(
                "[{}] {} export (attempt {}/{})",
                report, mode, attempt, self.options.immediate_tries
            );
        }
        if !self.options.pre_export_cooldown.is_zero() {
            self.clock.sleep(self.options.pre_export_cooldown);
        }

        let navigator = MenuNavigator::new(self.finder());
        let navigated = navigator
            .open_export_action(report)
            .and_then(|variant| self.pick_format(variant).map(|_| variant));
        match navigated {
            Ok(variant) => ExportState::Confirming {
                mode,
                attempt,
                variant,
            },
            Err(e) => self.after_attempt(
                ExportAttemptResult {
                    mode,
                    attempt,
                    variant: None,
                    outcome: Err(e),
                },
                report,
            ),
        }
    }

    fn after_attempt(&self, result: ExportAttemptResult, report: &str) -> ExportState {
        if let (true, Some(variant)) = (result.is_success(), result.variant) {
            return ExportState::Done(variant);
        }
        if let Err(e) = &result.outcome {
            warn!(
                "[{}] {} attempt {} failed: {}",
                report, result.mode, result.attempt, e
            );
        }
        match result.mode {
            AttemptMode::Immediate => ExportState::Reloading {
                next: result.attempt + 1,
            },
            AttemptMode::Fallback => ExportState::Failed(match result.outcome {
                Err(e) => e,
                Ok(()) => ExportError::Navigation {
                    report: report.into(),
                },
            }),
        }
    }

    /// The direct toolbar button opens a format picker.
    fn pick_format(&self, variant: Variant) -> Result<(), ExportError> {
        if variant != Variant::Direct {
            return Ok(());
        }
        let finder = self.finder();
        if finder.click(&Locator::xpath(PDF_FORMAT_BUTTON)).is_err() {
            finder.click(&Locator::xpath(PDF_FORMAT_FALLBACK))?;
        }
        Ok(())
    }

    /// Dismisses the export dialog with whichever confirm button is there.
    pub fn confirm(&self, report: &str) -> Result<(), ExportError> {
        let finder = self.finder();
        for selector in CONFIRM_BUTTONS {
            if finder
                .click_within(&Locator::xpath(selector), self.options.confirm_timeout)
                .is_ok()
            {
                info!("[{}] export dialog confirmed", report);
                return Ok(());
            }
        }

        let buttons = Locator::xpath(ANY_BUTTON);
        match self.surface.texts(Scope::Top, &buttons) {
            Ok(texts) => {
                let index = texts.iter().position(|t| {
                    let t = t.trim().to_lowercase();
                    CONFIRM_LABELS.contains(&t.as_str())
                });
                if let Some(index) = index {
                    let element = ElementRef {
                        scope: Scope::Top,
                        locator: buttons,
                        index,
                    };
                    match self.surface.synthetic_click(&element) {
                        Ok(()) => {
                            info!("[{}] export dialog confirmed by button text", report);
                            return Ok(());
                        }
                        Err(e) => error!("[{}] confirmation click failed: {}", report, e),
                    }
                }
            }
            Err(e) => error!("[{}] could not scan dialog buttons: {}", report, e),
        }
        Err(ExportError::Confirmation {
            report: report.into(),
        })
    }
}
