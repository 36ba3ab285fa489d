use std::{path::PathBuf, time::Duration};

use anyhow::Context;

use crate::{
    clock::Clock,
    context::RunContext,
    download::{snapshot, DownloadWatcher},
    exporter::Exporter,
    pages::{apply_rule, DocumentTool},
    reports::ReportSpec,
    surface::Surface,
    types::{Artifact, BatchResult},
    utils::replace_file,
};

#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct RunnerOptions {
    // pause before opening the export menu
    #[builder(default = "Duration::from_secs(1)")]
    pub pre_export_cooldown: Duration,
    // how long the report must show no loading indicator
    #[builder(default = "Duration::from_secs(5)")]
    pub idle_stable: Duration,
    // maximum wait for the report to become idle
    #[builder(default = "Duration::from_secs(90)")]
    pub idle_timeout: Duration,
    // maximum wait for the exported file
    #[builder(default = "Duration::from_secs(600)")]
    pub download_timeout: Duration,
    // try exporting right away before waiting for the report to settle
    #[builder(default = "true")]
    pub force_immediate: bool,
    #[builder(default = "3")]
    pub immediate_tries: usize,
    // pause after reloading a report whose immediate export failed
    #[builder(default = "Duration::from_secs(1)")]
    pub reload_cooldown: Duration,
    // lookup window for a single element
    #[builder(default = "Duration::from_secs(20)")]
    pub element_timeout: Duration,
    // lookup window for each confirm button of the export dialog
    #[builder(default = "Duration::from_secs(15)")]
    pub confirm_timeout: Duration,
    #[builder(default = "Duration::from_millis(300)")]
    pub sweep_interval: Duration,
    #[builder(default = "Duration::from_millis(400)")]
    pub menu_pause: Duration,
    #[builder(default = "Duration::from_millis(400)")]
    pub idle_poll: Duration,
    #[builder(default = "Duration::from_millis(800)")]
    pub download_poll: Duration,
    // a download must keep the same size this long to count as complete
    #[builder(default = "Duration::from_millis(1200)")]
    pub download_settle: Duration,
    #[builder(default = "Duration::from_millis(500)")]
    pub between_reports: Duration,
}

impl RunnerOptions {
    pub fn default_builder() -> RunnerOptionsBuilder {
        RunnerOptionsBuilder::default()
    }
}

/// Exports an ordered list of reports, one at a time, on a single surface.
pub struct Runner<'a> {
    surface: &'a dyn Surface,
    clock: &'a dyn Clock,
    documents: &'a dyn DocumentTool,
    context: &'a RunContext,
    options: &'a RunnerOptions,
}

impl<'a> Runner<'a> {
    pub fn new(
        surface: &'a dyn Surface,
        clock: &'a dyn Clock,
        documents: &'a dyn DocumentTool,
        context: &'a RunContext,
        options: &'a RunnerOptions,
    ) -> Self {
        Runner {
            surface,
            clock,
            documents,
            context,
            options,
        }
    }

    pub fn run(&self, reports: &[ReportSpec]) -> BatchResult {
        let mut result = BatchResult::default();
        for (i, report) in reports.iter().enumerate() {
            if i > 0 {
                self.clock.sleep(self.options.between_reports);
            }
            match self.run_report(report) {
                Ok(path) => result.succeeded.push(Artifact {
                    report: report.name.clone(),
                    url: report.url.clone(),
                    path,
                }),
                Err(e) => {
                    error!("[{}] export failed: {:#}", report.name, e);
                    result.failed.push(report.name.clone());
                }
            }
        }
        info!(
            "batch finished: {} exported, {} failed",
            result.succeeded.len(),
            result.failed.len()
        );
        if !result.failed.is_empty() {
            debug!("failed reports: {:?}", result.failed);
        }
        result
    }

    /// Exports one report and returns the path of its final artifact.
    pub fn run_report(&self, report: &ReportSpec) -> anyhow::Result<PathBuf> {
        let name = report.name.as_str();
        report.validate()?;
        let rule = report.page_rule()?;
        info!("==== starting {} ====", name);

        let dir = self.context.dir();
        let before = snapshot(dir).context(format!("could not list {:?}", dir))?;

        self.surface
            .load(&report.url)
            .context(format!("could not load {}", report.url))?;

        Exporter::new(self.surface, self.clock, self.options).export(name)?;

        let downloaded = DownloadWatcher::new(
            self.clock,
            self.options.download_poll,
            self.options.download_settle,
        )
        .wait_for_artifact(dir, &before, self.options.download_timeout, name)?;

        let raw = self.context.raw_artifact(name);
        replace_file(&downloaded, &raw)
            .context(format!("could not move {:?} to {:?}", downloaded, raw))?;
        info!("[{}] saved {:?}", name, raw);

        let artifact = match rule {
            Some(rule) => {
                let derived = self.context.derived_artifact(name, &rule.suffix());
                info!("[{}] applying {:?}", name, rule);
                apply_rule(self.documents, &rule, &raw, &derived)
                    .context(format!("could not apply {:?} to {:?}", rule, raw))?;
                derived
            }
            None => raw,
        };
        info!("==== finished {} ====", name);
        Ok(artifact)
    }
}
