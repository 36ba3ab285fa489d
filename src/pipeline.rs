use std::path::PathBuf;

use crate::{
    clock::Clock,
    context::RunContext,
    mailer::{build_html, read_recipients, subject, MailMessage, Mailer},
    pages::DocumentTool,
    reports::ReportSpec,
    runner::{Runner, RunnerOptions},
    surface::Surface,
    types::DailyReport,
    utils::DEFAULT_EMAIL_LIST_DIR,
};

#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct PipelineOptions {
    #[builder(default = "PathBuf::from(DEFAULT_EMAIL_LIST_DIR)")]
    pub recipients_dir: PathBuf,
    #[builder(default = "\"Daily indicators\".to_string()")]
    pub subject_prefix: String,
    #[builder(default = "\"Report automation\".to_string()")]
    pub signature: String,
}

impl PipelineOptions {
    pub fn default_builder() -> PipelineOptionsBuilder {
        PipelineOptionsBuilder::default()
    }
}

/// Export, merge and mail: one daily run.
pub struct Pipeline {
    options: PipelineOptions,
    documents: Box<dyn DocumentTool + Send>,
    mailer: Box<dyn Mailer + Send>,
}

impl Pipeline {
    pub fn new(
        options: PipelineOptions,
        documents: Box<dyn DocumentTool + Send>,
        mailer: Box<dyn Mailer + Send>,
    ) -> Self {
        Pipeline {
            options,
            documents,
            mailer,
        }
    }

    pub fn run_daily(
        &self,
        context: &RunContext,
        surface: &dyn Surface,
        clock: &dyn Clock,
        reports: &[ReportSpec],
        runner_options: &RunnerOptions,
    ) -> anyhow::Result<DailyReport> {
        info!(
            "daily run {} with {} reports into {:?}",
            context.stamp(),
            reports.len(),
            context.dir()
        );
        let batch = Runner::new(
            surface,
            clock,
            self.documents.as_ref(),
            context,
            runner_options,
        )
        .run(reports);

        let mut daily = DailyReport {
            batch,
            merged: None,
            notified: false,
        };
        if daily.batch.succeeded.is_empty() {
            error!("no report was exported, nothing to merge or send");
            return Ok(daily);
        }

        let merged = context.merged_artifact();
        self.documents.merge(&daily.batch.paths(), &merged)?;
        info!("consolidated PDF at {:?}", merged);
        daily.merged = Some(merged.clone());

        let to = read_recipients(&self.options.recipients_dir).unwrap_or_else(|e| {
            warn!("{:#}", e);
            vec![]
        });
        if to.is_empty() {
            warn!(
                "no recipients found in {:?}, not sending",
                self.options.recipients_dir
            );
            return Ok(daily);
        }

        let stamp = context.stamp();
        let message = MailMessage {
            to,
            subject: subject(&self.options.subject_prefix, &stamp),
            html_body: build_html(&stamp, &daily.batch, &self.options.signature),
            attachment: merged,
        };
        match self.mailer.send(&message) {
            Ok(()) => {
                info!("e-mail sent to {}", message.to.join(", "));
                daily.notified = true;
            }
            Err(e) => error!("could not send e-mail: {:#}", e),
        }
        Ok(daily)
    }
}
