use std::{
    path::PathBuf,
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use log::{debug, error, info};
use report_courier::{
    browser_controller::{BrowserController, BrowserOptions},
    clock::SystemClock,
    context::RunContext,
    logging::{init_logging, LOG_FILE_NAME},
    mailer::Sendmail,
    pages::Qpdf,
    pipeline::{Pipeline, PipelineOptions},
    reports::{load_reports, ReportSpec},
    runner::RunnerOptions,
    scheduler::{daily_schedule, serve},
    utils::{DEFAULT_DOWNLOAD_DIR, DEFAULT_EMAIL_LIST_DIR, DEFAULT_REPORTS_FILE, DEFAULT_RUN_AT},
};
use signal_hook::consts::{SIGINT, SIGTERM};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Exports dashboard reports to PDF and mails a daily digest", long_about = None)]
struct Args {
    /// JSON file with the ordered list of reports to export
    #[arg(long, env = "REPORTS_FILE", default_value = DEFAULT_REPORTS_FILE)]
    reports: PathBuf,
    /// Root directory for the dated run directories
    #[arg(long, env = "DOWNLOAD_DIR", default_value = DEFAULT_DOWNLOAD_DIR)]
    download_dir: PathBuf,
    /// Directory holding the recipient list
    #[arg(long, env = "EMAIL_LIST_DIR", default_value = DEFAULT_EMAIL_LIST_DIR)]
    email_list_dir: PathBuf,
    /// Local time of the daily run, HH:MM
    #[arg(long, env = "RUN_HOUR_MINUTE", default_value = DEFAULT_RUN_AT)]
    run_at: String,
    /// Seconds to wait before opening the export menu
    #[arg(long, env = "PRE_EXPORT_COOLDOWN_SEC", default_value_t = 1)]
    pre_export_cooldown: u64,
    /// Seconds without loading indicators before a report counts as idle
    #[arg(long, env = "IDLE_STABLE_SECONDS", default_value_t = 5)]
    idle_stable: u64,
    /// Maximum seconds to wait for a report to become idle
    #[arg(long, env = "IDLE_TIMEOUT_SEC", default_value_t = 90)]
    idle_timeout: u64,
    /// Maximum seconds to wait for the exported file
    #[arg(long, env = "DOWNLOAD_TIMEOUT_SEC", default_value_t = 600)]
    download_timeout: u64,
    /// Try exporting before the report has settled
    #[arg(long, env = "FORCE_EXPORT_IMMEDIATE", default_value_t = true, action = clap::ArgAction::Set)]
    force_immediate: bool,
    /// Number of immediate export attempts
    #[arg(long, env = "IMMEDIATE_TRIES", default_value_t = 3)]
    immediate_tries: usize,
    /// Seconds to look for a single element
    #[arg(long, env = "ELEMENT_TIMEOUT_SEC", default_value_t = 20)]
    element_timeout: u64,
    /// Chrome binary, detected when not set
    #[arg(long, env = "BROWSER_PATH")]
    browser_path: Option<PathBuf>,
    /// Chrome user data directory holding the signed-in session
    #[arg(long, env = "BROWSER_PROFILE_DIR")]
    profile_dir: Option<PathBuf>,
    /// Run the browser without a window
    #[arg(long, env = "BROWSER_HEADLESS", default_value_t = false, action = clap::ArgAction::Set)]
    headless: bool,
    /// Maximum time the browser will wait for an event before timing out
    #[arg(long, env = "BROWSER_TIMEOUT_SEC", default_value_t = 600)]
    browser_timeout: u64,
    /// qpdf binary
    #[arg(long, env = "QPDF_PATH", default_value = "qpdf")]
    qpdf: PathBuf,
    /// sendmail-compatible binary
    #[arg(long, env = "SENDMAIL_PATH", default_value = "/usr/sbin/sendmail")]
    sendmail: PathBuf,
    /// Sender address
    #[arg(long, env = "MAIL_FROM")]
    mail_from: Option<String>,
    /// Subject prefix, the run date is appended
    #[arg(long, env = "MAIL_SUBJECT", default_value = "Daily indicators")]
    subject: String,
    /// Log file, rotated at 2 MB with 3 backups [default: <download-dir>/indicadores.log]
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<PathBuf>,
    /// Run once now and exit
    #[arg(long)]
    once: bool,
    /// Check the configuration and exit
    #[arg(long)]
    validate: bool,
}

fn runner_options(args: &Args) -> anyhow::Result<RunnerOptions> {
    Ok(RunnerOptions::default_builder()
        .pre_export_cooldown(Duration::from_secs(args.pre_export_cooldown))
        .idle_stable(Duration::from_secs(args.idle_stable))
        .idle_timeout(Duration::from_secs(args.idle_timeout))
        .download_timeout(Duration::from_secs(args.download_timeout))
        .force_immediate(args.force_immediate)
        .immediate_tries(args.immediate_tries)
        .element_timeout(Duration::from_secs(args.element_timeout))
        .build()?)
}

fn validate(reports: &[ReportSpec]) -> anyhow::Result<()> {
    for report in reports {
        report
            .validate()
            .context(format!("invalid report entry {:?}", report.name))?;
    }
    Ok(())
}

fn daily_job(args: &Args, reports: &[ReportSpec], options: &RunnerOptions) -> anyhow::Result<()> {
    let context = RunContext::today(&args.download_dir)?;
    let browser_options = BrowserOptions::default_builder()
        .path(args.browser_path.clone())
        .profile_dir(args.profile_dir.clone())
        .headless(args.headless)
        .timeout(Duration::from_secs(args.browser_timeout))
        .download_dir(context.dir())
        .build()?;
    let browser = BrowserController::new(&browser_options)?;

    let pipeline = Pipeline::new(
        PipelineOptions::default_builder()
            .recipients_dir(args.email_list_dir.clone())
            .subject_prefix(args.subject.clone())
            .build()?,
        Box::new(Qpdf::new(args.qpdf.clone())),
        Box::new(Sendmail::new(args.sendmail.clone(), args.mail_from.clone())),
    );
    let daily = pipeline.run_daily(&context, &browser, &SystemClock, reports, options)?;
    info!(
        "{}: {} exported, {} failed, merged: {:?}, mailed: {}",
        context.stamp(),
        daily.batch.succeeded.len(),
        daily.batch.failed.len(),
        daily.merged,
        daily.notified
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("could not read .env");
        }
    }
    let args = Args::parse();
    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| args.download_dir.join(LOG_FILE_NAME));
    init_logging(&log_file)?;

    match std::env::var("RUST_LOG") {
        Ok(env) => {
            if env == "debug" {
                println!("{number:/>width$}", number = "", width = 20);
                println!("{}", "Debug mode enabled");
                println!("{number:/>width$}", number = "", width = 20);
                println!();
            }
        }
        _ => {}
    }
    debug!("starting with {:#?}", args);
    info!("logging to {:?}", log_file);

    let reports = load_reports(&args.reports)?;
    validate(&reports)?;
    let schedule = daily_schedule(&args.run_at)?;
    let options = runner_options(&args)?;

    if args.validate {
        println!(
            "{} reports OK, daily run at {}",
            reports.len(),
            args.run_at.trim()
        );
        return Ok(());
    }

    if args.once {
        return tokio::task::spawn_blocking(move || daily_job(&args, &reports, &options)).await?;
    }

    let should_terminate = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGTERM, Arc::clone(&should_terminate))?;
    signal_hook::flag::register(SIGINT, Arc::clone(&should_terminate))?;

    info!("waiting for {} every day", args.run_at.trim());
    serve(
        &schedule,
        Duration::from_secs(1),
        should_terminate,
        move || daily_job(&args, &reports, &options),
    )
    .await
    .map_err(|e| {
        error!("scheduler stopped: {:#}", e);
        e
    })
}
