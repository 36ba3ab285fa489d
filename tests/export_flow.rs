mod common;

use std::{fs, rc::Rc, time::Duration};

use chrono::NaiveDate;
use common::{quick_options, FakeDocuments, FakeSurface, Page, RecordingMailer, Route};
use report_courier::{
    clock::ManualClock,
    context::RunContext,
    pipeline::{Pipeline, PipelineOptions},
    reports::{PageRule, ReportSpec},
    runner::{Runner, RunnerOptions},
    types::DailyReport,
};
use tempfile::TempDir;

struct Harness {
    _root: TempDir,
    recipients: TempDir,
    clock: Rc<ManualClock>,
    context: RunContext,
    documents: FakeDocuments,
    mailer: RecordingMailer,
}

impl Harness {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let recipients = tempfile::tempdir().unwrap();
        fs::write(
            recipients.path().join("team.txt"),
            "# daily digest\nops@example.com\nboss@example.com\n",
        )
        .unwrap();
        let context =
            RunContext::create(root.path(), NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()).unwrap();
        Harness {
            _root: root,
            recipients,
            clock: Rc::new(ManualClock::new()),
            context,
            documents: FakeDocuments::default(),
            mailer: RecordingMailer::default(),
        }
    }

    fn surface(&self) -> FakeSurface {
        FakeSurface::new(self.clock.clone(), self.context.dir())
    }

    fn run(
        &self,
        surface: &FakeSurface,
        reports: &[ReportSpec],
        options: &RunnerOptions,
    ) -> DailyReport {
        let pipeline = Pipeline::new(
            PipelineOptions::default_builder()
                .recipients_dir(self.recipients.path())
                .signature("BI team")
                .build()
                .unwrap(),
            Box::new(self.documents.clone()),
            Box::new(self.mailer.clone()),
        );
        pipeline
            .run_daily(&self.context, surface, &*self.clock, reports, options)
            .unwrap()
    }

    fn merged_pages(&self) -> Vec<String> {
        fs::read_to_string(self.context.merged_artifact())
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }
}

fn four_reports(last: Page) -> (Vec<ReportSpec>, Vec<(&'static str, Page)>) {
    let reports = vec![
        ReportSpec::new("Sales", "https://bi/sales"),
        ReportSpec::new("Finance", "https://bi/finance"),
        ReportSpec::new("Ops", "https://bi/ops").with_rule(PageRule::DropLast(1)),
        ReportSpec::new("Margin", "https://bi/margin"),
    ];
    let pages = vec![
        ("https://bi/sales", Page::new("Sales", Route::Direct)),
        (
            "https://bi/finance",
            Page::new("Finance", Route::Overflow).in_frame(),
        ),
        ("https://bi/ops", Page::new("Ops", Route::File).with_pages(3)),
        ("https://bi/margin", last),
    ];
    (reports, pages)
}

fn scripted(h: &Harness, pages: Vec<(&'static str, Page)>) -> FakeSurface {
    pages
        .into_iter()
        .fold(h.surface(), |s, (url, page)| s.page(url, page))
}

#[test]
fn all_four_exported_one_through_idle_fallback() {
    let h = Harness::new();
    let (reports, pages) = four_reports(
        Page::new("Margin", Route::Direct).busy_for(Duration::from_secs(30)),
    );
    let surface = scripted(&h, pages);

    let daily = h.run(&surface, &reports, &quick_options());

    assert_eq!(daily.batch.succeeded.len(), 4);
    assert!(daily.batch.failed.is_empty());
    let names: Vec<&str> = daily
        .batch
        .succeeded
        .iter()
        .map(|a| a.report.as_str())
        .collect();
    assert_eq!(names, vec!["Sales", "Finance", "Ops", "Margin"]);

    // only the busy report needed reloads: one per failed immediate attempt
    assert_eq!(surface.reloads(), 3);

    assert_eq!(
        h.merged_pages(),
        vec![
            "Sales p1",
            "Sales p2",
            "Finance p1",
            "Finance p2",
            "Ops p1",
            "Ops p2",
            "Margin p1",
            "Margin p2"
        ]
    );
    assert_eq!(
        daily.batch.succeeded[2].path,
        h.context.derived_artifact("Ops", "without_last1")
    );
    assert!(h.context.raw_artifact("Sales").is_file());
    assert_eq!(daily.merged, Some(h.context.merged_artifact()));

    let sent = h.mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(daily.notified);
    assert_eq!(sent[0].to, vec!["ops@example.com", "boss@example.com"]);
    assert_eq!(sent[0].subject, "Daily indicators (2024-03-07)");
    assert_eq!(sent[0].attachment, h.context.merged_artifact());
    assert!(!sent[0].html_body.contains("Failures"));
}

#[test]
fn one_failure_is_named_in_the_mail() {
    let h = Harness::new();
    let (reports, pages) = four_reports(Page::new("Margin", Route::Nowhere));
    let surface = scripted(&h, pages);

    let daily = h.run(&surface, &reports, &quick_options());

    assert_eq!(daily.batch.succeeded.len(), 3);
    assert_eq!(daily.batch.failed, vec!["Margin".to_string()]);
    assert_eq!(
        h.merged_pages(),
        vec!["Sales p1", "Sales p2", "Finance p1", "Finance p2", "Ops p1", "Ops p2"]
    );

    let merges = h.documents.merges.lock().unwrap();
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].0.len(), 3);

    let sent = h.mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0]
        .html_body
        .contains("<p><b>Failures:</b></p><ul><li>Margin</li></ul>"));
}

#[test]
fn nothing_exported_means_no_merge_and_no_mail() {
    let h = Harness::new();
    let surface = h
        .surface()
        .page("https://bi/hr", Page::new("HR", Route::Nowhere));
    let reports = vec![ReportSpec::new("HR", "https://bi/hr")];

    let daily = h.run(&surface, &reports, &quick_options());

    assert!(daily.batch.succeeded.is_empty());
    assert_eq!(daily.batch.failed, vec!["HR".to_string()]);
    assert_eq!(daily.merged, None);
    assert!(!daily.notified);
    assert!(h.documents.merges.lock().unwrap().is_empty());
    assert!(h.mailer.sent.lock().unwrap().is_empty());
    assert!(!h.context.merged_artifact().exists());
}

#[test]
fn no_recipients_still_merges() {
    let h = Harness::new();
    fs::remove_file(h.recipients.path().join("team.txt")).unwrap();
    let surface = h
        .surface()
        .page("https://bi/sales", Page::new("Sales", Route::Direct));
    let reports = vec![ReportSpec::new("Sales", "https://bi/sales")];

    let daily = h.run(&surface, &reports, &quick_options());

    assert_eq!(daily.merged, Some(h.context.merged_artifact()));
    assert!(h.context.merged_artifact().is_file());
    assert!(!daily.notified);
    assert!(h.mailer.sent.lock().unwrap().is_empty());
}

#[test]
fn mail_failure_does_not_fail_the_run() {
    let mut h = Harness::new();
    h.mailer.fail = true;
    let surface = h
        .surface()
        .page("https://bi/sales", Page::new("Sales", Route::Direct));
    let reports = vec![ReportSpec::new("Sales", "https://bi/sales")];

    let daily = h.run(&surface, &reports, &quick_options());
    assert_eq!(daily.batch.succeeded.len(), 1);
    assert!(daily.merged.is_some());
    assert!(!daily.notified);
}

#[test]
fn immediate_mode_off_waits_for_idle_first() {
    let h = Harness::new();
    let surface = h.surface().page(
        "https://bi/sales",
        Page::new("Sales", Route::Direct).busy_for(Duration::from_secs(10)),
    );
    let reports = vec![ReportSpec::new("Sales", "https://bi/sales")];
    let options = RunnerOptions::default_builder()
        .force_immediate(false)
        .build()
        .unwrap();

    let documents = FakeDocuments::default();
    let batch = Runner::new(&surface, &*h.clock, &documents, &h.context, &options).run(&reports);

    assert_eq!(batch.succeeded.len(), 1);
    assert_eq!(surface.reloads(), 0);
    // idle at 10s, then the 5s stability window
    assert!(h.clock.elapsed() >= Duration::from_secs(15));
}

#[test]
fn conflicting_page_rules_fail_before_loading() {
    let h = Harness::new();
    let surface = h
        .surface()
        .page("https://bi/sales", Page::new("Sales", Route::Direct))
        .page("https://bi/ops", Page::new("Ops", Route::Direct));
    let mut broken = ReportSpec::new("Ops", "https://bi/ops").with_rule(PageRule::ExtractPage(1));
    broken.drop_last_pages = Some(1);
    let reports = vec![broken, ReportSpec::new("Sales", "https://bi/sales")];

    let batch = Runner::new(&surface, &*h.clock, &h.documents, &h.context, &quick_options())
        .run(&reports);

    assert_eq!(batch.failed, vec!["Ops".to_string()]);
    assert_eq!(batch.succeeded.len(), 1);
    assert_eq!(surface.loads(), vec!["https://bi/sales".to_string()]);
}

#[test]
fn out_of_range_page_rule_fails_the_report() {
    let h = Harness::new();
    let surface = h
        .surface()
        .page("https://bi/sales", Page::new("Sales", Route::Direct));
    let reports =
        vec![ReportSpec::new("Sales", "https://bi/sales").with_rule(PageRule::ExtractPage(5))];

    let batch = Runner::new(&surface, &*h.clock, &h.documents, &h.context, &quick_options())
        .run(&reports);

    assert_eq!(batch.failed, vec!["Sales".to_string()]);
    // the raw export is kept for inspection
    assert!(h.context.raw_artifact("Sales").is_file());
}

#[test]
fn dialog_confirmed_by_button_text() {
    let h = Harness::new();
    let surface = h.surface().page(
        "https://bi/sales",
        Page::new("Sales", Route::Direct).text_confirm_only(),
    );
    let reports = vec![ReportSpec::new("Sales", "https://bi/sales")];

    let batch = Runner::new(&surface, &*h.clock, &h.documents, &h.context, &quick_options())
        .run(&reports);

    assert_eq!(batch.succeeded.len(), 1);
    let last = surface.clicks().pop().unwrap();
    assert_eq!(last.1, "//button");
    assert_eq!(last.2, "synthetic");
}
