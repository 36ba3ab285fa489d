use std::{collections::BTreeSet, fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::types::ExportError;

/// A report to export, as written in the reports file.
///
/// At most one of `extract_page`, `drop_pages` and `drop_last_pages` may be
/// set; [`ReportSpec::page_rule`] enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSpec {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_pages: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_last_pages: Option<u32>,
}

/// Page selection applied to the raw export. Page numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRule {
    ExtractPage(u32),
    DropPages(Vec<u32>),
    DropLast(u32),
}

impl ReportSpec {
    pub fn new(name: &str, url: &str) -> Self {
        ReportSpec {
            name: name.into(),
            url: url.into(),
            extract_page: None,
            drop_pages: None,
            drop_last_pages: None,
        }
    }

    pub fn with_rule(mut self, rule: PageRule) -> Self {
        match rule {
            PageRule::ExtractPage(p) => self.extract_page = Some(p),
            PageRule::DropPages(pages) => self.drop_pages = Some(pages),
            PageRule::DropLast(n) => self.drop_last_pages = Some(n),
        }
        self
    }

    /// The single active page rule, if any.
    pub fn page_rule(&self) -> Result<Option<PageRule>, ExportError> {
        let active = [
            self.extract_page.is_some(),
            self.drop_pages.is_some(),
            self.drop_last_pages.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if active > 1 {
            return Err(ExportError::Configuration(format!(
                "ambiguous page rules for '{}': use only one of extract_page | drop_pages | drop_last_pages",
                self.name
            )));
        }

        let rule = match (self.extract_page, &self.drop_pages, self.drop_last_pages) {
            (Some(page), _, _) => PageRule::ExtractPage(page),
            (_, Some(pages), _) => PageRule::DropPages(pages.clone()),
            (_, _, Some(n)) => PageRule::DropLast(n),
            _ => return Ok(None),
        };
        rule.validate(&self.name)?;
        Ok(Some(rule))
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        if self.name.trim().is_empty() {
            return Err(ExportError::Configuration("report with an empty name".into()));
        }
        if self.url.trim().is_empty() {
            return Err(ExportError::Configuration(format!(
                "report '{}' has no url",
                self.name
            )));
        }
        self.page_rule().map(|_| ())
    }
}

impl PageRule {
    fn validate(&self, report: &str) -> Result<(), ExportError> {
        let problem = match self {
            PageRule::ExtractPage(0) => Some("extract_page is 1-based"),
            PageRule::DropPages(pages) if pages.is_empty() => Some("drop_pages is empty"),
            PageRule::DropPages(pages) if pages.contains(&0) => Some("drop_pages are 1-based"),
            PageRule::DropLast(0) => Some("drop_last_pages must be at least 1"),
            _ => None,
        };
        match problem {
            Some(p) => Err(ExportError::Configuration(format!("[{}] {}", report, p))),
            None => Ok(()),
        }
    }

    /// Suffix of the derived artifact file name.
    pub fn suffix(&self) -> String {
        match self {
            PageRule::ExtractPage(p) => format!("page{}", p),
            PageRule::DropPages(_) => "without_pages".into(),
            PageRule::DropLast(n) => format!("without_last{}", n),
        }
    }

    /// Pages that survive the rule in a document of `total` pages.
    pub fn keep(&self, total: u32) -> Result<Vec<u32>, ExportError> {
        let kept: Vec<u32> = match self {
            PageRule::ExtractPage(p) => {
                if *p == 0 || *p > total {
                    return Err(out_of_range(*p, total));
                }
                vec![*p]
            }
            PageRule::DropPages(pages) => {
                let drop: BTreeSet<u32> = pages.iter().copied().collect();
                if let Some(p) = drop.iter().find(|p| **p == 0 || **p > total) {
                    return Err(out_of_range(*p, total));
                }
                (1..=total).filter(|p| !drop.contains(p)).collect()
            }
            PageRule::DropLast(n) => (1..=total.saturating_sub(*n)).collect(),
        };
        if kept.is_empty() {
            return Err(ExportError::Configuration(format!(
                "{:?} leaves no pages out of {}",
                self, total
            )));
        }
        Ok(kept)
    }
}

fn out_of_range(page: u32, total: u32) -> ExportError {
    ExportError::Configuration(format!(
        "page {} is out of range for a document of {} pages",
        page, total
    ))
}

/// Reads the ordered report list from a JSON array.
pub fn load_reports(path: &Path) -> anyhow::Result<Vec<ReportSpec>> {
    let raw = fs::read_to_string(path)
        .context(format!("could not read reports file {:?}", path))?;
    let reports: Vec<ReportSpec> = serde_json::from_str(&raw)
        .context(format!("could not parse reports file {:?}", path))?;
    Ok(reports)
}
