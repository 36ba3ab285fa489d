use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::{Local, NaiveDate};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const MERGED_PREFIX: &str = "Indicadores";

/// The dated directory that holds everything one daily run produces.
#[derive(Debug, Clone)]
pub struct RunContext {
    date: NaiveDate,
    dir: PathBuf,
}

impl RunContext {
    /// Creates (if needed) `<root>/<date>`.
    pub fn create(root: &Path, date: NaiveDate) -> anyhow::Result<Self> {
        let dir = root.join(date.format(DATE_FORMAT).to_string());
        fs::create_dir_all(&dir).context(format!("could not create run directory {:?}", dir))?;
        Ok(RunContext { date, dir })
    }

    pub fn today(root: &Path) -> anyhow::Result<Self> {
        Self::create(root, Local::now().date_naive())
    }

    pub fn stamp(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{report}_{date}.pdf`
    pub fn raw_artifact(&self, report: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.pdf", report, self.stamp()))
    }

    /// `{report}_{date}_{suffix}.pdf`
    pub fn derived_artifact(&self, report: &str, suffix: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.pdf", report, self.stamp(), suffix))
    }

    pub fn merged_artifact(&self) -> PathBuf {
        self.dir
            .join(format!("{}_{}.pdf", MERGED_PREFIX, self.stamp()))
    }
}
