use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

use anyhow::{anyhow, Context};
use itertools::Itertools;

use crate::reports::PageRule;

/// Page-level PDF operations.
pub trait DocumentTool {
    fn page_count(&self, path: &Path) -> anyhow::Result<u32>;
    /// Writes `pages` (1-based, in the given order) of `src` to `dst`.
    fn select_pages(&self, src: &Path, dst: &Path, pages: &[u32]) -> anyhow::Result<()>;
    /// Concatenates `inputs` in order into `output`.
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> anyhow::Result<()>;
}

/// Applies `rule` to `src`, writing the result to `dst`.
pub fn apply_rule(
    tool: &dyn DocumentTool,
    rule: &PageRule,
    src: &Path,
    dst: &Path,
) -> anyhow::Result<()> {
    let total = tool.page_count(src)?;
    let keep = rule.keep(total)?;
    debug!("keeping pages {:?} of {} from {:?}", keep, total, src);
    tool.select_pages(src, dst, &keep)
}

/// `qpdf` command line wrapper.
pub struct Qpdf {
    binary: PathBuf,
}

impl Qpdf {
    pub fn new(binary: PathBuf) -> Self {
        Qpdf { binary }
    }

    fn run(&self, args: &[&str]) -> anyhow::Result<Output> {
        debug!("running {:?} {:?}", self.binary, args);
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .context(format!("could not spawn {:?}", self.binary))?;
        // exit code 3 means success with warnings
        match output.status.code() {
            Some(0) | Some(3) => Ok(output),
            _ => Err(anyhow!(
                "{:?} {:?} failed with {}: {}",
                self.binary,
                args,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )),
        }
    }
}

fn path_arg(path: &Path) -> anyhow::Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("path {:?} is not valid utf-8", path))
}

impl DocumentTool for Qpdf {
    fn page_count(&self, path: &Path) -> anyhow::Result<u32> {
        let output = self.run(&["--show-npages", path_arg(path)?])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse::<u32>()
            .context(format!("unexpected page count {:?} for {:?}", stdout.trim(), path))
    }

    fn select_pages(&self, src: &Path, dst: &Path, pages: &[u32]) -> anyhow::Result<()> {
        let range = pages.iter().join(",");
        self.run(&[
            "--empty",
            "--pages",
            path_arg(src)?,
            range.as_str(),
            "--",
            path_arg(dst)?,
        ])?;
        Ok(())
    }

    fn merge(&self, inputs: &[PathBuf], output: &Path) -> anyhow::Result<()> {
        if inputs.is_empty() {
            return Err(anyhow!("nothing to merge into {:?}", output));
        }
        info!("merging {} PDFs into {:?}", inputs.len(), output);
        let mut args = vec!["--empty", "--pages"];
        for input in inputs {
            args.push(path_arg(input)?);
        }
        args.push("--");
        args.push(path_arg(output)?);
        self.run(&args)?;
        info!("merge complete");
        Ok(())
    }
}
