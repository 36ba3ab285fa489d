use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use crate::{
    clock::Clock,
    settle::{wait_until_settled, SettleOptions},
    types::{ExportError, WaitStage},
};

pub const FINAL_EXTENSION: &str = ".pdf";
/// Names browsers give to a download that is still being written.
pub const PARTIAL_EXTENSIONS: [&str; 4] = [".crdownload", ".tmp", ".part", ".partial"];

pub fn is_partial(name: &str) -> bool {
    let name = name.to_lowercase();
    PARTIAL_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

pub fn is_final(name: &str) -> bool {
    name.to_lowercase().ends_with(FINAL_EXTENSION)
}

/// Names of the entries currently in `dir`.
pub fn snapshot(dir: &Path) -> std::io::Result<HashSet<String>> {
    let mut names = HashSet::new();
    for entry in fs::read_dir(dir)? {
        names.insert(entry?.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

pub struct DownloadWatcher<'a> {
    clock: &'a dyn Clock,
    poll: Duration,
    settle: Duration,
}

impl<'a> DownloadWatcher<'a> {
    pub fn new(clock: &'a dyn Clock, poll: Duration, settle: Duration) -> Self {
        DownloadWatcher {
            clock,
            poll,
            settle,
        }
    }

    /// Waits for a new, fully written PDF in `dir` that was not in `before`.
    pub fn wait_for_artifact(
        &self,
        dir: &Path,
        before: &HashSet<String>,
        timeout: Duration,
        report: &str,
    ) -> Result<PathBuf, ExportError> {
        info!("[{}] waiting for download", report);
        let mut started = false;
        let mut last_candidate: Option<PathBuf> = None;

        let options = SettleOptions {
            poll: self.poll,
            hold: self.settle,
            timeout,
        };
        let res = wait_until_settled(self.clock, options, || {
            let current = match snapshot(dir) {
                Ok(names) => names,
                Err(e) => {
                    warn!("[{}] could not list {:?}: {}", report, dir, e);
                    return None;
                }
            };
            let new: Vec<&String> = current.difference(before).collect();

            if !started && new.iter().any(|n| is_final(n) || is_partial(n)) {
                started = true;
                info!("[{}] download started: {:?}", report, new);
            }
            if !started || new.iter().any(|n| is_partial(n)) {
                return None;
            }

            let candidate = latest(
                new.iter()
                    .filter(|n| is_final(n))
                    .map(|n| dir.join(n.as_str())),
            )?;
            let size = fs::metadata(&candidate).map(|m| m.len()).unwrap_or(0);
            if last_candidate.as_ref() != Some(&candidate) {
                info!("[{}] waiting for {:?} to settle ({} bytes)", report, candidate, size);
                last_candidate = Some(candidate.clone());
            }
            if size == 0 {
                return None;
            }
            Some((candidate, size))
        });

        match res {
            Ok((path, size)) => {
                info!("[{}] download complete: {:?} ({} bytes)", report, path, size);
                Ok(path)
            }
            Err(e) => Err(ExportError::Timeout {
                report: report.into(),
                stage: WaitStage::Download,
                waited: e.waited,
            }),
        }
    }
}

/// Most recently modified of `paths`.
fn latest(paths: impl Iterator<Item = PathBuf>) -> Option<PathBuf> {
    paths
        .filter_map(|p| {
            let modified = fs::metadata(&p).and_then(|m| m.modified()).ok()?;
            Some((modified, p))
        })
        .max_by_key(|(modified, _): &(SystemTime, PathBuf)| *modified)
        .map(|(_, p)| p)
}
