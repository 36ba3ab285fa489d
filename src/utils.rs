use rand::{distributions::Alphanumeric, thread_rng, Rng};
use std::{fs, io, path::Path};

pub const DEFAULT_REPORTS_FILE: &str = "reports.json";
pub const DEFAULT_DOWNLOAD_DIR: &str = "reports";
pub const DEFAULT_EMAIL_LIST_DIR: &str = "recipients";
pub const DEFAULT_RUN_AT: &str = "15:50";

pub fn get_random_string(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Moves `src` to `dst`, replacing whatever is at `dst`.
pub fn replace_file(src: &Path, dst: &Path) -> io::Result<()> {
    if dst.exists() {
        fs::remove_file(dst)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            // rename does not cross filesystems
            fs::copy(src, dst)?;
            fs::remove_file(src)
        }
    }
}
