//! Log files.
//!
//! Each run appends to its own file, `detti_db_<YYYYmmdd_HHMMSS>.log`, in the
//! log directory.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Returns the log file name for a run started at `started`.
pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("detti_db_{}.log", started.format("%Y%m%d_%H%M%S"))
}

/// Opens the log file for a run started at `started`, creating `dir` if
/// needed. Returns the file path and handle.
pub fn open_log_file(dir: &Path, started: DateTime<Local>) -> io::Result<(PathBuf, File)> {
    fs::create_dir_all(dir)?;
    let path = dir.join(log_file_name(started));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    #[test]
    fn test_log_file_name() {
        let started = Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(log_file_name(started), "detti_db_20240305_070809.log");
    }

    #[test]
    fn test_open_log_file_creates_dir_and_appends() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("logs");
        let started = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let (path, mut file) = open_log_file(&dir, started).unwrap();
        assert_eq!(path, dir.join("detti_db_20240102_030405.log"));
        writeln!(file, "first").unwrap();
        drop(file);

        let (_, mut file) = open_log_file(&dir, started).unwrap();
        writeln!(file, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
