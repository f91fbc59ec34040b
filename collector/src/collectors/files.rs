//! File copies into the package and time-window filtering of log files.

use chrono::{
    DateTime,
    Datelike as _,
    Local,
    NaiveDateTime,
};
use eyre::{
    eyre,
    Context as _,
    Result,
};
use std::path::Path;

const YASDB_LOG_TIME: &str = "%Y-%m-%d %H:%M:%S";
const SYSLOG_TIME: &str = "%Y %b %e %H:%M:%S";

pub(crate) fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).wrap_err_with(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::copy(source, dest)
        .map(|_| ())
        .wrap_err_with(|| format!("failed to copy {} to {}", source.display(), dest.display()))
}

/// Result of a recursive copy. A failing entry is recorded and the copy
/// moves on to its siblings.
#[derive(Debug, Default)]
pub(crate) struct DirCopy {
    pub copied: usize,
    pub failed: Vec<String>,
}

impl DirCopy {
    fn fail(&mut self, err: eyre::Report) {
        warn!(error = %format!("{err:#}"), "entry left out of copy");
        self.failed.push(format!("{err:#}"));
    }
}

/// Copies `source` recursively, leaving out every path `skip` accepts.
/// Symlinked files are copied by content. Symlinked directories are not
/// followed. Only an unreadable `source` or uncreatable `dest` is an error.
pub(crate) fn copy_dir(source: &Path, dest: &Path, skip: &dyn Fn(&Path) -> bool) -> Result<DirCopy> {
    let mut outcome = DirCopy::default();
    copy_tree(source, dest, skip, &mut outcome)?;
    Ok(outcome)
}

fn copy_tree(source: &Path, dest: &Path, skip: &dyn Fn(&Path) -> bool, outcome: &mut DirCopy) -> Result<()> {
    std::fs::create_dir_all(dest).wrap_err_with(|| format!("failed to create {}", dest.display()))?;
    let entries = std::fs::read_dir(source).wrap_err_with(|| format!("failed to read {}", source.display()))?;
    for entry in entries {
        let entry = match entry.wrap_err_with(|| format!("failed to read {}", source.display())) {
            Ok(entry) => entry,
            Err(err) => {
                outcome.fail(err);
                continue;
            }
        };
        let path = entry.path();
        if skip(&path) {
            debug!(path = %path.display(), "excluded from copy");
            continue;
        }
        let target = dest.join(entry.file_name());
        let kind = match entry.file_type().wrap_err_with(|| format!("failed to stat {}", path.display())) {
            Ok(kind) => kind,
            Err(err) => {
                outcome.fail(err);
                continue;
            }
        };
        let copied = if kind.is_symlink() && path.is_dir() {
            debug!(path = %path.display(), "symlinked directory not followed");
            continue;
        } else if kind.is_dir() {
            copy_tree(&path, &target, skip, outcome)
        } else if kind.is_file() || kind.is_symlink() {
            copy_file(&path, &target).map(|()| outcome.copied += 1)
        } else {
            Err(eyre!("{} is not a regular file", path.display()))
        };
        if let Err(err) = copied {
            outcome.fail(err);
        }
    }
    Ok(())
}

pub(crate) fn write_file(dest: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).wrap_err_with(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(dest, contents).wrap_err_with(|| format!("failed to write {}", dest.display()))
}

/// `path` relative to the package directory, as recorded in the result tree.
pub(crate) fn stored_path(package_dir: &Path, path: &Path) -> String {
    path.strip_prefix(package_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

/// Keeps the lines logged between `start` and `end`. A line without a
/// timestamp belongs to the entry above it.
pub(crate) fn filter_lines(
    text: &str,
    start: DateTime<Local>,
    end: DateTime<Local>,
    time_of: impl Fn(&str) -> Option<NaiveDateTime>,
) -> String {
    let (start, end) = (start.naive_local(), end.naive_local());
    let mut keep = false;
    let mut kept = String::new();
    for line in text.lines() {
        if let Some(time) = time_of(line) {
            keep = start <= time && time <= end;
        }
        if keep {
            kept.push_str(line);
            kept.push('\n');
        }
    }
    kept
}

/// Timestamp of a run or alert log line: `2024-03-05 10:30:00.123 ...`.
pub(crate) fn yasdb_log_time(line: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(line.get(..19)?, YASDB_LOG_TIME).ok()
}

/// Timestamp of a syslog line. Either the classic `Mar  5 10:30:00 host ...`,
/// which carries no year, or the RFC 3339 prefix rsyslog writes with
/// `RSYSLOG_FileFormat`, read in local time.
pub(crate) fn syslog_time(line: &str, year: i32) -> Option<NaiveDateTime> {
    if let Some(time) = line
        .split_whitespace()
        .next()
        .and_then(|token| DateTime::parse_from_rfc3339(token).ok())
    {
        return Some(time.with_timezone(&Local).naive_local());
    }
    NaiveDateTime::parse_from_str(&format!("{year} {}", line.get(..15)?), SYSLOG_TIME).ok()
}

pub(crate) fn year_of(time: DateTime<Local>) -> i32 {
    time.date_naive().year()
}

/// Last modification time of `path`.
pub(crate) fn modified(path: &Path) -> Option<DateTime<Local>> {
    path.metadata().and_then(|meta| meta.modified()).ok().map(DateTime::<Local>::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn keeps_lines_inside_window() {
        let text = "2024-03-05 09:00:00.001 old\n2024-03-05 10:00:00.001 in\n  continuation\n2024-03-05 12:00:00.000 late\n";
        let start = Local.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap();
        let end = Local.with_ymd_and_hms(2024, 3, 5, 11, 0, 0).unwrap();
        assert_eq!(
            filter_lines(text, start, end, yasdb_log_time),
            "2024-03-05 10:00:00.001 in\n  continuation\n"
        );
    }

    #[test]
    fn reads_syslog_time() {
        let time = syslog_time("Mar  5 10:30:00 db01 kernel: oops", 2024).unwrap();
        assert_eq!(time.to_string(), "2024-03-05 10:30:00");
        assert_eq!(syslog_time("short", 2024), None);
    }

    #[test]
    fn reads_rfc3339_syslog_time() {
        let line = "2024-03-05T10:30:00.123456+00:00 db01 kernel: oops";
        let expected = DateTime::parse_from_rfc3339("2024-03-05T10:30:00.123456+00:00")
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(syslog_time(line, 1999), Some(expected));
    }

    #[test]
    fn copies_directory_tree_with_skips() {
        let dir = temp_dir::TempDir::new().unwrap();
        let source = dir.path().join("src");
        std::fs::create_dir_all(source.join("nested")).unwrap();
        std::fs::write(source.join("a.log"), "a").unwrap();
        std::fs::write(source.join("nested").join("b.log"), "b").unwrap();
        std::fs::write(source.join("skip.log"), "c").unwrap();
        let dest = dir.path().join("dest");
        let outcome = copy_dir(&source, &dest, &|path| path.ends_with("skip.log")).unwrap();
        assert_eq!(outcome.copied, 2);
        assert!(outcome.failed.is_empty());
        assert!(dest.join("nested").join("b.log").is_file());
        assert!(!dest.join("skip.log").exists());
    }

    #[test]
    fn copy_continues_past_bad_entries() {
        use std::os::unix::fs::symlink;

        let dir = temp_dir::TempDir::new().unwrap();
        let source = dir.path().join("src");
        let outside = dir.path().join("outside");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("big.dat"), "x").unwrap();
        std::fs::write(source.join("a.log"), "a").unwrap();
        std::fs::write(source.join("z.log"), "z").unwrap();
        symlink(&outside, source.join("linked")).unwrap();
        symlink(outside.join("big.dat"), source.join("alias.dat")).unwrap();
        symlink(dir.path().join("missing"), source.join("dangling.log")).unwrap();

        let dest = dir.path().join("dest");
        let outcome = copy_dir(&source, &dest, &|_| false).unwrap();

        assert_eq!(outcome.copied, 3);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].contains("dangling.log"));
        assert!(dest.join("a.log").is_file());
        assert!(dest.join("z.log").is_file());
        assert_eq!(std::fs::read_to_string(dest.join("alias.dat")).unwrap(), "x");
        assert!(!dest.join("linked").exists());
    }

    #[test]
    fn copy_fails_only_for_unreadable_source() {
        let dir = temp_dir::TempDir::new().unwrap();
        assert!(copy_dir(&dir.path().join("missing"), &dir.path().join("dest"), &|_| false).is_err());
    }

    #[test]
    fn stored_paths_are_relative() {
        assert_eq!(
            stored_path(Path::new("/out/ytc-1"), Path::new("/out/ytc-1/diagnosis/yasdb/run.log")),
            "diagnosis/yasdb/run.log"
        );
    }
}
