use crate::error::ParamError;
use chrono::{
    DateTime,
    Local,
    NaiveDate,
    TimeZone,
};
use derive_more::Debug;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    ffi::CString,
    os::unix::ffi::OsStrExt,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};
use strum::IntoEnumIterator;
use ytc_config::{
    i18n,
    parse_range,
    Lang,
    Strategy,
};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const PACKAGE_PREFIX: &str = "ytc";
const PACKAGE_TIME_FORMAT: &str = "%Y%m%d%H%M%S";
const TIME_EXAMPLES: &str = "2024-01-02, 2024-01-02-15, 2024-01-02-15-30";
const RANGE_EXAMPLES: &str = "1M, 1d, 1h, 30m";

/// Collection categories, declared in report and progress order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModuleType {
    Base,
    Diag,
    Perf,
    Extra,
}

impl ModuleType {
    /// Directory under the package that holds this module's collected files.
    pub fn dir_name(self) -> &'static str {
        match self {
            ModuleType::Base => "baseinfo",
            ModuleType::Diag => "diagnosis",
            ModuleType::Perf => "performance",
            ModuleType::Extra => "extra",
        }
    }

    pub fn display_name(self) -> String {
        i18n::t(&format!("module.{self}"))
    }

    /// Parses a comma separated `--type` value.
    pub fn parse_list(value: &str) -> Result<Vec<ModuleType>, ParamError> {
        let mut types = Vec::new();
        for part in value.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            let ty: ModuleType = part.parse().map_err(|_| ParamError::InvalidFlag {
                flag: "type",
                value: part.to_string(),
                examples: "base,diag,perf",
            })?;
            if !types.contains(&ty) {
                types.push(ty);
            }
        }
        if types.is_empty() {
            return Err(ParamError::NoCollectType);
        }
        types.sort();
        Ok(types)
    }

    pub fn all() -> Vec<ModuleType> {
        ModuleType::iter().collect()
    }
}

/// Immutable description of one collection run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectParam {
    pub start: DateTime<Local>,
    /// Already padded by one minute past the requested end.
    pub end: DateTime<Local>,
    pub output: PathBuf,
    pub yasdb_home: PathBuf,
    pub yasdb_data: PathBuf,
    pub yasdb_user: Option<String>,
    #[serde(skip)]
    #[debug(skip)]
    pub yasdb_password: Option<String>,
    #[serde(default)]
    pub include: Vec<PathBuf>,
    #[serde(default)]
    pub exclude: Vec<PathBuf>,
    pub lang: Lang,
    pub begin_time: DateTime<Local>,
}

impl CollectParam {
    pub fn package_name(&self) -> String {
        format!("{PACKAGE_PREFIX}-{}", self.begin_time.format(PACKAGE_TIME_FORMAT))
    }

    pub fn package_dir(&self) -> PathBuf {
        self.output.join(self.package_name())
    }

    pub fn yasdb_bin(&self, name: &str) -> PathBuf {
        self.yasdb_home.join("bin").join(name)
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclude.iter().any(|exclude| path.starts_with(exclude))
    }
}

/// Raw window flags as typed by the operator.
#[derive(Clone, Debug, Default)]
pub struct WindowArgs {
    pub range: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
}

impl TimeWindow {
    /// Resolves and validates the window against `now`. The returned end is
    /// padded by one minute.
    pub fn resolve(args: &WindowArgs, strategy: &Strategy, now: DateTime<Local>) -> Result<Self, ParamError> {
        let (min, max) = strategy.min_and_max_duration().map_err(|err| ParamError::InvalidFlag {
            flag: "strategy",
            value: format!("{err:#}"),
            examples: RANGE_EXAMPLES,
        })?;
        let default_range = strategy.default_range().map_err(|err| ParamError::InvalidFlag {
            flag: "strategy",
            value: format!("{err:#}"),
            examples: RANGE_EXAMPLES,
        })?;

        let (start, end) = match (&args.range, &args.start, &args.end) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => return Err(ParamError::RangeWithStartEnd),
            (Some(range), None, None) => {
                let range = parse_range(range).map_err(|_| ParamError::InvalidFlag {
                    flag: "range",
                    value: range.clone(),
                    examples: RANGE_EXAMPLES,
                })?;
                (now - to_chrono(range), now)
            }
            (None, Some(start), None) => {
                let start = parse_time("start", start)?;
                (start, (start + to_chrono(default_range)).min(now))
            }
            (None, None, Some(end)) => {
                let end = parse_time("end", end)?;
                (end - to_chrono(default_range), end)
            }
            (None, Some(start), Some(end)) => (parse_time("start", start)?, parse_time("end", end)?),
            (None, None, None) => (now - to_chrono(default_range), now),
        };

        if start > now {
            return Err(ParamError::StartAfterNow(start.format(TIME_FORMAT).to_string()));
        }
        if end < start {
            return Err(ParamError::EndBeforeStart {
                start: start.format(TIME_FORMAT).to_string(),
                end: end.format(TIME_FORMAT).to_string(),
            });
        }
        let window = (end - start).to_std().unwrap_or_default();
        if window < min {
            return Err(ParamError::LessThanMinDuration {
                window: humantime::format_duration(window).to_string(),
                min: strategy.min_duration.clone(),
            });
        }
        if window > max {
            return Err(ParamError::GreaterThanMaxDuration {
                window: humantime::format_duration(window).to_string(),
                max: strategy.max_duration.clone(),
            });
        }

        Ok(Self {
            start,
            end: end + chrono::Duration::minutes(1),
        })
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Parses `yyyy-MM-dd`, `yyyy-MM-dd-hh` or `yyyy-MM-dd-hh-mm` in local time.
pub fn parse_time(flag: &'static str, value: &str) -> Result<DateTime<Local>, ParamError> {
    let invalid = || ParamError::InvalidFlag {
        flag,
        value: value.to_string(),
        examples: TIME_EXAMPLES,
    };
    let parts = value
        .trim()
        .split('-')
        .map(|part| part.parse::<u32>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    if !(3..=5).contains(&parts.len()) {
        return Err(invalid());
    }
    let hour = parts.get(3).copied().unwrap_or(0);
    let minute = parts.get(4).copied().unwrap_or(0);
    let naive = NaiveDate::from_ymd_opt(parts[0] as i32, parts[1], parts[2])
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .ok_or_else(invalid)?;
    Local.from_local_datetime(&naive).earliest().ok_or_else(invalid)
}

/// Creates the output directory when needed and verifies it is writable.
pub fn prepare_output(path: &Path) -> Result<PathBuf, ParamError> {
    let output_err = |reason: String| ParamError::Output {
        path: path.to_path_buf(),
        reason,
    };
    std::fs::create_dir_all(path).map_err(|err| output_err(err.to_string()))?;
    let path = path.canonicalize().map_err(|err| output_err(err.to_string()))?;
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|err| output_err(err.to_string()))?;
    if unsafe { libc::access(c_path.as_ptr(), libc::W_OK) } != 0 {
        return Err(output_err(std::io::Error::last_os_error().to_string()));
    }
    Ok(path)
}

pub fn ensure_absolute(paths: &[PathBuf]) -> Result<(), ParamError> {
    match paths.iter().find(|path| !path.is_absolute()) {
        Some(path) => Err(ParamError::RelativePath(path.clone())),
        None => Ok(()),
    }
}

/// Rejects includes that contain, or sit inside, the output directory unless
/// the output directory is itself excluded.
pub fn check_include(include: &[PathBuf], exclude: &[PathBuf], output: &Path) -> Result<(), ParamError> {
    if exclude.iter().any(|exclude| output.starts_with(exclude)) {
        return Ok(());
    }
    for path in include {
        let resolved = path.canonicalize().unwrap_or_else(|_| path.clone());
        if output.starts_with(&resolved) || resolved.starts_with(output) {
            return Err(ParamError::IncludeOverlapsOutput {
                include: path.clone(),
                output: output.to_path_buf(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Local> {
        parse_time("start", "2024-03-10-12-00").unwrap()
    }

    fn args(range: Option<&str>, start: Option<&str>, end: Option<&str>) -> WindowArgs {
        WindowArgs {
            range: range.map(String::from),
            start: start.map(String::from),
            end: end.map(String::from),
        }
    }

    #[test]
    fn range_ends_now_with_padding() {
        let window = TimeWindow::resolve(&args(Some("1h"), None, None), &Strategy::default(), now()).unwrap();
        assert_eq!(window.start, parse_time("start", "2024-03-10-11-00").unwrap());
        assert_eq!(window.end, parse_time("end", "2024-03-10-12-01").unwrap());
    }

    #[test]
    fn default_range_without_flags() {
        let window = TimeWindow::resolve(&WindowArgs::default(), &Strategy::default(), now()).unwrap();
        assert_eq!(window.start, parse_time("start", "2024-03-09-12-00").unwrap());
    }

    #[test]
    fn start_only_is_clamped_to_now() {
        let window =
            TimeWindow::resolve(&args(None, Some("2024-03-10-06"), None), &Strategy::default(), now()).unwrap();
        assert_eq!(window.end, parse_time("end", "2024-03-10-12-01").unwrap());
    }

    #[test]
    fn start_after_now_is_rejected() {
        let err = TimeWindow::resolve(&args(None, Some("2024-03-11"), None), &Strategy::default(), now()).unwrap_err();
        assert!(matches!(err, ParamError::StartAfterNow(_)));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let err = TimeWindow::resolve(
            &args(None, Some("2024-03-10-10"), Some("2024-03-10-09")),
            &Strategy::default(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, ParamError::EndBeforeStart { .. }));
    }

    #[test]
    fn window_bounds_are_enforced() {
        let strategy = Strategy::default();
        let err = TimeWindow::resolve(&args(Some("2d"), None, None), &strategy, now()).unwrap_err();
        assert!(matches!(err, ParamError::GreaterThanMaxDuration { .. }));

        let err = TimeWindow::resolve(
            &args(None, Some("2024-03-10-10-00"), Some("2024-03-10-10-00")),
            &strategy,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, ParamError::LessThanMinDuration { .. }));
    }

    #[test]
    fn range_and_start_conflict() {
        let err = TimeWindow::resolve(&args(Some("1h"), Some("2024-03-10"), None), &Strategy::default(), now())
            .unwrap_err();
        assert!(matches!(err, ParamError::RangeWithStartEnd));
    }

    #[test]
    fn rejects_malformed_times() {
        assert!(parse_time("start", "2024-13-01").is_err());
        assert!(parse_time("start", "2024-01").is_err());
        assert!(parse_time("start", "2024-01-01-25").is_err());
        assert!(parse_time("start", "yesterday").is_err());
    }

    #[test]
    fn parses_type_list_in_fixed_order() {
        assert_eq!(
            ModuleType::parse_list("perf, base,base").unwrap(),
            vec![ModuleType::Base, ModuleType::Perf]
        );
        assert!(matches!(ModuleType::parse_list(""), Err(ParamError::NoCollectType)));
        assert!(ModuleType::parse_list("base,network").is_err());
    }

    #[test]
    fn package_dir_uses_begin_time() {
        let param = CollectParam {
            start: now(),
            end: now(),
            output: PathBuf::from("/tmp/out"),
            yasdb_home: PathBuf::new(),
            yasdb_data: PathBuf::new(),
            yasdb_user: None,
            yasdb_password: None,
            include: vec![],
            exclude: vec![],
            lang: Lang::En,
            begin_time: now(),
        };
        assert_eq!(param.package_dir(), PathBuf::from("/tmp/out/ytc-20240310120000"));
    }

    #[test]
    fn include_must_not_overlap_output() {
        let tmp = temp_dir::TempDir::new().unwrap();
        let output = prepare_output(&tmp.path().join("out")).unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let other = root.join("logs");

        let err = check_include(&[root.clone()], &[], &output).unwrap_err();
        assert!(matches!(err, ParamError::IncludeOverlapsOutput { .. }));
        assert!(check_include(&[output.clone()], &[], &output).is_err());
        assert!(check_include(&[output.join("old")], &[], &output).is_err());

        assert!(check_include(&[other], &[], &output).is_ok());
        assert!(check_include(&[root], &[output.clone()], &output).is_ok());
    }

    #[test]
    fn debug_output_hides_the_password() {
        let param = crate::collectors::testing::param(Path::new("/tmp/out"));
        assert!(param.yasdb_password.is_some());
        let printed = format!("{param:?}");
        assert!(printed.contains("yasdb_user"));
        assert!(!printed.contains("yasdb_password"));
    }
}
