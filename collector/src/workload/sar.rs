use super::{
    SarCpu,
    SarDisk,
    SarMemory,
    SarNetwork,
    Series,
    ALL_KEY,
};
use chrono::{
    DateTime,
    Datelike,
    Local,
    NaiveDate,
    NaiveTime,
    TimeZone,
    Timelike,
};
use eyre::{
    eyre,
    Context as _,
    Result,
};
use std::{
    collections::HashMap,
    path::{
        Path,
        PathBuf,
    },
    process::Command,
    time::Duration,
};

const ARCHIVE_DIRS: [&str; 2] = ["/var/log/sa", "/var/log/sysstat"];
pub const SAR_NOT_FOUND: &str = "sar: command not found";

/// One `sar` report flavour: the flags selecting it and how to read a row.
pub trait SarRecord: Sized {
    const ARGS: &'static [&'static str];
    /// Column naming the series key, `None` when the report has a single series.
    const KEY_COLUMN: Option<&'static str>;
    /// Column name only found in header rows.
    const MARKER: &'static str;

    fn from_columns(columns: &HashMap<&str, f64>) -> Self;
}

fn col(columns: &HashMap<&str, f64>, names: &[&str]) -> f64 {
    names.iter().find_map(|name| columns.get(name).copied()).unwrap_or_default()
}

impl SarRecord for SarCpu {
    const ARGS: &'static [&'static str] = &["-u"];
    const KEY_COLUMN: Option<&'static str> = Some("CPU");
    const MARKER: &'static str = "%idle";

    fn from_columns(c: &HashMap<&str, f64>) -> Self {
        Self {
            user: col(c, &["%user"]),
            nice: col(c, &["%nice"]),
            system: col(c, &["%system"]),
            iowait: col(c, &["%iowait"]),
            steal: col(c, &["%steal"]),
            idle: col(c, &["%idle"]),
        }
    }
}

impl SarRecord for SarMemory {
    const ARGS: &'static [&'static str] = &["-r"];
    const KEY_COLUMN: Option<&'static str> = None;
    const MARKER: &'static str = "kbmemfree";

    fn from_columns(c: &HashMap<&str, f64>) -> Self {
        Self {
            kb_mem_free: col(c, &["kbmemfree"]),
            kb_avail: col(c, &["kbavail"]),
            kb_mem_used: col(c, &["kbmemused"]),
            mem_used: col(c, &["%memused"]),
            kb_buffers: col(c, &["kbbuffers"]),
            kb_cached: col(c, &["kbcached"]),
            kb_commit: col(c, &["kbcommit"]),
            commit: col(c, &["%commit"]),
            kb_active: col(c, &["kbactive"]),
            kb_inact: col(c, &["kbinact"]),
            kb_dirty: col(c, &["kbdirty"]),
        }
    }
}

impl SarRecord for SarNetwork {
    const ARGS: &'static [&'static str] = &["-n", "DEV"];
    const KEY_COLUMN: Option<&'static str> = Some("IFACE");
    const MARKER: &'static str = "IFACE";

    fn from_columns(c: &HashMap<&str, f64>) -> Self {
        Self {
            rx_pck: col(c, &["rxpck/s"]),
            tx_pck: col(c, &["txpck/s"]),
            rx_kb: col(c, &["rxkB/s"]),
            tx_kb: col(c, &["txkB/s"]),
            rx_cmp: col(c, &["rxcmp/s"]),
            tx_cmp: col(c, &["txcmp/s"]),
            rx_mcst: col(c, &["rxmcst/s"]),
            if_util: col(c, &["%ifutil"]),
        }
    }
}

impl SarRecord for SarDisk {
    const ARGS: &'static [&'static str] = &["-d", "-p"];
    const KEY_COLUMN: Option<&'static str> = Some("DEV");
    const MARKER: &'static str = "DEV";

    fn from_columns(c: &HashMap<&str, f64>) -> Self {
        // Older sysstat reports 512-byte sectors instead of kilobytes.
        let read_kb = c.get("rkB/s").copied().unwrap_or_else(|| col(c, &["rd_sec/s"]) / 2.0);
        let write_kb = c.get("wkB/s").copied().unwrap_or_else(|| col(c, &["wr_sec/s"]) / 2.0);
        Self {
            tps: col(c, &["tps"]),
            read_kb,
            write_kb,
            avg_request_size: col(c, &["areq-sz", "avgrq-sz"]),
            avg_queue_size: col(c, &["aqu-sz", "avgqu-sz"]),
            await_ms: col(c, &["await"]),
            util: col(c, &["%util"]),
        }
    }
}

fn report_date(line: &str) -> Option<NaiveDate> {
    line.split_whitespace().find_map(|token| {
        NaiveDate::parse_from_str(token, "%m/%d/%Y")
            .or_else(|_| NaiveDate::parse_from_str(token, "%Y-%m-%d"))
            .or_else(|_| NaiveDate::parse_from_str(token, "%m/%d/%y"))
            .ok()
    })
}

/// Splits the leading clock time off a report row, honouring an AM/PM marker.
fn row_time<'t, 's>(tokens: &'t [&'s str]) -> Option<(NaiveTime, &'t [&'s str])> {
    let time = NaiveTime::parse_from_str(tokens.first()?, "%H:%M:%S").ok()?;
    match tokens.get(1).copied() {
        Some("AM") => {
            let time = if time.hour() == 12 {
                time - chrono::Duration::hours(12)
            } else {
                time
            };
            Some((time, &tokens[2..]))
        }
        Some("PM") => {
            let time = if time.hour() == 12 {
                time
            } else {
                time + chrono::Duration::hours(12)
            };
            Some((time, &tokens[2..]))
        }
        _ => Some((time, &tokens[1..])),
    }
}

/// Parses the textual output of one `sar` invocation.
pub fn parse<T: SarRecord>(output: &str, fallback_date: NaiveDate) -> Series<T> {
    let mut series = Series::new();
    let mut date = fallback_date;
    let mut header: Option<Vec<&str>> = None;
    let mut last_time: Option<NaiveTime> = None;

    for line in output.lines() {
        if line.starts_with("Linux") {
            date = report_date(line).unwrap_or(date);
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((time, rest)) = row_time(&tokens) else {
            continue;
        };
        if rest.contains(&T::MARKER) {
            header = Some(rest.to_vec());
            continue;
        }
        let Some(header) = header.as_ref() else {
            continue;
        };
        if rest.len() != header.len() {
            continue;
        }

        let key = match T::KEY_COLUMN {
            Some(column) => match header.iter().position(|name| *name == column) {
                Some(pos) => rest[pos].to_string(),
                None => continue,
            },
            None => ALL_KEY.to_string(),
        };
        let columns: HashMap<&str, f64> = header
            .iter()
            .zip(rest)
            .filter_map(|(name, value)| value.parse::<f64>().ok().map(|value| (*name, value)))
            .collect();

        if last_time.is_some_and(|last| time < last) {
            date = date.succ_opt().unwrap_or(date);
        }
        last_time = Some(time);
        let Some(timestamp) = Local.from_local_datetime(&date.and_time(time)).earliest() else {
            continue;
        };
        series
            .entry(timestamp.timestamp())
            .or_default()
            .insert(key, T::from_columns(&columns));
    }
    series
}

/// Runs the sysstat `sar` binary.
#[derive(Clone, Debug)]
pub struct SarRunner {
    bin: PathBuf,
    archive_dir: PathBuf,
}

impl SarRunner {
    pub const BIN: &'static str = "sar";

    pub fn new(bin: PathBuf) -> Self {
        let archive_dir = ARCHIVE_DIRS
            .iter()
            .map(PathBuf::from)
            .find(|dir| dir.is_dir())
            .unwrap_or_else(|| PathBuf::from(ARCHIVE_DIRS[0]));
        Self { bin, archive_dir }
    }

    fn run(&self, args: &[String]) -> Result<String> {
        debug!(bin = %self.bin.display(), ?args, "running sar");
        let output = Command::new(&self.bin)
            .args(args)
            .env("LC_ALL", "C")
            .output()
            .wrap_err_with(|| format!("failed to execute {}", self.bin.display()))?;
        if !output.status.success() {
            return Err(eyre!(
                "sar exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn archive(&self, day: NaiveDate) -> PathBuf {
        self.archive_dir.join(format!("sa{:02}", day.day()))
    }

    /// Reads the daily archives covering `[start, end]`.
    pub fn history<T: SarRecord>(&self, start: DateTime<Local>, end: DateTime<Local>) -> Result<Series<T>> {
        let mut series = Series::new();
        let mut found = false;
        let mut day = start.date_naive();
        while day <= end.date_naive() {
            let archive = self.archive(day);
            if archive_exists(&archive) {
                found = true;
                let from = if day == start.date_naive() {
                    start.format("%H:%M:%S").to_string()
                } else {
                    "00:00:00".to_string()
                };
                let to = if day == end.date_naive() {
                    end.format("%H:%M:%S").to_string()
                } else {
                    "23:59:59".to_string()
                };
                let mut args: Vec<String> = T::ARGS.iter().map(|arg| arg.to_string()).collect();
                args.extend(["-f".to_string(), archive.to_string_lossy().into_owned()]);
                args.extend(["-s".to_string(), from, "-e".to_string(), to]);
                let output = self.run(&args)?;
                series.append(&mut parse::<T>(&output, day));
            } else {
                debug!(archive = %archive.display(), "sar archive missing");
            }
            let Some(next) = day.succ_opt() else {
                break;
            };
            day = next;
        }
        if !found {
            return Err(eyre!(
                "no sar archive under {} covers the collection window",
                self.archive_dir.display()
            ));
        }
        Ok(series)
    }

    /// Samples `count` intervals right now.
    pub fn current<T: SarRecord>(&self, interval: Duration, count: u32) -> Result<Series<T>> {
        let mut args: Vec<String> = T::ARGS.iter().map(|arg| arg.to_string()).collect();
        args.push(interval.as_secs().max(1).to_string());
        args.push(count.to_string());
        let output = self.run(&args)?;
        Ok(parse::<T>(&output, Local::now().date_naive()))
    }
}

fn archive_exists(path: &Path) -> bool {
    path.metadata().map(|meta| meta.is_file()).unwrap_or(false)
}
