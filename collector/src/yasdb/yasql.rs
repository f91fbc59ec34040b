use super::{
    Deadline,
    SlowLog,
    Snapshot,
    VDatabase,
    VInstance,
    VParameter,
    YasErrorKind,
    YasdbClient,
    YasdbError,
};
use chrono::{
    DateTime,
    Local,
};
use derive_more::Debug;
use std::{
    io::{
        Read,
        Write as _,
    },
    path::PathBuf,
    process::{
        Child,
        Command,
        Output,
        Stdio,
    },
    thread::JoinHandle,
    time::Duration,
};

const ROW_MARKER: &str = "#ROW#";
const FIELD_SEP: &str = "|#|";
const SQL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// `yasql` based client. Every query runs in its own `yasql` process.
#[derive(Clone, Debug)]
pub struct YasqlClient {
    home: PathBuf,
    data: PathBuf,
    user: Option<String>,
    #[debug(skip)]
    password: Option<String>,
}

impl YasqlClient {
    pub fn new(home: PathBuf, data: PathBuf, user: Option<String>, password: Option<String>) -> Self {
        Self {
            home,
            data,
            user,
            password,
        }
    }

    fn bin(&self) -> PathBuf {
        self.home.join("bin").join("yasql")
    }

    /// Runs a `SELECT` whose columns are listed in `columns` and returns one
    /// vector of fields per row.
    fn query(&self, columns: &[&str], from: &str) -> Result<Vec<Vec<String>>, YasdbError> {
        self.query_until(columns, from, Deadline::none())
    }

    fn query_until(&self, columns: &[&str], from: &str, deadline: Deadline) -> Result<Vec<Vec<String>>, YasdbError> {
        let select = columns.join(&format!(" || '{FIELD_SEP}' || "));
        let sql = format!("SELECT '{ROW_MARKER}' || {select} FROM {from};\nexit\n");
        let output = self.execute(&sql, deadline)?;
        parse_rows(&output, columns.len())
    }

    fn execute(&self, sql: &str, deadline: Deadline) -> Result<String, YasdbError> {
        let (Some(user), Some(password)) = (&self.user, &self.password) else {
            return Err(YasdbError::new(
                YasErrorKind::MissingCredentials,
                "database user or password not provided",
            ));
        };
        let bin = self.bin();
        trace!(bin = %bin.display(), sql, "running yasql");
        let mut child = Command::new(&bin)
            .arg(format!("{user}/{password}"))
            .arg("-S")
            .env("YASDB_HOME", &self.home)
            .env("YASDB_DATA", &self.data)
            .env("LD_LIBRARY_PATH", self.home.join("lib"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                YasdbError::new(
                    YasErrorKind::ConnectFailed,
                    format!("failed to start {}: {err}", bin.display()),
                )
            })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(sql.as_bytes())
                .map_err(|err| YasdbError::new(YasErrorKind::Other, format!("failed to send sql: {err}")))?;
        }
        let output = wait_until(child, deadline)?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message: &str = if stderr.trim().is_empty() { &stdout } else { &stderr };
            return Err(YasdbError::classify(message));
        }
        Ok(stdout)
    }

    fn single<T>(&self, mut rows: Vec<T>, what: &str) -> Result<T, YasdbError> {
        if rows.is_empty() {
            return Err(YasdbError::new(YasErrorKind::ObjectMissing, format!("{what} returned no rows")));
        }
        Ok(rows.swap_remove(0))
    }
}

/// Waits for `child`, killing it once `deadline` passes. Pipes are drained on
/// their own threads so a large result cannot stall the child.
fn wait_until(mut child: Child, deadline: Deadline) -> Result<Output, YasdbError> {
    let failed = |err: std::io::Error| YasdbError::new(YasErrorKind::Other, format!("yasql failed: {err}"));
    if !deadline.is_bounded() {
        return child.wait_with_output().map_err(failed);
    }
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);
    let status = loop {
        if let Some(status) = child.try_wait().map_err(failed)? {
            break status;
        }
        if deadline.expired() {
            warn!(pid = child.id(), "yasql still running at the deadline, killing it");
            child.kill().map_err(failed)?;
            child.wait().map_err(failed)?;
            return Err(YasdbError::new(YasErrorKind::Other, "yasql killed at the deadline"));
        }
        std::thread::sleep(POLL_INTERVAL);
    };
    let collect = |pipe: Option<JoinHandle<Vec<u8>>>| pipe.and_then(|handle| handle.join().ok()).unwrap_or_default();
    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain(mut pipe: impl Read + Send + 'static) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(err) = pipe.read_to_end(&mut buf) {
            debug!(%err, "yasql pipe closed early");
        }
        buf
    })
}

/// Picks marked rows out of `yasql` output. A `YAS-` line is a query error.
fn parse_rows(output: &str, width: usize) -> Result<Vec<Vec<String>>, YasdbError> {
    if let Some(line) = output.lines().find(|line| line.trim_start().starts_with("YAS-")) {
        return Err(YasdbError::classify(line));
    }
    Ok(output
        .lines()
        .filter_map(|line| line.trim_end().strip_prefix(ROW_MARKER))
        .map(|row| {
            let mut fields: Vec<String> = row.split(FIELD_SEP).map(|field| field.trim().to_string()).collect();
            fields.resize(width, String::new());
            fields
        })
        .collect())
}

fn sql_time(time: DateTime<Local>) -> String {
    format!("TO_DATE('{}', 'YYYY-MM-DD HH24:MI:SS')", time.format(SQL_TIME_FORMAT))
}

fn sql_char(column: &str) -> String {
    format!("TO_CHAR({column}, 'YYYY-MM-DD HH24:MI:SS')")
}

impl YasdbClient for YasqlClient {
    fn check_connection(&self) -> Result<(), YasdbError> {
        self.query(&["STATUS"], "V$INSTANCE").map(|_| ())
    }

    fn parameter(&self, name: &str) -> Result<String, YasdbError> {
        let from = format!("V$PARAMETER WHERE NAME = '{}'", name.replace('\'', "''"));
        let rows = self.query(&["VALUE"], &from)?;
        self.single(rows, name).map(|mut row| row.swap_remove(0))
    }

    fn parameters(&self) -> Result<Vec<VParameter>, YasdbError> {
        Ok(self
            .query(&["NAME", "VALUE"], "V$PARAMETER ORDER BY NAME")?
            .into_iter()
            .map(|row| VParameter {
                name: row[0].clone(),
                value: row[1].clone(),
            })
            .collect())
    }

    fn database(&self) -> Result<VDatabase, YasdbError> {
        let create_time = sql_char("CREATE_TIME");
        let rows = self.query(
            &["DATABASE_NAME", "STATUS", "OPEN_MODE", "DATABASE_ROLE", "LOG_MODE", create_time.as_str()],
            "V$DATABASE",
        )?;
        let row = self.single(rows, "V$DATABASE")?;
        Ok(VDatabase {
            database_name: row[0].clone(),
            status: row[1].clone(),
            open_mode: row[2].clone(),
            role: row[3].clone(),
            log_mode: row[4].clone(),
            create_time: row[5].clone(),
        })
    }

    fn instance(&self) -> Result<VInstance, YasdbError> {
        let startup_time = sql_char("STARTUP_TIME");
        let rows = self.query(
            &[
                "INSTANCE_NUMBER",
                "INSTANCE_NAME",
                "HOST_NAME",
                "VERSION",
                startup_time.as_str(),
                "STATUS",
                "INSTANCE_ROLE",
            ],
            "V$INSTANCE",
        )?;
        let row = self.single(rows, "V$INSTANCE")?;
        Ok(VInstance {
            instance_number: row[0].clone(),
            instance_name: row[1].clone(),
            host_name: row[2].clone(),
            version: row[3].clone(),
            startup_time: row[4].clone(),
            status: row[5].clone(),
            role: row[6].clone(),
        })
    }

    fn slow_logs(&self, start: DateTime<Local>, end: DateTime<Local>) -> Result<Vec<SlowLog>, YasdbError> {
        let start_time = sql_char("START_TIME");
        let from = format!(
            "SYS.SLOW_LOG$ WHERE START_TIME BETWEEN {} AND {} ORDER BY START_TIME",
            sql_time(start),
            sql_time(end)
        );
        Ok(self
            .query(
                &[start_time.as_str(), "USER_NAME", "USER_HOST", "QUERY_TIME", "ROWS_SENT", "SQL_TEXT"],
                &from,
            )?
            .into_iter()
            .map(|row| SlowLog {
                start_time: row[0].clone(),
                user_name: row[1].clone(),
                user_host: row[2].clone(),
                query_time: row[3].clone(),
                rows_sent: row[4].clone(),
                sql_text: row[5].clone(),
            })
            .collect())
    }

    fn snapshots(&self, start: DateTime<Local>, end: DateTime<Local>) -> Result<Vec<Snapshot>, YasdbError> {
        let begin = sql_char("BEGIN_INTERVAL_TIME");
        let finish = sql_char("END_INTERVAL_TIME");
        let from = format!(
            "SYS.WRM$_SNAPSHOT WHERE BEGIN_INTERVAL_TIME >= {} AND END_INTERVAL_TIME <= {} ORDER BY SNAP_ID",
            sql_time(start),
            sql_time(end)
        );
        self.query(&["SNAP_ID", begin.as_str(), finish.as_str()], &from)?
            .into_iter()
            .map(|row| {
                let snap_id = row[0].parse().map_err(|_| {
                    YasdbError::new(YasErrorKind::Other, format!("invalid snapshot id '{}'", row[0]))
                })?;
                Ok(Snapshot {
                    snap_id,
                    begin_time: row[1].clone(),
                    end_time: row[2].clone(),
                })
            })
            .collect()
    }

    fn awr_report(&self, begin: &Snapshot, end: &Snapshot, deadline: Deadline) -> Result<String, YasdbError> {
        let from = format!(
            "TABLE(SYS.DBMS_AWR.AWR_REPORT_HTML({}, {}))",
            begin.snap_id, end.snap_id
        );
        let rows = self.query_until(&["COLUMN_VALUE"], &from, deadline)?;
        Ok(rows.into_iter().map(|mut row| row.swap_remove(0)).collect::<Vec<_>>().join("\n"))
    }
}
