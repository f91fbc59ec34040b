//! In-memory host and database used by the collector tests.

use super::CollectContext;
use crate::{
    data::ProcessInfo,
    deadline::Deadline,
    host::{
        HostProbe,
        OsId,
        SudoAccess,
    },
    param::CollectParam,
    yasdb::{
        SlowLog,
        Snapshot,
        VDatabase,
        VInstance,
        VParameter,
        YasErrorKind,
        YasdbClient,
        YasdbError,
    },
};
use chrono::{
    DateTime,
    Duration as ChronoDuration,
    Local,
    TimeZone,
};
use std::{
    collections::{
        BTreeMap,
        BTreeSet,
    },
    io,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};
use ytc_config::{
    Lang,
    Strategy,
};

#[derive(Debug)]
pub struct FakeProbe {
    pub os: OsId,
    pub root: bool,
    pub sudo: SudoAccess,
    pub user: String,
    pub commands: BTreeSet<String>,
    pub files: BTreeMap<PathBuf, String>,
    pub denied: BTreeSet<PathBuf>,
    pub processes: Vec<ProcessInfo>,
    pub outputs: BTreeMap<String, String>,
    pub ran: Mutex<Vec<String>>,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self {
            os: OsId::Centos,
            root: false,
            sudo: SudoAccess::Denied,
            user: "yashan".to_string(),
            commands: BTreeSet::new(),
            files: BTreeMap::new(),
            denied: BTreeSet::new(),
            processes: Vec::new(),
            outputs: BTreeMap::new(),
            ran: Mutex::new(Vec::new()),
        }
    }
}

impl FakeProbe {
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: &str) -> Self {
        self.files.insert(path.into(), content.to_string());
        self
    }

    pub fn with_denied(mut self, path: impl Into<PathBuf>) -> Self {
        self.denied.insert(path.into());
        self
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.commands.insert(command.to_string());
        self
    }

    pub fn with_output(mut self, command: &str, output: &str) -> Self {
        self.outputs.insert(command.to_string(), output.to_string());
        self
    }
}

impl HostProbe for FakeProbe {
    fn check_readable(&self, path: &Path) -> io::Result<()> {
        if self.denied.contains(path) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        if self.files.keys().any(|file| file.starts_with(path)) {
            return Ok(());
        }
        Err(io::Error::from(io::ErrorKind::NotFound))
    }

    fn which(&self, command: &str) -> Option<PathBuf> {
        self.commands
            .contains(command)
            .then(|| PathBuf::from("/usr/bin").join(command))
    }

    fn os_id(&self) -> OsId {
        self.os.clone()
    }

    fn is_root(&self) -> bool {
        self.root
    }

    fn sudo(&self) -> SudoAccess {
        self.sudo
    }

    fn current_user(&self) -> String {
        self.user.clone()
    }

    fn file_owner(&self, _path: &Path) -> Option<String> {
        Some("yashan".to_string())
    }

    fn home_dir(&self, user: &str) -> Option<PathBuf> {
        Some(match user {
            "root" => PathBuf::from("/root"),
            user => PathBuf::from("/home").join(user),
        })
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.check_readable(path)?;
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn yasdb_processes(&self, _data: &Path) -> Vec<ProcessInfo> {
        self.processes.clone()
    }

    fn run(&self, program: &str, args: &[&str]) -> eyre::Result<String> {
        let line = std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ");
        self.ran.lock().unwrap().push(line.clone());
        self.outputs
            .get(&line)
            .cloned()
            .ok_or_else(|| eyre::eyre!("{program}: command not found"))
    }
}

#[derive(Debug, Default)]
pub struct FakeClient {
    pub down: Option<YasdbError>,
    pub parameters: BTreeMap<String, String>,
    pub database: VDatabase,
    pub instance: VInstance,
    pub slow_logs: Vec<SlowLog>,
    pub snapshots: Vec<Snapshot>,
    pub awr: String,
    pub awr_delay: Option<Duration>,
}

impl FakeClient {
    pub fn down(kind: YasErrorKind, message: &str) -> Self {
        Self {
            down: Some(YasdbError::new(kind, message)),
            ..Default::default()
        }
    }

    fn up(&self) -> Result<(), YasdbError> {
        match &self.down {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl YasdbClient for FakeClient {
    fn check_connection(&self) -> Result<(), YasdbError> {
        self.up()
    }

    fn parameter(&self, name: &str) -> Result<String, YasdbError> {
        self.up()?;
        self.parameters
            .get(name)
            .cloned()
            .ok_or_else(|| YasdbError::new(YasErrorKind::ObjectMissing, format!("{name} returned no rows")))
    }

    fn parameters(&self) -> Result<Vec<VParameter>, YasdbError> {
        self.up()?;
        Ok(self
            .parameters
            .iter()
            .map(|(name, value)| VParameter {
                name: name.clone(),
                value: value.clone(),
            })
            .collect())
    }

    fn database(&self) -> Result<VDatabase, YasdbError> {
        self.up().map(|_| self.database.clone())
    }

    fn instance(&self) -> Result<VInstance, YasdbError> {
        self.up().map(|_| self.instance.clone())
    }

    fn slow_logs(&self, _start: DateTime<Local>, _end: DateTime<Local>) -> Result<Vec<SlowLog>, YasdbError> {
        self.up().map(|_| self.slow_logs.clone())
    }

    fn snapshots(&self, _start: DateTime<Local>, _end: DateTime<Local>) -> Result<Vec<Snapshot>, YasdbError> {
        self.up().map(|_| self.snapshots.clone())
    }

    fn awr_report(&self, _begin: &Snapshot, _end: &Snapshot, _deadline: Deadline) -> Result<String, YasdbError> {
        self.up()?;
        if let Some(delay) = self.awr_delay {
            std::thread::sleep(delay);
        }
        Ok(self.awr.clone())
    }
}

pub const HOME: &str = "/opt/yashandb/home";
pub const DATA: &str = "/opt/yashandb/data";

pub fn begin_time() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 3, 5, 10, 30, 0).unwrap()
}

pub fn param(output: &Path) -> CollectParam {
    let begin_time = begin_time();
    CollectParam {
        start: begin_time - ChronoDuration::hours(1),
        end: begin_time + ChronoDuration::minutes(1),
        output: output.to_path_buf(),
        yasdb_home: PathBuf::from(HOME),
        yasdb_data: PathBuf::from(DATA),
        yasdb_user: Some("sys".to_string()),
        yasdb_password: Some("yasdb_123".to_string()),
        include: Vec::new(),
        exclude: Vec::new(),
        lang: Lang::En,
        begin_time,
    }
}

pub fn context(param: CollectParam, probe: FakeProbe, client: FakeClient) -> CollectContext {
    ytc_config::i18n::init(Lang::En);
    let strategy = Strategy {
        sample_interval: "10ms".to_string(),
        sample_count: 1,
        ..Default::default()
    };
    CollectContext::new(param, strategy, Arc::new(probe), Arc::new(client)).unwrap()
}
