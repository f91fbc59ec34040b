use super::{
    blocking_task,
    files,
    CollectContext,
    CollectTask,
    TypedCollector,
};
use crate::{
    access::{
        self,
        NoAccess,
    },
    data::{
        child,
        CollectedFile,
        ItemDetails,
        ItemId,
        ModuleSink,
        YtcItem,
        YtcModule,
    },
    host::{
        HostProbe,
        OsId,
        SudoAccess,
    },
    param::ModuleType,
    yasdb::YasdbError,
};
use eyre::{
    eyre,
    Context as _,
    Result,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
};
use ytc_config::i18n;

const CORE_PATTERN: &str = "/proc/sys/kernel/core_pattern";
const SYSTEMD_COREDUMP: &str = "systemd-coredump";
const SYSTEMD_COREDUMP_DIR: &str = "/var/lib/systemd/coredump";
const ABRT_HOOK: &str = "abrt-hook-ccpp";
const ABRT_CONF: &str = "/etc/abrt/abrt.conf";
const ABRT_DEFAULT_DIR: &str = "/var/spool/abrt";
const MESSAGES: &str = "/var/log/messages";
const SYSLOG: &str = "/var/log/syslog";
const DIAGNOSTIC_DEST: &str = "DIAGNOSTIC_DEST";
const RUN_LOG_FILE_PATH: &str = "RUN_LOG_FILE_PATH";

/// Paths resolved during the access check and reused by the collection.
#[derive(Clone, Debug, Default)]
struct DiagPaths {
    adr: PathBuf,
    run_log: PathBuf,
    alert_log: PathBuf,
    coredump: PathBuf,
    bash_history: Option<(String, PathBuf)>,
}

/// Database and host logs, process and instance status, coredumps.
pub struct DiagCollector {
    ctx: CollectContext,
    sink: ModuleSink,
    package_dir: PathBuf,
    paths: DiagPaths,
}

impl DiagCollector {
    pub fn new(ctx: CollectContext) -> Self {
        let data = ctx.param.yasdb_data.clone();
        let paths = DiagPaths {
            adr: data.join("diag"),
            run_log: default_run_log(&data),
            alert_log: data.join("log").join("alert").join("alert.log"),
            coredump: data.clone(),
            bash_history: None,
        };
        Self {
            package_dir: ctx.param.package_dir(),
            ctx,
            sink: ModuleSink::new(ModuleType::Diag),
            paths,
        }
    }

    fn probe(&self) -> &dyn HostProbe {
        self.ctx.probe.as_ref()
    }

    fn path_no_access(&self, item: ItemId, path: &Path) -> Option<NoAccess> {
        let err = self.probe().check_readable(path).err()?;
        let (desc, tips) = access::path_err_desc_and_tips(self.probe(), path, &err);
        Some(NoAccess::skip(item, desc, tips))
    }

    /// Path named by a database parameter, or `default` with the reason the
    /// parameter could not be read.
    fn db_path(
        &self,
        db_validation: Option<&YasdbError>,
        parameter: &str,
        default: PathBuf,
        to_path: impl Fn(PathBuf) -> PathBuf,
    ) -> (PathBuf, Option<YasdbError>) {
        if let Some(err) = db_validation {
            return (default, Some(err.clone()));
        }
        match self.ctx.client.parameter(parameter) {
            Ok(value) => {
                let data = self.ctx.param.yasdb_data.to_string_lossy();
                (to_path(PathBuf::from(value.replace('?', &data))), None)
            }
            Err(err) => {
                warn!(parameter, %err, "falling back to the default path");
                (default, Some(err))
            }
        }
    }

    fn check_db_path(&self, item: ItemId, path: &Path, fallback: Option<YasdbError>) -> Option<NoAccess> {
        if let Some(no_access) = self.path_no_access(item, path) {
            return Some(no_access);
        }
        let err = fallback?;
        let (desc, _) = access::yas_err_desc_and_tips(&err);
        Some(NoAccess::force(
            item,
            desc,
            i18n::t_with("diag.default_path_tips", &[("Path", &path.display().to_string())]),
        ))
    }

    fn check_adr(&mut self, db_validation: Option<&YasdbError>) -> Option<NoAccess> {
        let default = self.ctx.param.yasdb_data.join("diag");
        let (path, fallback) = self.db_path(db_validation, DIAGNOSTIC_DEST, default, |dest| dest);
        self.paths.adr = path.clone();
        self.check_db_path(ItemId::YasdbAdr, &path, fallback)
    }

    fn check_run_log(&mut self, db_validation: Option<&YasdbError>) -> Option<NoAccess> {
        let default = default_run_log(&self.ctx.param.yasdb_data);
        let (path, fallback) = self.db_path(db_validation, RUN_LOG_FILE_PATH, default, |dir| dir.join("run.log"));
        self.paths.run_log = path.clone();
        self.check_db_path(ItemId::YasdbRunLog, &path, fallback)
    }

    fn check_process(&self) -> Option<NoAccess> {
        if !self.probe().yasdb_processes(&self.ctx.param.yasdb_data).is_empty() {
            return None;
        }
        let data = self.ctx.param.yasdb_data.display().to_string();
        Some(NoAccess::skip(
            ItemId::YasdbProcessStatus,
            i18n::t_with("diag.process_not_found_desc", &[("Data", &data)]),
            i18n::t("diag.process_not_found_tips"),
        ))
    }

    fn check_db(&self, item: ItemId, db_validation: Option<&YasdbError>) -> Option<NoAccess> {
        let (desc, tips) = access::yas_err_desc_and_tips(db_validation?);
        Some(NoAccess::skip(item, desc, tips))
    }

    /// `messages` is preferred; `syslog` is only looked at when `messages` does not exist.
    fn check_syslog(&self) -> Option<NoAccess> {
        for path in [MESSAGES, SYSLOG].map(Path::new) {
            match self.probe().check_readable(path) {
                Ok(()) => return None,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    let (desc, tips) = access::path_err_desc_and_tips(self.probe(), path, &err);
                    return Some(NoAccess::skip(ItemId::HostSystemLog, desc, tips));
                }
            }
        }
        Some(NoAccess::skip(
            ItemId::HostSystemLog,
            i18n::t_with("diag.syslog_not_found_desc", &[("Path1", MESSAGES), ("Path2", SYSLOG)]),
            i18n::t("diag.syslog_not_found_tips"),
        ))
    }

    fn check_dmesg(&self) -> Option<NoAccess> {
        let probe = self.probe();
        if probe.os_id() != OsId::Kylin || probe.is_root() {
            return None;
        }
        Some(NoAccess::skip(
            ItemId::HostKernelLog,
            i18n::t("diag.dmesg_need_root_desc"),
            access::privilege_tips(probe),
        ))
    }

    fn check_coredump(&mut self) -> Option<NoAccess> {
        let pattern = match self.probe().read_to_string(Path::new(CORE_PATTERN)) {
            Ok(pattern) => pattern.trim().to_string(),
            Err(err) => {
                return Some(NoAccess::skip(
                    ItemId::YasdbCoredump,
                    i18n::t_with("diag.coredump_error_desc", &[("Error", &err.to_string())]),
                    String::new(),
                ))
            }
        };
        let (dir, relative) = match core_dump_dir(self.probe(), &pattern, &self.ctx.param.yasdb_data) {
            Ok(found) => found,
            Err(err) => {
                return Some(NoAccess::skip(
                    ItemId::YasdbCoredump,
                    i18n::t_with("diag.coredump_error_desc", &[("Error", &format!("{err:#}"))]),
                    String::new(),
                ))
            }
        };
        self.paths.coredump = dir.clone();
        if let Some(no_access) = self.path_no_access(ItemId::YasdbCoredump, &dir) {
            return Some(no_access);
        }
        relative.then(|| {
            NoAccess::force(
                ItemId::YasdbCoredump,
                i18n::t_with("diag.coredump_relative_desc", &[("Pattern", &pattern)]),
                i18n::t_with("diag.coredump_relative_tips", &[("Path", &dir.display().to_string())]),
            )
        })
    }

    /// History of the user owning the installation. Readable directly by root
    /// and that user, through `sudo` by everyone else.
    fn check_bash_history(&mut self) -> Option<NoAccess> {
        let probe = self.probe();
        let owner = probe
            .file_owner(&self.ctx.param.yasdb_home)
            .unwrap_or_else(|| probe.current_user());
        let readable = probe.is_root() || owner == probe.current_user() || probe.sudo() == SudoAccess::NoPassword;
        if !readable {
            return Some(NoAccess::skip(
                ItemId::HostBashHistory,
                i18n::t_with("diag.bash_history_no_permission", &[("User", &owner)]),
                access::privilege_tips(probe),
            ));
        }
        let Some(home) = probe.home_dir(&owner) else {
            return Some(NoAccess::skip(
                ItemId::HostBashHistory,
                i18n::t_with("diag.bash_history_no_home", &[("User", &owner)]),
                String::new(),
            ));
        };
        self.paths.bash_history = Some((owner, home.join(".bash_history")));
        None
    }

    fn dir(&self, sub: &str) -> PathBuf {
        self.package_dir.join(ModuleType::Diag.dir_name()).join(sub)
    }

    fn job(&self, item: ItemId) -> Option<Box<dyn FnOnce() -> YtcItem + Send>> {
        let ctx = self.ctx.clone();
        let package = self.package_dir.clone();
        let paths = self.paths.clone();
        let yasdb_dir = self.dir("yasdb");
        let host_dir = self.dir("host");
        let job: Box<dyn FnOnce() -> YtcItem + Send> = match item {
            ItemId::YasdbAdr => Box::new(move || {
                let dest = yasdb_dir.join("adr");
                let copied = files::copy_dir(&paths.adr, &dest, &|_| false).map(|outcome| {
                    debug!(copied = outcome.copied, failed = outcome.failed.len(), "adr files copied");
                    ItemDetails::Path(files::stored_path(&package, &dest))
                });
                detail(item, copied)
            }),
            ItemId::YasdbRunLog => Box::new(move || {
                let dest = yasdb_dir.join("run.log");
                detail(item, copy_log(&ctx, &paths.run_log, &dest, &package, files::yasdb_log_time))
            }),
            ItemId::YasdbAlertLog => Box::new(move || {
                let dest = yasdb_dir.join("alert.log");
                detail(item, copy_log(&ctx, &paths.alert_log, &dest, &package, files::yasdb_log_time))
            }),
            ItemId::YasdbProcessStatus => Box::new(move || {
                let processes = ctx.probe.yasdb_processes(&ctx.param.yasdb_data);
                YtcItem::new(item.as_ref()).with_details(ItemDetails::Processes(processes))
            }),
            ItemId::YasdbInstanceStatus => Box::new(move || match ctx.client.instance() {
                Ok(instance) => YtcItem::new(item.as_ref()).with_details(ItemDetails::Instance(instance)),
                Err(err) => yas_failure(item, err),
            }),
            ItemId::YasdbDatabaseStatus => Box::new(move || match ctx.client.database() {
                Ok(database) => YtcItem::new(item.as_ref()).with_details(ItemDetails::Database(database)),
                Err(err) => yas_failure(item, err),
            }),
            ItemId::HostSystemLog => Box::new(move || system_log(&ctx, &host_dir, &package)),
            ItemId::HostKernelLog => Box::new(move || {
                let dest = host_dir.join("dmesg.log");
                let stored = ctx
                    .probe
                    .run("dmesg", &["-T"])
                    .and_then(|output| files::write_file(&dest, &output))
                    .map(|_| ItemDetails::Path(files::stored_path(&package, &dest)));
                detail(item, stored)
            }),
            ItemId::YasdbCoredump => Box::new(move || {
                let dest = yasdb_dir.join("coredump");
                detail(item, copy_coredumps(&ctx, &paths.coredump, &dest, &package))
            }),
            ItemId::HostBashHistory => Box::new(move || {
                let Some((owner, source)) = paths.bash_history else {
                    return YtcItem::new(item.as_ref())
                        .fail("bash history location unknown", i18n::t("common.collect_failed_desc"));
                };
                let dest = host_dir.join(format!("bash_history_{owner}"));
                detail(item, bash_history(ctx.probe.clone(), &owner, &source, &dest, &package))
            }),
            _ => return None,
        };
        Some(job)
    }
}

impl TypedCollector for DiagCollector {
    fn module_type(&self) -> ModuleType {
        ModuleType::Diag
    }

    fn check_access(&mut self, db_validation: Option<&YasdbError>) -> Vec<NoAccess> {
        let alert_log = self.paths.alert_log.clone();
        [
            self.check_adr(db_validation),
            self.check_run_log(db_validation),
            self.path_no_access(ItemId::YasdbAlertLog, &alert_log),
            self.check_process(),
            self.check_db(ItemId::YasdbInstanceStatus, db_validation),
            self.check_db(ItemId::YasdbDatabaseStatus, db_validation),
            self.check_syslog(),
            self.check_dmesg(),
            self.check_coredump(),
            self.check_bash_history(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn collect_task(&self, item: ItemId) -> Option<CollectTask> {
        let job = self.job(item)?;
        Some(blocking_task(&self.sink, item, job))
    }

    fn pre_collect(&mut self, package_dir: &Path) -> Result<()> {
        self.package_dir = package_dir.to_path_buf();
        for sub in ["yasdb", "host"] {
            let dir = self.dir(sub);
            std::fs::create_dir_all(&dir).wrap_err_with(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    fn collect_ok(&self) -> YtcModule {
        self.sink.snapshot()
    }
}

fn default_run_log(data: &Path) -> PathBuf {
    data.join("log").join("run").join("run.log")
}

fn detail(item: ItemId, details: Result<ItemDetails>) -> YtcItem {
    match details {
        Ok(details) => YtcItem::new(item.as_ref()).with_details(details),
        Err(err) => {
            error!(%item, ?err, "collect failed");
            YtcItem::new(item.as_ref()).fail(format!("{err:#}"), i18n::t("common.collect_failed_desc"))
        }
    }
}

fn yas_failure(item: ItemId, err: YasdbError) -> YtcItem {
    let (desc, _) = access::yas_err_desc_and_tips(&err);
    YtcItem::new(item.as_ref()).fail(err, desc)
}

/// Copies the lines of `source` that fall into the collection window.
fn copy_log(
    ctx: &CollectContext,
    source: &Path,
    dest: &Path,
    package: &Path,
    time_of: impl Fn(&str) -> Option<chrono::NaiveDateTime>,
) -> Result<ItemDetails> {
    let text = ctx
        .probe
        .read_to_string(source)
        .wrap_err_with(|| format!("failed to read {}", source.display()))?;
    let kept = files::filter_lines(&text, ctx.param.start, ctx.param.end, time_of);
    files::write_file(dest, &kept)?;
    Ok(ItemDetails::Path(files::stored_path(package, dest)))
}

fn system_log(ctx: &CollectContext, host_dir: &Path, package: &Path) -> YtcItem {
    let year = files::year_of(ctx.param.start);
    let mut item = YtcItem::new(ItemId::HostSystemLog.as_ref());
    for (key, source) in [(child::MESSAGES, MESSAGES), (child::SYSLOG, SYSLOG)] {
        let source = Path::new(source);
        match ctx.probe.check_readable(source) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => {
                let (desc, _) = access::path_err_desc_and_tips(ctx.probe.as_ref(), source, &err);
                item = item.with_child(YtcItem::new(key).fail(err, desc));
            }
            Ok(()) => {
                let copied = copy_log(ctx, source, &host_dir.join(key), package, |line| {
                    files::syslog_time(line, year)
                });
                let child = match copied {
                    Ok(details) => YtcItem::new(key).with_details(details),
                    Err(err) => YtcItem::new(key).fail(format!("{err:#}"), i18n::t("common.collect_failed_desc")),
                };
                item = item.with_child(child);
            }
        }
    }
    item
}

/// Directory core files land in, from the kernel `core_pattern`. The flag is
/// set when the pattern is relative and the data directory is assumed.
fn core_dump_dir(probe: &dyn HostProbe, pattern: &str, data: &Path) -> Result<(PathBuf, bool)> {
    let Some(handler) = pattern.strip_prefix('|') else {
        let pattern = Path::new(pattern);
        if pattern.is_absolute() {
            let dir = pattern.parent().unwrap_or(Path::new("/"));
            return Ok((dir.to_path_buf(), false));
        }
        return Ok((data.to_path_buf(), true));
    };
    if handler.contains(ABRT_HOOK) {
        let location = probe
            .read_to_string(Path::new(ABRT_CONF))
            .ok()
            .and_then(|conf| conf_value(&conf, "DumpLocation"))
            .unwrap_or_else(|| ABRT_DEFAULT_DIR.to_string());
        return Ok((PathBuf::from(location), false));
    }
    if handler.contains(SYSTEMD_COREDUMP) {
        return Ok((PathBuf::from(SYSTEMD_COREDUMP_DIR), false));
    }
    Err(eyre!("core pattern {pattern} is not supported"))
}

fn conf_value(conf: &str, key: &str) -> Option<String> {
    conf.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .find(|(name, _)| name.trim() == key)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Core files of `yasdb` written during the collection window.
fn copy_coredumps(ctx: &CollectContext, source: &Path, dest: &Path, package: &Path) -> Result<ItemDetails> {
    let entries = std::fs::read_dir(source).wrap_err_with(|| format!("failed to read {}", source.display()))?;
    let mut collected = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if !path.is_file() || !name.contains("core") {
            continue;
        }
        let in_window = files::modified(&path)
            .map(|time| ctx.param.start <= time && time <= ctx.param.end)
            .unwrap_or(false);
        if !in_window {
            continue;
        }
        let target = dest.join(&name);
        let error = match files::copy_file(&path, &target) {
            Ok(()) => String::new(),
            Err(err) => format!("{err:#}"),
        };
        collected.push(CollectedFile {
            source: path.display().to_string(),
            stored: files::stored_path(package, &target),
            error,
        });
    }
    collected.sort_by(|a, b| a.source.cmp(&b.source));
    Ok(ItemDetails::Files(collected))
}

fn bash_history(
    probe: Arc<dyn HostProbe>,
    owner: &str,
    source: &Path,
    dest: &Path,
    package: &Path,
) -> Result<ItemDetails> {
    let text = if probe.is_root() || probe.current_user() == owner {
        probe
            .read_to_string(source)
            .wrap_err_with(|| format!("failed to read {}", source.display()))?
    } else {
        probe.run("sudo", &["-n", "cat", &source.to_string_lossy()])?
    };
    files::write_file(dest, &text)?;
    Ok(ItemDetails::Path(files::stored_path(package, dest)))
}
