use super::{
    blocking_task,
    files,
    timed_task,
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
        ItemDetails,
        ItemId,
        ModuleSink,
        YtcItem,
        YtcModule,
    },
    deadline::Deadline,
    param::ModuleType,
    yasdb::{
        Snapshot,
        YasdbError,
    },
};
use eyre::{
    Context as _,
    Result,
};
use std::path::{
    Path,
    PathBuf,
};
use ytc_config::i18n;

const SYS_USER: &str = "sys";
const SLOW_PARAMETER_MARK: &str = "SLOW";

/// AWR report and slow SQL.
pub struct PerfCollector {
    ctx: CollectContext,
    sink: ModuleSink,
    package_dir: PathBuf,
    /// First and last snapshot of the window.
    snapshots: Option<(Snapshot, Snapshot)>,
    /// Why the slow log tables cannot be queried.
    slow_db_skip: Option<String>,
}

impl PerfCollector {
    pub fn new(ctx: CollectContext) -> Self {
        Self {
            package_dir: ctx.param.package_dir(),
            ctx,
            sink: ModuleSink::new(ModuleType::Perf),
            snapshots: None,
            slow_db_skip: None,
        }
    }

    fn slow_log(&self) -> PathBuf {
        self.ctx.param.yasdb_data.join("log").join("slow").join("slow.log")
    }

    fn module_dir(&self) -> PathBuf {
        self.package_dir.join(ModuleType::Perf.dir_name())
    }

    fn check_awr(&mut self, db_validation: Option<&YasdbError>) -> Option<NoAccess> {
        let item = ItemId::YasdbAwr;
        if let Some(err) = db_validation {
            let (desc, tips) = access::yas_err_desc_and_tips(err);
            return Some(NoAccess::skip(item, desc, tips));
        }
        let user = self.ctx.param.yasdb_user.clone().unwrap_or_default();
        if !user.eq_ignore_ascii_case(SYS_USER) {
            return Some(NoAccess::skip(
                item,
                i18n::t_with("perf.awr_need_sys_desc", &[("User", &user)]),
                i18n::t("perf.awr_need_sys_tips"),
            ));
        }
        let client = self.ctx.client.clone();
        let database = match client.database() {
            Ok(database) => database,
            Err(err) => {
                let (desc, tips) = access::yas_err_desc_and_tips(&err);
                return Some(NoAccess::skip(item, desc, tips));
            }
        };
        if !database.is_read_write() {
            return Some(NoAccess::skip(
                item,
                i18n::t_with("perf.database_not_read_write_desc", &[("Mode", &database.open_mode)]),
                i18n::t("perf.database_not_read_write_tips"),
            ));
        }
        let mut snapshots = match client.snapshots(self.ctx.param.start, self.ctx.param.end) {
            Ok(snapshots) => snapshots,
            Err(err) => {
                let (desc, tips) = access::yas_err_desc_and_tips(&err);
                return Some(NoAccess::skip(item, desc, tips));
            }
        };
        if snapshots.len() < 2 {
            return Some(NoAccess::skip(
                item,
                i18n::t_with("perf.awr_no_snapshot_desc", &[("Count", &snapshots.len().to_string())]),
                i18n::t("perf.awr_no_snapshot_tips"),
            ));
        }
        let last = snapshots.swap_remove(snapshots.len() - 1);
        let first = snapshots.swap_remove(0);
        self.snapshots = Some((first, last));
        let timeout = humantime::format_duration(self.ctx.awr_timeout).to_string();
        Some(NoAccess::force(
            item,
            i18n::t_with("perf.awr_timeout_desc", &[("Timeout", &timeout)]),
            i18n::t("perf.awr_timeout_tips"),
        ))
    }

    fn check_slow_sql(&mut self, db_validation: Option<&YasdbError>) -> Option<NoAccess> {
        let item = ItemId::YasdbSlowSql;
        let probe = self.ctx.probe.clone();
        let slow_log = self.slow_log();
        let file_err = probe.check_readable(&slow_log).err();
        let Some(db_err) = db_validation else {
            let err = file_err?;
            let (desc, tips) = access::path_err_desc_and_tips(probe.as_ref(), &slow_log, &err);
            return Some(NoAccess::force(item, desc, tips));
        };
        let (desc, tips) = access::yas_err_desc_and_tips(db_err);
        self.slow_db_skip = Some(desc.clone());
        match file_err {
            None => Some(NoAccess::force(
                item,
                desc,
                i18n::t_with("perf.slow_file_only_tips", &[("Path", &slow_log.display().to_string())]),
            )),
            Some(_) => Some(NoAccess::skip(item, desc, tips)),
        }
    }
}

impl TypedCollector for PerfCollector {
    fn module_type(&self) -> ModuleType {
        ModuleType::Perf
    }

    fn check_access(&mut self, db_validation: Option<&YasdbError>) -> Vec<NoAccess> {
        [self.check_awr(db_validation), self.check_slow_sql(db_validation)]
            .into_iter()
            .flatten()
            .collect()
    }

    fn collect_task(&self, item: ItemId) -> Option<CollectTask> {
        let ctx = self.ctx.clone();
        let package = self.package_dir.clone();
        let module_dir = self.module_dir();
        match item {
            ItemId::YasdbAwr => {
                let snapshots = self.snapshots.clone();
                Some(timed_task(&self.sink, item, Some(self.ctx.awr_timeout), move |deadline| {
                    awr(&ctx, snapshots, &module_dir.join("awr.html"), &package, deadline)
                }))
            }
            ItemId::YasdbSlowSql => {
                let skip = self.slow_db_skip.clone();
                let slow_log = self.slow_log();
                Some(blocking_task(&self.sink, item, move || {
                    slow_sql(&ctx, skip, &slow_log, &module_dir.join("slow.log"), &package)
                }))
            }
            _ => None,
        }
    }

    fn pre_collect(&mut self, package_dir: &Path) -> Result<()> {
        self.package_dir = package_dir.to_path_buf();
        let dir = self.module_dir();
        std::fs::create_dir_all(&dir).wrap_err_with(|| format!("failed to create {}", dir.display()))
    }

    fn collect_ok(&self) -> YtcModule {
        self.sink.snapshot()
    }
}

/// One bounded attempt. Nothing is written once `deadline` has passed.
fn awr(
    ctx: &CollectContext,
    snapshots: Option<(Snapshot, Snapshot)>,
    dest: &Path,
    package: &Path,
    deadline: Deadline,
) -> YtcItem {
    let item = YtcItem::new(ItemId::YasdbAwr.as_ref());
    let Some((first, last)) = snapshots else {
        return item.fail("no snapshot pair in the collection window", i18n::t("perf.awr_no_snapshot_tips"));
    };
    info!(begin = first.snap_id, end = last.snap_id, "generating awr report");
    let html = match ctx.client.awr_report(&first, &last, deadline) {
        Ok(html) => html,
        Err(err) => {
            let (desc, _) = access::yas_err_desc_and_tips(&err);
            return item.fail(err, desc);
        }
    };
    if deadline.expired() {
        warn!(dest = %dest.display(), "awr report arrived after the deadline, discarded");
        return item.fail("awr report arrived after the deadline", i18n::t("common.collect_failed_desc"));
    }
    match files::write_file(dest, &html) {
        Ok(()) => item.with_details(ItemDetails::Path(files::stored_path(package, dest))),
        Err(err) => item.fail(format!("{err:#}"), i18n::t("common.collect_failed_desc")),
    }
}

fn slow_sql(ctx: &CollectContext, skip: Option<String>, source: &Path, dest: &Path, package: &Path) -> YtcItem {
    let (parameter, table) = match skip {
        Some(reason) => {
            let desc = i18n::t("perf.slow_db_skipped_desc");
            (
                YtcItem::new(child::SLOW_PARAMETER).fail(&reason, desc.clone()),
                YtcItem::new(child::SLOW_LOGS_IN_TABLE).fail(&reason, desc),
            )
        }
        None => {
            let parameter = match ctx.client.parameters() {
                Ok(parameters) => YtcItem::new(child::SLOW_PARAMETER).with_details(ItemDetails::Parameters(
                    parameters
                        .into_iter()
                        .filter(|parameter| parameter.name.contains(SLOW_PARAMETER_MARK))
                        .collect(),
                )),
                Err(err) => yas_child(child::SLOW_PARAMETER, err),
            };
            let table = match ctx.client.slow_logs(ctx.param.start, ctx.param.end) {
                Ok(logs) => YtcItem::new(child::SLOW_LOGS_IN_TABLE).with_details(ItemDetails::SlowLogs(logs)),
                Err(err) => yas_child(child::SLOW_LOGS_IN_TABLE, err),
            };
            (parameter, table)
        }
    };
    let file = match ctx.probe.check_readable(source) {
        Ok(()) => match files::copy_file(source, dest) {
            Ok(()) => YtcItem::new(child::SLOW_LOGS_IN_FILE)
                .with_details(ItemDetails::Path(files::stored_path(package, dest))),
            Err(err) => {
                YtcItem::new(child::SLOW_LOGS_IN_FILE).fail(format!("{err:#}"), i18n::t("common.collect_failed_desc"))
            }
        },
        Err(err) => {
            let (desc, _) = access::path_err_desc_and_tips(ctx.probe.as_ref(), source, &err);
            YtcItem::new(child::SLOW_LOGS_IN_FILE).fail(err, desc)
        }
    };
    YtcItem::new(ItemId::YasdbSlowSql.as_ref())
        .with_child(parameter)
        .with_child(table)
        .with_child(file)
}

fn yas_child(key: &str, err: YasdbError) -> YtcItem {
    let (desc, _) = access::yas_err_desc_and_tips(&err);
    YtcItem::new(key).fail(err, desc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collectors::testing::{
            self,
            FakeClient,
            FakeProbe,
            DATA,
        },
        yasdb::{
            SlowLog,
            VDatabase,
            VParameter,
            YasErrorKind,
        },
    };
    use pretty_assertions::assert_eq;
    use std::{
        collections::BTreeMap,
        time::Duration,
    };

    fn snapshot(snap_id: u64) -> Snapshot {
        Snapshot {
            snap_id,
            ..Default::default()
        }
    }

    fn open_client() -> FakeClient {
        FakeClient {
            database: VDatabase {
                open_mode: "READ_WRITE".to_string(),
                ..Default::default()
            },
            snapshots: vec![snapshot(7), snapshot(8), snapshot(9)],
            awr: "<html>awr</html>".to_string(),
            ..Default::default()
        }
    }

    fn collector(client: FakeClient, dir: &Path) -> PerfCollector {
        let probe = FakeProbe::default().with_file(format!("{DATA}/log/slow/slow.log"), "");
        PerfCollector::new(testing::context(testing::param(dir), probe, client))
    }

    #[test]
    fn awr_is_forced_with_timeout_tip() {
        let dir = temp_dir::TempDir::new().unwrap();
        let mut perf = collector(open_client(), dir.path());
        let no_access = perf.check_access(None);
        assert_eq!(no_access.len(), 1);
        assert!(no_access[0].force_collect);
        assert!(no_access[0].description.contains("5m"), "{}", no_access[0].description);
        let (first, last) = perf.snapshots.clone().unwrap();
        assert_eq!((first.snap_id, last.snap_id), (7, 9));
    }

    #[test]
    fn awr_requires_sys_and_snapshots() {
        let dir = temp_dir::TempDir::new().unwrap();
        let mut param = testing::param(dir.path());
        param.yasdb_user = Some("scott".to_string());
        let ctx = testing::context(param, FakeProbe::default(), open_client());
        let mut perf = PerfCollector::new(ctx);
        assert!(!perf.check_awr(None).unwrap().force_collect);

        let client = FakeClient {
            snapshots: vec![snapshot(1)],
            ..open_client()
        };
        let mut perf = collector(client, dir.path());
        assert!(!perf.check_awr(None).unwrap().force_collect);

        let client = FakeClient {
            database: VDatabase::default(),
            ..open_client()
        };
        let mut perf = collector(client, dir.path());
        assert!(!perf.check_awr(None).unwrap().force_collect);
    }

    #[test]
    fn unreachable_db_keeps_slow_log_file() {
        let dir = temp_dir::TempDir::new().unwrap();
        let mut perf = collector(FakeClient::down(YasErrorKind::NotOpen, "database not open"), dir.path());
        let err = YasdbError::new(YasErrorKind::NotOpen, "database not open");
        let no_access = perf.check_access(Some(&err));
        assert_eq!(perf.items_to_collect(&no_access), vec![ItemId::YasdbSlowSql]);
    }

    #[tokio::test]
    async fn awr_report_is_written() {
        let dir = temp_dir::TempDir::new().unwrap();
        let mut perf = collector(open_client(), dir.path());
        perf.check_access(None);
        let package = dir.path().join("ytc-test");
        perf.pre_collect(&package).unwrap();
        let mut tasks = perf.collect_funcs(&[ItemId::YasdbAwr]);
        tasks.remove(&ItemId::YasdbAwr).unwrap().await.unwrap();
        assert_eq!(
            std::fs::read_to_string(package.join("performance/awr.html")).unwrap(),
            "<html>awr</html>"
        );
    }

    #[tokio::test]
    async fn slow_awr_fails_the_item_only() {
        let dir = temp_dir::TempDir::new().unwrap();
        let client = FakeClient {
            awr_delay: Some(Duration::from_millis(300)),
            ..open_client()
        };
        let mut param = testing::param(dir.path());
        param.yasdb_user = Some("SYS".to_string());
        let mut ctx = testing::context(param, FakeProbe::default(), client);
        ctx.awr_timeout = Duration::from_millis(20);
        let mut perf = PerfCollector::new(ctx);
        perf.check_access(None);
        let mut tasks = perf.collect_funcs(&[ItemId::YasdbAwr]);
        assert!(tasks.remove(&ItemId::YasdbAwr).unwrap().await.is_err());
        let module = perf.collect_ok();
        assert!(module.get(ItemId::YasdbAwr).unwrap().error.starts_with("timed out"));
    }

    #[tokio::test]
    async fn late_awr_report_is_not_written() {
        let dir = temp_dir::TempDir::new().unwrap();
        let client = FakeClient {
            awr_delay: Some(Duration::from_millis(300)),
            ..open_client()
        };
        let mut ctx = testing::context(testing::param(dir.path()), FakeProbe::default(), client);
        ctx.awr_timeout = Duration::from_millis(20);
        let mut perf = PerfCollector::new(ctx);
        perf.check_access(None);
        let package = dir.path().join("ytc-test");
        perf.pre_collect(&package).unwrap();
        let mut tasks = perf.collect_funcs(&[ItemId::YasdbAwr]);
        assert!(tasks.remove(&ItemId::YasdbAwr).unwrap().await.is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!package.join("performance/awr.html").exists());
        assert!(perf.collect_ok().get(ItemId::YasdbAwr).unwrap().error.starts_with("timed out"));
    }

    #[tokio::test]
    async fn slow_sql_children() {
        let dir = temp_dir::TempDir::new().unwrap();
        let client = FakeClient {
            parameters: BTreeMap::from([
                ("SLOW_LOG_TIME_THRESHOLD".to_string(), "1000".to_string()),
                ("LISTEN_ADDR".to_string(), "0.0.0.0:1688".to_string()),
            ]),
            slow_logs: vec![SlowLog {
                sql_text: "select 1".to_string(),
                ..Default::default()
            }],
            ..open_client()
        };
        let perf = collector(client, dir.path());
        let mut tasks = perf.collect_funcs(&[ItemId::YasdbSlowSql]);
        // The fake slow.log is not on disk, so the file child fails.
        assert!(tasks.remove(&ItemId::YasdbSlowSql).unwrap().await.is_err());
        let module = perf.collect_ok();
        let item = module.get(ItemId::YasdbSlowSql).unwrap();
        assert_eq!(
            item.child(child::SLOW_PARAMETER).unwrap().details,
            Some(ItemDetails::Parameters(vec![VParameter {
                name: "SLOW_LOG_TIME_THRESHOLD".to_string(),
                value: "1000".to_string(),
            }]))
        );
        assert!(matches!(
            item.child(child::SLOW_LOGS_IN_TABLE).unwrap().details,
            Some(ItemDetails::SlowLogs(ref rows)) if rows.len() == 1
        ));
        assert!(item.child(child::SLOW_LOGS_IN_FILE).unwrap().failed());
    }
}
