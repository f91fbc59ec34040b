use crate::{
    access::NoAccess,
    collectors::{
        new_collectors,
        CollectContext,
        CollectTask,
        TypedCollector,
    },
    data::{
        ItemId,
        YtcReport,
    },
    error::CollectError,
    package::PackageGateway,
    param::{
        CollectParam,
        ModuleType,
    },
    yasdb::YasdbError,
};
use chrono::Local;
use futures::{
    future::join_all,
    stream::{
        FuturesUnordered,
        StreamExt as _,
    },
};
use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::Arc,
};

/// Phases of one collection run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum OrchestratorState {
    Init,
    AccessChecked,
    ItemsResolved,
    PreCollected,
    Running,
    Completed,
    Declined,
    AbortedNoItems,
    AbortedPreCollect,
}

/// Operator-facing side of a run: confirmation and progress.
pub trait CollectFrontend: Send + Sync {
    /// Shows the inaccessible items. `false` stops the run before anything is collected.
    fn confirm_no_access(&self, no_access: &[NoAccess]) -> bool;

    fn items_resolved(&self, items: &BTreeMap<ModuleType, Vec<ItemId>>);

    fn bar_started(&self, module: ModuleType, items: &[ItemId]);

    /// Called in completion order. `error` is the first error of the item.
    fn item_finished(&self, module: ModuleType, item: ItemId, error: Option<&str>);

    fn bar_finished(&self, module: ModuleType);
}

#[derive(Debug)]
pub enum CollectOutcome {
    /// The operator declined to continue without the inaccessible items.
    Declined,
    Completed { report: YtcReport, package: PathBuf },
}

/// Drives the typed collectors of a run through access checks, collection
/// and packaging.
pub struct Orchestrator {
    param: CollectParam,
    collectors: Vec<Box<dyn TypedCollector>>,
    frontend: Arc<dyn CollectFrontend>,
    gateway: PackageGateway,
    state: OrchestratorState,
}

impl Orchestrator {
    pub fn new(ctx: &CollectContext, types: &[ModuleType], frontend: Arc<dyn CollectFrontend>) -> Self {
        Self::with_collectors(ctx.param.as_ref().clone(), new_collectors(types, ctx), frontend)
    }

    pub fn with_collectors(
        param: CollectParam,
        mut collectors: Vec<Box<dyn TypedCollector>>,
        frontend: Arc<dyn CollectFrontend>,
    ) -> Self {
        collectors.sort_by_key(|collector| collector.module_type());
        Self {
            gateway: PackageGateway::new(&param),
            param,
            collectors,
            frontend,
            state: OrchestratorState::Init,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn package_dir(&self) -> PathBuf {
        self.gateway.package_dir()
    }

    fn module_types(&self) -> Vec<ModuleType> {
        self.collectors.iter().map(|collector| collector.module_type()).collect()
    }

    /// Runs the whole pipeline. `db_validation` is the outcome of the single
    /// connection check made before the run.
    #[instrument(skip_all, fields(package = %self.gateway.package_dir().display()))]
    pub async fn collect(&mut self, db_validation: Option<&YasdbError>) -> Result<CollectOutcome, CollectError> {
        let mut report = YtcReport::new(self.param.clone());

        let no_access: Vec<NoAccess> = self
            .collectors
            .iter_mut()
            .flat_map(|collector| collector.check_access(db_validation))
            .collect();
        self.state = OrchestratorState::AccessChecked;
        info!(count = no_access.len(), "access checked");
        if !no_access.is_empty() && !self.frontend.confirm_no_access(&no_access) {
            info!("collection declined by operator");
            self.state = OrchestratorState::Declined;
            return Ok(CollectOutcome::Declined);
        }

        let items: BTreeMap<ModuleType, Vec<ItemId>> = self
            .collectors
            .iter()
            .map(|collector| (collector.module_type(), collector.items_to_collect(&no_access)))
            .collect();
        self.state = OrchestratorState::ItemsResolved;
        self.frontend.items_resolved(&items);
        if items.values().all(Vec::is_empty) {
            warn!("nothing left to collect after access checks");
            self.state = OrchestratorState::AbortedNoItems;
            return Err(CollectError::NoneCollectItem);
        }

        let package_dir = self.gateway.package_dir();
        for collector in self.collectors.iter_mut() {
            if let Err(reason) = collector.pre_collect(&package_dir) {
                let module = collector.module_type();
                error!(%module, ?reason, "pre-collect failed");
                if package_dir.exists() {
                    if let Err(err) = std::fs::remove_dir_all(&package_dir) {
                        warn!(%err, "failed to remove partial package");
                    }
                }
                self.state = OrchestratorState::AbortedPreCollect;
                return Err(CollectError::PreCollect { module, reason });
            }
        }
        self.state = OrchestratorState::PreCollected;

        self.state = OrchestratorState::Running;
        let bars: Vec<(ModuleType, BTreeMap<ItemId, CollectTask>)> = self
            .collectors
            .iter()
            .filter_map(|collector| {
                let module = collector.module_type();
                let module_items = items.get(&module).filter(|items| !items.is_empty())?;
                Some((module, collector.collect_funcs(module_items)))
            })
            .collect();
        for (module, tasks) in &bars {
            self.frontend.bar_started(*module, &tasks.keys().copied().collect::<Vec<_>>());
        }
        let frontend = self.frontend.clone();
        join_all(bars.into_iter().map(|(module, tasks)| run_bar(frontend.clone(), module, tasks))).await;

        report.collect_end_time = Some(Local::now());
        for collector in &self.collectors {
            report.modules.insert(collector.module_type(), collector.collect_ok());
        }
        let package = self.gateway.gen_result(&report, &self.module_types())?;
        self.state = OrchestratorState::Completed;
        info!(package = %package.display(), "collection completed");
        Ok(CollectOutcome::Completed { report, package })
    }
}

/// Runs every task of one module concurrently and waits for all of them.
/// A failed task never cancels its siblings.
async fn run_bar(frontend: Arc<dyn CollectFrontend>, module: ModuleType, tasks: BTreeMap<ItemId, CollectTask>) {
    let mut running: FuturesUnordered<_> = tasks
        .into_iter()
        .map(|(item, task)| async move { (item, task.await) })
        .collect();
    while let Some((item, outcome)) = running.next().await {
        match &outcome {
            Ok(()) => {
                debug!(%module, %item, "item collected");
                frontend.item_finished(module, item, None);
            }
            Err(err) => {
                warn!(%module, %item, %err, "item failed");
                frontend.item_finished(module, item, Some(&err.to_string()));
            }
        }
    }
    frontend.bar_finished(module);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collectors::{
            testing::{
                self,
                FakeClient,
                FakeProbe,
            },
            DiagCollector,
        },
        data::{
            ItemDetails,
            ModuleSink,
            YtcItem,
            YtcModule,
        },
    };
    use pretty_assertions::assert_eq;
    use std::{
        path::Path,
        sync::Mutex,
    };

    #[derive(Default)]
    struct RecordingFrontend {
        decline: bool,
        events: Mutex<Vec<String>>,
    }

    impl RecordingFrontend {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl CollectFrontend for RecordingFrontend {
        fn confirm_no_access(&self, no_access: &[NoAccess]) -> bool {
            self.push(format!("confirm {}", no_access.len()));
            !self.decline
        }

        fn items_resolved(&self, items: &BTreeMap<ModuleType, Vec<ItemId>>) {
            self.push(format!("resolved {}", items.values().map(Vec::len).sum::<usize>()));
        }

        fn bar_started(&self, module: ModuleType, _items: &[ItemId]) {
            self.push(format!("start {module}"));
        }

        fn item_finished(&self, _module: ModuleType, item: ItemId, error: Option<&str>) {
            self.push(format!("{item} {}", error.unwrap_or("ok")));
        }

        fn bar_finished(&self, module: ModuleType) {
            self.push(format!("finish {module}"));
        }
    }

    /// Collector whose items complete with canned results.
    struct StubCollector {
        module: ModuleType,
        items: Vec<ItemId>,
        no_access: Vec<NoAccess>,
        failing: Vec<ItemId>,
        fail_pre_collect: bool,
        sink: ModuleSink,
    }

    impl StubCollector {
        fn new(module: ModuleType, items: &[ItemId]) -> Self {
            Self {
                module,
                items: items.to_vec(),
                no_access: Vec::new(),
                failing: Vec::new(),
                fail_pre_collect: false,
                sink: ModuleSink::new(module),
            }
        }
    }

    impl TypedCollector for StubCollector {
        fn module_type(&self) -> ModuleType {
            self.module
        }

        fn check_access(&mut self, _db_validation: Option<&YasdbError>) -> Vec<NoAccess> {
            self.no_access.clone()
        }

        fn items_to_collect(&self, no_access: &[NoAccess]) -> Vec<ItemId> {
            self.items
                .iter()
                .copied()
                .filter(|item| !crate::access::is_skipped(no_access, *item))
                .collect()
        }

        fn collect_task(&self, item: ItemId) -> Option<CollectTask> {
            if item.module() != self.module {
                return None;
            }
            let fail = self.failing.contains(&item);
            Some(crate::collectors::blocking_task(&self.sink, item, move || {
                let result = YtcItem::new(item.as_ref());
                if fail {
                    return result.fail("boom", "stub failure");
                }
                let details = match item {
                    ItemId::YasdbVersion => ItemDetails::Text("23.2.1.100".to_string()),
                    item => ItemDetails::Path(format!("diagnosis/{item}.log")),
                };
                result.with_details(details)
            }))
        }

        fn pre_collect(&mut self, package_dir: &Path) -> eyre::Result<()> {
            if self.fail_pre_collect {
                eyre::bail!("disk full");
            }
            std::fs::create_dir_all(package_dir.join(self.module.dir_name()))?;
            Ok(())
        }

        fn collect_ok(&self) -> YtcModule {
            self.sink.snapshot()
        }
    }

    const DIAG_LOGS: [ItemId; 3] = [ItemId::YasdbRunLog, ItemId::YasdbAlertLog, ItemId::HostKernelLog];

    fn base() -> StubCollector {
        StubCollector::new(ModuleType::Base, &[ItemId::YasdbVersion])
    }

    fn skip_all(module: ModuleType) -> Vec<NoAccess> {
        ItemId::of(module)
            .into_iter()
            .map(|item| NoAccess::skip(item, "no permission", ""))
            .collect()
    }

    fn orchestrator(
        dir: &Path,
        collectors: Vec<Box<dyn TypedCollector>>,
        frontend: Arc<RecordingFrontend>,
    ) -> Orchestrator {
        ytc_config::i18n::init(ytc_config::Lang::En);
        Orchestrator::with_collectors(testing::param(dir), collectors, frontend)
    }

    #[tokio::test]
    async fn failures_are_isolated_and_bars_run_in_module_order() {
        let dir = temp_dir::TempDir::new().unwrap();
        let mut diag = StubCollector::new(ModuleType::Diag, &DIAG_LOGS);
        diag.failing = vec![ItemId::YasdbRunLog];
        let frontend = Arc::new(RecordingFrontend::default());
        let mut orchestrator = orchestrator(
            dir.path(),
            vec![Box::new(diag), Box::new(base())],
            frontend.clone(),
        );
        let CollectOutcome::Completed { report, package } = orchestrator.collect(None).await.unwrap() else {
            panic!("expected a completed run");
        };
        assert_eq!(orchestrator.state(), OrchestratorState::Completed);
        assert!(package.join("report.html").is_file());

        let diag = &report.modules[&ModuleType::Diag];
        assert_eq!(diag.items.len(), 3);
        assert!(diag.get(ItemId::YasdbRunLog).unwrap().failed());
        assert!(!diag.get(ItemId::YasdbAlertLog).unwrap().failed());

        let events = frontend.events();
        let starts: Vec<&String> = events.iter().filter(|event| event.starts_with("start")).collect();
        assert_eq!(starts, vec!["start base", "start diag"]);
        assert!(events.contains(&"yasdb_run_log boom".to_string()));
    }

    #[tokio::test]
    async fn declined_confirmation_stops_cleanly() {
        let dir = temp_dir::TempDir::new().unwrap();
        let mut base = base();
        base.no_access = vec![NoAccess::skip(ItemId::HostFirewalld, "needs root", "")];
        let frontend = Arc::new(RecordingFrontend {
            decline: true,
            ..Default::default()
        });
        let mut orchestrator = orchestrator(dir.path(), vec![Box::new(base)], frontend.clone());
        assert!(matches!(orchestrator.collect(None).await.unwrap(), CollectOutcome::Declined));
        assert_eq!(orchestrator.state(), OrchestratorState::Declined);
        assert!(!orchestrator.package_dir().exists());
        assert_eq!(frontend.events(), vec!["confirm 1"]);
    }

    #[tokio::test]
    async fn nothing_collectible_writes_nothing() {
        let dir = temp_dir::TempDir::new().unwrap();
        let mut base = StubCollector::new(ModuleType::Base, &ItemId::of(ModuleType::Base));
        base.no_access = skip_all(ModuleType::Base);
        let mut perf = StubCollector::new(ModuleType::Perf, &ItemId::of(ModuleType::Perf));
        perf.no_access = skip_all(ModuleType::Perf);
        let frontend = Arc::new(RecordingFrontend::default());
        let mut orchestrator = orchestrator(dir.path(), vec![Box::new(base), Box::new(perf)], frontend);
        let err = orchestrator.collect(None).await.unwrap_err();
        assert!(matches!(err, CollectError::NoneCollectItem));
        assert_eq!(err.to_string(), "no collectible item");
        assert_eq!(orchestrator.state(), OrchestratorState::AbortedNoItems);
        assert!(!orchestrator.package_dir().exists());
    }

    #[tokio::test]
    async fn pre_collect_failure_aborts_without_package() {
        let dir = temp_dir::TempDir::new().unwrap();
        let mut perf = StubCollector::new(ModuleType::Perf, &[ItemId::YasdbSlowSql]);
        perf.fail_pre_collect = true;
        let frontend = Arc::new(RecordingFrontend::default());
        let mut orchestrator = orchestrator(
            dir.path(),
            vec![Box::new(base()), Box::new(perf)],
            frontend.clone(),
        );
        let err = orchestrator.collect(None).await.unwrap_err();
        assert!(matches!(err, CollectError::PreCollect { module: ModuleType::Perf, .. }));
        assert_eq!(orchestrator.state(), OrchestratorState::AbortedPreCollect);
        assert!(!orchestrator.package_dir().exists());
        assert!(!frontend.events().iter().any(|event| event.starts_with("start")));
    }

    #[tokio::test]
    async fn denied_adr_is_left_out_and_kernel_log_reported() {
        let dir = temp_dir::TempDir::new().unwrap();
        let data = dir.path().join("data");
        let mut param = testing::param(dir.path());
        param.yasdb_data = data.clone();
        let probe = FakeProbe::default()
            .with_denied(data.join("diag"))
            .with_file(data.join("log").join("run").join("run.log"), "")
            .with_file(data.join("log").join("alert").join("alert.log"), "")
            .with_file("/var/log/messages", "")
            .with_file("/proc/sys/kernel/core_pattern", "/var/core/core.%p\n")
            .with_file("/var/core/core.1", "")
            .with_output("dmesg -T", "[Tue Mar  5 10:00:00 2024] eth0: link up\n");
        let ctx = testing::context(param.clone(), probe, FakeClient::default());
        let frontend = Arc::new(RecordingFrontend::default());
        let mut orchestrator = Orchestrator::with_collectors(
            param,
            vec![
                Box::new(base()),
                Box::new(DiagCollector::new(ctx)),
            ],
            frontend.clone(),
        );
        let CollectOutcome::Completed { report, package } = orchestrator.collect(None).await.unwrap() else {
            panic!("expected a completed run");
        };
        let diag = &report.modules[&ModuleType::Diag];
        assert!(diag.get(ItemId::YasdbAdr).is_none());
        assert!(!diag.get(ItemId::HostKernelLog).unwrap().failed());

        let text = std::fs::read_to_string(package.join("report.txt")).unwrap();
        assert!(text.contains(&ItemId::HostKernelLog.display_name()), "{text}");
        assert!(!text.contains(&ItemId::YasdbAwr.display_name()));
        assert!(!text.contains(&ItemId::YasdbAdr.display_name()));
    }
}
