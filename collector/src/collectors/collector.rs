use crate::{
    access::NoAccess,
    data::{
        ItemId,
        ModuleSink,
        YtcItem,
        YtcModule,
    },
    deadline::Deadline,
    host::HostProbe,
    param::{
        CollectParam,
        ModuleType,
    },
    workload::SarRunner,
    yasdb::{
        YasdbClient,
        YasdbError,
    },
};
use eyre::{
    eyre,
    Result,
};
use std::{
    collections::BTreeMap,
    future::Future,
    path::Path,
    pin::Pin,
    sync::Arc,
    time::Duration,
};
use ytc_config::{
    i18n,
    Strategy,
};

/// One scheduled item. Resolves once the item has been stored in its module.
pub type CollectTask = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// Collaborators shared by every typed collector of a run.
#[derive(Clone)]
pub struct CollectContext {
    pub param: Arc<CollectParam>,
    pub strategy: Arc<Strategy>,
    pub probe: Arc<dyn HostProbe>,
    pub client: Arc<dyn YasdbClient>,
    pub awr_timeout: Duration,
    pub sample_interval: Duration,
}

impl CollectContext {
    pub fn new(
        param: CollectParam,
        strategy: Strategy,
        probe: Arc<dyn HostProbe>,
        client: Arc<dyn YasdbClient>,
    ) -> Result<Self> {
        Ok(Self {
            awr_timeout: strategy.awr_timeout()?,
            sample_interval: strategy.sample_interval()?,
            param: Arc::new(param),
            strategy: Arc::new(strategy),
            probe,
            client,
        })
    }

    /// `sar` when the host has it installed.
    pub fn sar(&self) -> Option<SarRunner> {
        self.probe.which(SarRunner::BIN).map(SarRunner::new)
    }
}

/// Capabilities every module collector offers to the orchestrator.
pub trait TypedCollector: Send {
    fn module_type(&self) -> ModuleType;

    /// Probes every item of the module. `db_validation` is the outcome of the
    /// one connection check made before any collector runs.
    fn check_access(&mut self, db_validation: Option<&YasdbError>) -> Vec<NoAccess>;

    /// Every item of the module minus the ones that are inaccessible and not forced.
    fn items_to_collect(&self, no_access: &[NoAccess]) -> Vec<ItemId> {
        ItemId::of(self.module_type())
            .into_iter()
            .filter(|item| !crate::access::is_skipped(no_access, *item))
            .collect()
    }

    /// Task for `item`, `None` when the item does not belong to this module.
    fn collect_task(&self, item: ItemId) -> Option<CollectTask>;

    fn collect_funcs(&self, items: &[ItemId]) -> BTreeMap<ItemId, CollectTask> {
        let mut tasks = BTreeMap::new();
        for item in items {
            match self.collect_task(*item) {
                Some(task) => {
                    tasks.insert(*item, task);
                }
                None => warn!(module = %self.module_type(), %item, "no collect function for item, dropped"),
            }
        }
        tasks
    }

    /// Runs once before any item of the module, e.g. to create directories.
    fn pre_collect(&mut self, package_dir: &Path) -> Result<()>;

    /// Result of the module. Only called after all of its tasks finished.
    fn collect_ok(&self) -> YtcModule;
}

/// Runs `job` on the blocking pool and stores exactly one item for `item`,
/// even when the job panics.
pub(crate) fn blocking_task<F>(sink: &ModuleSink, item: ItemId, job: F) -> CollectTask
where
    F: FnOnce() -> YtcItem + Send + 'static,
{
    timed_task(sink, item, None, move |_| job())
}

/// Like `blocking_task`, but the item fails once `limit` passes. The job is
/// handed the matching `Deadline` and must not touch the package after it.
pub(crate) fn timed_task<F>(sink: &ModuleSink, item: ItemId, limit: Option<Duration>, job: F) -> CollectTask
where
    F: FnOnce(Deadline) -> YtcItem + Send + 'static,
{
    let sink = sink.clone();
    Box::pin(async move {
        let deadline = Deadline::from_limit(limit);
        let handle = tokio::task::spawn_blocking(move || job(deadline));
        let joined = match limit {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    let limit = humantime::format_duration(limit).to_string();
                    warn!(%item, %limit, "collect task timed out");
                    Ok(YtcItem::new(item.as_ref()).fail(
                        format!("timed out after {limit}"),
                        i18n::t_with("common.timeout_desc", &[("Timeout", &limit)]),
                    ))
                }
            },
            None => handle.await,
        };
        let mut result = joined.unwrap_or_else(|err| {
            error!(%item, %err, "collect task aborted");
            YtcItem::new(item.as_ref()).fail(format!("collect task aborted: {err}"), i18n::t("common.task_aborted_desc"))
        });
        // The key in the module is the item id whatever name the job used.
        result.name = item.as_ref().to_string();
        let outcome = match result.first_error() {
            Some(err) => Err(eyre!(err)),
            None => Ok(()),
        };
        sink.store(result);
        outcome
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ItemDetails;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn stores_successful_item() {
        let sink = ModuleSink::new(ModuleType::Base);
        let task = blocking_task(&sink, ItemId::YasdbVersion, || {
            YtcItem::new("yasdb_version").with_details(ItemDetails::Text("23.2".into()))
        });
        task.await.unwrap();
        let module = sink.snapshot();
        assert_eq!(
            module.get(ItemId::YasdbVersion).unwrap().details,
            Some(ItemDetails::Text("23.2".into()))
        );
    }

    #[tokio::test]
    async fn failed_item_is_stored_and_reported() {
        let sink = ModuleSink::new(ModuleType::Base);
        let task = blocking_task(&sink, ItemId::HostCpu, || {
            YtcItem::new("host_cpu").fail("boom", "cpu unavailable")
        });
        assert_eq!(task.await.unwrap_err().to_string(), "boom");
        assert!(sink.snapshot().get(ItemId::HostCpu).unwrap().failed());
    }

    #[tokio::test]
    async fn panicking_job_still_records_item() {
        let sink = ModuleSink::new(ModuleType::Diag);
        let task = blocking_task(&sink, ItemId::YasdbAdr, || panic!("lost"));
        assert!(task.await.is_err());
        let module = sink.snapshot();
        assert!(module.get(ItemId::YasdbAdr).unwrap().error.starts_with("collect task aborted"));
    }

    #[tokio::test]
    async fn slow_job_times_out() {
        let sink = ModuleSink::new(ModuleType::Perf);
        let task = timed_task(&sink, ItemId::YasdbAwr, Some(Duration::from_millis(10)), |_| {
            std::thread::sleep(Duration::from_millis(500));
            YtcItem::new("yasdb_awr")
        });
        let err = task.await.unwrap_err();
        assert!(err.to_string().starts_with("timed out after"), "{err}");
        assert!(sink.snapshot().get(ItemId::YasdbAwr).unwrap().failed());
    }

    #[tokio::test]
    async fn timed_out_job_writes_nothing_afterwards() {
        let dir = temp_dir::TempDir::new().unwrap();
        let dest = dir.path().join("awr.html");
        let sink = ModuleSink::new(ModuleType::Perf);
        let target = dest.clone();
        let task = timed_task(&sink, ItemId::YasdbAwr, Some(Duration::from_millis(20)), move |deadline| {
            std::thread::sleep(Duration::from_millis(300));
            if !deadline.expired() {
                std::fs::write(&target, "late").unwrap();
            }
            YtcItem::new("yasdb_awr")
        });
        assert!(task.await.is_err());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!dest.exists());
        assert!(sink.snapshot().get(ItemId::YasdbAwr).unwrap().failed());
    }
}
