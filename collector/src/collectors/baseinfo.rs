use super::{
    blocking_task,
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
        DataType,
        ItemDetails,
        ItemId,
        ModuleSink,
        YtcItem,
        YtcModule,
    },
    host::{
        self,
        OsId,
    },
    param::ModuleType,
    workload::{
        Sampler,
        SarRunner,
        Series,
        WorkloadData,
        SAR_NOT_FOUND,
    },
    yasdb::YasdbError,
};
use eyre::{
    Context as _,
    Result,
};
use std::{
    collections::BTreeMap,
    path::{
        Path,
        PathBuf,
    },
};
use ytc_config::{
    i18n,
    Strategy,
};

/// Database version and parameters, host facts and host workload.
pub struct BaseCollector {
    ctx: CollectContext,
    sink: ModuleSink,
    module_dir: PathBuf,
    /// Why `v$parameter` cannot be queried; only `yasdb.ini` is read then.
    parameter_skip: Option<String>,
}

impl BaseCollector {
    pub fn new(ctx: CollectContext) -> Self {
        let module_dir = ctx.param.package_dir().join(ModuleType::Base.dir_name());
        Self {
            ctx,
            sink: ModuleSink::new(ModuleType::Base),
            module_dir,
            parameter_skip: None,
        }
    }

    fn ini_path(&self) -> PathBuf {
        yasdb_ini(&self.ctx.param.yasdb_data)
    }

    fn check_yasdb_version(&self) -> Option<NoAccess> {
        let bin = self.ctx.param.yasdb_bin("yasdb");
        let err = self.ctx.probe.check_readable(&bin).err()?;
        let (desc, tips) = access::path_err_desc_and_tips(self.ctx.probe.as_ref(), &bin, &err);
        Some(NoAccess::skip(ItemId::YasdbVersion, desc, tips))
    }

    fn check_yasdb_parameter(&mut self, db_validation: Option<&YasdbError>) -> Option<NoAccess> {
        let probe = self.ctx.probe.as_ref();
        let yasql = self.ctx.param.yasdb_bin("yasql");
        let (desc, tips) = match (probe.check_readable(&yasql), db_validation) {
            (Err(err), _) => access::path_err_desc_and_tips(probe, &yasql, &err),
            (Ok(()), Some(err)) => access::yas_err_desc_and_tips(err),
            (Ok(()), None) => return None,
        };
        self.parameter_skip = Some(desc.clone());
        let ini = self.ini_path();
        match probe.check_readable(&ini) {
            Ok(()) => Some(NoAccess::force(
                ItemId::YasdbParameter,
                desc,
                i18n::t_with("base.ini_only_tips", &[("Path", &ini.display().to_string())]),
            )),
            Err(_) => Some(NoAccess::skip(ItemId::YasdbParameter, desc, tips)),
        }
    }

    fn check_firewalld(&self) -> Option<NoAccess> {
        let probe = self.ctx.probe.as_ref();
        if probe.os_id() != OsId::Ubuntu || probe.is_root() {
            return None;
        }
        Some(NoAccess::skip(
            ItemId::HostFirewalld,
            i18n::t("base.ufw_need_root_desc"),
            access::privilege_tips(probe),
        ))
    }

    fn job(&self, item: ItemId) -> Option<Box<dyn FnOnce() -> YtcItem + Send>> {
        let ctx = self.ctx.clone();
        let job: Box<dyn FnOnce() -> YtcItem + Send> = match item {
            ItemId::YasdbVersion => Box::new(move || yasdb_version(&ctx)),
            ItemId::YasdbParameter => {
                let skip = self.parameter_skip.clone();
                Box::new(move || yasdb_parameter(&ctx, skip))
            }
            ItemId::HostOsInfo => Box::new(|| detail(ItemId::HostOsInfo, Ok(ItemDetails::OsInfo(host::os_info())))),
            ItemId::HostFirewalld => Box::new(move || {
                detail(
                    ItemId::HostFirewalld,
                    host::firewall(ctx.probe.as_ref()).map(ItemDetails::Firewall),
                )
            }),
            ItemId::HostCpu => Box::new(|| detail(ItemId::HostCpu, Ok(ItemDetails::Cpu(host::cpu_summary())))),
            ItemId::HostDisk => Box::new(|| detail(ItemId::HostDisk, Ok(ItemDetails::Disks(host::disks())))),
            ItemId::HostNetwork => Box::new(move || {
                let addresses = ctx.probe.run("ip", &["-o", "addr", "show"]).unwrap_or_else(|err| {
                    warn!(%err, "failed to list interface addresses");
                    String::new()
                });
                detail(ItemId::HostNetwork, Ok(ItemDetails::Networks(host::networks(&addresses))))
            }),
            ItemId::HostMemory => Box::new(|| detail(ItemId::HostMemory, host::memory().map(ItemDetails::Memory))),
            ItemId::HostNetworkIo => Box::new(move || workload(&ctx, Workload::Network)),
            ItemId::HostCpuUsage => Box::new(move || workload(&ctx, Workload::Cpu)),
            ItemId::HostDiskIo => Box::new(move || workload(&ctx, Workload::Disk)),
            ItemId::HostMemoryUsage => Box::new(move || workload(&ctx, Workload::Memory)),
            _ => return None,
        };
        Some(job)
    }
}

impl TypedCollector for BaseCollector {
    fn module_type(&self) -> ModuleType {
        ModuleType::Base
    }

    fn check_access(&mut self, db_validation: Option<&YasdbError>) -> Vec<NoAccess> {
        let probe = self.ctx.probe.clone();
        let mut no_access: Vec<NoAccess> = [
            self.check_yasdb_version(),
            self.check_yasdb_parameter(db_validation),
            self.check_firewalld(),
        ]
        .into_iter()
        .flatten()
        .collect();
        no_access.extend(
            ItemId::of(ModuleType::Base)
                .into_iter()
                .filter(|item| item.is_workload())
                .filter_map(|item| access::check_sar(probe.as_ref(), item)),
        );
        no_access
    }

    fn collect_task(&self, item: ItemId) -> Option<CollectTask> {
        let job = self.job(item)?;
        Some(blocking_task(&self.sink, item, job))
    }

    fn pre_collect(&mut self, package_dir: &Path) -> Result<()> {
        self.module_dir = package_dir.join(ModuleType::Base.dir_name());
        std::fs::create_dir_all(&self.module_dir)
            .wrap_err_with(|| format!("failed to create {}", self.module_dir.display()))
    }

    fn collect_ok(&self) -> YtcModule {
        self.sink.snapshot()
    }
}

pub(crate) fn yasdb_ini(data: &Path) -> PathBuf {
    data.join("config").join("yasdb.ini")
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

fn yasdb_version(ctx: &CollectContext) -> YtcItem {
    let bin = ctx.param.yasdb_bin("yasdb");
    let version = ctx
        .probe
        .run(&bin.to_string_lossy(), &["-V"])
        .map(|output| ItemDetails::Text(output.trim().to_string()));
    detail(ItemId::YasdbVersion, version)
}

fn yasdb_parameter(ctx: &CollectContext, skip: Option<String>) -> YtcItem {
    let ini = yasdb_ini(&ctx.param.yasdb_data);
    let ini_child = match ctx.probe.read_to_string(&ini) {
        Ok(text) => YtcItem::new(child::YASDB_INI).with_details(ItemDetails::IniParameters(parse_ini(&text))),
        Err(err) => {
            let (desc, _) = access::path_err_desc_and_tips(ctx.probe.as_ref(), &ini, &err);
            YtcItem::new(child::YASDB_INI).fail(err, desc)
        }
    };
    let view_child = match skip {
        Some(reason) => YtcItem::new(child::V_PARAMETER).fail(reason, i18n::t("base.v_parameter_skipped_desc")),
        None => match ctx.client.parameters() {
            Ok(parameters) => YtcItem::new(child::V_PARAMETER).with_details(ItemDetails::Parameters(parameters)),
            Err(err) => {
                let (desc, _) = access::yas_err_desc_and_tips(&err);
                YtcItem::new(child::V_PARAMETER).fail(err, desc)
            }
        },
    };
    YtcItem::new(ItemId::YasdbParameter.as_ref())
        .with_child(ini_child)
        .with_child(view_child)
}

/// `KEY = VALUE` lines of `yasdb.ini`. Comments and section headers are skipped.
pub(crate) fn parse_ini(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('['))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

#[derive(Clone, Copy, Debug)]
enum Workload {
    Cpu,
    Memory,
    Network,
    Disk,
}

impl Workload {
    fn item(self) -> ItemId {
        match self {
            Workload::Cpu => ItemId::HostCpuUsage,
            Workload::Memory => ItemId::HostMemoryUsage,
            Workload::Network => ItemId::HostNetworkIo,
            Workload::Disk => ItemId::HostDiskIo,
        }
    }

    fn history(self, ctx: &CollectContext, sar: &SarRunner) -> Result<WorkloadData> {
        let (start, end) = (ctx.param.start, ctx.param.end);
        Ok(match self {
            Workload::Cpu => WorkloadData::SarCpu(sar.history(start, end)?),
            Workload::Memory => WorkloadData::SarMemory(sar.history(start, end)?),
            Workload::Network => WorkloadData::SarNetwork(keep_networks(&ctx.strategy, sar.history(start, end)?)),
            Workload::Disk => WorkloadData::SarDisk(sar.history(start, end)?),
        })
    }

    fn current(self, ctx: &CollectContext, sar: &SarRunner) -> Result<WorkloadData> {
        let (interval, count) = (ctx.sample_interval, ctx.strategy.sample_count);
        Ok(match self {
            Workload::Cpu => WorkloadData::SarCpu(sar.current(interval, count)?),
            Workload::Memory => WorkloadData::SarMemory(sar.current(interval, count)?),
            Workload::Network => {
                WorkloadData::SarNetwork(keep_networks(&ctx.strategy, sar.current(interval, count)?))
            }
            Workload::Disk => WorkloadData::SarDisk(sar.current(interval, count)?),
        })
    }

    fn sampled(self, ctx: &CollectContext) -> Result<WorkloadData> {
        let sampler = Sampler::new(ctx.sample_interval, ctx.strategy.sample_count);
        Ok(match self {
            Workload::Cpu => WorkloadData::SampledCpu(sampler.cpu()?),
            Workload::Memory => WorkloadData::SampledMemory(sampler.memory()?),
            Workload::Network => WorkloadData::SampledNetwork(keep_networks(&ctx.strategy, sampler.network()?)),
            Workload::Disk => WorkloadData::SampledDisk(sampler.disk()?),
        })
    }
}

fn keep_networks<T>(strategy: &Strategy, mut series: Series<T>) -> Series<T> {
    for samples in series.values_mut() {
        samples.retain(|name, _| !strategy.is_discard_network(name));
    }
    series
}

fn workload_child(
    ctx: &CollectContext,
    key: &str,
    data_type: DataType,
    data: Result<WorkloadData>,
) -> YtcItem {
    let child = YtcItem::new(key).with_data_type(data_type);
    match data {
        Ok(data) => child.with_details(ItemDetails::Workload(data)),
        Err(err) => {
            let err = format!("{err:#}");
            warn!(child = key, %err, "workload collection failed");
            let desc = access::workload_desc(&err, &ctx.probe.os_id());
            child.fail(err, desc)
        }
    }
}

/// History always needs `sar`; current data falls back to sampling `/proc`.
fn workload(ctx: &CollectContext, kind: Workload) -> YtcItem {
    let (history, current) = match ctx.sar() {
        Some(sar) => (
            workload_child(ctx, child::HISTORY, DataType::Sar, kind.history(ctx, &sar)),
            workload_child(ctx, child::CURRENT, DataType::Sar, kind.current(ctx, &sar)),
        ),
        None => (
            workload_child(ctx, child::HISTORY, DataType::Sar, Err(eyre::eyre!(SAR_NOT_FOUND))),
            workload_child(ctx, child::CURRENT, DataType::Sampled, kind.sampled(ctx)),
        ),
    };
    YtcItem::new(kind.item().as_ref())
        .with_child(history)
        .with_child(current)
}
