use crate::{
    data::ItemDetails,
    param::ModuleType,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;
use ytc_config::i18n;

/// Every collectible item. Declaration order is the display order inside each module.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemId {
    YasdbVersion,
    YasdbParameter,
    HostOsInfo,
    HostFirewalld,
    HostCpu,
    HostDisk,
    HostNetwork,
    HostMemory,
    HostNetworkIo,
    HostCpuUsage,
    HostDiskIo,
    HostMemoryUsage,

    YasdbAdr,
    YasdbRunLog,
    YasdbAlertLog,
    YasdbProcessStatus,
    YasdbInstanceStatus,
    YasdbDatabaseStatus,
    HostSystemLog,
    HostKernelLog,
    YasdbCoredump,
    HostBashHistory,

    YasdbAwr,
    YasdbSlowSql,

    ExtraFiles,
}

impl ItemId {
    pub fn module(self) -> ModuleType {
        use ItemId::*;
        match self {
            YasdbVersion | YasdbParameter | HostOsInfo | HostFirewalld | HostCpu | HostDisk | HostNetwork
            | HostMemory | HostNetworkIo | HostCpuUsage | HostDiskIo | HostMemoryUsage => ModuleType::Base,
            YasdbAdr | YasdbRunLog | YasdbAlertLog | YasdbProcessStatus | YasdbInstanceStatus
            | YasdbDatabaseStatus | HostSystemLog | HostKernelLog | YasdbCoredump | HostBashHistory => {
                ModuleType::Diag
            }
            YasdbAwr | YasdbSlowSql => ModuleType::Perf,
            ExtraFiles => ModuleType::Extra,
        }
    }

    /// Items of `module` in declared order.
    pub fn of(module: ModuleType) -> Vec<ItemId> {
        ItemId::iter().filter(|item| item.module() == module).collect()
    }

    pub fn is_workload(self) -> bool {
        matches!(
            self,
            ItemId::HostNetworkIo | ItemId::HostCpuUsage | ItemId::HostDiskIo | ItemId::HostMemoryUsage
        )
    }

    pub fn display_name(self) -> String {
        i18n::t(&format!("item.{self}"))
    }
}

/// Keys of the fixed sub-items.
pub mod child {
    pub const HISTORY: &str = "history";
    pub const CURRENT: &str = "current";
    pub const YASDB_INI: &str = "yasdb.ini";
    pub const V_PARAMETER: &str = "v$parameter";
    pub const MESSAGES: &str = "messages";
    pub const SYSLOG: &str = "syslog";
    pub const SLOW_PARAMETER: &str = "slow_parameter";
    pub const SLOW_LOGS_IN_TABLE: &str = "slow_logs_in_table";
    pub const SLOW_LOGS_IN_FILE: &str = "slow_logs_in_file";

    pub fn display_name(key: &str) -> String {
        ytc_config::i18n::t(&format!("child.{key}"))
    }
}

/// Which probe produced a workload series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataType {
    Sar,
    Sampled,
}

/// A node of the result tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct YtcItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ItemDetails>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, YtcItem>,
}

impl YtcItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_details(mut self, details: ItemDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn with_child(mut self, child: YtcItem) -> Self {
        self.children.insert(child.name.clone(), child);
        self
    }

    /// Marks the item failed. Any payload is dropped so renderers cannot consume it.
    pub fn fail(mut self, error: impl ToString, description: impl Into<String>) -> Self {
        self.details = None;
        self.error = error.to_string();
        self.description = description.into();
        self
    }

    pub fn failed(&self) -> bool {
        !self.error.is_empty()
    }

    /// First error of the item itself or, failing that, of its children.
    pub fn first_error(&self) -> Option<String> {
        if self.failed() {
            return Some(self.error.clone());
        }
        self.children
            .values()
            .find_map(|child| child.first_error().map(|err| format!("{}: {err}", child.name)))
    }

    pub fn child(&self, key: &str) -> Option<&YtcItem> {
        self.children.get(key)
    }
}
