//! # Result tree
//!
//! `YtcReport` → `YtcModule` (one per requested module) → `YtcItem` (one per
//! scheduled item, optionally with fixed children).

mod details;
mod item;

pub use details::*;
pub use item::*;

use crate::param::{
    CollectParam,
    ModuleType,
};
use chrono::{
    DateTime,
    Local,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YtcModule {
    pub module: ModuleType,
    /// Keyed by item name. Never iterated for display; see `ItemId::of`.
    #[serde(default)]
    pub items: BTreeMap<String, YtcItem>,
}

impl YtcModule {
    pub fn new(module: ModuleType) -> Self {
        Self {
            module,
            items: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, item: YtcItem) {
        self.items.insert(item.name.clone(), item);
    }

    pub fn get(&self, item: ItemId) -> Option<&YtcItem> {
        self.items.get(item.as_ref())
    }
}

/// Shared handle the item tasks of one module write into. Each task owns a
/// distinct key.
#[derive(Clone, Debug)]
pub struct ModuleSink(Arc<Mutex<YtcModule>>);

impl ModuleSink {
    pub fn new(module: ModuleType) -> Self {
        Self(Arc::new(Mutex::new(YtcModule::new(module))))
    }

    fn lock(&self) -> MutexGuard<'_, YtcModule> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn store(&self, item: YtcItem) {
        self.lock().insert(item);
    }

    pub fn snapshot(&self) -> YtcModule {
        self.lock().clone()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YtcReport {
    pub collect_begin_time: DateTime<Local>,
    pub collect_end_time: Option<DateTime<Local>>,
    pub param: CollectParam,
    pub modules: BTreeMap<ModuleType, YtcModule>,
}

impl YtcReport {
    pub fn new(param: CollectParam) -> Self {
        Self {
            collect_begin_time: param.begin_time,
            collect_end_time: None,
            param,
            modules: BTreeMap::new(),
        }
    }

    pub fn module_types(&self) -> Vec<ModuleType> {
        self.modules.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sink_keeps_one_item_per_name() {
        let sink = ModuleSink::new(ModuleType::Base);
        sink.store(YtcItem::new("host_cpu").fail("first", ""));
        sink.store(YtcItem::new("host_cpu").with_details(ItemDetails::Text("ok".into())));
        let module = sink.snapshot();
        assert_eq!(module.items.len(), 1);
        assert!(!module.get(ItemId::HostCpu).unwrap().failed());
    }

    #[test]
    fn details_are_tagged_on_the_wire() {
        let item = YtcItem::new("yasdb_version").with_details(ItemDetails::Text("23.2.1".into()));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["details"]["kind"], "text");
        assert_eq!(json["details"]["data"], "23.2.1");
        let back: YtcItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }
}
