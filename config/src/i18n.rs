//! Flat key → template string tables for operator-facing text.
//!
//! Templates reference data with `{Name}` placeholders. Lookups fall back to
//! English and then to the key itself, so a missing translation never fails.

use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashMap,
    sync::RwLock,
};

const EN: &str = include_str!("locales/en.yaml");
const ZH: &str = include_str!("locales/zh.yaml");

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Lang {
    #[default]
    En,
    Zh,
}

lazy_static::lazy_static! {
    static ref TABLES: HashMap<Lang, HashMap<String, String>> = HashMap::from([
        (Lang::En, load(Lang::En, EN)),
        (Lang::Zh, load(Lang::Zh, ZH)),
    ]);
    static ref CURRENT: RwLock<Lang> = RwLock::new(Lang::default());
}

fn load(lang: Lang, source: &str) -> HashMap<String, String> {
    serde_yml::from_str(source).unwrap_or_else(|err| {
        error!(%lang, %err, "failed to parse locale table");
        HashMap::new()
    })
}

/// Selects the language used by every later lookup.
pub fn init(lang: Lang) {
    if let Ok(mut current) = CURRENT.write() {
        *current = lang;
    }
}

pub fn current() -> Lang {
    CURRENT.read().map(|lang| *lang).unwrap_or_default()
}

pub fn t(key: &str) -> String {
    lookup(current(), key)
}

pub fn t_with(key: &str, data: &[(&str, &str)]) -> String {
    let mut text = t(key);
    for (name, value) in data {
        text = text.replace(&format!("{{{name}}}"), value);
    }
    text
}

fn lookup(lang: Lang, key: &str) -> String {
    [lang, Lang::En]
        .iter()
        .find_map(|lang| TABLES.get(lang).and_then(|table| table.get(key)))
        .cloned()
        .unwrap_or_else(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tables_parse() {
        assert!(!TABLES[&Lang::En].is_empty());
        assert!(!TABLES[&Lang::Zh].is_empty());
    }

    #[test]
    fn every_chinese_key_exists_in_english() {
        let en = &TABLES[&Lang::En];
        let missing: Vec<_> = TABLES[&Lang::Zh].keys().filter(|key| !en.contains_key(*key)).collect();
        assert_eq!(missing, Vec::<&String>::new());
    }

    #[test]
    fn falls_back_to_key() {
        assert_eq!(lookup(Lang::Zh, "no.such.key"), "no.such.key");
    }

    #[test]
    fn fills_placeholders() {
        let text = lookup(Lang::En, "common.file_not_exist_desc").replace("{Path}", "/tmp/x");
        assert!(text.contains("/tmp/x"));
        assert!(!text.contains("{Path}"));
    }
}
