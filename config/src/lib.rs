#[macro_use]
extern crate tracing;

mod app_config;
pub mod i18n;
mod strategy;

pub use app_config::{
    get_config_dir,
    get_data_dir,
};
pub use i18n::Lang;
pub use strategy::{
    parse_range,
    Strategy,
    StrategyOverrides,
};
