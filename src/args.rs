use clap::{
    Parser,
    Subcommand,
};
use std::path::PathBuf;
use ytc_collector::WindowArgs;
use ytc_config::Lang;

/// YashanDB trouble-shooting collector
#[derive(Parser, Debug, Clone)]
#[command(author, version = version(), about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Log filter written to `ytcctl.log`, e.g. `debug` or `ytc_collector=trace`.
    /// Falls back to `RUST_LOG`, then to `info`.
    #[clap(long = "log-level", value_name = "FILTER", global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Collects diagnostics and writes a report package.
    Collect(CollectArgs),
    /// Renders the report documents of an existing package again.
    Report(ReportArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct CollectArgs {
    /// Comma separated collection types: base, diag, perf, extra.
    #[clap(long = "type", value_name = "TYPES", default_value = "base,diag,perf")]
    pub types: String,

    /// Window ending now, e.g. `30m`, `12h`, `1d` or `1M`.
    #[clap(long, value_name = "RANGE")]
    pub range: Option<String>,

    /// Window start as `yyyy-MM-dd[-hh[-mm]]`.
    #[clap(long, value_name = "TIME")]
    pub start: Option<String>,

    /// Window end as `yyyy-MM-dd[-hh[-mm]]`.
    #[clap(long, value_name = "TIME")]
    pub end: Option<String>,

    /// Directory the package is written to. Overrides the strategy.
    #[clap(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    #[clap(long = "yasdb-home", env = "YASDB_HOME", value_name = "DIR")]
    pub yasdb_home: PathBuf,

    #[clap(long = "yasdb-data", env = "YASDB_DATA", value_name = "DIR")]
    pub yasdb_data: PathBuf,

    #[clap(long = "yasdb-user", value_name = "USER")]
    pub yasdb_user: Option<String>,

    #[clap(long = "yasdb-password", env = "YASDB_PASSWORD", hide_env_values = true, value_name = "PASSWORD")]
    pub yasdb_password: Option<String>,

    /// Additional absolute path to collect. Requests the `extra` type.
    #[clap(long, value_name = "PATH")]
    pub include: Vec<PathBuf>,

    /// Absolute path left out of the `extra` type.
    #[clap(long, value_name = "PATH")]
    pub exclude: Vec<PathBuf>,

    /// Language of the console output and the report. Overrides the strategy.
    #[clap(long, value_enum, value_name = "LANG")]
    pub lang: Option<Lang>,

    /// Continues without asking when some items cannot be collected.
    #[clap(long, short = 'y', action)]
    pub yes: bool,

    /// Strategy file layered over the defaults and `strategy.yaml`.
    #[clap(long, value_name = "FILE")]
    pub strategy: Option<PathBuf>,
}

impl CollectArgs {
    pub fn window(&self) -> WindowArgs {
        WindowArgs {
            range: self.range.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ReportArgs {
    /// Package directory written by a previous `collect`.
    #[clap(long, value_name = "DIR")]
    pub package: PathBuf,

    #[clap(long, value_enum, value_name = "LANG")]
    pub lang: Option<Lang>,
}

pub fn version() -> String {
    let version = clap::crate_version!();
    let author = clap::crate_authors!();
    let config_dir_path = ytc_config::get_config_dir().display().to_string();
    let data_dir_path = ytc_config::get_data_dir().display().to_string();

    format!(
        "\
{version}

Authors: {author}

Config directory: {config_dir_path}
Data directory: {data_dir_path}"
    )
}
