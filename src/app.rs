use crate::args::{
    Args,
    CollectArgs,
    Command,
    ReportArgs,
};
use chrono::Local;
use color_eyre::Result;
use crossterm::style::Stylize;
use eyre::WrapErr as _;
use std::{
    path::PathBuf,
    sync::Arc,
};
use ytc_collector::{
    host::SystemProbe,
    param::{
        check_include,
        ensure_absolute,
        prepare_output,
    },
    yasdb::{
        YasdbClient,
        YasqlClient,
    },
    CollectContext,
    CollectOutcome,
    CollectParam,
    ModuleType,
    Orchestrator,
    PackageGateway,
    TerminalFrontend,
    TimeWindow,
};
use ytc_config::{
    i18n,
    Strategy,
    StrategyOverrides,
};

pub struct App {
    args: Args,
}

impl App {
    pub fn new(args: Args) -> Self {
        Self { args }
    }

    pub async fn run(self) -> Result<()> {
        match self.args.command {
            Command::Collect(args) => collect(args).await,
            Command::Report(args) => report(args),
        }
    }
}

/// Types named by `--type`, plus `extra` whenever paths are included.
fn module_types(args: &CollectArgs) -> Result<Vec<ModuleType>> {
    let mut types = ModuleType::parse_list(&args.types)?;
    if !args.include.is_empty() && !types.contains(&ModuleType::Extra) {
        types.push(ModuleType::Extra);
    }
    Ok(types)
}

#[instrument(skip_all)]
async fn collect(args: CollectArgs) -> Result<()> {
    let begin_time = Local::now();
    let strategy = Strategy::new(
        args.strategy.as_deref(),
        StrategyOverrides {
            output: args.output.clone(),
            language: args.lang,
        },
    )?;
    i18n::init(strategy.language);

    let window = TimeWindow::resolve(&args.window(), &strategy, begin_time)?;
    let types = module_types(&args)?;
    ensure_absolute(&args.include)?;
    ensure_absolute(&args.exclude)?;
    let output = prepare_output(&strategy.output)?;
    check_include(&args.include, &args.exclude, &output)?;

    let param = CollectParam {
        start: window.start,
        end: window.end,
        output,
        yasdb_home: args.yasdb_home,
        yasdb_data: args.yasdb_data,
        yasdb_user: args.yasdb_user,
        yasdb_password: args.yasdb_password,
        include: args.include,
        exclude: args.exclude,
        lang: strategy.language,
        begin_time,
    };
    info!(types = ?types, start = %param.start, end = %param.end, output = %param.output.display(), "collect requested");

    let client = Arc::new(YasqlClient::new(
        param.yasdb_home.clone(),
        param.yasdb_data.clone(),
        param.yasdb_user.clone(),
        param.yasdb_password.clone(),
    ));
    let db_validation = {
        let client = client.clone();
        tokio::task::spawn_blocking(move || client.check_connection().err())
            .await
            .wrap_err("Database connection check stopped unexpectedly")?
    };
    if let Some(err) = &db_validation {
        warn!(kind = ?err.kind, message = %err.message, "database is not reachable");
    }

    let ctx = CollectContext::new(param, strategy, Arc::new(SystemProbe), client)?;
    let frontend = Arc::new(TerminalFrontend::new(args.yes));
    let mut orchestrator = Orchestrator::new(&ctx, &types, frontend);
    match orchestrator.collect(db_validation.as_ref()).await? {
        CollectOutcome::Declined => {
            info!("collection declined by the operator");
            println!("{}", i18n::t("app.declined").yellow());
        }
        CollectOutcome::Completed { package, .. } => {
            print_package(&package, "app.collect_done");
        }
    }
    Ok(())
}

#[instrument(skip_all, fields(package = %args.package.display()))]
fn report(args: ReportArgs) -> Result<()> {
    i18n::init(args.lang.unwrap_or_default());
    let gateway = PackageGateway::open(&args.package);
    let report = gateway
        .load()
        .wrap_err_with(|| format!("Failed to load package {}", args.package.display()))?;
    if args.lang.is_none() {
        i18n::init(report.param.lang);
    }
    gateway.regenerate()?;
    print_package(&gateway.package_dir(), "app.report_done");
    Ok(())
}

fn print_package(package: &std::path::Path, key: &str) {
    let documents: Vec<PathBuf> = ["report.txt", "report.md", "report.html"]
        .into_iter()
        .map(|name| package.join(name))
        .collect();
    println!(
        "{}",
        i18n::t_with(key, &[("Path", &package.display().to_string())]).green().bold()
    );
    for document in documents {
        println!("  {}", document.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;
    use pretty_assertions::assert_eq;

    fn collect_args(extra: &[&str]) -> CollectArgs {
        let mut argv = vec!["ytcctl", "collect", "--yasdb-home", "/home/yashan", "--yasdb-data", "/data/yashan"];
        argv.extend_from_slice(extra);
        match Args::try_parse_from(argv).unwrap().command {
            Command::Collect(args) => args,
            Command::Report(_) => panic!("expected collect"),
        }
    }

    #[test]
    fn include_requests_extra() {
        let args = collect_args(&["--type", "diag", "--include", "/etc/hosts"]);
        assert_eq!(module_types(&args).unwrap(), vec![ModuleType::Diag, ModuleType::Extra]);
    }

    #[test]
    fn extra_is_not_added_twice() {
        let args = collect_args(&["--type", "extra,base", "--include", "/etc/hosts"]);
        let types = module_types(&args).unwrap();
        assert_eq!(types.iter().filter(|module| **module == ModuleType::Extra).count(), 1);
    }

    #[test]
    fn default_types_leave_out_extra() {
        let args = collect_args(&[]);
        assert_eq!(
            module_types(&args).unwrap(),
            vec![ModuleType::Base, ModuleType::Diag, ModuleType::Perf]
        );
    }

    #[test]
    fn report_of_a_missing_package_fails() {
        let dir = temp_dir::TempDir::new().unwrap();
        let args = ReportArgs {
            package: dir.path().join("ytc-20240305103000"),
            lang: None,
        };
        assert!(report(args).is_err());
    }
}
