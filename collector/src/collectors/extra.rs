use super::{
    blocking_task,
    files,
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
        CollectedFile,
        ItemDetails,
        ItemId,
        ModuleSink,
        YtcItem,
        YtcModule,
    },
    param::{
        CollectParam,
        ModuleType,
    },
    yasdb::YasdbError,
};
use eyre::{
    eyre,
    Context as _,
    Result,
};
use std::path::{
    Path,
    PathBuf,
};
use ytc_config::i18n;

/// Files and directories named with `--include`.
pub struct ExtraCollector {
    ctx: CollectContext,
    sink: ModuleSink,
    package_dir: PathBuf,
}

impl ExtraCollector {
    pub fn new(ctx: CollectContext) -> Self {
        Self {
            package_dir: ctx.param.package_dir(),
            ctx,
            sink: ModuleSink::new(ModuleType::Extra),
        }
    }
}

impl TypedCollector for ExtraCollector {
    fn module_type(&self) -> ModuleType {
        ModuleType::Extra
    }

    fn check_access(&mut self, _db_validation: Option<&YasdbError>) -> Vec<NoAccess> {
        let probe = self.ctx.probe.as_ref();
        let problems: Vec<(String, String)> = self
            .ctx
            .param
            .include
            .iter()
            .filter_map(|path| {
                let err = probe.check_readable(path).err()?;
                Some(access::path_err_desc_and_tips(probe, path, &err))
            })
            .collect();
        if problems.is_empty() {
            return Vec::new();
        }
        let (descriptions, tips): (Vec<String>, Vec<String>) = problems.into_iter().unzip();
        let mut tips: Vec<String> = tips.into_iter().filter(|tip| !tip.is_empty()).collect();
        tips.dedup();
        vec![NoAccess::force(
            ItemId::ExtraFiles,
            descriptions.join("; "),
            tips.join("; "),
        )]
    }

    fn collect_task(&self, item: ItemId) -> Option<CollectTask> {
        if item != ItemId::ExtraFiles {
            return None;
        }
        let ctx = self.ctx.clone();
        let package = self.package_dir.clone();
        Some(blocking_task(&self.sink, item, move || extra_files(&ctx, &package)))
    }

    fn pre_collect(&mut self, package_dir: &Path) -> Result<()> {
        self.package_dir = package_dir.to_path_buf();
        let dir = package_dir.join(ModuleType::Extra.dir_name());
        std::fs::create_dir_all(&dir).wrap_err_with(|| format!("failed to create {}", dir.display()))
    }

    fn collect_ok(&self) -> YtcModule {
        self.sink.snapshot()
    }
}

/// Target of `source` under `extra/`, mirroring its absolute path.
fn extra_target(package: &Path, source: &Path) -> PathBuf {
    let relative = source.strip_prefix("/").unwrap_or(source);
    package.join(ModuleType::Extra.dir_name()).join(relative)
}

/// Copies one include. The package directory is never copied into itself.
/// A directory counts as collected when at least one entry made it.
fn copy_include(param: &CollectParam, package: &Path, source: &Path, target: &Path) -> Result<()> {
    if !source.is_dir() {
        return files::copy_file(source, target);
    }
    let outcome = files::copy_dir(source, target, &|path| {
        param.is_excluded(path) || path.starts_with(package)
    })?;
    debug!(source = %source.display(), copied = outcome.copied, failed = outcome.failed.len(), "copied include directory");
    if outcome.copied == 0 && !outcome.failed.is_empty() {
        return Err(eyre!(outcome.failed.join("; ")));
    }
    Ok(())
}

fn extra_files(ctx: &CollectContext, package: &Path) -> YtcItem {
    let param = ctx.param.as_ref();
    let collected: Vec<CollectedFile> = param
        .include
        .iter()
        .filter(|source| !param.is_excluded(source))
        .map(|source| {
            let target = extra_target(package, source);
            let error = match copy_include(param, package, source, &target) {
                Ok(()) => String::new(),
                Err(err) => {
                    warn!(source = %source.display(), ?err, "failed to copy include");
                    format!("{err:#}")
                }
            };
            CollectedFile {
                source: source.display().to_string(),
                stored: files::stored_path(package, &target),
                error,
            }
        })
        .collect();
    let item = YtcItem::new(ItemId::ExtraFiles.as_ref());
    if !collected.is_empty() && collected.iter().all(|file| !file.error.is_empty()) {
        return item.fail(
            collected.iter().map(|file| file.error.as_str()).collect::<Vec<_>>().join("; "),
            i18n::t("extra.copy_failed_desc"),
        );
    }
    item.with_details(ItemDetails::Files(collected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::{
        self,
        FakeClient,
        FakeProbe,
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn unreadable_include_is_forced() {
        let dir = temp_dir::TempDir::new().unwrap();
        let mut param = testing::param(dir.path());
        param.include = vec![PathBuf::from("/etc/hosts"), PathBuf::from("/root/secret")];
        let probe = FakeProbe::default()
            .with_file("/etc/hosts", "")
            .with_denied("/root/secret");
        let mut extra = ExtraCollector::new(testing::context(param, probe, FakeClient::default()));
        let no_access = extra.check_access(None);
        assert_eq!(no_access.len(), 1);
        assert!(no_access[0].force_collect);
        assert!(no_access[0].description.contains("/root/secret"));
        assert_eq!(extra.items_to_collect(&no_access), vec![ItemId::ExtraFiles]);
    }

    #[tokio::test]
    async fn copies_includes_minus_excludes() {
        let dir = temp_dir::TempDir::new().unwrap();
        let source = dir.path().join("conf");
        std::fs::create_dir_all(source.join("private")).unwrap();
        std::fs::write(source.join("app.toml"), "a").unwrap();
        std::fs::write(source.join("private").join("key"), "k").unwrap();
        let mut param = testing::param(dir.path());
        param.include = vec![source.clone()];
        param.exclude = vec![source.join("private")];
        let mut extra = ExtraCollector::new(testing::context(param, FakeProbe::default(), FakeClient::default()));
        let package = dir.path().join("ytc-test");
        extra.pre_collect(&package).unwrap();
        let mut tasks = extra.collect_funcs(&[ItemId::ExtraFiles]);
        tasks.remove(&ItemId::ExtraFiles).unwrap().await.unwrap();

        let target = extra_target(&package, &source);
        assert!(target.join("app.toml").is_file());
        assert!(!target.join("private").exists());
        let module = extra.collect_ok();
        let Some(ItemDetails::Files(files)) = &module.get(ItemId::ExtraFiles).unwrap().details else {
            panic!("expected files");
        };
        assert_eq!(files.len(), 1);
        assert!(files[0].stored.starts_with("extra/"));
    }

    #[tokio::test]
    async fn include_holding_the_package_skips_it() {
        let dir = temp_dir::TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::write(root.join("notes.txt"), "n").unwrap();
        let mut param = testing::param(&root.join("out"));
        param.include = vec![root.clone()];
        let mut extra = ExtraCollector::new(testing::context(param, FakeProbe::default(), FakeClient::default()));
        let package = root.join("out").join("ytc-test");
        extra.pre_collect(&package).unwrap();
        let mut tasks = extra.collect_funcs(&[ItemId::ExtraFiles]);
        tasks.remove(&ItemId::ExtraFiles).unwrap().await.unwrap();

        let target = extra_target(&package, &root);
        assert!(target.join("notes.txt").is_file());
        assert!(!target.join("out").join("ytc-test").exists());
    }
}
