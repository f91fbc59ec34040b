use crate::{
    data::ItemId,
    host::{
        HostProbe,
        OsId,
        SudoAccess,
    },
    workload::SarRunner,
    yasdb::{
        YasErrorKind,
        YasdbError,
    },
};
use serde::Serialize;
use std::{
    io,
    path::Path,
};
use ytc_config::i18n;

/// An item that cannot be collected as-is.
///
/// With `force_collect` set the collector still runs the item against a
/// fallback source, otherwise the item is skipped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NoAccess {
    pub item: ItemId,
    pub description: String,
    pub tips: String,
    pub force_collect: bool,
}

impl NoAccess {
    pub fn skip(item: ItemId, description: impl Into<String>, tips: impl Into<String>) -> Self {
        Self {
            item,
            description: description.into(),
            tips: tips.into(),
            force_collect: false,
        }
    }

    pub fn force(item: ItemId, description: impl Into<String>, tips: impl Into<String>) -> Self {
        Self {
            force_collect: true,
            ..Self::skip(item, description, tips)
        }
    }
}

/// `true` when `item` was checked and must not run.
pub fn is_skipped(no_access: &[NoAccess], item: ItemId) -> bool {
    no_access.iter().any(|entry| entry.item == item && !entry.force_collect)
}

/// Tip matching what the current user could do to gain access.
pub fn privilege_tips(probe: &dyn HostProbe) -> String {
    match probe.sudo() {
        SudoAccess::Denied => i18n::t("common.run_with_root_tips"),
        SudoAccess::NoPassword | SudoAccess::NeedPassword => i18n::t("common.run_with_sudo_tips"),
    }
}

pub fn path_err_desc_and_tips(probe: &dyn HostProbe, path: &Path, err: &io::Error) -> (String, String) {
    let path = path.display().to_string();
    match err.kind() {
        io::ErrorKind::NotFound => (
            i18n::t_with("common.file_not_exist_desc", &[("Path", &path)]),
            i18n::t_with("common.file_not_exist_tips", &[("Path", &path)]),
        ),
        io::ErrorKind::PermissionDenied => (
            i18n::t_with(
                "common.permission_denied_desc",
                &[("User", &probe.current_user()), ("Path", &path)],
            ),
            privilege_tips(probe),
        ),
        _ => (
            i18n::t_with("common.path_error_desc", &[("Path", &path), ("Error", &err.to_string())]),
            String::new(),
        ),
    }
}

pub fn yas_err_desc_and_tips(err: &YasdbError) -> (String, String) {
    let key = match err.kind {
        YasErrorKind::MissingCredentials => "missing_credentials",
        YasErrorKind::NotOpen => "not_open",
        YasErrorKind::InvalidCredentials => "invalid_credentials",
        YasErrorKind::LackLogin => "lack_login",
        YasErrorKind::LackPrivilege => "lack_privilege",
        YasErrorKind::ObjectMissing => "object_missing",
        YasErrorKind::ConnectFailed => "connect_failed",
        YasErrorKind::Other => "other",
    };
    (
        i18n::t_with(&format!("yasdb.{key}_desc"), &[("Error", &err.message)]),
        i18n::t(&format!("yasdb.{key}_tips")),
    )
}

/// Description of a failed workload child. A missing `sar` names the install command.
pub fn workload_desc(err: &str, os: &OsId) -> String {
    if err.contains("command not found") {
        return i18n::t_with(
            "common.no_sar_desc",
            &[("Command", os.install_sysstat_command())],
        );
    }
    i18n::t_with("common.workload_failed_desc", &[("Error", err)])
}

/// Access result shared by the four workload items.
pub fn check_sar(probe: &dyn HostProbe, item: ItemId) -> Option<NoAccess> {
    if probe.which(SarRunner::BIN).is_some() {
        return None;
    }
    Some(NoAccess::force(
        item,
        i18n::t("common.no_sar_check_desc"),
        i18n::t_with(
            "common.install_sysstat_tips",
            &[("Command", probe.os_id().install_sysstat_command())],
        ),
    ))
}
