use super::OsId;
use crate::data::ProcessInfo;
use eyre::{
    eyre,
    Context as _,
    Result,
};
use std::{
    fs::File,
    io,
    os::unix::fs::MetadataExt,
    path::{
        Path,
        PathBuf,
    },
    process::Command,
};
use users::os::unix::UserExt as _;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SudoAccess {
    NoPassword,
    NeedPassword,
    Denied,
}

/// Read-only view of the host used by the access checks and some collectors.
pub trait HostProbe: Send + Sync {
    /// Fails with `NotFound` or `PermissionDenied` when `path` cannot be read.
    fn check_readable(&self, path: &Path) -> io::Result<()>;

    fn which(&self, command: &str) -> Option<PathBuf>;

    fn os_id(&self) -> OsId;

    fn is_root(&self) -> bool;

    fn sudo(&self) -> SudoAccess;

    fn current_user(&self) -> String;

    fn file_owner(&self, path: &Path) -> Option<String>;

    fn home_dir(&self, user: &str) -> Option<PathBuf>;

    /// Reads a text file. Invalid UTF-8 is replaced, not rejected.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn yasdb_processes(&self, data: &Path) -> Vec<ProcessInfo>;

    /// Runs `program` with `LC_ALL=C` and returns its stdout.
    fn run(&self, program: &str, args: &[&str]) -> Result<String>;
}

/// The probe backed by the real system.
#[derive(Clone, Debug, Default)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn check_readable(&self, path: &Path) -> io::Result<()> {
        if path.metadata()?.is_dir() {
            std::fs::read_dir(path).map(|_| ())
        } else {
            File::open(path).map(|_| ())
        }
    }

    fn which(&self, command: &str) -> Option<PathBuf> {
        which::which(command).ok()
    }

    fn os_id(&self) -> OsId {
        OsId::from_id(&sysinfo::System::distribution_id())
    }

    fn is_root(&self) -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    fn sudo(&self) -> SudoAccess {
        if self.is_root() {
            return SudoAccess::NoPassword;
        }
        match Command::new("sudo").args(["-n", "true"]).output() {
            Ok(output) if output.status.success() => SudoAccess::NoPassword,
            Ok(output) if String::from_utf8_lossy(&output.stderr).contains("password is required") => {
                SudoAccess::NeedPassword
            }
            _ => SudoAccess::Denied,
        }
    }

    fn current_user(&self) -> String {
        users::get_current_username()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| users::get_current_uid().to_string())
    }

    fn file_owner(&self, path: &Path) -> Option<String> {
        let uid = path.metadata().ok()?.uid();
        users::get_user_by_uid(uid).map(|user| user.name().to_string_lossy().to_string())
    }

    fn home_dir(&self, user: &str) -> Option<PathBuf> {
        users::get_user_by_name(user).map(|user| user.home_dir().to_path_buf())
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read(path).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    fn yasdb_processes(&self, data: &Path) -> Vec<ProcessInfo> {
        super::yasdb_processes(data)
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        debug!(program, ?args, "running command");
        let output = Command::new(program)
            .args(args)
            .env("LC_ALL", "C")
            .output()
            .wrap_err_with(|| format!("{program}: command not found"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let message = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(eyre!("{program} exited with {}: {}", output.status, message.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_path_is_not_found() {
        let err = SystemProbe.check_readable(Path::new("/definitely/not/here")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn log_with_invalid_utf8_is_still_read() {
        let dir = temp_dir::TempDir::new().unwrap();
        let file = dir.path().join("messages");
        let mut bytes = b"Mar  5 10:30:00 db01 kernel: first\n".to_vec();
        bytes.extend_from_slice(b"Mar  5 10:31:00 db01 app: \xff\xfe\n");
        bytes.extend_from_slice(b"Mar  5 10:32:00 db01 kernel: last\n");
        std::fs::write(&file, bytes).unwrap();

        let text = SystemProbe.read_to_string(&file).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Mar  5 10:30:00 db01 kernel: first");
        assert!(lines[1].starts_with("Mar  5 10:31:00 db01 app: "));
        assert!(lines[1].contains('\u{FFFD}'));
        assert_eq!(lines[2], "Mar  5 10:32:00 db01 kernel: last");
    }

    #[test]
    fn readable_dir_and_file() {
        let dir = temp_dir::TempDir::new().unwrap();
        let file = dir.path().join("run.log");
        std::fs::write(&file, "ok").unwrap();
        SystemProbe.check_readable(dir.path()).unwrap();
        SystemProbe.check_readable(&file).unwrap();
    }

    #[test]
    fn failing_command_reports_status() {
        let err = SystemProbe.run("false", &[]).unwrap_err();
        assert!(err.to_string().starts_with("false exited with"));
    }
}
