//! Executable lookup on a `PATH`-style search list

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Find `name` in the directories of `search_path`
///
/// Names containing a path separator are checked directly. On Unix a match
/// must carry at least one execute bit.
pub fn find_executable(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    if name.contains('/') {
        let candidate = PathBuf::from(name);
        return is_executable(&candidate).then_some(candidate);
    }

    let search_path = search_path?;
    std::env::split_paths(search_path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// Find `name` on the current process `PATH`
pub fn which(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH");
    find_executable(name, path.as_deref())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_find_in_search_path() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        make_executable(&second.path().join("squeue"));
        fs::write(first.path().join("squeue"), "not executable").unwrap();

        let search = std::env::join_paths([first.path(), second.path()]).unwrap();
        let found = find_executable("squeue", Some(&search));

        assert_eq!(found, Some(second.path().join("squeue")));
        assert_eq!(find_executable("sbatch", Some(&search)), None);
    }

    #[test]
    fn test_missing_search_path() {
        assert_eq!(find_executable("squeue", None), None);
        assert_eq!(find_executable("", Some(&OsString::from("/bin"))), None);
    }
}
