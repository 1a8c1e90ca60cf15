use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use tempfile::NamedTempFile;

/// Advisory lock on the sidecar `{path}.lock`, released on drop.
///
/// The sidecar is locked rather than `path` itself because writes replace
/// `path` by rename.
pub(crate) struct PathLock {
    file: File,
}

impl PathLock {
    pub(crate) fn exclusive(path: &Path) -> io::Result<Self> {
        let file = open_lock_file(path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }

    pub(crate) fn shared(path: &Path) -> io::Result<Self> {
        let file = open_lock_file(path)?;
        FileExt::lock_shared(&file)?;
        Ok(Self { file })
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub(crate) fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    let lock_path = lock_path(path);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;
    restrict_permissions(&lock_path, 0o600)?;
    Ok(file)
}

/// Replaces `path` with `contents` via a temp file in the same directory, mode 0600.
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    restrict_permissions(tmp.path(), 0o600)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Creates `path` (and parents) and restricts it to the owner.
pub(crate) fn create_private_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)?;
    restrict_permissions(path, 0o700)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_private_replaces_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("value.secret");
        write_private(&path, b"first").expect("write");
        write_private(&path, b"second").expect("overwrite");
        assert_eq!(fs::read(&path).expect("read"), b"second");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.path() != path)
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind");
    }

    #[cfg(unix)]
    #[test]
    fn private_files_and_dirs_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        create_private_dir(&nested).expect("create");
        let mode = fs::metadata(&nested).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o700);

        let path = nested.join("x.secret");
        write_private(&path, b"v").expect("write");
        let mode = fs::metadata(&path).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn lock_lives_beside_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("svc_name.secret");
        {
            let _exclusive = PathLock::exclusive(&path).expect("lock");
            assert!(lock_path(&path).exists());
        }
        let _first = PathLock::shared(&path).expect("shared");
        let _second = PathLock::shared(&path).expect("shared again");
        assert_eq!(
            lock_path(&path).file_name().and_then(|n| n.to_str()),
            Some("svc_name.secret.lock")
        );
    }
}
