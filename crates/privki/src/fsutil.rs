//! Filesystem helpers that set permissions explicitly instead of trusting the umask.

use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use privki_core::{PkiError, Result};
use tempfile::NamedTempFile;

/// Mode for ordinary repository directories.
pub const DIR_MODE: u32 = 0o755;

/// Mode for `private/` directories.
pub const PRIVATE_DIR_MODE: u32 = 0o700;

/// Mode for state files and public material.
pub const FILE_MODE: u32 = 0o644;

/// Mode for private keys.
pub const KEY_MODE: u32 = 0o400;

/// Create `path` and any missing parents, then force `mode` on `path` itself.
pub fn create_dir_all(path: &Path, mode: u32) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(path)
        .map_err(|e| PkiError::io(path, e))?;
    set_mode(path, mode)
}

/// Set the permission bits of `path`.
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, Permissions::from_mode(mode)).map_err(|e| PkiError::io(path, e))
}

/// Permission bits of `path`.
pub fn mode_of(path: &Path) -> Result<u32> {
    let meta = fs::metadata(path).map_err(|e| PkiError::io(path, e))?;
    Ok(meta.permissions().mode() & 0o7777)
}

/// Write `contents` through a sibling temp file renamed over `path`.
///
/// The temp file is removed if any step fails.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| PkiError::io(path, std::io::Error::other("path has no parent")))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PkiError::io(dir, e))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| PkiError::io(tmp.path(), e))?;
    fs::set_permissions(tmp.path(), Permissions::from_mode(mode))
        .map_err(|e| PkiError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| PkiError::io(path, e.error))?;
    Ok(())
}

/// Create a fresh file with `mode`, replacing any existing one.
pub fn write_with_mode(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(PkiError::io(path, e)),
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(path)
        .map_err(|e| PkiError::io(path, e))?;
    file.write_all(contents).map_err(|e| PkiError::io(path, e))?;
    set_mode(path, mode)
}

/// Write a private key with mode 0400.
pub fn write_key(path: &Path, contents: &[u8]) -> Result<()> {
    write_with_mode(path, contents, KEY_MODE)
}

/// Plain write with mode 0644.
pub fn write(path: &Path, contents: &[u8]) -> Result<()> {
    write_with_mode(path, contents, FILE_MODE)
}

/// Read a whole file.
pub fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| PkiError::io(path, e))
}

/// Read a whole file as UTF-8 text.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| PkiError::io(path, e))
}

/// Copy `from` to `to`, keeping the source's permission bits.
pub fn copy(from: &Path, to: &Path) -> Result<()> {
    let contents = read(from)?;
    write_with_mode(to, &contents, mode_of(from)?)
}

/// Remove everything inside `dir` but keep `dir` itself.
pub fn remove_contents(dir: &Path) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| PkiError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| PkiError::io(dir, e))?.path();
        let meta = fs::symlink_metadata(&path).map_err(|e| PkiError::io(&path, e))?;
        if meta.is_dir() {
            fs::remove_dir_all(&path).map_err(|e| PkiError::io(&path, e))?;
        } else {
            fs::remove_file(&path).map_err(|e| PkiError::io(&path, e))?;
        }
    }
    Ok(())
}
