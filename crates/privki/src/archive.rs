//! Encrypted backup and restore of the whole repository.
//!
//! Two ZIP archives are produced, each entry AES-256 encrypted with the
//! [`ArchivePassword`]:
//!
//! - `sfcert_config.dat`: the config tree, entry names relative to the home
//!   (`.privki/config/oid`)
//! - `sfcert_pki.dat`: the PKI tree, entry names relative to the repository
//!   base (`<uid>/<uid>-root-ca/root-ca.cert.pem`)

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use privki_core::{PkiError, Result, StateKey};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ResultExt;
use crate::fsutil;
use crate::selfkey::ArchivePassword;
use crate::state::StateStore;

/// Archive of the configuration directory.
pub const CONFIG_ARCHIVE: &str = "sfcert_config.dat";

/// Archive of the PKI materials directory.
pub const PKI_ARCHIVE: &str = "sfcert_pki.dat";

const PRIVATE_DIR_NAME: &str = "private";

/// Result of a backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub config_archive: PathBuf,
    pub pki_archive: PathBuf,
    pub config_entries: usize,
    pub pki_entries: usize,
}

/// Result of a restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub pki_path: PathBuf,
    pub config_entries: usize,
    pub pki_entries: usize,
}

/// Write both archives into `destination`.
///
/// Read-only against the repository.
pub fn backup(
    state: &StateStore,
    destination: &Path,
    password: &ArchivePassword,
) -> Result<BackupReport> {
    let paths = state.paths();
    let pki_path = state.pki_path()?;
    let pki_root = pki_path.parent().unwrap_or(&pki_path).to_path_buf();
    fsutil::create_dir_all(destination, fsutil::DIR_MODE)?;

    let config_archive = destination.join(CONFIG_ARCHIVE);
    let config_entries = pack(
        create(&config_archive)?,
        &config_archive,
        &paths.config_dir(),
        paths.home(),
        Some(password),
    )?;
    let pki_archive = destination.join(PKI_ARCHIVE);
    let pki_entries = pack(
        create(&pki_archive)?,
        &pki_archive,
        &pki_path,
        &pki_root,
        Some(password),
    )?;

    info!(
        config = %config_archive.display(),
        pki = %pki_archive.display(),
        entries = config_entries + pki_entries,
        "backup written"
    );
    Ok(BackupReport {
        config_archive,
        pki_archive,
        config_entries,
        pki_entries,
    })
}

/// Replace the repository with the contents of the archives in `source`.
pub fn restore(
    state: &StateStore,
    source: &Path,
    password: &ArchivePassword,
) -> Result<RestoreReport> {
    let paths = state.paths();
    let config_archive = source.join(CONFIG_ARCHIVE);
    let pki_archive = source.join(PKI_ARCHIVE);
    for archive in [&config_archive, &pki_archive] {
        if !archive.is_file() {
            return Err(PkiError::archive(archive, "archive not found"));
        }
        verify(archive, password)?;
    }

    let base = paths.base_dir();
    fsutil::remove_contents(&base)?;
    fsutil::create_dir_all(&base, fsutil::DIR_MODE)?;
    fsutil::create_dir_all(&paths.config_dir(), fsutil::DIR_MODE)?;

    let config_entries = unpack(&config_archive, paths.home(), password)?;
    let pki_path = relocate_pki_path(state)?;
    let pki_root = pki_path.parent().unwrap_or(&pki_path).to_path_buf();
    fsutil::create_dir_all(&pki_root, fsutil::DIR_MODE)?;
    fsutil::create_dir_all(&pki_path, fsutil::DIR_MODE)?;
    let pki_entries = unpack(&pki_archive, &pki_root, password)?;
    tighten_private_dirs(&pki_path)?;

    info!(
        pki_path = %pki_path.display(),
        entries = config_entries + pki_entries,
        "restore complete"
    );
    Ok(RestoreReport {
        pki_path,
        config_entries,
        pki_entries,
    })
}

/// Point `pki_path` at this home if the backup came from a different one.
fn relocate_pki_path(state: &StateStore) -> Result<PathBuf> {
    let stored = state.pki_path()?;
    let local = state.paths().pki_dir(&state.root_uid()?);
    if stored != local {
        warn!(
            from = %stored.display(),
            to = %local.display(),
            "backup was taken under another home, rewriting pki_path"
        );
        state.write(StateKey::PkiPath, &local.to_string_lossy())?;
    }
    Ok(local)
}

/// Unencrypted distribution archive of a finished intermediate.
///
/// Entries are named relative to the PKI directory (`<uid>-intermed-ca/...`).
/// Fails without touching `archive_path` if it already exists.
pub fn pack_intermediate(
    archive_path: &Path,
    intermediate_dir: &Path,
    pki_path: &Path,
) -> Result<usize> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(archive_path)
        .map_err(|e| PkiError::io(archive_path, e))?;
    pack(file, archive_path, intermediate_dir, pki_path, None)
}

fn create(archive_path: &Path) -> Result<File> {
    File::create(archive_path).map_err(|e| PkiError::io(archive_path, e))
}

fn pack(
    file: File,
    archive_path: &Path,
    tree: &Path,
    names_relative_to: &Path,
    password: Option<&ArchivePassword>,
) -> Result<usize> {
    let mut writer = ZipWriter::new(file);
    let mut count = 0;

    for entry in WalkDir::new(tree).sort_by_file_name() {
        let entry = entry.archive_at(archive_path)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = path
            .strip_prefix(names_relative_to)
            .map(privki_core::paths::to_slash)
            .archive_at(archive_path)?;
        let mode = fsutil::mode_of(path)?;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(mode);
        let options = match password {
            Some(password) => options.with_aes_encryption(AesMode::Aes256, password.as_str()),
            None => options,
        };

        debug!(entry = %name, mode = format_args!("{mode:o}"), "archiving");
        writer.start_file(name, options).archive_at(archive_path)?;
        let mut source = File::open(path).map_err(|e| PkiError::io(path, e))?;
        io::copy(&mut source, &mut writer).map_err(|e| PkiError::io(path, e))?;
        count += 1;
    }

    writer.finish().archive_at(archive_path)?;
    Ok(count)
}

fn unpack(archive_path: &Path, target_root: &Path, password: &ArchivePassword) -> Result<usize> {
    let file = File::open(archive_path).archive_at(archive_path)?;
    let mut archive = ZipArchive::new(file).archive_at(archive_path)?;
    let mut count = 0;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index_decrypt(i, password.as_bytes())
            .archive_at(archive_path)?;
        let name = entry.enclosed_name().ok_or_else(|| {
            PkiError::archive(
                archive_path,
                format!("entry {:?} escapes the restore root", entry.name()),
            )
        })?;
        let dest = target_root.join(name);
        if entry.is_dir() {
            fsutil::create_dir_all(&dest, fsutil::DIR_MODE)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            if !parent.is_dir() {
                fsutil::create_dir_all(parent, fsutil::DIR_MODE)?;
            }
        }
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .archive_at(archive_path)?;
        let mode = entry.unix_mode().map_or(fsutil::FILE_MODE, |m| m & 0o777);
        fsutil::write_with_mode(&dest, &contents, mode)?;
        count += 1;
    }
    Ok(count)
}

/// Decrypt and authenticate every entry without writing anything.
fn verify(archive_path: &Path, password: &ArchivePassword) -> Result<()> {
    let file = File::open(archive_path).archive_at(archive_path)?;
    let mut archive = ZipArchive::new(file).archive_at(archive_path)?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index_decrypt(i, password.as_bytes())
            .archive_at(archive_path)?;
        io::copy(&mut entry, &mut io::sink()).archive_at(archive_path)?;
    }
    Ok(())
}

/// Directories are not archived, so `private/` comes back with default bits.
fn tighten_private_dirs(pki_path: &Path) -> Result<()> {
    for entry in WalkDir::new(pki_path) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(pki_path).to_path_buf();
            PkiError::io(path, io::Error::other(e.to_string()))
        })?;
        if entry.file_type().is_dir() && entry.file_name() == PRIVATE_DIR_NAME {
            fsutil::set_mode(entry.path(), fsutil::PRIVATE_DIR_MODE)?;
        }
    }
    Ok(())
}
