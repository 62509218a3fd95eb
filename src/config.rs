//! Assembling the working configuration of a session.
//!
//! The configuration written to the module is built from, in order:
//!
//! 1. the configuration page read from the module, with code protection
//!    cleared so that the session can proceed on a locked chip,
//! 2. the backup kept for the module id when the page read back is blank,
//! 3. a user supplied override, merged on top.
//!
//! Every non blank page read from a module is backed up before being used.

use std::io;
use std::path::PathBuf;

use log::info;

use crate::error::{ConfigError, Error, Result};
use crate::image::{ConfigImage, SparseImage, PAGE_SIZE};
use crate::protocol::{ChipInfo, FlashAccess};
use crate::settings::Settings;

/// One backup config image per module id, stored as Intel HEX files named
/// after the id.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        BackupStore { dir: dir.into() }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.backup_dir.clone())
    }

    pub fn path_for(&self, id_hex: &str) -> PathBuf {
        self.dir.join(format!("{}_cfg.hex", id_hex))
    }

    /// Load the backup for `id_hex`.
    ///
    /// A missing file is `Ok(None)`. Unreadable or malformed files are
    /// errors, and so is a backup that is not exactly one page starting at
    /// address 0.
    pub fn load(&self, id_hex: &str) -> Result<Option<ConfigImage>> {
        let path = self.path_for(id_hex);
        let image = match SparseImage::load(&path) {
            Ok(image) => image,
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let bytes = image.to_contiguous();
        match (image.min_address(), ConfigImage::from_bytes(&bytes)) {
            (Some(0), Some(config)) => Ok(Some(config)),
            _ => Err(ConfigError::WrongBackupSize {
                path: path.display().to_string(),
                size: bytes.len(),
            }
            .into()),
        }
    }

    pub fn save(&self, id_hex: &str, config: &ConfigImage) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(id_hex);
        config.to_sparse().save(&path)?;
        Ok(path)
    }
}

/// Apply `overrides` on top of `old`: every offset the override defines
/// replaces the old byte, every other offset keeps it.
pub fn merge(
    old: &ConfigImage,
    overrides: &SparseImage,
) -> std::result::Result<ConfigImage, ConfigError> {
    let mut merged = old.clone();
    for (address, value) in overrides.iter() {
        if address as usize >= PAGE_SIZE {
            return Err(ConfigError::OverrideOutOfRange { offset: address });
        }
        merged.set(address as usize, value);
    }
    Ok(merged)
}

/// Obtain the configuration currently valid for the module, from the
/// module itself or from its backup.
pub fn obtain_config(
    flash: &mut FlashAccess,
    store: &BackupStore,
    info: &ChipInfo,
    force_backup: bool,
) -> Result<ConfigImage> {
    let id = info.id_hex();

    if force_backup {
        info!("Read config from backup {}", store.path_for(&id).display());
        let config = store
            .load(&id)?
            .ok_or(ConfigError::BackupMissing { id })?;
        log_config("loaded config from backup", &config);
        return Ok(config);
    }

    info!("Read config area");
    let mut config = flash.read_config()?;
    config.clear_code_protect();

    if config.is_blank() {
        info!(
            "Empty config area, read config from backup {}",
            store.path_for(&id).display()
        );
        let config = store
            .load(&id)?
            .ok_or(ConfigError::EmptyChipNoBackup { id })?;
        log_config("loaded config from backup", &config);
        return Ok(config);
    }

    log_config("loaded config from module", &config);
    let path = store.save(&id, &config)?;
    info!("dumped config to {}", path.display());
    Ok(config)
}

pub(crate) fn log_config(title: &str, config: &ConfigImage) {
    info!("{}:", title);
    for line in config.to_string().lines() {
        info!("    {}", line);
    }
}
