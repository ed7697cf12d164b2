//! Lock record: the on-disk marker of a running server
//!
//! Written atomically once the listener is bound, removed when the server
//! stops. Clients read it to find the port and handshake secret.

use std::fs::{self, File};
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{FastdevError, Result};

/// Contents of `.fastdev.lock`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub ip: String,
    pub port: u16,
    pub dir: PathBuf,
    pub app_id: String,
    pub app_guid: String,
}

impl LockRecord {
    /// Host a client should dial; wildcard binds map to loopback.
    pub fn connect_host(&self) -> String {
        match self.ip.parse::<IpAddr>() {
            Ok(ip) if ip.is_unspecified() => "127.0.0.1".to_string(),
            Ok(ip) => ip.to_string(),
            Err(_) if self.ip.is_empty() => "127.0.0.1".to_string(),
            Err(_) => self.ip.clone(),
        }
    }

    /// Read a lock record; `Ok(None)` when the file does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_str(&contents).map_err(|e| FastdevError::LockRecord {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Some(record))
    }

    /// Write the record atomically: temp file, fsync, rename.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string(self).map_err(|e| FastdevError::LockRecord {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".fastdev.lock".to_string());
        let temp_path = path.with_file_name(format!("{}.{}.tmp", file_name, std::process::id()));

        let result = (|| -> std::io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            fs::rename(&temp_path, path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Remove the lock file. Returns false if it was already gone.
pub fn remove_lock(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
