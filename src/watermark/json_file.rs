use super::{Stream, WatermarkError, WatermarkStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recents {
    #[serde(rename = "battleId", default)]
    pub battle_id: u64,
    #[serde(rename = "eventId", default)]
    pub event_id: u64,
    /// Keys written by other tools, kept as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// On-disk layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    recents: Recents,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// JSON file store
///
/// Every `set` rewrites the whole file through a temp file that is fsynced
/// and renamed over the original, so a crash leaves either the old or the new
/// contents on disk, never a torn write.
pub struct JsonFileWatermarkStore {
    path: PathBuf,
    state: Mutex<StateFile>,
}

impl JsonFileWatermarkStore {
    /// Open `path`, creating it with zeroed watermarks if missing
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WatermarkError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let state = if path.exists() {
            let json = fs::read_to_string(&path)?;
            let state: StateFile = serde_json::from_str(&json)?;
            log::info!(
                "Loaded watermarks from {} (battles: {}, kills: {})",
                path.display(),
                state.recents.battle_id,
                state.recents.event_id
            );
            state
        } else {
            log::info!("No existing watermark file found: {}", path.display());
            let state = StateFile::default();
            write_atomic(&path, &state)?;
            state
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_atomic(path: &Path, state: &StateFile) -> Result<(), WatermarkError> {
    let json = serde_json::to_string_pretty(state)?;

    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    sync_parent_dir(path)?;

    Ok(())
}

/// Persist the rename itself
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<(), WatermarkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<(), WatermarkError> {
    Ok(())
}

impl WatermarkStore for JsonFileWatermarkStore {
    fn get(&self, stream: Stream) -> Result<u64, WatermarkError> {
        let state = self.state.lock().map_err(|_| WatermarkError::Poisoned)?;
        Ok(match stream {
            Stream::Battles => state.recents.battle_id,
            Stream::Kills => state.recents.event_id,
        })
    }

    fn set(&self, stream: Stream, last_id: u64) -> Result<(), WatermarkError> {
        let mut state = self.state.lock().map_err(|_| WatermarkError::Poisoned)?;
        let mut next = state.clone();
        match stream {
            Stream::Battles => next.recents.battle_id = last_id,
            Stream::Kills => next.recents.event_id = last_id,
        }
        write_atomic(&self.path, &next)?;
        *state = next;

        log::debug!("Saved {} watermark {} to {}", stream, last_id, self.path.display());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "json"
    }
}
