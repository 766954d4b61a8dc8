//! Where Mneme stores its own data (config and the default memory directory).

use std::path::PathBuf;

/// Returns the directory where Mneme stores config and memory.
/// On Linux: `~/.local/share/mneme/`; on macOS: `~/Library/Application Support/Mneme/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "Mneme", "Mneme")?.data_local_dir().to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}
