//! Runtime configuration, overridable through environment variables instead
//! of baked in as `const`.

use std::path::PathBuf;

const DEFAULT_BUFFER_POOL_FRAMES: usize = 256;
const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone)]
pub struct Config {
    /// Number of frames the buffer pool manager allocates.
    pub buffer_pool_frames: usize,
    /// Root directory under which index and relation files live.
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_pool_frames: DEFAULT_BUFFER_POOL_FRAMES,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl Config {
    /// Loads configuration from the environment, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(frames) = std::env::var("IDX_BUFFER_POOL_FRAMES") {
            if let Ok(frames) = frames.parse() {
                config.buffer_pool_frames = frames;
            }
        }

        if let Ok(dir) = std::env::var("IDX_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config
    }
}
