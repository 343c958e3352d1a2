use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

pub trait FileIoWithBackup {
    /// Writes the given content to a file and creates a backup of the file before writing.
    fn write_with_backup<P: AsRef<Path>>(path: P, content: &str) -> Result<(), std::io::Error> {
        let path = path.as_ref();

        if path.exists() {
            let backup_path = path.with_extension("bak");

            // Create a backup of the file
            std::fs::copy(path, backup_path)?;
        }

        // Write the content to the file
        std::fs::write(path, content)?;

        Ok(())
    }
}

/// Trait for configuration handling.
pub trait Config: FileIoWithBackup {
    type ConfigType: Serialize + for<'de> Deserialize<'de>;

    fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Self::ConfigType> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self::ConfigType = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn save_config<P: AsRef<Path>>(path: P, config: &Self::ConfigType) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(config)?;
        Self::write_with_backup(path, &content)?;
        Ok(())
    }

    fn load_config_or_default<P: AsRef<Path>, F: FnOnce() -> Self::ConfigType>(
        path: P,
        default: F,
    ) -> anyhow::Result<Self::ConfigType> {
        match std::fs::metadata(path.as_ref()) {
            Ok(metadata) if metadata.is_file() => Self::load_config(path),
            _ => {
                let config = default();
                Self::save_config(path, &config)?;
                Ok(config)
            }
        }
    }
}

/// Streams a file through a SHA-1 hasher off the async runtime; used to
/// verify downloaded server binaries against the feed's checksum.
pub async fn file_sha1<P: AsRef<Path>>(path: P) -> anyhow::Result<String> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let mut hasher = Sha1::new();
        let mut file = std::fs::File::options().read(true).open(path)?;
        let mut buffer = [0; 32768];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .unwrap() // unwrap is safe: won't cancel and panic
}
