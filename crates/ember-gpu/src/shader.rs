//! SPIR-V loading from disk.

use crate::error::{GpuError, Result};
use std::fs::File;
use std::path::Path;

/// Read a SPIR-V binary. Word order is fixed up from the magic number.
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let load_error = |source| GpuError::ShaderLoad {
        path: path.display().to_string(),
        source,
    };
    let mut file = File::open(path).map_err(load_error)?;
    let words = ash::util::read_spv(&mut file).map_err(load_error)?;
    tracing::trace!("Loaded {} ({} words)", path.display(), words.len());
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn reads_words_from_disk() {
        let path = std::env::temp_dir().join(format!("ember-shader-{}.spv", std::process::id()));
        let words = [SPIRV_MAGIC, 0x0001_0600, 0, 1, 0];
        {
            let mut file = File::create(&path).unwrap();
            for word in words {
                file.write_all(&word.to_le_bytes()).unwrap();
            }
        }
        let loaded = load_spirv(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, words);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_spirv("definitely/not/here.spv").unwrap_err();
        assert!(matches!(err, GpuError::ShaderLoad { .. }));
        assert!(err.to_string().contains("here.spv"));
    }
}
