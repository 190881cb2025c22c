//! Compiled shader lookup.

use std::path::{Path, PathBuf};

use ember_gpu::{load_spirv, Result};

/// Resolves shader names like `"mesh.vert"` to `<dir>/mesh.vert.spv`.
#[derive(Clone, Debug)]
pub struct ShaderLibrary {
    dir: PathBuf,
}

impl ShaderLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.spv"))
    }

    pub fn load(&self, name: &str) -> Result<Vec<u32>> {
        load_spirv(self.path(name))
    }

    /// Load a vertex and fragment stage.
    pub fn load_pair(&self, vertex: &str, fragment: &str) -> Result<(Vec<u32>, Vec<u32>)> {
        Ok((self.load(vertex)?, self.load(fragment)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gpu::GpuError;

    #[test]
    fn names_map_to_spv_files() {
        let library = ShaderLibrary::new("shaders");
        assert_eq!(
            library.path("lighting.frag"),
            PathBuf::from("shaders/lighting.frag.spv")
        );
    }

    #[test]
    fn missing_shader_reports_path() {
        let library = ShaderLibrary::new("no-such-dir");
        let err = library.load("depth.vert").unwrap_err();
        assert!(matches!(err, GpuError::ShaderLoad { .. }));
        assert!(err.to_string().contains("depth.vert.spv"));
    }
}
