// Shader loading
//
// Vulkan consumes SPIR-V words. Where they come from is up to a
// ShaderSource; the default one reads `<dir>/<name>.<stage>.spv` files
// produced by build.rs.

use ash::vk;
use std::fmt;
use std::fs;
use std::io::{self, Cursor};
use std::path::PathBuf;

use super::driver::Driver;
use super::error::{BringUpError, Result, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

impl ShaderKind {
    pub fn stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderKind::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderKind::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// File extension glslc uses for this stage
    pub fn extension(self) -> &'static str {
        match self {
            ShaderKind::Vertex => "vert",
            ShaderKind::Fragment => "frag",
        }
    }
}

impl fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderKind::Vertex => f.write_str("vertex"),
            ShaderKind::Fragment => f.write_str("fragment"),
        }
    }
}

/// Supplies compiled SPIR-V by logical name and stage
pub trait ShaderSource {
    fn load(&self, name: &str, kind: ShaderKind) -> io::Result<Vec<u32>>;
}

/// Reads precompiled `.spv` files from a directory
#[derive(Debug, Clone)]
pub struct FileShaderSource {
    dir: PathBuf,
}

impl FileShaderSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str, kind: ShaderKind) -> PathBuf {
        self.dir.join(format!("{}.{}.spv", name, kind.extension()))
    }
}

impl ShaderSource for FileShaderSource {
    fn load(&self, name: &str, kind: ShaderKind) -> io::Result<Vec<u32>> {
        let path = self.path_for(name, kind);
        log::debug!("Loading {} shader from {:?}", kind, path);
        let bytes = fs::read(&path)?;
        // read_spv handles alignment and endianness
        ash::util::read_spv(&mut Cursor::new(bytes))
    }
}

/// Fetch one stage, mapping read failures into the bring-up taxonomy
pub fn load_stage<S: ShaderSource + ?Sized>(source: &S, name: &str, kind: ShaderKind) -> Result<Vec<u32>> {
    source.load(name, kind).map_err(|source| BringUpError::ShaderLoadFailed {
        name: name.to_string(),
        kind,
        source,
    })
}

/// Wrap SPIR-V words in a shader module
pub fn create_shader_module<D: Driver + ?Sized>(driver: &mut D, code: &[u32]) -> Result<vk::ShaderModule> {
    driver
        .create_shader_module(code)
        .map_err(|result| BringUpError::PipelineCreationFailed { stage: Stage::ShaderModule, result })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    fn scratch_dir(test: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vk-bringup-{}-{}", test, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_words(path: &Path, words: &[u32]) {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn path_follows_glslc_naming() {
        let source = FileShaderSource::new("shaders");
        assert_eq!(
            source.path_for("triangle", ShaderKind::Vertex),
            Path::new("shaders").join("triangle.vert.spv")
        );
        assert_eq!(
            source.path_for("triangle", ShaderKind::Fragment),
            Path::new("shaders").join("triangle.frag.spv")
        );
    }

    #[test]
    fn loads_words_from_disk() {
        let dir = scratch_dir("load");
        let source = FileShaderSource::new(&dir);
        write_words(&source.path_for("tri", ShaderKind::Fragment), &[SPIRV_MAGIC, 0x0001_0000, 7]);

        let words = source.load("tri", ShaderKind::Fragment).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000, 7]);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_file_is_shader_load_failed() {
        let source = FileShaderSource::new(scratch_dir("missing"));

        match load_stage(&source, "nope", ShaderKind::Vertex) {
            Err(BringUpError::ShaderLoadFailed { name, kind, source }) => {
                assert_eq!(name, "nope");
                assert_eq!(kind, ShaderKind::Vertex);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected ShaderLoadFailed, got {:?}", other),
        }
    }
}
