use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod content;
pub mod world;

pub use content::{
    accumulate, load_definition_repository, load_file, save_file, structure_requirements, Amount,
    ContentEncoding, CubeSize, DecodeError, DecodeErrorCode, DefinitionKey, DefinitionRepository,
    LoadError, MaterialIndexCache, ObjectType, ReadOptions, RepositoryLoad, RepositoryLoadError,
    RequirementLedger, RequirementReport, SaveError, SerializerRegistry,
};
pub use world::{compute_bounding_volume, BoundingVolume, CubeBlock, CubeGrid, Vec3, Vec3I};

pub const CONTENT_DIR_ENV_VAR: &str = "GRIDKIT_CONTENT_DIR";

/// Candidate content locations relative to each ancestor of the executable, in search order.
const CONTENT_DIR_CANDIDATES: &[&[&str]] = &[&["Content", "Data"], &["content"]];

#[derive(Debug, Clone)]
pub struct ContentPaths {
    pub content_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("GRIDKIT_CONTENT_DIR is set but is not a directory: {path}")]
    InvalidEnvContentDir { path: PathBuf },
    #[error(
        "Could not find a content directory by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Content/Data or content.\n\
Set {env_var} explicitly, for example:\n\
PowerShell: $env:{env_var}=\"C:\\path\\to\\Content\\Data\"\n\
Bash/zsh: export {env_var}=\"/path/to/Content/Data\""
    )]
    ContentDirNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_content_paths() -> Result<ContentPaths, StartupError> {
    let content_dir = match env::var(CONTENT_DIR_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if !normalized.is_dir() {
                return Err(StartupError::InvalidEnvContentDir { path: normalized });
            }
            normalized
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;
            find_content_dir(&exe_dir).ok_or_else(|| StartupError::ContentDirNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: CONTENT_DIR_ENV_VAR,
            })?
        }
        Err(source) => {
            return Err(StartupError::EnvVar {
                var: CONTENT_DIR_ENV_VAR,
                source,
            })
        }
    };
    Ok(ContentPaths { content_dir })
}

fn find_content_dir(start_dir: &Path) -> Option<PathBuf> {
    for ancestor in start_dir.ancestors() {
        for candidate in CONTENT_DIR_CANDIDATES {
            let path = candidate
                .iter()
                .fold(ancestor.to_path_buf(), |path, part| path.join(part));
            if path.is_dir() {
                return Some(normalize_path(&path));
            }
        }
    }
    None
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
