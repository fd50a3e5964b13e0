use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use super::database::{DefinitionRepository, MaterialIndexCache};
use super::definitions::Definitions;
use super::serializer::SerializerRegistry;
use super::transcode::{read_content_file, TranscodeError};
use super::xml::{DecodeError, DecodeErrorCode, ReadOptions};

const DEFINITION_EXTENSIONS: &[&str] = &["sbc", "xml"];

#[derive(Debug, Error)]
pub enum RepositoryLoadError {
    #[error("content directory does not exist: {path}")]
    ContentDirMissing { path: PathBuf },
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error("failed to decode definitions in {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
}

#[derive(Debug)]
pub struct RepositoryLoad {
    pub repository: DefinitionRepository,
    pub file_count: usize,
    pub compressed_file_count: usize,
    pub skipped_file_count: usize,
    pub input_hash_sha256_hex: String,
}

/// Reads every definition file under `content_dir` (sorted by relative path)
/// and merges them into one repository, later files overriding earlier ones.
///
/// Files whose root element is not `<Definitions>` are skipped. The material
/// cache is shared with previous loads so material indices survive reloads.
pub fn load_definition_repository(
    content_dir: &Path,
    registry: &SerializerRegistry,
    options: &ReadOptions,
    material_cache: &MaterialIndexCache,
) -> Result<RepositoryLoad, RepositoryLoadError> {
    if !content_dir.is_dir() {
        return Err(RepositoryLoadError::ContentDirMissing {
            path: content_dir.to_path_buf(),
        });
    }

    let files = collect_definition_files(content_dir)?;
    let mut hasher = Sha256::new();
    let mut sources = Vec::<Definitions>::with_capacity(files.len());
    let mut compressed_file_count = 0usize;
    let mut skipped_file_count = 0usize;

    for (normalized_rel, path) in &files {
        // Files can vanish between listing and reading; treat them as empty.
        let Some(transcoded) = read_content_file(path)? else {
            continue;
        };

        let defs = match registry.deserialize::<Definitions>(&transcoded.bytes, options) {
            Ok(defs) => defs.unwrap_or_default(),
            Err(error) if error.code == DecodeErrorCode::InvalidRoot => {
                debug!(file = %normalized_rel, error = %error, "non_definition_file_skipped");
                skipped_file_count += 1;
                continue;
            }
            Err(source) => {
                return Err(RepositoryLoadError::Decode {
                    path: path.clone(),
                    source,
                })
            }
        };

        hasher.update(normalized_rel.as_bytes());
        hasher.update([0u8]);
        hasher.update(&transcoded.bytes);
        if transcoded.encoding.was_compressed() {
            compressed_file_count += 1;
        }
        debug!(
            file = %normalized_rel,
            encoding = ?transcoded.encoding,
            cube_blocks = defs.cube_blocks.len(),
            blueprints = defs.blueprints.len(),
            "definition_file_loaded"
        );
        sources.push(defs);
    }

    let file_count = sources.len();
    let repository = DefinitionRepository::from_sources(sources, material_cache.clone());
    let counts = repository.counts();
    let input_hash_sha256_hex = to_hex_lower(&hasher.finalize());
    info!(
        content_dir = %content_dir.display(),
        files = file_count,
        compressed_files = compressed_file_count,
        skipped_files = skipped_file_count,
        cube_blocks = counts.cube_blocks,
        components = counts.components,
        physical_items = counts.physical_items,
        ammo_magazines = counts.ammo_magazines,
        voxel_materials = counts.voxel_materials,
        blueprints = counts.blueprints,
        input_hash = %input_hash_sha256_hex,
        "definition_repository_loaded"
    );

    Ok(RepositoryLoad {
        repository,
        file_count,
        compressed_file_count,
        skipped_file_count,
        input_hash_sha256_hex,
    })
}

fn collect_definition_files(root: &Path) -> Result<Vec<(String, PathBuf)>, RepositoryLoadError> {
    let mut files = Vec::<(String, PathBuf)>::new();
    collect_recursive(root, root, &mut files)?;
    files.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(files)
}

fn collect_recursive(
    root: &Path,
    current: &Path,
    files: &mut Vec<(String, PathBuf)>,
) -> Result<(), RepositoryLoadError> {
    let entries = fs::read_dir(current).map_err(|source| RepositoryLoadError::ReadDir {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| RepositoryLoadError::ReadDir {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(root, &path, files)?;
            continue;
        }
        if !is_definition_file(&path) {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        files.push((normalize_rel_path(rel), path.clone()));
    }
    Ok(())
}

fn is_definition_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            DEFINITION_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::content::definitions::fixtures::BASE_DEFINITIONS;
    use crate::content::transcode::{encode, ContentEncoding};
    use crate::content::xml::DecodeErrorCode;
    use crate::content::ObjectType;

    fn write_file(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    const OVERRIDE: &str = r#"<Definitions>
  <Components>
    <Component>
      <Id Type="Component" Subtype="SteelPlate" />
      <Mass>22</Mass>
    </Component>
  </Components>
</Definitions>"#;

    #[test]
    fn loads_sorted_files_with_later_overrides() {
        let temp = TempDir::new().expect("temp");
        let dir = temp.path();
        write_file(&dir.join("a_base.sbc"), BASE_DEFINITIONS.as_bytes());
        write_file(
            &dir.join("nested").join("z_override.sbc"),
            &encode(OVERRIDE.as_bytes(), ContentEncoding::Gzip).expect("gz"),
        );
        write_file(&dir.join("notes.txt"), b"ignored");

        let load = load_definition_repository(
            dir,
            &SerializerRegistry::with_builtin_types(),
            &ReadOptions::default(),
            &MaterialIndexCache::new(),
        )
        .expect("load");
        assert_eq!(load.file_count, 2);
        assert_eq!(load.compressed_file_count, 1);
        assert_eq!(load.input_hash_sha256_hex.len(), 64);
        assert_eq!(
            load.repository
                .item_mass(&ObjectType::Component, "SteelPlate"),
            22.0
        );
        assert_eq!(load.repository.counts().components, 2);
    }

    #[test]
    fn input_hash_changes_when_content_changes() {
        let temp = TempDir::new().expect("temp");
        let dir = temp.path();
        let registry = SerializerRegistry::with_builtin_types();
        let cache = MaterialIndexCache::new();
        write_file(&dir.join("defs.sbc"), BASE_DEFINITIONS.as_bytes());
        let first = load_definition_repository(dir, &registry, &ReadOptions::default(), &cache)
            .expect("first");
        write_file(&dir.join("defs.sbc"), OVERRIDE.as_bytes());
        let second = load_definition_repository(dir, &registry, &ReadOptions::default(), &cache)
            .expect("second");
        assert_ne!(first.input_hash_sha256_hex, second.input_hash_sha256_hex);
    }

    #[test]
    fn empty_file_contributes_nothing() {
        let temp = TempDir::new().expect("temp");
        write_file(&temp.path().join("empty.sbc"), b"");
        let load = load_definition_repository(
            temp.path(),
            &SerializerRegistry::with_builtin_types(),
            &ReadOptions::default(),
            &MaterialIndexCache::new(),
        )
        .expect("load");
        assert_eq!(load.repository.counts().cube_blocks, 0);
    }

    #[test]
    fn decode_failure_names_the_file() {
        let temp = TempDir::new().expect("temp");
        write_file(&temp.path().join("broken.sbc"), b"<Definitions><CubeBlocks>");
        let error = load_definition_repository(
            temp.path(),
            &SerializerRegistry::with_builtin_types(),
            &ReadOptions::default(),
            &MaterialIndexCache::new(),
        )
        .expect_err("error");
        let RepositoryLoadError::Decode { path, source } = error else {
            panic!("expected decode error");
        };
        assert!(path.ends_with("broken.sbc"));
        assert_eq!(source.code, DecodeErrorCode::XmlMalformed);
    }

    #[test]
    fn missing_directory_is_reported() {
        let temp = TempDir::new().expect("temp");
        let error = load_definition_repository(
            &temp.path().join("nope"),
            &SerializerRegistry::with_builtin_types(),
            &ReadOptions::default(),
            &MaterialIndexCache::new(),
        )
        .expect_err("error");
        assert!(matches!(error, RepositoryLoadError::ContentDirMissing { .. }));
    }

    #[test]
    fn xml_files_with_other_roots_are_skipped() {
        let temp = TempDir::new().expect("temp");
        let dir = temp.path();
        write_file(&dir.join("defs.sbc"), BASE_DEFINITIONS.as_bytes());
        write_file(
            &dir.join("Localization").join("strings.xml"),
            b"<Strings><Entry>Hello</Entry></Strings>",
        );

        let load = load_definition_repository(
            dir,
            &SerializerRegistry::with_builtin_types(),
            &ReadOptions::default(),
            &MaterialIndexCache::new(),
        )
        .expect("load");
        assert_eq!(load.file_count, 1);
        assert_eq!(load.skipped_file_count, 1);
        assert_eq!(load.repository.counts().components, 2);
    }

    #[test]
    fn reload_keeps_material_indices_from_shared_cache() {
        let temp = TempDir::new().expect("temp");
        let dir = temp.path();
        let registry = SerializerRegistry::with_builtin_types();
        let cache = MaterialIndexCache::new();
        write_file(&dir.join("defs.sbc"), BASE_DEFINITIONS.as_bytes());
        let first = load_definition_repository(dir, &registry, &ReadOptions::default(), &cache)
            .expect("first");
        assert_eq!(first.repository.material_index("Gold_01"), Some(2));

        write_file(
            &dir.join("defs.sbc"),
            br#"<Definitions>
  <VoxelMaterials>
    <VoxelMaterial><Id Type="VoxelMaterialDefinition" Subtype="Gold_01" /></VoxelMaterial>
  </VoxelMaterials>
</Definitions>"#,
        );
        let second = load_definition_repository(dir, &registry, &ReadOptions::default(), &cache)
            .expect("second");
        assert_eq!(second.repository.materials().len(), 1);
        assert_eq!(second.repository.material_index("Gold_01"), Some(2));
    }
}
