use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use super::serializer::{SerializeError, SerializerRegistry};
use super::transcode::{
    read_content, read_content_file, write_content_file, ContentEncoding, TranscodeError,
};
use super::xml::{DecodeError, ReadOptions};

/// A decoded document and the encoding it was stored in, so it can be saved back the same way.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub encoding: ContentEncoding,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
}

/// `Ok(None)` when the file is missing or holds no document.
pub fn load_file<T: 'static>(
    registry: &SerializerRegistry,
    path: &Path,
    options: &ReadOptions,
) -> Result<Option<Loaded<T>>, LoadError> {
    let Some(transcoded) = read_content_file(path)? else {
        debug!(path = %path.display(), "content_file_absent");
        return Ok(None);
    };
    let value = registry
        .deserialize::<T>(&transcoded.bytes, options)
        .map_err(|source| {
            warn!(path = %path.display(), error = %source, "content_file_decode_failed");
            LoadError::Decode {
                path: path.to_path_buf(),
                source,
            }
        })?;
    Ok(value.map(|value| Loaded {
        value,
        encoding: transcoded.encoding,
    }))
}

pub fn load_from_reader<T: 'static, R: Read + Seek>(
    registry: &SerializerRegistry,
    source: &mut R,
    options: &ReadOptions,
) -> Result<Option<Loaded<T>>, LoadError> {
    let transcoded = read_content(source)?;
    let value = registry
        .deserialize::<T>(&transcoded.bytes, options)
        .map_err(|source| LoadError::Decode {
            path: PathBuf::from("<stream>"),
            source,
        })?;
    Ok(value.map(|value| Loaded {
        value,
        encoding: transcoded.encoding,
    }))
}

pub fn save_file<T: 'static>(
    registry: &SerializerRegistry,
    path: &Path,
    value: &T,
    encoding: ContentEncoding,
) -> Result<(), SaveError> {
    let text = registry.serialize(value)?;
    write_content_file(path, text.as_bytes(), encoding)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use tempfile::TempDir;

    use super::*;
    use crate::content::transcode::encode;
    use crate::world::fixtures::SMALL_SHIP;
    use crate::world::CubeGrid;

    #[test]
    fn compressed_and_plain_files_decode_identically() {
        let temp = TempDir::new().expect("temp");
        let registry = SerializerRegistry::with_builtin_types();
        let plain = temp.path().join("plain.sbc");
        let packed = temp.path().join("packed.sbc");
        fs::write(&plain, SMALL_SHIP).expect("write plain");
        fs::write(
            &packed,
            encode(SMALL_SHIP.as_bytes(), ContentEncoding::Gzip).expect("encode"),
        )
        .expect("write packed");

        let options = ReadOptions::default();
        let a = load_file::<CubeGrid>(&registry, &plain, &options)
            .expect("plain")
            .expect("present");
        let b = load_file::<CubeGrid>(&registry, &packed, &options)
            .expect("packed")
            .expect("present");
        assert_eq!(a.encoding, ContentEncoding::Plain);
        assert_eq!(b.encoding, ContentEncoding::Gzip);
        assert_eq!(a.value, b.value);
    }

    #[test]
    fn absent_and_corrupt_files_are_distinguished() {
        let temp = TempDir::new().expect("temp");
        let registry = SerializerRegistry::with_builtin_types();
        let options = ReadOptions::default();

        let absent = load_file::<CubeGrid>(&registry, &temp.path().join("none.sbc"), &options)
            .expect("absent is not an error");
        assert!(absent.is_none());

        let corrupt_path = temp.path().join("corrupt.sbc");
        fs::write(&corrupt_path, "<MyObjectBuilder_CubeGrid><CubeBlocks>").expect("write");
        let error = load_file::<CubeGrid>(&registry, &corrupt_path, &options).expect_err("corrupt");
        assert!(matches!(error, LoadError::Decode { .. }));

        let bad_gzip = temp.path().join("bad.sbc.gz");
        fs::write(&bad_gzip, [0x1F, 0x8B, 0x08, 0x00, 0x01]).expect("write");
        let error = load_file::<CubeGrid>(&registry, &bad_gzip, &options).expect_err("bad gzip");
        assert!(matches!(
            error,
            LoadError::Transcode(TranscodeError::Decompress(_))
        ));
    }

    #[test]
    fn save_keeps_the_encoding_it_was_loaded_with() {
        let temp = TempDir::new().expect("temp");
        let registry = SerializerRegistry::with_builtin_types();
        let options = ReadOptions::default();
        let loaded = load_from_reader::<CubeGrid, _>(
            &registry,
            &mut Cursor::new(encode(SMALL_SHIP.as_bytes(), ContentEncoding::Gzip).expect("gz")),
            &options,
        )
        .expect("load")
        .expect("present");

        let out = temp.path().join("saved.sbc");
        save_file(&registry, &out, &loaded.value, loaded.encoding).expect("save");
        let raw = fs::read(&out).expect("read");
        assert_eq!(&raw[..2], &[0x1F, 0x8B]);

        let reloaded = load_file::<CubeGrid>(&registry, &out, &options)
            .expect("reload")
            .expect("present");
        assert_eq!(reloaded.value, loaded.value);
        assert_eq!(reloaded.encoding, ContentEncoding::Gzip);
    }
}
