use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;
use tracing::debug;

use super::atomic_io::write_bytes_atomic;

pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    #[default]
    Plain,
    Gzip,
}

impl ContentEncoding {
    pub fn was_compressed(self) -> bool {
        matches!(self, Self::Gzip)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcoded {
    pub bytes: Vec<u8>,
    pub encoding: ContentEncoding,
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to read/write content stream: {0}")]
    Io(#[source] io::Error),
    #[error("failed to read/write file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("gzip payload is corrupt: {0}")]
    Decompress(#[source] io::Error),
    #[error("failed to compress payload: {0}")]
    Compress(#[source] io::Error),
}

/// Reads the whole source, inflating it first when it starts with the gzip magic.
pub fn read_content<R: Read + Seek>(source: &mut R) -> Result<Transcoded, TranscodeError> {
    let encoding = sniff_encoding(source).map_err(TranscodeError::Io)?;

    let mut bytes = Vec::new();
    match encoding {
        ContentEncoding::Gzip => {
            let mut decoder = GzDecoder::new(&mut *source);
            decoder
                .read_to_end(&mut bytes)
                .map_err(TranscodeError::Decompress)?;
            debug!(decompressed_bytes = bytes.len(), "content_gzip_inflated");
        }
        ContentEncoding::Plain => {
            source.read_to_end(&mut bytes).map_err(TranscodeError::Io)?;
        }
    }

    Ok(Transcoded { bytes, encoding })
}

/// Missing files are `Ok(None)` so callers can tell "nothing to load" from "corrupt".
pub fn read_content_file(path: &Path) -> Result<Option<Transcoded>, TranscodeError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(TranscodeError::File {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let transcoded = read_content(&mut file)?;
    debug!(
        path = %path.display(),
        encoding = ?transcoded.encoding,
        bytes = transcoded.bytes.len(),
        "content_file_read"
    );
    Ok(Some(transcoded))
}

pub fn write_content<W: Write>(
    destination: &mut W,
    payload: &[u8],
    encoding: ContentEncoding,
) -> Result<(), TranscodeError> {
    let encoded = encode(payload, encoding)?;
    destination.write_all(&encoded).map_err(TranscodeError::Io)?;
    destination.flush().map_err(TranscodeError::Io)
}

pub fn write_content_file(
    path: &Path,
    payload: &[u8],
    encoding: ContentEncoding,
) -> Result<(), TranscodeError> {
    let encoded = encode(payload, encoding)?;
    write_bytes_atomic(path, &encoded).map_err(|source| TranscodeError::File {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        path = %path.display(),
        encoding = ?encoding,
        payload_bytes = payload.len(),
        written_bytes = encoded.len(),
        "content_file_written"
    );
    Ok(())
}

pub fn encode(payload: &[u8], encoding: ContentEncoding) -> Result<Vec<u8>, TranscodeError> {
    match encoding {
        ContentEncoding::Plain => Ok(payload.to_vec()),
        ContentEncoding::Gzip => {
            let mut encoder = GzEncoder::new(
                Vec::with_capacity(payload.len() / 2),
                Compression::default(),
            );
            encoder.write_all(payload).map_err(TranscodeError::Compress)?;
            encoder.finish().map_err(TranscodeError::Compress)
        }
    }
}

/// Peeks at up to two bytes and restores the stream position afterwards.
fn sniff_encoding<R: Read + Seek>(source: &mut R) -> io::Result<ContentEncoding> {
    let start = source.stream_position()?;
    let mut header = [0u8; 2];
    let mut filled = 0usize;
    while filled < header.len() {
        match source.read(&mut header[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
    source.seek(SeekFrom::Start(start))?;

    if filled == header.len() && header == GZIP_MAGIC {
        Ok(ContentEncoding::Gzip)
    } else {
        Ok(ContentEncoding::Plain)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tempfile::TempDir;

    use super::*;

    const PAYLOAD: &[u8] = b"<?xml version=\"1.0\"?>\n<Definitions />\n";

    #[test]
    fn plain_payload_passes_through() {
        let mut source = Cursor::new(PAYLOAD.to_vec());
        let read = read_content(&mut source).expect("read");
        assert_eq!(read.encoding, ContentEncoding::Plain);
        assert_eq!(read.bytes, PAYLOAD);
    }

    #[test]
    fn gzip_payload_is_inflated_to_identical_bytes() {
        let compressed = encode(PAYLOAD, ContentEncoding::Gzip).expect("encode");
        assert_eq!(&compressed[..2], &GZIP_MAGIC);
        let read = read_content(&mut Cursor::new(compressed)).expect("read");
        assert!(read.encoding.was_compressed());
        assert_eq!(read.bytes, PAYLOAD);
    }

    #[test]
    fn short_inputs_are_plain() {
        for input in [Vec::new(), vec![0x1F]] {
            let read = read_content(&mut Cursor::new(input.clone())).expect("read");
            assert_eq!(read.encoding, ContentEncoding::Plain);
            assert_eq!(read.bytes, input);
        }
    }

    #[test]
    fn detection_rewinds_to_original_position() {
        let mut bytes = b"junk".to_vec();
        bytes.extend_from_slice(&encode(PAYLOAD, ContentEncoding::Gzip).expect("encode"));
        let mut source = Cursor::new(bytes);
        source.set_position(4);
        let read = read_content(&mut source).expect("read");
        assert_eq!(read.encoding, ContentEncoding::Gzip);
        assert_eq!(read.bytes, PAYLOAD);
    }

    #[test]
    fn truncated_gzip_is_decompress_error() {
        let mut compressed = encode(PAYLOAD, ContentEncoding::Gzip).expect("encode");
        compressed.truncate(compressed.len() / 2);
        let error = read_content(&mut Cursor::new(compressed)).expect_err("error");
        assert!(matches!(error, TranscodeError::Decompress(_)));
    }

    #[test]
    fn missing_file_is_none() {
        let temp = TempDir::new().expect("temp");
        let read = read_content_file(&temp.path().join("absent.sbc")).expect("read");
        assert!(read.is_none());
    }

    #[test]
    fn file_write_keeps_requested_encoding() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("nested").join("grid.sbc");
        write_content_file(&path, PAYLOAD, ContentEncoding::Gzip).expect("write");
        let read = read_content_file(&path).expect("read").expect("present");
        assert_eq!(read.encoding, ContentEncoding::Gzip);
        assert_eq!(read.bytes, PAYLOAD);

        let mut sink = Vec::new();
        write_content(&mut sink, PAYLOAD, ContentEncoding::Plain).expect("write plain");
        assert_eq!(sink, PAYLOAD);
    }
}
