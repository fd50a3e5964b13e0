use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes through a sibling temp file so readers never observe a half-written document.
pub(crate) fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path_for(path);
    if let Err(error) = fs::write(&tmp_path, bytes) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    replace_file(&tmp_path, path)
}

/// `fs::rename` replaces an existing target in one step on every platform, so
/// the previous document stays readable until the new one lands.
fn replace_file(tmp_path: &Path, final_path: &Path) -> io::Result<()> {
    if let Err(error) = fs::rename(tmp_path, final_path) {
        let _ = fs::remove_file(tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("world.sbc");
    let tmp_name = format!(".{file_name}.partial");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn overwrite_replaces_contents_and_leaves_no_partial_file() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("grid.sbc");
        write_bytes_atomic(&path, b"first").expect("first");
        write_bytes_atomic(&path, b"second").expect("second");
        assert_eq!(fs::read(&path).expect("read"), b"second");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn failed_replace_keeps_existing_document() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("grid.sbc");
        fs::write(&path, b"original").expect("write");

        let missing_tmp = temp.path().join(".missing.partial");
        let error = replace_file(&missing_tmp, &path).expect_err("rename fails");
        assert_eq!(error.kind(), io::ErrorKind::NotFound);
        assert_eq!(fs::read(&path).expect("read"), b"original");
    }
}
