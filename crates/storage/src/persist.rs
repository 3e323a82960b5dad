use crate::error::WriteError;
use review_model::Record;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Serializes `records` as a pretty JSON array and swaps it into `path`.
///
/// The bytes go to a temporary file in the destination directory first and
/// are renamed over `path` only after a successful flush, so a failure at any
/// step leaves the previous file as it was. A read-only target is refused
/// rather than renamed over.
pub fn save<'a>(records: impl IntoIterator<Item = &'a Record>, path: &Path) -> Result<(), WriteError> {
    let records: Vec<&Record> = records.into_iter().collect();
    let mut bytes = serde_json::to_vec_pretty(&records)?;
    bytes.push(b'\n');

    write_atomic(path, &bytes)
}

/// Pretty-prints any value to `path` with the same atomic replace.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<(), WriteError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let io_error = |source| WriteError::Io { path: path.to_path_buf(), source };

    if fs::metadata(path).is_ok_and(|metadata| metadata.is_file() && metadata.permissions().readonly()) {
        return Err(io_error(io::Error::new(io::ErrorKind::PermissionDenied, "file is read-only")));
    }

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(directory).map_err(io_error)?;
    temp.write_all(bytes).map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(path).map_err(|err| io_error(err.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use review_model::BoundingBox;
    use std::fs;

    fn records() -> Vec<Record> {
        let bbox = BoundingBox { x: 1.0, y: 2.0, width: 3.0, height: 4.0 };
        let mut second = Record::new(1, 2, bbox, "bet");
        second.set_correction("beta");
        vec![Record::new(1, 1, bbox, "alpha"), second]
    }

    #[test]
    fn writes_every_record_with_effective_corrected_text() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("out.json");

        save(&records(), &path).expect("save should succeed");

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).expect("read")).expect("json");
        assert_eq!(value.as_array().map(Vec::len), Some(2));
        assert_eq!(value[0]["corrected_text"], "alpha");
        assert_eq!(value[1]["text"], "bet");
        assert_eq!(value[1]["corrected_text"], "beta");
        assert_eq!(value[1]["bbox"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn replaces_existing_file_and_leaves_no_temp_files() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("out.json");
        fs::write(&path, "old contents").expect("seed");

        save(&records(), &path).expect("save should succeed");

        assert_ne!(fs::read_to_string(&path).expect("read"), "old contents");
        let entries = fs::read_dir(temp.path()).expect("list").count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn missing_directory_is_a_write_error() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("no-such-dir").join("out.json");

        let err = save(&records(), &path).expect_err("parent does not exist");
        assert!(matches!(err, WriteError::Io { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn failed_replace_keeps_previous_target() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("out.json");
        fs::create_dir(&path).expect("occupy target with a directory");
        fs::write(path.join("keep.txt"), "untouched").expect("seed");

        let err = save(&records(), &path).expect_err("cannot rename over a directory");
        assert!(matches!(err, WriteError::Io { .. }));
        assert_eq!(fs::read_to_string(path.join("keep.txt")).expect("read"), "untouched");
        assert_eq!(fs::read_dir(temp.path()).expect("list").count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn read_only_directory_fails_and_preserves_existing_bytes() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("temp dir should be created");
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).expect("mkdir");
        let path = locked.join("out.json");
        let original = b"[\n  {\"previous\": true}\n]\n".to_vec();
        fs::write(&path, &original).expect("seed");

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).expect("chmod");

        // Permission bits do not bind a privileged user.
        let scratch = locked.join("scratch");
        if fs::write(&scratch, b"").is_ok() {
            let _ = fs::remove_file(&scratch);
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");
            return;
        }

        let result = save(&records(), &path);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");

        assert!(matches!(result, Err(WriteError::Io { .. })));
        assert_eq!(fs::read(&path).expect("read"), original);
    }

    #[cfg(unix)]
    #[test]
    fn read_only_file_is_refused_and_left_unchanged() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("out.json");
        fs::write(&path, "ORIGINAL").expect("seed");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o444)).expect("chmod");

        let err = save(&records(), &path).expect_err("target is read-only");

        match err {
            WriteError::Io { source, .. } => assert_eq!(source.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read_to_string(&path).expect("read"), "ORIGINAL");
        assert_eq!(fs::read_dir(temp.path()).expect("list").count(), 1);
    }
}
