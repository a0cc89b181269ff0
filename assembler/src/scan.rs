use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::debug;

/// File extensions treated as frames, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("failed to read folder {0}: {1}")]
    ReadDir(String, std::io::Error),
}

/// True if `name` ends with `.<ext>` for one of [`IMAGE_EXTENSIONS`].
/// Works on the raw name bytes, so names that aren't valid UTF-8 still match.
pub fn has_image_extension(name: impl AsRef<OsStr>) -> bool {
    let bytes = name.as_ref().as_encoded_bytes();
    IMAGE_EXTENSIONS.iter().any(|ext| {
        let Some(dot) = bytes.len().checked_sub(ext.len() + 1) else {
            return false;
        };
        bytes[dot] == b'.' && bytes[dot + 1..].eq_ignore_ascii_case(ext.as_bytes())
    })
}

/// Image files directly inside `folder`, sorted by file name.
///
/// Ordering is plain lexicographic on the name, so `img10.png` comes before
/// `img2.png` unless names are zero-padded.
pub fn list_frames(folder: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let entries =
        std::fs::read_dir(folder).map_err(|e| ScanError::ReadDir(folder.display().to_string(), e))?;

    let mut frames: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScanError::ReadDir(folder.display().to_string(), e))?;
        let path = entry.path();
        if !has_image_extension(entry.file_name()) {
            continue;
        }
        if !path.is_file() {
            debug!(path = path.display().to_string(), "skipping non-file entry");
            continue;
        }
        frames.push(path);
    }

    frames.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    fn names(frames: &[PathBuf]) -> Vec<String> {
        frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(has_image_extension("a.png"));
        assert!(has_image_extension("B.JPG"));
        assert!(has_image_extension("c.JpEg"));
        assert!(has_image_extension("d.bmp"));
        assert!(has_image_extension("e.TIFF"));
        assert!(!has_image_extension("f.tif"));
        assert!(!has_image_extension("g.gif"));
        assert!(!has_image_extension("png"));
        assert!(!has_image_extension("notes.txt"));
        assert!(!has_image_extension("archive.png.zip"));
    }

    #[test]
    fn lists_only_images_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.bmp", "a.png", "readme.txt", "B.JPG", "b.jpg"] {
            touch(dir.path(), name);
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let frames = list_frames(dir.path()).unwrap();
        assert_eq!(names(&frames), ["B.JPG", "a.png", "b.jpg", "c.bmp"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_names_are_kept() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let odd = OsStr::from_bytes(b"fr\xffame.PNG");
        std::fs::write(dir.path().join(odd), b"").unwrap();
        std::fs::write(dir.path().join(OsStr::from_bytes(b"n\xfeotes.txt")), b"").unwrap();
        touch(dir.path(), "a.png");

        assert!(has_image_extension(odd));
        let frames = list_frames(dir.path()).unwrap();
        assert_eq!(frames, vec![dir.path().join("a.png"), dir.path().join(odd)]);
    }

    #[test]
    fn ordering_is_lexicographic_not_numeric() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["image2.png", "image10.png", "image1.png"] {
            touch(dir.path(), name);
        }
        let frames = list_frames(dir.path()).unwrap();
        assert_eq!(names(&frames), ["image1.png", "image10.png", "image2.png"]);
    }

    #[test]
    fn empty_folder_yields_no_frames() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "clip.mp4");
        assert!(list_frames(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = list_frames(&dir.path().join("absent"));
        assert!(matches!(result, Err(ScanError::ReadDir(..))));
    }
}
