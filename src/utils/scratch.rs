// Scratch-file handling for per-request uploads and word crops

use std::path::{Path, PathBuf};
use tracing::warn;

const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Check whether an uploaded filename carries an allowed image extension.
pub fn is_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(stem, ext)| {
            !stem.is_empty() && ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str())
        })
        .unwrap_or(false)
}

/// Reduce an uploaded filename to a safe basename: path components are
/// stripped, anything outside `[A-Za-z0-9._-]` is replaced with `_`, and
/// leading dots are dropped so the result can never escape the upload
/// directory or hide itself.
pub fn sanitize_filename(filename: &str) -> String {
    let basename = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let cleaned: String = basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Directory the word crops for `image_path` are written to.
pub fn words_dir_for(image_path: &Path, output_root: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    output_root.join(format!("{stem}_words"))
}

/// Removes the saved upload and the per-image crop directory when dropped,
/// so every exit path of the request handler cleans up after itself.
pub struct ScratchGuard {
    upload_path: PathBuf,
    words_dir: PathBuf,
}

impl ScratchGuard {
    pub fn new(upload_path: PathBuf, words_dir: PathBuf) -> Self {
        Self {
            upload_path,
            words_dir,
        }
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if self.upload_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.upload_path) {
                warn!("Failed to remove upload {}: {}", self.upload_path.display(), e);
            }
        }
        if self.words_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.words_dir) {
                warn!("Failed to remove crop dir {}: {}", self.words_dir.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check() {
        assert!(is_allowed_extension("note.png"));
        assert!(is_allowed_extension("note.JPG"));
        assert!(is_allowed_extension("a.b.jpeg"));
        assert!(!is_allowed_extension("note.gif"));
        assert!(!is_allowed_extension("note"));
        assert!(!is_allowed_extension(".png"));
    }

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_filename("note.png"), "note.png");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("dir\\evil name.png"), "evil_name.png");
        assert_eq!(sanitize_filename(".hidden.png"), "hidden.png");
        assert_eq!(sanitize_filename("¡hola!.jpg"), "_hola_.jpg");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[test]
    fn words_dir_uses_image_stem() {
        let dir = words_dir_for(Path::new("/tmp/uploads/note.png"), Path::new("./output"));
        assert_eq!(dir, PathBuf::from("./output/note_words"));
    }

    #[test]
    fn guard_removes_upload_and_crop_dir() {
        let root = tempfile::tempdir().unwrap();
        let upload = root.path().join("note.png");
        let words = root.path().join("note_words");
        std::fs::write(&upload, b"fake").unwrap();
        std::fs::create_dir_all(&words).unwrap();
        std::fs::write(words.join("1.png"), b"crop").unwrap();

        drop(ScratchGuard::new(upload.clone(), words.clone()));

        assert!(!upload.exists());
        assert!(!words.exists());
    }

    #[test]
    fn guard_tolerates_missing_paths() {
        let root = tempfile::tempdir().unwrap();
        drop(ScratchGuard::new(
            root.path().join("never-written.png"),
            root.path().join("never-created_words"),
        ));
    }
}
