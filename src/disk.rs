use std::path::Path;

use walkdir::WalkDir;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Human-readable size of everything cached under `models_dir`.
pub fn model_size(models_dir: &Path) -> String {
    if !models_dir.exists() {
        return "Model not downloaded".to_string();
    }
    format!("{:.1} GB", dir_size(models_dir) as f64 / BYTES_PER_GB)
}

/// Total size of regular files below `path`. Symlinks are not followed and
/// entries that cannot be read are skipped.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_dir_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(model_size(&dir.path().join("nope")), "Model not downloaded");
    }

    #[test]
    fn sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.bin"), vec![0u8; 1000]).unwrap();
        fs::write(dir.path().join("a/b/deep.bin"), vec![0u8; 24]).unwrap();

        assert_eq!(dir_size(dir.path()), 1024);
        assert_eq!(model_size(dir.path()), "0.0 GB");
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_counted_or_followed() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("big.bin"), vec![0u8; 4096]).unwrap();
        fs::write(dir.path().join("own.bin"), vec![0u8; 10]).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();

        assert_eq!(dir_size(dir.path()), 10);
    }
}
