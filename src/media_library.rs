//! 写真をアルバム（ピクチャフォルダ内のディレクトリ）へ保存する
//!
//! 分類処理とは独立しており、保存の失敗は分類結果に影響しません。

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// アルバムディレクトリのパス
pub fn album_dir(library_root: &Path, album_name: &str) -> Result<PathBuf> {
    let name = album_name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        bail!("invalid album name: {:?}", album_name);
    }
    Ok(library_root.join(name))
}

/// 既存ファイルを上書きしない保存先パスを決める
fn unique_path(dir: &Path, extension: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
    let mut candidate = dir.join(format!("IMG_{}.{}", stamp, extension));
    let mut counter = 1;
    while candidate.exists() {
        candidate = dir.join(format!("IMG_{}_{}.{}", stamp, counter, extension));
        counter += 1;
    }
    candidate
}

/// 画像ファイルをアルバムへコピー
///
/// 保存したファイルのパスを返す。
pub fn save_to_album(library_root: &Path, album_name: &str, source: &Path) -> Result<PathBuf> {
    if !source.is_file() {
        bail!("image file not found: {}", source.display());
    }

    let dir = album_dir(library_root, album_name)?;
    fs::create_dir_all(&dir).context(format!("Failed to create album directory: {:?}", dir))?;

    let extension = source
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_else(|| "jpg".to_string());

    let target = unique_path(&dir, &extension);
    fs::copy(source, &target)
        .context(format!("Failed to copy {:?} to {:?}", source, target))?;

    tracing::info!("写真を保存しました: {}", target.display());
    Ok(target)
}

/// 撮影した画像のバイト列をアルバムへ保存
pub fn save_bytes_to_album(library_root: &Path, album_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let dir = album_dir(library_root, album_name)?;
    fs::create_dir_all(&dir).context(format!("Failed to create album directory: {:?}", dir))?;

    let extension = image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("jpg");

    let target = unique_path(&dir, extension);
    fs::write(&target, bytes).context(format!("Failed to write {:?}", target))?;

    tracing::info!("写真を保存しました: {}", target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_creates_album_and_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("capture.JPG");
        fs::write(&source, b"jpeg bytes").unwrap();

        let library = dir.path().join("Pictures");
        let first = save_to_album(&library, "PestClassification", &source).unwrap();
        let second = save_to_album(&library, "PestClassification", &source).unwrap();

        assert_ne!(first, second);
        assert_eq!(first.parent().unwrap(), library.join("PestClassification"));
        assert_eq!(first.extension().unwrap(), "jpg");
        assert_eq!(fs::read(&second).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn test_save_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = save_to_album(dir.path(), "PestClassification", &dir.path().join("none.jpg"));
        assert!(result.is_err());
        assert!(!dir.path().join("PestClassification").exists());
    }

    #[test]
    fn test_rejects_path_like_album_names() {
        let root = Path::new("/tmp");
        assert!(album_dir(root, "").is_err());
        assert!(album_dir(root, "..").is_err());
        assert!(album_dir(root, "a/b").is_err());
        assert_eq!(album_dir(root, "Pests").unwrap(), root.join("Pests"));
    }

    #[test]
    fn test_save_bytes_guesses_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut png = Vec::new();
        image::DynamicImage::new_rgb8(2, 2)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let saved = save_bytes_to_album(dir.path(), "Album", &png).unwrap();
        assert_eq!(saved.extension().unwrap(), "png");

        let saved = save_bytes_to_album(dir.path(), "Album", b"unknown").unwrap();
        assert_eq!(saved.extension().unwrap(), "jpg");
    }
}
