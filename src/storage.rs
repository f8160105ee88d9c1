use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use rand::RngCore;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::forms::{rules::extension, Upload};

/// Where profile pictures live. Stored names are safe to embed in URLs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PictureStore: Send + Sync {
    /// Normalises the upload and stores it under a fresh random name, which is returned.
    async fn save(&self, upload: Upload) -> Result<String, StorageError>;
    /// Deletes a stored picture. The default placeholder is never removed.
    async fn remove(&self, filename: &str) -> Result<(), StorageError>;
    async fn load(&self, filename: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn default_picture(&self) -> String;
}

pub struct FsPictureStore {
    dir: PathBuf,
    size: u32,
    default_picture: String,
}

impl FsPictureStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.picture_dir),
            size: config.picture_size,
            default_picture: config.default_picture.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, filename: &str) -> Result<PathBuf, StorageError> {
        if !is_safe_name(filename) {
            return Err(StorageError::InvalidName(filename.to_string()));
        }
        Ok(self.dir.join(filename))
    }
}

fn is_safe_name(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.starts_with('.')
        && !filename.contains("..")
        && filename.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn random_stem() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn thumbnail(bytes: &[u8], size: u32, format: ImageFormat) -> Result<DynamicImage, StorageError> {
    let img = image::load_from_memory(bytes).map_err(|e| StorageError::InvalidImage(e.to_string()))?;
    let thumb = img.thumbnail(size, size);
    Ok(match format {
        // JPEG has no alpha channel.
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(thumb.to_rgb8()),
        _ => thumb,
    })
}

#[async_trait]
impl PictureStore for FsPictureStore {
    async fn save(&self, upload: Upload) -> Result<String, StorageError> {
        let ext = extension(&upload.filename).unwrap_or_else(|| "png".to_string());
        let format = ImageFormat::from_extension(&ext)
            .ok_or_else(|| StorageError::InvalidImage(format!("unsupported extension .{}", ext)))?;
        let filename = format!("{}.{}", random_stem(), ext);
        let path = self.path_for(&filename)?;
        let size = self.size;

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let img = thumbnail(&upload.bytes, size, format)?;
            img.save_with_format(&path, format)
                .map_err(|e| StorageError::InvalidImage(e.to_string()))
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        debug!("Stored profile picture {}", filename);
        Ok(filename)
    }

    async fn remove(&self, filename: &str) -> Result<(), StorageError> {
        if filename == self.default_picture {
            return Ok(());
        }
        let path = self.path_for(filename)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load(&self, filename: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let Ok(path) = self.path_for(filename) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn default_picture(&self) -> String {
        self.default_picture.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 128]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn store(dir: &Path) -> FsPictureStore {
        FsPictureStore {
            dir: dir.to_path_buf(),
            size: 125,
            default_picture: "default.jpg".into(),
        }
    }

    #[tokio::test]
    async fn test_save_resizes_and_renames() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());

        let name = store.save(Upload::new("me.png", png_bytes(400, 200))).await.unwrap();
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), 16 + 4);

        let saved = image::open(tmp.path().join(&name)).unwrap();
        assert_eq!(saved.width(), 125);
        assert!(saved.height() <= 125);
    }

    #[tokio::test]
    async fn test_save_as_jpeg_drops_alpha() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());

        let name = store.save(Upload::new("ME.JPG", png_bytes(50, 50))).await.unwrap();
        assert!(name.ends_with(".jpg"));
        assert!(store.load(&name).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_names_are_unique() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let a = store.save(Upload::new("a.png", png_bytes(10, 10))).await.unwrap();
        let b = store.save(Upload::new("a.png", png_bytes(10, 10))).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_garbage_upload_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let result = store.save(Upload::new("me.png", b"definitely not a png".to_vec())).await;
        assert!(matches!(result, Err(StorageError::InvalidImage(_))));
    }

    #[tokio::test]
    async fn test_remove_spares_default_and_tolerates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("default.jpg"), b"placeholder").unwrap();
        let store = store(tmp.path());

        store.remove("default.jpg").await.unwrap();
        assert!(tmp.path().join("default.jpg").exists());

        let name = store.save(Upload::new("me.png", png_bytes(10, 10))).await.unwrap();
        store.remove(&name).await.unwrap();
        assert!(store.load(&name).await.unwrap().is_none());
        store.remove(&name).await.unwrap();
    }

    #[tokio::test]
    async fn test_traversal_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        assert!(store.load("../secret").await.unwrap().is_none());
        assert!(matches!(store.remove("../secret").await, Err(StorageError::InvalidName(_))));
        assert!(!is_safe_name(".hidden"));
        assert!(is_safe_name("0a1b2c3d4e5f6789.png"));
    }
}
