//! Key-addressed texture handles shared between caller threads, load
//! workers, and the render thread.
//!
//! Entries keep insertion order, which is what the render driver's
//! "first inserted" binding policy walks. Synchronous creation never
//! replaces an existing key; file and byte loads decode off-thread and the
//! last one to finish wins.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, TryRecvError};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::backend::GpuBackend;
use crate::error::TextureError;
use crate::types::{PixelFormat, TextureDescriptor};

struct TextureEntry<T> {
    key: String,
    texture: T,
}

pub struct TextureCache<B: GpuBackend> {
    backend: Arc<B>,
    entries: Arc<RwLock<Vec<TextureEntry<B::Texture>>>>,
}

impl<B: GpuBackend> Clone for TextureCache<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<B: GpuBackend> TextureCache<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Reads and decodes `path` on a worker thread. A key that is already
    /// cached resolves immediately to the existing handle.
    pub fn load_from_path(
        &self,
        path: impl Into<PathBuf>,
        key: impl Into<String>,
    ) -> TextureLoad<B::Texture> {
        let key = key.into();
        if let Some(texture) = self.get(&key) {
            debug!(key = %key, "texture already cached");
            return TextureLoad::ready(Ok(texture));
        }
        let path = path.into();
        self.spawn_load(key, move || {
            fs::read(&path).map_err(|source| TextureError::Io { path, source })
        })
    }

    /// Decodes encoded image bytes (PNG, JPEG, BMP, GIF) on a worker thread.
    pub fn load_from_bytes(
        &self,
        bytes: impl Into<Vec<u8>>,
        key: impl Into<String>,
    ) -> TextureLoad<B::Texture> {
        let key = key.into();
        if let Some(texture) = self.get(&key) {
            debug!(key = %key, "texture already cached");
            return TextureLoad::ready(Ok(texture));
        }
        let bytes = bytes.into();
        self.spawn_load(key, move || Ok(bytes))
    }

    /// Zero-initialised texture. Returns the existing handle when `key` is
    /// taken. No texels are uploaded; backends clear new textures.
    pub fn create_blank(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        key: impl Into<String>,
    ) -> Result<B::Texture, TextureError> {
        let key = key.into();
        if let Some(texture) = self.get(&key) {
            return Ok(texture);
        }
        let desc = TextureDescriptor::new(key.as_str(), width, height, format);
        desc.upload_len()?;
        let texture = self.backend.create_texture(&desc, None)?;
        Ok(self.insert_if_absent(&key, texture))
    }

    /// Texture from caller-generated texels, tightly packed in `format`.
    pub fn create_with_pixels(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        data: &[u8],
        key: impl Into<String>,
    ) -> Result<B::Texture, TextureError> {
        let key = key.into();
        if let Some(texture) = self.get(&key) {
            return Ok(texture);
        }
        let desc = TextureDescriptor::new(key.as_str(), width, height, format);
        let expected = desc.upload_len()?;
        if data.len() != expected {
            return Err(TextureError::InvalidData {
                expected,
                actual: data.len(),
            });
        }
        let texture = self.backend.create_texture(&desc, Some(data))?;
        Ok(self.insert_if_absent(&key, texture))
    }

    pub fn get(&self, key: &str) -> Option<B::Texture> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.texture.clone())
    }

    /// Stores `texture` under `key`, replacing any previous handle in place.
    pub fn set_texture(&self, texture: B::Texture, key: impl Into<String>) {
        let key = key.into();
        self.insert(&key, texture);
    }

    pub fn remove(&self, key: &str) -> Option<B::Texture> {
        let mut entries = self.entries.write();
        let index = entries.iter().position(|entry| entry.key == key)?;
        Some(entries.remove(index).texture)
    }

    pub fn remove_all(&self) {
        self.entries.write().clear();
    }

    /// Earliest inserted entry still present.
    pub fn first(&self) -> Option<(String, B::Texture)> {
        self.entries
            .read()
            .first()
            .map(|entry| (entry.key.clone(), entry.texture.clone()))
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn insert(&self, key: &str, texture: B::Texture) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => entry.texture = texture,
            None => entries.push(TextureEntry {
                key: key.to_string(),
                texture,
            }),
        }
    }

    /// Inserts unless another writer got there first; returns whichever
    /// handle the cache ends up holding.
    fn insert_if_absent(&self, key: &str, texture: B::Texture) -> B::Texture {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.iter().find(|entry| entry.key == key) {
            return existing.texture.clone();
        }
        entries.push(TextureEntry {
            key: key.to_string(),
            texture: texture.clone(),
        });
        texture
    }

    fn decode_and_insert(&self, key: &str, bytes: &[u8]) -> Result<B::Texture, TextureError> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();
        let desc = TextureDescriptor::new(key, width, height, PixelFormat::Rgba8Unorm);
        let texture = self.backend.create_texture(&desc, Some(image.as_raw()))?;
        self.insert(key, texture.clone());
        debug!(key, width, height, "texture loaded");
        Ok(texture)
    }

    fn spawn_load<F>(&self, key: String, read: F) -> TextureLoad<B::Texture>
    where
        F: FnOnce() -> Result<Vec<u8>, TextureError> + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let cache = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("texture-load-{key}"))
            .spawn(move || {
                let result = read().and_then(|bytes| cache.decode_and_insert(&key, &bytes));
                if let Err(err) = &result {
                    warn!(key = %key, error = %err, "texture load failed");
                }
                // The caller may have dropped its handle; the cache is
                // already updated either way.
                let _ = sender.send(result);
            });
        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn texture load worker");
        }
        TextureLoad::pending(receiver)
    }
}

/// Completion handle for an asynchronous texture load.
pub struct TextureLoad<T> {
    state: LoadState<T>,
}

enum LoadState<T> {
    Ready(Option<Result<T, TextureError>>),
    Pending(Receiver<Result<T, TextureError>>),
}

impl<T> TextureLoad<T> {
    fn ready(result: Result<T, TextureError>) -> Self {
        Self {
            state: LoadState::Ready(Some(result)),
        }
    }

    fn pending(receiver: Receiver<Result<T, TextureError>>) -> Self {
        Self {
            state: LoadState::Pending(receiver),
        }
    }

    /// Non-blocking poll. Returns the result once, then `None`.
    pub fn try_take(&mut self) -> Option<Result<T, TextureError>> {
        match &mut self.state {
            LoadState::Ready(slot) => slot.take(),
            LoadState::Pending(receiver) => {
                let result = match receiver.try_recv() {
                    Ok(result) => result,
                    Err(TryRecvError::Empty) => return None,
                    Err(TryRecvError::Disconnected) => Err(TextureError::WorkerLost),
                };
                self.state = LoadState::Ready(None);
                Some(result)
            }
        }
    }

    /// Blocks until the load finishes. Never call this on the render thread.
    ///
    /// Returns [`TextureError::WorkerLost`] if the worker died or the result
    /// was already taken with [`TextureLoad::try_take`].
    pub fn wait(self) -> Result<T, TextureError> {
        match self.state {
            LoadState::Ready(Some(result)) => result,
            LoadState::Ready(None) => Err(TextureError::WorkerLost),
            LoadState::Pending(receiver) => receiver.recv().unwrap_or(Err(TextureError::WorkerLost)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;
    use crate::backend::mock::MockBackend;

    fn cache() -> TextureCache<MockBackend> {
        TextureCache::new(Arc::new(MockBackend::new()))
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    #[test]
    fn create_blank_twice_returns_same_handle() {
        let cache = cache();
        let first = cache
            .create_blank(4, 2, PixelFormat::Rgba8Unorm, "k")
            .expect("allocate");
        let second = cache
            .create_blank(16, 16, PixelFormat::R8Unorm, "k")
            .expect("existing handle");
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);

        assert!(first.data.is_none(), "blank textures upload nothing");
    }

    #[test]
    fn huge_blank_texture_is_an_allocation_error() {
        let cache = cache();
        let err = cache
            .create_blank(u32::MAX, u32::MAX, PixelFormat::Rgba16Float, "huge")
            .expect_err("overflowing size");
        assert!(matches!(err, TextureError::Allocation { .. }));

        let err = cache
            .create_blank(200_000, 200_000, PixelFormat::Rgba16Float, "huge")
            .expect_err("beyond device limits");
        assert!(matches!(
            err,
            TextureError::Allocation {
                width: 200_000,
                height: 200_000,
                ..
            }
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn huge_pixel_texture_is_an_allocation_error() {
        let cache = cache();
        let err = cache
            .create_with_pixels(u32::MAX, u32::MAX, PixelFormat::Rgba16Float, &[0; 8], "huge")
            .expect_err("overflowing size");
        assert!(matches!(err, TextureError::Allocation { .. }));
        assert!(cache.get("huge").is_none());
    }

    #[test]
    fn remove_then_get_is_absent() {
        let cache = cache();
        cache
            .create_blank(1, 1, PixelFormat::Rgba8Unorm, "k")
            .expect("allocate");
        assert!(cache.remove("k").is_some());
        assert!(cache.get("k").is_none());
        assert!(cache.remove("k").is_none());
    }

    #[test]
    fn allocation_failure_leaves_cache_untouched() {
        let cache = cache();
        let err = cache
            .create_blank(0, 8, PixelFormat::Rgba8Unorm, "empty")
            .expect_err("zero width");
        assert!(matches!(err, TextureError::Allocation { width: 0, height: 8, .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn pixel_data_length_is_checked() {
        let cache = cache();
        let err = cache
            .create_with_pixels(2, 2, PixelFormat::Rg8Unorm, &[0; 7], "ramp")
            .expect_err("short data");
        assert!(matches!(err, TextureError::InvalidData { expected: 8, actual: 7 }));

        let ramp: Vec<u8> = (0..8).collect();
        let texture = cache
            .create_with_pixels(2, 2, PixelFormat::Rg8Unorm, &ramp, "ramp")
            .expect("valid data");
        assert_eq!(texture.data.as_deref(), Some(&ramp));
    }

    #[test]
    fn load_from_bytes_decodes_and_caches() {
        let cache = cache();
        let texture = cache
            .load_from_bytes(png_bytes(3, 2), "swatch")
            .wait()
            .expect("decode png");
        assert_eq!(texture.desc.width, 3);
        assert_eq!(texture.desc.height, 2);
        assert_eq!(texture.desc.format, PixelFormat::Rgba8Unorm);
        assert_eq!(cache.get("swatch"), Some(texture.clone()));

        let data = texture.data.expect("uploaded texels");
        assert_eq!(&data[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn cached_key_resolves_without_worker() {
        let cache = cache();
        let blank = cache
            .create_blank(1, 1, PixelFormat::Rgba8Unorm, "k")
            .expect("allocate");
        let mut load = cache.load_from_bytes(b"not an image".to_vec(), "k");
        let result = load.try_take().expect("resolved immediately");
        assert_eq!(result.expect("existing handle"), blank);
        assert!(load.try_take().is_none());
    }

    #[test]
    fn undecodable_bytes_report_decode_error() {
        let cache = cache();
        let err = cache
            .load_from_bytes(b"definitely not a png".to_vec(), "bad")
            .wait()
            .expect_err("garbage input");
        assert!(matches!(err, TextureError::Decode(_)));
        assert!(cache.get("bad").is_none());
    }

    #[test]
    fn missing_file_reports_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.png");
        let err = cache()
            .load_from_path(&path, "missing")
            .wait()
            .expect_err("no such file");
        match err {
            TextureError::Io { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("swatch.png");
        fs::write(&path, png_bytes(5, 7)).expect("write png");

        let cache = cache();
        let texture = cache.load_from_path(&path, "swatch").wait().expect("load");
        assert_eq!((texture.desc.width, texture.desc.height), (5, 7));
        assert_eq!(cache.keys(), vec!["swatch".to_string()]);
    }

    #[test]
    fn first_follows_insertion_order() {
        let cache = cache();
        for key in ["zeta", "alpha", "mid"] {
            cache
                .create_blank(1, 1, PixelFormat::Rgba8Unorm, key)
                .expect("allocate");
        }
        assert_eq!(cache.first().map(|(key, _)| key), Some("zeta".to_string()));

        cache.remove("zeta");
        assert_eq!(cache.first().map(|(key, _)| key), Some("alpha".to_string()));

        cache.remove_all();
        assert!(cache.first().is_none());
    }

    #[test]
    fn set_texture_replaces_in_place() {
        let cache = cache();
        let a = cache
            .create_blank(1, 1, PixelFormat::Rgba8Unorm, "a")
            .expect("allocate");
        let b = cache
            .create_blank(2, 2, PixelFormat::Rgba8Unorm, "b")
            .expect("allocate");
        cache.set_texture(b.clone(), "a");
        assert_eq!(cache.get("a"), Some(b.clone()));
        assert_eq!(cache.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_ne!(cache.get("a"), Some(a));
    }
}
