//! Video resources handed to the scene and playback layers.
//!
//! A `VideoResource` pairs imported file metadata with a live
//! `VideoElement` that decodes frames on demand. Elements are shared between
//! the preview controller (which drives their clocks) and the scene (which
//! samples their frames), so they live behind `Arc<Mutex<_>>`.

use parking_lot::{Mutex, RwLock};
use reelcraft_core::{FrameRate, ReelcraftError, Result, SharedFrameBuffer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stream properties read at import time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: FrameRate,
}

impl VideoMetadata {
    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

/// A decoding video source with its own clock.
///
/// Mirrors a media element: it can be played, paused and seeked, and exposes
/// the frame at its current time. Failures are reported per call so callers
/// can log them and carry on with other clips.
pub trait VideoElement: Send {
    /// Native playback position in seconds.
    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, seconds: f64) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    /// Let the element's own clock run for `delta` seconds (no-op while paused).
    fn advance(&mut self, delta: f64);

    fn duration(&self) -> f64;

    fn dimensions(&self) -> (u32, u32);

    /// Frame at the current time, or `None` when nothing can be decoded.
    fn current_frame(&mut self) -> Option<SharedFrameBuffer>;

    /// Drop the decoder and any buffered frames. Later calls fail or return `None`.
    fn release_source(&mut self);

    /// Reopen a released source. The playback position is kept.
    fn reload_source(&mut self) -> Result<()>;

    fn has_source(&self) -> bool;
}

pub type SharedVideoElement = Arc<Mutex<dyn VideoElement>>;

/// Wrap an element for sharing.
pub fn share_element<E: VideoElement + 'static>(element: E) -> SharedVideoElement {
    Arc::new(Mutex::new(element))
}

/// Handle naming an imported file, valid until revoked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tracks which object URLs are still live.
///
/// Cheap to clone; clones share the same set. The video cache revokes a
/// resource's URL when it evicts the resource.
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlRegistry {
    live: Arc<Mutex<HashMap<ObjectUrl, PathBuf>>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, file: &Path) -> ObjectUrl {
        let url = ObjectUrl(format!("blob:reelcraft/{}", uuid::Uuid::new_v4()));
        self.live.lock().insert(url.clone(), file.to_path_buf());
        debug!(%url, file = %file.display(), "object url created");
        url
    }

    /// Returns `false` if the URL was already revoked or never existed.
    pub fn revoke(&self, url: &ObjectUrl) -> bool {
        let removed = self.live.lock().remove(url).is_some();
        if removed {
            debug!(%url, "object url revoked");
        }
        removed
    }

    pub fn is_live(&self, url: &ObjectUrl) -> bool {
        self.live.lock().contains_key(url)
    }

    pub fn resolve(&self, url: &ObjectUrl) -> Option<PathBuf> {
        self.live.lock().get(url).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

/// An imported video.
#[derive(Clone)]
pub struct VideoResource {
    pub id: String,
    pub file: PathBuf,
    pub url: ObjectUrl,
    pub metadata: VideoMetadata,
    pub element: SharedVideoElement,
}

impl VideoResource {
    /// Stop decoding and free the element's buffers.
    pub fn release(&self) {
        let mut element = self.element.lock();
        element.pause();
        element.release_source();
    }
}

impl fmt::Debug for VideoResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoResource")
            .field("id", &self.id)
            .field("file", &self.file)
            .field("url", &self.url)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Imported videos keyed by id.
#[derive(Debug, Default)]
pub struct VideoLibrary {
    resources: HashMap<String, VideoResource>,
    urls: ObjectUrlRegistry,
}

pub type SharedVideoLibrary = Arc<RwLock<VideoLibrary>>;

impl VideoLibrary {
    pub fn new(urls: ObjectUrlRegistry) -> Self {
        Self {
            resources: HashMap::new(),
            urls,
        }
    }

    pub fn urls(&self) -> &ObjectUrlRegistry {
        &self.urls
    }

    /// Register an element under `id`, replacing any previous resource.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        file: impl Into<PathBuf>,
        metadata: VideoMetadata,
        element: SharedVideoElement,
    ) -> VideoResource {
        let id = id.into();
        let file = file.into();
        let url = self.urls.create(&file);
        let resource = VideoResource {
            id: id.clone(),
            file,
            url,
            metadata,
            element,
        };
        if let Some(old) = self.resources.insert(id.clone(), resource.clone()) {
            warn!(video_id = %id, "replacing existing video resource");
            old.release();
            self.urls.revoke(&old.url);
        }
        resource
    }

    /// Probe `path` with ffprobe and open an ffmpeg-backed element for it.
    pub fn import(&mut self, id: impl Into<String>, path: impl AsRef<Path>) -> Result<VideoResource> {
        let path = path.as_ref();
        let probe = crate::probe::MediaProbe::probe(path)?;
        let metadata = probe.video_metadata().ok_or_else(|| {
            ReelcraftError::Media(format!("no video stream in {}", path.display()))
        })?;
        let element = crate::decoder::FfmpegVideo::open(path, metadata)?;
        let resource = self.insert(id, path, metadata, share_element(element));
        info!(video_id = %resource.id, width = metadata.width, height = metadata.height, "video imported");
        Ok(resource)
    }

    pub fn get(&self, id: &str) -> Option<&VideoResource> {
        self.resources.get(id)
    }

    /// Remove a resource without touching its URL.
    ///
    /// The video cache owns URL teardown for cached resources.
    pub fn remove(&mut self, id: &str) -> Option<VideoResource> {
        self.resources.remove(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Elements keyed by video id, for the preview controller.
    pub fn elements(&self) -> HashMap<String, SharedVideoElement> {
        self.resources
            .iter()
            .map(|(id, res)| (id.clone(), Arc::clone(&res.element)))
            .collect()
    }
}
