//! Real-time preview playback.
//!
//! The controller owns the playhead and drives every clip's video element
//! from it. The host calls [`PreviewController::update`] once per frame
//! with the elapsed seconds. Element failures never escape: they are
//! recorded in the [`ErrorLog`] and the remaining clips carry on.

use crate::error_log::{ErrorCategory, ErrorLog};
use crate::state::{PlaybackEvent, PlaybackState};
use crossbeam_channel::{Receiver, Sender};
use reelcraft_core::{budget, ReelcraftError, Result};
use reelcraft_media::{SharedVideoElement, SharedVideoLibrary};
use reelcraft_scene::{SharedScene, SyncMode};
use reelcraft_timeline::{Project, VideoClip};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct ClipBinding {
    clip: VideoClip,
    element: Option<SharedVideoElement>,
}

pub struct PreviewController {
    state: PlaybackState,
    current_time: f64,
    duration: f64,
    playback_rate: f64,
    bindings: Vec<ClipBinding>,
    library: SharedVideoLibrary,
    scene: Option<SharedScene>,
    errors: ErrorLog,
    subscribers: Vec<Sender<PlaybackEvent>>,
}

impl PreviewController {
    pub fn new(library: SharedVideoLibrary) -> Self {
        Self {
            state: PlaybackState::Stopped,
            current_time: 0.0,
            duration: 0.0,
            playback_rate: 1.0,
            bindings: Vec::new(),
            library,
            scene: None,
            errors: ErrorLog::default(),
            subscribers: Vec::new(),
        }
    }

    /// Push every time change into `scene`. The scene sees the new time
    /// before elements are synced, so it can reopen evicted sources first.
    pub fn with_scene(mut self, scene: SharedScene) -> Self {
        self.scene = Some(scene);
        self
    }

    pub fn attach_scene(&mut self, scene: SharedScene) {
        self.scene = Some(scene);
    }

    /// Replace the clips being previewed. Elements are looked up in the
    /// library by video id.
    pub fn set_timeline(&mut self, clips: Vec<VideoClip>, duration: f64) {
        let library = self.library.read();
        self.bindings = clips
            .into_iter()
            .map(|clip| {
                let element = library.get(&clip.video_id).map(|r| Arc::clone(&r.element));
                if element.is_none() {
                    warn!(clip_id = %clip.id, video_id = %clip.video_id, "no video for clip");
                }
                ClipBinding { clip, element }
            })
            .collect();
        drop(library);

        self.duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        self.current_time = self.current_time.min(self.duration);
        debug!(clips = self.bindings.len(), duration = self.duration, "timeline set");
        self.push_scene_time();
        self.sync_videos(true);
    }

    pub fn load_project(&mut self, project: &Project) {
        self.set_timeline(project.clips.clone(), project.duration());
    }

    /// Start playback, rewinding first when at the end.
    pub fn play(&mut self) {
        if self.state == PlaybackState::Playing {
            return;
        }
        if self.current_time >= self.duration {
            self.current_time = 0.0;
        }
        self.set_state(PlaybackState::Playing);
        self.push_scene_time();
        self.sync_videos(false);
        info!(time = self.current_time, "playback started");
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.set_state(PlaybackState::Paused);
        self.pause_all();
        debug!(time = self.current_time, "playback paused");
    }

    /// Rewind to 0 and park every element on its clip's first frame.
    pub fn stop(&mut self) {
        self.current_time = 0.0;
        self.set_state(PlaybackState::Stopped);
        self.pause_all();
        for binding in &self.bindings {
            let Some(element) = &binding.element else {
                continue;
            };
            let mut element = element.lock();
            // Evicted sources are reopened by the scene when their clip is shown.
            if !element.has_source() {
                continue;
            }
            if let Err(err) = element.set_current_time(binding.clip.trim_start) {
                self.errors.record(
                    ErrorCategory::VideoSync,
                    err.to_string(),
                    Some(&binding.clip.id),
                    0.0,
                );
            }
        }
        self.push_scene_time();
        self.emit(PlaybackEvent::TimeUpdated { time: 0.0 });
        debug!("playback stopped");
    }

    /// Jump to `time`, clamped to the timeline.
    ///
    /// While playing, elements are paused around the seek and resumed after,
    /// so the state stays `Playing` throughout.
    pub fn seek(&mut self, time: f64) {
        let time = if time.is_nan() { 0.0 } else { time.clamp(0.0, self.duration) };
        let playing = self.state == PlaybackState::Playing;
        if playing {
            self.pause_all();
        }
        self.current_time = time;
        self.push_scene_time();
        self.sync_videos(true);
        self.emit(PlaybackEvent::TimeUpdated { time });
        debug!(time, resumed = playing, "seek");
    }

    /// Advance the playhead by `delta` seconds of wall time.
    pub fn update(&mut self, delta: f64) {
        if self.state != PlaybackState::Playing || !delta.is_finite() || delta < 0.0 {
            return;
        }
        let step = delta * self.playback_rate;
        let next = self.current_time + step;

        if next >= self.duration {
            self.current_time = self.duration;
            self.set_state(PlaybackState::Paused);
            self.pause_all();
            self.push_scene_time();
            self.emit(PlaybackEvent::TimeUpdated { time: self.duration });
            self.emit(PlaybackEvent::Ended { time: self.duration });
            info!(duration = self.duration, "playback ended");
            return;
        }

        self.advance_elements(step);
        self.current_time = next;
        self.push_scene_time();
        self.sync_videos(false);
        self.emit(PlaybackEvent::TimeUpdated { time: next });
    }

    /// Receive state, time and end notifications.
    pub fn subscribe(&mut self) -> Receiver<PlaybackEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn set_playback_rate(&mut self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ReelcraftError::InvalidParameter(format!(
                "playback rate must be positive, got {rate}"
            )));
        }
        self.playback_rate = rate;
        Ok(())
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    #[inline]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    #[inline]
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    #[inline]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut ErrorLog {
        &mut self.errors
    }

    /// Run element clocks forward. Elements shared by several clips advance once.
    fn advance_elements(&self, step: f64) {
        let mut advanced = HashSet::new();
        for binding in &self.bindings {
            let Some(element) = &binding.element else {
                continue;
            };
            if advanced.insert(Arc::as_ptr(element) as *const ()) {
                element.lock().advance(step);
            }
        }
    }

    /// Bring elements in line with the playhead.
    ///
    /// Inactive clips are handled first so an element shared with an active
    /// clip ends up following the active one. Active elements are seeked
    /// when `force` is set or they drifted past the tolerance, and started
    /// while playing.
    fn sync_videos(&mut self, force: bool) {
        let time = self.current_time;
        let playing = self.state == PlaybackState::Playing;

        for binding in self.bindings.iter().filter(|b| !b.clip.is_active_at(time)) {
            if let Some(element) = &binding.element {
                let mut element = element.lock();
                if !element.is_paused() {
                    element.pause();
                }
            }
        }

        for binding in self.bindings.iter().filter(|b| b.clip.is_active_at(time)) {
            let Some(element) = &binding.element else {
                continue;
            };
            let clip = &binding.clip;
            let local = clip.local_time(time);
            let mut element = element.lock();

            let drift = (element.current_time() - local).abs();
            if force || drift > budget::SYNC_TOLERANCE_SECS {
                if let Err(err) = element.set_current_time(local) {
                    warn!(clip_id = %clip.id, error = %err, "video sync failed");
                    self.errors
                        .record(ErrorCategory::VideoSync, err.to_string(), Some(&clip.id), time);
                }
            }

            if playing && element.is_paused() {
                if let Err(err) = element.play() {
                    warn!(clip_id = %clip.id, error = %err, "video play failed");
                    self.errors
                        .record(ErrorCategory::Playback, err.to_string(), Some(&clip.id), time);
                }
            }
        }
    }

    fn pause_all(&self) {
        for element in self.bindings.iter().filter_map(|b| b.element.as_ref()) {
            element.lock().pause();
        }
    }

    fn push_scene_time(&mut self) {
        let Some(scene) = &self.scene else {
            return;
        };
        if let Err(err) = scene.lock().set_time(self.current_time, SyncMode::Passive) {
            warn!(error = %err, "scene update failed");
            self.errors
                .record(ErrorCategory::from(&err), err.to_string(), None, self.current_time);
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state == state {
            return;
        }
        let from = self.state;
        self.state = state;
        self.emit(PlaybackEvent::StateChanged { from, to: state });
    }

    fn emit(&mut self, event: PlaybackEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }
}

impl std::fmt::Debug for PreviewController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewController")
            .field("state", &self.state)
            .field("current_time", &self.current_time)
            .field("duration", &self.duration)
            .field("playback_rate", &self.playback_rate)
            .field("clips", &self.bindings.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use reelcraft_core::FrameRate;
    use reelcraft_media::{
        share_element, ObjectUrlRegistry, PatternVideo, VideoLibrary, VideoMetadata,
    };

    const META: VideoMetadata = VideoMetadata {
        duration: 60.0,
        width: 8,
        height: 8,
        fps: FrameRate::FPS_30,
    };

    fn controller() -> (PreviewController, SharedVideoLibrary) {
        let library = Arc::new(RwLock::new(VideoLibrary::new(ObjectUrlRegistry::new())));
        library
            .write()
            .insert("v1", "/media/v1.mp4", META, share_element(PatternVideo::new(META)));
        library
            .write()
            .insert("v2", "/media/v2.mp4", META, share_element(PatternVideo::new(META)));
        let mut preview = PreviewController::new(Arc::clone(&library));
        let mut late = VideoClip::new("c2", "v2", 10.0, 5.0);
        late.trim_start = 2.0;
        preview.set_timeline(vec![VideoClip::new("c1", "v1", 0.0, 10.0), late], 20.0);
        (preview, library)
    }

    fn element(library: &SharedVideoLibrary, id: &str) -> SharedVideoElement {
        Arc::clone(&library.read().get(id).unwrap().element)
    }

    #[test]
    fn test_seek_clamps() {
        let (mut preview, _library) = controller();
        preview.seek(-5.0);
        assert_eq!(preview.current_time(), 0.0);
        preview.seek(25.0);
        assert_eq!(preview.current_time(), 20.0);
    }

    #[test]
    fn test_seek_while_playing_stays_playing() {
        let (mut preview, library) = controller();
        let events = preview.subscribe();
        preview.play();
        while events.try_recv().is_ok() {}

        preview.seek(12.0);
        assert_eq!(preview.state(), PlaybackState::Playing);
        let received: Vec<_> = events.try_iter().collect();
        assert!(received
            .iter()
            .all(|e| !matches!(e, PlaybackEvent::StateChanged { .. })));

        let v2 = element(&library, "v2");
        assert!((v2.lock().current_time() - 4.0).abs() < 1e-9);
        assert!(!v2.lock().is_paused());
        assert!(element(&library, "v1").lock().is_paused());
    }

    #[test]
    fn test_play_from_end_rewinds() {
        let (mut preview, _library) = controller();
        preview.seek(20.0);
        preview.play();
        assert_eq!(preview.current_time(), 0.0);
        assert!(preview.is_playing());
    }

    #[test]
    fn test_pause_is_noop_when_stopped() {
        let (mut preview, _library) = controller();
        preview.pause();
        assert_eq!(preview.state(), PlaybackState::Stopped);
        preview.play();
        preview.pause();
        assert_eq!(preview.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_update_reaches_end() {
        let (mut preview, _library) = controller();
        let events = preview.subscribe();
        preview.play();
        preview.update(19.0);
        assert!(preview.is_playing());
        preview.update(5.0);
        assert_eq!(preview.state(), PlaybackState::Paused);
        assert_eq!(preview.current_time(), 20.0);
        assert!(events
            .try_iter()
            .any(|e| e == PlaybackEvent::Ended { time: 20.0 }));
    }

    #[test]
    fn test_update_respects_rate() {
        let (mut preview, _library) = controller();
        preview.set_playback_rate(2.0).unwrap();
        assert!(preview.set_playback_rate(0.0).is_err());
        preview.play();
        preview.update(1.5);
        assert!((preview.current_time() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_small_drift_is_not_reseeked() {
        let (mut preview, library) = controller();
        preview.play();
        let v1 = element(&library, "v1");
        // The element is slightly ahead of the playhead, within tolerance.
        v1.lock().set_current_time(0.05).unwrap();
        preview.update(0.5);
        assert!((v1.lock().current_time() - 0.55).abs() < 1e-9);

        v1.lock().set_current_time(5.0).unwrap();
        preview.update(0.5);
        assert!((v1.lock().current_time() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_rewinds_elements() {
        let (mut preview, library) = controller();
        preview.seek(12.0);
        preview.stop();
        assert_eq!(preview.state(), PlaybackState::Stopped);
        assert_eq!(preview.current_time(), 0.0);
        assert_eq!(element(&library, "v1").lock().current_time(), 0.0);
        assert_eq!(element(&library, "v2").lock().current_time(), 2.0);
    }

    #[test]
    fn test_failing_element_does_not_stop_others() {
        let library = Arc::new(RwLock::new(VideoLibrary::new(ObjectUrlRegistry::new())));
        let mut broken = PatternVideo::new(META);
        broken.set_fail_play(true);
        library.write().insert("bad", "/media/bad.mp4", META, share_element(broken));
        library
            .write()
            .insert("good", "/media/good.mp4", META, share_element(PatternVideo::new(META)));

        let mut preview = PreviewController::new(Arc::clone(&library));
        preview.set_timeline(
            vec![
                VideoClip::new("a", "bad", 0.0, 10.0),
                VideoClip::new("b", "good", 0.0, 10.0),
            ],
            10.0,
        );
        preview.play();
        assert!(preview.is_playing());
        assert!(!element(&library, "good").lock().is_paused());
        assert_eq!(preview.errors().count(ErrorCategory::Playback), 1);
    }
}
