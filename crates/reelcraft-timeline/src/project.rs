//! Project container.

use reelcraft_core::{FrameRate, ReelcraftError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clip::{AudioTrack, VideoClip};

/// A project: canvas settings plus the clips and audio tracks on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    /// Canvas size in pixels.
    pub width: u32,
    pub height: u32,
    pub fps: FrameRate,
    pub clips: Vec<VideoClip>,
    pub audio_tracks: Vec<AudioTrack>,
}

impl Project {
    /// Vertical 1080x1920 canvas at 30 fps.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            width: 1080,
            height: 1920,
            fps: FrameRate::FPS_30,
            clips: Vec::new(),
            audio_tracks: Vec::new(),
        }
    }

    /// End of the last clip or audio track, in seconds.
    pub fn duration(&self) -> f64 {
        let video = self.clips.iter().map(VideoClip::end_time).fold(0.0, f64::max);
        let audio = self
            .audio_tracks
            .iter()
            .map(AudioTrack::end_time)
            .fold(0.0, f64::max);
        video.max(audio)
    }

    pub fn add_clip(&mut self, clip: VideoClip) -> Result<()> {
        if self.clip(&clip.id).is_some() {
            return Err(ReelcraftError::InvalidParameter(format!(
                "clip {} already exists",
                clip.id
            )));
        }
        if clip.duration <= 0.0 {
            return Err(ReelcraftError::InvalidParameter(format!(
                "clip {} has non-positive duration",
                clip.id
            )));
        }
        self.clips.push(clip);
        Ok(())
    }

    pub fn remove_clip(&mut self, id: &str) -> Option<VideoClip> {
        let index = self.clips.iter().position(|c| c.id == id)?;
        Some(self.clips.remove(index))
    }

    pub fn clip(&self, id: &str) -> Option<&VideoClip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn clip_mut(&mut self, id: &str) -> Option<&mut VideoClip> {
        self.clips.iter_mut().find(|c| c.id == id)
    }

    pub fn active_clips_at(&self, time: f64) -> impl Iterator<Item = &VideoClip> {
        self.clips.iter().filter(move |c| c.is_active_at(time))
    }

    pub fn add_audio_track(&mut self, track: AudioTrack) {
        self.audio_tracks.push(track);
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new("Untitled Project")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_covers_clips_and_audio() {
        let mut project = Project::new("demo");
        assert_eq!(project.duration(), 0.0);
        project.add_clip(VideoClip::new("c1", "v1", 0.0, 5.0)).unwrap();
        project.add_clip(VideoClip::new("c2", "v1", 4.0, 8.0)).unwrap();
        assert_eq!(project.duration(), 12.0);
        project.add_audio_track(AudioTrack::new("a1", 10.0, 5.0));
        assert_eq!(project.duration(), 15.0);
    }

    #[test]
    fn test_duplicate_clip_rejected() {
        let mut project = Project::new("demo");
        project.add_clip(VideoClip::new("c1", "v1", 0.0, 5.0)).unwrap();
        assert!(project.add_clip(VideoClip::new("c1", "v2", 6.0, 1.0)).is_err());
        assert!(project.add_clip(VideoClip::new("c3", "v2", 6.0, 0.0)).is_err());
    }

    #[test]
    fn test_active_clips() {
        let mut project = Project::new("demo");
        project.add_clip(VideoClip::new("c1", "v1", 0.0, 5.0)).unwrap();
        project.add_clip(VideoClip::new("c2", "v1", 5.0, 5.0)).unwrap();
        let ids: Vec<_> = project.active_clips_at(5.0).map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c2"]);
    }

    #[test]
    fn test_json_round_trip() {
        let mut project = Project::new("demo");
        project.add_clip(VideoClip::new("c1", "v1", 0.0, 5.0)).unwrap();
        let back = Project::from_json(&project.to_json().unwrap()).unwrap();
        assert_eq!(back, project);
    }
}
