//! Audio cues played on countdown start and completion.
//!
//! Playback is fire-and-forget: the engine calls [`CuePlayer::play`] after a
//! transition has been applied and only logs a returned error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AudioError;
use crate::storage::config::SoundsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCue {
    Start,
    Alarm,
}

pub trait CuePlayer: Send + Sync {
    /// Begin playing `cue`. Must not block on the sound finishing.
    ///
    /// # Errors
    /// Returns an `AudioError` when playback cannot be started.
    fn play(&self, cue: AudioCue) -> Result<(), AudioError>;
}

impl<P: CuePlayer + ?Sized> CuePlayer for Box<P> {
    fn play(&self, cue: AudioCue) -> Result<(), AudioError> {
        (**self).play(cue)
    }
}

impl<P: CuePlayer + ?Sized> CuePlayer for std::sync::Arc<P> {
    fn play(&self, cue: AudioCue) -> Result<(), AudioError> {
        (**self).play(cue)
    }
}

/// Player used when sound is disabled or no backend is compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPlayer;

impl CuePlayer for NullPlayer {
    fn play(&self, cue: AudioCue) -> Result<(), AudioError> {
        tracing::debug!(?cue, "audio cue (silent)");
        Ok(())
    }
}

/// Resolved locations and volume for the two cues.
#[derive(Debug, Clone, PartialEq)]
pub struct CueSet {
    pub start: PathBuf,
    pub alarm: PathBuf,
    /// 0.0 ..= 1.0
    pub volume: f32,
}

impl CueSet {
    /// Resolve relative paths from `sounds` against `base`.
    pub fn from_config(sounds: &SoundsConfig, base: &Path) -> Self {
        let resolve = |p: &str| {
            let path = PathBuf::from(p);
            if path.is_absolute() {
                path
            } else {
                base.join(path)
            }
        };
        Self {
            start: resolve(&sounds.start),
            alarm: resolve(&sounds.alarm),
            volume: f32::from(sounds.volume.min(100)) / 100.0,
        }
    }

    pub fn path(&self, cue: AudioCue) -> &Path {
        match cue {
            AudioCue::Start => &self.start,
            AudioCue::Alarm => &self.alarm,
        }
    }
}

/// Sound-file player backed by rodio. Each cue plays on its own thread.
#[cfg(feature = "audio")]
#[derive(Debug, Clone)]
pub struct RodioPlayer {
    cues: CueSet,
}

#[cfg(feature = "audio")]
impl RodioPlayer {
    pub fn new(cues: CueSet) -> Self {
        Self { cues }
    }
}

#[cfg(feature = "audio")]
impl CuePlayer for RodioPlayer {
    fn play(&self, cue: AudioCue) -> Result<(), AudioError> {
        let path = self.cues.path(cue).to_path_buf();
        if !path.exists() {
            return Err(AudioError::MissingAsset(path));
        }
        let volume = self.cues.volume;

        std::thread::spawn(move || {
            use rodio::{Decoder, OutputStream, Sink};
            use std::fs::File;
            use std::io::BufReader;

            let (_stream, handle) = match OutputStream::try_default() {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %AudioError::Unavailable(e.to_string()), "cue playback failed");
                    return;
                }
            };
            let source = match File::open(&path)
                .map_err(|e| e.to_string())
                .and_then(|f| Decoder::new(BufReader::new(f)).map_err(|e| e.to_string()))
            {
                Ok(source) => source,
                Err(message) => {
                    tracing::warn!(error = %AudioError::Decode { path, message }, "cue playback failed");
                    return;
                }
            };
            let Ok(sink) = Sink::try_new(&handle) else {
                tracing::warn!("cue playback failed: could not create sink");
                return;
            };

            sink.set_volume(volume);
            sink.append(source);
            sink.sleep_until_end();
        });
        Ok(())
    }
}

/// Build the player the configuration asks for.
pub fn player_from_config(sounds: &SoundsConfig, base: &Path) -> Box<dyn CuePlayer> {
    if !sounds.enabled {
        return Box::new(NullPlayer);
    }
    #[cfg(feature = "audio")]
    {
        Box::new(RodioPlayer::new(CueSet::from_config(sounds, base)))
    }
    #[cfg(not(feature = "audio"))]
    {
        let _ = base;
        tracing::debug!("built without the `audio` feature; cues are silent");
        Box::new(NullPlayer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_cue_paths_resolve_against_base() {
        let sounds = SoundsConfig::default();
        let cues = CueSet::from_config(&sounds, Path::new("/data"));
        assert_eq!(cues.start, PathBuf::from("/data/sounds/start.mp3"));
        assert_eq!(cues.path(AudioCue::Alarm), Path::new("/data/sounds/alarm.mp3"));
        assert!((cues.volume - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn absolute_cue_paths_are_kept() {
        let sounds = SoundsConfig {
            alarm: "/usr/share/sounds/bell.wav".into(),
            volume: 250,
            ..SoundsConfig::default()
        };
        let cues = CueSet::from_config(&sounds, Path::new("/data"));
        assert_eq!(cues.alarm, PathBuf::from("/usr/share/sounds/bell.wav"));
        assert!((cues.volume - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn null_player_never_fails() {
        assert!(NullPlayer.play(AudioCue::Start).is_ok());
        assert!(NullPlayer.play(AudioCue::Alarm).is_ok());
    }
}
