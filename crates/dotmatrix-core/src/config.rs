use serde::{Deserialize, Serialize};

/// Host-facing knobs shared by the facade and the clock thread.
///
/// Frontends typically deserialize this from their own settings file and pass
/// it to [`crate::gameboy::GameBoy::with_config`]; the core never touches the
/// filesystem or environment for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Host audio sample rate in Hz.
    pub sample_rate: u32,
    /// Capacity of the stereo audio ring, in frames.
    pub audio_queue_frames: usize,
    /// Target display rate. The DMG refreshes at ~59.73 Hz; frontends that
    /// want to sync to a 60 Hz host display can nudge this.
    pub frame_rate: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            // ~92 ms at 44.1 kHz; enough slack for a jittery host callback.
            audio_queue_frames: 4096,
            frame_rate: 59.73,
        }
    }
}
