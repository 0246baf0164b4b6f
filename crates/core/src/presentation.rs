//! The `entry | talking | idle` presentation state and its two drivers.
//!
//! Driver A reads turn-taking hints off the event channel and keeps a fallback
//! watchdog in case the closing event never shows up. Driver B runs voice
//! activity detection on the remote audio every frame. How their writes are
//! reconciled is decided by `Arbitration`.

use crate::event::TalkSignal;
use crate::vad::{VadConfig, VadEdge, VoiceActivityDetector};
use crate::watchdog::Watchdog;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresentationState {
    #[default]
    Entry,
    Talking,
    Idle,
}

impl fmt::Display for PresentationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresentationState::Entry => write!(f, "entry"),
            PresentationState::Talking => write!(f, "talking"),
            PresentationState::Idle => write!(f, "idle"),
        }
    }
}

/// Which driver asked for a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Events,
    Watchdog,
    Amplitude,
}

/// Policy for reconciling the two drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Arbitration {
    /// Event and watchdog idles are deferred while remote audio is still
    /// queued or audible, and applied once it has finished playing.
    #[default]
    AudioAuthoritative,
    /// Both drivers write unconditionally; the latest write wins.
    LastWriterWins,
}

impl FromStr for Arbitration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "audio" | "audio-authoritative" => Ok(Arbitration::AudioAuthoritative),
            "last-writer-wins" | "lww" => Ok(Arbitration::LastWriterWins),
            other => Err(format!("unknown arbitration policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentationConfig {
    pub fallback_idle: Duration,
    pub vad: VadConfig,
    pub arbitration: Arbitration,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            fallback_idle: Duration::from_millis(4000),
            vad: VadConfig::default(),
            arbitration: Arbitration::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PresentationState,
    pub to: PresentationState,
    pub driver: Driver,
}

#[derive(Debug)]
pub struct PresentationMachine {
    state: PresentationState,
    arbitration: Arbitration,
    watchdog: Watchdog,
    vad: VoiceActivityDetector,
    /// An idle write that arrived while audio was playing.
    deferred_idle: Option<Driver>,
}

impl PresentationMachine {
    pub fn new(config: PresentationConfig) -> Self {
        Self {
            state: PresentationState::Entry,
            arbitration: config.arbitration,
            watchdog: Watchdog::new(config.fallback_idle),
            vad: VoiceActivityDetector::new(config.vad),
            deferred_idle: None,
        }
    }

    pub fn state(&self) -> PresentationState {
        self.state
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    pub fn is_voice_active(&self) -> bool {
        self.vad.is_speaking()
    }

    pub fn has_deferred_idle(&self) -> bool {
        self.deferred_idle.is_some()
    }

    /// Driver A. `audio_busy` tells whether remote audio is still waiting to play.
    pub fn on_talk_signal(
        &mut self,
        signal: TalkSignal,
        now: Instant,
        audio_busy: bool,
    ) -> Option<Transition> {
        match signal {
            TalkSignal::Start => {
                self.watchdog.arm(now);
                self.write(PresentationState::Talking, Driver::Events, audio_busy)
            }
            TalkSignal::End => {
                self.watchdog.disarm();
                self.write(PresentationState::Idle, Driver::Events, audio_busy)
            }
        }
    }

    /// Fires the fallback watchdog if it is due.
    pub fn on_watchdog(&mut self, now: Instant, audio_busy: bool) -> Option<Transition> {
        if !self.watchdog.poll_expired(now) {
            return None;
        }
        debug!("Fallback watchdog expired without a closing event");
        self.write(PresentationState::Idle, Driver::Watchdog, audio_busy)
    }

    /// Driver B: one frame's RMS level.
    pub fn on_frame(&mut self, level: f32, now: Instant) -> Option<Transition> {
        match self.vad.observe(level, now)? {
            VadEdge::SpeechStarted => self.write(PresentationState::Talking, Driver::Amplitude, false),
            VadEdge::SpeechEnded => self.write(PresentationState::Idle, Driver::Amplitude, false),
        }
    }

    /// Applies a deferred idle once the remote audio has drained and the
    /// detector is quiet. Called after every frame.
    pub fn settle(&mut self, audio_busy: bool) -> Option<Transition> {
        let driver = self.deferred_idle?;
        if audio_busy || self.vad.is_speaking() {
            return None;
        }
        self.write(PresentationState::Idle, driver, audio_busy)
    }

    pub fn reset(&mut self) {
        self.state = PresentationState::Entry;
        self.watchdog.disarm();
        self.vad.reset();
        self.deferred_idle = None;
    }

    fn write(
        &mut self,
        to: PresentationState,
        driver: Driver,
        audio_busy: bool,
    ) -> Option<Transition> {
        if !self.accepts(to, driver, audio_busy) {
            debug!(?driver, %to, "Idle deferred, remote audio is still playing");
            self.deferred_idle = Some(driver);
            return None;
        }
        // Any accepted write supersedes an idle still waiting on audio.
        self.deferred_idle = None;
        if self.state == to {
            return None;
        }
        let from = std::mem::replace(&mut self.state, to);
        debug!(%from, %to, ?driver, "Presentation state changed");
        Some(Transition { from, to, driver })
    }

    fn accepts(&self, to: PresentationState, driver: Driver, audio_busy: bool) -> bool {
        match (self.arbitration, driver) {
            (Arbitration::LastWriterWins, _) | (_, Driver::Amplitude) => true,
            (Arbitration::AudioAuthoritative, _) => {
                to != PresentationState::Idle || !(audio_busy || self.vad.is_speaking())
            }
        }
    }
}
