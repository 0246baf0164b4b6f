//! One explicit, owned state object per live session.
//!
//! `SyncSession` holds every piece of mutable state the synchronization layer
//! has: call buffers, presentation, pending completion and the playback tap.
//! It is driven synchronously with explicit timestamps; the async runtime in
//! `crate::runtime` just decides when each method is called.

use crate::audio_tap::{DEFAULT_SAMPLE_RATE, PlaybackTap};
use crate::completion::{COMPLETE_INTERVIEW, CompletionCoordinator, CompletionRecord};
use crate::event::{InboundEvent, OutboundEvent};
use crate::invocation::{Ingest, ToolCallAssembler, ToolInvocation};
use crate::presentation::{PresentationConfig, PresentationMachine, PresentationState};
use crate::vad::rms;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    pub presentation: PresentationConfig,
    /// Period of the amplitude sampler.
    pub frame_interval: Duration,
    pub sample_rate: u32,
    /// Drop call buffers that stay open longer than this. `None` keeps them
    /// until teardown.
    pub call_buffer_ttl: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            presentation: PresentationConfig::default(),
            frame_interval: Duration::from_millis(16),
            sample_rate: DEFAULT_SAMPLE_RATE,
            call_buffer_ttl: None,
        }
    }
}

/// What the UI is allowed to see.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UiSnapshot {
    pub presentation: PresentationState,
    pub completion: Option<CompletionRecord>,
}

#[derive(Debug)]
pub struct SyncSession {
    config: SyncConfig,
    assembler: ToolCallAssembler,
    presentation: PresentationMachine,
    completion: CompletionCoordinator,
    tap: PlaybackTap,
    outbox: Vec<OutboundEvent>,
}

impl SyncSession {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            assembler: ToolCallAssembler::new(),
            presentation: PresentationMachine::new(config.presentation),
            completion: CompletionCoordinator::new(),
            tap: PlaybackTap::new(config.sample_rate),
            outbox: Vec::new(),
        }
    }

    /// Feeds one inbound event to the call buffers and to the event driver.
    pub fn handle_event(&mut self, event: &InboundEvent, now: Instant) {
        if let Ingest::Finalized(invocation) = self.assembler.ingest(event, now) {
            self.route(invocation);
        }
        if let Some(signal) = event.talk_signal() {
            let busy = self.audio_busy();
            self.presentation.on_talk_signal(signal, now, busy);
        }
        self.observe();
    }

    /// Queues decoded remote audio for the amplitude driver.
    pub fn push_audio(&mut self, samples: &[f32]) {
        self.tap.push(samples);
    }

    /// One frame tick: sample the remote audio and run housekeeping.
    pub fn tick(&mut self, now: Instant) {
        let level = rms(self.tap.next_frame(now));
        self.presentation.on_frame(level, now);
        let busy = self.audio_busy();
        self.presentation.settle(busy);

        if let Some(ttl) = self.config.call_buffer_ttl {
            for expired in self.assembler.store_mut().expire(now, ttl) {
                warn!(
                    call_id = %expired.call_id,
                    tool = %expired.name,
                    buffered = expired.raw.len(),
                    "Tool call never finished, discarding its buffer"
                );
            }
        }
        self.observe();
    }

    pub fn fire_watchdog(&mut self, now: Instant) {
        let busy = self.audio_busy();
        self.presentation.on_watchdog(now, busy);
        self.observe();
    }

    pub fn watchdog_deadline(&self) -> Option<Instant> {
        self.presentation.watchdog().deadline()
    }

    /// Acknowledgments produced since the last drain, in order.
    pub fn drain_outbox(&mut self) -> Vec<OutboundEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Discards all partial and pending state and returns to `entry`.
    pub fn teardown(&mut self) {
        let buffers = self.assembler.reset();
        let had_pending = self.completion.pending().is_some();
        self.presentation.reset();
        self.completion.reset();
        self.tap.reset();
        self.outbox.clear();
        info!(
            discarded_buffers = buffers,
            discarded_completion = had_pending,
            "Sync session state cleared"
        );
    }

    pub fn snapshot(&self) -> UiSnapshot {
        UiSnapshot {
            presentation: self.presentation.state(),
            completion: self.completion.finalized().cloned(),
        }
    }

    pub fn presentation(&self) -> PresentationState {
        self.presentation.state()
    }

    pub fn pending_completion(&self) -> Option<&CompletionRecord> {
        self.completion.pending()
    }

    pub fn buffered_calls(&self) -> usize {
        self.assembler.store().len()
    }

    fn route(&mut self, invocation: ToolInvocation) {
        if invocation.name == COMPLETE_INTERVIEW {
            let ack = self.completion.accept(&invocation);
            self.outbox.push(ack);
        } else {
            debug!(tool = %invocation.name, call_id = %invocation.call_id, "No handler for tool, dropping");
        }
    }

    fn observe(&mut self) {
        self.completion.observe(self.presentation.state());
    }

    fn audio_busy(&self) -> bool {
        self.tap.queued() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionReason;
    use serde_json::{Value, json};

    fn ev(v: Value) -> InboundEvent {
        InboundEvent::from_value(v).unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn feed(session: &mut SyncSession, events: &[Value], now: Instant) {
        for e in events {
            session.handle_event(&ev(e.clone()), now);
        }
    }

    fn completion_events(call_id: &str) -> Vec<Value> {
        vec![
            json!({"type": "response.function_call_arguments.delta", "call_id": call_id, "name": "complete_interview", "delta": "{\"sum"}),
            json!({"type": "response.function_call_arguments.delta", "call_id": call_id, "delta": "mary\":\"Good job\",\"reason\":\"finished_all_questions\"}"}),
            json!({"type": "response.function_call_arguments.done", "call_id": call_id}),
        ]
    }

    fn single_shot_completion(call_id: &str) -> Value {
        json!({"type": "tool_call", "id": call_id, "name": "complete_interview", "arguments": {"reason": "time_up"}})
    }

    #[test]
    fn test_argument_deltas_count_as_talking() {
        let mut session = SyncSession::new(SyncConfig::default());
        feed(&mut session, &completion_events("c1")[..1], Instant::now());
        assert_eq!(session.presentation(), PresentationState::Talking);
    }

    #[test]
    fn test_streamed_completion_becomes_record() {
        let now = Instant::now();
        let mut session = SyncSession::new(SyncConfig::default());
        feed(&mut session, &completion_events("c1"), now);

        assert_eq!(
            session.pending_completion(),
            Some(&CompletionRecord {
                summary: Some("Good job".into()),
                reason: Some(CompletionReason::FinishedAllQuestions),
            })
        );
        assert_eq!(session.drain_outbox(), vec![OutboundEvent::acknowledge("c1")]);
        assert_eq!(session.buffered_calls(), 0);
    }

    #[test]
    fn test_bare_terminal_event_yields_empty_completion() {
        let mut session = SyncSession::new(SyncConfig::default());
        feed(
            &mut session,
            &[json!({"type": "response.function_call_arguments.done", "call_id": "c2", "name": "complete_interview"})],
            Instant::now(),
        );
        assert_eq!(session.pending_completion(), Some(&CompletionRecord::default()));
        assert_eq!(session.drain_outbox().len(), 1);
    }

    #[test]
    fn test_completion_hidden_while_talking() {
        let now = Instant::now();
        let mut session = SyncSession::new(SyncConfig::default());
        feed(&mut session, &[json!({"type": "response.created"})], now);
        feed(&mut session, &completion_events("c1"), now + ms(10));

        assert_eq!(session.drain_outbox().len(), 1);
        for i in 1..50 {
            session.tick(now + ms(16 * i));
            assert!(session.snapshot().completion.is_none());
        }
        assert_eq!(session.presentation(), PresentationState::Talking);

        feed(&mut session, &[json!({"type": "response.done"})], now + ms(900));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.presentation, PresentationState::Idle);
        assert_eq!(snapshot.completion.unwrap().summary.as_deref(), Some("Good job"));
        assert!(session.pending_completion().is_none());
    }

    #[test]
    fn test_completion_while_already_idle_is_visible_at_once() {
        let now = Instant::now();
        let mut session = SyncSession::new(SyncConfig::default());
        feed(&mut session, &[json!({"type": "response.created"}), json!({"type": "response.done"})], now);
        feed(&mut session, &[single_shot_completion("c1")], now);
        assert_eq!(session.presentation(), PresentationState::Idle);
        assert_eq!(session.snapshot().completion.unwrap().reason, Some(CompletionReason::TimeUp));
    }

    #[test]
    fn test_completion_in_entry_waits_for_idle() {
        let now = Instant::now();
        let mut session = SyncSession::new(SyncConfig::default());
        feed(&mut session, &[single_shot_completion("c1")], now);
        assert_eq!(session.presentation(), PresentationState::Entry);
        assert!(session.pending_completion().is_some());
        assert!(session.snapshot().completion.is_none());
    }

    #[test]
    fn test_one_ack_per_completion_and_none_for_other_tools() {
        let now = Instant::now();
        let mut session = SyncSession::new(SyncConfig::default());
        feed(&mut session, &completion_events("c1"), now);
        feed(
            &mut session,
            &[json!({"type": "response.function_call_arguments.done", "call_id": "x", "name": "lookup_weather", "arguments": "{}"})],
            now,
        );
        feed(&mut session, &completion_events("c2"), now);

        let acks = session.drain_outbox();
        let ids: Vec<&str> = acks.iter().map(OutboundEvent::call_id).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert!(session.drain_outbox().is_empty());
    }

    #[test]
    fn test_watchdog_recovers_missing_response_done() {
        let now = Instant::now();
        let mut session = SyncSession::new(SyncConfig::default());
        feed(&mut session, &[json!({"type": "response.created"})], now);
        feed(&mut session, &completion_events("c1"), now);
        assert_eq!(session.watchdog_deadline(), Some(now + ms(4000)));

        session.fire_watchdog(now + ms(4000));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.presentation, PresentationState::Idle);
        assert!(snapshot.completion.is_some());
    }

    #[test]
    fn test_amplitude_driver_through_ticks() {
        let start = Instant::now();
        let mut session = SyncSession::new(SyncConfig {
            sample_rate: 1000,
            ..Default::default()
        });
        session.tick(start);
        session.push_audio(&[0.5; 100]);

        session.tick(start + ms(16));
        assert_eq!(session.presentation(), PresentationState::Talking);

        // The last loud samples play at 112 ms; silence counts from there.
        let mut t = 32;
        while t < 380 {
            session.tick(start + ms(t));
            assert_eq!(session.presentation(), PresentationState::Talking, "at {t} ms");
            t += 16;
        }
        session.tick(start + ms(420));
        assert_eq!(session.presentation(), PresentationState::Idle);
    }

    #[test]
    fn test_event_idle_waits_for_queued_audio() {
        let start = Instant::now();
        let mut session = SyncSession::new(SyncConfig {
            sample_rate: 1000,
            ..Default::default()
        });
        session.tick(start);
        feed(&mut session, &[json!({"type": "response.created"})], start);
        session.push_audio(&[0.5; 200]);
        feed(&mut session, &completion_events("c1"), start);
        feed(&mut session, &[json!({"type": "response.done"})], start + ms(1));

        assert_eq!(session.presentation(), PresentationState::Talking);
        assert!(session.snapshot().completion.is_none());

        let mut t = 16;
        while t <= 1000 {
            session.tick(start + ms(t));
            t += 16;
        }
        assert_eq!(session.presentation(), PresentationState::Idle);
        assert!(session.snapshot().completion.is_some());
    }

    #[test]
    fn test_event_idle_applies_once_quiet_audio_drains() {
        let start = Instant::now();
        let mut session = SyncSession::new(SyncConfig {
            sample_rate: 1000,
            ..Default::default()
        });
        session.tick(start);
        feed(&mut session, &[json!({"type": "response.created"})], start);
        // Below the start threshold, so the detector never engages.
        session.push_audio(&[0.01; 200]);
        feed(&mut session, &[single_shot_completion("c1")], start);
        feed(&mut session, &[json!({"type": "response.done"})], start + ms(1));
        assert_eq!(session.watchdog_deadline(), None);

        let mut t = 16;
        while t < 200 {
            session.tick(start + ms(t));
            assert_eq!(session.presentation(), PresentationState::Talking, "at {t} ms");
            t += 16;
        }
        session.tick(start + ms(240));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.presentation, PresentationState::Idle);
        assert_eq!(snapshot.completion.unwrap().reason, Some(CompletionReason::TimeUp));
    }

    #[test]
    fn test_watchdog_idle_applies_once_quiet_audio_drains() {
        let start = Instant::now();
        let mut session = SyncSession::new(SyncConfig {
            sample_rate: 1000,
            ..Default::default()
        });
        session.tick(start);
        feed(&mut session, &[json!({"type": "response.created"})], start);
        session.push_audio(&[0.01; 5000]);
        feed(&mut session, &[single_shot_completion("c1")], start);

        let mut t = 16;
        while t < 4000 {
            session.tick(start + ms(t));
            t += 16;
        }
        session.fire_watchdog(start + ms(4000));
        assert_eq!(session.presentation(), PresentationState::Talking);
        assert_eq!(session.watchdog_deadline(), None);
        assert!(session.snapshot().completion.is_none());

        while t <= 5100 {
            session.tick(start + ms(t));
            t += 16;
        }
        let snapshot = session.snapshot();
        assert_eq!(snapshot.presentation, PresentationState::Idle);
        assert!(snapshot.completion.is_some());
    }

    #[test]
    fn test_buffer_ttl_expires_abandoned_calls() {
        let start = Instant::now();
        let mut session = SyncSession::new(SyncConfig {
            call_buffer_ttl: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        feed(
            &mut session,
            &[json!({"type": "response.function_call_arguments.delta", "call_id": "c1", "name": "complete_interview", "delta": "{"})],
            start,
        );
        session.tick(start + Duration::from_secs(5));
        assert_eq!(session.buffered_calls(), 1);
        session.tick(start + Duration::from_secs(6));
        assert_eq!(session.buffered_calls(), 0);
    }

    #[test]
    fn test_buffers_persist_without_ttl() {
        let start = Instant::now();
        let mut session = SyncSession::new(SyncConfig::default());
        feed(
            &mut session,
            &[json!({"type": "function_call.delta", "call_id": "c1", "name": "n", "delta": "{"})],
            start,
        );
        session.tick(start + Duration::from_secs(3600));
        assert_eq!(session.buffered_calls(), 1);
    }

    #[test]
    fn test_teardown_clears_everything() {
        let now = Instant::now();
        let mut session = SyncSession::new(SyncConfig::default());
        feed(&mut session, &[json!({"type": "response.created"})], now);
        feed(&mut session, &completion_events("c1"), now);
        feed(
            &mut session,
            &[json!({"type": "function_call.delta", "call_id": "c3", "name": "n", "delta": "{\"half"})],
            now,
        );
        session.push_audio(&[0.3; 64]);

        session.teardown();

        assert_eq!(session.buffered_calls(), 0);
        assert!(session.pending_completion().is_none());
        assert_eq!(session.snapshot(), UiSnapshot::default());
        assert_eq!(session.watchdog_deadline(), None);
        assert!(session.drain_outbox().is_empty());
    }
}
