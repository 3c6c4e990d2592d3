//! Integration test: continuous capture across engine restarts and message sends.
//!
//! Verifies that:
//! 1. Results arriving inside the ignore window after a send are discarded
//! 2. Results after the window are accepted again
//! 3. Auto-restart follows engine `End` only while the user still wants capture
//! 4. Reported state converges to intent once every acknowledgement is delivered

use persona_voice::{
    CaptureEngine, CaptureErrorCode, CaptureEvent, CaptureState, VoiceCaptureController,
    VoiceResult,
};
use std::collections::VecDeque;
use std::time::Duration;

/// Engine that queues the acknowledgements a real engine would emit.
#[derive(Default)]
struct ScriptedEngine {
    pending: VecDeque<CaptureEvent>,
    starts: usize,
    stops: usize,
}

impl CaptureEngine for ScriptedEngine {
    fn start(&mut self) -> VoiceResult<()> {
        self.starts += 1;
        self.pending.push_back(CaptureEvent::Started);
        Ok(())
    }

    fn stop(&mut self) -> VoiceResult<()> {
        self.stops += 1;
        self.pending.push_back(CaptureEvent::End);
        Ok(())
    }
}

/// Deliver every queued acknowledgement, including ones queued by restarts.
fn pump(c: &mut VoiceCaptureController<ScriptedEngine>) {
    while let Some(ev) = c.engine_mut().pending.pop_front() {
        c.handle_event(ev);
    }
}

fn result(finalized: &[&str], interim: &str) -> CaptureEvent {
    CaptureEvent::Result {
        finalized: finalized.iter().map(|s| s.to_string()).collect(),
        interim: interim.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn results_inside_ignore_window_are_dropped() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut c = VoiceCaptureController::with_ignore_window(ScriptedEngine::default(), Duration::from_millis(500));
    let rx = c.subscribe();

    c.toggle().unwrap();
    c.handle_event(CaptureEvent::Started);
    c.handle_event(result(&["send this"], ""));
    assert_eq!(*rx.borrow(), "send this");

    c.on_message_sent();
    assert_eq!(*rx.borrow(), "");
    assert!(c.ignore_results());

    tokio::time::advance(Duration::from_millis(100)).await;
    assert!(c.handle_event(result(&["late words"], "")).is_none());
    assert_eq!(*rx.borrow(), "");

    c.handle_event(CaptureEvent::End);
    assert_eq!(c.state(), CaptureState::Idle);
    assert_eq!(c.engine().starts, 1);

    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(!c.ignore_results());
    c.toggle().unwrap();
    c.handle_event(CaptureEvent::Started);
    assert_eq!(c.handle_event(result(&["next message"], "")).as_deref(), Some("next message"));
}

#[tokio::test(start_paused = true)]
async fn send_while_idle_clears_text_without_gate() {
    let mut c = VoiceCaptureController::new(ScriptedEngine::default());
    c.set_base_text("typed");
    c.on_message_sent();
    assert!(!c.ignore_results());
    assert_eq!(c.current_text(), "");
    assert_eq!(c.engine().stops, 0);
}

#[test]
fn state_converges_to_intent_after_acknowledgements() {
    let mut c = VoiceCaptureController::new(ScriptedEngine::default());

    // Start, stop while still starting, start again; acknowledgements arrive late.
    c.toggle().unwrap();
    c.toggle().unwrap();
    c.toggle().unwrap();
    pump(&mut c);
    assert!(c.intent());
    assert!(c.is_settled());
    assert_eq!(c.state(), CaptureState::Listening);

    // Engine ends on its own: restart, then settle again.
    c.handle_event(CaptureEvent::End);
    assert!(!c.is_settled());
    pump(&mut c);
    assert!(c.is_settled());
    assert_eq!(c.engine().starts, 3);

    c.toggle().unwrap();
    pump(&mut c);
    assert!(c.is_settled());
    assert_eq!(c.state(), CaptureState::Idle);
}

#[test]
fn engine_error_is_terminal_until_user_restarts() {
    let mut c = VoiceCaptureController::new(ScriptedEngine::default());
    c.toggle().unwrap();
    c.handle_event(CaptureEvent::Started);
    c.handle_event(CaptureEvent::Error(CaptureErrorCode::from_platform("network")));
    c.handle_event(CaptureEvent::End);
    assert_eq!(c.engine().starts, 1);
    assert_eq!(c.last_error(), Some(CaptureErrorCode::Network));

    c.toggle().unwrap();
    assert_eq!(c.engine().starts, 2);
    assert_eq!(c.last_error(), None);
}

#[test]
fn shutdown_stops_active_capture() {
    let mut c = VoiceCaptureController::new(ScriptedEngine::default());
    c.toggle().unwrap();
    c.handle_event(CaptureEvent::Started);
    c.shutdown();
    assert!(!c.intent());
    assert!(!c.is_listening());
    assert_eq!(c.engine().stops, 1);
}
