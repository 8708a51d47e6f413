mod common;

use common::{wait_until, Recorder};
use object_voice::config::Config;
use object_voice::controller::{parse_command, CaptureSession, Command, Controller, Debouncer, InFlight};
use object_voice::events::{Event, EventSink};
use object_voice::history::MessagePair;
use object_voice::{Error, Result};
use proptest::prelude::*;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct SlowSession {
    events: Arc<Recorder>,
    seen: Arc<Mutex<Vec<Option<u32>>>>,
    delay: Duration,
    fail: bool,
}

impl CaptureSession for SlowSession {
    fn capture(&mut self, index: Option<u32>) -> Result<MessagePair> {
        self.seen.lock().unwrap().push(index);
        std::thread::sleep(self.delay);
        if self.fail {
            return Err(Error::Capture("no frame".into()));
        }
        self.events.emit(Event::StateComplete("done".into()));
        Ok(MessagePair {
            image: "capture.jpg".into(),
            message: "hello".into(),
            attribution: "thing".into(),
            timestamp: String::new(),
        })
    }
}

fn start(
    debounce: Duration,
    delay: Duration,
    fail: bool,
) -> (Controller, Arc<Recorder>, Arc<Mutex<Vec<Option<u32>>>>) {
    let rec = Arc::new(Recorder::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let session = SlowSession {
        events: rec.clone(),
        seen: seen.clone(),
        delay,
        fail,
    };
    let sink: Arc<dyn EventSink> = rec.clone();
    let controller = Controller::spawn(sink, debounce, move || Ok(session));
    assert!(rec.wait_for(1, |e| *e == Event::Ready));
    (controller, rec, seen)
}

proptest! {
    #[test]
    fn parses_capture_index(idx in 0u32..10_000) {
        prop_assert_eq!(parse_command(&format!("CAPTURE {idx}")), Some(Command::Capture(Some(idx))));
        prop_assert_eq!(parse_command(&format!("  capture   {idx} \n")), Some(Command::Capture(Some(idx))));
    }
}

#[test]
fn parses_commands() {
    assert_eq!(parse_command("CAPTURE"), Some(Command::Capture(None)));
    assert_eq!(parse_command("QUIT"), Some(Command::Quit));
    assert_eq!(parse_command(""), None);
    assert_eq!(parse_command("   "), None);
    assert_eq!(
        parse_command("CAPTURE front"),
        Some(Command::Unknown("CAPTURE front".into()))
    );
    assert_eq!(parse_command("DANCE"), Some(Command::Unknown("DANCE".into())));
}

#[test]
fn debouncer_drops_repeats_inside_window() {
    let mut d = Debouncer::new(Duration::from_secs(2));
    let t0 = Instant::now();
    assert!(d.admit("CAPTURE", t0));
    assert!(!d.admit("CAPTURE", t0 + Duration::from_millis(500)));
    assert!(d.admit("CAPTURE 1", t0 + Duration::from_millis(600)));
    assert!(d.admit("CAPTURE", t0 + Duration::from_millis(700)));
    assert!(d.admit("CAPTURE", t0 + Duration::from_secs(3)));
}

#[test]
fn debouncer_reset_forgets_last_command() {
    let mut d = Debouncer::new(Duration::from_secs(2));
    let t0 = Instant::now();
    assert!(d.admit("CAPTURE", t0));
    d.reset();
    assert!(d.admit("CAPTURE", t0 + Duration::from_millis(10)));
}

#[test]
fn in_flight_guard_releases_on_drop() {
    let flag = InFlight::default();
    let guard = flag.try_acquire().unwrap();
    assert!(flag.is_set());
    assert!(flag.try_acquire().is_none());
    assert_eq!(flag.finished(), 0);
    drop(guard);
    assert!(!flag.is_set());
    assert_eq!(flag.finished(), 1);
    assert!(flag.try_acquire().is_some());
}

#[test]
fn capture_after_completed_run_is_accepted_with_default_debounce() {
    let window = Duration::from_millis(Config::default().pipeline.debounce_ms);
    assert!(window >= Duration::from_secs(1));
    let (mut controller, rec, seen) = start(window, Duration::ZERO, false);
    controller.handle_line("CAPTURE");
    assert!(rec.wait_for(1, |e| matches!(e, Event::StateComplete(_))));
    assert!(wait_until(|| !controller.is_busy()));
    std::thread::sleep(Duration::from_millis(200));

    controller.handle_line("CAPTURE");
    assert!(rec.wait_for(2, |e| matches!(e, Event::StateComplete(_))));
    controller.shutdown();
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert!(!rec.events().contains(&Event::Rejected("debounced".into())));
}

#[test]
fn concurrent_capture_is_rejected_then_accepted_after_completion() {
    let (mut controller, rec, seen) = start(Duration::ZERO, Duration::from_millis(300), false);
    assert!(controller.handle_line("CAPTURE 0"));
    assert!(controller.handle_line("CAPTURE 1"));
    assert!(rec.wait_for(1, |e| matches!(e, Event::Rejected(r) if r == "busy")));
    assert!(rec.wait_for(1, |e| matches!(e, Event::StateComplete(_))));
    assert!(wait_until(|| !controller.is_busy()));

    assert!(controller.handle_line("CAPTURE 2"));
    assert!(rec.wait_for(2, |e| matches!(e, Event::StateComplete(_))));
    assert!(!controller.handle_line("QUIT"));
    controller.shutdown();

    assert_eq!(*seen.lock().unwrap(), vec![Some(0), Some(2)]);
    let starts = rec
        .events()
        .iter()
        .filter(|e| matches!(e, Event::StateStart(_)))
        .count();
    assert_eq!(starts, 2);
}

#[test]
fn repeated_command_is_debounced() {
    let (mut controller, rec, seen) = start(Duration::from_secs(2), Duration::from_millis(50), false);
    controller.handle_line("CAPTURE");
    controller.handle_line("CAPTURE");
    assert!(rec.wait_for(1, |e| *e == Event::Rejected("debounced".into())));
    controller.shutdown();
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn capture_failure_reports_error_and_clears_flag() {
    let (mut controller, rec, _seen) = start(Duration::ZERO, Duration::ZERO, true);
    controller.handle_line("CAPTURE");
    assert!(rec.wait_for(1, |e| matches!(e, Event::Error(_))));
    assert!(wait_until(|| !controller.is_busy()));
    controller.shutdown();
}

#[test]
fn failed_session_answers_with_errors() {
    let rec = Arc::new(Recorder::default());
    let sink: Arc<dyn EventSink> = rec.clone();
    let mut controller = Controller::spawn(sink, Duration::ZERO, || -> Result<SlowSession> {
        Err(Error::Config("no camera".into()))
    });
    assert!(rec.wait_for(1, |e| matches!(e, Event::Error(_))));
    controller.handle_line("CAPTURE");
    assert!(rec.wait_for(2, |e| matches!(e, Event::Error(_))));
    controller.shutdown();
    assert!(!rec.events().contains(&Event::Ready));
}

#[test]
fn run_stops_at_quit_after_finishing_current_job() {
    let rec = Arc::new(Recorder::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let session = SlowSession {
        events: rec.clone(),
        seen: seen.clone(),
        delay: Duration::from_millis(100),
        fail: false,
    };
    let sink: Arc<dyn EventSink> = rec.clone();
    let controller = Controller::spawn(sink, Duration::ZERO, move || Ok(session));
    controller.run(Cursor::new("\nHELLO\nCAPTURE\nQUIT\nCAPTURE 3\n"));
    assert_eq!(*seen.lock().unwrap(), vec![None]);
    let tags = rec.tags();
    assert!(tags.contains(&"READY"));
    assert_eq!(tags.iter().filter(|t| **t == "STATE_START").count(), 1);
    assert!(!tags.contains(&"REJECTED"));
    assert!(rec.events().contains(&Event::StateComplete("done".into())));
}
