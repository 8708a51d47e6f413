#![allow(dead_code)]

use object_voice::events::{Event, EventSink};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Collects events and lets a test block until one shows up.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    cond: Condvar,
}

impl EventSink for Recorder {
    fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
        self.cond.notify_all();
    }
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn tags(&self) -> Vec<&'static str> {
        self.events().iter().map(Event::tag).collect()
    }

    /// Waits until `count` events satisfy `pred`.
    pub fn wait_for(&self, count: usize, pred: impl Fn(&Event) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut events = self.events.lock().unwrap();
        loop {
            if events.iter().filter(|e| pred(e)).count() >= count {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            events = self.cond.wait_timeout(events, deadline - now).unwrap().0;
        }
    }
}

pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
