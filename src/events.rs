//! One-way progress notifications to the controlling process.
//!
//! Each event is one line, `[[TAG]] payload`, flushed as soon as it is
//! written.

use std::fmt;
use std::io::Write;
use std::sync::Mutex;
use tracing::error;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Ready,
    StateStart(String),
    ItemIdentified(Option<String>),
    CaptureComplete(String),
    AnalysisStart,
    AnalysisProgress(u32),
    Credit(String),
    Message(String),
    StateComplete(String),
    Rejected(String),
    Error(String),
}

impl Event {
    pub fn tag(&self) -> &'static str {
        match self {
            Event::Ready => "READY",
            Event::StateStart(_) => "STATE_START",
            Event::ItemIdentified(_) => "ITEM_IDENTIFIED",
            Event::CaptureComplete(_) => "CAPTURE_COMPLETE",
            Event::AnalysisStart => "ANALYSIS_START",
            Event::AnalysisProgress(_) => "ANALYSIS_PROGRESS",
            Event::Credit(_) => "CREDIT",
            Event::Message(_) => "MESSAGE",
            Event::StateComplete(_) => "STATE_COMPLETE",
            Event::Rejected(_) => "REJECTED",
            Event::Error(_) => "ERROR",
        }
    }

    /// Completion or failure of a command.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::StateComplete(_) | Event::Rejected(_) | Event::Error(_)
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[[{}]]", self.tag())?;
        let payload = match self {
            Event::Ready | Event::AnalysisStart => return Ok(()),
            Event::ItemIdentified(class) => class.clone().unwrap_or_else(|| "none".into()),
            Event::AnalysisProgress(n) => n.to_string(),
            Event::StateStart(s)
            | Event::CaptureComplete(s)
            | Event::Credit(s)
            | Event::Message(s)
            | Event::StateComplete(s)
            | Event::Rejected(s)
            | Event::Error(s) => s.replace('\n', " "),
        };
        write!(f, " {payload}")
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Writes events as lines to any writer, flushing each one.
pub struct LineSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> EventSink for LineSink<W> {
    fn emit(&self, event: Event) {
        let mut out = match self.out.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{event}").and_then(|_| out.flush()) {
            error!("failed to write event: {e}");
        }
    }
}

pub fn stdout_sink() -> LineSink<std::io::Stdout> {
    LineSink::new(std::io::stdout())
}
