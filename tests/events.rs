use object_voice::events::{Event, EventSink, LineSink};

#[test]
fn renders_tagged_lines() {
    assert_eq!(Event::Ready.to_string(), "[[READY]]");
    assert_eq!(Event::ItemIdentified(None).to_string(), "[[ITEM_IDENTIFIED]] none");
    assert_eq!(
        Event::ItemIdentified(Some("cup".into())).to_string(),
        "[[ITEM_IDENTIFIED]] cup"
    );
    assert_eq!(Event::AnalysisProgress(20).to_string(), "[[ANALYSIS_PROGRESS]] 20");
    assert_eq!(
        Event::Message("line one\nline two".into()).to_string(),
        "[[MESSAGE]] line one line two"
    );
}

#[test]
fn terminal_events() {
    assert!(Event::StateComplete(String::new()).is_terminal());
    assert!(Event::Rejected("busy".into()).is_terminal());
    assert!(Event::Error("x".into()).is_terminal());
    assert!(!Event::AnalysisStart.is_terminal());
}

#[test]
fn line_sink_writes_one_line_per_event() {
    let sink = LineSink::new(Vec::new());
    sink.emit(Event::StateStart("capture".into()));
    sink.emit(Event::CaptureComplete("capture_1.jpg".into()));
    let out = String::from_utf8(sink.into_inner()).unwrap();
    assert_eq!(
        out,
        "[[STATE_START]] capture\n[[CAPTURE_COMPLETE]] capture_1.jpg\n"
    );
}
