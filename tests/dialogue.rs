use object_voice::config::DialogueConfig;
use object_voice::dialogue::{parse_dialogue, ChatDialogue, DialogueRequest, SILENT_LINE};
use object_voice::Error;

#[test]
fn splits_on_last_by() {
    let p = parse_dialogue("Stand by me, always. by the loyal umbrella", "nobody");
    assert_eq!(p.text, "Stand by me, always.");
    assert_eq!(p.attribution, "the loyal umbrella");
}

#[test]
fn missing_suffix_uses_default_attribution() {
    let p = parse_dialogue("You never wash me.", "a nameless thing");
    assert_eq!(p.text, "You never wash me.");
    assert_eq!(p.attribution, "a nameless thing");
}

#[test]
fn strips_fences_and_quotes() {
    let p = parse_dialogue("```\n\"Careful with me.\" by an old cup\n```", "x");
    assert_eq!(p.text, "Careful with me.");
    assert_eq!(p.attribution, "an old cup");
}

#[test]
fn empty_reply_becomes_silence() {
    let p = parse_dialogue("   ", "a nameless thing");
    assert_eq!(p.text, SILENT_LINE);
    assert_eq!(p.attribution, "a nameless thing");
}

#[test]
fn fallback_line_round_trips() {
    let p = parse_dialogue(&format!("{SILENT_LINE} by thing"), "a nameless thing");
    assert_eq!(p.text, SILENT_LINE);
    assert_eq!(p.attribution, "thing");
}

#[test]
fn prompt_carries_request_fields() {
    let req = DialogueRequest {
        item_name: "Mug".into(),
        context: "Context: Machine=false, Shape=Round, State=Old.".into(),
        topic: "Morning coffee".into(),
        instruction: Some("Remember the chipped rim.".into()),
    };
    let prompt = req.prompt();
    for part in ["Mug", "Shape=Round", "Morning coffee", "chipped rim"] {
        assert!(prompt.contains(part), "missing {part}");
    }
}

#[test]
fn missing_api_key_is_config_error() {
    let cfg = DialogueConfig {
        api_key_env: "OBJECT_VOICE_TEST_UNSET_KEY".into(),
        ..DialogueConfig::default()
    };
    assert!(matches!(ChatDialogue::new(&cfg), Err(Error::Config(_))));
}
