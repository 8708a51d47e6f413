use object_voice::analysis::{
    analysis_prompt, extract_json, resolve_display_name, AnalysisRecord, Condition, RawAnalysis, Shape,
    DEFAULT_CATEGORY, DEFAULT_CONFIDENCE, DEFAULT_ITEM_NAME,
};
use object_voice::config::PipelineConfig;
use proptest::prelude::*;
use serde_json::{json, Value};

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        (-1.0e6f64..1.0e6).prop_map(|f| json!(f)),
        ".{0,12}".prop_map(Value::String),
    ];
    let keys = prop_oneof![
        Just("is_machine".to_string()),
        Just("is_is_machine".to_string()),
        Just("Shape".to_string()),
        Just("state".to_string()),
        Just("item_name".to_string()),
        Just("confidence".to_string()),
        Just("item_category".to_string()),
        "[a-z]{1,8}",
    ];
    prop::collection::btree_map(keys, leaf, 0..8)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

proptest! {
    #[test]
    fn normalization_is_total(value in arb_json()) {
        let record = RawAnalysis::from_value(&value).normalize();
        prop_assert!(!record.item_name.is_empty());
        prop_assert!(!record.item_category.is_empty());
        prop_assert!((0.0..=1.0).contains(&record.confidence));
    }

    #[test]
    fn display_name_respects_threshold(confidence in 0.0f32..=1.0) {
        let record = AnalysisRecord {
            item_name: "Mug".into(),
            item_category: "container".into(),
            confidence,
            ..AnalysisRecord::default()
        };
        let names = PipelineConfig::default().category_names;
        let display = resolve_display_name(&record, 0.9, &names);
        if confidence >= 0.9 {
            prop_assert_eq!(display, "Mug");
        } else {
            prop_assert_eq!(display, "container");
        }
    }
}

#[test]
fn empty_object_takes_defaults() {
    let record = RawAnalysis::from_value(&json!({})).normalize();
    assert_eq!(record.item_name, DEFAULT_ITEM_NAME);
    assert_eq!(record.item_category, DEFAULT_CATEGORY);
    assert_eq!(record.confidence, DEFAULT_CONFIDENCE);
    assert!(!record.is_machine);
    assert_eq!(record.shape, Shape::Other);
    assert_eq!(record.state, Condition::Normal);
    assert_eq!(record, AnalysisRecord::default());
}

#[test]
fn key_variants_and_coercion() {
    let raw = RawAnalysis::from_value(&json!({
        "is_is_machine": "yes",
        "Shape": "Round-ish",
        "condition": "quite OLD",
        "Item Name": "Thermos",
        "confidence": "85%",
        "category": "Container",
    }));
    let record = raw.normalize();
    assert!(record.is_machine);
    assert_eq!(record.shape, Shape::Round);
    assert_eq!(record.state, Condition::Old);
    assert_eq!(record.item_name, "Thermos");
    assert!((record.confidence - 0.85).abs() < 1e-6);
    assert_eq!(record.item_category, "container");
}

#[test]
fn unparseable_values_fall_back() {
    let record = RawAnalysis::from_value(&json!({
        "is_machine": [1, 2],
        "shape": "blob",
        "state": 3,
        "item_name": "   ",
        "confidence": "very",
    }))
    .normalize();
    assert_eq!(record, AnalysisRecord::default());
}

#[test]
fn display_name_threshold_examples() {
    let names = PipelineConfig::default().category_names;
    let mut record = AnalysisRecord {
        item_name: "Stapler".into(),
        item_category: "stationery".into(),
        confidence: 0.5,
        ..AnalysisRecord::default()
    };
    assert_eq!(resolve_display_name(&record, 0.9, &names), "stationery");
    record.confidence = 0.95;
    assert_eq!(resolve_display_name(&record, 0.9, &names), "Stapler");
    record.confidence = 0.1;
    record.item_category = "unheard-of".into();
    assert_eq!(resolve_display_name(&record, 0.9, &names), "thing");
}

#[test]
fn extracts_fenced_json() {
    let text = "Sure!\n```json\n{\"item_name\": \"Cup\", \"confidence\": 0.7}\n```\nDone.";
    let v = extract_json(text).unwrap();
    assert_eq!(v["item_name"], "Cup");
}

#[test]
fn extracts_inline_object() {
    let v = extract_json("The answer is {\"shape\": \"Sharp\"} as requested").unwrap();
    assert_eq!(v["shape"], "Sharp");
}

#[test]
fn rejects_text_without_object() {
    assert!(extract_json("I cannot see anything").is_none());
    assert!(extract_json("[1, 2, 3]").is_none());
}

#[test]
fn prompt_embeds_hint() {
    let with = analysis_prompt(Some("cup (confidence: 0.89)"));
    assert!(with.contains("cup (confidence: 0.89)"));
    assert!(!with.contains("{hint}"));
    assert_ne!(analysis_prompt(None), with);
}
