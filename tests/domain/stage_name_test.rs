use assessor::domain::{InvalidStageName, StageName};

#[test]
fn given_plain_identifier_when_creating_stage_name_then_succeeds() {
    let name = StageName::new("bias_bot").unwrap();
    assert_eq!(name.as_str(), "bias_bot");
    assert_eq!(name.to_string(), "bias_bot");
}

#[test]
fn given_blank_or_spaced_names_when_creating_stage_name_then_rejects() {
    assert_eq!(StageName::new(""), Err(InvalidStageName(String::new())));
    assert!(StageName::new("  ").is_err());
    assert!(StageName::new(" pico").is_err());
    assert!(StageName::new("risk of bias").is_err());
}

#[test]
fn given_json_string_when_deserializing_then_validation_applies() {
    let ok: Result<StageName, _> = serde_json::from_str("\"pico\"");
    let bad: Result<StageName, _> = serde_json::from_str("\"risk of bias\"");

    assert!(ok.is_ok());
    assert!(bad.is_err());
}
