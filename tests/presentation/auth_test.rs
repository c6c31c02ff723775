use assessor::presentation::ApiKeys;

#[test]
fn given_no_keys_when_created_then_gate_is_disabled() {
    let keys = ApiKeys::new(Vec::<String>::new());

    assert!(!keys.is_enabled());
}

#[test]
fn given_padded_and_blank_keys_when_created_then_they_are_normalized() {
    let keys = ApiKeys::new(vec![" alpha ".to_string(), "   ".to_string()]);

    assert!(keys.is_enabled());
    assert!(keys.accepts("alpha"));
    assert!(!keys.accepts(""));
    assert!(!keys.accepts("beta"));
}
