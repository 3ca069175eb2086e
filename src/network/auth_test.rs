use crate::StaticTokenValidator;
use crate::TokenValidator;

#[test]
fn test_open_mode_accepts_everything() {
    let validator = StaticTokenValidator::new(None);
    assert!(validator.validate(None));
    assert!(validator.validate(Some("anything")));
}

#[test]
fn test_configured_token_must_match() {
    let validator = StaticTokenValidator::new(Some("s3cret".to_string()));
    assert!(validator.validate(Some("s3cret")));
    assert!(!validator.validate(Some("wrong")));
    assert!(!validator.validate(None));
}
