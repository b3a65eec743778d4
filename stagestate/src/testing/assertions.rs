//! Test assertions for errors and envelopes.

use crate::core::Reference;
use crate::envelope::Envelope;
use crate::errors::{ErrorKind, StateError};

/// Asserts that `result` failed with an error of `expected` kind.
pub fn assert_error_kind<T: std::fmt::Debug>(result: &Result<T, StateError>, expected: ErrorKind) {
    match result {
        Ok(value) => panic!("Expected {expected} error, got Ok({value:?})"),
        Err(err) => assert_eq!(
            err.kind(),
            expected,
            "Expected {expected} error, got {}: {err}",
            err.kind()
        ),
    }
}

/// Asserts that the envelope holds `name` and returns it.
pub fn assert_has_reference<'a>(envelope: &'a Envelope, name: &str) -> &'a Reference {
    match envelope.get_reference(name) {
        Some(reference) => reference,
        None => {
            let mut names: Vec<&String> = envelope.references().keys().collect();
            names.sort();
            panic!("Expected reference '{name}', envelope holds {names:?}")
        }
    }
}

/// Asserts that the envelope status equals `expected`.
pub fn assert_status(envelope: &Envelope, expected: &str) {
    assert_eq!(
        envelope.status(),
        expected,
        "Expected status {expected}, got {}",
        envelope.status()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_envelope;

    #[test]
    fn test_assertions_pass() {
        let envelope = sample_envelope();
        assert_has_reference(&envelope, "images_metadata");
        assert_status(&envelope, "IMAGES_FETCHED");
        assert_error_kind::<()>(&Err(StateError::timeout("load", 5)), ErrorKind::Timeout);
    }

    #[test]
    #[should_panic(expected = "Expected reference 'missing'")]
    fn test_missing_reference_panics() {
        assert_has_reference(&sample_envelope(), "missing");
    }

    #[test]
    #[should_panic(expected = "Expected ValidationError error, got Ok")]
    fn test_ok_result_panics() {
        assert_error_kind(&Ok::<u8, StateError>(1), ErrorKind::Validation);
    }
}
