//! Age-confirmation gate.
//!
//! The model behind the pipeline can produce adult content, so a sampling
//! request is only dispatched when the caller presents the exact
//! confirmation key produced by [`confirmation_key`] with `is_adult = true`.
//! The key embeds the canonical instructions text; editing that text is
//! treated as tampering.

use crate::error::CoreError;

/// Canonical instructions shown to the user next to the confirmation toggle.
pub const AGE_CHECK_INSTRUCTIONS: &str = "This model can generate NSFW. You must be 18+ to use this model. Toggle below to True to confirm you are 18+.";

/// Prefix of every confirmation key. The confirmed answer is appended.
pub const AGE_CHECK_KEY: &str =
    "I confirm that I am 18+ and acknowledge that the model can generate NSFW. Response: ";

/// Render a boolean the way confirmation keys spell it.
fn answer(is_adult: bool) -> &'static str {
    if is_adult {
        "True"
    } else {
        "False"
    }
}

/// Produce the confirmation key for the given answer.
///
/// Fails with [`CoreError::PolicyViolation`] if `instructions` is not the
/// canonical [`AGE_CHECK_INSTRUCTIONS`] text.
pub fn confirmation_key(instructions: &str, is_adult: bool) -> Result<String, CoreError> {
    if instructions != AGE_CHECK_INSTRUCTIONS {
        return Err(CoreError::PolicyViolation(
            "The age check instructions were modified. Reverse the change or create a new age check"
                .to_string(),
        ));
    }
    Ok(format!("{AGE_CHECK_KEY}{}", answer(is_adult)))
}

/// Accept only the exact confirmed key; everything else is rejected.
pub fn verify_key(key: &str) -> Result<(), CoreError> {
    let confirmed = format!("{AGE_CHECK_KEY}{}", answer(true));
    if key == confirmed {
        Ok(())
    } else {
        Err(CoreError::PolicyViolation(
            "You must be 18+ to sample from this model. Confirm your age with the age check first"
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn confirmed_key_passes_verification() {
        let key = confirmation_key(AGE_CHECK_INSTRUCTIONS, true).unwrap();
        assert!(verify_key(&key).is_ok());
    }

    #[test]
    fn declined_key_fails_verification() {
        let key = confirmation_key(AGE_CHECK_INSTRUCTIONS, false).unwrap();
        assert!(key.ends_with("False"));
        assert_matches!(verify_key(&key), Err(CoreError::PolicyViolation(_)));
    }

    #[test]
    fn modified_instructions_are_rejected() {
        let tampered = format!("{AGE_CHECK_INSTRUCTIONS} (edited)");
        assert_matches!(
            confirmation_key(&tampered, true),
            Err(CoreError::PolicyViolation(_))
        );
    }

    #[test]
    fn near_miss_keys_are_rejected() {
        let keys = [
            String::new(),
            "True".to_string(),
            format!("{AGE_CHECK_KEY}true"),
            format!("{AGE_CHECK_KEY}True "),
            format!(" {AGE_CHECK_KEY}True"),
            format!("{AGE_CHECK_KEY}1"),
            AGE_CHECK_KEY.to_string(),
        ];
        for key in &keys {
            assert!(verify_key(key).is_err(), "key {key:?} should be rejected");
        }
    }
}
