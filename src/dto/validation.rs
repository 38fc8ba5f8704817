//! Validation helpers for DTOs.

use std::collections::HashSet;

use validator::ValidationError;

/// Validates a match roster: every name non-blank once trimmed, and no two
/// names equal ignoring case.
///
/// # Examples
///
/// ```ignore
/// validate_player_names(&["Alice".into(), "Bob".into()])   // Ok
/// validate_player_names(&["Alice".into(), " alice".into()]) // Err - duplicate
/// validate_player_names(&["  ".into()])                    // Err - blank
/// ```
pub fn validate_player_names(players: &[String]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for player in players {
        let trimmed = player.trim();
        if trimmed.is_empty() {
            let mut err = ValidationError::new("player_name_blank");
            err.message = Some("Player names must not be blank".into());
            return Err(err);
        }
        if !seen.insert(trimmed.to_lowercase()) {
            let mut err = ValidationError::new("player_name_duplicate");
            err.message = Some(format!("Player `{trimmed}` is listed more than once").into());
            return Err(err);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_validate_player_names_valid() {
        assert!(validate_player_names(&names(&["Alice", "Bob"])).is_ok());
        assert!(validate_player_names(&names(&[" Alice "])).is_ok());
    }

    #[test]
    fn test_validate_player_names_blank() {
        assert!(validate_player_names(&names(&["Alice", ""])).is_err());
        assert!(validate_player_names(&names(&["   "])).is_err());
    }

    #[test]
    fn test_validate_player_names_duplicates() {
        let err = validate_player_names(&names(&["Alice", " ALICE"])).unwrap_err();
        assert_eq!(err.code, "player_name_duplicate");
    }
}
