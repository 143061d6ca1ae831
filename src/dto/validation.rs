//! Validation helpers for DTOs.

use std::collections::HashSet;

use validator::ValidationError;

use crate::{dto::matches::RosterEntryInput, state::match_state::Actor};

/// Validates that no shirt number appears twice in a roster.
pub fn validate_unique_roster(roster: &[RosterEntryInput]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    if let Some(duplicate) = roster.iter().find(|entry| !seen.insert(entry.number)) {
        let mut err = ValidationError::new("roster_duplicate");
        err.message = Some(format!("Shirt number {} is listed twice", duplicate.number).into());
        return Err(err);
    }
    Ok(())
}

/// Validates that an actor is either a shirt number or `team`.
pub fn validate_actor(actor: &str) -> Result<(), ValidationError> {
    actor.parse::<Actor>().map(|_| ()).map_err(|parse| {
        let mut err = ValidationError::new("actor_format");
        err.message = Some(parse.to_string().into());
        err
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(number: u16) -> RosterEntryInput {
        RosterEntryInput { number, name: None }
    }

    #[test]
    fn test_validate_unique_roster() {
        assert!(validate_unique_roster(&[entry(4), entry(7)]).is_ok());
        assert!(validate_unique_roster(&[]).is_ok());
        assert!(validate_unique_roster(&[entry(4), entry(7), entry(4)]).is_err());
    }

    #[test]
    fn test_validate_actor() {
        assert!(validate_actor("12").is_ok());
        assert!(validate_actor("team").is_ok());
        assert!(validate_actor("coach").is_err());
        assert!(validate_actor("-1").is_err());
    }
}
