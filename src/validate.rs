use thiserror::Error;

use crate::form::{LaunchOptions, Visibility, MAX_WORKSPACES, MIN_WORKSPACES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("the number of workspaces must be between 1 and 30")]
    CountOutOfRange,
    #[error("a Tailscale domain is required for tunnel mode")]
    DomainRequired,
    #[error("tick the confirmation to uninstall")]
    ConfirmationRequired,
}

impl ValidationError {
    pub fn code(self) -> &'static str {
        match self {
            ValidationError::CountOutOfRange => "count_out_of_range",
            ValidationError::DomainRequired => "domain_required",
            ValidationError::ConfirmationRequired => "confirmation_required",
        }
    }
}

/// Returns the first violated rule. Order: count, domain, confirmation.
pub fn validate(options: &LaunchOptions, visibility: Visibility) -> Result<(), ValidationError> {
    if visibility.count_applicable {
        let in_range = options
            .workspace_count
            .is_some_and(|count| (MIN_WORKSPACES..=MAX_WORKSPACES).contains(&count));
        if !in_range {
            return Err(ValidationError::CountOutOfRange);
        }
    }
    if visibility.domain_applicable
        && options
            .domain
            .as_deref()
            .map_or(true, |domain| domain.trim().is_empty())
    {
        return Err(ValidationError::DomainRequired);
    }
    if visibility.uninstall_applicable && !options.confirm_uninstall {
        return Err(ValidationError::ConfirmationRequired);
    }
    Ok(())
}
