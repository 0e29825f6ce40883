//! Role-based access decisions.
//!
//! The decision is a pure function of the caller's role and the role set an
//! operation declares. Extracting the role from a validated token and turning
//! a denial into a response are the caller's job.

use crate::user::Role;

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  Allow,
  Deny,
}

impl Decision {
  pub fn is_allowed(self) -> bool { matches!(self, Self::Allow) }
}

/// Allow iff `role` is a member of `required`. An empty set denies everyone.
pub fn authorize(role: Role, required: &[Role]) -> Decision {
  if required.contains(&role) {
    Decision::Allow
  } else {
    Decision::Deny
  }
}
