//! Composable validators for resource restriction names.
//!
//! Constraints check which restriction *names* a role supplies against the
//! rules an authenticator defines in policy (required, permitted,
//! exclusive, any-of, non-permitted, not-empty). They are pure functions
//! of the restriction name list: no I/O, no mutation. Value matching
//! against the decoded token happens later, in the restriction
//! validators.

use crate::error::{AuthenticationError, Result};

/// A single validation rule over a list of restriction names.
pub trait Constraint: Send + Sync {
    /// Validates the restriction names, failing with the constraint's
    /// dedicated error on violation.
    fn validate(&self, resource_restrictions: &[String]) -> Result<()>;
}

/// All members of `required` must be present.
pub struct RequiredConstraint {
    required: Vec<String>,
}

impl RequiredConstraint {
    /// Creates the constraint.
    pub fn new(required: Vec<String>) -> Self {
        Self { required }
    }
}

impl Constraint for RequiredConstraint {
    fn validate(&self, resource_restrictions: &[String]) -> Result<()> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|name| !resource_restrictions.contains(name))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthenticationError::RoleMissingConstraints(missing))
        }
    }
}

/// Every restriction given must be a member of `permitted`.
pub struct PermittedConstraint {
    permitted: Vec<String>,
}

impl PermittedConstraint {
    /// Creates the constraint.
    pub fn new(permitted: Vec<String>) -> Self {
        Self { permitted }
    }
}

impl Constraint for PermittedConstraint {
    fn validate(&self, resource_restrictions: &[String]) -> Result<()> {
        match resource_restrictions.iter().find(|name| !self.permitted.contains(name)) {
            Some(unsupported) => Err(AuthenticationError::ConstraintNotSupported {
                name: unsupported.clone(),
                permitted: self.permitted.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// At most one member of `exclusive` may be present.
pub struct ExclusiveConstraint {
    exclusive: Vec<String>,
}

impl ExclusiveConstraint {
    /// Creates the constraint.
    pub fn new(exclusive: Vec<String>) -> Self {
        Self { exclusive }
    }
}

impl Constraint for ExclusiveConstraint {
    fn validate(&self, resource_restrictions: &[String]) -> Result<()> {
        let present =
            self.exclusive.iter().filter(|name| resource_restrictions.contains(name)).count();
        if present > 1 {
            Err(AuthenticationError::IllegalConstraintCombinations(self.exclusive.clone()))
        } else {
            Ok(())
        }
    }
}

/// Exactly one member of the group must be present.
pub struct RequiredExclusiveConstraint {
    required_exclusive: Vec<String>,
}

impl RequiredExclusiveConstraint {
    /// Creates the constraint.
    pub fn new(required_exclusive: Vec<String>) -> Self {
        Self { required_exclusive }
    }
}

impl Constraint for RequiredExclusiveConstraint {
    fn validate(&self, resource_restrictions: &[String]) -> Result<()> {
        let present = self
            .required_exclusive
            .iter()
            .filter(|name| resource_restrictions.contains(name))
            .count();
        if present == 1 {
            Ok(())
        } else {
            Err(AuthenticationError::IllegalConstraintCombinations(
                self.required_exclusive.clone(),
            ))
        }
    }
}

/// At least one member of `any_of` must be present.
pub struct AnyConstraint {
    any_of: Vec<String>,
}

impl AnyConstraint {
    /// Creates the constraint.
    pub fn new(any_of: Vec<String>) -> Self {
        Self { any_of }
    }
}

impl Constraint for AnyConstraint {
    fn validate(&self, resource_restrictions: &[String]) -> Result<()> {
        if self.any_of.iter().any(|name| resource_restrictions.contains(name)) {
            Ok(())
        } else {
            Err(AuthenticationError::RoleMissingRequiredConstraints(self.any_of.clone()))
        }
    }
}

/// No member of `non_permitted` may be present.
pub struct NonPermittedConstraint {
    non_permitted: Vec<String>,
}

impl NonPermittedConstraint {
    /// Creates the constraint.
    pub fn new(non_permitted: Vec<String>) -> Self {
        Self { non_permitted }
    }
}

impl Constraint for NonPermittedConstraint {
    fn validate(&self, resource_restrictions: &[String]) -> Result<()> {
        let given: Vec<String> = self
            .non_permitted
            .iter()
            .filter(|name| resource_restrictions.contains(name))
            .cloned()
            .collect();
        if given.is_empty() {
            Ok(())
        } else {
            Err(AuthenticationError::NonPermittedRestrictionGiven(given))
        }
    }
}

/// The restriction list itself must not be empty.
pub struct NotEmptyConstraint;

impl Constraint for NotEmptyConstraint {
    fn validate(&self, resource_restrictions: &[String]) -> Result<()> {
        if resource_restrictions.is_empty() {
            Err(AuthenticationError::RoleMissingAnyRestrictions)
        } else {
            Ok(())
        }
    }
}

/// Ordered composite: runs each sub-constraint and short-circuits on the
/// first failure.
pub struct MultipleConstraint {
    constraints: Vec<Box<dyn Constraint>>,
}

impl MultipleConstraint {
    /// Creates the composite from sub-constraints in evaluation order.
    pub fn new(constraints: Vec<Box<dyn Constraint>>) -> Self {
        Self { constraints }
    }
}

impl Constraint for MultipleConstraint {
    fn validate(&self, resource_restrictions: &[String]) -> Result<()> {
        for constraint in &self.constraints {
            constraint.validate(resource_restrictions)?;
        }
        Ok(())
    }
}
