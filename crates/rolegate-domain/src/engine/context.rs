//! Traversal context for the operation tree walk.

use crate::policy::PermType;

/// The (model, operation type) pair a walk step is evaluated under.
///
/// Contexts are immutable; descending into a relation or switching the
/// operation type builds a new context, so sibling branches can never observe
/// each other's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    pub model: String,
    pub perm_type: PermType,
}

impl OperationContext {
    pub fn new(model: impl Into<String>, perm_type: PermType) -> Self {
        Self {
            model: model.into(),
            perm_type,
        }
    }

    /// A context for a related model, keeping the operation type.
    pub fn relation(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            perm_type: self.perm_type,
        }
    }

    /// A context with the same model under a different operation type.
    pub fn with_perm(&self, perm_type: PermType) -> Self {
        Self {
            model: self.model.clone(),
            perm_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descent_leaves_parent_untouched() {
        let parent = OperationContext::new("User", PermType::Update);
        let child = parent.relation("Post").with_perm(PermType::Create);
        assert_eq!(child.model, "Post");
        assert_eq!(child.perm_type, PermType::Create);
        assert_eq!(parent.model, "User");
        assert_eq!(parent.perm_type, PermType::Update);
    }
}
