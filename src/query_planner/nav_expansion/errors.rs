use std::fmt::Display;

use thiserror::Error;

use crate::entity_catalog::errors::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Binding,
    Expansion,
    JoinInsertion,
    CollectionRewrite,
    CorrelationCheck,
    ComparisonOptimization,
    Reduction,
}

impl Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pass::Binding => write!(f, "Binding"),
            Pass::Expansion => write!(f, "Expansion"),
            Pass::JoinInsertion => write!(f, "JoinInsertion"),
            Pass::CollectionRewrite => write!(f, "CollectionRewrite"),
            Pass::CorrelationCheck => write!(f, "CorrelationCheck"),
            Pass::ComparisonOptimization => write!(f, "ComparisonOptimization"),
            Pass::Reduction => write!(f, "Reduction"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NavExpansionError {
    #[error(" {pass}: Operator `{operator}` is not supported.")]
    UnsupportedOperator { pass: Pass, operator: String },

    #[error(" {pass}: Unsupported expression `{expression}`: {reason}")]
    UnsupportedExpression {
        pass: Pass,
        expression: String,
        reason: String,
    },

    #[error(" {pass}: Operator `{operator}` expects {expected} arguments, got {actual}.")]
    InvalidArity {
        pass: Pass,
        operator: String,
        expected: String,
        actual: usize,
    },

    #[error(" {pass}: `{expression}` is not a query sequence.")]
    NotAStream { pass: Pass, expression: String },

    #[error(" {pass}: Member `{member}` cannot be resolved on `{target}`.")]
    UnresolvableMember {
        pass: Pass,
        target: String,
        member: String,
    },

    #[error(" {pass}: Key shape mismatch in {context}: {outer} outer vs {inner} inner key parts.")]
    KeyShapeMismatch {
        pass: Pass,
        context: String,
        outer: usize,
        inner: usize,
    },

    #[error(" {pass}: Navigation path `{path}` exceeds the maximum depth of {max_depth}.")]
    NavigationDepthExceeded {
        pass: Pass,
        path: String,
        max_depth: usize,
    },

    #[error(" {pass}: Binding `{binding}` survived past its scope.")]
    UnreducedBinding { pass: Pass, binding: String },

    #[error("Catalog: {pass}: {source}.")]
    Catalog {
        pass: Pass,
        #[source]
        source: CatalogError,
    },
}

impl NavExpansionError {
    pub fn unsupported(pass: Pass, expression: impl Display, reason: impl Into<String>) -> Self {
        NavExpansionError::UnsupportedExpression {
            pass,
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}
