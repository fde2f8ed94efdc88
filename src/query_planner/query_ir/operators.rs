/// Query operator registry
///
/// Maps operator names to their `QueryOperator` variant plus the arity and
/// classification the expansion driver needs.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryOperator {
    Where,
    Select,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    Join,
    SelectMany,
    GroupJoin,
    Distinct,
    Take,
    Skip,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Any,
    Count,
    Contains,
    OfType,
    DefaultIfEmpty,
    AsTracking,
    /// Re-asserts that a sequence is ordered after joins were inserted.
    AsOrdered,
    /// Any operator name without a rewrite rule.
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    /// Row-wise operator with one lambda over the source.
    Lambda,
    /// Operator combining two streams.
    MultiRoot,
    /// Operator that needs a concrete row shape.
    Terminating,
    /// Compiler-inserted adapter.
    Adapter,
}

/// Registry entry
#[derive(Debug, Clone)]
pub struct OperatorInfo {
    pub operator: QueryOperator,
    pub name: &'static str,
    pub kind: OperatorKind,
    /// Argument count including the source.
    pub min_args: usize,
    pub max_args: usize,
}

/// Get registry entry for an operator name
pub fn get_operator_info(name: &str) -> Option<OperatorInfo> {
    OPERATORS.get(name).cloned()
}

fn entry(
    operator: QueryOperator,
    name: &'static str,
    kind: OperatorKind,
    min_args: usize,
    max_args: usize,
) -> (&'static str, OperatorInfo) {
    (
        name,
        OperatorInfo {
            operator,
            name,
            kind,
            min_args,
            max_args,
        },
    )
}

lazy_static::lazy_static! {
    static ref OPERATORS: HashMap<&'static str, OperatorInfo> = {
        use OperatorKind::*;
        use QueryOperator as Op;

        let mut m = HashMap::new();

        // ===== ROW-WISE =====
        m.extend([
            entry(Op::Where, "Where", Lambda, 2, 2),
            entry(Op::Select, "Select", Lambda, 2, 2),
            entry(Op::OrderBy, "OrderBy", Lambda, 2, 2),
            entry(Op::OrderByDescending, "OrderByDescending", Lambda, 2, 2),
            entry(Op::ThenBy, "ThenBy", Lambda, 2, 2),
            entry(Op::ThenByDescending, "ThenByDescending", Lambda, 2, 2),
        ]);

        // ===== MULTI-ROOT =====
        // Join(outer, inner, outerKey, innerKey, resultSelector)
        m.extend([
            entry(Op::Join, "Join", MultiRoot, 5, 5),
            entry(Op::SelectMany, "SelectMany", MultiRoot, 2, 3),
            entry(Op::GroupJoin, "GroupJoin", MultiRoot, 5, 5),
        ]);

        // ===== TERMINATING =====
        m.extend([
            entry(Op::Distinct, "Distinct", Terminating, 1, 1),
            entry(Op::Take, "Take", Terminating, 2, 2),
            entry(Op::Skip, "Skip", Terminating, 2, 2),
            entry(Op::First, "First", Terminating, 1, 2),
            entry(Op::FirstOrDefault, "FirstOrDefault", Terminating, 1, 2),
            entry(Op::Single, "Single", Terminating, 1, 2),
            entry(Op::SingleOrDefault, "SingleOrDefault", Terminating, 1, 2),
            entry(Op::Any, "Any", Terminating, 1, 2),
            entry(Op::Count, "Count", Terminating, 1, 2),
            entry(Op::Contains, "Contains", Terminating, 2, 2),
            entry(Op::OfType, "OfType", Terminating, 2, 2),
            entry(Op::DefaultIfEmpty, "DefaultIfEmpty", Terminating, 1, 1),
            entry(Op::AsTracking, "AsTracking", Terminating, 1, 1),
        ]);

        m.extend([entry(Op::AsOrdered, "AsOrdered", Adapter, 1, 1)]);
        m
    };
}

impl QueryOperator {
    /// Resolve an operator by name; unknown names become `Other`.
    pub fn from_name(name: &str) -> QueryOperator {
        match get_operator_info(name) {
            Some(info) => info.operator,
            None => QueryOperator::Other(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            QueryOperator::Where => "Where",
            QueryOperator::Select => "Select",
            QueryOperator::OrderBy => "OrderBy",
            QueryOperator::OrderByDescending => "OrderByDescending",
            QueryOperator::ThenBy => "ThenBy",
            QueryOperator::ThenByDescending => "ThenByDescending",
            QueryOperator::Join => "Join",
            QueryOperator::SelectMany => "SelectMany",
            QueryOperator::GroupJoin => "GroupJoin",
            QueryOperator::Distinct => "Distinct",
            QueryOperator::Take => "Take",
            QueryOperator::Skip => "Skip",
            QueryOperator::First => "First",
            QueryOperator::FirstOrDefault => "FirstOrDefault",
            QueryOperator::Single => "Single",
            QueryOperator::SingleOrDefault => "SingleOrDefault",
            QueryOperator::Any => "Any",
            QueryOperator::Count => "Count",
            QueryOperator::Contains => "Contains",
            QueryOperator::OfType => "OfType",
            QueryOperator::DefaultIfEmpty => "DefaultIfEmpty",
            QueryOperator::AsTracking => "AsTracking",
            QueryOperator::AsOrdered => "AsOrdered",
            QueryOperator::Other(name) => name,
        }
    }

    pub fn info(&self) -> Option<OperatorInfo> {
        match self {
            QueryOperator::Other(_) => None,
            op => get_operator_info(op.name()),
        }
    }

    /// Row-wise operators with one lambda over the source.
    pub fn is_row_wise(&self) -> bool {
        self.info()
            .is_some_and(|info| info.kind == OperatorKind::Lambda)
    }

    /// First/Single variants, which reduce a sequence to one element.
    pub fn is_cardinality_reducing(&self) -> bool {
        matches!(
            self,
            QueryOperator::First
                | QueryOperator::FirstOrDefault
                | QueryOperator::Single
                | QueryOperator::SingleOrDefault
        )
    }

    /// Operators whose result is a scalar rather than a sequence.
    pub fn is_scalar_result(&self) -> bool {
        matches!(
            self,
            QueryOperator::Any | QueryOperator::Count | QueryOperator::Contains
        )
    }

    /// Operators accepting an optional predicate lambda as second argument.
    pub fn accepts_predicate(&self) -> bool {
        self.is_cardinality_reducing()
            || matches!(self, QueryOperator::Any | QueryOperator::Count)
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
