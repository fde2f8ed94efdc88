//! # Query IR
//!
//! Expression-tree representation shared by every navigation expansion pass.
//! A query is a chain of [`OperatorCall`]s over root [`EntitySet`]s, with
//! [`Lambda`] arguments whose bodies access members of their parameters.
//!
//! Besides the user-facing node kinds, the IR carries a few compiler-private
//! nodes:
//!
//! - [`BindingPlaceholder`]: a member-access chain matched to a navigation tree
//!   node, reduced to a physical field path only at the end of an operator
//! - [`StreamState`]: a rewritten source together with its navigation state and
//!   pending selector
//! - [`NullSafeEquality`]: an equality that only holds when its outer rows exist
//!
//! and one backend marker, [`EntityShape`], standing for "shape these physical
//! fields into entity type T".

use serde::{Deserialize, Serialize};

use crate::entity_catalog::ScalarType;
use crate::query_planner::navigation_tree::{NodeId, SourceMappingId};

pub mod builders;
mod display;
pub mod operators;
pub mod visitors;

#[cfg(test)]
pub(crate) mod eval;

pub use operators::{OperatorKind, QueryOperator};

/// Field names of the flattening record produced by joins.
pub const OUTER: &str = "outer";
pub const INNER: &str = "inner";

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// Root stream over every row of a mapped entity type.
    EntitySet(EntitySet),

    /// A literal, such as a number, string, boolean, or null.
    Constant(Literal),

    /// Reference to a lambda parameter.
    Parameter(String),

    /// Member/field access (`target.member`).
    Member(MemberAccess),

    /// Binary operator application (e.g. `a == b`, `a && b`).
    Binary(BinaryExpr),

    Not(Box<Expr>),

    /// `test ? if_true : if_false`
    Conditional(Conditional),

    /// Anonymous record construction; also the `{ outer, inner }` flattening
    /// record produced by joins.
    Record(Vec<RecordField>),

    /// Ordered tuple, used for composite key comparisons.
    Tuple(Vec<Expr>),

    /// Widening conversion of a scalar to its nullable form.
    Convert(Convert),

    /// Scalar function call such as `Equals(a, b)`.
    Function(FunctionCall),

    /// Call to a query operator.
    Call(OperatorCall),

    Lambda(Lambda),

    /// Member-access chain bound to a navigation tree node.
    Binding(BindingPlaceholder),

    /// Rewritten source carrying its navigation state.
    StreamState(Box<StreamState>),

    /// Equality that is false whenever one of the guards is null.
    NullSafeEqual(NullSafeEquality),

    /// Shape the physical fields under `source` into an entity.
    EntityShape(EntityShape),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct EntitySet {
    pub entity: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MemberAccess {
    pub target: Box<Expr>,
    pub member: String,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
    Add,
    Subtract,
}

impl BinaryOperator {
    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOperator::Equal | BinaryOperator::NotEqual)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub op: BinaryOperator,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Conditional {
    pub test: Box<Expr>,
    pub if_true: Box<Expr>,
    pub if_false: Box<Expr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Convert {
    pub operand: Box<Expr>,
    pub data_type: ScalarType,
    pub nullable: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Vec<Expr>,
}

/// Call to a query operator. `arguments[0]` is the source for every operator
/// that has one.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OperatorCall {
    pub operator: QueryOperator,
    pub arguments: Vec<Expr>,
    pub annotation: Option<OperatorAnnotation>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Box<Expr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct BindingPlaceholder {
    pub mapping: SourceMappingId,
    pub node: NodeId,
    /// Navigation names from the stream root, for diagnostics.
    pub path: Vec<String>,
}

/// A rewritten query source plus the state the expansion driver threads
/// through the operator chain.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct StreamState {
    /// Physical source, containing only resolved joins and field paths.
    pub source: Expr,
    /// Name of the parameter that stands for one physical row.
    pub current_parameter: String,
    /// Source mappings whose nodes are reachable through the physical row.
    pub mappings: Vec<SourceMappingId>,
    /// Deferred projection body over `current_parameter`.
    pub pending_selector: Expr,
    pub apply_pending_selector: bool,
    /// The source was produced by an ordering operator.
    pub ordered: bool,
    /// First/Single variant to apply after the final projection.
    pub pending_cardinality: Option<QueryOperator>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NullSafeEquality {
    pub guards: Vec<Expr>,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct EntityShape {
    pub entity: String,
    pub source: Box<Expr>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

/// Information a downstream planner needs to emit `JOIN` / `LEFT JOIN`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct JoinAnnotation {
    pub kind: JoinKind,
    pub target_entity: Option<String>,
    /// `Entity.Navigation` when the join came from a navigation.
    pub navigation: Option<String>,
    pub outer_key: Vec<String>,
    pub inner_key: Vec<String>,
    pub outer_null_guard: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum OperatorAnnotation {
    Join(JoinAnnotation),
    /// `Where` produced from a collection navigation; its predicate is
    /// `owner.key != null && element.fk == owner.key`.
    CollectionNavigation {
        owner_entity: String,
        navigation: String,
    },
    /// The `SelectMany(.., DefaultIfEmpty)` half of the left-join idiom.
    LeftJoinFlatten,
}

impl OperatorCall {
    pub fn join_annotation(&self) -> Option<&JoinAnnotation> {
        match &self.annotation {
            Some(OperatorAnnotation::Join(join)) => Some(join),
            _ => None,
        }
    }
}

/// Serialize an expression tree to JSON for explain output.
pub fn to_json(expr: &Expr) -> serde_json::Result<String> {
    serde_json::to_string_pretty(expr)
}
