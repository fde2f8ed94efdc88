//! Convenience constructors for building query IR by hand.
//!
//! ```ignore
//! let q = Expr::entity_set("Order")
//!     .call("Where", vec![Expr::lambda(&["o"], Expr::param("o").member("Address").member("City").equals(Expr::string("X")))]);
//! ```

use super::{
    BinaryExpr, BinaryOperator, Conditional, Convert, EntitySet, Expr, FunctionCall, Lambda,
    Literal, MemberAccess, OperatorAnnotation, OperatorCall, QueryOperator, RecordField,
};
use crate::entity_catalog::ScalarType;

impl Expr {
    pub fn entity_set(entity: &str) -> Expr {
        Expr::EntitySet(EntitySet {
            entity: entity.to_string(),
        })
    }

    pub fn param(name: &str) -> Expr {
        Expr::Parameter(name.to_string())
    }

    pub fn null() -> Expr {
        Expr::Constant(Literal::Null)
    }

    pub fn int(value: i64) -> Expr {
        Expr::Constant(Literal::Integer(value))
    }

    pub fn float(value: f64) -> Expr {
        Expr::Constant(Literal::Float(value))
    }

    pub fn string(value: &str) -> Expr {
        Expr::Constant(Literal::String(value.to_string()))
    }

    pub fn boolean(value: bool) -> Expr {
        Expr::Constant(Literal::Boolean(value))
    }

    pub fn member(self, member: &str) -> Expr {
        Expr::Member(MemberAccess {
            target: Box::new(self),
            member: member.to_string(),
        })
    }

    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
        Expr::Binary(BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn equals(self, other: Expr) -> Expr {
        Expr::binary(BinaryOperator::Equal, self, other)
    }

    pub fn not_equals(self, other: Expr) -> Expr {
        Expr::binary(BinaryOperator::NotEqual, self, other)
    }

    pub fn greater_than(self, other: Expr) -> Expr {
        Expr::binary(BinaryOperator::GreaterThan, self, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        Expr::binary(BinaryOperator::And, self, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::binary(BinaryOperator::Or, self, other)
    }

    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Expr {
        Expr::Conditional(Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        })
    }

    pub fn convert(self, data_type: ScalarType, nullable: bool) -> Expr {
        Expr::Convert(Convert {
            operand: Box::new(self),
            data_type,
            nullable,
        })
    }

    /// `null` widened to a nullable scalar type.
    pub fn typed_null(data_type: ScalarType) -> Expr {
        Expr::null().convert(data_type, true)
    }

    pub fn lambda(params: &[&str], body: Expr) -> Expr {
        Expr::Lambda(Lambda {
            params: params.iter().map(|p| p.to_string()).collect(),
            body: Box::new(body),
        })
    }

    pub fn record(fields: Vec<(&str, Expr)>) -> Expr {
        Expr::Record(
            fields
                .into_iter()
                .map(|(name, value)| RecordField {
                    name: name.to_string(),
                    value,
                })
                .collect(),
        )
    }

    /// `{ outer: outer, inner: inner }`
    pub fn flattening_record(outer: Expr, inner: Expr) -> Expr {
        Expr::record(vec![(super::OUTER, outer), (super::INNER, inner)])
    }

    pub fn tuple(items: Vec<Expr>) -> Expr {
        Expr::Tuple(items)
    }

    pub fn function(name: &str, arguments: Vec<Expr>) -> Expr {
        Expr::Function(FunctionCall {
            name: name.to_string(),
            arguments,
        })
    }

    /// Call an operator by name with `self` as the source argument.
    pub fn call(self, operator: &str, mut arguments: Vec<Expr>) -> Expr {
        arguments.insert(0, self);
        Expr::operator_call(QueryOperator::from_name(operator), arguments, None)
    }

    pub fn operator_call(
        operator: QueryOperator,
        arguments: Vec<Expr>,
        annotation: Option<OperatorAnnotation>,
    ) -> Expr {
        Expr::Call(OperatorCall {
            operator,
            arguments,
            annotation,
        })
    }

    /// Single-column keys stay scalar, composite keys become a tuple.
    pub fn key_expr(mut parts: Vec<Expr>) -> Expr {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::Tuple(parts)
        }
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self, Expr::Constant(Literal::Null))
            || matches!(self, Expr::Convert(c) if c.operand.is_null_constant())
    }
}
