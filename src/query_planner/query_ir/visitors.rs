//! Generic traversal over the expression tree.
//!
//! Passes are written as plain recursive functions that pattern-match on the
//! node kinds they care about and delegate everything else to
//! [`Expr::map_children`].

use super::{
    BinaryExpr, BindingPlaceholder, Conditional, Convert, EntityShape, Expr, FunctionCall, Lambda,
    MemberAccess, NullSafeEquality, OperatorCall, RecordField, StreamState,
};

impl Expr {
    /// Direct sub-expressions, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::EntitySet(_) | Expr::Constant(_) | Expr::Parameter(_) | Expr::Binding(_) => {
                vec![]
            }
            Expr::Member(m) => vec![&m.target],
            Expr::Binary(b) => vec![&b.left, &b.right],
            Expr::Not(inner) => vec![inner],
            Expr::Conditional(c) => vec![&c.test, &c.if_true, &c.if_false],
            Expr::Record(fields) => fields.iter().map(|f| &f.value).collect(),
            Expr::Tuple(items) => items.iter().collect(),
            Expr::Convert(c) => vec![&c.operand],
            Expr::Function(f) => f.arguments.iter().collect(),
            Expr::Call(call) => call.arguments.iter().collect(),
            Expr::Lambda(l) => vec![&l.body],
            Expr::StreamState(state) => vec![&state.source, &state.pending_selector],
            Expr::NullSafeEqual(n) => {
                let mut out: Vec<&Expr> = n.guards.iter().collect();
                out.push(&n.left);
                out.push(&n.right);
                out
            }
            Expr::EntityShape(s) => vec![&s.source],
        }
    }

    /// Rebuild this node with every direct child passed through `f`.
    pub fn map_children<E, F>(self, f: &mut F) -> Result<Expr, E>
    where
        F: FnMut(Expr) -> Result<Expr, E>,
    {
        Ok(match self {
            leaf @ (Expr::EntitySet(_)
            | Expr::Constant(_)
            | Expr::Parameter(_)
            | Expr::Binding(_)) => leaf,
            Expr::Member(m) => Expr::Member(MemberAccess {
                target: Box::new(f(*m.target)?),
                member: m.member,
            }),
            Expr::Binary(b) => Expr::Binary(BinaryExpr {
                op: b.op,
                left: Box::new(f(*b.left)?),
                right: Box::new(f(*b.right)?),
            }),
            Expr::Not(inner) => Expr::Not(Box::new(f(*inner)?)),
            Expr::Conditional(c) => Expr::Conditional(Conditional {
                test: Box::new(f(*c.test)?),
                if_true: Box::new(f(*c.if_true)?),
                if_false: Box::new(f(*c.if_false)?),
            }),
            Expr::Record(fields) => Expr::Record(
                fields
                    .into_iter()
                    .map(|field| {
                        Ok(RecordField {
                            name: field.name,
                            value: f(field.value)?,
                        })
                    })
                    .collect::<Result<_, E>>()?,
            ),
            Expr::Tuple(items) => {
                Expr::Tuple(items.into_iter().map(&mut *f).collect::<Result<_, E>>()?)
            }
            Expr::Convert(c) => Expr::Convert(Convert {
                operand: Box::new(f(*c.operand)?),
                data_type: c.data_type,
                nullable: c.nullable,
            }),
            Expr::Function(func) => Expr::Function(FunctionCall {
                name: func.name,
                arguments: func
                    .arguments
                    .into_iter()
                    .map(&mut *f)
                    .collect::<Result<_, E>>()?,
            }),
            Expr::Call(call) => Expr::Call(OperatorCall {
                operator: call.operator,
                arguments: call
                    .arguments
                    .into_iter()
                    .map(&mut *f)
                    .collect::<Result<_, E>>()?,
                annotation: call.annotation,
            }),
            Expr::Lambda(l) => Expr::Lambda(Lambda {
                params: l.params,
                body: Box::new(f(*l.body)?),
            }),
            Expr::StreamState(state) => {
                let state = *state;
                Expr::StreamState(Box::new(StreamState {
                    source: f(state.source)?,
                    pending_selector: f(state.pending_selector)?,
                    ..state
                }))
            }
            Expr::NullSafeEqual(n) => Expr::NullSafeEqual(NullSafeEquality {
                guards: n.guards.into_iter().map(&mut *f).collect::<Result<_, E>>()?,
                left: Box::new(f(*n.left)?),
                right: Box::new(f(*n.right)?),
            }),
            Expr::EntityShape(s) => Expr::EntityShape(EntityShape {
                entity: s.entity,
                source: Box::new(f(*s.source)?),
            }),
        })
    }

    /// Pre-order visit of this node and every descendant.
    pub fn walk<'e>(&'e self, visit: &mut impl FnMut(&'e Expr)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    pub fn any_node(&self, predicate: impl Fn(&Expr) -> bool) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if !found && predicate(e) {
                found = true;
            }
        });
        found
    }

    /// Source argument of an operator call.
    pub fn call_source(&self) -> Option<&Expr> {
        match self {
            Expr::Call(call) => call.arguments.first(),
            _ => None,
        }
    }

    /// Bottom of an operator chain, following `arguments[0]`.
    pub fn chain_root(&self) -> &Expr {
        let mut current = self;
        while let Some(source) = current.call_source() {
            current = source;
        }
        current
    }
}

/// Substitute `replacement` for free occurrences of parameter `name`.
/// Lambdas rebinding `name` shadow it.
pub fn replace_parameter(expr: Expr, name: &str, replacement: &Expr) -> Expr {
    match expr {
        Expr::Parameter(p) if p == name => replacement.clone(),
        Expr::Lambda(l) if l.params.iter().any(|p| p == name) => Expr::Lambda(l),
        other => {
            let result: Result<Expr, std::convert::Infallible> = other
                .map_children(&mut |child| Ok(replace_parameter(child, name, replacement)));
            match result {
                Ok(e) => e,
                Err(never) => match never {},
            }
        }
    }
}

/// Does `name` occur free in `expr`?
pub fn references_parameter(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Parameter(p) => p == name,
        Expr::Lambda(l) if l.params.iter().any(|p| p == name) => false,
        other => other
            .children()
            .into_iter()
            .any(|c| references_parameter(c, name)),
    }
}

/// All binding placeholders in `expr`, in pre-order, duplicates included.
pub fn collect_placeholders(expr: &Expr) -> Vec<&BindingPlaceholder> {
    let mut found = Vec::new();
    expr.walk(&mut |e| {
        if let Expr::Binding(b) = e {
            found.push(b);
        }
    });
    found
}

/// Alpha-rename parameter `from` of `lambda` to `to`.
pub fn rename_lambda_parameter(lambda: Lambda, from: &str, to: &str) -> Lambda {
    let params = lambda
        .params
        .into_iter()
        .map(|p| if p == from { to.to_string() } else { p })
        .collect();
    Lambda {
        params,
        body: Box::new(replace_parameter(*lambda.body, from, &Expr::param(to))),
    }
}
