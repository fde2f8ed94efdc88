use std::fmt;

use super::{Expr, Literal, OperatorCall};

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for OperatorCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.operator)?;
        write_list(f, &self.arguments)?;
        write!(f, ")")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::EntitySet(set) => write!(f, "Set({})", set.entity),
            Expr::Constant(lit) => write!(f, "{}", lit),
            Expr::Parameter(name) => write!(f, "{}", name),
            Expr::Member(m) => write!(f, "{}.{}", m.target, m.member),
            Expr::Binary(b) => write!(f, "({} {} {})", b.left, b.op.symbol(), b.right),
            Expr::Not(inner) => write!(f, "!{}", inner),
            Expr::Conditional(c) => {
                write!(f, "({} ? {} : {})", c.test, c.if_true, c.if_false)
            }
            Expr::Record(fields) => {
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.value)?;
                }
                write!(f, " }}")
            }
            Expr::Tuple(items) => {
                write!(f, "(")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            Expr::Convert(c) => write!(
                f,
                "Convert({}, {}{})",
                c.operand,
                c.data_type,
                if c.nullable { "?" } else { "" }
            ),
            Expr::Function(func) => {
                write!(f, "{}(", func.name)?;
                write_list(f, &func.arguments)?;
                write!(f, ")")
            }
            Expr::Call(call) => write!(f, "{}", call),
            Expr::Lambda(l) => {
                if l.params.len() == 1 {
                    write!(f, "{} => {}", l.params[0], l.body)
                } else {
                    write!(f, "({}) => {}", l.params.join(", "), l.body)
                }
            }
            Expr::Binding(b) => write!(f, "<{}:{}:{}>", b.mapping, b.node, b.path.join(".")),
            Expr::StreamState(state) => write!(
                f,
                "Stream[{} | {} => {}]",
                state.source, state.current_parameter, state.pending_selector
            ),
            Expr::NullSafeEqual(n) => {
                write!(f, "NullSafe[")?;
                write_list(f, &n.guards)?;
                write!(f, "]({} == {})", n.left, n.right)
            }
            Expr::EntityShape(s) => write!(f, "Shape<{}>({})", s.entity, s.source),
        }
    }
}
