//! Gate and rule expressions
//!
//! Expressions are a closed tagged union. The front-end produces them
//! already parsed; the engine evaluates them against the instance store.

use crate::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A boolean or arithmetic expression over instances and rules
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    /// A constant
    Literal { value: Value },

    /// `instance.attribute[.attribute...]`
    AttributePath { path: Vec<String> },

    /// `not operand`
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },

    /// `left op right`, optionally written inside parentheses
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
        #[serde(default)]
        parenthesized: bool,
    },

    /// Invocation of a named rule
    RuleCall(RuleCall),
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal {
            value: value.into(),
        }
    }

    /// Build an attribute path from its segments
    pub fn path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expression::AttributePath {
            path: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a dotted path such as `agv.position.x`
    pub fn dotted(path: &str) -> Self {
        Expression::path(path.split('.'))
    }

    pub fn not(operand: Expression) -> Self {
        Expression::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            parenthesized: false,
        }
    }

    /// Mark a binary expression as parenthesized; other variants are unchanged
    pub fn grouped(self) -> Self {
        match self {
            Expression::Binary {
                op, left, right, ..
            } => Expression::Binary {
                op,
                left,
                right,
                parenthesized: true,
            },
            other => other,
        }
    }

    pub fn call(call: RuleCall) -> Self {
        Expression::RuleCall(call)
    }

    /// Names of every rule invoked by this expression, nested calls included
    pub fn rule_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_rule_names(&mut names);
        names
    }

    fn collect_rule_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expression::Literal { .. } | Expression::AttributePath { .. } => {}
            Expression::Unary { operand, .. } => operand.collect_rule_names(out),
            Expression::Binary { left, right, .. } => {
                left.collect_rule_names(out);
                right.collect_rule_names(out);
            }
            Expression::RuleCall(call) => {
                out.push(&call.name);
                for arg in &call.arguments {
                    arg.value.collect_rule_names(out);
                }
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal { value } => write!(f, "{}", value),
            Expression::AttributePath { path } => write!(f, "{}", path.join(".")),
            Expression::Unary { op, operand } => write!(f, "{} {}", op, operand),
            Expression::Binary {
                op,
                left,
                right,
                parenthesized,
            } => {
                if *parenthesized {
                    write!(f, "({} {} {})", left, op, right)
                } else {
                    write!(f, "{} {} {}", left, op, right)
                }
            }
            Expression::RuleCall(call) => write!(f, "{}", call),
        }
    }
}

/// Unary operators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "not"),
        }
    }
}

/// Binary operators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `ruleName(arg, ..., param = arg)`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<RuleArgument>,
}

impl RuleCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    /// Append a positional argument
    pub fn arg(mut self, value: Expression) -> Self {
        self.arguments.push(RuleArgument {
            name: None,
            value,
        });
        self
    }

    /// Append a keyword argument
    pub fn kwarg(mut self, name: impl Into<String>, value: Expression) -> Self {
        self.arguments.push(RuleArgument {
            name: Some(name.into()),
            value,
        });
        self
    }
}

impl fmt::Display for RuleCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &arg.name {
                Some(name) => write!(f, "{}={}", name, arg.value)?,
                None => write!(f, "{}", arg.value)?,
            }
        }
        write!(f, ")")
    }
}

/// One argument of a rule call; keyword arguments carry the parameter name
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleArgument {
    #[serde(default)]
    pub name: Option<String>,
    pub value: Expression,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trips_structure() {
        let expr = Expression::binary(
            BinaryOp::And,
            Expression::binary(
                BinaryOp::Gt,
                Expression::dotted("agv.load"),
                Expression::literal(5.0),
            )
            .grouped(),
            Expression::not(Expression::dotted("door.open")),
        );
        assert_eq!(expr.to_string(), "(agv.load > 5) and not door.open");
    }

    #[test]
    fn test_rule_names_include_nested_calls() {
        let inner = RuleCall::new("isHeavy").arg(Expression::dotted("box"));
        let outer = RuleCall::new("canLift").arg(Expression::call(inner));
        let expr = Expression::not(Expression::call(outer));
        assert_eq!(expr.rule_names(), vec!["canLift", "isHeavy"]);
    }

    #[test]
    fn test_expression_json_shape() {
        let expr = Expression::binary(
            BinaryOp::Eq,
            Expression::dotted("button.pressed"),
            Expression::literal(true),
        );
        let json = serde_json::to_value(&expr).unwrap();
        assert_eq!(json["kind"], "binary");
        assert_eq!(json["op"], "eq");
        let back: Expression = serde_json::from_value(json).unwrap();
        assert_eq!(back, expr);
    }
}
