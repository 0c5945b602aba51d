//! Expression evaluator: gates, conditions, loop limits and rules
//!
//! Evaluation is pure. It reads the instance store and the rule book and
//! never coerces between types: an operator applied to operands it does not
//! accept fails with [`EvalError::TypeMismatch`].

use crate::errors::{EvalError, EvalResult};
use crate::store::{InstanceStore, RuleBook};
use materialflow_types::{
    Attribute, BinaryOp, Expression, Rule, RuleArgument, RuleCall, UnaryOp, Value,
};
use std::collections::HashMap;

/// Default bound on rule nesting and stored-path indirection
pub const DEFAULT_MAX_RULE_DEPTH: usize = 32;

/// Evaluates expressions against the current instance values
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(
        &self,
        expression: &Expression,
        instances: &InstanceStore,
        rules: &RuleBook,
    ) -> EvalResult<Value>;

    /// Evaluate an expression that must produce a boolean
    fn evaluate_condition(
        &self,
        expression: &Expression,
        instances: &InstanceStore,
        rules: &RuleBook,
    ) -> EvalResult<bool> {
        match self.evaluate(expression, instances, rules)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::NotBoolean {
                expression: expression.to_string(),
                found: other.type_name(),
            }),
        }
    }
}

/// The standard evaluator
#[derive(Clone, Debug)]
pub struct StandardEvaluator {
    max_depth: usize,
}

impl StandardEvaluator {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_RULE_DEPTH,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    fn eval(
        &self,
        expression: &Expression,
        instances: &InstanceStore,
        rules: &RuleBook,
        depth: usize,
    ) -> EvalResult<Value> {
        match expression {
            Expression::Literal { value } => Ok(value.clone()),
            Expression::AttributePath { path } => self.resolve_path(path, instances, depth),
            Expression::Unary {
                op: UnaryOp::Not,
                operand,
            } => match self.eval(operand, instances, rules, depth)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(EvalError::TypeMismatch {
                    operator: UnaryOp::Not.to_string(),
                    operands: other.type_name().to_string(),
                }),
            },
            Expression::Binary {
                op, left, right, ..
            } => {
                let left = self.eval(left, instances, rules, depth)?;
                let right = self.eval(right, instances, rules, depth)?;
                apply_binary(*op, left, right)
            }
            Expression::RuleCall(call) => self.invoke(call, instances, rules, depth),
        }
    }

    // ── Attribute paths ──────────────────────────────────────────────

    fn resolve_path(
        &self,
        path: &[String],
        instances: &InstanceStore,
        depth: usize,
    ) -> EvalResult<Value> {
        if depth > self.max_depth {
            return Err(EvalError::RecursionLimit {
                limit: self.max_depth,
            });
        }
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| EvalError::IncompletePath(String::new()))?;
        if rest.is_empty() {
            return Err(EvalError::IncompletePath(path.join(".")));
        }

        let mut instance = instances
            .get(first)
            .ok_or_else(|| EvalError::UnknownInstance(first.clone()))?;
        for (i, segment) in rest.iter().enumerate() {
            let attribute =
                instance
                    .attribute(segment)
                    .ok_or_else(|| EvalError::UnknownAttribute {
                        instance: instance.name.clone(),
                        attribute: segment.clone(),
                    })?;

            if i + 1 == rest.len() {
                return match attribute {
                    Attribute::Primitive(value) => Ok(value.clone()),
                    Attribute::Path(stored) => self.resolve_path(stored, instances, depth + 1),
                    Attribute::Instance(_) => Err(EvalError::IncompletePath(path.join("."))),
                };
            }

            let next = attribute
                .instance_name()
                .ok_or_else(|| EvalError::NotAnInstance {
                    instance: instance.name.clone(),
                    attribute: segment.clone(),
                })?;
            instance = instances
                .get(next)
                .ok_or_else(|| EvalError::UnknownInstance(next.to_string()))?;
        }
        Err(EvalError::IncompletePath(path.join(".")))
    }

    // ── Rules ────────────────────────────────────────────────────────

    fn invoke(
        &self,
        call: &RuleCall,
        instances: &InstanceStore,
        rules: &RuleBook,
        depth: usize,
    ) -> EvalResult<Value> {
        if depth >= self.max_depth {
            return Err(EvalError::RecursionLimit {
                limit: self.max_depth,
            });
        }
        let rule = rules
            .get(&call.name)
            .ok_or_else(|| EvalError::UnknownRule(call.name.clone()))?;
        let bindings = bind_arguments(rule, &call.arguments)?;

        for body in &rule.expressions {
            let substituted = substitute(body, &bindings);
            match self.eval(&substituted, instances, rules, depth + 1)? {
                Value::Bool(true) => {}
                Value::Bool(false) => return Ok(Value::Bool(false)),
                other => {
                    return Err(EvalError::NotBoolean {
                        expression: body.to_string(),
                        found: other.type_name(),
                    })
                }
            }
        }
        Ok(Value::Bool(true))
    }
}

impl Default for StandardEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEvaluator for StandardEvaluator {
    fn evaluate(
        &self,
        expression: &Expression,
        instances: &InstanceStore,
        rules: &RuleBook,
    ) -> EvalResult<Value> {
        self.eval(expression, instances, rules, 0)
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> EvalResult<Value> {
    use BinaryOp::*;

    let mismatch = |left: &Value, right: &Value| EvalError::TypeMismatch {
        operator: op.symbol().to_string(),
        operands: format!("{} and {}", left.type_name(), right.type_name()),
    };

    match (op, &left, &right) {
        (Add, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Add, Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (Sub, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
        (Mul, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
        (Div, Value::Number(_), Value::Number(b)) if *b == 0.0 => Err(EvalError::DivisionByZero),
        (Div, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),

        (Lt | Le | Gt | Ge, Value::Number(a), Value::Number(b)) => {
            Ok(Value::Bool(compare(op, a.partial_cmp(b))))
        }
        (Lt | Le | Gt | Ge, Value::String(a), Value::String(b)) => {
            Ok(Value::Bool(compare(op, Some(a.cmp(b)))))
        }

        (Eq | Ne, _, _) if left.type_name() == right.type_name() => {
            let equal = left == right;
            Ok(Value::Bool(if op == Eq { equal } else { !equal }))
        }

        (And, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
        (Or, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),

        _ => Err(mismatch(&left, &right)),
    }
}

fn compare(op: BinaryOp, ordering: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::*;
    match (op, ordering) {
        (_, None) => false,
        (BinaryOp::Lt, Some(o)) => o == Less,
        (BinaryOp::Le, Some(o)) => o != Greater,
        (BinaryOp::Gt, Some(o)) => o == Greater,
        (BinaryOp::Ge, Some(o)) => o != Less,
        _ => false,
    }
}

/// Bind call arguments to the rule's parameters
///
/// Positional arguments fill parameters in declaration order, keyword
/// arguments fill them by name, declared defaults fill the rest.
fn bind_arguments(rule: &Rule, arguments: &[RuleArgument]) -> EvalResult<HashMap<String, Expression>> {
    let mut bound: HashMap<String, Expression> = HashMap::new();

    let positional: Vec<&Expression> = arguments
        .iter()
        .filter(|a| a.name.is_none())
        .map(|a| &a.value)
        .collect();
    if positional.len() > rule.parameters.len() {
        return Err(EvalError::TooManyArguments {
            rule: rule.name.clone(),
            expected: rule.parameters.len(),
            found: positional.len(),
        });
    }
    for (parameter, value) in rule.parameters.iter().zip(positional) {
        bound.insert(parameter.name.clone(), value.clone());
    }

    for argument in arguments {
        let Some(name) = &argument.name else { continue };
        if !rule.parameters.iter().any(|p| &p.name == name) {
            return Err(EvalError::UnknownParameter {
                rule: rule.name.clone(),
                parameter: name.clone(),
            });
        }
        if bound.insert(name.clone(), argument.value.clone()).is_some() {
            return Err(EvalError::DuplicateArgument {
                rule: rule.name.clone(),
                parameter: name.clone(),
            });
        }
    }

    for parameter in &rule.parameters {
        if bound.contains_key(&parameter.name) {
            continue;
        }
        let default = parameter
            .default
            .clone()
            .ok_or_else(|| EvalError::MissingArgument {
                rule: rule.name.clone(),
                parameter: parameter.name.clone(),
            })?;
        bound.insert(parameter.name.clone(), default);
    }
    Ok(bound)
}

/// Replace parameter references in `expression` with their bound arguments
///
/// A path starting with a parameter bound to another path is spliced, so
/// `p.weight` with `p = pallet` reads `pallet.weight`. A bare parameter is
/// replaced by its argument. Parameters shadow instances of the same name.
fn substitute(expression: &Expression, bindings: &HashMap<String, Expression>) -> Expression {
    match expression {
        Expression::Literal { .. } => expression.clone(),
        Expression::AttributePath { path } => {
            let Some((head, tail)) = path.split_first() else {
                return expression.clone();
            };
            match bindings.get(head) {
                Some(Expression::AttributePath { path: bound }) => Expression::AttributePath {
                    path: bound.iter().chain(tail).cloned().collect(),
                },
                Some(bound) if tail.is_empty() => bound.clone(),
                _ => expression.clone(),
            }
        }
        Expression::Unary { op, operand } => Expression::Unary {
            op: *op,
            operand: Box::new(substitute(operand, bindings)),
        },
        Expression::Binary {
            op,
            left,
            right,
            parenthesized,
        } => Expression::Binary {
            op: *op,
            left: Box::new(substitute(left, bindings)),
            right: Box::new(substitute(right, bindings)),
            parenthesized: *parenthesized,
        },
        Expression::RuleCall(call) => Expression::RuleCall(RuleCall {
            name: call.name.clone(),
            arguments: call
                .arguments
                .iter()
                .map(|a| RuleArgument {
                    name: a.name.clone(),
                    value: substitute(&a.value, bindings),
                })
                .collect(),
        }),
    }
}
