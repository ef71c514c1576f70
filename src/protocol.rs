//! Wire protocol between the engine and its workers.
//!
//! Tasks travel to the worker as a single newline-delimited compact JSON
//! line encoding a [`TaskUnit`]: captured-variable [`Binding`]s followed by
//! a body [`Expr`]. Results travel back the same way as a [`ResultUnit`]:
//! either a plain value or a tagged signal carrying a category and payload.
//!
//! The expression language is deliberately small — the printable subset the
//! engine guarantees to move across the process boundary is JSON scalars,
//! strings, variable names, nested lists, a handful of builtin operations,
//! and an explicit raise form. Anything richer is a caller constraint, not
//! a checked precondition.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;

/// Category used for signals the worker synthesizes itself (unbound
/// variables, type mismatches), as opposed to categories chosen at an
/// explicit raise site.
pub const GENERIC_ERROR_CATEGORY: &str = "error";

/// Builtin operations available to task expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Numeric addition over all arguments.
    Add,
    /// Numeric subtraction, left to right.
    Sub,
    /// Numeric multiplication over all arguments.
    Mul,
    /// String concatenation over all arguments.
    Concat,
}

/// A deferred computation, evaluated inside the worker process.
///
/// # Examples
///
/// ```
/// use offload::{Expr, Op};
/// use serde_json::json;
/// use std::collections::HashMap;
///
/// let expr = Expr::Call {
///     op: Op::Add,
///     args: vec![Expr::Value(json!(1)), Expr::Value(json!(2))],
/// };
/// assert_eq!(expr.eval(&HashMap::new()).unwrap(), json!(3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Expr {
    /// A literal JSON value.
    Value(Value),
    /// A reference to a captured variable, resolved against the task's
    /// bindings at evaluation time.
    Var(String),
    /// A list whose elements are themselves evaluated.
    List(Vec<Expr>),
    /// A builtin operation applied to evaluated arguments.
    Call {
        /// The builtin to apply.
        op: Op,
        /// Argument expressions, evaluated left to right.
        args: Vec<Expr>,
    },
    /// Raise a structured signal with the given category and payload.
    Raise {
        /// Signal category, surfaced verbatim to the caller.
        category: String,
        /// Arbitrary payload, surfaced verbatim to the caller.
        payload: Value,
    },
}

/// A structured signal produced during evaluation — either an explicit
/// [`Expr::Raise`] or a failure the evaluator synthesizes (unbound
/// variable, type mismatch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Signal category.
    pub category: String,
    /// Signal payload.
    pub payload: Value,
}

impl Signal {
    fn generic(message: impl Into<String>) -> Self {
        Self {
            category: GENERIC_ERROR_CATEGORY.to_string(),
            payload: Value::String(message.into()),
        }
    }
}

impl Expr {
    /// Wraps any serializable value as a literal expression.
    ///
    /// Fails with a marshal error when the value cannot be represented as
    /// JSON (for example a map with non-string keys), before any process
    /// spawns.
    ///
    /// # Examples
    ///
    /// ```
    /// use offload::Expr;
    ///
    /// let expr = Expr::value(&vec![1, 2, 3]).unwrap();
    /// assert_eq!(expr, Expr::Value(serde_json::json!([1, 2, 3])));
    /// ```
    pub fn value<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Value(serde_json::to_value(value)?))
    }

    /// References a captured variable by name.
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// Evaluates the expression against a binding environment.
    ///
    /// Evaluation failures are reported as [`Signal`]s: explicit raises
    /// keep their category and payload, evaluator-synthesized failures use
    /// [`GENERIC_ERROR_CATEGORY`].
    pub fn eval(&self, env: &HashMap<String, Value>) -> std::result::Result<Value, Signal> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::Var(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| Signal::generic(format!("unbound variable: {name}"))),
            Self::List(items) => items
                .iter()
                .map(|item| item.eval(env))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array),
            Self::Call { op, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.eval(env))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                apply(*op, &args)
            },
            Self::Raise { category, payload } => Err(Signal {
                category: category.clone(),
                payload: payload.clone(),
            }),
        }
    }
}

fn apply(op: Op, args: &[Value]) -> std::result::Result<Value, Signal> {
    match op {
        Op::Add => fold_numeric(op, args, i64::checked_add, |a, b| a + b),
        Op::Sub => fold_numeric(op, args, i64::checked_sub, |a, b| a - b),
        Op::Mul => fold_numeric(op, args, i64::checked_mul, |a, b| a * b),
        Op::Concat => {
            let mut out = String::new();
            for arg in args {
                match arg {
                    Value::String(s) => out.push_str(s),
                    other => {
                        return Err(Signal::generic(format!(
                            "concat expects strings, got {other}"
                        )))
                    },
                }
            }
            Ok(Value::String(out))
        },
    }
}

/// Folds a numeric operation over the arguments, staying in integer
/// arithmetic until a float appears. Integer overflow is a signal, not
/// a wrap or a panic — the worker must never die on printable input.
fn fold_numeric(
    op: Op,
    args: &[Value],
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> std::result::Result<Value, Signal> {
    enum Acc {
        Int(i64),
        Float(f64),
    }

    let mut acc: Option<Acc> = None;
    for arg in args {
        let next = if let Some(n) = arg.as_i64() {
            Acc::Int(n)
        } else if let Some(f) = arg.as_f64() {
            Acc::Float(f)
        } else {
            return Err(Signal::generic(format!(
                "{op:?} expects numbers, got {arg}"
            )));
        };

        acc = Some(match (acc, next) {
            (None, next) => next,
            (Some(Acc::Int(a)), Acc::Int(b)) => match int_op(a, b) {
                Some(n) => Acc::Int(n),
                None => {
                    return Err(Signal::generic(format!(
                        "{op:?} overflowed the 64-bit integer range"
                    )))
                },
            },
            (Some(Acc::Int(a)), Acc::Float(b)) => Acc::Float(float_op(a as f64, b)),
            (Some(Acc::Float(a)), Acc::Int(b)) => Acc::Float(float_op(a, b as f64)),
            (Some(Acc::Float(a)), Acc::Float(b)) => Acc::Float(float_op(a, b)),
        });
    }

    match acc {
        Some(Acc::Int(n)) => Ok(Value::from(n)),
        Some(Acc::Float(f)) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| Signal::generic(format!("{op:?} produced a non-finite number"))),
        None => Err(Signal::generic(format!("{op:?} requires at least one argument"))),
    }
}

/// A captured-variable reproduction statement: `name := value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Variable name as it appears in task expressions.
    pub name: String,
    /// Snapshot of the value at capture time.
    pub value: Value,
}

impl Binding {
    /// Creates a binding from any serializable value.
    pub fn new<T: Serialize>(name: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            value: serde_json::to_value(value)?,
        })
    }

    /// Renders the binding as a human-readable reproduction statement.
    ///
    /// # Examples
    ///
    /// ```
    /// use offload::Binding;
    ///
    /// let b = Binding::new("mail-x", &1).unwrap();
    /// assert_eq!(b.statement(), "mail-x := 1");
    /// ```
    pub fn statement(&self) -> String {
        format!("{} := {}", self.name, self.value)
    }
}

/// One unit of deferred work sent to a worker: reproduction statements for
/// captured variables, then the body expression to evaluate.
///
/// Created per launch, immutable, consumed by marshaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUnit {
    /// Captured-variable bindings, applied before the body evaluates.
    /// Later bindings shadow earlier ones of the same name.
    pub bindings: Vec<Binding>,
    /// The deferred computation.
    pub body: Expr,
}

impl TaskUnit {
    /// A task with no captured variables.
    pub fn new(body: Expr) -> Self {
        Self {
            bindings: Vec::new(),
            body,
        }
    }

    /// A task with captured variables prepended.
    pub fn with_bindings(bindings: Vec<Binding>, body: Expr) -> Self {
        Self { bindings, body }
    }

    /// Marshals the task as one compact JSON line (no trailing newline).
    ///
    /// Compact JSON never contains a literal newline, so the line is safe
    /// for newline-delimited framing.
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reads a task back from one wire line.
    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Builds the evaluation environment from the bindings.
    pub fn environment(&self) -> HashMap<String, Value> {
        self.bindings
            .iter()
            .map(|b| (b.name.clone(), b.value.clone()))
            .collect()
    }
}

/// What a worker prints before exiting: a plain value on success, or a
/// tagged signal when the task raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultUnit {
    /// Successful evaluation result.
    Value(Value),
    /// A signal raised during evaluation; the wire form of the
    /// `(ERROR_MARKER, category, payload)` tag.
    Signal {
        /// Signal category.
        category: String,
        /// Signal payload.
        payload: Value,
    },
}

impl ResultUnit {
    /// Marshals the unit as one compact JSON line (no trailing newline).
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<Signal> for ResultUnit {
    fn from(signal: Signal) -> Self {
        Self::Signal {
            category: signal.category,
            payload: signal.payload,
        }
    }
}

/// Scans collected worker output from the end and returns the last
/// complete result unit, tolerating incidental output on earlier lines.
///
/// Returns `None` when no line parses as a result unit.
///
/// # Examples
///
/// ```
/// use offload::protocol::{parse_trailing, ResultUnit};
///
/// let out = b"warming up\n{\"value\":42}\n";
/// assert_eq!(
///     parse_trailing(out),
///     Some(ResultUnit::Value(serde_json::json!(42)))
/// );
/// ```
pub fn parse_trailing(output: &[u8]) -> Option<ResultUnit> {
    let text = String::from_utf8_lossy(output);
    text.lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(|line| serde_json::from_str(line).ok())
}
