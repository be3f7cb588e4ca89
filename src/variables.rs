//! Asset-local variable store for `[% set %]`, `[%= name %]` and guards.
//!
//! Variables live for exactly one asset's compile pass and are never
//! persisted. A variable can be bound to a literal or aliased to another
//! variable; aliases are followed on read, so an alias declared before its
//! target is bound still resolves once the target exists.

use std::collections::HashMap;
use std::fmt;

/// Upper bound on alias hops, so `a = b`, `b = a` reads as unbound
/// instead of looping.
const MAX_ALIAS_DEPTH: usize = 32;

/// A typed scalar, or a reference to another variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
    Alias(String),
}

impl Value {
    /// Parse a literal as written in a macro.
    ///
    /// - `12`, `-3.5` → `Number`
    /// - `true`, `false` → `Bool`
    /// - `"text"` → `Str` (quotes stripped)
    /// - anything else → `Alias` to the named variable
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if token == "true" {
            return Value::Bool(true);
        }
        if token == "false" {
            return Value::Bool(false);
        }
        if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
            return Value::Str(token[1..token.len() - 1].to_string());
        }
        let numeric = token
            .strip_prefix('-')
            .unwrap_or(token)
            .starts_with(|c: char| c.is_ascii_digit());
        if numeric && let Ok(n) = token.parse::<f64>() {
            return Value::Number(n);
        }
        Value::Alias(token.to_string())
    }

    /// Boolean cast. `None` for an alias, which has to be resolved first.
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Value::Number(n) => Some(*n != 0.0),
            Value::Bool(b) => Some(*b),
            Value::Str(s) => Some(!s.is_empty()),
            Value::Alias(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => f.write_str(s),
            Value::Alias(name) => f.write_str(name),
        }
    }
}

/// Variables bound during one asset's evaluation.
#[derive(Debug, Default)]
pub struct VariableStore {
    vars: HashMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing any previous binding.
    pub fn declare(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Current scalar value of `name`, following aliases.
    ///
    /// Returns `None` when the name, or any name in its alias chain, is
    /// unbound.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let mut current = self.vars.get(name)?;
        for _ in 0..MAX_ALIAS_DEPTH {
            match current {
                Value::Alias(next) => current = self.vars.get(next)?,
                scalar => return Some(scalar),
            }
        }
        None
    }

    /// Resolve an operand: literals stand for themselves, aliases are looked up.
    pub fn resolve<'a>(&'a self, operand: &'a Value) -> Option<&'a Value> {
        match operand {
            Value::Alias(name) => self.get(name),
            scalar => Some(scalar),
        }
    }

    /// Boolean cast of an operand, `None` when indeterminate.
    pub fn truthy(&self, operand: &Value) -> Option<bool> {
        self.resolve(operand)?.truthy()
    }

    /// Typed equality of two operands, `None` when either is indeterminate.
    ///
    /// Values of different types are never equal.
    pub fn equals(&self, left: &Value, right: &Value) -> Option<bool> {
        let left = self.resolve(left)?;
        let right = self.resolve(right)?;
        let eq = match (left, right) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        };
        Some(eq)
    }
}
