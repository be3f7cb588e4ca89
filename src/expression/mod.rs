//! Macro tokenizer and evaluator.
//!
//! An asset's text is scanned once against its kind's [`Syntax`]; each match
//! becomes an [`Expression`]. Tokenizing has no side effects beyond the
//! returned list: the asset model turns include/URL expressions into
//! dependency edges, and evaluation happens later, at compile time, once
//! every dependency has been compiled.
//!
//! # Evaluation
//!
//! [`render`] walks the expressions in span order and rebuilds the text:
//!
//! ```text
//! gap₀ expr₀ gap₁ expr₁ … exprₙ tail
//! ```
//!
//! Gaps are copied verbatim. Lookup macros (include, URLs, app-config,
//! translations) are answered by a [`Lookup`] implementation. Variable and
//! conditional macros are handled here, with a [`VariableStore`] that lives
//! for one render call and a [`FlowState`] carried from each expression to the
//! next.
//!
//! Elision only guards output. Every expression inside a false branch is still
//! evaluated, so declarations there take effect and lookups still run.
//!
//! # Deferred output
//!
//! A guard over an undeclared variable cannot be decided at build time. The
//! block is then kept whole: the `if`/`else`/`end` macros are copied through
//! verbatim ([`Resolution::Deferred`]) and both branches are rendered, so a
//! runtime templating pass that understands the same syntax can finish the
//! job. `[%= name %]` on an unbound variable is deferred the same way.

mod flow;
pub mod syntax;

pub use flow::FlowState;
pub use syntax::{MacroPattern, MacroTag, Syntax};

use crate::asset::AssetId;
use crate::types::ResourceKind;
use crate::variables::{Value, VariableStore};
use std::ops::Range;

/// Guard of a conditional block.
#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    Truthy(Value),
    Equals(Value, Value),
    NotEquals(Value, Value),
}

/// Every macro the engine understands.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroKind {
    Include { path: String, escaped: bool },
    StylesheetUrl { path: String },
    ScriptUrl { path: String },
    ImageUrl { path: String },
    /// Image target relative to the stylesheet's own target directory.
    ImagePath { path: String },
    ResourceUrl { key: String },
    AppConf { key: String, filter: String },
    Translate { key: String },
    Declare { name: String, value: Value },
    Display { name: String },
    If(Guard),
    Else,
    End,
}

/// A reference from one asset to another, as written in a macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    pub kind: ResourceKind,
    pub path: &'a str,
    /// Includes name a partial; URL macros name a public asset.
    pub include: bool,
}

impl MacroKind {
    /// The asset this macro depends on, if any.
    ///
    /// Include references are typed with the including asset's own kind.
    pub fn reference(&self, owner: ResourceKind) -> Option<Reference<'_>> {
        let (kind, path, include) = match self {
            MacroKind::Include { path, .. } => (owner, path, true),
            MacroKind::StylesheetUrl { path } => (ResourceKind::Stylesheet, path, false),
            MacroKind::ScriptUrl { path } => (ResourceKind::Script, path, false),
            MacroKind::ImageUrl { path } | MacroKind::ImagePath { path } => {
                (ResourceKind::Image, path, false)
            }
            _ => return None,
        };
        Some(Reference {
            kind,
            path: path.as_str(),
            include,
        })
    }
}

/// A macro occurrence in an asset's text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub span: Range<usize>,
    pub kind: MacroKind,
    /// Resolved dependency for include/URL macros, set while parsing.
    pub dependency: Option<AssetId>,
}

/// Result of evaluating one expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Text(String),
    /// Copy the macro's original text through for a later runtime pass.
    Deferred,
}

/// Answers the stateless lookup macros during [`render`].
pub trait Lookup {
    /// Replacement text for an include, URL, resource, app-config or
    /// translation macro.
    fn lookup(&mut self, expr: &Expression) -> String;
}

/// Scan `text` once and return its macros in document order.
///
/// Matches never overlap; unclassifiable matches are dropped.
pub fn tokenize(text: &str, syntax: &Syntax) -> Vec<Expression> {
    syntax
        .regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let span = caps.get(0)?.range();
            let kind = syntax.classify(&caps)?;
            Some(Expression {
                span,
                kind,
                dependency: None,
            })
        })
        .collect()
}

/// Rebuild `text` with every expression replaced by its evaluated output.
pub fn render(text: &str, expressions: &[Expression], lookup: &mut impl Lookup) -> String {
    let mut out = String::with_capacity(text.len());
    let mut vars = VariableStore::new();
    let mut state = FlowState::default();
    let mut cursor = 0;

    for expr in expressions {
        if expr.span.start < cursor || expr.span.end > text.len() {
            log::warn!(
                "skipping expression at {:?}: overlaps previous output",
                expr.span
            );
            continue;
        }
        if !state.elide {
            out.push_str(&text[cursor..expr.span.start]);
        }

        let (next, resolution) = evaluate(expr, state, &mut vars, lookup);
        state = next;
        if !state.elide {
            match resolution {
                Resolution::Text(s) => out.push_str(&s),
                Resolution::Deferred => out.push_str(&text[expr.span.clone()]),
            }
        }
        cursor = expr.span.end;
    }

    if !state.elide {
        out.push_str(&text[cursor..]);
    }
    out
}

/// Evaluate one expression given the state inherited from its predecessor.
pub fn evaluate(
    expr: &Expression,
    state: FlowState,
    vars: &mut VariableStore,
    lookup: &mut impl Lookup,
) -> (FlowState, Resolution) {
    let empty = Resolution::Text(String::new());
    match &expr.kind {
        MacroKind::Declare { name, value } => {
            vars.declare(name.clone(), value.clone());
            (state, empty)
        }
        MacroKind::Display { name } => match vars.get(name) {
            Some(value) => (state, Resolution::Text(value.to_string())),
            None => {
                log::debug!("variable `{name}` is unbound, deferring");
                (state, Resolution::Deferred)
            }
        },
        MacroKind::If(guard) => {
            if state.open {
                log::warn!("conditional at {:?} opened inside an open block", expr.span);
            }
            let next = FlowState::opened(guard.evaluate(vars));
            let resolution = if next.fallback {
                Resolution::Deferred
            } else {
                empty
            };
            (next, resolution)
        }
        MacroKind::Else => {
            if !state.open {
                log::warn!("`else` at {:?} outside a conditional block", expr.span);
                return (state, empty);
            }
            let resolution = if state.fallback {
                Resolution::Deferred
            } else {
                empty
            };
            (state.otherwise(), resolution)
        }
        MacroKind::End => {
            if !state.open {
                log::warn!("`end` at {:?} outside a conditional block", expr.span);
                return (state, empty);
            }
            let resolution = if state.fallback {
                Resolution::Deferred
            } else {
                empty
            };
            (state.closed(), resolution)
        }
        _ => (state, Resolution::Text(lookup.lookup(expr))),
    }
}
