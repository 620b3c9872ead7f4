//! Expression Language
//!
//! Event handlers and `Runtime::eval` run small JavaScript-like programs:
//! `;`-separated expressions with literals, member access, calls,
//! arithmetic, comparisons, logical operators, the conditional operator,
//! assignment and `++`/`--`.
//!
//! Programs are parsed once into an AST and evaluated against a [`Scope`]
//! that supplies `this`, `$item`, `$el`, `$event` and the runtime used to
//! resolve `$name` and `CuboMX.name` references.

mod eval;
mod lexer;
mod parser;

use std::fmt;

use crate::dom::{Event, NodeId};
use crate::error::Result;
use crate::reactive::Proxy;
use crate::runtime::Runtime;
use crate::value::Value;

use parser::{Expr, Parser};

/// A parsed program.
#[derive(Clone)]
pub struct Program {
    source: String,
    statements: Vec<Expr>,
}

impl Program {
    /// The text the program was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("source", &self.source)
            .field("statements", &self.statements.len())
            .finish()
    }
}

/// Parse `source` into a program.
pub fn parse(source: &str) -> Result<Program> {
    let statements = Parser::new(source)?.parse_statements()?;
    Ok(Program {
        source: source.to_string(),
        statements,
    })
}

/// Names visible to a running program.
#[derive(Clone)]
pub struct Scope {
    pub runtime: Runtime,
    /// Nearest component; also the default target of bare assignments.
    pub this: Option<Proxy>,
    /// Nearest item, exposed as `$item`.
    pub item: Option<Proxy>,
    /// Exposed as `$el`.
    pub element: Option<NodeId>,
    /// Exposed as `$event`.
    pub event: Option<Event>,
}

impl Scope {
    /// A scope with no instance, element or event bound.
    pub fn global(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            this: None,
            item: None,
            element: None,
            event: None,
        }
    }

    pub fn with_this(mut self, this: Proxy) -> Self {
        self.this = Some(this);
        self
    }
}

/// Run every statement of `program`, returning the last statement's value.
pub fn evaluate(program: &Program, scope: &Scope) -> Result<Value> {
    let evaluator = eval::Evaluator::new(scope);
    let mut last = Value::Undefined;
    for statement in &program.statements {
        last = evaluator.eval(statement)?;
    }
    Ok(last)
}
