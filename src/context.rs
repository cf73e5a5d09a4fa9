//! Compilation/evaluation context.
//!
//! One [Context] holds everything with query-spanning lifetime: the
//! backend handle, the datatype store, id counters for variables and
//! columns, accumulated diagnostics, and the per-stage dumps.

use anyhow::Result;

use crate::ast::cols::{ColName, ColTree};
use crate::ast::pt::ColumnVar;
use crate::ast::tc::{TcExpr, TcVar};
use crate::ast::ty::{Ty, TypeStore};
use crate::backend::Backend;
use crate::error::{ErrorMessage, ErrorMessages, Span};
use crate::eval;
use crate::parser;
use crate::semantic;
use crate::utils::{IdGenerator, NameGenerator};
use crate::value::Value;

/// Pipeline stages with dumpable intermediate state, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum DumpStage {
    Parser,
    Resolve,
    Normalize,
    Unify,
    MovePaths,
    BindNil,
    Dequantify,
    Tuplify,
    TypeInf,
    NoRenames,
    BaseOpt,
    StepJoins,
}

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Record intermediate state after every pass.
    pub dump: bool,
    /// Record evaluation trace lines.
    pub trace: bool,
}

/// A compiled query, ready to run any number of times.
#[derive(Debug)]
pub struct Query {
    pub(crate) tc: TcExpr,
    pub(crate) datatype: Ty,
    pub(crate) colnames: ColTree,
}

impl Query {
    pub fn datatype(&self) -> Ty {
        self.datatype
    }

    pub fn colnames(&self) -> &ColTree {
        &self.colnames
    }
}

pub struct Context {
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) types: TypeStore,
    pub options: Options,

    pub(crate) errors: Vec<ErrorMessage>,
    pub(crate) warnings: Vec<ErrorMessage>,
    pub(crate) dumps: Vec<(DumpStage, String)>,
    pub(crate) trace: Vec<String>,

    column_ids: IdGenerator<usize>,
    var_ids: IdGenerator<usize>,
    colnames: NameGenerator,
}

impl Context {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Context {
            backend,
            types: TypeStore::new(),
            options: Options::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
            dumps: Vec::new(),
            trace: Vec::new(),
            column_ids: IdGenerator::new(),
            var_ids: IdGenerator::new(),
            colnames: NameGenerator::new(".C"),
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Compile a query string down to executable tuple calculus.
    ///
    /// On failure the accumulated errors are returned (and also remain
    /// readable via [Context::errors] until the next compilation).
    pub fn compile(&mut self, text: &str) -> Result<Query, ErrorMessages> {
        self.errors.clear();
        self.warnings.clear();
        self.dumps.clear();

        let result = parser::parse(self, text)
            .and_then(|pt| semantic::resolve(self, pt))
            .and_then(|tc| crate::opt::optimize(self, tc));

        match result {
            Ok(query) if self.errors.is_empty() => Ok(query),
            Ok(_) => Err(self.error_messages().composed("query", text, false)),
            Err(e) => {
                let mut messages = crate::error::downcast(e);
                messages.inner.extend(self.errors.iter().cloned());
                Err(messages.composed("query", text, false))
            }
        }
    }

    /// Evaluate a compiled query against the backend.
    pub fn run(&mut self, query: &Query) -> Result<Value, ErrorMessages> {
        self.trace.clear();
        eval::run(self, query).map_err(crate::error::downcast)
    }

    // ---- diagnostics ----

    pub fn errors(&self) -> ErrorMessages {
        self.error_messages()
    }

    pub fn warnings(&self) -> ErrorMessages {
        ErrorMessages {
            inner: self.warnings.clone(),
        }
    }

    /// The per-stage dumps recorded so far, oldest first. Draining.
    pub fn take_dumps(&mut self) -> Vec<(DumpStage, String)> {
        std::mem::take(&mut self.dumps)
    }

    /// The evaluation trace recorded by the last run. Draining.
    pub fn take_trace(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace)
    }

    fn error_messages(&self) -> ErrorMessages {
        ErrorMessages {
            inner: self.errors.clone(),
        }
    }

    pub(crate) fn complain(&mut self, span: Option<Span>, text: String) {
        self.errors.push(ErrorMessage {
            reason: text,
            hint: None,
            span,
            display: None,
            location: None,
        });
    }

    pub(crate) fn warn(&mut self, span: Option<Span>, text: String) {
        self.warnings.push(ErrorMessage {
            reason: text,
            hint: None,
            span,
            display: None,
            location: None,
        });
    }

    pub(crate) fn add_dump(&mut self, stage: DumpStage, text: String) {
        if self.options.dump {
            self.dumps.push((stage, text));
        }
    }

    // ---- id services ----

    pub(crate) fn next_column_id(&mut self) -> usize {
        self.column_ids.next().unwrap()
    }

    /// A column variable with a system-chosen name.
    pub(crate) fn fresh_columnvar(&mut self) -> ColumnVar {
        let id = self.next_column_id();
        ColumnVar::new(format!(".t{}", id), id, None)
    }

    /// A fresh anonymous column name.
    pub(crate) fn fresh_colname(&mut self) -> ColName {
        ColName::new(self.colnames.gen())
    }

    /// A fresh tuple-calculus variable.
    pub(crate) fn fresh_tcvar(&mut self) -> TcVar {
        TcVar::new(self.var_ids.next().unwrap())
    }
}
