//! Query compiler.
//!
//! Lowers a frozen expression tree into calls against a [`CriteriaBuilder`]:
//!
//! ```text
//! Expr ──► CTE pre-pass ──► visit ──┬─► joins ──► windows ──► clauses ──► projection
//!                                   └─► set operations (recursive visit per operand)
//!                                                   │
//!                                                   ▼
//!                                  CriteriaBuilder + Bindings
//! ```
//!
//! # Example
//!
//! ```ignore
//! use criteria_compiler::prelude::*;
//!
//! let b = Path::root("Base", "b");
//! let query = QueryMetadata::new().from(&b).select(b.get("name", "String"));
//!
//! let templates = JpqlTemplates::default();
//! let metamodel = StaticMetamodel::new();
//! let compiled = QueryCompiler::new(&templates, &metamodel)
//!     .render(&query.into_expr(), RecordingBuilder::new())?;
//! println!("{}", compiled.builder.trace());
//! ```

mod cte;
mod joins;
mod projection;
mod set_ops;
mod window;

use tracing::debug;

use crate::builder::CriteriaBuilder;
use crate::config::{CompilerSettings, LabelSettings};
use crate::error::{CompileError, CompileResult};
use crate::expr::{Expr, ExprKind};
use crate::metamodel::EntityMetamodel;
use crate::query::{OrderSpecifier, QueryMetadata, QueryModifiers};
use crate::serializer::Serializer;
use crate::session::{Bindings, RenderSession};
use crate::templates::OperatorTable;

// ============================================================================
// Options
// ============================================================================

/// Per-call switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub labels: LabelSettings,

    /// Apply the root query's LIMIT/OFFSET.
    pub apply_root_modifiers: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            labels: LabelSettings::default(),
            apply_root_modifiers: true,
        }
    }
}

impl CompileOptions {
    pub fn from_settings(settings: &CompilerSettings) -> Self {
        Self {
            labels: settings.labels.clone(),
            apply_root_modifiers: settings.rendering.apply_root_modifiers,
        }
    }

    pub fn with_labels(mut self, labels: LabelSettings) -> Self {
        self.labels = labels;
        self
    }

    /// Leave the root LIMIT/OFFSET to the caller, e.g. a paging wrapper.
    pub fn with_root_modifiers(mut self, apply: bool) -> Self {
        self.apply_root_modifiers = apply;
        self
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Result of one `render` call.
#[derive(Debug, Clone)]
pub struct CompiledQuery<B> {
    /// The populated target builder.
    pub builder: B,

    /// Constants and parameters the caller must bind.
    pub bindings: Bindings,
}

/// Entry point. Holds only shared collaborators and options, so one
/// compiler can serve any number of independent `render` calls.
#[derive(Debug, Clone)]
pub struct QueryCompiler<'a> {
    templates: &'a dyn OperatorTable,
    metamodel: &'a dyn EntityMetamodel,
    options: CompileOptions,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(templates: &'a dyn OperatorTable, metamodel: &'a dyn EntityMetamodel) -> Self {
        Self {
            templates,
            metamodel,
            options: CompileOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile `expr` into `builder`.
    ///
    /// `expr` must be a subquery or a set-operation tree. Every CTE declared
    /// anywhere in the tree is rendered first, then the query itself.
    pub fn render<B: CriteriaBuilder>(
        &self,
        expr: &Expr,
        mut builder: B,
    ) -> CompileResult<CompiledQuery<B>> {
        if expr.as_subquery().is_none() && expr.as_set_operation().is_none() {
            return Err(CompileError::UnsupportedConstruct(format!(
                "{} is not a query",
                expr
            )));
        }

        let mut renderer = Renderer {
            templates: self.templates,
            metamodel: self.metamodel,
            options: &self.options,
            session: RenderSession::new(self.options.labels.clone()),
        };

        let ctes = renderer.render_ctes(expr, &mut builder)?;
        renderer.compile_query(expr, Scope::root(), &mut builder)?;

        debug!(
            ctes,
            constants = renderer.session.constant_count(),
            "rendered query"
        );

        Ok(CompiledQuery {
            builder,
            bindings: renderer.session.into_bindings(),
        })
    }
}

// ============================================================================
// Renderer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    /// The top-level criteria query.
    Criteria,
    /// A CTE, subquery-from or subquery-join body: projections are binds.
    CteBody,
    /// A subquery announced through a `*_subqueries` call.
    Subquery,
}

#[derive(Debug, Clone, Copy)]
struct Scope {
    kind: ScopeKind,
    /// Inside one operand of a set operation.
    operand: bool,
    /// The expression handed to `render`.
    root: bool,
}

impl Scope {
    fn root() -> Self {
        Self {
            kind: ScopeKind::Criteria,
            operand: false,
            root: true,
        }
    }

    fn cte_body() -> Self {
        Self {
            kind: ScopeKind::CteBody,
            operand: false,
            root: false,
        }
    }

    fn subquery() -> Self {
        Self {
            kind: ScopeKind::Subquery,
            operand: false,
            root: false,
        }
    }

    fn operand(self) -> Self {
        Self {
            operand: true,
            root: false,
            ..self
        }
    }
}

/// What a visit left open on the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Query,
    /// A set operation still accepting operands.
    OngoingSet,
    /// A set operation closed by `end_set`, accepting ORDER BY and LIMIT.
    FinalSet,
}

/// Clause expressions that may carry subqueries.
#[derive(Debug, Clone, Copy)]
enum Clause<'s> {
    Select { alias: Option<&'s str> },
    Where,
    Having,
    On,
}

struct Renderer<'r> {
    templates: &'r dyn OperatorTable,
    metamodel: &'r dyn EntityMetamodel,
    options: &'r CompileOptions,
    session: RenderSession,
}

impl Renderer<'_> {
    fn serialize(&mut self, expr: &Expr) -> CompileResult<String> {
        Serializer::new(self.templates, &mut self.session).serialize(expr)
    }

    /// Visit `expr` and close whatever set operation it left open.
    fn compile_query(
        &mut self,
        expr: &Expr,
        scope: Scope,
        b: &mut dyn CriteriaBuilder,
    ) -> CompileResult<()> {
        let mut shape = self.visit(expr, scope, b)?;
        if shape == Shape::OngoingSet {
            b.end_set()?;
            shape = Shape::FinalSet;
        }
        if shape == Shape::FinalSet {
            if let Some(meta) = expr.as_subquery() {
                self.render_order_by(&meta.order_by, b)?;
                self.render_modifiers(&meta.modifiers, scope, b)?;
            }
        }
        Ok(())
    }

    fn visit(&mut self, expr: &Expr, scope: Scope, b: &mut dyn CriteriaBuilder) -> CompileResult<Shape> {
        if let Some((operator, operation)) = expr.as_set_operation() {
            return self.render_set_operation(operator, operation, scope, b);
        }
        match expr.kind() {
            ExprKind::SubQuery(meta) => match meta.set_operation() {
                Some(set) => self.visit(set, scope, b),
                None => {
                    self.compile_select(meta, scope, b)?;
                    Ok(Shape::Query)
                }
            },
            _ => Err(CompileError::UnsupportedConstruct(format!(
                "{} cannot stand as a query",
                expr
            ))),
        }
    }

    fn compile_select(
        &mut self,
        meta: &QueryMetadata,
        scope: Scope,
        b: &mut dyn CriteriaBuilder,
    ) -> CompileResult<()> {
        self.session.collect_parameters(&meta.params);

        self.render_joins(meta, scope, b)?;
        for window in meta.windows() {
            self.render_window(window, b)?;
        }

        if meta.distinct {
            b.distinct()?;
        }
        if let Some(filter) = &meta.where_clause {
            self.set_clause(filter, Clause::Where, b)?;
        }
        for group in &meta.group_by {
            let text = self.render_plain(group, "GROUP BY")?;
            b.group_by(&text)?;
        }
        if let Some(having) = &meta.having {
            self.set_clause(having, Clause::Having, b)?;
        }

        self.render_projection(meta, scope, b)?;

        self.render_order_by(&meta.order_by, b)?;
        self.render_modifiers(&meta.modifiers, scope, b)
    }

    fn render_order_by(
        &mut self,
        order_by: &[OrderSpecifier],
        b: &mut dyn CriteriaBuilder,
    ) -> CompileResult<()> {
        for order in order_by {
            let text = self.render_plain(&order.target, "ORDER BY")?;
            b.order_by(&text, order.is_ascending(), order.null_handling)?;
        }
        Ok(())
    }

    fn render_modifiers(
        &mut self,
        modifiers: &QueryModifiers,
        scope: Scope,
        b: &mut dyn CriteriaBuilder,
    ) -> CompileResult<()> {
        if scope.root && !self.options.apply_root_modifiers {
            return Ok(());
        }
        if let Some(limit) = modifiers.limit {
            b.set_max_results(limit)?;
        }
        if let Some(offset) = modifiers.offset {
            b.set_first_result(offset)?;
        }
        Ok(())
    }

    /// Serialize an expression for a clause that cannot hold subqueries.
    fn render_plain(&mut self, expr: &Expr, clause: &str) -> CompileResult<String> {
        let text = self.serialize(expr)?;
        if !self.session.take_subquery_labels().is_empty() {
            let location = match self.session.current_subquery() {
                Some(label) => format!("{} of {}", clause, label),
                None => clause.to_string(),
            };
            return Err(CompileError::UnsupportedConstruct(format!(
                "subqueries are not supported in {}",
                location
            )));
        }
        Ok(text)
    }

    /// Serialize a clause expression and hand it to the builder, compiling
    /// each subquery it references into its own placeholder.
    fn set_clause(&mut self, expr: &Expr, clause: Clause<'_>, b: &mut dyn CriteriaBuilder) -> CompileResult<()> {
        let text = self.serialize(expr)?;
        let subqueries = self.session.take_subquery_labels();

        if subqueries.is_empty() {
            match clause {
                Clause::Select { alias } => b.select(&text, alias)?,
                Clause::Where => b.set_where_expression(&text)?,
                Clause::Having => b.set_having_expression(&text)?,
                Clause::On => b.set_on_expression(&text)?,
            }
            return Ok(());
        }

        match clause {
            Clause::Select { alias } => b.select_subqueries(&text, alias)?,
            Clause::Where => b.set_where_expression_subqueries(&text)?,
            Clause::Having => b.set_having_expression_subqueries(&text)?,
            Clause::On => b.set_on_expression_subqueries(&text)?,
        }
        for (label, subquery) in subqueries {
            b.with_subquery(&label)?;
            self.session.push_subquery_initiator(&label);
            debug!(label = %label, depth = self.session.subquery_depth(), "compiling subquery");
            self.compile_query(&subquery, Scope::subquery(), b)?;
            b.end()?;
            self.session.pop_subquery_initiator();
        }
        b.end_subqueries()?;
        Ok(())
    }
}
