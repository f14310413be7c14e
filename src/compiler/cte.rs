//! CTE pre-pass.
//!
//! Every WITH declaration reachable from the root, including those nested
//! in subqueries and in other CTE bodies, is rendered on the root builder
//! before the main query. Inner declarations come first. A declaration
//! shared by several parents is rendered once.

use std::sync::Arc;

use tracing::debug;

use super::{Renderer, Scope};
use crate::builder::CriteriaBuilder;
use crate::error::{CompileError, CompileResult};
use crate::expr::{Expr, ExprKind};
use crate::query::{CteDeclaration, JoinTarget, QueryMetadata};

impl Renderer<'_> {
    /// Render all CTEs under `root`. Returns how many were rendered.
    pub(super) fn render_ctes(&mut self, root: &Expr, b: &mut dyn CriteriaBuilder) -> CompileResult<usize> {
        let mut found = Vec::new();
        collect_ctes(root, &mut found);
        debug!(declarations = found.len(), "discovered CTEs");

        let mut rendered = 0;
        for cte in found {
            if self.session.mark_cte_rendered(Arc::as_ptr(cte) as usize) {
                self.render_cte(cte, b)?;
                rendered += 1;
            }
        }
        Ok(rendered)
    }

    fn render_cte(&mut self, cte: &CteDeclaration, b: &mut dyn CriteriaBuilder) -> CompileResult<()> {
        self.session.push_cte_columns(cte.columns.clone());
        let result = if cte.recursive {
            self.render_recursive_cte(cte, b)
        } else {
            self.render_plain_cte(cte, b)
        };
        self.session.pop_cte_columns();
        result
    }

    fn render_plain_cte(&mut self, cte: &CteDeclaration, b: &mut dyn CriteriaBuilder) -> CompileResult<()> {
        b.with(cte.entity.type_name())?;
        self.compile_query(&cte.body, Scope::cte_body(), b)?;
        b.end()?;
        Ok(())
    }

    /// `with_recursive(E)`, base term, `union`/`union_all`, recursive term, `end`.
    fn render_recursive_cte(&mut self, cte: &CteDeclaration, b: &mut dyn CriteriaBuilder) -> CompileResult<()> {
        let entity = cte.entity.type_name();
        let body = cte
            .body
            .as_subquery()
            .and_then(QueryMetadata::set_operation)
            .unwrap_or(&cte.body);

        let Some((operator, operation)) = body.as_set_operation() else {
            return Err(CompileError::MalformedRecursiveCte(format!(
                "body of {} is not a UNION of base and recursive term",
                entity
            )));
        };
        if !operator.kind.is_union() {
            return Err(CompileError::MalformedRecursiveCte(format!(
                "{} combines its terms with {}, expected UNION or UNION_ALL",
                entity,
                operator.kind.name()
            )));
        }
        let [base, recursive] = operation.args.as_slice() else {
            return Err(CompileError::MalformedRecursiveCte(format!(
                "{} needs exactly a base and a recursive term, got {} operands",
                entity,
                operation.args.len()
            )));
        };
        for term in [base, recursive] {
            let plain = term
                .as_subquery()
                .is_some_and(|meta| meta.set_operation().is_none());
            if !plain {
                return Err(CompileError::MalformedRecursiveCte(format!(
                    "term {} of {} is not a plain query",
                    term, entity
                )));
            }
        }

        b.with_recursive(entity)?;
        self.compile_query(base, Scope::cte_body(), b)?;
        b.set_operation(operator.kind)?;
        self.compile_query(recursive, Scope::cte_body(), b)?;
        b.end()?;
        Ok(())
    }
}

/// Post-order collection: a CTE's own nested declarations precede it.
fn collect_ctes<'e>(expr: &'e Expr, found: &mut Vec<&'e Arc<CteDeclaration>>) {
    match expr.kind() {
        ExprKind::SubQuery(meta) => collect_level(meta, found),
        ExprKind::Operation(op) => op.args.iter().for_each(|arg| collect_ctes(arg, found)),
        ExprKind::Tuple(items) => items.iter().for_each(|item| collect_ctes(item, found)),
        ExprKind::Template(t) => t.args.iter().for_each(|arg| collect_ctes(arg, found)),
        ExprKind::Constant(_) | ExprKind::Path(_) | ExprKind::Param(_) => {}
    }
}

fn collect_level<'e>(meta: &'e QueryMetadata, found: &mut Vec<&'e Arc<CteDeclaration>>) {
    for cte in meta.ctes() {
        collect_ctes(&cte.body, found);
        found.push(cte);
    }
    if let Some(set) = meta.set_operation() {
        collect_ctes(set, found);
    }
    for window in meta.windows() {
        collect_ctes(&window.definition, found);
    }
    for join in &meta.joins {
        if let JoinTarget::Expr(target) = &join.target {
            collect_ctes(target, found);
        }
        if let Some(condition) = &join.condition {
            collect_ctes(condition, found);
        }
    }
    let clauses = meta
        .projection
        .iter()
        .chain(&meta.where_clause)
        .chain(&meta.group_by)
        .chain(&meta.having)
        .chain(meta.order_by.iter().map(|order| &order.target));
    for expr in clauses {
        collect_ctes(expr, found);
    }
}
