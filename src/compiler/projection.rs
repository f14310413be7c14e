//! Projection rendering and CTE column binding.

use tracing::debug;

use super::{Clause, Renderer, Scope, ScopeKind};
use crate::builder::CriteriaBuilder;
use crate::error::{CompileError, CompileResult};
use crate::expr::{Expr, ExprKind, Operator, Path};
use crate::metamodel::AttributeInfo;
use crate::query::{JoinExpression, QueryMetadata};

/// A projection item with its ALIAS and BIND markers peeled off.
#[derive(Debug, Clone, Copy)]
struct SelectItem<'e> {
    expr: &'e Expr,
    alias: Option<&'e str>,
    cte_attribute: Option<&'e Path>,
}

impl<'e> SelectItem<'e> {
    /// Markers may nest in either order: `ALIAS(BIND(e, attr), a)` or
    /// `BIND(ALIAS(e, a), attr)`.
    fn resolve(item: &'e Expr) -> Self {
        let mut resolved = SelectItem {
            expr: item,
            alias: None,
            cte_attribute: None,
        };
        while let Some(op) = resolved.expr.as_operation() {
            match (op.operator, op.args.as_slice()) {
                (Operator::Alias, [inner, alias]) => {
                    resolved.alias = alias
                        .as_path()
                        .map(Path::name)
                        .or_else(|| alias.as_constant().and_then(|v| v.as_str()));
                    resolved.expr = inner;
                }
                (Operator::Bind, [inner, attribute]) => {
                    resolved.cte_attribute = attribute.as_path();
                    resolved.expr = inner;
                }
                _ => break,
            }
        }
        resolved
    }
}

impl Renderer<'_> {
    pub(super) fn render_projection(
        &mut self,
        meta: &QueryMetadata,
        scope: Scope,
        b: &mut dyn CriteriaBuilder,
    ) -> CompileResult<()> {
        let Some(projection) = &meta.projection else {
            return Ok(());
        };
        if scope.kind == ScopeKind::CteBody {
            return self.render_cte_projection(meta, projection, b);
        }

        match projection.kind() {
            ExprKind::Tuple(items) if scope.kind == ScopeKind::Criteria && !scope.operand => {
                b.select_new(items.len())?;
                for item in items {
                    self.render_select(item, b)?;
                }
                b.end_select_new()?;
            }
            ExprKind::Tuple(items) => {
                for item in items {
                    self.render_select(item, b)?;
                }
            }
            _ => self.render_select(projection, b)?,
        }
        Ok(())
    }

    fn render_select(&mut self, item: &Expr, b: &mut dyn CriteriaBuilder) -> CompileResult<()> {
        let item = SelectItem::resolve(item);
        self.set_clause(item.expr, Clause::Select { alias: item.alias }, b)
    }

    /// Each projected item becomes `bind(attribute)` followed by its select.
    fn render_cte_projection(
        &mut self,
        meta: &QueryMetadata,
        projection: &Expr,
        b: &mut dyn CriteriaBuilder,
    ) -> CompileResult<()> {
        let items: Vec<&Expr> = match projection.kind() {
            ExprKind::Tuple(items) => items.iter().collect(),
            _ => vec![projection],
        };

        if let [single] = items.as_slice() {
            let root = meta.joins.first().and_then(JoinExpression::alias_path);
            if let (Some(root), Some(path)) = (root, single.as_path()) {
                if root == path {
                    return self.bind_whole_entity(root, b);
                }
            }
        }

        let columns = self.session.cte_columns().to_vec();
        for (index, item) in items.into_iter().enumerate() {
            let item = SelectItem::resolve(item);
            let attribute = item.cte_attribute.or_else(|| columns.get(index)).ok_or_else(|| {
                CompileError::MalformedCteProjection(format!(
                    "select item {} ({}) must bind to a CTE attribute",
                    index, item.expr
                ))
            })?;
            b.bind(&attribute.relative_to(attribute.root_path()))?;
            self.set_clause(item.expr, Clause::Select { alias: item.alias }, b)?;
        }
        Ok(())
    }

    /// `SELECT e FROM E e` inside a CTE: one bind per owned, non-association
    /// attribute, skipping attributes stored in an already bound column.
    fn bind_whole_entity(&mut self, root: &Path, b: &mut dyn CriteriaBuilder) -> CompileResult<()> {
        let entity = root.type_name();
        let mut bound: Vec<AttributeInfo> = Vec::new();

        for attribute in self.metamodel.attributes(entity) {
            if attribute.association {
                continue;
            }
            let shared = bound
                .iter()
                .find(|existing| self.metamodel.is_column_equivalent(entity, existing, &attribute));
            if let Some(existing) = shared {
                debug!(
                    entity,
                    attribute = %attribute.path,
                    bound = %existing.path,
                    "skipping column-equivalent attribute"
                );
                continue;
            }
            b.bind(&attribute.path)?;
            b.select(&format!("{}.{}", root, attribute.path), None)?;
            bound.push(attribute);
        }

        if bound.is_empty() {
            return Err(CompileError::MalformedCteProjection(format!(
                "{} has no attribute to bind",
                entity
            )));
        }
        Ok(())
    }
}
