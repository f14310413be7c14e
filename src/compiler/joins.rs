//! Join rendering.
//!
//! Walks one level's join list in declaration order. The first ROOT join
//! fixes the root alias; entity joins anchor on it when the level declares
//! more than one root.

use tracing::{trace, warn};

use super::{Clause, Renderer, Scope, ScopeKind};
use crate::builder::{CriteriaBuilder, JoinKind, LateralTarget};
use crate::error::{CompileError, CompileResult};
use crate::expr::{Expr, ExprKind, Path};
use crate::query::{JoinExpression, JoinFlag, JoinTarget, JoinType, QueryMetadata, ValuesSource};

/// State threaded through the join list.
#[derive(Debug, Default)]
struct JoinFold {
    root_alias: Option<String>,
    multiple_roots: bool,
}

impl JoinFold {
    fn root(mut self, alias: &str) -> Self {
        if self.root_alias.is_none() {
            self.root_alias = Some(alias.to_string());
        }
        self
    }
}

impl Renderer<'_> {
    pub(super) fn render_joins(
        &mut self,
        meta: &QueryMetadata,
        scope: Scope,
        b: &mut dyn CriteriaBuilder,
    ) -> CompileResult<()> {
        let initial = JoinFold {
            root_alias: None,
            multiple_roots: meta
                .joins
                .iter()
                .filter(|join| join.join_type == JoinType::Root)
                .count()
                > 1,
        };

        meta.joins.iter().try_fold(initial, |fold, join| {
            trace!(alias = join.alias_path_name(), join_type = ?join.join_type, "rendering join");
            match &join.target {
                JoinTarget::Values(values) => self.render_values(values, fold, b),
                JoinTarget::Expr(expr) => match expr.kind() {
                    ExprKind::Path(path) => self.render_path_join(join, path, scope, fold, b),
                    ExprKind::SubQuery(_) => self.render_subquery_join(join, expr, fold, b),
                    _ => match expr.as_set_operation() {
                        Some(_) => self.render_subquery_join(join, expr, fold, b),
                        None => Err(CompileError::MalformedJoin(format!(
                            "joins on {} are not supported",
                            expr
                        ))),
                    },
                },
            }
        })?;
        Ok(())
    }

    fn render_values(
        &mut self,
        values: &ValuesSource,
        fold: JoinFold,
        b: &mut dyn CriteriaBuilder,
    ) -> CompileResult<JoinFold> {
        let attribute = values.attribute.as_deref();
        if values.identifiable {
            b.from_identifiable_values(&values.entity_type, attribute, &values.alias, &values.elements)?;
        } else {
            b.from_values(&values.entity_type, attribute, &values.alias, &values.elements)?;
        }
        Ok(fold.root(&values.alias))
    }

    fn render_path_join(
        &mut self,
        join: &JoinExpression,
        path: &Path,
        scope: Scope,
        fold: JoinFold,
        b: &mut dyn CriteriaBuilder,
    ) -> CompileResult<JoinFold> {
        let alias = join
            .alias
            .as_ref()
            .map(|alias| alias.name().to_string())
            .unwrap_or_else(|| path.name().to_string());
        let entity_join = path.is_root();

        if join.join_type == JoinType::Root {
            // Already declared, e.g. by a correlated lateral subquery join.
            if let Some(from) = b.get_from(&alias) {
                if path.matches_type(&from.entity_type) {
                    return Ok(fold.root(&alias));
                }
            }
            if entity_join {
                b.from_entity(path.type_name(), &alias)?;
            } else if scope.kind == ScopeKind::Subquery {
                b.from_path(&path.to_string(), &alias)?;
            } else {
                return Err(CompileError::MalformedJoin(format!(
                    "correlated root {} is only valid inside a subquery",
                    path
                )));
            }
            return Ok(fold.root(&alias));
        }

        let kind = join_kind(join)?;
        let fetch = join.has_flag(JoinFlag::Fetch);

        if fetch && join.condition.is_some() {
            warn!(alias = %alias, "fetch is ignored for a join with an ON clause");
        }

        if entity_join {
            let Some(condition) = &join.condition else {
                return Err(CompileError::MalformedJoin(format!(
                    "no on-clause for entity join to {} ({})",
                    path.type_name(),
                    alias
                )));
            };
            let Some(root_alias) = fold.root_alias.as_deref() else {
                return Err(CompileError::MalformedJoin(format!(
                    "explicit base node required when multiple roots are used (joining {})",
                    alias
                )));
            };
            let base = fold.multiple_roots.then_some(root_alias);
            b.join_on_entity(base, path.type_name(), &alias, kind)?;
            self.set_clause(condition, Clause::On, b)?;
            return Ok(fold);
        }

        match &join.condition {
            None => {
                b.join_default(&path.to_string(), &alias, kind, fetch)?;
            }
            Some(_) if join.has_flag(JoinFlag::ExplicitDefault) => {
                return Err(CompileError::MalformedJoin(format!(
                    "default join {} cannot carry an on-clause",
                    path
                )));
            }
            Some(_) if join.alias.is_none() => {
                return Err(CompileError::MalformedJoin(format!(
                    "join on {} with an on-clause requires an explicit alias",
                    path
                )));
            }
            Some(condition) => {
                b.join_on_path(&path.to_string(), &alias, kind)?;
                self.set_clause(condition, Clause::On, b)?;
            }
        }
        Ok(fold)
    }

    fn render_subquery_join(
        &mut self,
        join: &JoinExpression,
        target: &Expr,
        fold: JoinFold,
        b: &mut dyn CriteriaBuilder,
    ) -> CompileResult<JoinFold> {
        let Some(alias_path) = &join.alias else {
            return Err(CompileError::MalformedJoin(format!(
                "subquery join on {} requires an alias",
                target
            )));
        };
        let alias = alias_path.name();
        let entity = alias_path.type_name();

        if join.join_type == JoinType::Root {
            b.from_subquery(entity, alias)?;
            self.compile_body(target, b)?;
            return Ok(fold.root(alias));
        }

        let kind = join_kind(join)?;
        let lateral = join.has_flag(JoinFlag::Lateral);
        if join.has_flag(JoinFlag::Fetch) {
            warn!(alias, "fetch is ignored for a subquery join");
        }

        let first = first_operand(target).ok_or_else(|| {
            CompileError::MalformedJoin(format!("subquery join {} has no query operand", alias))
        })?;
        let first_join = first.joins.first().ok_or_else(|| {
            CompileError::MalformedJoin(format!("subquery joined as {} has no FROM clause", alias))
        })?;
        let from_path = match &first_join.target {
            JoinTarget::Expr(expr) => expr.as_path(),
            JoinTarget::Values(_) => None,
        };
        let entity_join = from_path.is_none_or(Path::is_root);

        let lateral_target = || match from_path {
            Some(path) if !path.is_root() => LateralTarget::Correlated {
                path: path.to_string(),
                entity: path.type_name().to_string(),
                subquery_alias: first_join.alias_path_name().to_string(),
            },
            _ => LateralTarget::Entity(entity.to_string()),
        };

        match (&join.condition, lateral) {
            (Some(condition), true) => {
                b.join_lateral_on_subquery(&lateral_target(), alias, kind)?;
                self.compile_body(target, b)?;
                self.set_clause(condition, Clause::On, b)?;
            }
            (Some(condition), false) => {
                if !entity_join {
                    return Err(CompileError::MalformedJoin(format!(
                        "entity join to association in subquery joined as {}",
                        alias
                    )));
                }
                b.join_on_subquery(entity, alias, kind)?;
                self.compile_body(target, b)?;
                self.set_clause(condition, Clause::On, b)?;
            }
            (None, true) => {
                b.join_lateral_subquery(&lateral_target(), alias, kind)?;
                self.compile_body(target, b)?;
            }
            (None, false) => {
                return Err(CompileError::MalformedJoin(format!(
                    "no on-clause for subquery entity join {}",
                    alias
                )));
            }
        }
        Ok(fold)
    }

    /// Compile a subquery-from or subquery-join body and close it.
    fn compile_body(&mut self, target: &Expr, b: &mut dyn CriteriaBuilder) -> CompileResult<()> {
        self.session.push_cte_columns(Vec::new());
        let result = self.compile_query(target, Scope::cte_body(), b);
        self.session.pop_cte_columns();
        result?;
        b.end()?;
        Ok(())
    }
}

fn join_kind(join: &JoinExpression) -> CompileResult<JoinKind> {
    JoinKind::from_join_type(join.join_type).ok_or_else(|| {
        CompileError::MalformedJoin(format!("{} is not a join", join.alias_path_name()))
    })
}

/// The first plain query level of a possibly set-valued subquery.
fn first_operand(expr: &Expr) -> Option<&QueryMetadata> {
    if let Some((_, operation)) = expr.as_set_operation() {
        return operation.args.first().and_then(first_operand);
    }
    let meta = expr.as_subquery()?;
    match meta.set_operation() {
        Some(set) => first_operand(set),
        None => Some(meta),
    }
}
