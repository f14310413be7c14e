//! Set-operation rendering.
//!
//! A set-operation tree is binary and left-leaning. It is linearized left
//! to right: left operand, combinator, right operand. An operand whose
//! subquery carries its own set-operation flag is bracketed:
//!
//! ```text
//! A UNION ALL (B EXCEPT C)
//!     from(A) start_union_all [ from(B) except from(C) end_set_with end_set ] end_set
//! ```
//!
//! The left operand is only bracketed under a left-nested combinator.

use tracing::trace;

use super::{Renderer, Scope, Shape};
use crate::builder::CriteriaBuilder;
use crate::error::{CompileError, CompileResult};
use crate::expr::{Expr, Operation, SetOperator};

impl Renderer<'_> {
    pub(super) fn render_set_operation(
        &mut self,
        operator: SetOperator,
        operation: &Operation,
        scope: Scope,
        b: &mut dyn CriteriaBuilder,
    ) -> CompileResult<Shape> {
        let [lhs, rhs] = operation.args.as_slice() else {
            return Err(CompileError::MalformedSetOperation(format!(
                "{} takes two operands, got {}",
                operator.kind.name(),
                operation.args.len()
            )));
        };
        check_operand(lhs)?;
        check_operand(rhs)?;

        let operand_scope = scope.operand();

        match nested_set(lhs) {
            Some(nested) if operator.left_nested => {
                trace!(kind = operator.kind.name(), "opening left-nested operand");
                b.start_set()?;
                self.render_bracket(lhs, nested, operand_scope, b)?;
            }
            _ => {
                self.visit(lhs, operand_scope, b)?;
            }
        }

        let rhs_nested = nested_set(rhs);
        trace!(kind = operator.kind.name(), nested = rhs_nested.is_some(), "set combinator");
        match rhs_nested {
            Some(nested) => {
                b.start_set_operation(operator.kind)?;
                self.render_bracket(rhs, nested, operand_scope, b)?;
            }
            None => {
                b.set_operation(operator.kind)?;
                self.visit(rhs, operand_scope, b)?;
            }
        }

        Ok(Shape::OngoingSet)
    }

    /// Render a bracketed operand: its own set tree, then its ORDER BY and
    /// LIMIT against the finished bracket.
    fn render_bracket(
        &mut self,
        operand: &Expr,
        nested: &Expr,
        scope: Scope,
        b: &mut dyn CriteriaBuilder,
    ) -> CompileResult<()> {
        if self.visit(nested, scope, b)? != Shape::OngoingSet {
            return Err(CompileError::MalformedSetOperation(format!(
                "bracketed operand {} is not a set operation",
                nested
            )));
        }
        b.end_set_with()?;
        if let Some(meta) = operand.as_subquery() {
            self.render_order_by(&meta.order_by, b)?;
            self.render_modifiers(&meta.modifiers, scope, b)?;
        }
        b.end_set()?;
        Ok(())
    }
}

/// The set tree a subquery operand stands for.
fn nested_set(operand: &Expr) -> Option<&Expr> {
    operand.as_subquery()?.set_operation()
}

fn check_operand(operand: &Expr) -> CompileResult<()> {
    if operand.as_subquery().is_some() || operand.as_set_operation().is_some() {
        Ok(())
    } else {
        Err(CompileError::MalformedSetOperation(format!(
            "{} is not a set operand",
            operand
        )))
    }
}
