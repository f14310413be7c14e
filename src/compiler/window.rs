//! Named-window rendering.
//!
//! Walks the window-component tree of a WINDOW clause entry and drives the
//! builder's window methods. Shapes the typed window API cannot produce are
//! reported as unreachable window states.

use super::Renderer;
use crate::builder::{CriteriaBuilder, FrameBoundArg};
use crate::error::{CompileError, CompileResult};
use crate::expr::{Expr, ExprKind, Operation, Operator};
use crate::query::{NamedWindow, NullHandling};
use crate::window::FrameMode;

impl Renderer<'_> {
    pub(super) fn render_window(&mut self, window: &NamedWindow, b: &mut dyn CriteriaBuilder) -> CompileResult<()> {
        let name = window.name.as_str();
        let definition = window
            .definition
            .as_operation_of(Operator::WindowDefinition)
            .ok_or_else(|| unreachable_state(name, "definition is not a WINDOW_DEFINITION"))?;

        b.window(name)?;
        let mut framed = false;
        for component in &definition.args {
            let op = component
                .as_operation()
                .ok_or_else(|| unreachable_state(name, &format!("{} is not a window component", component)))?;
            match op.operator {
                Operator::WindowBase => {
                    let base = base_name(name, op)?;
                    if !b.supports_window_extension() {
                        return Err(CompileError::UnsupportedWindowExtension(base.to_string()));
                    }
                    b.window_extends(base)?;
                }
                Operator::WindowPartitionBy => {
                    for expr in list_items(&op.args) {
                        let text = self.render_plain(expr, "PARTITION BY")?;
                        b.window_partition_by(&text)?;
                    }
                }
                Operator::WindowOrderBy => {
                    for item in list_items(&op.args) {
                        let (target, ascending, nulls) = order_item_parts(name, item)?;
                        let text = self.render_plain(target, "window ORDER BY")?;
                        b.window_order_by(&text, ascending, nulls)?;
                    }
                }
                Operator::WindowRows | Operator::WindowRange | Operator::WindowGroups => {
                    if framed {
                        return Err(unreachable_state(name, "frame declared twice"));
                    }
                    framed = true;
                    let mode = match op.operator {
                        Operator::WindowRows => FrameMode::Rows,
                        Operator::WindowRange => FrameMode::Range,
                        _ => FrameMode::Groups,
                    };
                    b.window_frame(mode)?;
                    self.render_frame(name, op, b)?;
                }
                other => {
                    return Err(unreachable_state(
                        name,
                        &format!("{} outside of a frame clause", other),
                    ));
                }
            }
        }
        b.end_window()?;
        Ok(())
    }

    /// Single bound, or BETWEEN start AND end.
    fn render_frame(&mut self, name: &str, frame: &Operation, b: &mut dyn CriteriaBuilder) -> CompileResult<()> {
        let [bound] = frame.args.as_slice() else {
            return Err(unreachable_state(name, "frame clause without a bound"));
        };
        match bound.as_operation_of(Operator::WindowBetween) {
            Some(between) => {
                let [start, end] = between.args.as_slice() else {
                    return Err(unreachable_state(name, "BETWEEN needs a start and an end bound"));
                };
                let start = self.frame_bound(name, start)?;
                b.frame_between(&start)?;
                let end = self.frame_bound(name, end)?;
                b.frame_and(&end)?;
            }
            None => {
                let bound = self.frame_bound(name, bound)?;
                b.frame_start(&bound)?;
            }
        }
        Ok(())
    }

    fn frame_bound(&mut self, name: &str, bound: &Expr) -> CompileResult<FrameBoundArg> {
        let op = bound
            .as_operation()
            .ok_or_else(|| unreachable_state(name, &format!("{} is not a frame bound", bound)))?;
        let offset = |renderer: &mut Self| -> CompileResult<String> {
            let [n] = op.args.as_slice() else {
                return Err(unreachable_state(name, "frame offset missing"));
            };
            renderer.render_plain(n, "window frame")
        };
        Ok(match op.operator {
            Operator::WindowUnboundedPreceding => FrameBoundArg::UnboundedPreceding,
            Operator::WindowPreceding => FrameBoundArg::Preceding(offset(self)?),
            Operator::WindowCurrentRow => FrameBoundArg::CurrentRow,
            Operator::WindowFollowing => FrameBoundArg::Following(offset(self)?),
            Operator::WindowUnboundedFollowing => FrameBoundArg::UnboundedFollowing,
            other => {
                return Err(unreachable_state(name, &format!("{} is not a frame bound", other)));
            }
        })
    }
}

fn unreachable_state(window: &str, detail: &str) -> CompileError {
    CompileError::UnreachableWindowState(format!("window {}: {}", window, detail))
}

fn base_name<'o>(window: &str, base: &'o Operation) -> CompileResult<&'o str> {
    base.arg(0)
        .and_then(Expr::as_constant)
        .and_then(|value| value.as_str())
        .ok_or_else(|| unreachable_state(window, "base window has no name"))
}

/// Component arguments with LIST nodes flattened.
fn list_items(args: &[Expr]) -> impl Iterator<Item = &Expr> {
    args.iter().flat_map(|arg| match arg.as_operation_of(Operator::List) {
        Some(list) => list.args.iter().collect::<Vec<_>>(),
        None => vec![arg],
    })
}

/// Splits a `{0} {1s} {2s}` order item into target, direction and null handling.
fn order_item_parts<'e>(window: &str, item: &'e Expr) -> CompileResult<(&'e Expr, bool, NullHandling)> {
    let ExprKind::Template(template) = item.kind() else {
        return Err(unreachable_state(window, &format!("{} is not an order item", item)));
    };
    let [target, direction, nulls] = template.args.as_slice() else {
        return Err(unreachable_state(window, "order item needs three arguments"));
    };
    let keyword = |expr: &Expr| expr.as_constant().and_then(|v| v.as_str()).map(str::to_string);

    let ascending = match keyword(direction).as_deref() {
        Some("ASC") => true,
        Some("DESC") => false,
        _ => return Err(unreachable_state(window, "order direction must be ASC or DESC")),
    };
    let nulls = match keyword(nulls).as_deref() {
        Some("") => NullHandling::Default,
        Some("NULLS FIRST") => NullHandling::NullsFirst,
        Some("NULLS LAST") => NullHandling::NullsLast,
        _ => return Err(unreachable_state(window, "unknown null handling")),
    };
    Ok((target, ascending, nulls))
}
