//! Window definitions and their lowering to window-component operations.
//!
//! The frame is assembled through a small typed API so that only complete
//! frames can be built:
//!
//! ```text
//! WindowDefinition::new()
//!     .partition_by(dept)
//!     .rows()                    -> FrameOpener
//!     .between()                 -> BetweenStart
//!     .unbounded_preceding()     -> BetweenEnd
//!     .current_row()             -> WindowDefinition
//! ```

use crate::expr::{Expr, Operator};
use crate::query::OrderSpecifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameMode {
    Rows,
    Range,
    Groups,
}

impl FrameMode {
    fn operator(self) -> Operator {
        match self {
            FrameMode::Rows => Operator::WindowRows,
            FrameMode::Range => Operator::WindowRange,
            FrameMode::Groups => Operator::WindowGroups,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(Expr),
    CurrentRow,
    Following(Expr),
    UnboundedFollowing,
}

impl FrameBound {
    fn to_expr(&self) -> Expr {
        match self {
            FrameBound::UnboundedPreceding => {
                Expr::operation(Operator::WindowUnboundedPreceding, vec![])
            }
            FrameBound::Preceding(n) => Expr::operation(Operator::WindowPreceding, vec![n.clone()]),
            FrameBound::CurrentRow => Expr::operation(Operator::WindowCurrentRow, vec![]),
            FrameBound::Following(n) => Expr::operation(Operator::WindowFollowing, vec![n.clone()]),
            FrameBound::UnboundedFollowing => {
                Expr::operation(Operator::WindowUnboundedFollowing, vec![])
            }
        }
    }
}

/// `ROWS|RANGE|GROUPS start` or `... BETWEEN start AND end`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFrame {
    pub mode: FrameMode,
    pub start: FrameBound,
    pub end: Option<FrameBound>,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct WindowDefinition {
    pub base_window: Option<String>,
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderSpecifier>,
    pub frame: Option<WindowFrame>,
}

impl WindowDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend a previously named window.
    pub fn based_on(mut self, window_name: &str) -> Self {
        self.base_window = Some(window_name.to_string());
        self
    }

    pub fn partition_by(mut self, expr: impl Into<Expr>) -> Self {
        self.partition_by.push(expr.into());
        self
    }

    pub fn order_by(mut self, order: OrderSpecifier) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn rows(self) -> FrameOpener {
        FrameOpener::new(self, FrameMode::Rows)
    }

    pub fn range(self) -> FrameOpener {
        FrameOpener::new(self, FrameMode::Range)
    }

    pub fn groups(self) -> FrameOpener {
        FrameOpener::new(self, FrameMode::Groups)
    }

    /// Lower to `WINDOW_DEFINITION(base?, partition?, order?, frame?)`.
    pub fn to_expr(&self) -> Expr {
        let mut components = Vec::new();
        if let Some(base) = &self.base_window {
            components.push(Expr::operation(
                Operator::WindowBase,
                vec![Expr::constant(base.as_str())],
            ));
        }
        if !self.partition_by.is_empty() {
            components.push(Expr::operation(
                Operator::WindowPartitionBy,
                vec![list(self.partition_by.clone())],
            ));
        }
        if !self.order_by.is_empty() {
            let items = self.order_by.iter().map(order_item).collect();
            components.push(Expr::operation(Operator::WindowOrderBy, vec![list(items)]));
        }
        if let Some(frame) = &self.frame {
            let bound = match &frame.end {
                Some(end) => Expr::operation(
                    Operator::WindowBetween,
                    vec![frame.start.to_expr(), end.to_expr()],
                ),
                None => frame.start.to_expr(),
            };
            components.push(Expr::operation(frame.mode.operator(), vec![bound]));
        }
        Expr::operation(Operator::WindowDefinition, components)
    }
}

fn list(items: Vec<Expr>) -> Expr {
    Expr::operation(Operator::List, items)
}

/// Order items inside windows are `{0} {1s} {2s}` templates: target,
/// direction keyword, null-handling keyword (possibly empty).
pub fn order_item(order: &OrderSpecifier) -> Expr {
    let direction = if order.is_ascending() { "ASC" } else { "DESC" };
    Expr::template(
        ORDER_ITEM_PATTERN,
        vec![
            order.target.clone(),
            Expr::constant(direction),
            Expr::constant(order.null_handling.keyword()),
        ],
    )
}

pub const ORDER_ITEM_PATTERN: &str = "{0} {1s} {2s}";

// =============================================================================
// Typed frame builder
// =============================================================================

#[must_use = "a frame is only stored once its bounds are complete"]
pub struct FrameOpener {
    window: WindowDefinition,
    mode: FrameMode,
}

impl FrameOpener {
    fn new(window: WindowDefinition, mode: FrameMode) -> Self {
        Self { window, mode }
    }

    fn single(mut self, start: FrameBound) -> WindowDefinition {
        self.window.frame = Some(WindowFrame {
            mode: self.mode,
            start,
            end: None,
        });
        self.window
    }

    pub fn between(self) -> BetweenStart {
        BetweenStart { opener: self }
    }

    pub fn unbounded_preceding(self) -> WindowDefinition {
        self.single(FrameBound::UnboundedPreceding)
    }

    pub fn preceding(self, n: impl Into<Expr>) -> WindowDefinition {
        self.single(FrameBound::Preceding(n.into()))
    }

    pub fn current_row(self) -> WindowDefinition {
        self.single(FrameBound::CurrentRow)
    }
}

#[must_use = "a frame is only stored once its bounds are complete"]
pub struct BetweenStart {
    opener: FrameOpener,
}

impl BetweenStart {
    fn start(self, start: FrameBound) -> BetweenEnd {
        BetweenEnd {
            opener: self.opener,
            start,
        }
    }

    pub fn unbounded_preceding(self) -> BetweenEnd {
        self.start(FrameBound::UnboundedPreceding)
    }

    pub fn preceding(self, n: impl Into<Expr>) -> BetweenEnd {
        self.start(FrameBound::Preceding(n.into()))
    }

    pub fn current_row(self) -> BetweenEnd {
        self.start(FrameBound::CurrentRow)
    }

    pub fn following(self, n: impl Into<Expr>) -> BetweenEnd {
        self.start(FrameBound::Following(n.into()))
    }
}

#[must_use = "a frame is only stored once its bounds are complete"]
pub struct BetweenEnd {
    opener: FrameOpener,
    start: FrameBound,
}

impl BetweenEnd {
    fn end(self, end: FrameBound) -> WindowDefinition {
        let mut window = self.opener.window;
        window.frame = Some(WindowFrame {
            mode: self.opener.mode,
            start: self.start,
            end: Some(end),
        });
        window
    }

    pub fn preceding(self, n: impl Into<Expr>) -> WindowDefinition {
        self.end(FrameBound::Preceding(n.into()))
    }

    pub fn current_row(self) -> WindowDefinition {
        self.end(FrameBound::CurrentRow)
    }

    pub fn following(self, n: impl Into<Expr>) -> WindowDefinition {
        self.end(FrameBound::Following(n.into()))
    }

    pub fn unbounded_following(self) -> WindowDefinition {
        self.end(FrameBound::UnboundedFollowing)
    }
}
