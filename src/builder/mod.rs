//! Target builder protocol.
//!
//! The compiler never produces query text for execution. It drives a
//! builder-style query-construction API, one call at a time, and the target
//! engine assembles the query. [`CriteriaBuilder`] is that API flattened into
//! a single object-safe trait: the methods that open a nested scope (CTE
//! bodies, subqueries, set brackets, windows) are paired with the method that
//! closes it, and the implementation tracks which scope is current.
//!
//! Expressions are passed in the intermediate textual form produced by the
//! serializer, with `:label` placeholders for constants and bare labels for
//! subqueries announced through the `*_subqueries` variants.

pub mod recording;

use std::fmt;

use crate::error::{BuildError, BuildResult};
use crate::expr::{SetOperationKind, Value};
use crate::query::{JoinType, NullHandling};
use crate::window::FrameMode;

pub use recording::{BuilderCall, RecordingBuilder};

// =============================================================================
// Arguments
// =============================================================================

/// Join types the protocol accepts. Roots are declared through `from_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn from_join_type(join_type: JoinType) -> Option<JoinKind> {
        match join_type {
            JoinType::Root => None,
            JoinType::Inner => Some(JoinKind::Inner),
            JoinType::Left => Some(JoinKind::Left),
            JoinType::Right => Some(JoinKind::Right),
            JoinType::Full => Some(JoinKind::Full),
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        })
    }
}

/// A FROM node already declared in the current query level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromNode {
    pub alias: String,
    pub entity_type: String,
}

/// What a lateral subquery join is anchored on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LateralTarget {
    /// The subquery selects from an entity.
    Entity(String),
    /// The subquery selects from a correlated association path, aliased
    /// `subquery_alias` inside the subquery. `entity` is the element type.
    Correlated {
        path: String,
        entity: String,
        subquery_alias: String,
    },
}

impl fmt::Display for LateralTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LateralTarget::Entity(entity) => f.write_str(entity),
            LateralTarget::Correlated {
                path,
                subquery_alias,
                ..
            } => write!(f, "{}, {}", path, subquery_alias),
        }
    }
}

/// A rendered frame bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBoundArg {
    UnboundedPreceding,
    Preceding(String),
    CurrentRow,
    Following(String),
    UnboundedFollowing,
}

impl fmt::Display for FrameBoundArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameBoundArg::UnboundedPreceding => f.write_str("UNBOUNDED PRECEDING"),
            FrameBoundArg::Preceding(n) => write!(f, "{} PRECEDING", n),
            FrameBoundArg::CurrentRow => f.write_str("CURRENT ROW"),
            FrameBoundArg::Following(n) => write!(f, "{} FOLLOWING", n),
            FrameBoundArg::UnboundedFollowing => f.write_str("UNBOUNDED FOLLOWING"),
        }
    }
}

// =============================================================================
// Protocol
// =============================================================================

/// The criteria-builder protocol of the target engine.
pub trait CriteriaBuilder {
    // FROM

    /// The FROM node declared under `alias` in the current query level.
    fn get_from(&self, alias: &str) -> Option<FromNode>;
    fn from_entity(&mut self, entity: &str, alias: &str) -> BuildResult<()>;
    /// Correlated root on an association of an outer query.
    fn from_path(&mut self, path: &str, alias: &str) -> BuildResult<()>;
    fn from_values(
        &mut self,
        entity: &str,
        attribute: Option<&str>,
        alias: &str,
        elements: &[Value],
    ) -> BuildResult<()>;
    fn from_identifiable_values(
        &mut self,
        entity: &str,
        attribute: Option<&str>,
        alias: &str,
        elements: &[Value],
    ) -> BuildResult<()>;
    /// Opens a subquery body closed by [`end`](Self::end).
    fn from_subquery(&mut self, entity: &str, alias: &str) -> BuildResult<()>;

    // JOIN

    fn join_default(&mut self, path: &str, alias: &str, kind: JoinKind, fetch: bool)
        -> BuildResult<()>;
    /// Entity join; awaits an ON clause. `base` anchors it when several roots exist.
    fn join_on_entity(
        &mut self,
        base: Option<&str>,
        entity: &str,
        alias: &str,
        kind: JoinKind,
    ) -> BuildResult<()>;
    /// Association join; awaits an ON clause.
    fn join_on_path(&mut self, path: &str, alias: &str, kind: JoinKind) -> BuildResult<()>;
    /// Opens a subquery body; after [`end`](Self::end) an ON clause is awaited.
    fn join_on_subquery(&mut self, entity: &str, alias: &str, kind: JoinKind) -> BuildResult<()>;
    /// Opens a lateral subquery body; after [`end`](Self::end) an ON clause is awaited.
    fn join_lateral_on_subquery(
        &mut self,
        target: &LateralTarget,
        alias: &str,
        kind: JoinKind,
    ) -> BuildResult<()>;
    /// Opens a lateral subquery body joined without ON clause.
    fn join_lateral_subquery(
        &mut self,
        target: &LateralTarget,
        alias: &str,
        kind: JoinKind,
    ) -> BuildResult<()>;
    fn set_on_expression(&mut self, expression: &str) -> BuildResult<()>;
    fn set_on_expression_subqueries(&mut self, expression: &str) -> BuildResult<()>;

    // SELECT

    fn select(&mut self, expression: &str, alias: Option<&str>) -> BuildResult<()>;
    fn select_subqueries(&mut self, expression: &str, alias: Option<&str>) -> BuildResult<()>;
    /// Opens a constructor projection of `arity` items.
    fn select_new(&mut self, arity: usize) -> BuildResult<()>;
    fn end_select_new(&mut self) -> BuildResult<()>;
    /// Binds the next select to a CTE attribute.
    fn bind(&mut self, attribute: &str) -> BuildResult<()>;
    fn distinct(&mut self) -> BuildResult<()>;

    // WHERE, GROUP BY, HAVING, ORDER BY

    fn set_where_expression(&mut self, expression: &str) -> BuildResult<()>;
    fn set_where_expression_subqueries(&mut self, expression: &str) -> BuildResult<()>;
    fn group_by(&mut self, expression: &str) -> BuildResult<()>;
    fn set_having_expression(&mut self, expression: &str) -> BuildResult<()>;
    fn set_having_expression_subqueries(&mut self, expression: &str) -> BuildResult<()>;
    fn order_by(&mut self, expression: &str, ascending: bool, nulls: NullHandling)
        -> BuildResult<()>;

    // Subquery placeholders

    /// Opens the body for one announced subquery label.
    fn with_subquery(&mut self, label: &str) -> BuildResult<()>;
    /// Closes the placeholder list opened by a `*_subqueries` call.
    fn end_subqueries(&mut self) -> BuildResult<()>;

    // CTE

    fn with(&mut self, entity: &str) -> BuildResult<()>;
    fn with_recursive(&mut self, entity: &str) -> BuildResult<()>;

    // Set operations

    /// Opens a bracketed set operand.
    fn start_set(&mut self) -> BuildResult<()>;
    fn set_operation(&mut self, kind: SetOperationKind) -> BuildResult<()>;
    /// Combinator whose right operand is a bracketed set.
    fn start_set_operation(&mut self, kind: SetOperationKind) -> BuildResult<()>;
    /// Finishes the bracket's set so ORDER BY and LIMIT apply to it.
    fn end_set_with(&mut self) -> BuildResult<()>;
    fn end_set(&mut self) -> BuildResult<()>;

    /// Closes the innermost CTE, subquery or subquery-join body.
    fn end(&mut self) -> BuildResult<()>;

    // WINDOW

    fn supports_window_extension(&self) -> bool {
        false
    }
    fn window(&mut self, name: &str) -> BuildResult<()>;
    fn window_extends(&mut self, base: &str) -> BuildResult<()> {
        Err(BuildError::Unsupported(format!(
            "extending named window '{}'",
            base
        )))
    }
    fn window_partition_by(&mut self, expression: &str) -> BuildResult<()>;
    fn window_order_by(
        &mut self,
        expression: &str,
        ascending: bool,
        nulls: NullHandling,
    ) -> BuildResult<()>;
    fn window_frame(&mut self, mode: FrameMode) -> BuildResult<()>;
    /// Single-bound frame.
    fn frame_start(&mut self, bound: &FrameBoundArg) -> BuildResult<()>;
    fn frame_between(&mut self, start: &FrameBoundArg) -> BuildResult<()>;
    fn frame_and(&mut self, end: &FrameBoundArg) -> BuildResult<()>;
    fn end_window(&mut self) -> BuildResult<()>;

    // Parameters and paging

    fn set_parameter(&mut self, name: &str, value: &Value) -> BuildResult<()>;
    fn set_max_results(&mut self, limit: u64) -> BuildResult<()>;
    fn set_first_result(&mut self, offset: u64) -> BuildResult<()>;
}
