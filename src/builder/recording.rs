//! Recording builder.
//!
//! Records every protocol call as a [`BuilderCall`] and checks that calls
//! arrive in an order a criteria builder could accept: joins after a root,
//! ON clauses after ON joins, every opened scope closed by its own call.
//! Rejected calls are not recorded.

use std::fmt;

use crate::builder::{CriteriaBuilder, FrameBoundArg, FromNode, JoinKind, LateralTarget};
use crate::error::{BuildError, BuildResult};
use crate::expr::{SetOperationKind, Value};
use crate::query::NullHandling;
use crate::window::FrameMode;

// =============================================================================
// Calls
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum BuilderCall {
    FromEntity {
        entity: String,
        alias: String,
    },
    FromPath {
        path: String,
        alias: String,
    },
    FromValues {
        entity: String,
        attribute: Option<String>,
        alias: String,
        elements: Vec<Value>,
        identifiable: bool,
    },
    FromSubquery {
        entity: String,
        alias: String,
    },
    JoinDefault {
        path: String,
        alias: String,
        kind: JoinKind,
        fetch: bool,
    },
    JoinOnEntity {
        base: Option<String>,
        entity: String,
        alias: String,
        kind: JoinKind,
    },
    JoinOnPath {
        path: String,
        alias: String,
        kind: JoinKind,
    },
    JoinOnSubquery {
        entity: String,
        alias: String,
        kind: JoinKind,
    },
    JoinLateralOnSubquery {
        target: LateralTarget,
        alias: String,
        kind: JoinKind,
    },
    JoinLateralSubquery {
        target: LateralTarget,
        alias: String,
        kind: JoinKind,
    },
    On {
        expression: String,
        subqueries: bool,
    },
    Select {
        expression: String,
        alias: Option<String>,
        subqueries: bool,
    },
    SelectNew {
        arity: usize,
    },
    EndSelectNew,
    Bind {
        attribute: String,
    },
    Distinct,
    Where {
        expression: String,
        subqueries: bool,
    },
    GroupBy {
        expression: String,
    },
    Having {
        expression: String,
        subqueries: bool,
    },
    OrderBy {
        expression: String,
        ascending: bool,
        nulls: NullHandling,
    },
    WithSubquery {
        label: String,
    },
    EndSubqueries,
    With {
        entity: String,
    },
    WithRecursive {
        entity: String,
    },
    StartSet,
    SetOperation {
        kind: SetOperationKind,
        start: bool,
    },
    EndSetWith,
    EndSet,
    End,
    Window {
        name: String,
    },
    WindowExtends {
        base: String,
    },
    WindowPartitionBy {
        expression: String,
    },
    WindowOrderBy {
        expression: String,
        ascending: bool,
        nulls: NullHandling,
    },
    WindowFrame {
        mode: FrameMode,
    },
    FrameStart {
        bound: FrameBoundArg,
    },
    FrameBetween {
        bound: FrameBoundArg,
    },
    FrameAnd {
        bound: FrameBoundArg,
    },
    EndWindow,
    SetParameter {
        name: String,
        value: Value,
    },
    SetMaxResults(u64),
    SetFirstResult(u64),
}

fn order_suffix(ascending: bool, nulls: NullHandling) -> String {
    let direction = if ascending { "ASC" } else { "DESC" };
    match nulls {
        NullHandling::Default => direction.to_string(),
        other => format!("{} {}", direction, other.keyword()),
    }
}

fn set_keyword(kind: SetOperationKind) -> &'static str {
    match kind {
        SetOperationKind::Union => "union",
        SetOperationKind::UnionAll => "union_all",
        SetOperationKind::Intersect => "intersect",
        SetOperationKind::IntersectAll => "intersect_all",
        SetOperationKind::Except => "except",
        SetOperationKind::ExceptAll => "except_all",
    }
}

fn frame_keyword(mode: FrameMode) -> &'static str {
    match mode {
        FrameMode::Rows => "rows",
        FrameMode::Range => "range",
        FrameMode::Groups => "groups",
    }
}

/// One-line, stable rendering used by traces and snapshots.
impl fmt::Display for BuilderCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BuilderCall::*;
        match self {
            FromEntity { entity, alias } => write!(f, "from({}, {})", entity, alias),
            FromPath { path, alias } => write!(f, "from_path({}, {})", path, alias),
            FromValues {
                entity,
                attribute,
                alias,
                elements,
                identifiable,
            } => {
                let name = if *identifiable {
                    "from_identifiable_values"
                } else {
                    "from_values"
                };
                let elements: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                match attribute {
                    Some(attr) => write!(
                        f,
                        "{}({}.{}, {}, [{}])",
                        name,
                        entity,
                        attr,
                        alias,
                        elements.join(", ")
                    ),
                    None => write!(f, "{}({}, {}, [{}])", name, entity, alias, elements.join(", ")),
                }
            }
            FromSubquery { entity, alias } => write!(f, "from_subquery({}, {})", entity, alias),
            JoinDefault {
                path,
                alias,
                kind,
                fetch,
            } => {
                write!(f, "join_default({}, {}, {}", path, alias, kind)?;
                if *fetch {
                    write!(f, ", fetch")?;
                }
                write!(f, ")")
            }
            JoinOnEntity {
                base,
                entity,
                alias,
                kind,
            } => match base {
                Some(base) => write!(f, "join_on({}, {}, {}, {})", base, entity, alias, kind),
                None => write!(f, "join_on({}, {}, {})", entity, alias, kind),
            },
            JoinOnPath { path, alias, kind } => {
                write!(f, "join_on_path({}, {}, {})", path, alias, kind)
            }
            JoinOnSubquery {
                entity,
                alias,
                kind,
            } => write!(f, "join_on_subquery({}, {}, {})", entity, alias, kind),
            JoinLateralOnSubquery {
                target,
                alias,
                kind,
            } => write!(f, "join_lateral_on_subquery({}, {}, {})", target, alias, kind),
            JoinLateralSubquery {
                target,
                alias,
                kind,
            } => write!(f, "join_lateral_subquery({}, {}, {})", target, alias, kind),
            On {
                expression,
                subqueries,
            } => {
                let name = if *subqueries { "on_subqueries" } else { "on" };
                write!(f, "{}({})", name, expression)
            }
            Select {
                expression,
                alias,
                subqueries,
            } => {
                let name = if *subqueries {
                    "select_subqueries"
                } else {
                    "select"
                };
                match alias {
                    Some(alias) => write!(f, "{}({}, {})", name, expression, alias),
                    None => write!(f, "{}({})", name, expression),
                }
            }
            SelectNew { arity } => write!(f, "select_new({})", arity),
            EndSelectNew => write!(f, "end_select_new"),
            Bind { attribute } => write!(f, "bind({})", attribute),
            Distinct => write!(f, "distinct"),
            Where {
                expression,
                subqueries,
            } => {
                let name = if *subqueries { "where_subqueries" } else { "where" };
                write!(f, "{}({})", name, expression)
            }
            GroupBy { expression } => write!(f, "group_by({})", expression),
            Having {
                expression,
                subqueries,
            } => {
                let name = if *subqueries {
                    "having_subqueries"
                } else {
                    "having"
                };
                write!(f, "{}({})", name, expression)
            }
            OrderBy {
                expression,
                ascending,
                nulls,
            } => write!(f, "order_by({}, {})", expression, order_suffix(*ascending, *nulls)),
            WithSubquery { label } => write!(f, "with_subquery({})", label),
            EndSubqueries => write!(f, "end_subqueries"),
            With { entity } => write!(f, "with({})", entity),
            WithRecursive { entity } => write!(f, "with_recursive({})", entity),
            StartSet => write!(f, "start_set"),
            SetOperation { kind, start } => {
                if *start {
                    write!(f, "start_{}", set_keyword(*kind))
                } else {
                    write!(f, "{}", set_keyword(*kind))
                }
            }
            EndSetWith => write!(f, "end_set_with"),
            EndSet => write!(f, "end_set"),
            End => write!(f, "end"),
            Window { name } => write!(f, "window({})", name),
            WindowExtends { base } => write!(f, "window_extends({})", base),
            WindowPartitionBy { expression } => write!(f, "partition_by({})", expression),
            WindowOrderBy {
                expression,
                ascending,
                nulls,
            } => write!(
                f,
                "window_order_by({}, {})",
                expression,
                order_suffix(*ascending, *nulls)
            ),
            WindowFrame { mode } => write!(f, "{}", frame_keyword(*mode)),
            FrameStart { bound } => write!(f, "frame({})", bound),
            FrameBetween { bound } => write!(f, "between({})", bound),
            FrameAnd { bound } => write!(f, "and({})", bound),
            EndWindow => write!(f, "end_window"),
            SetParameter { name, value } => write!(f, "set_parameter({}, {})", name, value),
            SetMaxResults(n) => write!(f, "set_max_results({})", n),
            SetFirstResult(n) => write!(f, "set_first_result({})", n),
        }
    }
}

// =============================================================================
// Protocol state
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    Criteria,
    Cte,
    RecursiveCte,
    FromSubquery,
    JoinSubquery,
    Subquery,
    Bracket,
}

impl Body {
    fn accepts_binds(self) -> bool {
        matches!(
            self,
            Body::Cte | Body::RecursiveCte | Body::FromSubquery | Body::JoinSubquery
        )
    }

    fn closed_by_end(self) -> bool {
        matches!(
            self,
            Body::Cte | Body::RecursiveCte | Body::FromSubquery | Body::JoinSubquery | Body::Subquery
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetState {
    None,
    Open,
    Final,
}

#[derive(Debug, Clone)]
struct Level {
    body: Body,
    froms: Vec<FromNode>,
    roots: usize,
    /// The current operand has a FROM clause or is a closed bracket.
    operand_ready: bool,
    set: SetState,
    combinators: usize,
}

impl Level {
    fn new(body: Body) -> Self {
        Self {
            body,
            froms: Vec::new(),
            roots: 0,
            operand_ready: false,
            set: SetState::None,
            combinators: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    None,
    Opened,
    Between,
    Complete,
}

#[derive(Debug, Clone)]
enum Frame {
    Level(Level),
    OnClause,
    Subqueries,
    SelectNew { remaining: usize },
    Bound,
    Window(FrameState),
}

impl Frame {
    fn describe(&self) -> &'static str {
        match self {
            Frame::Level(level) => match level.body {
                Body::Criteria => "the criteria query",
                Body::Cte | Body::RecursiveCte => "a CTE body",
                Body::FromSubquery | Body::JoinSubquery => "a subquery join body",
                Body::Subquery => "a subquery body",
                Body::Bracket => "a set bracket",
            },
            Frame::OnClause => "a pending ON clause",
            Frame::Subqueries => "a subquery placeholder list",
            Frame::SelectNew { .. } => "a constructor projection",
            Frame::Bound => "a pending bind",
            Frame::Window(_) => "a window definition",
        }
    }
}

// =============================================================================
// Recording builder
// =============================================================================

/// Criteria builder that records the call stream.
#[derive(Debug, Clone)]
pub struct RecordingBuilder {
    calls: Vec<BuilderCall>,
    frames: Vec<Frame>,
    window_extension: bool,
}

impl Default for RecordingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            frames: vec![Frame::Level(Level::new(Body::Criteria))],
            window_extension: false,
        }
    }

    /// Accept `window_extends` calls.
    #[must_use]
    pub fn with_window_extension_support(mut self) -> Self {
        self.window_extension = true;
        self
    }

    pub fn calls(&self) -> &[BuilderCall] {
        &self.calls
    }

    /// One call per line.
    pub fn trace(&self) -> String {
        self.calls
            .iter()
            .map(|call| call.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every opened scope is closed and no set operation is left open.
    pub fn is_complete(&self) -> bool {
        match self.frames.as_slice() {
            [Frame::Level(root)] => root.set != SetState::Open,
            _ => false,
        }
    }

    fn record(&mut self, call: BuilderCall) -> BuildResult<()> {
        self.calls.push(call);
        Ok(())
    }

    fn current(&self) -> &'static str {
        self.frames.last().map(Frame::describe).unwrap_or("no scope")
    }

    fn level(&mut self, call: &str) -> BuildResult<&mut Level> {
        let current = self.current();
        match self.frames.last_mut() {
            Some(Frame::Level(level)) => Ok(level),
            _ => Err(BuildError::protocol(call, format!("inside {}", current))),
        }
    }

    fn level_ref(&self) -> Option<&Level> {
        self.frames.iter().rev().find_map(|frame| match frame {
            Frame::Level(level) => Some(level),
            _ => None,
        })
    }

    fn open_level(&mut self, call: &str) -> BuildResult<&mut Level> {
        let level = self.level(call)?;
        if level.set == SetState::Final {
            return Err(BuildError::protocol(call, "set operation already finished"));
        }
        Ok(level)
    }

    fn add_root(&mut self, call: &str, alias: &str, entity_type: &str) -> BuildResult<()> {
        let level = self.open_level(call)?;
        level.froms.push(FromNode {
            alias: alias.to_string(),
            entity_type: entity_type.to_string(),
        });
        level.roots += 1;
        level.operand_ready = true;
        Ok(())
    }

    fn add_join(&mut self, call: &str, alias: &str, entity_type: &str) -> BuildResult<()> {
        let level = self.open_level(call)?;
        if level.froms.is_empty() {
            return Err(BuildError::protocol(call, "no FROM node to join from"));
        }
        level.froms.push(FromNode {
            alias: alias.to_string(),
            entity_type: entity_type.to_string(),
        });
        Ok(())
    }

    fn push_join_body(&mut self, target: Option<&LateralTarget>) {
        let mut body = Level::new(Body::JoinSubquery);
        if let Some(LateralTarget::Correlated {
            entity,
            subquery_alias,
            ..
        }) = target
        {
            body.froms.push(FromNode {
                alias: subquery_alias.clone(),
                entity_type: entity.clone(),
            });
            body.roots = 1;
            body.operand_ready = true;
        }
        self.frames.push(Frame::Level(body));
    }

    fn take_on_clause(&mut self, call: &str) -> BuildResult<()> {
        match self.frames.last() {
            Some(Frame::OnClause) => {
                self.frames.pop();
                Ok(())
            }
            _ => Err(BuildError::protocol(
                call,
                format!("no join awaits an ON clause (inside {})", self.current()),
            )),
        }
    }

    fn take_select_slot(&mut self, call: &str) -> BuildResult<()> {
        let current = self.current();
        match self.frames.last_mut() {
            Some(Frame::Bound) => {
                self.frames.pop();
                Ok(())
            }
            Some(Frame::SelectNew { remaining }) => {
                if *remaining == 0 {
                    return Err(BuildError::protocol(call, "constructor projection is full"));
                }
                *remaining -= 1;
                Ok(())
            }
            Some(Frame::Level(level)) if level.set != SetState::Final => Ok(()),
            _ => Err(BuildError::protocol(call, format!("inside {}", current))),
        }
    }

    fn expect_window(&mut self, call: &str) -> BuildResult<&mut FrameState> {
        let current = self.current();
        match self.frames.last_mut() {
            Some(Frame::Window(state)) => Ok(state),
            _ => Err(BuildError::protocol(call, format!("inside {}", current))),
        }
    }

    fn combinator(&mut self, call: &str, kind: SetOperationKind) -> BuildResult<()> {
        let level = self.open_level(call)?;
        if !level.operand_ready {
            return Err(BuildError::protocol(call, "left operand is empty"));
        }
        if level.body == Body::RecursiveCte && (!kind.is_union() || level.combinators > 0) {
            return Err(BuildError::protocol(
                call,
                "a recursive CTE takes exactly one UNION or UNION ALL",
            ));
        }
        level.set = SetState::Open;
        level.combinators += 1;
        level.froms.clear();
        level.roots = 0;
        level.operand_ready = false;
        Ok(())
    }
}

impl CriteriaBuilder for RecordingBuilder {
    fn get_from(&self, alias: &str) -> Option<FromNode> {
        self.level_ref()?
            .froms
            .iter()
            .find(|node| node.alias == alias)
            .cloned()
    }

    fn from_entity(&mut self, entity: &str, alias: &str) -> BuildResult<()> {
        self.add_root("from", alias, entity)?;
        self.record(BuilderCall::FromEntity {
            entity: entity.into(),
            alias: alias.into(),
        })
    }

    fn from_path(&mut self, path: &str, alias: &str) -> BuildResult<()> {
        if self.level("from_path")?.body != Body::Subquery {
            return Err(BuildError::protocol(
                "from_path",
                "correlated roots are only valid in subqueries",
            ));
        }
        self.add_root("from_path", alias, path)?;
        self.record(BuilderCall::FromPath {
            path: path.into(),
            alias: alias.into(),
        })
    }

    fn from_values(
        &mut self,
        entity: &str,
        attribute: Option<&str>,
        alias: &str,
        elements: &[Value],
    ) -> BuildResult<()> {
        self.add_root("from_values", alias, entity)?;
        self.record(BuilderCall::FromValues {
            entity: entity.into(),
            attribute: attribute.map(Into::into),
            alias: alias.into(),
            elements: elements.to_vec(),
            identifiable: false,
        })
    }

    fn from_identifiable_values(
        &mut self,
        entity: &str,
        attribute: Option<&str>,
        alias: &str,
        elements: &[Value],
    ) -> BuildResult<()> {
        self.add_root("from_identifiable_values", alias, entity)?;
        self.record(BuilderCall::FromValues {
            entity: entity.into(),
            attribute: attribute.map(Into::into),
            alias: alias.into(),
            elements: elements.to_vec(),
            identifiable: true,
        })
    }

    fn from_subquery(&mut self, entity: &str, alias: &str) -> BuildResult<()> {
        self.add_root("from_subquery", alias, entity)?;
        self.frames.push(Frame::Level(Level::new(Body::FromSubquery)));
        self.record(BuilderCall::FromSubquery {
            entity: entity.into(),
            alias: alias.into(),
        })
    }

    fn join_default(
        &mut self,
        path: &str,
        alias: &str,
        kind: JoinKind,
        fetch: bool,
    ) -> BuildResult<()> {
        self.add_join("join_default", alias, path)?;
        self.record(BuilderCall::JoinDefault {
            path: path.into(),
            alias: alias.into(),
            kind,
            fetch,
        })
    }

    fn join_on_entity(
        &mut self,
        base: Option<&str>,
        entity: &str,
        alias: &str,
        kind: JoinKind,
    ) -> BuildResult<()> {
        {
            let level = self.open_level("join_on")?;
            match base {
                Some(base) if !level.froms.iter().any(|node| node.alias == base) => {
                    return Err(BuildError::protocol(
                        "join_on",
                        format!("base node '{}' is not declared", base),
                    ));
                }
                None if level.roots > 1 => {
                    return Err(BuildError::protocol(
                        "join_on",
                        "explicit base node required when multiple roots are used",
                    ));
                }
                _ => {}
            }
        }
        self.add_join("join_on", alias, entity)?;
        self.frames.push(Frame::OnClause);
        self.record(BuilderCall::JoinOnEntity {
            base: base.map(Into::into),
            entity: entity.into(),
            alias: alias.into(),
            kind,
        })
    }

    fn join_on_path(&mut self, path: &str, alias: &str, kind: JoinKind) -> BuildResult<()> {
        self.add_join("join_on_path", alias, path)?;
        self.frames.push(Frame::OnClause);
        self.record(BuilderCall::JoinOnPath {
            path: path.into(),
            alias: alias.into(),
            kind,
        })
    }

    fn join_on_subquery(&mut self, entity: &str, alias: &str, kind: JoinKind) -> BuildResult<()> {
        self.add_join("join_on_subquery", alias, entity)?;
        self.frames.push(Frame::OnClause);
        self.push_join_body(None);
        self.record(BuilderCall::JoinOnSubquery {
            entity: entity.into(),
            alias: alias.into(),
            kind,
        })
    }

    fn join_lateral_on_subquery(
        &mut self,
        target: &LateralTarget,
        alias: &str,
        kind: JoinKind,
    ) -> BuildResult<()> {
        self.add_join("join_lateral_on_subquery", alias, &target.to_string())?;
        self.frames.push(Frame::OnClause);
        self.push_join_body(Some(target));
        self.record(BuilderCall::JoinLateralOnSubquery {
            target: target.clone(),
            alias: alias.into(),
            kind,
        })
    }

    fn join_lateral_subquery(
        &mut self,
        target: &LateralTarget,
        alias: &str,
        kind: JoinKind,
    ) -> BuildResult<()> {
        self.add_join("join_lateral_subquery", alias, &target.to_string())?;
        self.push_join_body(Some(target));
        self.record(BuilderCall::JoinLateralSubquery {
            target: target.clone(),
            alias: alias.into(),
            kind,
        })
    }

    fn set_on_expression(&mut self, expression: &str) -> BuildResult<()> {
        self.take_on_clause("on")?;
        self.record(BuilderCall::On {
            expression: expression.into(),
            subqueries: false,
        })
    }

    fn set_on_expression_subqueries(&mut self, expression: &str) -> BuildResult<()> {
        self.take_on_clause("on_subqueries")?;
        self.frames.push(Frame::Subqueries);
        self.record(BuilderCall::On {
            expression: expression.into(),
            subqueries: true,
        })
    }

    fn select(&mut self, expression: &str, alias: Option<&str>) -> BuildResult<()> {
        self.take_select_slot("select")?;
        self.record(BuilderCall::Select {
            expression: expression.into(),
            alias: alias.map(Into::into),
            subqueries: false,
        })
    }

    fn select_subqueries(&mut self, expression: &str, alias: Option<&str>) -> BuildResult<()> {
        self.take_select_slot("select_subqueries")?;
        self.frames.push(Frame::Subqueries);
        self.record(BuilderCall::Select {
            expression: expression.into(),
            alias: alias.map(Into::into),
            subqueries: true,
        })
    }

    fn select_new(&mut self, arity: usize) -> BuildResult<()> {
        if self.level("select_new")?.body != Body::Criteria {
            return Err(BuildError::protocol(
                "select_new",
                "constructor projections need a criteria query",
            ));
        }
        self.frames.push(Frame::SelectNew { remaining: arity });
        self.record(BuilderCall::SelectNew { arity })
    }

    fn end_select_new(&mut self) -> BuildResult<()> {
        match self.frames.last() {
            Some(Frame::SelectNew { remaining: 0 }) => {
                self.frames.pop();
                self.record(BuilderCall::EndSelectNew)
            }
            Some(Frame::SelectNew { remaining }) => Err(BuildError::protocol(
                "end_select_new",
                format!("{} constructor arguments missing", remaining),
            )),
            _ => Err(BuildError::protocol(
                "end_select_new",
                format!("inside {}", self.current()),
            )),
        }
    }

    fn bind(&mut self, attribute: &str) -> BuildResult<()> {
        if !self.level("bind")?.body.accepts_binds() {
            return Err(BuildError::protocol("bind", "binds need a CTE builder"));
        }
        self.frames.push(Frame::Bound);
        self.record(BuilderCall::Bind {
            attribute: attribute.into(),
        })
    }

    fn distinct(&mut self) -> BuildResult<()> {
        self.open_level("distinct")?;
        self.record(BuilderCall::Distinct)
    }

    fn set_where_expression(&mut self, expression: &str) -> BuildResult<()> {
        self.open_level("where")?;
        self.record(BuilderCall::Where {
            expression: expression.into(),
            subqueries: false,
        })
    }

    fn set_where_expression_subqueries(&mut self, expression: &str) -> BuildResult<()> {
        self.open_level("where_subqueries")?;
        self.frames.push(Frame::Subqueries);
        self.record(BuilderCall::Where {
            expression: expression.into(),
            subqueries: true,
        })
    }

    fn group_by(&mut self, expression: &str) -> BuildResult<()> {
        self.open_level("group_by")?;
        self.record(BuilderCall::GroupBy {
            expression: expression.into(),
        })
    }

    fn set_having_expression(&mut self, expression: &str) -> BuildResult<()> {
        self.open_level("having")?;
        self.record(BuilderCall::Having {
            expression: expression.into(),
            subqueries: false,
        })
    }

    fn set_having_expression_subqueries(&mut self, expression: &str) -> BuildResult<()> {
        self.open_level("having_subqueries")?;
        self.frames.push(Frame::Subqueries);
        self.record(BuilderCall::Having {
            expression: expression.into(),
            subqueries: true,
        })
    }

    fn order_by(
        &mut self,
        expression: &str,
        ascending: bool,
        nulls: NullHandling,
    ) -> BuildResult<()> {
        self.level("order_by")?;
        self.record(BuilderCall::OrderBy {
            expression: expression.into(),
            ascending,
            nulls,
        })
    }

    fn with_subquery(&mut self, label: &str) -> BuildResult<()> {
        match self.frames.last() {
            Some(Frame::Subqueries) => {
                self.frames.push(Frame::Level(Level::new(Body::Subquery)));
                self.record(BuilderCall::WithSubquery {
                    label: label.into(),
                })
            }
            _ => Err(BuildError::protocol(
                "with_subquery",
                format!("no subquery placeholders announced (inside {})", self.current()),
            )),
        }
    }

    fn end_subqueries(&mut self) -> BuildResult<()> {
        match self.frames.last() {
            Some(Frame::Subqueries) => {
                self.frames.pop();
                self.record(BuilderCall::EndSubqueries)
            }
            _ => Err(BuildError::protocol(
                "end_subqueries",
                format!("inside {}", self.current()),
            )),
        }
    }

    fn with(&mut self, entity: &str) -> BuildResult<()> {
        self.open_cte("with", Body::Cte)?;
        self.record(BuilderCall::With {
            entity: entity.into(),
        })
    }

    fn with_recursive(&mut self, entity: &str) -> BuildResult<()> {
        self.open_cte("with_recursive", Body::RecursiveCte)?;
        self.record(BuilderCall::WithRecursive {
            entity: entity.into(),
        })
    }

    fn start_set(&mut self) -> BuildResult<()> {
        let level = self.open_level("start_set")?;
        if level.operand_ready {
            return Err(BuildError::protocol(
                "start_set",
                "a bracket must open its operand",
            ));
        }
        self.frames.push(Frame::Level(Level::new(Body::Bracket)));
        self.record(BuilderCall::StartSet)
    }

    fn set_operation(&mut self, kind: SetOperationKind) -> BuildResult<()> {
        self.combinator(set_keyword(kind), kind)?;
        self.record(BuilderCall::SetOperation { kind, start: false })
    }

    fn start_set_operation(&mut self, kind: SetOperationKind) -> BuildResult<()> {
        self.combinator(set_keyword(kind), kind)?;
        self.frames.push(Frame::Level(Level::new(Body::Bracket)));
        self.record(BuilderCall::SetOperation { kind, start: true })
    }

    fn end_set_with(&mut self) -> BuildResult<()> {
        let level = self.level("end_set_with")?;
        if level.body != Body::Bracket || level.set != SetState::Open {
            return Err(BuildError::protocol(
                "end_set_with",
                "no open set operation in a bracket",
            ));
        }
        level.set = SetState::Final;
        self.record(BuilderCall::EndSetWith)
    }

    fn end_set(&mut self) -> BuildResult<()> {
        let level = self.level("end_set")?;
        match (level.body, level.set) {
            (Body::Bracket, SetState::Open | SetState::Final) => {
                self.frames.pop();
                if let Some(Frame::Level(parent)) = self.frames.last_mut() {
                    parent.operand_ready = true;
                }
            }
            (Body::Bracket, SetState::None) => {
                return Err(BuildError::protocol("end_set", "bracket holds no set operation"));
            }
            (_, SetState::Open) => level.set = SetState::Final,
            _ => return Err(BuildError::protocol("end_set", "no open set operation")),
        }
        self.record(BuilderCall::EndSet)
    }

    fn end(&mut self) -> BuildResult<()> {
        let level = self.level("end")?;
        if !level.body.closed_by_end() {
            return Err(BuildError::protocol("end", "no CTE or subquery body is open"));
        }
        match level.body {
            Body::RecursiveCte if level.combinators != 1 || !level.operand_ready => {
                return Err(BuildError::protocol(
                    "end",
                    "recursive CTE needs a base and a recursive term",
                ));
            }
            Body::RecursiveCte => {}
            _ if level.set == SetState::Open => {
                return Err(BuildError::protocol("end", "set operation is still open"));
            }
            _ if !level.operand_ready && level.set == SetState::None => {
                return Err(BuildError::protocol("end", "body has no FROM clause"));
            }
            _ => {}
        }
        self.frames.pop();
        self.record(BuilderCall::End)
    }

    fn supports_window_extension(&self) -> bool {
        self.window_extension
    }

    fn window(&mut self, name: &str) -> BuildResult<()> {
        self.open_level("window")?;
        self.frames.push(Frame::Window(FrameState::None));
        self.record(BuilderCall::Window { name: name.into() })
    }

    fn window_extends(&mut self, base: &str) -> BuildResult<()> {
        if !self.window_extension {
            return Err(BuildError::Unsupported(format!(
                "extending named window '{}'",
                base
            )));
        }
        self.expect_window("window_extends")?;
        self.record(BuilderCall::WindowExtends { base: base.into() })
    }

    fn window_partition_by(&mut self, expression: &str) -> BuildResult<()> {
        self.expect_window("partition_by")?;
        self.record(BuilderCall::WindowPartitionBy {
            expression: expression.into(),
        })
    }

    fn window_order_by(
        &mut self,
        expression: &str,
        ascending: bool,
        nulls: NullHandling,
    ) -> BuildResult<()> {
        self.expect_window("window_order_by")?;
        self.record(BuilderCall::WindowOrderBy {
            expression: expression.into(),
            ascending,
            nulls,
        })
    }

    fn window_frame(&mut self, mode: FrameMode) -> BuildResult<()> {
        let state = self.expect_window(frame_keyword(mode))?;
        if *state != FrameState::None {
            return Err(BuildError::protocol(frame_keyword(mode), "frame already opened"));
        }
        *state = FrameState::Opened;
        self.record(BuilderCall::WindowFrame { mode })
    }

    fn frame_start(&mut self, bound: &FrameBoundArg) -> BuildResult<()> {
        let state = self.expect_window("frame")?;
        if *state != FrameState::Opened {
            return Err(BuildError::protocol("frame", "no frame awaits its bound"));
        }
        *state = FrameState::Complete;
        self.record(BuilderCall::FrameStart {
            bound: bound.clone(),
        })
    }

    fn frame_between(&mut self, start: &FrameBoundArg) -> BuildResult<()> {
        let state = self.expect_window("between")?;
        if *state != FrameState::Opened {
            return Err(BuildError::protocol("between", "no frame awaits its bound"));
        }
        *state = FrameState::Between;
        self.record(BuilderCall::FrameBetween {
            bound: start.clone(),
        })
    }

    fn frame_and(&mut self, end: &FrameBoundArg) -> BuildResult<()> {
        let state = self.expect_window("and")?;
        if *state != FrameState::Between {
            return Err(BuildError::protocol("and", "no BETWEEN awaits its end bound"));
        }
        *state = FrameState::Complete;
        self.record(BuilderCall::FrameAnd { bound: end.clone() })
    }

    fn end_window(&mut self) -> BuildResult<()> {
        let state = *self.expect_window("end_window")?;
        if matches!(state, FrameState::Opened | FrameState::Between) {
            return Err(BuildError::protocol("end_window", "frame is incomplete"));
        }
        self.frames.pop();
        self.record(BuilderCall::EndWindow)
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> BuildResult<()> {
        self.record(BuilderCall::SetParameter {
            name: name.into(),
            value: value.clone(),
        })
    }

    fn set_max_results(&mut self, limit: u64) -> BuildResult<()> {
        self.level("set_max_results")?;
        self.record(BuilderCall::SetMaxResults(limit))
    }

    fn set_first_result(&mut self, offset: u64) -> BuildResult<()> {
        self.level("set_first_result")?;
        self.record(BuilderCall::SetFirstResult(offset))
    }
}

impl RecordingBuilder {
    fn open_cte(&mut self, call: &str, body: Body) -> BuildResult<()> {
        let at_root = self.frames.len() == 1;
        let level = self.open_level(call)?;
        if !at_root || level.body != Body::Criteria || level.operand_ready || level.set != SetState::None
        {
            return Err(BuildError::protocol(
                call,
                "CTEs must be declared before the main query",
            ));
        }
        self.frames.push(Frame::Level(Level::new(body)));
        Ok(())
    }
}

impl fmt::Display for RecordingBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.trace())
    }
}
