//! Per-level query metadata: joins, clauses, modifiers and side flags.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::expr::{Expr, Path, Value};
use crate::window::WindowDefinition;

// =============================================================================
// Joins
// =============================================================================

/// Join type as declared by the query author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    /// A FROM-clause root.
    Root,
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinFlag {
    Fetch,
    Lateral,
    /// Force an implicit ("default") association join.
    ExplicitDefault,
}

/// Inline VALUES source used as a FROM root.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesSource {
    pub entity_type: String,
    /// Attribute of `entity_type` the values populate, when not the entity itself.
    pub attribute: Option<String>,
    pub alias: String,
    pub elements: Vec<Value>,
    /// Elements carry identity semantics (entity ids rather than plain values).
    pub identifiable: bool,
}

impl ValuesSource {
    pub fn new(entity_type: &str, alias: &str, elements: Vec<Value>) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            attribute: None,
            alias: alias.to_string(),
            elements,
            identifiable: false,
        }
    }

    #[must_use]
    pub fn attribute(mut self, attribute: &str) -> Self {
        self.attribute = Some(attribute.to_string());
        self
    }

    #[must_use]
    pub fn identifiable(mut self) -> Self {
        self.identifiable = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinTarget {
    /// A path or a subquery (possibly a set operation).
    Expr(Expr),
    Values(ValuesSource),
}

impl From<Path> for JoinTarget {
    fn from(path: Path) -> Self {
        JoinTarget::Expr(Expr::path(path))
    }
}

impl From<&Path> for JoinTarget {
    fn from(path: &Path) -> Self {
        JoinTarget::Expr(Expr::path(path.clone()))
    }
}

impl From<Expr> for JoinTarget {
    fn from(expr: Expr) -> Self {
        JoinTarget::Expr(expr)
    }
}

impl From<QueryMetadata> for JoinTarget {
    fn from(metadata: QueryMetadata) -> Self {
        JoinTarget::Expr(Expr::subquery(metadata))
    }
}

impl From<ValuesSource> for JoinTarget {
    fn from(values: ValuesSource) -> Self {
        JoinTarget::Values(values)
    }
}

/// One entry of a query level's join list.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct JoinExpression {
    pub join_type: JoinType,
    pub target: JoinTarget,
    pub alias: Option<Path>,
    pub condition: Option<Expr>,
    pub flags: Vec<JoinFlag>,
}

impl JoinExpression {
    pub fn new(join_type: JoinType, target: impl Into<JoinTarget>) -> Self {
        Self {
            join_type,
            target: target.into(),
            alias: None,
            condition: None,
            flags: Vec::new(),
        }
    }

    pub fn root(target: impl Into<JoinTarget>) -> Self {
        Self::new(JoinType::Root, target)
    }

    pub fn inner(target: impl Into<JoinTarget>) -> Self {
        Self::new(JoinType::Inner, target)
    }

    pub fn left(target: impl Into<JoinTarget>) -> Self {
        Self::new(JoinType::Left, target)
    }

    pub fn right(target: impl Into<JoinTarget>) -> Self {
        Self::new(JoinType::Right, target)
    }

    pub fn full(target: impl Into<JoinTarget>) -> Self {
        Self::new(JoinType::Full, target)
    }

    pub fn with_alias(mut self, alias: &Path) -> Self {
        self.alias = Some(alias.clone());
        self
    }

    pub fn on(mut self, condition: impl Into<Expr>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn fetch(self) -> Self {
        self.with_flag(JoinFlag::Fetch)
    }

    pub fn lateral(self) -> Self {
        self.with_flag(JoinFlag::Lateral)
    }

    pub fn explicit_default(self) -> Self {
        self.with_flag(JoinFlag::ExplicitDefault)
    }

    pub fn with_flag(mut self, flag: JoinFlag) -> Self {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
        self
    }

    pub fn has_flag(&self, flag: JoinFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// The path that names this join: the alias, or the target path itself.
    pub fn alias_path(&self) -> Option<&Path> {
        if let Some(alias) = &self.alias {
            return Some(alias);
        }
        match &self.target {
            JoinTarget::Expr(expr) => expr.as_path(),
            JoinTarget::Values(_) => None,
        }
    }

    pub fn alias_path_name(&self) -> &str {
        match (&self.target, self.alias_path()) {
            (_, Some(path)) => path.name(),
            (JoinTarget::Values(values), None) => &values.alias,
            (JoinTarget::Expr(_), None) => "?",
        }
    }
}

// =============================================================================
// Ordering and modifiers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NullHandling {
    #[default]
    Default,
    NullsFirst,
    NullsLast,
}

impl NullHandling {
    /// Text used in rendered window order items.
    pub fn keyword(self) -> &'static str {
        match self {
            NullHandling::Default => "",
            NullHandling::NullsFirst => "NULLS FIRST",
            NullHandling::NullsLast => "NULLS LAST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct OrderSpecifier {
    pub target: Expr,
    pub order: Order,
    pub null_handling: NullHandling,
}

impl OrderSpecifier {
    pub fn asc(target: impl Into<Expr>) -> Self {
        Self {
            target: target.into(),
            order: Order::Asc,
            null_handling: NullHandling::Default,
        }
    }

    pub fn desc(target: impl Into<Expr>) -> Self {
        Self {
            target: target.into(),
            order: Order::Desc,
            null_handling: NullHandling::Default,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.null_handling = NullHandling::NullsFirst;
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.null_handling = NullHandling::NullsLast;
        self
    }

    pub fn is_ascending(&self) -> bool {
        self.order == Order::Asc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryModifiers {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

// =============================================================================
// Flags
// =============================================================================

/// A common table expression declaration.
///
/// `entity` is the CTE's root path; `columns` are attribute paths of it,
/// matched positionally against the body's projection when items carry no
/// explicit bind.
#[derive(Debug, Clone, PartialEq)]
pub struct CteDeclaration {
    pub entity: Path,
    pub columns: Vec<Path>,
    pub body: Expr,
    pub recursive: bool,
}

impl CteDeclaration {
    pub fn new(entity: &Path, columns: Vec<Path>, body: impl Into<Expr>) -> Self {
        Self {
            entity: entity.clone(),
            columns,
            body: body.into(),
            recursive: false,
        }
    }

    /// A recursive CTE. `body` must be `UNION`/`UNION ALL` of base and recursive term.
    pub fn recursive(entity: &Path, columns: Vec<Path>, body: impl Into<Expr>) -> Self {
        Self {
            recursive: true,
            ..Self::new(entity, columns, body)
        }
    }
}

/// A window declared in the query's WINDOW clause.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedWindow {
    pub name: String,
    /// Window-component operation tree (`WINDOW_DEFINITION(...)`).
    pub definition: Expr,
}

impl NamedWindow {
    pub fn new(name: &str, definition: &WindowDefinition) -> Self {
        Self {
            name: name.to_string(),
            definition: definition.to_expr(),
        }
    }
}

/// Tagged side annotations of a query level.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFlag {
    /// WITH / WITH RECURSIVE declaration.
    With(Arc<CteDeclaration>),
    /// Marks the level as one operand of a set-combinator tree.
    SetOperation(Expr),
    /// WINDOW clause entry, placed after HAVING.
    Window(NamedWindow),
}

// =============================================================================
// Query metadata
// =============================================================================

/// Everything declared for one query or subquery level.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "builders have no effect until used"]
pub struct QueryMetadata {
    pub projection: Option<Expr>,
    pub distinct: bool,
    pub joins: Vec<JoinExpression>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderSpecifier>,
    pub modifiers: QueryModifiers,
    pub flags: Vec<QueryFlag>,
    pub params: IndexMap<String, Value>,
}

impl QueryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// A level that stands for a whole set-operation tree.
    pub fn set_operand(set_operation: Expr) -> Self {
        Self::new().with_flag(QueryFlag::SetOperation(set_operation))
    }

    /// Add a FROM root on an entity or correlated path.
    pub fn from(self, target: impl Into<JoinTarget>) -> Self {
        self.join(JoinExpression::root(target))
    }

    /// Add a FROM root with an explicit alias.
    pub fn from_as(self, target: impl Into<JoinTarget>, alias: &Path) -> Self {
        self.join(JoinExpression::root(target).with_alias(alias))
    }

    pub fn join(mut self, join: JoinExpression) -> Self {
        self.joins.push(join);
        self
    }

    pub fn select(mut self, projection: impl Into<Expr>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    /// Multi-column projection.
    pub fn select_tuple(mut self, items: Vec<Expr>) -> Self {
        self.projection = Some(Expr::tuple(items));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn filter(mut self, condition: impl Into<Expr>) -> Self {
        self.where_clause = Some(condition.into());
        self
    }

    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by.extend(exprs);
        self
    }

    pub fn having(mut self, condition: impl Into<Expr>) -> Self {
        self.having = Some(condition.into());
        self
    }

    pub fn order_by(mut self, order: OrderSpecifier) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.modifiers.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.modifiers.offset = Some(offset);
        self
    }

    pub fn with(self, cte: CteDeclaration) -> Self {
        self.with_flag(QueryFlag::With(Arc::new(cte)))
    }

    pub fn window(self, name: &str, definition: &WindowDefinition) -> Self {
        self.with_flag(QueryFlag::Window(NamedWindow::new(name, definition)))
    }

    pub fn with_flag(mut self, flag: QueryFlag) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// The set-operation tree this level stands for, if it is a set operand.
    pub fn set_operation(&self) -> Option<&Expr> {
        self.flags.iter().find_map(|flag| match flag {
            QueryFlag::SetOperation(expr) => Some(expr),
            _ => None,
        })
    }

    pub fn ctes(&self) -> impl Iterator<Item = &Arc<CteDeclaration>> {
        self.flags.iter().filter_map(|flag| match flag {
            QueryFlag::With(cte) => Some(cte),
            _ => None,
        })
    }

    pub fn windows(&self) -> impl Iterator<Item = &NamedWindow> {
        self.flags.iter().filter_map(|flag| match flag {
            QueryFlag::Window(window) => Some(window),
            _ => None,
        })
    }

    pub fn into_expr(self) -> Expr {
        Expr::subquery(self)
    }
}
