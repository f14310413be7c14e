//! Expression tree consumed by the compiler.
//!
//! Expressions are immutable and reference counted. Cloning an [`Expr`]
//! shares the node, so the same subtree may hang under several parents.
//! Session tables key nodes by [`Expr::identity`], never by value.

pub mod ops;

use std::fmt;
use std::sync::Arc;

use crate::query::QueryMetadata;
use crate::templates::Template;
use crate::window::WindowDefinition;

pub use ops::{DatePart, Operator, SetOperationKind, SetOperator, UnknownOperator};

// =============================================================================
// Values
// =============================================================================

/// A literal carried by a [`ExprKind::Constant`] node or a parameter binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn is_collection(&self) -> bool {
        matches!(self, Value::List(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// Paths
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Root,
    Property,
    Collection { element_type: String },
    Treat,
}

/// A dotted attribute-access chain rooted at an entity variable.
///
/// `type_name` is the entity or attribute type the path evaluates to. For
/// collection paths it is the element type. A treated path narrows its
/// parent to a subtype and renders as `TREAT(parent AS Subtype)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    parent: Option<Arc<Path>>,
    name: String,
    type_name: String,
    segment: Segment,
}

impl Path {
    /// A root path: an entity variable such as `b` of type `Base`.
    pub fn root(type_name: &str, variable: &str) -> Self {
        Self {
            parent: None,
            name: variable.to_string(),
            type_name: type_name.to_string(),
            segment: Segment::Root,
        }
    }

    /// A singular attribute of this path.
    pub fn get(&self, name: &str, type_name: &str) -> Path {
        Path {
            parent: Some(Arc::new(self.clone())),
            name: name.to_string(),
            type_name: type_name.to_string(),
            segment: Segment::Property,
        }
    }

    /// A plural (collection or map) attribute of this path.
    pub fn collection(&self, name: &str, element_type: &str) -> Path {
        Path {
            parent: Some(Arc::new(self.clone())),
            name: name.to_string(),
            type_name: element_type.to_string(),
            segment: Segment::Collection {
                element_type: element_type.to_string(),
            },
        }
    }

    /// This path narrowed to `subtype`.
    pub fn treat(&self, subtype: &str) -> Path {
        Path {
            parent: Some(Arc::new(self.clone())),
            name: self.name.clone(),
            type_name: subtype.to_string(),
            segment: Segment::Treat,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn parent(&self) -> Option<&Path> {
        self.parent.as_deref()
    }

    pub fn element_type(&self) -> Option<&str> {
        match &self.segment {
            Segment::Collection { element_type } => Some(element_type),
            _ => None,
        }
    }

    /// True for entity variables, false for every attribute path.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_treated(&self) -> bool {
        self.segment == Segment::Treat
    }

    /// The entity variable this path starts from.
    pub fn root_path(&self) -> &Path {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Whether a FROM node of type `entity_type` already declares this path.
    pub fn matches_type(&self, entity_type: &str) -> bool {
        self.element_type() == Some(entity_type) || self.type_name == entity_type
    }

    /// Dotted attribute names from `root` (exclusive) down to this path.
    ///
    /// `cte.owner.name` relative to `cte` is `owner.name`.
    pub fn relative_to(&self, root: &Path) -> String {
        let mut names = Vec::new();
        let mut current = self;
        while let Some(parent) = current.parent() {
            if current == root {
                break;
            }
            if !current.is_treated() {
                names.push(current.name.as_str());
            }
            current = parent;
        }
        names.reverse();
        names.join(".")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.segment, self.parent()) {
            (Segment::Treat, Some(parent)) => write!(f, "TREAT({} AS {})", parent, self.type_name),
            (_, Some(parent)) => write!(f, "{}.{}", parent, self.name),
            (_, None) => write!(f, "{}", self.name),
        }
    }
}

// =============================================================================
// Expressions
// =============================================================================

/// An operator applied to an ordered argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub operator: Operator,
    pub args: Vec<Expr>,
}

impl Operation {
    pub fn arg(&self, index: usize) -> Option<&Expr> {
        self.args.get(index)
    }
}

/// A raw fragment with positional argument substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateExpr {
    pub template: Arc<Template>,
    pub args: Vec<Expr>,
}

/// The closed set of expression node kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(Value),
    Path(Path),
    Operation(Operation),
    SubQuery(QueryMetadata),
    Tuple(Vec<Expr>),
    Param(String),
    Template(TemplateExpr),
}

/// A shared, immutable expression node.
#[derive(Clone, PartialEq)]
pub struct Expr(Arc<ExprKind>);

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr(Arc::new(kind))
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::new(ExprKind::Constant(value.into()))
    }

    pub fn path(path: Path) -> Self {
        Expr::new(ExprKind::Path(path))
    }

    pub fn operation(operator: Operator, args: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Operation(Operation { operator, args }))
    }

    pub fn subquery(metadata: QueryMetadata) -> Self {
        Expr::new(ExprKind::SubQuery(metadata))
    }

    pub fn tuple(items: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Tuple(items))
    }

    pub fn param(name: &str) -> Self {
        Expr::new(ExprKind::Param(name.to_string()))
    }

    pub fn template(pattern: &str, args: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Template(TemplateExpr {
            template: Arc::new(Template::new(pattern)),
            args,
        }))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0
    }

    /// Node identity. Two clones of one node share it; equal but separately
    /// built nodes do not.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self.kind() {
            ExprKind::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_operation(&self) -> Option<&Operation> {
        match self.kind() {
            ExprKind::Operation(op) => Some(op),
            _ => None,
        }
    }

    pub fn as_subquery(&self) -> Option<&QueryMetadata> {
        match self.kind() {
            ExprKind::SubQuery(meta) => Some(meta),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self.kind() {
            ExprKind::Constant(v) => Some(v),
            _ => None,
        }
    }

    /// The set combinator when this node is a set operation.
    pub fn as_set_operation(&self) -> Option<(SetOperator, &Operation)> {
        let op = self.as_operation()?;
        op.operator.as_set().map(|set| (set, op))
    }

    /// The operation when this node carries `operator`.
    pub fn as_operation_of(&self, operator: Operator) -> Option<&Operation> {
        self.as_operation().filter(|op| op.operator == operator)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.kind(), f)
    }
}

/// Short human-readable description used in diagnostics.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Constant(v) => write!(f, "{}", v),
            ExprKind::Path(p) => write!(f, "{}", p),
            ExprKind::Operation(op) => {
                write!(f, "{}(", op.operator)?;
                for (i, arg) in op.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            ExprKind::SubQuery(meta) => match meta.joins.first() {
                Some(join) => write!(f, "subquery from {}", join.alias_path_name()),
                None => write!(f, "subquery"),
            },
            ExprKind::Tuple(items) => write!(f, "tuple of {}", items.len()),
            ExprKind::Param(name) => write!(f, ":{}", name),
            ExprKind::Template(t) => write!(f, "template '{}'", t.template.pattern()),
        }
    }
}

impl From<Path> for Expr {
    fn from(path: Path) -> Self {
        Expr::path(path)
    }
}

impl From<&Path> for Expr {
    fn from(path: &Path) -> Self {
        Expr::path(path.clone())
    }
}

impl From<QueryMetadata> for Expr {
    fn from(metadata: QueryMetadata) -> Self {
        Expr::subquery(metadata)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::constant(value)
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::constant(n)
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::constant(n)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::constant(s)
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::constant(b)
    }
}

// =============================================================================
// Constructors
// =============================================================================

/// A literal that will be rendered as a labelled parameter.
pub fn constant(value: impl Into<Value>) -> Expr {
    Expr::constant(value)
}

/// A late-bound named parameter.
pub fn param(name: &str) -> Expr {
    Expr::param(name)
}

fn call(operator: Operator, args: Vec<Expr>) -> Expr {
    Expr::operation(operator, args)
}

pub fn count(expr: impl Into<Expr>) -> Expr {
    call(Operator::Count, vec![expr.into()])
}

pub fn count_distinct(expr: impl Into<Expr>) -> Expr {
    call(Operator::CountDistinct, vec![expr.into()])
}

pub fn sum(expr: impl Into<Expr>) -> Expr {
    call(Operator::Sum, vec![expr.into()])
}

pub fn avg(expr: impl Into<Expr>) -> Expr {
    call(Operator::Avg, vec![expr.into()])
}

pub fn min(expr: impl Into<Expr>) -> Expr {
    call(Operator::Min, vec![expr.into()])
}

pub fn max(expr: impl Into<Expr>) -> Expr {
    call(Operator::Max, vec![expr.into()])
}

pub fn lower(expr: impl Into<Expr>) -> Expr {
    call(Operator::Lower, vec![expr.into()])
}

pub fn upper(expr: impl Into<Expr>) -> Expr {
    call(Operator::Upper, vec![expr.into()])
}

pub fn coalesce(args: Vec<Expr>) -> Expr {
    call(Operator::Coalesce, args)
}

pub fn greatest(args: Vec<Expr>) -> Expr {
    call(Operator::Greatest, args)
}

pub fn least(args: Vec<Expr>) -> Expr {
    call(Operator::Least, args)
}

pub fn group_concat(expr: impl Into<Expr>, separator: &str) -> Expr {
    call(Operator::GroupConcat, vec![expr.into(), Expr::constant(separator)])
}

/// `ANY`-style boolean aggregate. Usable with [`ExprExt::over`].
pub fn any(predicate: impl Into<Expr>) -> Expr {
    call(Operator::BooleanAny, vec![predicate.into()])
}

/// `EVERY`-style boolean aggregate. Usable with [`ExprExt::over`].
pub fn all(predicate: impl Into<Expr>) -> Expr {
    call(Operator::BooleanAll, vec![predicate.into()])
}

pub fn dateadd(unit: DatePart, date: impl Into<Expr>, amount: impl Into<Expr>) -> Expr {
    call(Operator::DateAdd(unit), vec![date.into(), amount.into()])
}

/// Number of `unit` boundaries between `start` and `end`.
pub fn datediff(unit: DatePart, start: impl Into<Expr>, end: impl Into<Expr>) -> Expr {
    call(Operator::DateDiff(unit), vec![start.into(), end.into()])
}

pub fn datetrunc(unit: DatePart, date: impl Into<Expr>) -> Expr {
    call(Operator::DateTrunc(unit), vec![date.into()])
}

pub fn exists(subquery: impl Into<Expr>) -> Expr {
    call(Operator::Exists, vec![subquery.into()])
}

/// `TREAT(expr AS subtype)` for non-path operands. Paths use [`Path::treat`].
pub fn treat(expr: impl Into<Expr>, subtype: &str) -> Expr {
    call(Operator::Treat, vec![expr.into(), Expr::constant(subtype)])
}

pub fn cast(expr: impl Into<Expr>, type_name: &str) -> Expr {
    call(Operator::Cast, vec![expr.into(), Expr::constant(type_name)])
}

/// `TYPE(path)`, the entity type discriminator.
pub fn type_of(path: &Path) -> Expr {
    call(Operator::Type, vec![Expr::path(path.clone())])
}

/// A value rendered inline as a JPQL literal instead of a parameter.
///
/// The text is fixed at construction, so the node never produces a binding.
pub fn literal(value: impl Into<Value>) -> Expr {
    call(Operator::Literal, vec![Expr::constant(value.into().to_string())])
}

pub fn row_number() -> Expr {
    call(Operator::RowNumber, vec![])
}

pub fn rank() -> Expr {
    call(Operator::Rank, vec![])
}

pub fn dense_rank() -> Expr {
    call(Operator::DenseRank, vec![])
}

pub fn percent_rank() -> Expr {
    call(Operator::PercentRank, vec![])
}

pub fn cume_dist() -> Expr {
    call(Operator::CumeDist, vec![])
}

pub fn ntile(buckets: impl Into<Expr>) -> Expr {
    call(Operator::Ntile, vec![buckets.into()])
}

pub fn lag(expr: impl Into<Expr>) -> Expr {
    call(Operator::Lag, vec![expr.into()])
}

pub fn lead(expr: impl Into<Expr>) -> Expr {
    call(Operator::Lead, vec![expr.into()])
}

pub fn first_value(expr: impl Into<Expr>) -> Expr {
    call(Operator::FirstValue, vec![expr.into()])
}

pub fn last_value(expr: impl Into<Expr>) -> Expr {
    call(Operator::LastValue, vec![expr.into()])
}

pub fn nth_value(expr: impl Into<Expr>, n: impl Into<Expr>) -> Expr {
    call(Operator::NthValue, vec![expr.into(), n.into()])
}

/// Binary set combinator.
pub fn set_operation(kind: SetOperationKind, lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
    call(
        Operator::Set(SetOperator::new(kind)),
        vec![lhs.into(), rhs.into()],
    )
}

/// Binary set combinator whose left operand opens a bracketed scope.
pub fn left_nested_set_operation(
    kind: SetOperationKind,
    lhs: impl Into<Expr>,
    rhs: impl Into<Expr>,
) -> Expr {
    call(
        Operator::Set(SetOperator::left_nested(kind)),
        vec![lhs.into(), rhs.into()],
    )
}

pub fn union(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
    set_operation(SetOperationKind::Union, lhs, rhs)
}

pub fn union_all(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
    set_operation(SetOperationKind::UnionAll, lhs, rhs)
}

pub fn intersect(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
    set_operation(SetOperationKind::Intersect, lhs, rhs)
}

pub fn except(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
    set_operation(SetOperationKind::Except, lhs, rhs)
}

// =============================================================================
// Expression Builder Trait
// =============================================================================

/// Extension trait for building expressions fluently.
pub trait ExprExt: Sized {
    fn into_expr(self) -> Expr;

    // Comparison operators
    fn eq(self, other: impl Into<Expr>) -> Expr {
        call(Operator::Eq, vec![self.into_expr(), other.into()])
    }

    fn ne(self, other: impl Into<Expr>) -> Expr {
        call(Operator::Ne, vec![self.into_expr(), other.into()])
    }

    fn lt(self, other: impl Into<Expr>) -> Expr {
        call(Operator::Lt, vec![self.into_expr(), other.into()])
    }

    fn gt(self, other: impl Into<Expr>) -> Expr {
        call(Operator::Gt, vec![self.into_expr(), other.into()])
    }

    fn loe(self, other: impl Into<Expr>) -> Expr {
        call(Operator::Loe, vec![self.into_expr(), other.into()])
    }

    fn goe(self, other: impl Into<Expr>) -> Expr {
        call(Operator::Goe, vec![self.into_expr(), other.into()])
    }

    fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Expr {
        call(
            Operator::Between,
            vec![self.into_expr(), low.into(), high.into()],
        )
    }

    fn in_(self, values: impl Into<Expr>) -> Expr {
        call(Operator::In, vec![self.into_expr(), values.into()])
    }

    fn not_in(self, values: impl Into<Expr>) -> Expr {
        call(Operator::NotIn, vec![self.into_expr(), values.into()])
    }

    fn is_null(self) -> Expr {
        call(Operator::IsNull, vec![self.into_expr()])
    }

    fn is_not_null(self) -> Expr {
        call(Operator::IsNotNull, vec![self.into_expr()])
    }

    fn like(self, pattern: impl Into<Expr>) -> Expr {
        call(Operator::Like, vec![self.into_expr(), pattern.into()])
    }

    // Logical operators
    fn and(self, other: impl Into<Expr>) -> Expr {
        call(Operator::And, vec![self.into_expr(), other.into()])
    }

    fn or(self, other: impl Into<Expr>) -> Expr {
        call(Operator::Or, vec![self.into_expr(), other.into()])
    }

    fn not(self) -> Expr {
        call(Operator::Not, vec![self.into_expr()])
    }

    // Arithmetic operators
    fn add(self, other: impl Into<Expr>) -> Expr {
        call(Operator::Add, vec![self.into_expr(), other.into()])
    }

    fn sub(self, other: impl Into<Expr>) -> Expr {
        call(Operator::Sub, vec![self.into_expr(), other.into()])
    }

    fn mul(self, other: impl Into<Expr>) -> Expr {
        call(Operator::Mul, vec![self.into_expr(), other.into()])
    }

    fn div(self, other: impl Into<Expr>) -> Expr {
        call(Operator::Div, vec![self.into_expr(), other.into()])
    }

    fn neg(self) -> Expr {
        call(Operator::Negate, vec![self.into_expr()])
    }

    fn concat(self, other: impl Into<Expr>) -> Expr {
        call(Operator::Concat, vec![self.into_expr(), other.into()])
    }

    // Projection markers

    /// `expr AS alias` in a select list.
    fn alias(self, alias: &Path) -> Expr {
        call(Operator::Alias, vec![self.into_expr(), Expr::path(alias.clone())])
    }

    /// Binds a projected expression to a CTE attribute.
    fn bind(self, cte_attribute: &Path) -> Expr {
        call(
            Operator::Bind,
            vec![self.into_expr(), Expr::path(cte_attribute.clone())],
        )
    }

    // Analytic

    /// `expr OVER (window)`.
    fn over(self, window: &WindowDefinition) -> Expr {
        call(Operator::Over, vec![self.into_expr(), window.to_expr()])
    }

    /// `expr FILTER (WHERE predicate)`.
    fn filter(self, predicate: impl Into<Expr>) -> Expr {
        call(Operator::Filter, vec![self.into_expr(), predicate.into()])
    }
}

impl ExprExt for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl ExprExt for Path {
    fn into_expr(self) -> Expr {
        Expr::path(self)
    }
}
