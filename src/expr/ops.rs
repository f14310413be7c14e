//! Operator tags carried by [`Operation`](super::Operation) nodes.
//!
//! Rendering of each tag lives in the operator table (`crate::templates`);
//! this module only names them.

use std::fmt;
use std::str::FromStr;

/// The six set combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperationKind {
    Union,
    UnionAll,
    Intersect,
    IntersectAll,
    Except,
    ExceptAll,
}

impl SetOperationKind {
    pub const ALL: [SetOperationKind; 6] = [
        SetOperationKind::Union,
        SetOperationKind::UnionAll,
        SetOperationKind::Intersect,
        SetOperationKind::IntersectAll,
        SetOperationKind::Except,
        SetOperationKind::ExceptAll,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SetOperationKind::Union => "UNION",
            SetOperationKind::UnionAll => "UNION_ALL",
            SetOperationKind::Intersect => "INTERSECT",
            SetOperationKind::IntersectAll => "INTERSECT_ALL",
            SetOperationKind::Except => "EXCEPT",
            SetOperationKind::ExceptAll => "EXCEPT_ALL",
        }
    }

    /// Whether this is one of the two combinators a recursive CTE accepts.
    pub fn is_union(self) -> bool {
        matches!(self, SetOperationKind::Union | SetOperationKind::UnionAll)
    }
}

/// A set combinator together with its left-nesting marker.
///
/// A left-nested combinator asks for its left operand to be opened as a
/// bracketed scope of its own, because the builder protocol cannot group
/// set operands any other way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetOperator {
    pub kind: SetOperationKind,
    pub left_nested: bool,
}

impl SetOperator {
    pub fn new(kind: SetOperationKind) -> Self {
        Self {
            kind,
            left_nested: false,
        }
    }

    pub fn left_nested(kind: SetOperationKind) -> Self {
        Self {
            kind,
            left_nested: true,
        }
    }
}

/// Calendar unit for the date arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    pub const ALL: [DatePart; 7] = [
        DatePart::Year,
        DatePart::Month,
        DatePart::Week,
        DatePart::Day,
        DatePart::Hour,
        DatePart::Minute,
        DatePart::Second,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Week => "WEEK",
            DatePart::Day => "DAY",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
        }
    }
}

/// Operator tags.
///
/// Adding a variant requires a name in [`Operator::name`] and, unless the
/// serializer special-cases it, an entry in the default operator table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // Boolean
    And,
    Or,
    Not,

    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Loe,
    Goe,
    Between,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Like,
    LikeEscape,
    Exists,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,

    // String
    Concat,
    Lower,
    Upper,
    Trim,
    Length,
    Substring,

    // Aggregates and scalar functions
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
    Coalesce,
    NullIf,
    Greatest,
    Least,
    GroupConcat,
    BooleanAny,
    BooleanAll,

    // Dates
    DateAdd(DatePart),
    DateDiff(DatePart),
    DateTrunc(DatePart),

    // Type family
    Cast,
    Treat,
    Type,
    Literal,

    // Projection markers
    Alias,
    Bind,
    List,

    // Analytic
    RowNumber,
    Rank,
    DenseRank,
    PercentRank,
    CumeDist,
    Ntile,
    Lag,
    Lead,
    FirstValue,
    LastValue,
    NthValue,
    Filter,
    Over,

    // Window components
    WindowDefinition,
    WindowBase,
    WindowPartitionBy,
    WindowOrderBy,
    WindowRows,
    WindowRange,
    WindowGroups,
    WindowBetween,
    WindowUnboundedPreceding,
    WindowPreceding,
    WindowCurrentRow,
    WindowFollowing,
    WindowUnboundedFollowing,

    // Set combinators
    Set(SetOperator),
}

impl Operator {
    /// Every operator, set combinators included.
    pub fn all() -> Vec<Operator> {
        use Operator::*;
        let mut ops = vec![
            And,
            Or,
            Not,
            Eq,
            Ne,
            Lt,
            Gt,
            Loe,
            Goe,
            Between,
            In,
            NotIn,
            IsNull,
            IsNotNull,
            Like,
            LikeEscape,
            Exists,
            Add,
            Sub,
            Mul,
            Div,
            Mod,
            Negate,
            Concat,
            Lower,
            Upper,
            Trim,
            Length,
            Substring,
            Count,
            CountDistinct,
            Sum,
            Avg,
            Min,
            Max,
            Coalesce,
            NullIf,
            Greatest,
            Least,
            GroupConcat,
            BooleanAny,
            BooleanAll,
            Cast,
            Treat,
            Type,
            Literal,
            Alias,
            Bind,
            List,
            RowNumber,
            Rank,
            DenseRank,
            PercentRank,
            CumeDist,
            Ntile,
            Lag,
            Lead,
            FirstValue,
            LastValue,
            NthValue,
            Filter,
            Over,
            WindowDefinition,
            WindowBase,
            WindowPartitionBy,
            WindowOrderBy,
            WindowRows,
            WindowRange,
            WindowGroups,
            WindowBetween,
            WindowUnboundedPreceding,
            WindowPreceding,
            WindowCurrentRow,
            WindowFollowing,
            WindowUnboundedFollowing,
        ];
        for part in DatePart::ALL {
            ops.push(DateAdd(part));
            ops.push(DateDiff(part));
            ops.push(DateTrunc(part));
        }
        for kind in SetOperationKind::ALL {
            ops.push(Set(SetOperator::new(kind)));
            ops.push(Set(SetOperator::left_nested(kind)));
        }
        ops
    }

    /// Stable upper-case name, used in diagnostics and settings files.
    pub fn name(&self) -> String {
        use Operator::*;
        let name = match self {
            And => "AND",
            Or => "OR",
            Not => "NOT",
            Eq => "EQ",
            Ne => "NE",
            Lt => "LT",
            Gt => "GT",
            Loe => "LOE",
            Goe => "GOE",
            Between => "BETWEEN",
            In => "IN",
            NotIn => "NOT_IN",
            IsNull => "IS_NULL",
            IsNotNull => "IS_NOT_NULL",
            Like => "LIKE",
            LikeEscape => "LIKE_ESCAPE",
            Exists => "EXISTS",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MOD",
            Negate => "NEGATE",
            Concat => "CONCAT",
            Lower => "LOWER",
            Upper => "UPPER",
            Trim => "TRIM",
            Length => "LENGTH",
            Substring => "SUBSTRING",
            Count => "COUNT",
            CountDistinct => "COUNT_DISTINCT",
            Sum => "SUM",
            Avg => "AVG",
            Min => "MIN",
            Max => "MAX",
            Coalesce => "COALESCE",
            NullIf => "NULLIF",
            Greatest => "GREATEST",
            Least => "LEAST",
            GroupConcat => "GROUP_CONCAT",
            BooleanAny => "BOOLEAN_ANY",
            BooleanAll => "BOOLEAN_ALL",
            Cast => "CAST",
            Treat => "TREAT",
            Type => "TYPE",
            Literal => "LITERAL",
            DateAdd(part) => return format!("ADD_{}", part.name()),
            DateDiff(part) => return format!("{}_DIFF", part.name()),
            DateTrunc(part) => return format!("TRUNC_{}", part.name()),
            Alias => "ALIAS",
            Bind => "BIND",
            List => "LIST",
            RowNumber => "ROW_NUMBER",
            Rank => "RANK",
            DenseRank => "DENSE_RANK",
            PercentRank => "PERCENT_RANK",
            CumeDist => "CUME_DIST",
            Ntile => "NTILE",
            Lag => "LAG",
            Lead => "LEAD",
            FirstValue => "FIRST_VALUE",
            LastValue => "LAST_VALUE",
            NthValue => "NTH_VALUE",
            Filter => "FILTER",
            Over => "OVER",
            WindowDefinition => "WINDOW_DEFINITION",
            WindowBase => "WINDOW_BASE",
            WindowPartitionBy => "WINDOW_PARTITION_BY",
            WindowOrderBy => "WINDOW_ORDER_BY",
            WindowRows => "WINDOW_ROWS",
            WindowRange => "WINDOW_RANGE",
            WindowGroups => "WINDOW_GROUPS",
            WindowBetween => "WINDOW_BETWEEN",
            WindowUnboundedPreceding => "WINDOW_UNBOUNDED_PRECEDING",
            WindowPreceding => "WINDOW_PRECEDING",
            WindowCurrentRow => "WINDOW_CURRENT_ROW",
            WindowFollowing => "WINDOW_FOLLOWING",
            WindowUnboundedFollowing => "WINDOW_UNBOUNDED_FOLLOWING",
            Set(set) => {
                let prefix = if set.left_nested {
                    "LEFT_NESTED_SET_"
                } else {
                    "SET_"
                };
                return format!("{}{}", prefix, set.kind.name());
            }
        };
        name.to_string()
    }

    pub fn as_set(&self) -> Option<SetOperator> {
        match self {
            Operator::Set(set) => Some(*set),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Error returned when an operator name is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperator(pub String);

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Operator::all()
            .into_iter()
            .find(|op| op.name() == wanted)
            .ok_or_else(|| UnknownOperator(s.to_string()))
    }
}
