//! Operator table: per-operator fragment templates and precedence.
//!
//! A template is a pattern with positional placeholders:
//!
//! - `{0}` renders argument 0 through the serializer
//! - `{0s}` renders argument 0 raw: string constants verbatim, paths by name
//! - `{*}` renders every argument, comma separated
//! - `{*_}` renders every argument, space separated
//!
//! The table is pluggable through [`OperatorTable`]. [`JpqlTemplates`] is the
//! default table and accepts per-operator overrides from settings.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::{CompilerSettings, SettingsError};
use crate::expr::{DatePart, Operator, Value};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(\d+)(s?)\}|\{\*(_?)\}").expect("placeholder pattern is valid")
});

// =============================================================================
// Precedence
// =============================================================================

/// Operator precedence. Lower binds tighter; `FUNCTION` never needs parens.
pub mod precedence {
    pub const FUNCTION: i32 = -1;
    pub const NEGATE: i32 = 10;
    pub const MULTIPLICATIVE: i32 = 20;
    pub const ADDITIVE: i32 = 30;
    pub const COMPARISON: i32 = 40;
    pub const PREDICATE: i32 = 50;
    pub const NOT: i32 = 60;
    pub const AND: i32 = 70;
    pub const OR: i32 = 80;
}

// =============================================================================
// Templates
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateElement {
    Text(String),
    Arg(usize),
    RawArg(usize),
    /// All arguments joined by the separator.
    AllArgs(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pattern: String,
    elements: Vec<TemplateElement>,
    precedence: i32,
}

impl Template {
    pub fn new(pattern: &str) -> Self {
        let mut elements = Vec::new();
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(pattern) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                elements.push(TemplateElement::Text(pattern[last..whole.start()].to_string()));
            }
            let element = match (caps.get(1), caps.get(3)) {
                (Some(index), _) => {
                    // Digits only, guaranteed by the pattern.
                    let index = index.as_str().parse().unwrap_or(usize::MAX);
                    if caps.get(2).is_some_and(|m| !m.as_str().is_empty()) {
                        TemplateElement::RawArg(index)
                    } else {
                        TemplateElement::Arg(index)
                    }
                }
                (None, Some(sep)) if sep.as_str() == "_" => TemplateElement::AllArgs(" "),
                _ => TemplateElement::AllArgs(", "),
            };
            elements.push(element);
            last = whole.end();
        }
        if last < pattern.len() {
            elements.push(TemplateElement::Text(pattern[last..].to_string()));
        }
        Self {
            pattern: pattern.to_string(),
            elements,
            precedence: precedence::FUNCTION,
        }
    }

    #[must_use]
    pub fn with_precedence(mut self, precedence: i32) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn elements(&self) -> &[TemplateElement] {
        &self.elements
    }

    pub fn precedence(&self) -> i32 {
        self.precedence
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

// =============================================================================
// Operator table
// =============================================================================

/// Lookup from operator tag to rendering template.
pub trait OperatorTable: fmt::Debug + Send + Sync {
    fn template(&self, operator: Operator) -> Option<&Template>;

    /// Whether a constant placeholder must be wrapped in parentheses.
    fn wrap_constant(&self, value: &Value) -> bool {
        value.is_collection()
    }
}

/// The default JPQL.Next operator table.
///
/// Set combinators have no entry. The serializer labels a set operation as
/// a subquery and the compiler drives the builder's set calls directly.
#[derive(Debug, Clone)]
pub struct JpqlTemplates {
    templates: HashMap<Operator, Template>,
    wrap_collection_constants: bool,
}

impl Default for JpqlTemplates {
    fn default() -> Self {
        use precedence as p;
        use Operator::*;

        let mut table = Self {
            templates: HashMap::new(),
            wrap_collection_constants: true,
        };

        // Boolean
        table.add(And, "{0} AND {1}", p::AND);
        table.add(Or, "{0} OR {1}", p::OR);
        table.add(Not, "NOT {0}", p::NOT);

        // Comparison
        table.add(Eq, "{0} = {1}", p::COMPARISON);
        table.add(Ne, "{0} <> {1}", p::COMPARISON);
        table.add(Lt, "{0} < {1}", p::COMPARISON);
        table.add(Gt, "{0} > {1}", p::COMPARISON);
        table.add(Loe, "{0} <= {1}", p::COMPARISON);
        table.add(Goe, "{0} >= {1}", p::COMPARISON);
        table.add(Between, "{0} BETWEEN {1} AND {2}", p::PREDICATE);
        table.add(In, "{0} IN {1}", p::PREDICATE);
        table.add(NotIn, "{0} NOT IN {1}", p::PREDICATE);
        table.add(IsNull, "{0} IS NULL", p::PREDICATE);
        table.add(IsNotNull, "{0} IS NOT NULL", p::PREDICATE);
        table.add(Like, "{0} LIKE {1}", p::PREDICATE);
        table.add(LikeEscape, "{0} LIKE {1} ESCAPE '{2s}'", p::PREDICATE);
        table.add(Exists, "EXISTS {0}", p::PREDICATE);

        // Arithmetic
        table.add(Add, "{0} + {1}", p::ADDITIVE);
        table.add(Sub, "{0} - {1}", p::ADDITIVE);
        table.add(Mul, "{0} * {1}", p::MULTIPLICATIVE);
        table.add(Div, "{0} / {1}", p::MULTIPLICATIVE);
        table.add(Mod, "MOD({0}, {1})", p::FUNCTION);
        table.add(Negate, "-{0}", p::NEGATE);

        // String
        table.add(Concat, "CONCAT({0}, {1})", p::FUNCTION);
        table.add(Lower, "LOWER({0})", p::FUNCTION);
        table.add(Upper, "UPPER({0})", p::FUNCTION);
        table.add(Trim, "TRIM({0})", p::FUNCTION);
        table.add(Length, "LENGTH({0})", p::FUNCTION);
        table.add(Substring, "SUBSTRING({*})", p::FUNCTION);

        // Aggregates and scalar functions
        table.add(Count, "COUNT({0})", p::FUNCTION);
        table.add(CountDistinct, "COUNT(DISTINCT {0})", p::FUNCTION);
        table.add(Sum, "SUM({0})", p::FUNCTION);
        table.add(Avg, "AVG({0})", p::FUNCTION);
        table.add(Min, "MIN({0})", p::FUNCTION);
        table.add(Max, "MAX({0})", p::FUNCTION);
        table.add(Coalesce, "COALESCE({*})", p::FUNCTION);
        table.add(NullIf, "NULLIF({0}, {1})", p::FUNCTION);
        table.add(Greatest, "GREATEST({*})", p::FUNCTION);
        table.add(Least, "LEAST({*})", p::FUNCTION);
        table.add(GroupConcat, "GROUP_CONCAT({0}, {1})", p::FUNCTION);
        table.add(BooleanAny, "OR_AGG({0})", p::FUNCTION);
        table.add(BooleanAll, "EVERY({0})", p::FUNCTION);

        // Dates
        for part in DatePart::ALL {
            let unit = part.name();
            table.add(DateAdd(part), &format!("ADD_{}({{0}}, {{1}})", unit), p::FUNCTION);
            table.add(DateDiff(part), &format!("{}_DIFF({{0}}, {{1}})", unit), p::FUNCTION);
            table.add(DateTrunc(part), &format!("TRUNC_{}({{0}})", unit), p::FUNCTION);
        }

        // Type family
        table.add(Cast, "CAST({0} AS {1s})", p::FUNCTION);
        table.add(Treat, "TREAT({0} AS {1s})", p::FUNCTION);
        table.add(Type, "TYPE({0})", p::FUNCTION);
        table.add(Literal, "{0s}", p::FUNCTION);

        // Projection markers
        table.add(Alias, "{0} AS {1s}", p::FUNCTION);
        table.add(Bind, "{0}", p::FUNCTION);
        table.add(List, "{*}", p::FUNCTION);

        // Analytic
        table.add(RowNumber, "ROW_NUMBER()", p::FUNCTION);
        table.add(Rank, "RANK()", p::FUNCTION);
        table.add(DenseRank, "DENSE_RANK()", p::FUNCTION);
        table.add(PercentRank, "PERCENT_RANK()", p::FUNCTION);
        table.add(CumeDist, "CUME_DIST()", p::FUNCTION);
        table.add(Ntile, "NTILE({0})", p::FUNCTION);
        table.add(Lag, "LAG({*})", p::FUNCTION);
        table.add(Lead, "LEAD({*})", p::FUNCTION);
        table.add(FirstValue, "FIRST_VALUE({0})", p::FUNCTION);
        table.add(LastValue, "LAST_VALUE({0})", p::FUNCTION);
        table.add(NthValue, "NTH_VALUE({0}, {1})", p::FUNCTION);
        table.add(Filter, "{0} FILTER (WHERE {1})", p::FUNCTION);
        table.add(Over, "{0} OVER ({1})", p::FUNCTION);

        // Window components
        table.add(WindowDefinition, "{*_}", p::FUNCTION);
        table.add(WindowBase, "{0s}", p::FUNCTION);
        table.add(WindowPartitionBy, "PARTITION BY {0}", p::FUNCTION);
        table.add(WindowOrderBy, "ORDER BY {0}", p::FUNCTION);
        table.add(WindowRows, "ROWS {0}", p::FUNCTION);
        table.add(WindowRange, "RANGE {0}", p::FUNCTION);
        table.add(WindowGroups, "GROUPS {0}", p::FUNCTION);
        table.add(WindowBetween, "BETWEEN {0} AND {1}", p::FUNCTION);
        table.add(WindowUnboundedPreceding, "UNBOUNDED PRECEDING", p::FUNCTION);
        table.add(WindowPreceding, "{0} PRECEDING", p::FUNCTION);
        table.add(WindowCurrentRow, "CURRENT ROW", p::FUNCTION);
        table.add(WindowFollowing, "{0} FOLLOWING", p::FUNCTION);
        table.add(WindowUnboundedFollowing, "UNBOUNDED FOLLOWING", p::FUNCTION);

        table
    }
}

impl JpqlTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default table with the overrides and switches from `settings`.
    pub fn from_settings(settings: &CompilerSettings) -> Result<Self, SettingsError> {
        let mut table = Self::default();
        table.wrap_collection_constants = settings.rendering.wrap_collection_constants;
        for (name, template) in &settings.templates {
            let operator: Operator = name
                .parse()
                .map_err(|_| SettingsError::UnknownOperator(name.clone()))?;
            table.add(operator, &template.pattern, template.precedence);
        }
        Ok(table)
    }

    /// Replace or add the template for one operator.
    pub fn add(&mut self, operator: Operator, pattern: &str, precedence: i32) {
        self.templates
            .insert(operator, Template::new(pattern).with_precedence(precedence));
    }

    /// Drop an operator from the table.
    pub fn remove(&mut self, operator: Operator) {
        self.templates.remove(&operator);
    }

    #[must_use]
    pub fn with_collection_wrapping(mut self, wrap: bool) -> Self {
        self.wrap_collection_constants = wrap;
        self
    }
}

impl OperatorTable for JpqlTemplates {
    fn template(&self, operator: Operator) -> Option<&Template> {
        self.templates.get(&operator)
    }

    fn wrap_constant(&self, value: &Value) -> bool {
        self.wrap_collection_constants && value.is_collection()
    }
}
