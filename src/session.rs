//! Per-render session state.
//!
//! One [`RenderSession`] lives for exactly one `render` call. It owns the
//! label tables the serializer fills, the CTE column stack, the
//! subquery-initiator stack and the set of CTE declarations already
//! rendered. Nothing here outlives the call.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::builder::CriteriaBuilder;
use crate::config::LabelSettings;
use crate::error::BuildResult;
use crate::expr::{Expr, Path, Value};

#[derive(Debug)]
pub struct RenderSession {
    labels: LabelSettings,
    /// Keyed by node identity, in first-seen order.
    constants: IndexMap<usize, (String, Expr)>,
    /// Drained after every clause expression.
    subqueries: IndexMap<usize, (String, Expr)>,
    cte_columns: Vec<Vec<Path>>,
    subquery_initiators: Vec<String>,
    rendered_ctes: HashSet<usize>,
    parameters: IndexMap<String, Value>,
}

impl RenderSession {
    pub fn new(labels: LabelSettings) -> Self {
        Self {
            labels,
            constants: IndexMap::new(),
            subqueries: IndexMap::new(),
            cte_columns: Vec::new(),
            subquery_initiators: Vec::new(),
            rendered_ctes: HashSet::new(),
            parameters: IndexMap::new(),
        }
    }

    /// Label for a constant node. The same node keeps its first label.
    pub fn constant_label(&mut self, expr: &Expr) -> String {
        if let Some((label, _)) = self.constants.get(&expr.identity()) {
            return label.clone();
        }
        let label = format!("{}{}", self.labels.constant_prefix, self.constants.len());
        self.constants
            .insert(expr.identity(), (label.clone(), expr.clone()));
        label
    }

    /// Label for a subquery node within the current clause.
    pub fn subquery_label(&mut self, expr: &Expr) -> String {
        if let Some((label, _)) = self.subqueries.get(&expr.identity()) {
            return label.clone();
        }
        let label = format!("{}{}", self.labels.subquery_prefix, self.subqueries.len() + 1);
        self.subqueries
            .insert(expr.identity(), (label.clone(), expr.clone()));
        label
    }

    /// Subqueries labelled since the last call, in first-seen order.
    pub fn take_subquery_labels(&mut self) -> Vec<(String, Expr)> {
        self.subqueries.drain(..).map(|(_, entry)| entry).collect()
    }

    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }

    pub fn push_cte_columns(&mut self, columns: Vec<Path>) {
        self.cte_columns.push(columns);
    }

    pub fn pop_cte_columns(&mut self) {
        self.cte_columns.pop();
    }

    /// Declared columns of the CTE body being compiled; empty outside one.
    pub fn cte_columns(&self) -> &[Path] {
        self.cte_columns.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn push_subquery_initiator(&mut self, label: &str) {
        self.subquery_initiators.push(label.to_string());
    }

    pub fn pop_subquery_initiator(&mut self) {
        self.subquery_initiators.pop();
    }

    pub fn subquery_depth(&self) -> usize {
        self.subquery_initiators.len()
    }

    /// The label whose subquery is being compiled right now.
    pub fn current_subquery(&self) -> Option<&str> {
        self.subquery_initiators.last().map(String::as_str)
    }

    /// Records a CTE declaration by identity; false if it was already seen.
    pub fn mark_cte_rendered(&mut self, identity: usize) -> bool {
        self.rendered_ctes.insert(identity)
    }

    /// Collects a level's parameter values. The first value per name wins.
    pub fn collect_parameters(&mut self, params: &IndexMap<String, Value>) {
        for (name, value) in params {
            self.parameters
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }

    pub fn into_bindings(self) -> Bindings {
        let constants = self
            .constants
            .into_values()
            .filter_map(|(label, expr)| {
                expr.as_constant().map(|value| ConstantBinding {
                    label,
                    value: value.clone(),
                })
            })
            .collect();
        Bindings {
            constants,
            parameters: self.parameters,
        }
    }
}

/// One constant placeholder and the value it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantBinding {
    pub label: String,
    pub value: Value,
}

/// Values the caller must bind before executing the built query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    pub constants: Vec<ConstantBinding>,
    pub parameters: IndexMap<String, Value>,
}

impl Bindings {
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty() && self.parameters.is_empty()
    }

    /// Value bound to a constant label or parameter name.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.constants
            .iter()
            .find(|binding| binding.label == name)
            .map(|binding| &binding.value)
            .or_else(|| self.parameters.get(name))
    }

    /// Replays every binding as a `set_parameter` call.
    pub fn apply(&self, builder: &mut dyn CriteriaBuilder) -> BuildResult<()> {
        for binding in &self.constants {
            builder.set_parameter(&binding.label, &binding.value)?;
        }
        for (name, value) in &self.parameters {
            builder.set_parameter(name, value)?;
        }
        Ok(())
    }
}
