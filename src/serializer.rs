//! Textual serializer.
//!
//! Renders one expression subtree into the intermediate text the builder
//! protocol accepts. Constants and subqueries are never inlined: each one
//! gets a label from the [`RenderSession`] and a placeholder in the text.
//!
//! ```text
//! b.age > 18 AND b.name IN ('a', 'b')
//!     -> b.age > :param_0 AND b.name IN (:param_1)
//! b.id IN <subquery>
//!     -> b.id IN generatedSubquery_1
//! ```

use crate::error::{CompileError, CompileResult};
use crate::expr::{Expr, ExprKind, Operation, Operator};
use crate::session::RenderSession;
use crate::templates::{precedence, OperatorTable, Template, TemplateElement};

pub struct Serializer<'a> {
    templates: &'a dyn OperatorTable,
    session: &'a mut RenderSession,
}

impl<'a> Serializer<'a> {
    pub fn new(templates: &'a dyn OperatorTable, session: &'a mut RenderSession) -> Self {
        Self { templates, session }
    }

    pub fn serialize(&mut self, expr: &Expr) -> CompileResult<String> {
        let mut out = String::new();
        self.write_expr(expr, &mut out)?;
        Ok(out)
    }

    fn write_expr(&mut self, expr: &Expr, out: &mut String) -> CompileResult<()> {
        match expr.kind() {
            ExprKind::Constant(value) => {
                let label = self.session.constant_label(expr);
                if self.templates.wrap_constant(value) {
                    out.push_str("(:");
                    out.push_str(&label);
                    out.push(')');
                } else {
                    out.push(':');
                    out.push_str(&label);
                }
            }
            ExprKind::Param(name) => {
                out.push(':');
                out.push_str(name);
            }
            ExprKind::Path(path) => out.push_str(&path.to_string()),
            ExprKind::SubQuery(_) => out.push_str(&self.session.subquery_label(expr)),
            ExprKind::Tuple(items) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_expr(item, out)?;
                }
                out.push(')');
            }
            ExprKind::Operation(op) => self.write_operation(expr, op, out)?,
            ExprKind::Template(t) => {
                let mut fragment = String::new();
                self.write_template(&t.template, &t.args, &mut fragment)?;
                out.push_str(fragment.trim_end());
            }
        }
        Ok(())
    }

    fn write_operation(&mut self, expr: &Expr, op: &Operation, out: &mut String) -> CompileResult<()> {
        // A set operation is a subquery from the clause's point of view.
        if op.operator.as_set().is_some() {
            out.push_str(&self.session.subquery_label(expr));
            return Ok(());
        }
        if op.operator == Operator::Exists {
            if let [arg] = op.args.as_slice() {
                if matches!(arg.kind(), ExprKind::SubQuery(_)) {
                    let label = self.session.subquery_label(arg);
                    out.push_str("EXISTS (");
                    out.push_str(&label);
                    out.push(')');
                    return Ok(());
                }
            }
        }
        let template = self
            .templates
            .template(op.operator)
            .ok_or_else(|| CompileError::UnsupportedOperator(op.operator.name()))?;
        self.write_template(template, &op.args, out)
    }

    fn write_template(
        &mut self,
        template: &Template,
        args: &[Expr],
        out: &mut String,
    ) -> CompileResult<()> {
        let outer = template.precedence();
        for element in template.elements() {
            match element {
                TemplateElement::Text(text) => out.push_str(text),
                TemplateElement::Arg(index) => {
                    let arg = argument(template, args, *index)?;
                    let inner = self.precedence_of(arg);
                    let wrap = outer >= 0
                        && inner >= 0
                        && (inner > outer || (inner == outer && *index > 0));
                    if wrap {
                        out.push('(');
                        self.write_expr(arg, out)?;
                        out.push(')');
                    } else {
                        self.write_expr(arg, out)?;
                    }
                }
                TemplateElement::RawArg(index) => {
                    let arg = argument(template, args, *index)?;
                    self.write_raw(arg, out)?;
                }
                TemplateElement::AllArgs(separator) => {
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            out.push_str(separator);
                        }
                        self.write_expr(arg, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Raw arguments: string constants verbatim, paths by name.
    fn write_raw(&mut self, arg: &Expr, out: &mut String) -> CompileResult<()> {
        match arg.kind() {
            ExprKind::Constant(value) => match value.as_str() {
                Some(text) => out.push_str(text),
                None => out.push_str(&value.to_string()),
            },
            ExprKind::Path(path) => out.push_str(path.name()),
            _ => self.write_expr(arg, out)?,
        }
        Ok(())
    }

    fn precedence_of(&self, expr: &Expr) -> i32 {
        match expr.kind() {
            ExprKind::Operation(op) if op.operator.as_set().is_none() => self
                .templates
                .template(op.operator)
                .map(Template::precedence)
                .unwrap_or(precedence::FUNCTION),
            _ => precedence::FUNCTION,
        }
    }
}

fn argument<'e>(template: &Template, args: &'e [Expr], index: usize) -> CompileResult<&'e Expr> {
    args.get(index)
        .ok_or_else(|| CompileError::MissingTemplateArgument {
            template: template.pattern().to_string(),
            index,
            available: args.len(),
        })
}
