//! Render-time evaluation of expressions and nodes.

use std::cmp::Ordering;

use crate::engine::{Template, Templates};
use crate::error::{RenderError, TemplateError};
use crate::expr::{self, BinaryOp, Expr, UnaryOp};
use crate::node::{Block, ForLoop, Node};
use crate::scope::Scope;
use crate::value::{Map, Value};

/// Nested template renders allowed before giving up.
const MAX_NESTING: usize = 64;

/// Upper bound on `a..b` range sizes.
const MAX_RANGE: i64 = 100_000;

/// State of one render: the engine, the variable scope and nesting depth.
///
/// Filters, functions and custom tags receive the context so they can read
/// variables and evaluate nested expressions or templates.
pub struct Context<'a> {
    templates: &'a Templates,
    scope: Scope,
    nesting: usize,
}

impl<'a> Context<'a> {
    pub(crate) fn new(templates: &'a Templates, vars: Map) -> Self {
        Self {
            templates,
            scope: Scope::new(vars),
            nesting: 0,
        }
    }

    /// Engine this render belongs to.
    #[must_use]
    pub fn templates(&self) -> &'a Templates {
        self.templates
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    /// Variable lookup, null when unbound.
    #[must_use]
    pub fn var(&self, name: &str) -> Value {
        self.scope.get(name).cloned().unwrap_or_default()
    }

    /// Run `f` with a child frame seeded with `vars`.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub fn with_frame<T>(
        &mut self,
        vars: Map,
        f: impl FnOnce(&mut Self) -> Result<T, RenderError>,
    ) -> Result<T, RenderError> {
        self.scope.push(vars);
        let result = f(self);
        self.scope.pop();
        result
    }

    /// Parse and evaluate an expression in the current scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is malformed or fails to evaluate.
    pub fn eval_str(&mut self, source: &str) -> Result<Value, RenderError> {
        let expr = expr::parse(source).map_err(|message| TemplateError::Parse {
            template: "<expression>".to_owned(),
            line: 1,
            message,
        })?;
        self.eval(&expr)
    }

    /// Render template source (with optional front matter) in the current
    /// scope. Assignments made by the source do not leak out.
    ///
    /// # Errors
    ///
    /// Returns parse and render errors from the source.
    pub fn render_str(&mut self, name: &str, source: &str) -> Result<String, RenderError> {
        let template = Template::parse(
            name,
            &crate::TemplateSource::new(source, None),
            self.templates.registry(),
        )?;
        self.render_template(&template, Map::new())
    }

    /// Render a custom tag's body.
    ///
    /// # Errors
    ///
    /// Propagates errors from the body.
    pub fn render_block(&mut self, block: &Block, out: &mut String) -> Result<(), RenderError> {
        self.render_nodes(&block.nodes, out)
    }

    /// Render `template` in a new frame seeded with `vars`, then apply its
    /// content type and layout.
    pub(crate) fn render_template(
        &mut self,
        template: &Template,
        vars: Map,
    ) -> Result<String, RenderError> {
        if self.nesting >= MAX_NESTING {
            return Err(RenderError::eval(format!(
                "template nesting deeper than {MAX_NESTING} at {}",
                template.name()
            )));
        }
        self.nesting += 1;
        let result = self.with_frame(vars, |ctx| {
            for (key, value) in template.front_matter() {
                ctx.scope.set(key.clone(), value.clone());
            }
            let mut out = String::new();
            ctx.render_nodes(template.nodes(), &mut out)?;
            let out = template.post_process(out);

            match template.layout() {
                Some(layout) => {
                    let layout = ctx.templates.layout(layout)?;
                    let vars = Map::from([("content".to_owned(), Value::from(out))]);
                    ctx.render_template(&layout, vars)
                }
                None => Ok(out),
            }
        });
        self.nesting -= 1;
        result
    }

    pub(crate) fn render_nodes(
        &mut self,
        nodes: &[Node],
        out: &mut String,
    ) -> Result<(), RenderError> {
        for node in nodes {
            self.render_node(node, out)?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &Node, out: &mut String) -> Result<(), RenderError> {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output { expr, line } => {
                let value = self.eval(expr).map_err(|e| at_line(e, *line))?;
                out.push_str(&value.to_string());
            }
            Node::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    if self.eval(condition)?.is_truthy() {
                        return self.render_nodes(body, out);
                    }
                }
                self.render_nodes(otherwise, out)?;
            }
            Node::For(header) => self.render_for(header, out)?,
            Node::Assign { name, value } => {
                let value = self.eval(value)?;
                self.scope.set(name.clone(), value);
            }
            Node::Capture { name, body } => {
                let mut captured = String::new();
                self.render_nodes(body, &mut captured)?;
                self.scope.set(name.clone(), Value::from(captured));
            }
            Node::Include { name, params, line } => {
                let name = self.eval(name)?.to_string();
                let mut vars = Map::new();
                for (key, expr) in params {
                    vars.insert(key.clone(), self.eval(expr)?);
                }
                let include = Value::from(vars.clone());
                vars.insert("include".to_owned(), include);
                let template = self
                    .templates
                    .include(&name)
                    .map_err(|e| at_line(e.into(), *line))?;
                out.push_str(&self.render_template(&template, vars)?);
            }
            Node::Custom(node) => node.render(self, out)?,
        }
        Ok(())
    }

    fn render_for(&mut self, header: &ForLoop, out: &mut String) -> Result<(), RenderError> {
        let iterable = self.eval(&header.iterable)?;
        let mut items: Vec<(Value, Value)> = match (&iterable, &header.key) {
            (Value::Map(map), Some(_)) => map
                .iter()
                .map(|(k, v)| (Value::from(k.as_str()), v.clone()))
                .collect(),
            (Value::Map(map), None) => map
                .iter()
                .map(|(k, v)| {
                    let pair = vec![Value::from(k.as_str()), v.clone()];
                    (Value::from(k.as_str()), Value::from(pair))
                })
                .collect(),
            _ => iterable
                .to_list()
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v))
                .collect(),
        };

        if let Some(offset) = &header.offset {
            let offset = usize::try_from(self.eval(offset)?.to_int()).unwrap_or(0);
            items.drain(..offset.min(items.len()));
        }
        if let Some(limit) = &header.limit {
            let limit = usize::try_from(self.eval(limit)?.to_int()).unwrap_or(0);
            items.truncate(limit);
        }
        if header.reversed {
            items.reverse();
        }

        if items.is_empty() {
            return self.render_nodes(&header.empty, out);
        }

        let length = items.len();
        for (index, (key, item)) in items.into_iter().enumerate() {
            let meta = Value::from(Map::from([
                ("index".to_owned(), Value::from(index + 1)),
                ("index0".to_owned(), Value::from(index)),
                ("rindex".to_owned(), Value::from(length - index)),
                ("rindex0".to_owned(), Value::from(length - index - 1)),
                ("first".to_owned(), Value::from(index == 0)),
                ("last".to_owned(), Value::from(index + 1 == length)),
                ("length".to_owned(), Value::from(length)),
            ]));
            let mut vars = Map::from([
                (header.item.clone(), item),
                ("forloop".to_owned(), meta.clone()),
                ("loop".to_owned(), meta),
            ]);
            if let Some(key_name) = &header.key {
                vars.insert(key_name.clone(), key);
            }
            self.with_frame(vars, |ctx| ctx.render_nodes(&header.body, out))?;
        }
        Ok(())
    }

    /// Evaluate a parsed expression.
    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value, RenderError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(name) => Ok(self.var(name)),
            Expr::Attr(base, name) => Ok(self.eval(base)?.attr(name)),
            Expr::Index(base, key) => {
                let base = self.eval(base)?;
                let key = self.eval(key)?;
                Ok(base.get(&key))
            }
            Expr::Call(name, args) => {
                let args = self.eval_all(args)?;
                let templates = self.templates;
                let function = templates
                    .registry()
                    .function(name)
                    .ok_or_else(|| TemplateError::UnknownFunction(name.clone()))?;
                function.call(self, &args)
            }
            Expr::Filter {
                subject,
                name,
                args,
            } => {
                let subject = self.eval(subject)?;
                let args = self.eval_all(args)?;
                let templates = self.templates;
                let filter = templates
                    .registry()
                    .filter(name)
                    .ok_or_else(|| TemplateError::UnknownFilter(name.clone()))?;
                filter.apply(self, subject, &args)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Neg => match value {
                        Value::Int(i) => Value::Int(-i),
                        other => Value::Float(-other.to_float_opt().unwrap_or(0.0)),
                    },
                    UnaryOp::Pos => match value {
                        Value::Int(_) | Value::Float(_) => value,
                        other => other
                            .to_int_opt()
                            .map_or(Value::Float(other.to_float_opt().unwrap_or(0.0)), Value::Int),
                    },
                })
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                let left = self.eval(left)?.is_truthy();
                Ok(Value::Bool(left || self.eval(right)?.is_truthy()))
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                let left = self.eval(left)?.is_truthy();
                Ok(Value::Bool(left && self.eval(right)?.is_truthy()))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Ternary(condition, then, otherwise) => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Range(start, end) => {
                let start = self.eval(start)?.to_int();
                let end = self.eval(end)?.to_int();
                if end.saturating_sub(start) > MAX_RANGE {
                    return Err(RenderError::eval(format!("range {start}..{end} is too large")));
                }
                Ok((start..=end).map(Value::Int).collect())
            }
            Expr::Array(items) => Ok(Value::from(self.eval_all(items)?)),
            Expr::Map(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value)?);
                }
                Ok(Value::from(map))
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, RenderError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }
}

/// Attach a line number to bare evaluation errors.
fn at_line(error: RenderError, line: usize) -> RenderError {
    match error {
        RenderError::Template(TemplateError::Eval(message)) => {
            RenderError::eval(format!("line {line}: {message}"))
        }
        other => other,
    }
}

/// Strings that do not read as numbers make `+` concatenate.
fn is_text(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.trim().parse::<f64>().is_err())
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RenderError> {
    let compare = |wanted: &[Ordering]| {
        Value::Bool(
            left.compare(right)
                .is_some_and(|ordering| wanted.contains(&ordering)),
        )
    };

    Ok(match op {
        BinaryOp::Eq => Value::Bool(left.loose_eq(right)),
        BinaryOp::Ne => Value::Bool(!left.loose_eq(right)),
        BinaryOp::Lt => compare(&[Ordering::Less]),
        BinaryOp::Le => compare(&[Ordering::Less, Ordering::Equal]),
        BinaryOp::Gt => compare(&[Ordering::Greater]),
        BinaryOp::Ge => compare(&[Ordering::Greater, Ordering::Equal]),
        BinaryOp::In => Value::Bool(right.contains(left)),
        BinaryOp::NotIn => Value::Bool(!right.contains(left)),
        BinaryOp::Contains => Value::Bool(left.contains(right)),
        BinaryOp::Concat => Value::from(format!("{left}{right}")),
        BinaryOp::Add => match (left, right) {
            (Value::List(a), Value::List(b)) => a.iter().chain(b.iter()).cloned().collect(),
            _ if is_text(left) || is_text(right) => Value::from(format!("{left}{right}")),
            _ => arithmetic(op, left, right)?,
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, left, right)?
        }
        BinaryOp::Or => Value::Bool(left.is_truthy() || right.is_truthy()),
        BinaryOp::And => Value::Bool(left.is_truthy() && right.is_truthy()),
    })
}

pub(crate) fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RenderError> {
    if let (Some(a), Some(b), false, false) = (
        left.to_int_opt(),
        right.to_int_opt(),
        matches!(left, Value::Float(_)),
        matches!(right, Value::Float(_)),
    ) {
        let exact = !matches!(left, Value::String(s) if s.contains('.'))
            && !matches!(right, Value::String(s) if s.contains('.'));
        if exact {
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div if b == 0 => return Err(RenderError::eval("division by zero")),
                BinaryOp::Div => a.checked_div(b),
                BinaryOp::Rem if b == 0 => return Err(RenderError::eval("division by zero")),
                BinaryOp::Rem => a.checked_rem(b),
                _ => None,
            };
            return result
                .map(Value::Int)
                .ok_or_else(|| RenderError::eval("integer overflow"));
        }
    }

    let a = left.to_float_opt().unwrap_or(0.0);
    let b = right.to_float_opt().unwrap_or(0.0);
    Ok(Value::Float(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => 0.0,
    }))
}
