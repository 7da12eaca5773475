//! Template tree built from lexer chunks.

use std::sync::Arc;
use std::vec::IntoIter;

use crate::error::TemplateError;
use crate::expr::{self, Expr, Parser, UnaryOp};
use crate::lexer::{self, Chunk};
use crate::registry::{Registry, TagNode};

/// Parsed body of a block tag, handed to [`crate::Tag::compile`].
#[derive(Debug, Default)]
pub struct Block {
    pub(crate) nodes: Vec<Node>,
}

#[derive(Debug)]
pub(crate) enum Node {
    Text(String),
    Output {
        expr: Expr,
        line: usize,
    },
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    For(Box<ForLoop>),
    Assign {
        name: String,
        value: Expr,
    },
    Capture {
        name: String,
        body: Vec<Node>,
    },
    Include {
        name: Expr,
        params: Vec<(String, Expr)>,
        line: usize,
    },
    Custom(Arc<dyn TagNode>),
}

#[derive(Debug)]
pub(crate) struct ForLoop {
    pub key: Option<String>,
    pub item: String,
    pub iterable: Expr,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    pub reversed: bool,
    pub body: Vec<Node>,
    pub empty: Vec<Node>,
}

/// Tag that closed a nested block.
struct Terminator {
    name: String,
    args: String,
    line: usize,
}

/// Parse template source into nodes.
pub(crate) fn parse(
    source: &str,
    template: &str,
    registry: &Registry,
) -> Result<Vec<Node>, TemplateError> {
    let mut builder = TreeBuilder {
        chunks: lexer::tokenize(source, template)?.into_iter(),
        template,
        registry,
    };
    let (nodes, _) = builder.parse_nodes(&[], 0)?;
    Ok(nodes)
}

struct TreeBuilder<'a> {
    chunks: IntoIter<Chunk>,
    template: &'a str,
    registry: &'a Registry,
}

impl TreeBuilder<'_> {
    fn error(&self, line: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::Parse {
            template: self.template.to_owned(),
            line,
            message: message.into(),
        }
    }

    fn expression(&self, source: &str, line: usize) -> Result<Expr, TemplateError> {
        expr::parse(source).map_err(|message| self.error(line, message))
    }

    /// Parse nodes until one of `terminators` or the end of input.
    ///
    /// `opened_at` is the line of the block tag being parsed, for errors.
    fn parse_nodes(
        &mut self,
        terminators: &[&str],
        opened_at: usize,
    ) -> Result<(Vec<Node>, Option<Terminator>), TemplateError> {
        let mut nodes = Vec::new();

        while let Some(chunk) = self.chunks.next() {
            match chunk {
                Chunk::Text(text) => nodes.push(Node::Text(text)),
                Chunk::Output { source, line } => nodes.push(Node::Output {
                    expr: self.expression(&source, line)?,
                    line,
                }),
                Chunk::Tag { name, args, line } => {
                    if terminators.contains(&name.as_str()) {
                        return Ok((nodes, Some(Terminator { name, args, line })));
                    }
                    nodes.push(self.parse_tag(&name, &args, line)?);
                }
            }
        }

        match terminators.last() {
            Some(end) => Err(self.error(opened_at, format!("missing `{{% {end} %}}`"))),
            None => Ok((nodes, None)),
        }
    }

    fn parse_tag(&mut self, name: &str, args: &str, line: usize) -> Result<Node, TemplateError> {
        match name {
            "if" => self.parse_if(args, line, false),
            "unless" => self.parse_if(args, line, true),
            "for" => self.parse_for(args, line),
            "set" | "assign" => self.parse_assign(args, line),
            "capture" => {
                let name = args.trim();
                if name.is_empty() {
                    return Err(self.error(line, "`capture` needs a variable name"));
                }
                let (body, _) = self.parse_nodes(&["endcapture"], line)?;
                Ok(Node::Capture {
                    name: name.to_owned(),
                    body,
                })
            }
            "include" => self.parse_include(args, line),
            _ => self.parse_custom(name, args, line),
        }
    }

    fn parse_if(&mut self, args: &str, line: usize, negate: bool) -> Result<Node, TemplateError> {
        let end = if negate { "endunless" } else { "endif" };
        let mut condition = self.expression(args, line)?;
        if negate {
            condition = Expr::Unary(UnaryOp::Not, Box::new(condition));
        }

        let mut branches = Vec::new();
        loop {
            let (body, terminator) = self.parse_nodes(&["elsif", "elseif", "else", end], line)?;
            branches.push((condition, body));
            match terminator {
                Some(t) if t.name == "elsif" || t.name == "elseif" => {
                    condition = self.expression(&t.args, t.line)?;
                }
                Some(t) if t.name == "else" => {
                    let (otherwise, _) = self.parse_nodes(&[end], line)?;
                    return Ok(Node::If {
                        branches,
                        otherwise,
                    });
                }
                _ => {
                    return Ok(Node::If {
                        branches,
                        otherwise: Vec::new(),
                    });
                }
            }
        }
    }

    fn parse_for(&mut self, args: &str, line: usize) -> Result<Node, TemplateError> {
        let header = parse_for_header(args).map_err(|message| self.error(line, message))?;
        let (body, terminator) = self.parse_nodes(&["else", "endfor"], line)?;
        let empty = match terminator {
            Some(t) if t.name == "else" => self.parse_nodes(&["endfor"], line)?.0,
            _ => Vec::new(),
        };
        Ok(Node::For(Box::new(ForLoop {
            body,
            empty,
            ..header
        })))
    }

    fn parse_assign(&self, args: &str, line: usize) -> Result<Node, TemplateError> {
        let parse = || -> Result<Node, String> {
            let mut parser = Parser::new(args)?;
            let name = parser.expect_ident()?;
            parser.expect_sym("=")?;
            let value = parser.parse_expr()?;
            parser.expect_end()?;
            Ok(Node::Assign { name, value })
        };
        parse().map_err(|message| self.error(line, message))
    }

    /// `{% include file.html a=1 %}` or `{% include expr a=1 %}`.
    ///
    /// A first word naming an `.html`, `.md` or `.markdown` file is taken
    /// literally; anything else is an expression.
    fn parse_include(&self, args: &str, line: usize) -> Result<Node, TemplateError> {
        let literal = [".html", ".md", ".markdown"]
            .iter()
            .any(|ext| args.contains(ext));

        let parse = || -> Result<Node, String> {
            let (name, rest) = if literal {
                let (file, rest) = args
                    .split_once(char::is_whitespace)
                    .unwrap_or((args, ""));
                let file = file.trim_matches(|c| c == '"' || c == '\'');
                (Expr::Literal(file.into()), Parser::new(rest)?)
            } else {
                let mut parser = Parser::new(args)?;
                (parser.parse_expr()?, parser)
            };
            let mut parser = rest;
            let mut params = Vec::new();
            while !parser.at_end() {
                let key = parser.expect_ident()?;
                parser.expect_sym("=")?;
                params.push((key, parser.parse_expr()?));
                parser.eat_sym(",");
            }
            Ok(Node::Include { name, params, line })
        };
        parse().map_err(|message| self.error(line, message))
    }

    fn parse_custom(&mut self, name: &str, args: &str, line: usize) -> Result<Node, TemplateError> {
        let registry = self.registry;
        let Some(tag) = registry.tag(name) else {
            return Err(self.error(line, format!("unknown tag `{name}`")));
        };
        let block = match tag.end_tag() {
            Some(end) => Block {
                nodes: self.parse_nodes(&[end], line)?.0,
            },
            None => Block::default(),
        };
        let node = tag
            .compile(args, block)
            .map_err(|message| self.error(line, message))?;
        Ok(Node::Custom(node))
    }
}

/// `[key,] item in iterable [limit: n] [offset: n] [reversed]`.
fn parse_for_header(args: &str) -> Result<ForLoop, String> {
    let mut parser = Parser::new(args)?;
    let mut item = parser.expect_ident()?;
    let mut key = None;
    if parser.eat_sym(",") {
        key = Some(std::mem::replace(&mut item, parser.expect_ident()?));
    }
    if !parser.eat_keyword("in") {
        return Err("expected `in`".to_owned());
    }
    let iterable = parser.parse_or()?;

    let mut header = ForLoop {
        key,
        item,
        iterable,
        limit: None,
        offset: None,
        reversed: false,
        body: Vec::new(),
        empty: Vec::new(),
    };
    while !parser.at_end() {
        if parser.eat_keyword("reversed") {
            header.reversed = true;
        } else if parser.eat_keyword("limit") {
            parser.expect_sym(":")?;
            header.limit = Some(parser.parse_or()?);
        } else if parser.eat_keyword("offset") {
            parser.expect_sym(":")?;
            header.offset = Some(parser.parse_or()?);
        } else {
            parser.expect_end()?;
        }
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse_ok(source: &str) -> Vec<Node> {
        parse(source, "test", &Registry::new()).unwrap()
    }

    fn parse_err(source: &str) -> String {
        parse(source, "test", &Registry::new())
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_if_elsif_else_structure() {
        let nodes = parse_ok("{% if a %}1{% elsif b %}2{% else %}3{% endif %}");

        let [Node::If {
            branches,
            otherwise,
        }] = nodes.as_slice()
        else {
            panic!("expected a single if node, got {nodes:?}");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(otherwise.len(), 1);
    }

    #[test]
    fn test_for_header_options() {
        let nodes = parse_ok("{% for k, v in items limit: 2 offset: 1 reversed %}x{% else %}none{% endfor %}");

        let [Node::For(header)] = nodes.as_slice() else {
            panic!("expected a single for node, got {nodes:?}");
        };
        assert_eq!(header.key.as_deref(), Some("k"));
        assert_eq!(header.item, "v");
        assert!(header.limit.is_some());
        assert!(header.offset.is_some());
        assert!(header.reversed);
        assert_eq!(header.empty.len(), 1);
    }

    #[test]
    fn test_include_literal_file_and_params() {
        let nodes = parse_ok("{% include card.html title=page.title size=2 %}");

        let [Node::Include { name, params, .. }] = nodes.as_slice() else {
            panic!("expected a single include node, got {nodes:?}");
        };
        assert!(matches!(name, Expr::Literal(v) if v.to_string() == "card.html"));
        let keys: Vec<&str> = params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["title", "size"]);
    }

    #[test]
    fn test_include_expression_name() {
        let nodes = parse_ok("{% include page.widget %}");
        assert!(matches!(
            nodes.as_slice(),
            [Node::Include {
                name: Expr::Attr(..),
                ..
            }]
        ));
    }

    #[test]
    fn test_missing_end_tag_reports_opening_line() {
        assert_eq!(
            parse_err("\n{% for x in xs %}body"),
            "test:2: missing `{% endfor %}`"
        );
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(parse_err("{% frobnicate %}"), "test:1: unknown tag `frobnicate`");
    }

    #[test]
    fn test_bad_assignment() {
        assert_eq!(
            parse_err("{% assign = 1 %}"),
            "test:1: expected a name, found `=`"
        );
    }
}
