//! AST-based rewriter built on the ruff parser

use ruff_python_ast::{
    Comprehension, Expr, ExprContext, ExprName, ModExpression,
    visitor::{Visitor, walk_expr},
};
use ruff_python_parser::{Parsed, parse_expression};
use ruff_text_size::TextRange;
use rustc_hash::FxHashSet;

use super::Replacements;
use crate::error::{ArchiveError, Result};

fn parse(text: &str) -> Result<Parsed<ModExpression>> {
    parse_expression(text).map_err(|err| ArchiveError::TemplateParse {
        template: text.to_owned(),
        message: err.to_string(),
    })
}

/// Collects free `Name` loads, skipping names bound by lambdas and
/// comprehensions
#[derive(Default)]
struct ReferenceCollector<'a> {
    bound: Vec<FxHashSet<&'a str>>,
    references: Vec<(&'a str, TextRange)>,
}

impl<'a> ReferenceCollector<'a> {
    fn collect(expr: &'a Expr) -> Vec<(&'a str, TextRange)> {
        let mut collector = Self::default();
        collector.visit_expr(expr);
        collector.references
    }

    fn is_bound(&self, name: &str) -> bool {
        self.bound.iter().any(|scope| scope.contains(name))
    }

    /// Visit a comprehension: the first iterable is evaluated in the enclosing
    /// scope, everything else sees the loop targets
    fn visit_comprehension_scope(
        &mut self,
        generators: &'a [Comprehension],
        elements: &[&'a Expr],
    ) {
        self.bound.push(FxHashSet::default());
        for generator in generators {
            self.visit_expr(&generator.iter);
            if let Some(scope) = self.bound.last_mut() {
                bind_targets(&generator.target, scope);
            }
            for condition in &generator.ifs {
                self.visit_expr(condition);
            }
        }
        for element in elements {
            self.visit_expr(element);
        }
        self.bound.pop();
    }
}

/// Add every name stored by an assignment target to `scope`
fn bind_targets<'a>(target: &'a Expr, scope: &mut FxHashSet<&'a str>) {
    match target {
        Expr::Name(name) => {
            scope.insert(name.id.as_str());
        }
        Expr::Tuple(tuple) => {
            for element in &tuple.elts {
                bind_targets(element, scope);
            }
        }
        Expr::List(list) => {
            for element in &list.elts {
                bind_targets(element, scope);
            }
        }
        Expr::Starred(starred) => bind_targets(&starred.value, scope),
        _ => {}
    }
}

impl<'a> Visitor<'a> for ReferenceCollector<'a> {
    fn visit_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Name(ExprName {
                id,
                ctx: ExprContext::Load,
                range,
                ..
            }) => {
                if !self.is_bound(id.as_str()) {
                    self.references.push((id.as_str(), *range));
                }
            }
            Expr::Lambda(lambda) => {
                let mut scope = FxHashSet::default();
                if let Some(parameters) = &lambda.parameters {
                    // Defaults are evaluated where the lambda is defined
                    for param in parameters
                        .posonlyargs
                        .iter()
                        .chain(&parameters.args)
                        .chain(&parameters.kwonlyargs)
                    {
                        if let Some(default) = &param.default {
                            self.visit_expr(default);
                        }
                        scope.insert(param.parameter.name.as_str());
                    }
                    for param in parameters.vararg.iter().chain(&parameters.kwarg) {
                        scope.insert(param.name.as_str());
                    }
                }
                self.bound.push(scope);
                self.visit_expr(&lambda.body);
                self.bound.pop();
            }
            Expr::ListComp(comp) => {
                self.visit_comprehension_scope(&comp.generators, &[&comp.elt]);
            }
            Expr::SetComp(comp) => {
                self.visit_comprehension_scope(&comp.generators, &[&comp.elt]);
            }
            Expr::Generator(comp) => {
                self.visit_comprehension_scope(&comp.generators, &[&comp.elt]);
            }
            Expr::DictComp(comp) => {
                self.visit_comprehension_scope(&comp.generators, &[&comp.key, &comp.value]);
            }
            _ => walk_expr(self, expr),
        }
    }
}

/// All free value references in `text`, in source order, with repetitions
pub fn value_references(text: &str) -> Result<Vec<String>> {
    let parsed = parse(text)?;
    Ok(ReferenceCollector::collect(parsed.expr())
        .into_iter()
        .map(|(name, _)| name.to_owned())
        .collect())
}

pub fn count_references(text: &str, name: &str) -> Result<usize> {
    let parsed = parse(text)?;
    Ok(ReferenceCollector::collect(parsed.expr())
        .into_iter()
        .filter(|(reference, _)| *reference == name)
        .count())
}

/// Replace value references by exact source range
pub fn rewrite(text: &str, replacements: &Replacements) -> Result<String> {
    let parsed = parse(text)?;
    let mut references = ReferenceCollector::collect(parsed.expr());
    references.sort_by_key(|(_, range)| range.start());

    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    for (name, range) in references {
        let Some(new) = replacements.get(name) else {
            continue;
        };
        let start = usize::from(range.start());
        output.push_str(&text[last..start]);
        output.push_str(new);
        last = usize::from(range.end());
    }
    output.push_str(&text[last..]);
    Ok(output)
}
