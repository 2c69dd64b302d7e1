//! A tiny evaluator for emitted definitions.
//!
//! Containers are allocated in an arena so identity survives evaluation:
//! a name bound once and referenced twice yields the same arena slot.
//! [`Evaluator::canonical`] prints reachable structure with back-references
//! for shared containers, which makes two evaluations comparable.

#![allow(dead_code)]

use std::fmt::Write;

use persist::Definition;
use ruff_python_ast::{Expr, Number, UnaryOp};
use ruff_python_parser::parse_expression;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
enum Obj {
    Atom(String),
    List(Vec<usize>),
    Tuple(Vec<usize>),
    Dict(Vec<(usize, usize)>),
}

#[derive(Debug, Default)]
pub struct Evaluator {
    arena: Vec<Obj>,
    scope: FxHashMap<String, usize>,
}

impl Evaluator {
    pub fn run(definitions: &[Definition]) -> Self {
        let mut evaluator = Self::default();
        for definition in definitions {
            let parsed = parse_expression(&definition.template)
                .unwrap_or_else(|err| panic!("`{definition}` does not parse: {err}"));
            let slot = evaluator.eval(parsed.expr());
            evaluator.scope.insert(definition.name.clone(), slot);
        }
        evaluator
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.scope.contains_key(name)
    }

    /// Structure reachable from `roots`, in order, with `#n` marking the
    /// first visit of a shared container and `@n` every later one
    pub fn canonical(&self, roots: &[&str]) -> String {
        let mut seen = FxHashMap::default();
        let mut out = String::new();
        for root in roots {
            let slot = self.scope[*root];
            write!(out, "{root}=").unwrap();
            self.print(slot, &mut seen, &mut out);
            out.push('\n');
        }
        out
    }

    fn print(&self, slot: usize, seen: &mut FxHashMap<usize, usize>, out: &mut String) {
        if let Obj::Atom(text) = &self.arena[slot] {
            out.push_str(text);
            return;
        }
        if let Some(label) = seen.get(&slot) {
            write!(out, "@{label}").unwrap();
            return;
        }
        let label = seen.len();
        seen.insert(slot, label);
        write!(out, "#{label}").unwrap();

        match &self.arena[slot] {
            Obj::Atom(_) => unreachable!(),
            Obj::List(items) | Obj::Tuple(items) => {
                let (open, close) = if matches!(self.arena[slot], Obj::List(_)) {
                    ('[', ']')
                } else {
                    ('(', ')')
                };
                out.push(open);
                for item in items {
                    self.print(*item, seen, out);
                    out.push(',');
                }
                out.push(close);
            }
            Obj::Dict(entries) => {
                out.push('{');
                for (key, value) in entries {
                    self.print(*key, seen, out);
                    out.push(':');
                    self.print(*value, seen, out);
                    out.push(',');
                }
                out.push('}');
            }
        }
    }

    fn alloc(&mut self, obj: Obj) -> usize {
        self.arena.push(obj);
        self.arena.len() - 1
    }

    fn eval(&mut self, expr: &Expr) -> usize {
        match expr {
            Expr::Name(name) => *self
                .scope
                .get(name.id.as_str())
                .unwrap_or_else(|| panic!("unbound name `{}`", name.id)),
            Expr::List(list) => {
                let items = list.elts.iter().map(|item| self.eval(item)).collect();
                self.alloc(Obj::List(items))
            }
            Expr::Tuple(tuple) => {
                let items = tuple.elts.iter().map(|item| self.eval(item)).collect();
                self.alloc(Obj::Tuple(items))
            }
            Expr::Dict(dict) => {
                let entries = dict
                    .items
                    .iter()
                    .map(|item| {
                        let key = item.key.as_ref().expect("dict unpacking is not supported");
                        (self.eval(key), self.eval(&item.value))
                    })
                    .collect();
                self.alloc(Obj::Dict(entries))
            }
            _ => {
                let atom = atom(expr);
                self.alloc(Obj::Atom(atom))
            }
        }
    }
}

fn atom(expr: &Expr) -> String {
    match expr {
        Expr::NumberLiteral(number) => match &number.value {
            Number::Int(int) => int.to_string(),
            Number::Float(float) => float.to_string(),
            Number::Complex { .. } => panic!("complex literals are not supported"),
        },
        Expr::StringLiteral(string) => format!("{:?}", string.value.to_str()),
        Expr::BooleanLiteral(boolean) => boolean.value.to_string(),
        Expr::NoneLiteral(_) => "None".to_owned(),
        Expr::UnaryOp(unary) if unary.op == UnaryOp::USub => format!("-{}", atom(&unary.operand)),
        other => panic!("unsupported expression {other:?}"),
    }
}
