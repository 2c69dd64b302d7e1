//! Construction templates
//!
//! A template is a small Python expression tree. Child objects appear as
//! [`Template::Ref`] leaves and external symbols as [`Template::Symbol`]
//! leaves, so renaming and inlining are plain tree substitutions. Text that
//! only exists as source ([`Template::Source`]) is handed to the
//! [`TemplateRewriter`].

use std::fmt;

use crate::{
    error::Result,
    rewrite::{self, Replacements, TemplateRewriter},
    value::Scalar,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    Literal(Scalar),
    /// Reference to a child object by its current name
    Ref(String),
    /// Reference to an imported symbol by its current alias
    Symbol(String),
    List(Vec<Template>),
    Tuple(Vec<Template>),
    Dict(Vec<(Template, Template)>),
    Call {
        func: Box<Template>,
        args: Vec<Template>,
        keywords: Vec<(String, Template)>,
    },
    Attribute {
        value: Box<Template>,
        attr: String,
    },
    /// Opaque Python expression source
    Source(String),
}

impl Template {
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Ref(name.into())
    }

    pub fn symbol(alias: impl Into<String>) -> Self {
        Self::Symbol(alias.into())
    }

    pub fn source(text: impl Into<String>) -> Self {
        Self::Source(text.into())
    }

    pub fn call(func: Self, args: Vec<Self>) -> Self {
        Self::Call {
            func: Box::new(func),
            args,
            keywords: Vec::new(),
        }
    }

    #[must_use]
    pub fn keyword(self, name: impl Into<String>, value: Self) -> Self {
        match self {
            Self::Call {
                func,
                args,
                mut keywords,
            } => {
                keywords.push((name.into(), value));
                Self::Call {
                    func,
                    args,
                    keywords,
                }
            }
            other => Self::Call {
                func: Box::new(other),
                args: Vec::new(),
                keywords: vec![(name.into(), value)],
            },
        }
    }

    #[must_use]
    pub fn attr(self, attr: impl Into<String>) -> Self {
        Self::Attribute {
            value: Box::new(self),
            attr: attr.into(),
        }
    }

    /// Whether the rendered text can stand in any operand position without
    /// parentheses
    pub fn is_atomic(&self) -> bool {
        match self {
            Self::Literal(scalar) => scalar.is_atomic(),
            Self::Source(_) => false,
            _ => true,
        }
    }

    /// Number of value references to `name`
    pub fn count_references(&self, name: &str) -> usize {
        match self {
            Self::Ref(current) => usize::from(current == name),
            Self::Literal(_) | Self::Symbol(_) => 0,
            Self::Source(text) => rewrite::count_references(text, name),
            _ => self
                .subtemplates()
                .map(|template| template.count_references(name))
                .sum(),
        }
    }

    /// Rename child references with `refs` and symbol references with
    /// `symbols`, all at once.
    ///
    /// Source leaves cannot tell the two apart, so they receive the union.
    pub fn rename(
        &mut self,
        refs: &Replacements,
        symbols: &Replacements,
        rewriter: &TemplateRewriter,
    ) -> Result<()> {
        match self {
            Self::Ref(name) => {
                if let Some(new) = refs.get(name.as_str()) {
                    name.clone_from(new);
                }
            }
            Self::Symbol(alias) => {
                if let Some(new) = symbols.get(alias.as_str()) {
                    alias.clone_from(new);
                }
            }
            Self::Literal(_) => {}
            Self::Source(text) => {
                let mut combined = refs.clone();
                for (old, new) in symbols {
                    combined.entry(old.clone()).or_insert_with(|| new.clone());
                }
                *text = rewriter.rewrite(text, &combined)?;
            }
            _ => {
                for template in self.subtemplates_mut() {
                    template.rename(refs, symbols, rewriter)?;
                }
            }
        }
        Ok(())
    }

    /// Replace every reference to `name` with `replacement`
    pub fn inline(
        &mut self,
        name: &str,
        replacement: &Self,
        rewriter: &TemplateRewriter,
    ) -> Result<()> {
        match self {
            Self::Ref(current) if current == name => {
                *self = replacement.clone();
            }
            Self::Ref(_) | Self::Symbol(_) | Self::Literal(_) => {}
            Self::Source(text) => {
                let rendered = if replacement.is_atomic() {
                    replacement.to_string()
                } else {
                    format!("({replacement})")
                };
                let mut replacements = Replacements::default();
                replacements.insert(name.to_owned(), rendered);
                *text = rewriter.rewrite(text, &replacements)?;
            }
            _ => {
                for template in self.subtemplates_mut() {
                    template.inline(name, replacement, rewriter)?;
                }
            }
        }
        Ok(())
    }

    fn subtemplates(&self) -> Box<dyn Iterator<Item = &Self> + '_> {
        match self {
            Self::List(items) | Self::Tuple(items) => Box::new(items.iter()),
            Self::Dict(entries) => Box::new(entries.iter().flat_map(|(k, v)| [k, v])),
            Self::Call {
                func,
                args,
                keywords,
            } => Box::new(
                std::iter::once(func.as_ref())
                    .chain(args)
                    .chain(keywords.iter().map(|(_, value)| value)),
            ),
            Self::Attribute { value, .. } => Box::new(std::iter::once(value.as_ref())),
            Self::Literal(_) | Self::Ref(_) | Self::Symbol(_) | Self::Source(_) => {
                Box::new(std::iter::empty())
            }
        }
    }

    fn subtemplates_mut(&mut self) -> Box<dyn Iterator<Item = &mut Self> + '_> {
        match self {
            Self::List(items) | Self::Tuple(items) => Box::new(items.iter_mut()),
            Self::Dict(entries) => Box::new(entries.iter_mut().flat_map(|(k, v)| [k, v])),
            Self::Call {
                func,
                args,
                keywords,
            } => Box::new(
                std::iter::once(func.as_mut())
                    .chain(args.iter_mut())
                    .chain(keywords.iter_mut().map(|(_, value)| value)),
            ),
            Self::Attribute { value, .. } => Box::new(std::iter::once(value.as_mut())),
            Self::Literal(_) | Self::Ref(_) | Self::Symbol(_) | Self::Source(_) => {
                Box::new(std::iter::empty())
            }
        }
    }

    /// Render in a primary position (call target, attribute base)
    fn fmt_primary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let needs_parens = match self {
            Self::Literal(scalar) => scalar.is_number() || !scalar.is_atomic(),
            other => !other.is_atomic(),
        };
        if needs_parens {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Template]) -> fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(scalar) => write!(f, "{scalar}"),
            Self::Ref(name) | Self::Symbol(name) => f.write_str(name),
            Self::Source(text) => f.write_str(text),
            Self::List(items) => {
                f.write_str("[")?;
                write_joined(f, items)?;
                f.write_str("]")
            }
            Self::Tuple(items) => {
                f.write_str("(")?;
                write_joined(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Self::Dict(entries) => {
                f.write_str("{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Self::Call {
                func,
                args,
                keywords,
            } => {
                func.fmt_primary(f)?;
                f.write_str("(")?;
                write_joined(f, args)?;
                for (index, (name, value)) in keywords.iter().enumerate() {
                    if index > 0 || !args.is_empty() {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}={value}")?;
                }
                f.write_str(")")
            }
            Self::Attribute { value, attr } => {
                value.fmt_primary(f)?;
                write!(f, ".{attr}")
            }
        }
    }
}
