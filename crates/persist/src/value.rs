//! In-memory object model
//!
//! A [`Heap`] is an arena of [`Value`]s. Handles ([`ObjRef`]) are the identity
//! of an object: two handles to structurally equal values are still two
//! distinct objects, and one handle reached along several paths is one shared
//! object.

use std::fmt;

use crate::{
    error::{ArchiveError, Result},
    imports::ExternalSymbolRef,
    template::Template,
    types::FxIndexMap,
};

/// Identity of an object stored in a [`Heap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjRef(usize);

impl ObjRef {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Atomic values that render directly as a Python literal
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    /// Whether the literal can be pasted into any expression position
    pub fn is_atomic(&self) -> bool {
        match self {
            Self::None | Self::Bool(_) | Self::Str(_) => true,
            Self::Int(value) => *value >= 0,
            Self::Float(value) => value.is_finite() && value.is_sign_positive(),
        }
    }

    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) if value.is_nan() => f.write_str("float('nan')"),
            Self::Float(value) if value.is_infinite() && *value > 0.0 => {
                f.write_str("float('inf')")
            }
            Self::Float(value) if value.is_infinite() => f.write_str("-float('inf')"),
            // `{:?}` always keeps a decimal point or exponent, so the text
            // reads back as a float
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Str(value) => write_python_str(f, value),
        }
    }
}

/// Write `value` as a single-quoted Python string literal
fn write_python_str(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in value.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\'' => f.write_str("\\'")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c.is_control() => write!(f, "\\x{:02x}", u32::from(c))?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceKind {
    List,
    Tuple,
}

/// A self-describing object: it knows how to rebuild itself
#[derive(Debug, Clone, PartialEq)]
pub struct Described {
    /// Construction expression, referring to `args` by their local names
    pub template: Template,
    /// Named sub-objects, in the order they appear in the template
    pub args: Vec<(String, ObjRef)>,
    /// External symbols the template needs
    pub imports: Vec<ExternalSymbolRef>,
}

impl Described {
    pub fn new(template: Template) -> Self {
        Self {
            template,
            args: Vec::new(),
            imports: Vec::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, object: ObjRef) -> Self {
        self.args.push((name.into(), object));
        self
    }

    pub fn import(mut self, symbol: ExternalSymbolRef) -> Self {
        self.imports.push(symbol);
        self
    }

    /// A module-level global such as a class or function, referenced by name
    pub fn global(module: &str, name: &str) -> Self {
        Self::new(Template::Symbol(name.to_owned()))
            .import(ExternalSymbolRef::symbol(module, name))
    }
}

/// The closed set of encodable values
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Sequence {
        kind: SequenceKind,
        items: Vec<ObjRef>,
    },
    /// Key/value pairs in insertion order
    Mapping(Vec<(ObjRef, ObjRef)>),
    Described(Described),
    /// Source text fallback; free names are resolved through an [`Env`]
    Repr { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Scalar,
    List,
    Tuple,
    Mapping,
    Described,
    Repr,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scalar => "scalar",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Mapping => "mapping",
            Self::Described => "described",
            Self::Repr => "repr",
        })
    }
}

impl Value {
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Scalar(_) => ValueKind::Scalar,
            Self::Sequence {
                kind: SequenceKind::List,
                ..
            } => ValueKind::List,
            Self::Sequence {
                kind: SequenceKind::Tuple,
                ..
            } => ValueKind::Tuple,
            Self::Mapping(_) => ValueKind::Mapping,
            Self::Described(_) => ValueKind::Described,
            Self::Repr { .. } => ValueKind::Repr,
        }
    }

    /// Trivially inlineable: a finite scalar literal with no imports
    pub fn is_simple(&self) -> bool {
        match self {
            Self::Scalar(Scalar::Float(value)) => value.is_finite(),
            Self::Scalar(_) => true,
            _ => false,
        }
    }
}

/// Arena of objects addressed by [`ObjRef`]
#[derive(Debug, Clone, Default)]
pub struct Heap {
    values: Vec<Value>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, value: Value) -> ObjRef {
        let object = ObjRef(self.values.len());
        self.values.push(value);
        object
    }

    /// Reserve a handle whose value is filled in later with [`Heap::replace`].
    ///
    /// This is the only way to create self-referencing objects.
    pub fn placeholder(&mut self) -> ObjRef {
        self.alloc(Value::Scalar(Scalar::None))
    }

    pub fn replace(&mut self, object: ObjRef, value: Value) -> Result<()> {
        let slot = self
            .values
            .get_mut(object.index())
            .ok_or(ArchiveError::UnknownObject(object))?;
        *slot = value;
        Ok(())
    }

    pub fn get(&self, object: ObjRef) -> Result<&Value> {
        self.values
            .get(object.index())
            .ok_or(ArchiveError::UnknownObject(object))
    }

    pub fn contains(&self, object: ObjRef) -> bool {
        object.index() < self.values.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn scalar(&mut self, scalar: Scalar) -> ObjRef {
        self.alloc(Value::Scalar(scalar))
    }

    pub fn int(&mut self, value: i64) -> ObjRef {
        self.scalar(Scalar::Int(value))
    }

    pub fn float(&mut self, value: f64) -> ObjRef {
        self.scalar(Scalar::Float(value))
    }

    pub fn str(&mut self, value: &str) -> ObjRef {
        self.scalar(Scalar::Str(value.to_owned()))
    }

    pub fn list(&mut self, items: Vec<ObjRef>) -> ObjRef {
        self.alloc(Value::Sequence {
            kind: SequenceKind::List,
            items,
        })
    }

    pub fn tuple(&mut self, items: Vec<ObjRef>) -> ObjRef {
        self.alloc(Value::Sequence {
            kind: SequenceKind::Tuple,
            items,
        })
    }

    pub fn dict(&mut self, entries: Vec<(ObjRef, ObjRef)>) -> ObjRef {
        self.alloc(Value::Mapping(entries))
    }

    pub fn described(&mut self, described: Described) -> ObjRef {
        self.alloc(Value::Described(described))
    }

    pub fn repr(&mut self, text: &str) -> ObjRef {
        self.alloc(Value::Repr {
            text: text.to_owned(),
        })
    }
}

/// Resolution environment: symbol name to the module that provides it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    symbols: FxIndexMap<String, String>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, symbol: &str, module: &str) -> Self {
        self.insert(symbol, module);
        self
    }

    pub fn insert(&mut self, symbol: &str, module: &str) {
        self.symbols.insert(symbol.to_owned(), module.to_owned());
    }

    /// Module providing `symbol`, if any
    pub fn resolve(&self, symbol: &str) -> Option<&str> {
        self.symbols.get(symbol).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.symbols
            .iter()
            .map(|(symbol, module)| (symbol.as_str(), module.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_literals() {
        assert_eq!(Scalar::None.to_string(), "None");
        assert_eq!(Scalar::Bool(true).to_string(), "True");
        assert_eq!(Scalar::Int(-3).to_string(), "-3");
        assert_eq!(Scalar::Float(1.0).to_string(), "1.0");
        assert_eq!(Scalar::Float(0.25).to_string(), "0.25");
        assert_eq!(Scalar::Float(f64::NEG_INFINITY).to_string(), "-float('inf')");
    }

    #[test]
    fn test_string_escaping() {
        let s = Scalar::Str("it's a\\b\n\u{1}é".to_owned());
        assert_eq!(s.to_string(), r"'it\'s a\\b\n\x01é'");
    }

    #[test]
    fn test_atomic_literals() {
        assert!(Scalar::Int(4).is_atomic());
        assert!(!Scalar::Int(-4).is_atomic());
        assert!(!Scalar::Float(-0.5).is_atomic());
        assert!(!Scalar::Float(f64::NAN).is_atomic());
    }

    #[test]
    fn test_heap_identity_is_handle() {
        let mut heap = Heap::new();
        let a = heap.int(1);
        let b = heap.int(1);
        assert_ne!(a, b);
        assert_eq!(heap.get(a).ok(), heap.get(b).ok());
    }

    #[test]
    fn test_handles_are_allocation_positions() {
        let mut heap = Heap::new();
        let handles: Vec<ObjRef> = (0..300).map(|i| heap.int(i)).collect();
        for (position, handle) in handles.iter().enumerate() {
            assert_eq!(handle.index(), position);
        }
        assert!(!heap.contains(ObjRef::new(u32::MAX as usize + 1)));
    }

    #[test]
    fn test_placeholder_allows_self_reference() {
        let mut heap = Heap::new();
        let list = heap.placeholder();
        heap.replace(
            list,
            Value::Sequence {
                kind: SequenceKind::List,
                items: vec![list],
            },
        )
        .unwrap();
        assert_eq!(heap.get(list).unwrap().kind(), ValueKind::List);
    }

    #[test]
    fn test_unknown_handle() {
        let heap = Heap::new();
        assert!(matches!(
            heap.get(ObjRef::new(7)),
            Err(ArchiveError::UnknownObject(_))
        ));
    }

    #[test]
    fn test_simple_values() {
        assert!(Value::Scalar(Scalar::Str("x".into())).is_simple());
        assert!(!Value::Scalar(Scalar::Float(f64::INFINITY)).is_simple());
        assert!(!Value::Mapping(Vec::new()).is_simple());
    }

    #[test]
    fn test_env_resolution_keeps_order() {
        let env = Env::new().with("array", "numpy").with("inf", "math");
        assert_eq!(env.resolve("inf"), Some("math"));
        assert_eq!(env.resolve("list"), None);
        let symbols: Vec<_> = env.iter().map(|(symbol, _)| symbol).collect();
        assert_eq!(symbols, ["array", "inf"]);
    }
}
