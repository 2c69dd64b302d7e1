//! Encoders: how a value is decomposed into a template and child objects

use std::fmt;

use log::trace;

use crate::{
    error::{ArchiveError, Result},
    imports::ExternalSymbolRef,
    rewrite,
    template::Template,
    types::FxIndexMap,
    value::{Env, ObjRef, Scalar, SequenceKind, Value, ValueKind},
};

/// One step of decomposition: a template plus the objects it refers to
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub template: Template,
    /// Local name used in `template` to the child object, in template order
    pub children: FxIndexMap<String, ObjRef>,
    pub imports: Vec<ExternalSymbolRef>,
}

impl Decomposition {
    pub fn leaf(template: Template) -> Self {
        Self {
            template,
            children: FxIndexMap::default(),
            imports: Vec::new(),
        }
    }

    #[must_use]
    pub fn child(mut self, name: impl Into<String>, object: ObjRef) -> Self {
        self.children.insert(name.into(), object);
        self
    }

    #[must_use]
    pub fn import(mut self, symbol: ExternalSymbolRef) -> Self {
        self.imports.push(symbol);
        self
    }
}

pub trait Encoder {
    fn encode(&self, value: &Value, env: &Env) -> Result<Decomposition>;
}

impl<F> Encoder for F
where
    F: Fn(&Value, &Env) -> Result<Decomposition>,
{
    fn encode(&self, value: &Value, env: &Env) -> Result<Decomposition> {
        self(value, env)
    }
}

type Predicate = Box<dyn Fn(&Value) -> bool>;

/// Ordered predicate/encoder pairs; the first accepting pair wins
pub struct EncoderRegistry {
    entries: Vec<(Predicate, Box<dyn Encoder>)>,
}

impl fmt::Debug for EncoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderRegistry")
            .field("encoders", &self.entries.len())
            .finish()
    }
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl EncoderRegistry {
    /// A registry that accepts nothing
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Encoders for every built-in value kind
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.append(|v: &Value| v.kind() == ValueKind::Scalar, encode_scalar);
        registry.append(
            |v: &Value| matches!(v.kind(), ValueKind::List | ValueKind::Tuple),
            encode_sequence,
        );
        registry.append(|v: &Value| v.kind() == ValueKind::Mapping, encode_mapping);
        registry.append(|v: &Value| v.kind() == ValueKind::Described, encode_described);
        registry.append(|v: &Value| v.kind() == ValueKind::Repr, encode_repr);
        registry
    }

    /// Register an encoder ahead of every existing one
    pub fn register<P, E>(&mut self, predicate: P, encoder: E)
    where
        P: Fn(&Value) -> bool + 'static,
        E: Encoder + 'static,
    {
        self.entries.insert(0, (Box::new(predicate), Box::new(encoder)));
    }

    /// Register an encoder behind every existing one
    pub fn append<P, E>(&mut self, predicate: P, encoder: E)
    where
        P: Fn(&Value) -> bool + 'static,
        E: Encoder + 'static,
    {
        self.entries.push((Box::new(predicate), Box::new(encoder)));
    }

    pub fn decompose(&self, value: &Value, env: &Env) -> Result<Decomposition> {
        let (_, encoder) = self
            .entries
            .iter()
            .find(|(predicate, _)| predicate(value))
            .ok_or_else(|| ArchiveError::NoEncoder(value.kind().to_string()))?;
        encoder.encode(value, env)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn unexpected(encoder: &str, value: &Value) -> ArchiveError {
    ArchiveError::Encode(format!("{encoder} encoder got a {} value", value.kind()))
}

fn encode_scalar(value: &Value, _env: &Env) -> Result<Decomposition> {
    let Value::Scalar(scalar) = value else {
        return Err(unexpected("scalar", value));
    };
    let decomposition = match scalar {
        Scalar::Float(f) if f.is_nan() => Decomposition::leaf(Template::symbol("nan"))
            .import(ExternalSymbolRef::symbol("math", "nan")),
        Scalar::Float(f) if f.is_infinite() && f.is_sign_positive() => {
            Decomposition::leaf(Template::symbol("inf"))
                .import(ExternalSymbolRef::symbol("math", "inf"))
        }
        Scalar::Float(f) if f.is_infinite() => Decomposition::leaf(Template::source("-inf"))
            .import(ExternalSymbolRef::symbol("math", "inf")),
        other => Decomposition::leaf(Template::Literal(other.clone())),
    };
    Ok(decomposition)
}

fn encode_sequence(value: &Value, _env: &Env) -> Result<Decomposition> {
    let Value::Sequence { kind, items } = value else {
        return Err(unexpected("sequence", value));
    };
    let prefix = match kind {
        SequenceKind::List => "_l",
        SequenceKind::Tuple => "_t",
    };
    let mut children = FxIndexMap::default();
    let mut elements = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let name = format!("{prefix}_{index}");
        elements.push(Template::reference(name.clone()));
        children.insert(name, *item);
    }
    let template = match kind {
        SequenceKind::List => Template::List(elements),
        SequenceKind::Tuple => Template::Tuple(elements),
    };
    Ok(Decomposition {
        template,
        children,
        imports: Vec::new(),
    })
}

fn encode_mapping(value: &Value, _env: &Env) -> Result<Decomposition> {
    let Value::Mapping(entries) = value else {
        return Err(unexpected("mapping", value));
    };
    let mut children = FxIndexMap::default();
    let mut pairs = Vec::with_capacity(entries.len());
    for (index, (key, item)) in entries.iter().enumerate() {
        let key_name = format!("_k_{index}");
        let value_name = format!("_v_{index}");
        pairs.push((
            Template::reference(key_name.clone()),
            Template::reference(value_name.clone()),
        ));
        children.insert(key_name, *key);
        children.insert(value_name, *item);
    }
    Ok(Decomposition {
        template: Template::Dict(pairs),
        children,
        imports: Vec::new(),
    })
}

fn encode_described(value: &Value, _env: &Env) -> Result<Decomposition> {
    let Value::Described(described) = value else {
        return Err(unexpected("described", value));
    };
    Ok(Decomposition {
        template: described.template.clone(),
        children: described.args.iter().cloned().collect(),
        imports: described.imports.clone(),
    })
}

/// Fallback: the value's own source text, with free names imported from
/// whatever module the environment maps them to
fn encode_repr(value: &Value, env: &Env) -> Result<Decomposition> {
    let Value::Repr { text } = value else {
        return Err(unexpected("repr", value));
    };
    let mut decomposition = Decomposition::leaf(Template::source(text.clone()));
    for name in rewrite::value_references(text) {
        if let Some(module) = env.resolve(&name) {
            trace!("Resolved '{name}' in repr `{text}` to module '{module}'");
            decomposition = decomposition.import(ExternalSymbolRef::symbol(module, &name));
        }
    }
    Ok(decomposition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Described, Heap};

    #[test]
    fn test_list_children_in_order() {
        let mut heap = Heap::new();
        let a = heap.int(1);
        let b = heap.int(2);
        let list = heap.list(vec![a, b, a]);
        let registry = EncoderRegistry::default();
        let decomposition = registry
            .decompose(heap.get(list).unwrap(), &Env::new())
            .unwrap();
        assert_eq!(decomposition.template.to_string(), "[_l_0, _l_1, _l_2]");
        let children: Vec<_> = decomposition.children.values().copied().collect();
        assert_eq!(children, [a, b, a]);
    }

    #[test]
    fn test_mapping_template() {
        let mut heap = Heap::new();
        let k = heap.str("k");
        let v = heap.int(1);
        let dict = heap.dict(vec![(k, v)]);
        let decomposition = EncoderRegistry::default()
            .decompose(heap.get(dict).unwrap(), &Env::new())
            .unwrap();
        assert_eq!(decomposition.template.to_string(), "{_k_0: _v_0}");
    }

    #[test]
    fn test_non_finite_floats_import_math() {
        let registry = EncoderRegistry::default();
        let env = Env::new();
        let neg = registry
            .decompose(&Value::Scalar(Scalar::Float(f64::NEG_INFINITY)), &env)
            .unwrap();
        assert_eq!(neg.template.to_string(), "-inf");
        assert_eq!(neg.imports, [ExternalSymbolRef::symbol("math", "inf")]);

        let nan = registry
            .decompose(&Value::Scalar(Scalar::Float(f64::NAN)), &env)
            .unwrap();
        assert_eq!(nan.template, Template::symbol("nan"));
    }

    #[test]
    fn test_repr_resolves_environment() {
        let env = Env::new().with("array", "numpy").with("float64", "numpy");
        let value = Value::Repr {
            text: "array([1.0, nan], dtype=float64)".to_owned(),
        };
        let decomposition = EncoderRegistry::default().decompose(&value, &env).unwrap();
        assert_eq!(
            decomposition.imports,
            [
                ExternalSymbolRef::symbol("numpy", "array"),
                ExternalSymbolRef::symbol("numpy", "float64"),
            ]
        );
        assert!(decomposition.children.is_empty());
    }

    #[test]
    fn test_register_takes_precedence() {
        let mut registry = EncoderRegistry::default();
        registry.register(
            |v: &Value| v.kind() == ValueKind::Scalar,
            |_: &Value, _: &Env| -> Result<Decomposition> {
                Ok(Decomposition::leaf(Template::source("custom()")))
            },
        );
        let decomposition = registry
            .decompose(&Value::Scalar(Scalar::Int(3)), &Env::new())
            .unwrap();
        assert_eq!(decomposition.template.to_string(), "custom()");
    }

    #[test]
    fn test_no_encoder() {
        let registry = EncoderRegistry::empty();
        let err = registry
            .decompose(&Value::Described(Described::global("os", "sep")), &Env::new())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::NoEncoder(kind) if kind == "described"));
    }
}
