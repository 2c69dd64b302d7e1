//! Persist: archive in-memory object graphs as replayable Python scripts
//!
//! Objects live in a [`Heap`] and are addressed by identity ([`ObjRef`]). An
//! [`Archive`] collects named roots, builds a [`DependencyGraph`] by driving the
//! [`EncoderRegistry`] over everything reachable from them, orders the nodes so
//! every definition follows its dependencies, names the intermediate nodes,
//! optionally inlines nodes that do not need a name of their own, and finally
//! coalesces the external symbols into a minimal import table.
//!
//! ```text
//! roots -> encoders -> graph -> toposort -> naming/rewriting -> reduce -> imports
//! ```

pub mod archive;
pub mod config;
pub mod document;
pub mod encoder;
pub mod error;
pub mod graph;
pub mod graph_builder;
pub mod imports;
pub mod names;
pub mod reducer;
pub mod render;
pub mod rewrite;
pub mod template;
pub mod types;
pub mod value;

pub use archive::{Archive, Persistent};
pub use config::Config;
pub use document::LoadedDocument;
pub use encoder::{Decomposition, Encoder, EncoderRegistry};
pub use error::{ArchiveError, Result};
pub use graph::{Definition, DependencyGraph, Node, NodeId, RootEntry};
pub use imports::{ExternalSymbolRef, ImportCoalescer, ImportDecl, ImportForm};
pub use names::UniqueNameAllocator;
pub use reducer::GraphReducer;
pub use rewrite::{RewriteStrategy, TemplateRewriter};
pub use template::Template;
pub use value::{Described, Env, Heap, ObjRef, Scalar, SequenceKind, Value, ValueKind};
