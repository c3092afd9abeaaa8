//! Aura Core
//!
//! This crate provides the core runtime for the Aura reactive UI framework.
//! It implements:
//!
//! - Reactive primitives (reactive objects, refs, computed values, effects,
//!   watchers)
//! - A directive compiler turning templates plus state into markup
//! - A render loop that re-renders whenever observed state changes
//! - An event binder for declarative `@event` handlers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Dependency tracking, effects and the update scheduler
//! - `template`: Markup tree, expression parser and evaluator
//! - `compiler`: The directive passes (`v-if`, `v-for`, components, bindings)
//! - `render`: The render loop and event binder
//! - `dom`: The host contract and an in-memory document
//! - `app`: Application bootstrap, components and lifecycle hooks
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use aura_core::{create_app, Context, Document, Ref};
//!
//! let doc = Document::parse(r#"<div id="app"></div>"#);
//! let app = create_app()
//!     .template(r#"<button @click="count++">Clicked {{ count }} times</button>"#)
//!     .setup(|cx| Context::new().with("count", Ref::new(cx.runtime(), 0)));
//!
//! let mounted = app.mount(Arc::new(doc.clone()), "#app")?;
//! doc.click(doc.query_selector_all("button")[0]);
//! assert_eq!(mounted.html(), r#"<button @click="count++">Clicked 1 times</button>"#);
//! ```

pub mod app;
pub mod compiler;
pub mod config;
pub mod context;
pub mod dom;
pub mod error;
pub mod escape;
pub mod reactive;
pub mod render;
pub mod template;
pub mod value;

pub use app::{create_app, App, ComponentDef, MountedApp, SetupContext};
pub use compiler::{CompileOptions, Compiler, Output};
pub use config::Config;
pub use context::Context;
pub use dom::{Document, DomEvent, Host, NodeId};
pub use error::{Error, Result};
pub use reactive::{
    computed, is_ref, to_refs, unref, watch, watch_effect, Effect, EffectScope, Reactive, Ref,
    Runtime, WatchOptions,
};
pub use render::{render_template, Renderer};
pub use value::{Function, Object, Value};
