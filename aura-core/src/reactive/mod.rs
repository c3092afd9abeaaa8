//! Reactive Primitives
//!
//! This module implements the dependency engine: reactive objects, cells,
//! computed values and effects. Everything else in the crate re-derives its
//! output from these.
//!
//! # Concepts
//!
//! ## Reactive objects
//!
//! A [`Reactive`] is a string-keyed object whose properties are observed
//! individually. Reading a property inside an effect subscribes that effect;
//! writing the property re-runs every subscriber.
//!
//! ## Cells
//!
//! A [`Ref`] is a single observed slot read and written through `value`.
//! Shallow cells observe only replacement of the slot. [`to_refs`] turns each
//! property of a reactive object into a forwarding cell.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation that re-runs whenever something it read
//! changes. [`computed`], [`watch`] and [`watch_effect`] are built on it.
//!
//! # Implementation Notes
//!
//! Tracking goes through an explicit [`Runtime`] handle instead of
//! process-wide state. The runtime holds the current-effect slot, records the
//! dependencies of every effect so stale ones can be dropped on re-run, and
//! queues notified effects so that update cascades are bounded.

mod cell;
mod computed;
mod context;
mod dep;
mod effect;
mod object;
mod runtime;
mod scheduler;
mod scope;

pub use cell::{is_ref, to_refs, unref, Ref};
pub use computed::computed;
pub use context::{ActiveEffect, ReactiveContext};
pub use dep::{Dep, EffectId};
pub use effect::{watch, watch_effect, Effect, WatchOptions};
pub use object::Reactive;
pub use runtime::Runtime;
pub use scheduler::{Tick, UpdateScheduler};
pub use scope::EffectScope;
