//! Offload deferred work to dedicated worker processes.
//!
//! `offload` moves units of work out of an interactive application into
//! separate OS processes without blocking the caller, and delivers each
//! outcome either to a registered callback or through a [`JobFuture`]
//! retrieved later. A companion primitive launches arbitrary external
//! programs under the same future/callback protocol.
//!
//! One launch spawns exactly one dedicated worker and yields exactly one
//! future. There is no queueing, pooling, retry, or prioritization.
//!
//! # Module Organization
//!
//! - [`protocol`] - Wire types: expression language, task and result units
//! - [`capture`] - Name-pattern snapshotting of caller state
//! - [`engine`] - Process orchestration and completion handling
//! - [`future`] - Caller-visible job handles
//! - [`worker`] - Worker-side entry point (used by `offload-worker`)
//! - [`error`] - Error taxonomy and `Result` alias
//!
//! # Example
//!
//! ```no_run
//! use offload::{CaptureRegistry, Engine, Expr, Op, TaskUnit};
//!
//! # async fn example() -> offload::Result<()> {
//! let mut registry = CaptureRegistry::new();
//! registry.bind("mail-x", &1)?;
//! registry.bind("mail-y", &2)?;
//!
//! let task = TaskUnit::with_bindings(
//!     registry.capture("^mail-")?,
//!     Expr::Call {
//!         op: Op::Add,
//!         args: vec![Expr::var("mail-x"), Expr::var("mail-y")],
//!     },
//! );
//!
//! let engine = Engine::new();
//! let future = engine.launch_task(&task, None).await?;
//! assert_eq!(future.get().await?, serde_json::json!(3));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod capture;
pub mod engine;
pub mod error;
pub mod future;
pub mod protocol;
pub mod worker;

pub use capture::{CaptureRegistry, ValuePredicate, DEFAULT_EXCLUDE};
pub use engine::{Engine, EngineBuilder, ExitCallback, ProcessExit};
pub use error::{Error, Result};
pub use future::JobFuture;
pub use protocol::{Binding, Expr, Op, ResultUnit, Signal, TaskUnit};
