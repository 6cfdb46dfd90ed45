//! RhinoBridge Import - Draining received assets into a host document
//!
//! This crate provides the idle-loop side of the bridge:
//! - The host document seam (`HostDocument`, `Host`) and scoped redraw control
//! - The per-asset import machine (convert, then apply)
//! - The thread-safe import queue shared with the socket listener
//! - A headless in-memory host for running without a modeling application

pub mod document;
pub mod machine;
pub mod queue;
pub mod scene;

pub use document::{DocumentError, DocumentId, Host, HostDocument, MaterialId, RedrawGuard};
pub use machine::{FailureKind, ImportError, ImportFailure, ImportMachine, ImportReport, ImportState};
pub use queue::{ImportJob, ImportQueue};
pub use scene::{SceneDocument, SceneHost, SceneObject};
