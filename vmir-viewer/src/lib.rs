//! # vmir-viewer — Window Mirroring Viewer
//!
//! Assembles the mirroring pipeline: connects to the X server,
//! restores persisted placement, runs the orchestrator and a
//! graphics frame loop, and routes console commands to in-scene
//! shortcuts. An HMD renderer plugs in behind the
//! [`vmir_core::RenderBackend`] seam; the built-in backend is
//! headless.

pub mod backend;
pub mod config;
pub mod input;
