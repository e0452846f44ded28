//! Core pipeline building blocks: filename grammar, symbology, template
//! resolution, raster compositing and batch orchestration. These are the
//! primitives consumed by the high-level `api` module.
pub mod batch;
pub mod naming;
pub mod params;
pub mod processing;
pub mod symbology;
pub mod template;
