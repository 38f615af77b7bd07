//! Analysis report model and projection for cuckoo-dxl.
//!
//! This crate defines the report document handed over by the sandbox,
//! the operator inclusion list, and the projection that turns one into
//! the curated report event.

pub mod inclusion;
pub mod projection;
pub mod value;

pub use inclusion::{InclusionSpec, ItemPath};
pub use projection::{project, NotFoundPolicy, ProjectedReport, Projector, INFO_KEY, TARGET_KEY};
pub use value::{AnalysisReport, ReportMap, ReportValue};
