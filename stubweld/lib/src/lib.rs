//! Build-time rewriting of generated Python type stubs for the NEXOS AI SDK.
//!
//! The engine takes the raw output of a stub generator and welds it into the
//! interface the SDK actually presents at runtime: nested `Operations`
//! classes become fluent `RequestManager` builder classes, domain models gain
//! structural `...Data` TypedDict records, and `Annotated[..., "model:..."]`
//! markers resolve to those records with the imports they need.
//!
//! [`pipeline::Pipeline`] drives the whole batch; the individual passes under
//! [`rewrite`] are usable on their own.

pub mod error;
pub mod pipeline;
pub mod profile;
pub mod registry;
pub mod rewrite;
pub mod syntax;

pub use error::StubweldError;
pub use pipeline::{Pipeline, PipelineConfig};
pub use profile::Profile;
pub use registry::ManagerRegistry;
