//! Shadow document model and reconciliation core.
//!
//! The reconciler is the single entry point for every mutation of a shadow
//! document: device reports and operator requests both funnel through
//! [`Reconciler::apply`], which serializes concurrent writers through the
//! store's conditional write rather than an application-level lock.

mod document;
mod event;
mod reconciler;
mod validation;

pub use document::*;
pub use event::*;
pub use reconciler::*;
pub use validation::*;

#[cfg(test)]
mod document_test;
#[cfg(test)]
mod reconciler_test;
