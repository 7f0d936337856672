//! External service clients and their cached metadata.
//!
//! Components never reach for ambient state: everything a source or
//! destination needs from the outside world comes through the
//! [`ServiceContext`] passed into its call.

mod clients;
mod context;

pub use clients::{CloudBuildArtifact, CloudBuildClient, ReleaseClient, ReleaseReceipt, ReleaseRequest};
#[cfg(test)]
pub use clients::{MockCloudBuildClient, MockReleaseClient};
pub use context::{ServiceContext, ServiceMetadata};
