//! FloralBot: photograph flowers, store the photo, and report which flowers
//! a cloud vision service sees in it.
//!
//! The pipeline runs capture → upload → analyze → aggregate → render, one
//! image at a time. See [`pipeline::Pipeline`].

pub mod aggregate;
pub mod capture;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod presenter;
pub mod server;
pub mod storage;
pub mod vision;

pub use aggregate::{aggregate, FlowerAnalysis, FlowerCount, TagHit};
pub use capture::ImageAsset;
pub use config::{CredentialProvider, Credentials, EnvCredentials, RemoteCredentials};
pub use error::{ConfigError, PipelineError};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineSettings};
pub use storage::{BlobUploader, RemoteImageRef, StorageEndpoint};
pub use vision::{VisionClient, VisionResult};
