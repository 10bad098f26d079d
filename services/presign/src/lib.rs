//! Presign Service
//!
//! Issues pre-authorized upload descriptors for batches of media files and
//! finalizes multipart uploads once clients have pushed every part directly
//! to the object store.
//!
//! ## Features
//!
//! - **Descriptor Issuance**: single presigned PUT for files up to the
//!   threshold, presigned per-part URLs for larger files, all signed
//!   concurrently
//! - **Directory Markers**: best-effort folder placeholders under
//!   `{owner}/{group}/`
//! - **Multipart Finalization**: receipt normalization and validation against
//!   the issued part count before the store is asked to assemble the object
//!
//! ## Architecture
//!
//! ```text
//!   Client                 Presign Service                  S3 Bucket
//! ┌──────────────┐       ┌──────────────────┐          ┌──────────────────┐
//! │ presign      │──────▶│ Descriptor       │─────────▶│ {owner}/         │
//! │ request      │       │ Issuer           │ markers, │   {group}/       │
//! └──────────────┘       └──────────────────┘ signing  │     raw_video/   │
//!                                │                     │     split_video/ │
//!                                ▼                     │                  │
//!                        ┌──────────────────┐          │                  │
//!                        │ Multipart        │          │                  │
//!                        │ Registry         │          │                  │
//!                        └──────────────────┘          │                  │
//!                                ▲                     │                  │
//! ┌──────────────┐       ┌──────────────────┐          │                  │
//! │ complete     │──────▶│ Completion       │─────────▶│                  │
//! │ request      │       │ Coordinator      │ finalize └──────────────────┘
//! └──────────────┘       └──────────────────┘
//! ```

pub mod api;
pub mod completion;
pub mod config;
pub mod error;
pub mod issuer;
pub mod object_store;
pub mod registry;

pub use api::{AppState, ApiError};
pub use completion::CompletionCoordinator;
pub use config::Config;
pub use error::{FinalizeError, IssueError, StoreError};
pub use issuer::DescriptorIssuer;
pub use object_store::{ObjectStore, S3Store, StoreLocation};
pub use registry::MultipartRegistry;
