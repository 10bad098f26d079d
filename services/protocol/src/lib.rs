//! Upload Protocol
//!
//! Wire types exchanged between the presign service and upload clients.
//!
//! A client asks the presign service for transfer descriptors for a batch of
//! files, pushes the bytes straight to the object store through the
//! pre-authorized URLs inside those descriptors, and, for multipart
//! transfers, hands the collected part receipts back to the service so it
//! can finalize the object.
//!
//! ```text
//! Client                      Presign Service               Object Store
//! ┌──────────────┐  Issue     ┌──────────────┐  sign URLs   ┌──────────────┐
//! │ IssueRequest │──────────▶│ Descriptor   │────────────▶│ bucket       │
//! └──────────────┘           │ Issuer       │             │              │
//!        ▲                   └──────────────┘             │              │
//!        │ TransferDescriptor                              │              │
//!        │                         PUT bytes               │              │
//!        └────────────────────────────────────────────────▶│              │
//!                             ┌──────────────┐  complete   │              │
//!   CompleteMultipartRequest ▶│ Completion   │────────────▶│              │
//!                             │ Coordinator  │             └──────────────┘
//!                             └──────────────┘
//! ```
//!
//! All JSON field names are camelCase.

pub mod descriptor;
pub mod receipt;

pub use descriptor::{
    part_count, part_range, ErrorResponse, FileSpec, IssueRequest, IssueResponse, PartUrl,
    TransferDescriptor,
};
pub use receipt::{
    normalize_receipts, validate_receipts, CompleteMultipartRequest, CompleteMultipartResponse,
    PartReceipt, ReceiptError,
};

/// Content type used for zero-byte folder placeholder objects
pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";
