//! Reclaim Services Layer
//!
//! This crate is the **pipeline service layer**: duplicate detection, the
//! ingest gateway, the extraction dispatcher, the stuck-job reaper and the
//! warranty resolution engine. Services depend on repository, storage and
//! collaborator traits only; the API crate wires the concrete implementations.

pub mod dispatch;
pub mod duplicate;
pub mod ingest;
pub mod quota;
pub mod reaper;
pub mod warranty;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use dispatch::{
    DispatchError, DispatchOutcome, ExtractionDispatcher, ExtractionPayload, ExtractionWorker,
    HttpExtractionWorker,
};
pub use duplicate::DuplicateDetector;
pub use ingest::{IngestError, IngestGateway, IngestOutcome, IngestRequest, IngestSettings};
pub use quota::MonthlyReceiptQuota;
pub use reaper::{ReapError, ReapOutcome, ReapParams, ReapReport, StuckJobReaper};
pub use warranty::{
    AiWarrantyResolver, AnthropicWarrantyProvider, HeuristicWarrantyResolver, ResolvedWarranty,
    ResolverOutcome, WarrantyAiProvider, WarrantyCheckOutcome, WarrantyCheckRequest,
    WarrantyEngine, WarrantyError, WarrantyQuery, WarrantyResolver,
};
