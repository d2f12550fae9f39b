pub mod line_item;
pub mod receipt;
pub mod warranty;

pub use line_item::{LineItem, WarrantyLookupResult, WarrantyLookupStatus};
pub use receipt::{EmailProvenance, NewReceipt, ReceiptRecord, ReceiptStatus, ReceiptSummary};
pub use warranty::{WarrantyRecord, WarrantySource, WarrantyUpsert};
