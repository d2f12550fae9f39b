pub mod reaper;
pub mod receipts;
pub mod warranty;
