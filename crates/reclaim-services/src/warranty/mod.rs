//! Warranty resolution
//!
//! On-demand enrichment of a single line item. The engine serves cached
//! results for 30 days, claims the item, then walks an ordered list of
//! resolvers (AI lookup first, local heuristics second) until one matches.

mod ai;
mod anthropic;
mod engine;
mod heuristic;
mod resolver;

pub use ai::{AiWarrantyAnswer, AiWarrantyResolver, WarrantyAiProvider};
pub use anthropic::AnthropicWarrantyProvider;
pub use engine::{
    WarrantyCheckOutcome, WarrantyCheckRequest, WarrantyEngine, WarrantyError, CACHE_TTL_DAYS,
    CLAIM_STALE_AFTER_MINUTES,
};
pub use heuristic::HeuristicWarrantyResolver;
pub use resolver::{
    add_months, normalize_confidence, ResolvedWarranty, ResolverOutcome, WarrantyQuery,
    WarrantyResolver,
};
