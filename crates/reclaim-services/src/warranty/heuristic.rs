use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reclaim_core::models::WarrantySource;
use rust_decimal::Decimal;

use super::resolver::{add_months, ResolvedWarranty, ResolverOutcome, WarrantyQuery, WarrantyResolver};

/// Coverage assumed for anything the heuristics accept.
pub const DEFAULT_COVERAGE_MONTHS: u32 = 12;

const DURABLE_CONFIDENCE: f64 = 0.6;
const MERCHANT_CONFIDENCE: f64 = 0.5;
const PRICE_CONFIDENCE: f64 = 0.4;

/// Consumables, food and drink, and venues/services never carry a warranty.
const CONSUMABLE_PATTERN: &str = r"(?i)\b(latte|coffee|espresso|cappuccino|mocha|tea|juice|soda|beer|wine|food|meal|lunch|dinner|breakfast|sandwich|burger|pizza|salad|snack|bagel|donut|pastry|grocer(y|ies)|milk|bread|produce|restaurant|cafe|café|bar|pub|starbucks|mcdonald'?s|dunkin|chipotle|subway|doordash|uber ?eats|grubhub|fuel|gasoline|parking|toll|ticket|cinema|theat(er|re)|hotel|lodging|taxi|fare)\b";

/// Durable goods, each mapped to a default category.
const DURABLE_PATTERNS: &[(&str, &str)] = &[
    (
        r"(?i)\b(laptop|notebook computer|computer|desktop|monitor|tv|television|phone|smartphone|iphone|tablet|ipad|camera|headphones?|earbuds|speaker|sound ?bar|console|playstation|xbox|printer|router|smartwatch)\b",
        "electronics",
    ),
    (
        r"(?i)\b(wine (fridge|cooler)|refrigerator|fridge|freezer|washer|washing machine|dryer|dishwasher|microwave|oven|range|stove|vacuum|blender|mixer|toaster|air conditioner|heater|dehumidifier|tea ?kettle|kettle|coffee (maker|machine|grinder)|espresso machine|food processor|juicer)\b",
        "appliances",
    ),
    (
        r"(?i)\b(drill|saw|sander|grinder|impact driver|compressor|generator|lawn ?mower|trimmer|leaf blower|pressure washer|snow ?blower|tool ?set|tool ?kit)\b",
        "tools",
    ),
    (
        r"(?i)\b(sofa|couch|mattress|desk|office chair|recliner|bed frame|dresser|bicycle|bike|treadmill)\b",
        "furniture",
    ),
];

/// Retailers whose purchases usually carry manufacturer coverage.
const WARRANTY_MERCHANT_PATTERN: &str = r"(?i)\b(home depot|lowe'?s|best buy|apple|costco|menards|micro ?center|b&h|newegg|ikea|harbor freight|ace hardware|sears|currys|dell|lenovo|samsung)\b";

/// Tier 2: keyword and price rules evaluated without any network call.
///
/// Signal families are checked in priority order: consumable (reject),
/// durable keyword, warranty merchant, then price thresholds.
#[derive(Debug, Clone)]
pub struct HeuristicWarrantyResolver {
    consumable: Regex,
    durable: Vec<(Regex, &'static str)>,
    warranty_merchant: Regex,
    min_price: Decimal,
    high_value_price: Decimal,
}

impl HeuristicWarrantyResolver {
    pub fn new() -> Result<Self> {
        let durable = DURABLE_PATTERNS
            .iter()
            .map(|(pattern, category)| {
                Regex::new(pattern)
                    .with_context(|| format!("Failed to compile {} keyword pattern", category))
                    .map(|re| (re, *category))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            consumable: Regex::new(CONSUMABLE_PATTERN)
                .context("Failed to compile consumable keyword pattern")?,
            durable,
            warranty_merchant: Regex::new(WARRANTY_MERCHANT_PATTERN)
                .context("Failed to compile merchant pattern")?,
            min_price: Decimal::new(20, 0),
            high_value_price: Decimal::new(100, 0),
        })
    }

    fn item_text(query: &WarrantyQuery) -> String {
        match query.description {
            Some(ref description) => format!("{} {}", query.item_name, description),
            None => query.item_name.clone(),
        }
    }

    fn eligible(
        query: &WarrantyQuery,
        category: Option<&str>,
        confidence: f64,
    ) -> ResolverOutcome {
        match add_months(query.purchase_date, DEFAULT_COVERAGE_MONTHS) {
            Some(end_date) => ResolverOutcome::Matched(ResolvedWarranty {
                start_date: query.purchase_date,
                end_date,
                category: category.map(str::to_string),
                manufacturer: None,
                confidence: Some(confidence),
                source: WarrantySource::Receipt,
                source_urls: Vec::new(),
            }),
            None => ResolverOutcome::no_match("Purchase date out of range"),
        }
    }
}

#[async_trait]
impl WarrantyResolver for HeuristicWarrantyResolver {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn resolve(&self, query: &WarrantyQuery) -> ResolverOutcome {
        let item_text = Self::item_text(query);
        let merchant = query.merchant.as_deref().unwrap_or("");

        // Durable phrases such as "coffee maker" are taken out before the
        // consumable test so their food or drink words don't reject them.
        let durable_category = self
            .durable
            .iter()
            .find(|(re, _)| re.is_match(&item_text))
            .map(|(_, category)| *category);
        let remainder = self
            .durable
            .iter()
            .fold(item_text.clone(), |text, (re, _)| re.replace_all(&text, " ").into_owned());

        if self.consumable.is_match(&remainder) || self.consumable.is_match(merchant) {
            return ResolverOutcome::no_match("Consumable, food or venue purchase");
        }

        if let Some(category) = durable_category {
            return Self::eligible(query, Some(category), DURABLE_CONFIDENCE);
        }

        if self.warranty_merchant.is_match(merchant) {
            return Self::eligible(query, None, MERCHANT_CONFIDENCE);
        }

        match query.price {
            Some(price) if price < self.min_price => {
                ResolverOutcome::no_match("Price below warranty threshold")
            }
            Some(price) if price > self.high_value_price => {
                Self::eligible(query, None, PRICE_CONFIDENCE)
            }
            _ => ResolverOutcome::no_match("Insufficient signal"),
        }
    }
}
