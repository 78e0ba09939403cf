use serde::{Deserialize, Serialize};

/// Highest score a criterion can receive
pub const MAX_CRITERION_SCORE: u8 = 5;
/// Lowest score a criterion can receive
pub const MIN_CRITERION_SCORE: u8 = 1;

/// One named criterion with a description per score level (index 0 = score 1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub levels: Vec<String>,
}

/// Fixed multi-criterion scoring rubric used by the LLM scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub category: String,
    pub criteria: Vec<Criterion>,
}

/// Score assigned to one criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: String,
    pub score: u8,
    #[serde(default)]
    pub explanation: String,
}

impl Rubric {
    /// Five-criterion rubric for crypto assets.
    pub fn crypto() -> Self {
        let criterion = |name: &str, levels: [&str; 5]| Criterion {
            name: name.to_string(),
            levels: levels.iter().map(|l| l.to_string()).collect(),
        };

        Self {
            category: "crypto".to_string(),
            criteria: vec![
                criterion(
                    "Technology innovation and disruption potential",
                    [
                        "Outdated technology, no innovation, at risk of being replaced by newer chains or protocols; ecosystem growth stalled",
                        "Incremental improvements without a clear edge over established chains or protocols",
                        "Credible replacement potential (throughput, layer-2 scaling) but still on testnet or in early deployment",
                        "Clear adoption trend: TVL or user growth of 10-30%, developer uptake increasing",
                        "Category-defining technology (new consensus, cross-chain protocol) with >30% penetration, incumbents losing share fast",
                    ],
                ),
                criterion(
                    "Regulatory and policy environment",
                    [
                        "Heavily restricted (trading bans, punitive taxation); room to grow severely limited",
                        "Neutral regulation with high policy uncertainty",
                        "General policy support announced but no concrete measures yet",
                        "Concrete support (regulatory sandbox, tax relief, pilot programmes); compliance improving",
                        "National strategic priority (reserve asset, cross-border payment pilots) with a very friendly regulator",
                    ],
                ),
                criterion(
                    "Market performance and growth",
                    [
                        "Falling price or shrinking volume, growth <= 0%, little market attention",
                        "Moderate growth of 0-15% in price or volume, in line with the market",
                        "Fast growth of 15-30%; TVL or on-chain activity shows momentum",
                        "High growth of 30-50%, clearly ahead of the market, visible institutional accumulation",
                        "Explosive and sustainable growth above 50% (ETF inflows, active futures markets)",
                    ],
                ),
                criterion(
                    "Community and ecosystem support",
                    [
                        "Inactive community, developers leaving, unstable core team or negative events",
                        "Stable community without notable growth, limited developer participation",
                        "Community activity rising, incentive programmes (staking, governance) attracting developers",
                        "Well-known institutions or projects joining the ecosystem, rapid community expansion",
                        "Ecosystem leads its market with global reach and full support from top capital and developers",
                    ],
                ),
                criterion(
                    "Demand and use cases",
                    [
                        "Use cases shrinking, product replaced or facing excessive competition",
                        "Stable demand for basic payment or storage, limited upside",
                        "Demand upgrading: users pay a premium for efficiency or experience, use cases expanding",
                        "New demand surging in finance, gaming or AI; on-chain volume growing quickly",
                        "Creates entirely new demand and defines a new category (RWA tokenisation, AI agents)",
                    ],
                ),
            ],
        }
    }

    pub fn criterion_count(&self) -> usize {
        self.criteria.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.criteria.iter().any(|c| c.name == name)
    }

    /// Render the rubric as the JSON block appended to scoring prompts.
    pub fn render(&self) -> String {
        let body: serde_json::Map<String, serde_json::Value> = self
            .criteria
            .iter()
            .map(|c| {
                let levels: serde_json::Map<String, serde_json::Value> = c
                    .levels
                    .iter()
                    .enumerate()
                    .map(|(i, text)| (format!("{} points", i + 1), serde_json::Value::String(text.clone())))
                    .collect();
                (c.name.clone(), serde_json::Value::Object(levels))
            })
            .collect();

        serde_json::to_string_pretty(&serde_json::Value::Object(body)).unwrap_or_default()
    }
}
