//! Request and response types for the trade endpoints.

use serde::{Deserialize, Serialize};

/// One fetched listing, passed through untouched.
pub type ItemRecord = serde_json::Value;

/// Response of the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchResult {
    /// Result-set identifier, passed to every fetch call.
    #[serde(rename = "id")]
    pub search_id: String,
    /// Item ids in relevance order.
    #[serde(rename = "result")]
    pub item_ids: Vec<String>,
    /// Total number of matches on the server, which may exceed `item_ids`.
    #[serde(default)]
    pub total: Option<u64>,
}

/// Response of the fetch endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchResponse {
    pub result: Vec<ItemRecord>,
}

/// Pseudo and explicit stat ids commonly weighted in searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    FireResistance,
    ColdResistance,
    LightningResistance,
    ChaosResistance,
    Life,
    Strength,
    Dexterity,
    Intelligence,
    MovementSpeed,
    SpellSuppression,
}

impl Stat {
    /// The stat id understood by the trade API.
    pub fn id(&self) -> &'static str {
        match self {
            Self::FireResistance => "pseudo.pseudo_total_fire_resistance",
            Self::ColdResistance => "pseudo.pseudo_total_cold_resistance",
            Self::LightningResistance => "pseudo.pseudo_total_lightning_resistance",
            Self::ChaosResistance => "pseudo.pseudo_total_chaos_resistance",
            Self::Life => "pseudo.pseudo_total_life",
            Self::Strength => "pseudo.pseudo_total_strength",
            Self::Dexterity => "pseudo.pseudo_total_dexterity",
            Self::Intelligence => "pseudo.pseudo_total_intelligence",
            Self::MovementSpeed => "pseudo.pseudo_increased_movement_speed",
            Self::SpellSuppression => "explicit.stat_3680664274",
        }
    }
}

/// A weighted-sum search: listings are ranked by the sum of their stats
/// multiplied by the given weights.
///
/// ```rust
/// use poe_trade_client::trade::{SearchQuery, Stat};
///
/// let query = SearchQuery::new()
///     .weight(Stat::Life, 2.0)
///     .weight(Stat::ChaosResistance, 4.0)
///     .max_price(100)
///     .category("armour.gloves");
///
/// let json = serde_json::to_value(&query).unwrap();
/// assert_eq!(json["query"]["status"]["option"], "online");
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct SearchQuery {
    query: QueryBody,
    sort: SortOrder,
}

#[derive(Debug, Clone, Serialize)]
struct QueryBody {
    status: OptionValue,
    stats: Vec<StatGroup>,
    filters: QueryFilters,
}

#[derive(Debug, Clone, Serialize)]
struct OptionValue {
    option: String,
}

#[derive(Debug, Clone, Serialize)]
struct StatGroup {
    #[serde(rename = "type")]
    kind: &'static str,
    filters: Vec<StatFilter>,
    value: MinMax,
    disabled: bool,
}

#[derive(Debug, Clone, Serialize)]
struct StatFilter {
    id: &'static str,
    value: WeightValue,
    disabled: bool,
}

#[derive(Debug, Clone, Serialize)]
struct WeightValue {
    weight: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
struct MinMax {
    #[serde(skip_serializing_if = "Option::is_none")]
    min: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
struct QueryFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    trade_filters: Option<FilterGroup<TradeFilters>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    type_filters: Option<FilterGroup<TypeFilters>>,
}

#[derive(Debug, Clone, Serialize)]
struct FilterGroup<T> {
    filters: T,
}

#[derive(Debug, Clone, Serialize)]
struct TradeFilters {
    price: MinMax,
}

#[derive(Debug, Clone, Serialize)]
struct TypeFilters {
    category: OptionValue,
}

#[derive(Debug, Clone, Serialize)]
struct SortOrder {
    #[serde(rename = "statgroup.0")]
    statgroup: &'static str,
}

impl SearchQuery {
    /// Online listings, sorted by weighted sum, with no weights yet.
    pub fn new() -> Self {
        Self {
            query: QueryBody {
                status: OptionValue {
                    option: "online".to_string(),
                },
                stats: vec![StatGroup {
                    kind: "weight",
                    filters: Vec::new(),
                    value: MinMax {
                        min: Some(1),
                        max: None,
                    },
                    disabled: false,
                }],
                filters: QueryFilters::default(),
            },
            sort: SortOrder { statgroup: "desc" },
        }
    }

    /// Add a stat to the weighted sum.
    pub fn weight(mut self, stat: Stat, weight: f64) -> Self {
        self.query.stats[0].filters.push(StatFilter {
            id: stat.id(),
            value: WeightValue { weight },
            disabled: false,
        });
        self
    }

    /// Only include listings priced at most `max` (in the listing's currency).
    pub fn max_price(mut self, max: u32) -> Self {
        self.query.filters.trade_filters = Some(FilterGroup {
            filters: TradeFilters {
                price: MinMax {
                    min: None,
                    max: Some(max),
                },
            },
        });
        self
    }

    /// Restrict to an item category such as `armour.boots` or `accessory.ring`.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.query.filters.type_filters = Some(FilterGroup {
            filters: TypeFilters {
                category: OptionValue {
                    option: category.into(),
                },
            },
        });
        self
    }

    /// Include offline sellers as well.
    pub fn any_status(mut self) -> Self {
        self.query.status.option = "any".to_string();
        self
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::new()
    }
}
