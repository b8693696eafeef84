use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Artist-name values the warehouse uses for "not classified".
const PLACEHOLDER_NAMES: [&str; 4] = ["", "unknown", "none", "nan"];

/// One entertainment event, joined across the four warehouse views.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub event_name: String,
    pub artist_name: String,
    pub classified_artist_name: String,
    pub genre: String,
    pub subgenre: String,
    pub venue_city: String,
    pub venue_country: String,
    pub event_date: String,
    /// Recent GMS rank, 1 is best; 0 when the base view has none.
    pub rank: u32,

    pub total_gms: f64,
    pub recent_7d_gms: f64,
    pub total_tickets: i64,
    pub avg_ticket_cost: f64,
    pub gms_per_ticket: f64,
    /// 0-100
    pub international_pct: f64,
    pub sales_window_days: i64,

    pub career: Option<CareerContext>,
    pub tour: Option<TourContext>,
    pub genre_context: Option<GenreContext>,
    pub trend: Option<TrendInsights>,
    pub geography: Option<GeographicInsights>,
    pub pricing: Option<PricingInsights>,
    pub market: Option<MarketPosition>,

    pub completeness: DataCompleteness,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CareerContext {
    pub vs_career_avg_multiple: f64,
    pub vs_career_best_ratio: f64,
    pub career_total_events: i64,
    pub career_first_year: i64,
    pub career_last_year: i64,
    pub career_total_gms: f64,
    pub career_best_event_gms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TourContext {
    pub tour_name: Option<String>,
    pub vs_tour_avg_multiple: f64,
    pub tour_total_events: i64,
    pub tour_total_gms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenreContext {
    pub vs_genre_avg_multiple: f64,
    pub genre_percentile_bucket: Option<String>,
    pub vs_ytd_avg_multiple: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendInsights {
    pub gms_multiple: f64,
    pub is_gms_spike: bool,
    pub performance_category: String,
    /// 0-100
    pub price_appreciation_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuyerCountry {
    pub country: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeographicInsights {
    pub top_buyer_countries: Vec<BuyerCountry>,
    pub unique_buyer_countries: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingInsights {
    pub lifetime_avg_cost: f64,
    pub min_ticket_cost: f64,
    pub max_ticket_cost: f64,
    pub recent_7d_avg_cost: f64,
    pub prior_23d_avg_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketPosition {
    pub ytd_overall_rank: Option<u32>,
    pub ytd_genre_rank: Option<u32>,
    pub ytd_overall_tier: Option<String>,
    pub ytd_genre_tier: Option<String>,
    pub last_7d_market_share_pct: f64,
    pub ytd_market_share_pct: f64,
    pub premium_multiple: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataCompleteness {
    pub has_historical_context: bool,
    pub has_trend_analysis: bool,
    pub has_market_positioning: bool,
    /// Share of supplementary views that matched, 0.0-1.0.
    pub score: f64,
}

impl DataCompleteness {
    pub fn new(historical: bool, trend: bool, market: bool) -> Self {
        let matched = [historical, trend, market].iter().filter(|m| **m).count();
        Self {
            has_historical_context: historical,
            has_trend_analysis: trend,
            has_market_positioning: market,
            score: matched as f64 / 3.0,
        }
    }
}

impl Event {
    /// Classified artist name, falling back to the category name when the
    /// classifier left a placeholder.
    pub fn display_artist(&self) -> &str {
        let classified = self.classified_artist_name.trim();
        if PLACEHOLDER_NAMES.contains(&classified.to_ascii_lowercase().as_str()) {
            &self.artist_name
        } else {
            &self.classified_artist_name
        }
    }

    /// True when any of id, classified artist, total GMS or 7-day GMS is
    /// empty or zero.
    pub fn missing_required_fields(&self) -> bool {
        self.event_id.trim().is_empty()
            || self.classified_artist_name.trim().is_empty()
            || self.total_gms == 0.0
            || self.recent_7d_gms == 0.0
    }

    pub fn location(&self) -> String {
        format!("{}, {}", self.venue_city, self.venue_country)
    }

    pub fn career_multiple(&self) -> f64 {
        self.career
            .as_ref()
            .map(|c| c.vs_career_avg_multiple)
            .unwrap_or(0.0)
    }

    pub fn genre_rank(&self) -> Option<u32> {
        self.market.as_ref().and_then(|m| m.ytd_genre_rank)
    }

    pub fn overall_rank(&self) -> Option<u32> {
        self.market.as_ref().and_then(|m| m.ytd_overall_rank)
    }

    pub fn price_appreciation_pct(&self) -> f64 {
        self.trend
            .as_ref()
            .map(|t| t.price_appreciation_pct)
            .unwrap_or(0.0)
    }

    pub fn performance_category(&self) -> &str {
        self.trend
            .as_ref()
            .map(|t| t.performance_category.as_str())
            .unwrap_or("Normal")
    }

    pub fn tour_name(&self) -> Option<&str> {
        self.tour
            .as_ref()
            .and_then(|t| t.tour_name.as_deref())
            .filter(|n| !n.trim().is_empty())
    }

    pub fn tour_multiple(&self) -> f64 {
        self.tour
            .as_ref()
            .map(|t| t.vs_tour_avg_multiple)
            .unwrap_or(0.0)
    }

    pub fn top_countries(&self) -> &[BuyerCountry] {
        self.geography
            .as_ref()
            .map(|g| g.top_buyer_countries.as_slice())
            .unwrap_or(&[])
    }
}
