//! Joins the four view snapshots into `Event`s.
//!
//! One event per base-view row, in base-view order. Supplementary rows are
//! matched on `event_id`; a missing match leaves the corresponding context
//! block empty and lowers the completeness score. Warehouse fractions
//! (international share, price appreciation, buyer-country and market
//! shares) are scaled to percentages here.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;

use crate::loader::ViewSnapshot;
use crate::models::{
    BuyerCountry, CareerContext, DataCompleteness, Event, GenreContext, GeographicInsights,
    MarketPosition, PricingInsights, TourContext, TrendInsights,
};
use crate::warehouse::{Row, ViewKind};

const TOP_BUYER_COUNTRY_SLOTS: usize = 3;

pub fn structure_events(snapshot: &ViewSnapshot) -> Vec<Event> {
    let hist = index_by_event_id(snapshot.rows(ViewKind::HistoricalContext));
    let trend = index_by_event_id(snapshot.rows(ViewKind::TrendAnalysis));
    let market = index_by_event_id(snapshot.rows(ViewKind::MarketRankings));

    let events: Vec<Event> = snapshot
        .rows(ViewKind::BaseEvents)
        .iter()
        .filter_map(|base| {
            let id = event_key(base)?;
            Some(build_event(
                base,
                hist.get(&id).copied(),
                trend.get(&id).copied(),
                market.get(&id).copied(),
            ))
        })
        .collect();

    tracing::debug!(events = events.len(), "Structured events from views");
    events
}

fn index_by_event_id(rows: &[Row]) -> HashMap<String, &Row> {
    let mut index = HashMap::with_capacity(rows.len());
    for row in rows {
        if let Some(id) = event_key(row) {
            // first row wins, matching the rank ordering of the view
            index.entry(id).or_insert(row);
        }
    }
    index
}

fn event_key(row: &Row) -> Option<String> {
    match row.get("event_id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn build_event(base: &Row, hist: Option<&Row>, trend: Option<&Row>, market: Option<&Row>) -> Event {
    let artist_name = text_or(base, "event_category_name", "Unknown");
    let classified = opt_text(base, "classified_artist_name").unwrap_or_else(|| artist_name.clone());

    Event {
        event_id: event_key(base).unwrap_or_default(),
        event_name: text(base, "event_name"),
        artist_name,
        classified_artist_name: classified,
        genre: text(base, "event_parent_category_name"),
        subgenre: text(base, "subgenre"),
        venue_city: text(base, "venue_city"),
        venue_country: text(base, "venue_country_name"),
        event_date: text(base, "event_date"),
        rank: rank(base, "recent_gms_rank").unwrap_or(0),

        total_gms: float(base, "total_gms"),
        recent_7d_gms: float(base, "recent_7d_gms"),
        total_tickets: int(base, "total_tickets_sold"),
        avg_ticket_cost: float(base, "avg_ticket_cost"),
        gms_per_ticket: float(base, "gms_per_ticket"),
        international_pct: float(base, "international_gms_pct") * 100.0,
        sales_window_days: int(base, "total_sales_window_days"),

        career: hist.map(career_context),
        tour: hist.map(tour_context),
        genre_context: hist.map(genre_context),
        trend: trend.map(trend_insights),
        geography: trend.map(geographic_insights),
        pricing: trend.map(pricing_insights),
        market: market.map(market_position),

        completeness: DataCompleteness::new(hist.is_some(), trend.is_some(), market.is_some()),
        fetched_at: Utc::now(),
    }
}

fn career_context(row: &Row) -> CareerContext {
    CareerContext {
        vs_career_avg_multiple: float(row, "vs_career_avg_multiple"),
        vs_career_best_ratio: float(row, "vs_career_best_ratio"),
        career_total_events: int(row, "career_total_events"),
        career_first_year: int(row, "career_first_year"),
        career_last_year: int(row, "career_last_year"),
        career_total_gms: float(row, "career_total_gms"),
        career_best_event_gms: float(row, "career_best_event_gms"),
    }
}

fn tour_context(row: &Row) -> TourContext {
    TourContext {
        tour_name: opt_text(row, "tour_name"),
        vs_tour_avg_multiple: float(row, "vs_tour_avg_multiple"),
        tour_total_events: int(row, "tour_total_events"),
        tour_total_gms: float(row, "tour_total_gms"),
    }
}

fn genre_context(row: &Row) -> GenreContext {
    GenreContext {
        vs_genre_avg_multiple: float(row, "vs_genre_avg_multiple"),
        genre_percentile_bucket: opt_text(row, "genre_percentile_bucket"),
        vs_ytd_avg_multiple: float(row, "vs_ytd_avg_multiple"),
    }
}

fn trend_insights(row: &Row) -> TrendInsights {
    TrendInsights {
        gms_multiple: float(row, "gms_multiple"),
        is_gms_spike: boolean(row, "is_gms_spike"),
        performance_category: text_or(row, "performance_category", "Normal"),
        price_appreciation_pct: float(row, "price_appreciation_pct") * 100.0,
    }
}

fn geographic_insights(row: &Row) -> GeographicInsights {
    let top_buyer_countries = (1..=TOP_BUYER_COUNTRY_SLOTS)
        .filter_map(|slot| {
            let country = opt_text(row, &format!("top_buyer_country_{}", slot))?;
            let pct_key = format!("top_buyer_country_{}_pct", slot);
            if is_null(row, &pct_key) {
                return None;
            }
            Some(BuyerCountry {
                country,
                percentage: float(row, &pct_key) * 100.0,
            })
        })
        .collect();

    GeographicInsights {
        top_buyer_countries,
        unique_buyer_countries: int(row, "unique_buyer_countries"),
    }
}

fn pricing_insights(row: &Row) -> PricingInsights {
    PricingInsights {
        lifetime_avg_cost: float(row, "lifetime_avg_ticket_cost"),
        min_ticket_cost: float(row, "min_ticket_cost"),
        max_ticket_cost: float(row, "max_ticket_cost"),
        recent_7d_avg_cost: float(row, "recent_7d_avg_cost"),
        prior_23d_avg_cost: float(row, "prior_23d_avg_cost"),
    }
}

fn market_position(row: &Row) -> MarketPosition {
    MarketPosition {
        ytd_overall_rank: rank(row, "ytd_overall_rank"),
        ytd_genre_rank: rank(row, "ytd_genre_rank"),
        ytd_overall_tier: opt_text(row, "ytd_overall_tier"),
        ytd_genre_tier: opt_text(row, "ytd_genre_tier"),
        last_7d_market_share_pct: float(row, "last_7d_market_share_pct") * 100.0,
        ytd_market_share_pct: float(row, "ytd_market_share_pct") * 100.0,
        premium_multiple: float(row, "premium_multiple"),
    }
}

// ============================================================================
// Safe column accessors
// ============================================================================

fn is_null(row: &Row, col: &str) -> bool {
    matches!(row.get(col), None | Some(Value::Null))
}

/// Numeric column as f64; null, missing or unparsable values become 0.0.
fn float(row: &Row, col: &str) -> f64 {
    let value = match row.get(col) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => return 0.0,
    };
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Integer column; fractional values are truncated.
fn int(row: &Row, col: &str) -> i64 {
    match row.get(col) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Positive rank, or `None` when the column is missing, null or zero.
fn rank(row: &Row, col: &str) -> Option<u32> {
    u32::try_from(int(row, col)).ok().filter(|r| *r > 0)
}

fn boolean(row: &Row, col: &str) -> bool {
    match row.get(col) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "t" | "1" | "yes"),
        _ => false,
    }
}

fn text(row: &Row, col: &str) -> String {
    opt_text(row, col).unwrap_or_default()
}

fn text_or(row: &Row, col: &str, default: &str) -> String {
    opt_text(row, col).unwrap_or_else(|| default.to_string())
}

/// Non-empty text (numbers are stringified); `None` for null/blank.
fn opt_text(row: &Row, col: &str) -> Option<String> {
    match row.get(col)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
