use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The narrative hook a post is written around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentAngle {
    MajorSpike,
    SignificantSpike,
    NotablePerformance,
    InternationalPhenomenon,
    InternationalAppeal,
    GenreLeader,
    TopPerformer,
    PricingSurge,
    DemandIndicator,
    TourStandout,
    TopPerformance,
    TrendingEvent,
}

impl ContentAngle {
    pub const ALL: [ContentAngle; 12] = [
        ContentAngle::MajorSpike,
        ContentAngle::SignificantSpike,
        ContentAngle::NotablePerformance,
        ContentAngle::InternationalPhenomenon,
        ContentAngle::InternationalAppeal,
        ContentAngle::GenreLeader,
        ContentAngle::TopPerformer,
        ContentAngle::PricingSurge,
        ContentAngle::DemandIndicator,
        ContentAngle::TourStandout,
        ContentAngle::TopPerformance,
        ContentAngle::TrendingEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentAngle::MajorSpike => "major_spike",
            ContentAngle::SignificantSpike => "significant_spike",
            ContentAngle::NotablePerformance => "notable_performance",
            ContentAngle::InternationalPhenomenon => "international_phenomenon",
            ContentAngle::InternationalAppeal => "international_appeal",
            ContentAngle::GenreLeader => "genre_leader",
            ContentAngle::TopPerformer => "top_performer",
            ContentAngle::PricingSurge => "pricing_surge",
            ContentAngle::DemandIndicator => "demand_indicator",
            ContentAngle::TourStandout => "tour_standout",
            ContentAngle::TopPerformance => "top_performance",
            ContentAngle::TrendingEvent => "trending_event",
        }
    }

    /// Upper-case label used in prompt headlines and text reports.
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ").to_uppercase()
    }

    /// Angles that earn the priority boost.
    pub fn is_high_impact(&self) -> bool {
        matches!(
            self,
            ContentAngle::MajorSpike
                | ContentAngle::InternationalPhenomenon
                | ContentAngle::GenreLeader
                | ContentAngle::PricingSurge
        )
    }
}

impl fmt::Display for ContentAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentAngle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ContentAngle::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| format!("unknown content angle '{}'", s))
    }
}
