//! Angle selection and priority scoring.

use crate::models::{ContentAngle, Event};

/// Genre rank used when the market view has no rank for the event.
const UNRANKED: u32 = 999;

/// Every angle the event qualifies for, strongest signal first, capped at `limit`.
///
/// Events that trip no threshold still get one generic angle so that every
/// event can be written about.
pub fn identify_angles(event: &Event, limit: usize) -> Vec<ContentAngle> {
    let mut angles = Vec::new();

    let career = event.career_multiple();
    if career >= 5.0 {
        angles.push(ContentAngle::MajorSpike);
    } else if career >= 3.0 {
        angles.push(ContentAngle::SignificantSpike);
    } else if career >= 2.0 {
        angles.push(ContentAngle::NotablePerformance);
    }

    if event.international_pct > 40.0 {
        angles.push(ContentAngle::InternationalPhenomenon);
    } else if event.international_pct > 25.0 {
        angles.push(ContentAngle::InternationalAppeal);
    }

    let genre_rank = event.genre_rank().unwrap_or(UNRANKED);
    if genre_rank <= 3 {
        angles.push(ContentAngle::GenreLeader);
    } else if genre_rank <= 10 {
        angles.push(ContentAngle::TopPerformer);
    }

    let appreciation = event.price_appreciation_pct();
    if appreciation > 30.0 {
        angles.push(ContentAngle::PricingSurge);
    } else if appreciation > 15.0 {
        angles.push(ContentAngle::DemandIndicator);
    }

    if event.tour_name().is_some() && event.tour_multiple() > 1.5 {
        angles.push(ContentAngle::TourStandout);
    }

    if angles.is_empty() {
        angles.push(if (1..=5).contains(&event.rank) {
            ContentAngle::TopPerformance
        } else {
            ContentAngle::TrendingEvent
        });
    }

    angles.truncate(limit);
    angles
}

/// The single angle used when a selection does not pin one.
pub fn primary_angle(event: &Event) -> ContentAngle {
    identify_angles(event, 1)
        .into_iter()
        .next()
        .unwrap_or(ContentAngle::TrendingEvent)
}

/// Posting priority 1-10 for writing about `event` from `angle`.
pub fn content_priority(event: &Event, angle: ContentAngle) -> u8 {
    let mut priority: u8 = 5;

    priority += match event.rank {
        1..=3 => 3,
        4..=5 => 2,
        6..=10 => 1,
        _ => 0,
    };

    if angle.is_high_impact() {
        priority += 2;
    }

    if event.completeness.score >= 0.8 {
        priority += 1;
    }

    let career = event.career_multiple();
    if career >= 5.0 {
        priority += 2;
    } else if career >= 3.0 {
        priority += 1;
    }

    priority.min(10)
}
