pub mod angle;
pub mod content;
pub mod event;
pub mod platform;

pub use angle::ContentAngle;
pub use content::{
    EventMetrics, GeneratedPost, GenerationOutcome, GenerationRequest, GenerationResult,
};
pub use event::{
    BuyerCountry, CareerContext, DataCompleteness, Event, GenreContext, GeographicInsights,
    MarketPosition, PricingInsights, TourContext, TrendInsights,
};
pub use platform::{Platform, UnknownPlatform};
