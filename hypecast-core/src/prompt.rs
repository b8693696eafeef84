//! Prompt assembly for the content client.
//!
//! Templates are plain strings with `{placeholder}` fields. `{{` and `}}`
//! produce literal braces. Every angle has a built-in template; callers can
//! replace any of them per angle.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use thiserror::Error;

use crate::models::{ContentAngle, Event, GenerationRequest, Platform};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("Unknown template placeholder '{{{0}}}'")]
    UnknownPlaceholder(String),

    #[error("Unterminated '{{' at byte {position}")]
    Unterminated { position: usize },
}

/// Placeholder names every template may use.
pub const PLACEHOLDERS: [&str; 18] = [
    "platform",
    "artist",
    "event_name",
    "location",
    "genre",
    "rank",
    "international_pct",
    "career_multiple",
    "genre_rank",
    "overall_rank",
    "tour_name",
    "tour_multiple",
    "price_appreciation_pct",
    "top_countries",
    "fandom_hint",
    "angle_label",
    "intensity",
    "performance_category",
];

const BASE_SYSTEM_PROMPT: &str = "\
You are a Gen Z social media expert creating viral content for live events and entertainment.
Your content should be data-driven but never boring, optimized for discovery, and designed to make people stop scrolling.

CRITICAL RULES:
1. NEVER share actual dollar amounts or GMS numbers - use relative terms like \"massive surge\" or \"top performer\"
2. Always provide TWO separate outputs: VISUAL TEXT and CAPTION
3. Write like Gen Z (but not cringe) - authentic, direct, no millennial energy
4. Front-load artist/team names for SEO and discovery";

const TIKTOK_BLOCK: &str = "\
For TikTok:
- VISUAL TEXT: Hook them in 3 seconds. Bold claims, clear data points, fandom-specific language when relevant
- CAPTION: Artist/team name upfront, trending keywords, context that drives engagement
- Think viral potential - what would make someone duet or stitch this?";

const INSTAGRAM_BLOCK: &str = "\
For Instagram:
- VISUAL TEXT: Punchy, data-forward, shareable. Think billboard text - immediate impact, no context needed
- CAPTION: Keyword-optimized, artist name first, context for fans, discovery-friendly hashtags
- Make it something fans want to repost to their Stories with their own reaction";

const TWITTER_BLOCK: &str = "\
For Twitter:
- VISUAL TEXT: Tweet-length, concise but impactful
- CAPTION: Extended context, hashtags, threading potential";

const SPIKE_TEMPLATE: &str = "\
Create viral {platform} content about this {intensity} performance spike. Remember: NO dollar amounts!

EVENT: {artist} - {event_name} in {location}
KEY INSIGHT: Performing {career_multiple}x above career average
SUPPORTING DATA: {international_pct}% international buyers, #{rank} trending this week

{fandom_hint}

VISUAL TEXT (for the asset):
- Keep it under 15 words max
- Lead with the shocking stat
- No context needed - pure data impact
- Example style: \"{artist} {location} show BREAKS CAREER RECORDS\"

CAPTION (for discovery):
- Start with \"{artist}\" for SEO
- Include city/venue names early
- Use terms like \"demand surge\" instead of dollar amounts
- End with an engaging question or call-out
- Include relevant hashtags";

const INTERNATIONAL_TEMPLATE: &str = "\
Create viral {platform} content about this event's {intensity} international pull. NO dollar amounts!

EVENT: {artist} in {location}
KEY INSIGHT: {international_pct}% international buyers - people are flying in for this
TOP COUNTRIES: {top_countries}

VISUAL TEXT (for the asset):
- Under 15 words
- Lead with the percentage
- Make the travel angle clear

CAPTION (for discovery):
- Start with \"{artist}\"
- Emphasize the global travel story and name specific countries
- Use phrases like \"global phenomenon\" or \"international demand\"
- Ask fans about their concert travel stories
- Include location and travel-related hashtags";

const GENRE_TEMPLATE: &str = "\
Create viral {platform} content celebrating this artist as a {angle_label} in {genre}. NO dollar amounts!

EVENT: {artist} - {event_name} in {location}
KEY INSIGHT: #{genre_rank} in {genre} this year, #{overall_rank} overall

{fandom_hint}

VISUAL TEXT (for the asset):
- Under 15 words
- Lead with their dominance and make the achievement clear
- Example: \"{artist} is the #{genre_rank} {genre} act of the year\"

CAPTION (for discovery):
- Start with \"{artist}\"
- Use power words: dominating, crushing, leading
- Celebrate the fanbase and ask fans to show their support
- Include genre and achievement hashtags";

const PRICING_TEMPLATE: &str = "\
Create {platform} content about this {intensity} in demand for {artist}. NO dollar amounts!

EVENT: {artist} - {event_name} in {location}
KEY INSIGHT: Ticket prices up {price_appreciation_pct}% in recent weeks
SUPPORTING DATA: {international_pct}% international buyers, {career_multiple}x career average

VISUAL TEXT (for the asset):
- Under 15 words
- Frame rising prices as proof of demand

CAPTION (for discovery):
- Start with \"{artist}\"
- Explain what this signals about fan enthusiasm
- Avoid being sales-y or promotional
- Include relevant hashtags";

const TOUR_TEMPLATE: &str = "\
Create viral {platform} content about this standout tour stop. NO dollar amounts!

EVENT: {artist} - {event_name} in {location}
KEY INSIGHT: {tour_multiple}x above the {tour_name} average
SUPPORTING DATA: {international_pct}% international buyers, #{rank} this week

VISUAL TEXT (for the asset):
- Under 15 words
- Make it clear why this stop is special

CAPTION (for discovery):
- Start with \"{artist}\"
- Compare to other stops on the tour
- Ask fans about their favorite tour stops
- Include tour and city hashtags";

const GENERAL_TEMPLATE: &str = "\
Create viral {platform} content about this {angle_label} event. Remember: NO dollar amounts!

EVENT: {artist} - {event_name} in {location}
KEY INSIGHT: Trending #{rank} this week, {performance_category} performance
SUPPORTING DATA: {international_pct}% international buyers, {genre}

{fandom_hint}

VISUAL TEXT (for the asset):
- Under 15 words
- Highlight what makes this event notable

CAPTION (for discovery):
- Start with \"{artist}\"
- Appeal to both fans and industry watchers
- Create interest without overhyping
- End with a question for engagement";

/// Built-in template for `angle`.
pub fn builtin_template(angle: ContentAngle) -> &'static str {
    match angle {
        ContentAngle::MajorSpike
        | ContentAngle::SignificantSpike
        | ContentAngle::NotablePerformance => SPIKE_TEMPLATE,
        ContentAngle::InternationalPhenomenon | ContentAngle::InternationalAppeal => {
            INTERNATIONAL_TEMPLATE
        }
        ContentAngle::GenreLeader | ContentAngle::TopPerformer => GENRE_TEMPLATE,
        ContentAngle::PricingSurge | ContentAngle::DemandIndicator => PRICING_TEMPLATE,
        ContentAngle::TourStandout => TOUR_TEMPLATE,
        ContentAngle::TopPerformance | ContentAngle::TrendingEvent => GENERAL_TEMPLATE,
    }
}

/// Platform system prompt: shared rules plus the platform's format block.
pub fn system_prompt(platform: Platform) -> String {
    let block = match platform {
        Platform::TikTok => TIKTOK_BLOCK,
        Platform::Instagram => INSTAGRAM_BLOCK,
        Platform::Twitter => TWITTER_BLOCK,
    };
    format!("{}\n\n{}", BASE_SYSTEM_PROMPT, block)
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    custom: HashMap<ContentAngle, String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the built-in template for `angle`. The template is checked
    /// for unknown placeholders and unbalanced braces up front.
    pub fn with_template(
        mut self,
        angle: ContentAngle,
        template: impl Into<String>,
    ) -> Result<Self, PromptError> {
        self.set_template(angle, template)?;
        Ok(self)
    }

    pub fn set_template(
        &mut self,
        angle: ContentAngle,
        template: impl Into<String>,
    ) -> Result<(), PromptError> {
        let template = template.into();
        validate_template(&template)?;
        self.custom.insert(angle, template);
        Ok(())
    }

    pub fn template_for(&self, angle: ContentAngle) -> &str {
        self.custom
            .get(&angle)
            .map(String::as_str)
            .unwrap_or_else(|| builtin_template(angle))
    }

    /// Stable-per-process hash of the active template, used in cache keys so
    /// an edited template never serves content written for the old one.
    pub fn fingerprint(&self, angle: ContentAngle) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.template_for(angle).hash(&mut hasher);
        hasher.finish()
    }

    pub fn build(
        &self,
        event: &Event,
        platform: Platform,
        angle: ContentAngle,
    ) -> Result<GenerationRequest, PromptError> {
        let fields = prompt_fields(event, platform, angle);
        let user_prompt = render_template(self.template_for(angle), &fields)?;

        Ok(GenerationRequest {
            event_id: event.event_id.clone(),
            platform,
            angle,
            system_prompt: system_prompt(platform),
            user_prompt: user_prompt.trim().to_string(),
        })
    }
}

/// Check a template against the known placeholder set without an event.
pub fn validate_template(template: &str) -> Result<(), PromptError> {
    let fields: BTreeMap<&str, String> = PLACEHOLDERS
        .iter()
        .map(|name| (*name, String::new()))
        .collect();
    render_template(template, &fields).map(|_| ())
}

/// Substitute `{name}` fields. Unknown names and an unclosed `{` are errors;
/// a lone `}` is kept as-is.
pub fn render_template(
    template: &str,
    fields: &BTreeMap<&str, String>,
) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;
    let mut offset = 0;

    while let Some(idx) = rest.find(['{', '}']) {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            offset += idx + 2;
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            offset += idx + 2;
        } else if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            offset += idx + 1;
        } else {
            let close = tail.find('}').ok_or(PromptError::Unterminated {
                position: offset + idx,
            })?;
            let name = tail[1..close].trim();
            let value = fields
                .get(name)
                .ok_or_else(|| PromptError::UnknownPlaceholder(name.to_string()))?;
            out.push_str(value);
            rest = &tail[close + 1..];
            offset += idx + close + 1;
        }
    }

    out.push_str(rest);
    Ok(out)
}

fn prompt_fields(event: &Event, platform: Platform, angle: ContentAngle) -> BTreeMap<&'static str, String> {
    let rank_or_na = |rank: Option<u32>| rank.map(|r| r.to_string()).unwrap_or_else(|| "N/A".to_string());

    let top_countries = event
        .top_countries()
        .iter()
        .take(3)
        .map(|c| format!("{} ({:.0}%)", c.country, c.percentage))
        .collect::<Vec<_>>()
        .join(", ");

    let mut fields = BTreeMap::new();
    fields.insert("platform", platform.display_name().to_string());
    fields.insert("artist", event.display_artist().to_string());
    fields.insert("event_name", event.event_name.clone());
    fields.insert("location", event.location());
    fields.insert("genre", event.genre.clone());
    fields.insert("rank", event.rank.to_string());
    fields.insert("international_pct", format!("{:.0}", event.international_pct));
    fields.insert("career_multiple", format!("{:.1}", event.career_multiple()));
    fields.insert("genre_rank", rank_or_na(event.genre_rank()));
    fields.insert("overall_rank", rank_or_na(event.overall_rank()));
    fields.insert(
        "tour_name",
        event.tour_name().unwrap_or("current tour").to_string(),
    );
    fields.insert("tour_multiple", format!("{:.1}", event.tour_multiple()));
    fields.insert(
        "price_appreciation_pct",
        format!("{:.0}", event.price_appreciation_pct()),
    );
    fields.insert(
        "top_countries",
        if top_countries.is_empty() {
            "not available".to_string()
        } else {
            top_countries
        },
    );
    fields.insert("fandom_hint", fandom_hint(&event.genre).to_string());
    fields.insert("angle_label", angle.label().to_string());
    fields.insert("intensity", intensity(angle).to_string());
    fields.insert(
        "performance_category",
        event.performance_category().to_string(),
    );
    fields
}

fn fandom_hint(genre: &str) -> &'static str {
    let genre = genre.to_ascii_lowercase();
    if genre.contains("hip hop") || genre.contains("rap") {
        "Consider adding hip-hop culture references if relevant."
    } else if genre.contains("rock") || genre.contains("metal") {
        "Consider rock/metal culture references if relevant."
    } else if genre.contains("country") {
        "Consider country music culture references if relevant."
    } else {
        ""
    }
}

fn intensity(angle: ContentAngle) -> &'static str {
    match angle {
        ContentAngle::MajorSpike => "MASSIVE",
        ContentAngle::SignificantSpike => "SIGNIFICANT",
        ContentAngle::NotablePerformance => "NOTABLE",
        ContentAngle::InternationalPhenomenon => "INSANE",
        ContentAngle::InternationalAppeal => "strong",
        ContentAngle::PricingSurge => "surge",
        ContentAngle::DemandIndicator => "steady rise",
        _ => "",
    }
}
