//! Operating prompt construction.
//!
//! The prompt is built once per request from two optional inputs: the
//! user's encyclopedia text and their IANA timezone. Neither input can
//! fail the build: an unknown timezone resolves to UTC, blank knowledge
//! text is treated as absent.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::fallback::Resolved;

/// Long, locale-neutral timestamp, e.g. "April 15, 2023 at 02:30 PM EDT".
const TIMESTAMP_FORMAT: &str = "%B %d, %Y at %I:%M %p %Z";

const PERSONA: &str = "You are Gardenbook's AI gardening assistant. You provide helpful advice about plants, gardening, and plant care.
You have access to a set of tools that can help answer questions about plants in the user's garden.
Always be friendly, helpful, and focus on gardening-related topics.";

/// Request-scoped prompt inputs and the prompt derived from them.
#[derive(Debug, Clone)]
pub struct SessionContext {
    knowledge_text: Option<String>,
    timezone: Tz,
    operating_prompt: String,
}

impl SessionContext {
    /// Build the context against the current wall-clock time.
    pub fn new(knowledge_text: Option<String>, user_timezone: Option<&str>) -> Self {
        Self::at(knowledge_text, user_timezone, Utc::now())
    }

    /// Build the context as of `now`.
    pub fn at(knowledge_text: Option<String>, user_timezone: Option<&str>, now: DateTime<Utc>) -> Self {
        let knowledge_text = knowledge_text.filter(|text| !text.trim().is_empty());

        let resolved = resolve_timezone(user_timezone);
        if let Some(reason) = resolved.reason() {
            warn!("{}; using UTC", reason);
        }
        let timezone = resolved.into_value();

        let operating_prompt = build_operating_prompt(knowledge_text.as_deref(), timezone, now);

        Self {
            knowledge_text,
            timezone,
            operating_prompt,
        }
    }

    pub fn knowledge_text(&self) -> Option<&str> {
        self.knowledge_text.as_deref()
    }

    /// The resolved timezone (UTC when the request's was absent or unknown).
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn operating_prompt(&self) -> &str {
        &self.operating_prompt
    }

    pub fn into_operating_prompt(self) -> String {
        self.operating_prompt
    }
}

/// Resolve an IANA identifier against the timezone database.
pub fn resolve_timezone(requested: Option<&str>) -> Resolved<Tz> {
    match requested.map(str::trim).filter(|name| !name.is_empty()) {
        None => Resolved::Value(Tz::UTC),
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => Resolved::Value(tz),
            Err(_) => Resolved::fallback(Tz::UTC, format!("Unknown timezone '{name}'")),
        },
    }
}

/// Compose the operating prompt for `timezone` as of `now`.
pub fn build_operating_prompt(knowledge_text: Option<&str>, timezone: Tz, now: DateTime<Utc>) -> String {
    let (timestamp, location) = match format_local(now, timezone) {
        Resolved::Value(timestamp) => (timestamp, location_qualifier(timezone)),
        Resolved::Fallback { value, reason } => {
            warn!("{}; reporting time in UTC", reason);
            (value, None)
        }
    };

    let mut prompt = String::with_capacity(PERSONA.len() + 512);
    prompt.push_str(PERSONA);
    prompt.push_str("\n\nCurrent date and time is ");
    prompt.push_str(&timestamp);
    if let Some(location) = location {
        prompt.push_str(" in ");
        prompt.push_str(&location);
    }
    prompt.push('.');

    match knowledge_text.filter(|text| !text.trim().is_empty()) {
        Some(text) => {
            info!("Including encyclopedia data in system prompt");
            prompt.push_str(
                "\n\nUSER'S GARDENING ENCYCLOPEDIA:\n\
                 The following information describes the user's specific gardening context. \
                 Consider this information when providing advice:\n\n",
            );
            prompt.push_str(text);
            prompt.push_str("\n\nAlways tailor your gardening advice to the user's specific context above.");
        }
        None => info!("No encyclopedia data provided, using default system prompt"),
    }

    prompt
}

/// "America/New_York" -> "America/New York"; UTC has no qualifier.
fn location_qualifier(timezone: Tz) -> Option<String> {
    (timezone != Tz::UTC).then(|| timezone.name().replace('_', " "))
}

fn format_local(now: DateTime<Utc>, timezone: Tz) -> Resolved<String> {
    let mut local = String::new();
    if write!(local, "{}", now.with_timezone(&timezone).format(TIMESTAMP_FORMAT)).is_ok() {
        return Resolved::Value(local);
    }

    let reason = format!("Could not format time for {}", timezone.name());
    let mut utc = String::new();
    if write!(utc, "{}", now.format(TIMESTAMP_FORMAT)).is_err() {
        utc = now.to_rfc3339();
    }
    Resolved::fallback(utc, reason)
}
