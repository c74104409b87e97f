//! Renders the collected profile, wardrobe and context into the stylist prompt.
//!
//! Every collected field is rendered. Empty lists get explicit wording instead
//! of an empty join, so the prompt never carries a dangling clause.

use crate::{models::{Context, UserProfile}, wardrobe::WardrobeItem};

pub const STYLIST_SYSTEM_INSTRUCTION: &str = "You are a friendly and stylish AI fashion assistant.";

pub const NO_WARDROBE_ITEMS: &str = "They have no wardrobe items listed currently, so build the outfit from versatile basics.";

fn join_or<T: ToString>(items: &[T], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    }
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

pub fn compose_prompt(profile: &UserProfile, wardrobe: &[WardrobeItem], context: &Context) -> String {
    let name = or_default(&profile.name, "the user");
    let event = or_default(&context.event, "casual day out");
    let place = if profile.location.is_empty() {
        String::new()
    } else {
        format!(" in {}", profile.location)
    };

    let task = format!("You are an AI fashion stylist. Your job is to help {name} pick an outfit for a {event}{place}.");

    let demographics = format!(
        "They are {} years old, {}, {} cm tall, with a {} body type, and usually dress for a {} climate.",
        profile.age, profile.gender, profile.height_cm, profile.body_type, profile.climate
    );

    let style = format!("Their style is {}.", join_or(&profile.style_preferences, "open, with no particular preference"));

    let rain = if context.rain_expected { "Rain is expected." } else { "No rain is expected." };
    let weather = format!("The weather is {}°C in {}. {}", context.temperature_c, context.season, rain);

    let items = if wardrobe.is_empty() {
        NO_WARDROBE_ITEMS.to_string()
    } else {
        format!("They have these wardrobe items: {}.", join_or(wardrobe, ""))
    };

    let closing = if context.shopping_enabled {
        format!(
            "Suggest a stylish outfit using their wardrobe. If any items are missing, recommend 1–2 purchasable pieces from their favorite brands ({}), within their {} budget.",
            join_or(&profile.favorite_brands, "any brand"),
            profile.budget
        )
    } else {
        format!(
            "Suggest a stylish outfit using only their wardrobe. Do not recommend any purchases; their budget is {} and their favorite brands are {}.",
            profile.budget,
            join_or(&profile.favorite_brands, "not specified")
        )
    };

    format!("{task}\n\n{demographics} {style} {weather}\n\n{items}\n\n{closing}\n")
}
