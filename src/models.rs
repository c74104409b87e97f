use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::session::Session;

pub const AGE_RANGE: (u8, u8) = (18, 60);
pub const HEIGHT_RANGE_CM: (u16, u16) = (140, 200);
pub const TEMPERATURE_RANGE_C: (i8, i8) = (0, 40);

pub const DEFAULT_WARDROBE_TEXT: &str = "white cropped blouse, high-waisted black jeans, oversized beige blazer, white sneakers, black ankle boots, cream knit sweater";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FormError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange { field: &'static str, min: i64, max: i64, value: i64 },
}

// Enumerated widget options. Serialized with the labels the form shows.
macro_rules! labelled_enum {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $( #[serde(rename = $label)] $variant, )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self { $( $name::$variant => $label, )+ }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
        }
    };
}

labelled_enum!(Gender { Female => "female", Male => "male", NonBinary => "non-binary" });
labelled_enum!(BodyType {
    Hourglass => "hourglass",
    Pear => "pear",
    Rectangle => "rectangle",
    Athletic => "athletic",
    InvertedTriangle => "inverted triangle",
});
labelled_enum!(StyleTag {
    Casual => "casual",
    Chic => "chic",
    Boho => "boho",
    Streetwear => "streetwear",
    Minimalist => "minimalist",
    Parisian => "Parisian",
    Edgy => "edgy",
    Elegant => "elegant",
});
labelled_enum!(Climate { Hot => "hot", Mild => "mild", Cold => "cold" });
labelled_enum!(Budget { Low => "low", Mid => "mid", High => "high" });
labelled_enum!(Brand { Zara => "Zara", Arket => "Arket", Mango => "Mango", Cos => "COS", HAndM => "H&M" });
labelled_enum!(Season { Spring => "spring", Summer => "summer", Fall => "fall", Winter => "winter" });

/// Static attributes of the person being styled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserProfile {
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub height_cm: u16,
    pub body_type: BodyType,
    pub style_preferences: Vec<StyleTag>,
    pub climate: Climate,
    pub location: String,
    pub budget: Budget,
    pub favorite_brands: Vec<Brand>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            name: "Sofia".into(),
            age: 28,
            gender: Gender::Female,
            height_cm: 168,
            body_type: BodyType::Hourglass,
            style_preferences: vec![StyleTag::Chic, StyleTag::Casual, StyleTag::Parisian],
            climate: Climate::Hot,
            location: "Barcelona".into(),
            budget: Budget::Low,
            favorite_brands: vec![Brand::Zara, Brand::Arket, Brand::Mango],
        }
    }
}

impl UserProfile {
    /// Applies the widget bounds and collapses repeated tags; tag order is not significant.
    pub fn collect(mut self) -> Result<Self, FormError> {
        check_range("age", self.age as i64, AGE_RANGE.0 as i64, AGE_RANGE.1 as i64)?;
        check_range("height_cm", self.height_cm as i64, HEIGHT_RANGE_CM.0 as i64, HEIGHT_RANGE_CM.1 as i64)?;
        self.name = self.name.trim().to_string();
        self.location = self.location.trim().to_string();
        dedup_keep_order(&mut self.style_preferences);
        dedup_keep_order(&mut self.favorite_brands);
        Ok(self)
    }
}

/// Situational inputs as submitted by the form. The language flag is optional
/// so a submission without it falls back to the session toggle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextForm {
    pub event: String,
    pub season: Season,
    pub temperature_c: i8,
    pub rain_expected: bool,
    pub shopping_enabled: bool,
    pub show_in_georgian: Option<bool>,
}

impl Default for ContextForm {
    fn default() -> Self {
        Self {
            event: "coffee date".into(),
            season: Season::Spring,
            temperature_c: 20,
            rain_expected: false,
            shopping_enabled: true,
            show_in_georgian: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Context {
    pub event: String,
    pub season: Season,
    pub temperature_c: i8,
    pub rain_expected: bool,
    pub shopping_enabled: bool,
    pub show_in_georgian: bool,
}

impl ContextForm {
    /// Bounds-checks the form and resolves the language flag against the session:
    /// an explicit flag updates the session toggle, an absent one reads it.
    pub fn collect(self, session: &mut Session) -> Result<Context, FormError> {
        check_range(
            "temperature_c",
            self.temperature_c as i64,
            TEMPERATURE_RANGE_C.0 as i64,
            TEMPERATURE_RANGE_C.1 as i64,
        )?;
        if let Some(flag) = self.show_in_georgian {
            session.set_show_in_georgian(flag);
        }
        Ok(Context {
            event: self.event.trim().to_string(),
            season: self.season,
            temperature_c: self.temperature_c,
            rain_expected: self.rain_expected,
            shopping_enabled: self.shopping_enabled,
            show_in_georgian: session.show_in_georgian(),
        })
    }
}

pub(crate) fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<(), FormError> {
    if value < min || value > max {
        return Err(FormError::OutOfRange { field, min, max, value });
    }
    Ok(())
}

fn dedup_keep_order<T: PartialEq + Copy>(items: &mut Vec<T>) {
    let mut seen: Vec<T> = Vec::with_capacity(items.len());
    items.retain(|item| {
        if seen.contains(item) { false } else { seen.push(*item); true }
    });
}

// --- HTTP payloads ---

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OutfitRequest {
    pub profile: UserProfile,
    pub wardrobe_text: Option<String>,
    pub context: ContextForm,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub data_base64: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadImagesRequest {
    pub images: Vec<ImageUpload>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EditTagRequest {
    pub tag: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ConfirmTagRequest {
    pub tag: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LanguageToggle {
    pub show_in_georgian: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionCreated {
    pub id: Uuid,
    pub show_in_georgian: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone)]
pub struct FieldOptions {
    pub genders: &'static [Gender],
    pub body_types: &'static [BodyType],
    pub style_tags: &'static [StyleTag],
    pub climates: &'static [Climate],
    pub budgets: &'static [Budget],
    pub brands: &'static [Brand],
    pub seasons: &'static [Season],
    pub age_range: (u8, u8),
    pub height_range_cm: (u16, u16),
    pub temperature_range_c: (i8, i8),
}

#[derive(Debug, Serialize, Clone)]
pub struct FormDefaults {
    pub profile: UserProfile,
    pub wardrobe_text: &'static str,
    pub context: ContextForm,
    pub options: FieldOptions,
}

impl FormDefaults {
    pub fn new() -> Self {
        Self {
            profile: UserProfile::default(),
            wardrobe_text: DEFAULT_WARDROBE_TEXT,
            context: ContextForm::default(),
            options: FieldOptions {
                genders: Gender::ALL,
                body_types: BodyType::ALL,
                style_tags: StyleTag::ALL,
                climates: Climate::ALL,
                budgets: Budget::ALL,
                brands: Brand::ALL,
                seasons: Season::ALL,
                age_range: AGE_RANGE,
                height_range_cm: HEIGHT_RANGE_CM,
                temperature_range_c: TEMPERATURE_RANGE_C,
            },
        }
    }
}
