use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

// --- Routes ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdministrationRoute {
    Oral,
    Sublingual,
    Buccal,
    Insufflated,
    Rectal,
    Transdermal,
    Subcutaneous,
    Intramuscular,
    Intravenous,
    Smoked,
    Inhaled,
}

impl AdministrationRoute {
    pub const ALL: &'static [AdministrationRoute] = &[
        Self::Oral,
        Self::Sublingual,
        Self::Buccal,
        Self::Insufflated,
        Self::Rectal,
        Self::Transdermal,
        Self::Subcutaneous,
        Self::Intramuscular,
        Self::Intravenous,
        Self::Smoked,
        Self::Inhaled,
    ];

    #[must_use]
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Oral => "ORAL",
            Self::Sublingual => "SUBLINGUAL",
            Self::Buccal => "BUCCAL",
            Self::Insufflated => "INSUFFLATED",
            Self::Rectal => "RECTAL",
            Self::Transdermal => "TRANSDERMAL",
            Self::Subcutaneous => "SUBCUTANEOUS",
            Self::Intramuscular => "INTRAMUSCULAR",
            Self::Intravenous => "INTRAVENOUS",
            Self::Smoked => "SMOKED",
            Self::Inhaled => "INHALED",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Oral => "oral",
            Self::Sublingual => "sublingual",
            Self::Buccal => "buccal",
            Self::Insufflated => "insufflated",
            Self::Rectal => "rectal",
            Self::Transdermal => "transdermal",
            Self::Subcutaneous => "subcutaneous",
            Self::Intramuscular => "intramuscular",
            Self::Intravenous => "intravenous",
            Self::Smoked => "smoked",
            Self::Inhaled => "inhaled",
        }
    }
}

impl fmt::Display for AdministrationRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for AdministrationRoute {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.display_name() == lower)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|r| r.display_name()).collect();
                anyhow::anyhow!(
                    "Invalid route '{s}'. Must be one of: {}",
                    names.join(", ")
                )
            })
    }
}

// --- Colors ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredefinedColor {
    Red,
    Orange,
    Yellow,
    Green,
    Mint,
    Teal,
    Cyan,
    Blue,
    Indigo,
    Purple,
    Pink,
    Brown,
}

impl PredefinedColor {
    pub const PALETTE: &'static [PredefinedColor] = &[
        Self::Red,
        Self::Orange,
        Self::Yellow,
        Self::Green,
        Self::Mint,
        Self::Teal,
        Self::Cyan,
        Self::Blue,
        Self::Indigo,
        Self::Purple,
        Self::Pink,
        Self::Brown,
    ];

    #[must_use]
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Orange => "ORANGE",
            Self::Yellow => "YELLOW",
            Self::Green => "GREEN",
            Self::Mint => "MINT",
            Self::Teal => "TEAL",
            Self::Cyan => "CYAN",
            Self::Blue => "BLUE",
            Self::Indigo => "INDIGO",
            Self::Purple => "PURPLE",
            Self::Pink => "PINK",
            Self::Brown => "BROWN",
        }
    }

    #[must_use]
    pub fn from_db_str(s: &str) -> Option<Self> {
        Self::PALETTE.iter().copied().find(|c| c.as_db_str() == s)
    }
}

/// Display color of a companion or timed note: either a palette entry or a raw ARGB value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AdaptiveColor {
    Predefined(PredefinedColor),
    Custom(u32),
}

impl AdaptiveColor {
    pub const TAG_PREDEFINED: &'static str = "predefined";
    pub const TAG_CUSTOM: &'static str = "custom";

    /// Split into the `(tag, value)` column pair used for persistence.
    #[must_use]
    pub fn to_columns(self) -> (&'static str, String) {
        match self {
            Self::Predefined(c) => (Self::TAG_PREDEFINED, c.as_db_str().to_string()),
            Self::Custom(argb) => (Self::TAG_CUSTOM, argb.to_string()),
        }
    }

    #[must_use]
    pub fn from_columns(tag: &str, value: &str) -> Option<Self> {
        match tag {
            Self::TAG_PREDEFINED => PredefinedColor::from_db_str(value).map(Self::Predefined),
            Self::TAG_CUSTOM => value.parse::<u32>().ok().map(Self::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for AdaptiveColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Predefined(c) => f.write_str(&c.as_db_str().to_lowercase()),
            Self::Custom(argb) => write!(f, "#{argb:08X}"),
        }
    }
}

impl FromStr for AdaptiveColor {
    type Err = anyhow::Error;

    /// Accepts a palette name (`"teal"`) or an ARGB hex value (`"#FF336699"`, `"#336699"`).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            let argb = match hex.len() {
                6 => 0xFF00_0000 | u32::from_str_radix(hex, 16)?,
                8 => u32::from_str_radix(hex, 16)?,
                _ => bail!("Invalid color '{s}'. Use #RRGGBB or #AARRGGBB"),
            };
            return Ok(Self::Custom(argb));
        }
        PredefinedColor::from_db_str(&s.to_uppercase())
            .map(Self::Predefined)
            .ok_or_else(|| anyhow::anyhow!("Unknown color '{s}'"))
    }
}

// --- Experiences ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Experience {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub creation_date: DateTime<Utc>,
    pub sort_date: DateTime<Utc>,
    pub is_favorite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone)]
pub struct NewExperience {
    pub title: String,
    pub text: String,
    pub sort_date: DateTime<Utc>,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdateExperience {
    pub title: Option<String>,
    pub text: Option<String>,
    pub sort_date: Option<DateTime<Utc>>,
    pub is_favorite: Option<bool>,
    pub location: Option<Option<Location>>,
}

/// An experience with everything hanging off it, as shown on the experience screen.
#[derive(Debug, Clone, Serialize)]
pub struct ExperienceDetail {
    pub experience: Experience,
    pub ingestions: Vec<Ingestion>,
    pub timed_notes: Vec<TimedNoteWithPhotos>,
}

// --- Ingestions ---

#[derive(Debug, Clone, Serialize)]
pub struct Ingestion {
    pub id: i64,
    pub experience_id: i64,
    pub substance_name: String,
    pub time: DateTime<Utc>,
    pub creation_date: DateTime<Utc>,
    pub administration_route: AdministrationRoute,
    pub dose: Option<f64>,
    pub is_dose_an_estimate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_dose_standard_deviation: Option<f64>,
    pub units: String,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_unit_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_recipe_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewIngestion {
    pub experience_id: i64,
    pub substance_name: String,
    pub time: DateTime<Utc>,
    pub administration_route: AdministrationRoute,
    pub dose: Option<f64>,
    pub is_dose_an_estimate: bool,
    pub estimated_dose_standard_deviation: Option<f64>,
    pub units: String,
    pub notes: String,
    pub consumer_name: Option<String>,
    pub custom_unit_id: Option<i64>,
    pub custom_recipe_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdateIngestion {
    pub time: Option<DateTime<Utc>>,
    pub dose: Option<Option<f64>>,
    pub is_dose_an_estimate: Option<bool>,
    pub estimated_dose_standard_deviation: Option<Option<f64>>,
    pub notes: Option<String>,
    pub consumer_name: Option<Option<String>>,
    pub experience_id: Option<i64>,
}

// --- Custom substances ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomSubstance {
    pub id: i64,
    pub name: String,
    pub units: String,
    pub description: String,
    #[serde(default)]
    pub roas: Vec<Roa>,
}

#[derive(Debug, Clone)]
pub struct NewCustomSubstance {
    pub name: String,
    pub units: String,
    pub description: String,
    pub roas: Vec<Roa>,
}

/// Route-specific dose and duration information, shared by catalog and custom substances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Roa {
    pub route: AdministrationRoute,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dose: Option<RoaDose>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration: Option<RoaDuration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoaDose {
    pub units: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub light: Option<DoseRange>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub common: Option<DoseRange>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub strong: Option<DoseRange>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub heavy: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DoseRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoseClass {
    Threshold,
    Light,
    Common,
    Strong,
    Heavy,
}

impl fmt::Display for DoseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Threshold => "threshold",
            Self::Light => "light",
            Self::Common => "common",
            Self::Strong => "strong",
            Self::Heavy => "heavy",
        };
        f.write_str(s)
    }
}

impl RoaDose {
    /// Classify a dose against this route's ranges. Returns `None` below threshold or when the
    /// ranges don't cover the value.
    #[must_use]
    pub fn classify(&self, dose: f64) -> Option<DoseClass> {
        if self.heavy.is_some_and(|h| dose >= h) {
            return Some(DoseClass::Heavy);
        }
        if self.strong.is_some_and(|r| dose >= r.min) {
            return Some(DoseClass::Strong);
        }
        if self.common.is_some_and(|r| dose >= r.min) {
            return Some(DoseClass::Common);
        }
        if self.light.is_some_and(|r| dose >= r.min) {
            return Some(DoseClass::Light);
        }
        if self.threshold.is_some_and(|t| dose >= t) {
            return Some(DoseClass::Threshold);
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoaDuration {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub onset: Option<DurationRange>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub comeup: Option<DurationRange>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub peak: Option<DurationRange>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub offset: Option<DurationRange>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total: Option<DurationRange>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnits {
    Seconds,
    Minutes,
    Hours,
    Days,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DurationRange {
    pub min: f64,
    pub max: f64,
    pub units: DurationUnits,
}

impl fmt::Display for DurationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = match self.units {
            DurationUnits::Seconds => "s",
            DurationUnits::Minutes => "min",
            DurationUnits::Hours => "h",
            DurationUnits::Days => "d",
        };
        write!(f, "{}-{}{units}", self.min, self.max)
    }
}

// --- Custom units ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomUnit {
    pub id: i64,
    pub substance_name: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub administration_route: AdministrationRoute,
    pub dose: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub estimated_dose_standard_deviation: Option<f64>,
    pub is_estimate: bool,
    pub is_archived: bool,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub unit_plural: Option<String>,
    pub original_unit: String,
    pub note: String,
}

impl CustomUnit {
    /// Dose in the substance's own units for `count` of this unit.
    #[must_use]
    pub fn calculate_pure_dose(&self, count: f64) -> Option<f64> {
        self.dose.map(|d| d * count)
    }

    #[must_use]
    pub fn unit_label(&self, count: f64) -> &str {
        if (count - 1.0).abs() < f64::EPSILON {
            &self.unit
        } else {
            self.unit_plural.as_deref().unwrap_or(&self.unit)
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewCustomUnit {
    pub substance_name: String,
    pub name: String,
    pub administration_route: AdministrationRoute,
    pub dose: Option<f64>,
    pub estimated_dose_standard_deviation: Option<f64>,
    pub is_estimate: bool,
    pub unit: String,
    pub unit_plural: Option<String>,
    pub original_unit: String,
    pub note: String,
}

// --- Custom recipes ---

#[derive(Debug, Clone, Serialize)]
pub struct CustomRecipe {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub administration_route: AdministrationRoute,
    pub is_archived: bool,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_plural: Option<String>,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct NewCustomRecipe {
    pub name: String,
    pub administration_route: AdministrationRoute,
    pub unit: String,
    pub unit_plural: Option<String>,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeSubcomponent {
    pub id: i64,
    pub recipe_id: i64,
    pub substance_name: String,
    pub dose: Option<f64>,
    pub is_estimate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_dose_standard_deviation: Option<f64>,
    pub units: String,
}

#[derive(Debug, Clone)]
pub struct NewRecipeSubcomponent {
    pub substance_name: String,
    pub dose: Option<f64>,
    pub is_estimate: bool,
    pub estimated_dose_standard_deviation: Option<f64>,
    pub units: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    pub recipe: CustomRecipe,
    pub subcomponents: Vec<RecipeSubcomponent>,
}

// --- Timed notes ---

#[derive(Debug, Clone, Serialize)]
pub struct TimedNote {
    pub id: i64,
    pub experience_id: i64,
    pub creation_date: DateTime<Utc>,
    pub time: DateTime<Utc>,
    pub note: String,
    pub color: AdaptiveColor,
    pub is_part_of_timeline: bool,
}

#[derive(Debug, Clone)]
pub struct NewTimedNote {
    pub experience_id: i64,
    pub time: DateTime<Utc>,
    pub note: String,
    pub color: AdaptiveColor,
    pub is_part_of_timeline: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTimedNote {
    pub time: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub color: Option<AdaptiveColor>,
    pub is_part_of_timeline: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimedNotePhoto {
    pub id: i64,
    pub timed_note_id: i64,
    pub file_path: String,
    pub caption: String,
    pub creation_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimedNoteWithPhotos {
    pub note: TimedNote,
    pub photos: Vec<TimedNotePhoto>,
}

// --- Companions ---

#[derive(Debug, Clone, Serialize)]
pub struct SubstanceCompanion {
    pub substance_name: String,
    pub color: AdaptiveColor,
}

// --- Reminders ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CustomRepeatPattern {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<Weekday>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_occurrences: Option<u32>,
}

impl CustomRepeatPattern {
    /// Decode a persisted pattern. Malformed JSON is treated as "no pattern".
    #[must_use]
    pub fn decode(json: Option<&str>) -> Option<Self> {
        let json = json?;
        match serde_json::from_str(json) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed custom repeat pattern");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReminder {
    pub id: i64,
    pub title: String,
    pub time_of_day: NaiveTime,
    pub is_enabled: bool,
    pub substance_name: String,
    pub administration_route: AdministrationRoute,
    pub dose: Option<f64>,
    pub units: String,
    pub is_estimate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_dose_standard_deviation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_unit_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_name: Option<String>,
    pub note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_repeat_pattern: Option<CustomRepeatPattern>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewIngestionReminder {
    pub title: String,
    pub time_of_day: NaiveTime,
    pub is_enabled: bool,
    pub substance_name: String,
    pub administration_route: AdministrationRoute,
    pub dose: Option<f64>,
    pub units: String,
    pub is_estimate: bool,
    pub estimated_dose_standard_deviation: Option<f64>,
    pub custom_unit_id: Option<i64>,
    pub consumer_name: Option<String>,
    pub note: String,
    pub custom_repeat_pattern: Option<CustomRepeatPattern>,
}

// --- Statistics ---

#[derive(Debug, Clone, Serialize)]
pub struct SubstanceStat {
    pub substance_name: String,
    pub units: String,
    pub ingestion_count: i64,
    pub experience_count: i64,
    pub total_known_dose: f64,
    /// At least one ingestion in the window had no dose recorded.
    pub has_unknown_dose: bool,
    pub last_used: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<AdaptiveColor>,
}

// --- Export / Import types ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportCustomSubstance {
    pub name: String,
    pub units: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roas: Vec<Roa>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportIngestion {
    pub substance_name: String,
    pub time: DateTime<Utc>,
    pub creation_date: DateTime<Utc>,
    pub administration_route: AdministrationRoute,
    pub dose: Option<f64>,
    #[serde(default)]
    pub is_dose_an_estimate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_dose_standard_deviation: Option<f64>,
    pub units: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_name: Option<String>,
    /// Id of the custom unit in the exporting database, remapped on import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_unit_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_recipe_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportTimedNote {
    pub creation_date: DateTime<Utc>,
    pub time: DateTime<Utc>,
    pub note: String,
    pub color: AdaptiveColor,
    #[serde(default)]
    pub is_part_of_timeline: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photos: Vec<ExportPhoto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPhoto {
    pub file_path: String,
    #[serde(default)]
    pub caption: String,
    pub creation_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportExperience {
    pub title: String,
    #[serde(default)]
    pub text: String,
    pub creation_date: DateTime<Utc>,
    pub sort_date: DateTime<Utc>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default)]
    pub ingestions: Vec<ExportIngestion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timed_notes: Vec<ExportTimedNote>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportCustomUnit {
    pub id: i64,
    pub substance_name: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub administration_route: AdministrationRoute,
    pub dose: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_dose_standard_deviation: Option<f64>,
    #[serde(default)]
    pub is_estimate: bool,
    #[serde(default)]
    pub is_archived: bool,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_plural: Option<String>,
    #[serde(default)]
    pub original_unit: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecipeSubcomponent {
    pub substance_name: String,
    pub dose: Option<f64>,
    #[serde(default)]
    pub is_estimate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_dose_standard_deviation: Option<f64>,
    pub units: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportCustomRecipe {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub administration_route: AdministrationRoute,
    #[serde(default)]
    pub is_archived: bool,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_plural: Option<String>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub subcomponents: Vec<ExportRecipeSubcomponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReminder {
    pub title: String,
    pub time_of_day: NaiveTime,
    pub is_enabled: bool,
    pub substance_name: String,
    pub administration_route: AdministrationRoute,
    pub dose: Option<f64>,
    pub units: String,
    #[serde(default)]
    pub is_estimate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_dose_standard_deviation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_unit_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_name: Option<String>,
    #[serde(default)]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_repeat_pattern: Option<CustomRepeatPattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalExport {
    pub version: i64,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub experiences: Vec<ExportExperience>,
    #[serde(default)]
    pub custom_substances: Vec<ExportCustomSubstance>,
    #[serde(default)]
    pub custom_units: Vec<ExportCustomUnit>,
    #[serde(default)]
    pub custom_recipes: Vec<ExportCustomRecipe>,
    #[serde(default)]
    pub reminders: Vec<ExportReminder>,
}

pub const JOURNAL_EXPORT_VERSION: i64 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[allow(clippy::struct_field_names)]
pub struct ImportSummary {
    pub experiences_imported: i64,
    pub ingestions_imported: i64,
    pub timed_notes_imported: i64,
    pub custom_substances_imported: i64,
    pub custom_substances_skipped: i64,
    pub custom_units_imported: i64,
    pub custom_recipes_imported: i64,
    pub reminders_imported: i64,
}

// --- Validation ---

pub fn validate_substance_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Substance name must not be empty");
    }
    Ok(trimmed.to_string())
}

pub fn validate_dose(dose: Option<f64>, standard_deviation: Option<f64>) -> Result<()> {
    if dose.is_some_and(|d| d < 0.0 || !d.is_finite()) {
        bail!("Dose must be a non-negative number");
    }
    if standard_deviation.is_some_and(|sd| sd < 0.0 || !sd.is_finite()) {
        bail!("Estimated dose standard deviation must be a non-negative number");
    }
    if standard_deviation.is_some() && dose.is_none() {
        bail!("A standard deviation needs a dose to apply to");
    }
    Ok(())
}

pub fn validate_custom_substance(substance: &ExportCustomSubstance) -> Result<()> {
    validate_substance_name(&substance.name)?;
    if substance.units.trim().is_empty() {
        bail!("Custom substance '{}' must have units", substance.name);
    }
    Ok(())
}

pub fn validate_recipe_subcomponent(sub: &NewRecipeSubcomponent) -> Result<()> {
    validate_substance_name(&sub.substance_name)?;
    validate_dose(sub.dose, sub.estimated_dose_standard_deviation)?;
    if sub.units.trim().is_empty() {
        bail!("Recipe subcomponent '{}' must have units", sub.substance_name);
    }
    Ok(())
}

pub fn validate_repeat_pattern(pattern: &CustomRepeatPattern) -> Result<()> {
    if pattern.interval_days == Some(0) {
        bail!("Repeat interval must be at least one day");
    }
    if pattern.max_occurrences == Some(0) {
        bail!("Max occurrences must be at least one");
    }
    if !pattern.days_of_week.is_empty() && pattern.interval_days.is_some() {
        bail!("Use either days of week or an interval, not both");
    }
    Ok(())
}

/// Parse a time of day like `"08:00"` or `"8:30"`.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| anyhow::anyhow!("Invalid time '{s}'. Use HH:MM (24-hour)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_parse_case_insensitive() {
        assert_eq!(
            "Oral".parse::<AdministrationRoute>().unwrap(),
            AdministrationRoute::Oral
        );
        assert_eq!(
            " INSUFFLATED ".parse::<AdministrationRoute>().unwrap(),
            AdministrationRoute::Insufflated
        );
        assert!("snorted".parse::<AdministrationRoute>().is_err());
    }

    #[test]
    fn test_route_serde_uses_db_names() {
        let json = serde_json::to_string(&AdministrationRoute::Sublingual).unwrap();
        assert_eq!(json, "\"SUBLINGUAL\"");
        for route in AdministrationRoute::ALL {
            let quoted = format!("\"{}\"", route.as_db_str());
            let back: AdministrationRoute = serde_json::from_str(&quoted).unwrap();
            assert_eq!(back, *route);
        }
    }

    #[test]
    fn test_adaptive_color_columns() {
        let teal = AdaptiveColor::Predefined(PredefinedColor::Teal);
        let (tag, value) = teal.to_columns();
        assert_eq!(tag, "predefined");
        assert_eq!(value, "TEAL");
        assert_eq!(AdaptiveColor::from_columns(tag, &value), Some(teal));

        let custom = AdaptiveColor::Custom(0xFF33_6699);
        let (tag, value) = custom.to_columns();
        assert_eq!(tag, "custom");
        assert_eq!(AdaptiveColor::from_columns(tag, &value), Some(custom));
    }

    #[test]
    fn test_adaptive_color_from_columns_rejects_garbage() {
        assert!(AdaptiveColor::from_columns("predefined", "MAUVE").is_none());
        assert!(AdaptiveColor::from_columns("custom", "not-a-number").is_none());
        assert!(AdaptiveColor::from_columns("gradient", "RED").is_none());
    }

    #[test]
    fn test_adaptive_color_parse() {
        assert_eq!(
            "blue".parse::<AdaptiveColor>().unwrap(),
            AdaptiveColor::Predefined(PredefinedColor::Blue)
        );
        assert_eq!(
            "#336699".parse::<AdaptiveColor>().unwrap(),
            AdaptiveColor::Custom(0xFF33_6699)
        );
        assert_eq!(
            "#80336699".parse::<AdaptiveColor>().unwrap(),
            AdaptiveColor::Custom(0x8033_6699)
        );
        assert!("#12".parse::<AdaptiveColor>().is_err());
        assert!("chartreuse".parse::<AdaptiveColor>().is_err());
    }

    #[test]
    fn test_adaptive_color_serde_is_tagged() {
        let json =
            serde_json::to_value(AdaptiveColor::Predefined(PredefinedColor::Red)).unwrap();
        assert_eq!(json["kind"], "predefined");
        assert_eq!(json["value"], "RED");
        let json = serde_json::to_value(AdaptiveColor::Custom(16)).unwrap();
        assert_eq!(json["kind"], "custom");
        assert_eq!(json["value"], 16);
    }

    #[test]
    fn test_repeat_pattern_decode_malformed_is_none() {
        assert!(CustomRepeatPattern::decode(None).is_none());
        assert!(CustomRepeatPattern::decode(Some("{not json")).is_none());
        assert!(CustomRepeatPattern::decode(Some("[1,2,3]")).is_none());
    }

    #[test]
    fn test_repeat_pattern_decode_valid() {
        let pattern =
            CustomRepeatPattern::decode(Some(r#"{"days_of_week":["Mon","Fri"]}"#)).unwrap();
        assert_eq!(pattern.days_of_week, vec![Weekday::Mon, Weekday::Fri]);
        assert!(pattern.interval_days.is_none());
    }

    #[test]
    fn test_validate_repeat_pattern() {
        assert!(validate_repeat_pattern(&CustomRepeatPattern::default()).is_ok());
        let zero_interval = CustomRepeatPattern {
            interval_days: Some(0),
            ..Default::default()
        };
        assert!(validate_repeat_pattern(&zero_interval).is_err());
        let both = CustomRepeatPattern {
            days_of_week: vec![Weekday::Tue],
            interval_days: Some(2),
            ..Default::default()
        };
        assert!(validate_repeat_pattern(&both).is_err());
    }

    #[test]
    fn test_validate_dose() {
        assert!(validate_dose(Some(10.0), None).is_ok());
        assert!(validate_dose(None, None).is_ok());
        assert!(validate_dose(Some(10.0), Some(2.0)).is_ok());
        assert!(validate_dose(Some(-1.0), None).is_err());
        assert!(validate_dose(Some(f64::NAN), None).is_err());
        assert!(validate_dose(None, Some(2.0)).is_err());
        assert!(validate_dose(Some(10.0), Some(-2.0)).is_err());
    }

    #[test]
    fn test_validate_substance_name_trims() {
        assert_eq!(validate_substance_name("  MDMA ").unwrap(), "MDMA");
        assert!(validate_substance_name("   ").is_err());
    }

    #[test]
    fn test_validate_custom_substance() {
        let ok = ExportCustomSubstance {
            name: "Homebrew".to_string(),
            units: "mg".to_string(),
            description: String::new(),
            roas: vec![],
        };
        assert!(validate_custom_substance(&ok).is_ok());
        let no_units = ExportCustomSubstance {
            units: " ".to_string(),
            ..ok
        };
        assert!(validate_custom_substance(&no_units).is_err());
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(
            parse_time_of_day("08:00").unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap()
        );
        assert_eq!(
            parse_time_of_day("21:45").unwrap(),
            NaiveTime::from_hms_opt(21, 45, 0).unwrap()
        );
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("noon").is_err());
    }

    #[test]
    fn test_roa_dose_classify() {
        let dose = RoaDose {
            units: "mg".to_string(),
            threshold: Some(20.0),
            light: Some(DoseRange { min: 40.0, max: 75.0 }),
            common: Some(DoseRange { min: 75.0, max: 140.0 }),
            strong: Some(DoseRange { min: 140.0, max: 180.0 }),
            heavy: Some(180.0),
        };
        assert_eq!(dose.classify(10.0), None);
        assert_eq!(dose.classify(25.0), Some(DoseClass::Threshold));
        assert_eq!(dose.classify(50.0), Some(DoseClass::Light));
        assert_eq!(dose.classify(100.0), Some(DoseClass::Common));
        assert_eq!(dose.classify(150.0), Some(DoseClass::Strong));
        assert_eq!(dose.classify(200.0), Some(DoseClass::Heavy));
    }

    #[test]
    fn test_custom_unit_pure_dose_and_label() {
        let unit = CustomUnit {
            id: 1,
            substance_name: "Caffeine".to_string(),
            name: "Espresso".to_string(),
            created_at: Utc::now(),
            administration_route: AdministrationRoute::Oral,
            dose: Some(80.0),
            estimated_dose_standard_deviation: None,
            is_estimate: true,
            is_archived: false,
            unit: "shot".to_string(),
            unit_plural: Some("shots".to_string()),
            original_unit: "mg".to_string(),
            note: String::new(),
        };
        assert!((unit.calculate_pure_dose(2.0).unwrap() - 160.0).abs() < f64::EPSILON);
        assert_eq!(unit.unit_label(1.0), "shot");
        assert_eq!(unit.unit_label(2.0), "shots");

        let unknown = CustomUnit { dose: None, ..unit };
        assert!(unknown.calculate_pure_dose(2.0).is_none());
    }
}
