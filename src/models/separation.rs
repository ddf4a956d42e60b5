use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::models::job::{JobState, StemFile};

/// Demucs model variants offered for separation.
///
/// Parsing accepts the canonical model name as well as the friendly aliases
/// `default`, `fine-tuned` and `6-stem`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum ModelVariant {
    #[default]
    #[serde(rename = "htdemucs")]
    #[strum(to_string = "htdemucs", serialize = "default")]
    HtDemucs,

    #[serde(rename = "htdemucs_ft")]
    #[strum(to_string = "htdemucs_ft", serialize = "fine-tuned")]
    HtDemucsFt,

    #[serde(rename = "htdemucs_6s")]
    #[strum(to_string = "htdemucs_6s", serialize = "6-stem")]
    HtDemucs6s,
}

const FOUR_STEMS: &[StemName] = &[
    StemName::Vocals,
    StemName::Drums,
    StemName::Bass,
    StemName::Other,
];

const SIX_STEMS: &[StemName] = &[
    StemName::Vocals,
    StemName::Drums,
    StemName::Bass,
    StemName::Piano,
    StemName::Guitar,
    StemName::Other,
];

impl ModelVariant {
    /// Name understood by the Demucs tooling.
    pub fn name(&self) -> &'static str {
        match self {
            ModelVariant::HtDemucs => "htdemucs",
            ModelVariant::HtDemucsFt => "htdemucs_ft",
            ModelVariant::HtDemucs6s => "htdemucs_6s",
        }
    }

    /// Stems produced by this variant, in output order.
    pub fn stems(&self) -> &'static [StemName] {
        match self {
            ModelVariant::HtDemucs | ModelVariant::HtDemucsFt => FOUR_STEMS,
            ModelVariant::HtDemucs6s => SIX_STEMS,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModelVariant::HtDemucs => "High-quality 4-stem separation (vocals, drums, bass, other)",
            ModelVariant::HtDemucsFt => "Fine-tuned version with improved quality",
            ModelVariant::HtDemucs6s => {
                "6-stem separation (vocals, drums, bass, piano, guitar, other)"
            }
        }
    }

    pub fn recommended(&self) -> bool {
        matches!(self, ModelVariant::HtDemucs)
    }

    /// Relative inference cost. The fine-tuned variant is a bag of four
    /// models and runs roughly four times longer.
    pub fn cost_factor(&self) -> f64 {
        match self {
            ModelVariant::HtDemucs | ModelVariant::HtDemucs6s => 1.0,
            ModelVariant::HtDemucsFt => 4.0,
        }
    }
}

/// One isolated source track.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StemName {
    Vocals,
    Drums,
    Bass,
    Piano,
    Guitar,
    Other,
}

/// Response after submitting an audio file for separation.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: JobState,
    pub message: String,
}

/// Progress of a single stem bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemProgress {
    pub name: StemName,
    pub progress: u8,
}

/// Response for querying job status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobState,
    pub progress: u8,
    pub model: ModelVariant,
    pub filename: String,
    pub stems: Vec<StemFile>,
    pub stem_progress: Vec<StemProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Entry of the model catalogue.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: ModelVariant,
    pub description: String,
    pub stems: usize,
    pub recommended: bool,
}

impl From<ModelVariant> for ModelInfo {
    fn from(variant: ModelVariant) -> Self {
        Self {
            name: variant,
            description: variant.description().to_string(),
            stems: variant.stems().len(),
            recommended: variant.recommended(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
