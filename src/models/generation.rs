use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Which generation backend is wired in. Selected by configuration only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderKind {
    Apiframe,
    Runway,
}

/// Internal job state every provider vocabulary is normalized into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    /// Provider asked us to slow down. Never terminal.
    Throttled,
    Succeeded,
    Failed,
    /// Sentinel for a poll that could not be answered (missing job, transport error).
    Unknown,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// One poll result, already translated out of the provider's vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedStatus {
    pub state: JobState,
    pub percentage: u8,
    pub result_urls: Vec<String>,
}

impl NormalizedStatus {
    pub fn new(state: JobState, native_percentage: Option<u8>, result_urls: Vec<String>) -> Self {
        Self {
            state,
            percentage: synthesize_percentage(state, native_percentage),
            result_urls,
        }
    }

    pub fn unknown() -> Self {
        Self::new(JobState::Unknown, None, Vec::new())
    }

    pub fn pending() -> Self {
        Self::new(JobState::Pending, None, Vec::new())
    }
}

/// Convert a `[0, 1]` progress fraction into a clamped integer percentage.
pub fn fraction_to_percentage(fraction: f64) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction * 100.0).clamp(0.0, 100.0) as u8
}

/// Per-state percentage floor for providers that only report a discrete status.
///
/// Pending and Throttled keep whatever the provider reported (or 0), Running is at
/// least 1, Succeeded is always 100 and Failed is always 0.
pub fn synthesize_percentage(state: JobState, native: Option<u8>) -> u8 {
    let native = native.unwrap_or(0).min(100);
    match state {
        JobState::Pending | JobState::Throttled | JobState::Unknown => native,
        JobState::Running => native.max(1),
        JobState::Succeeded => 100,
        JobState::Failed => 0,
    }
}

/// Lifetime record of a single provider job, mutated only through [`GenerationJob::observe`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub job_id: String,
    pub provider: ProviderKind,
    pub state: JobState,
    pub percentage: u8,
    pub result_urls: Vec<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    pub fn new(job_id: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            job_id: job_id.into(),
            provider,
            state: JobState::Pending,
            percentage: 0,
            result_urls: Vec::new(),
            error: None,
            created_at: Utc::now(),
            last_polled_at: None,
        }
    }

    /// Fold a fresh status into the job.
    ///
    /// Terminal states are frozen. While non-terminal the percentage never goes
    /// down, and an `Unknown` read leaves the last known state in place.
    pub fn observe(&mut self, status: &NormalizedStatus) {
        self.last_polled_at = Some(Utc::now());
        if self.state.is_terminal() {
            return;
        }
        match status.state {
            JobState::Unknown => {}
            state if state.is_terminal() => {
                self.state = state;
                self.percentage = status.percentage;
                self.result_urls = status.result_urls.clone();
            }
            state => {
                self.state = state;
                self.percentage = self.percentage.max(status.percentage);
            }
        }
    }

    /// Mark the job failed with a reason, unless it already finished.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = JobState::Failed;
        self.percentage = 0;
        self.error = Some(reason.into());
    }

    pub fn status(&self) -> NormalizedStatus {
        NormalizedStatus {
            state: self.state,
            percentage: self.percentage,
            result_urls: self.result_urls.clone(),
        }
    }
}

/// Image handed to a provider as a style/content reference. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferenceImage {
    /// Plain URL or `data:` URI.
    pub uri: String,
    #[serde(default = "default_reference_tag")]
    pub tag: String,
}

fn default_reference_tag() -> String {
    "ref".to_string()
}

impl ReferenceImage {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            tag: default_reference_tag(),
        }
    }
}

/// Per-request knobs for [`crate::services::providers::GenerationProvider::submit`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// User-facing ratio token such as `"9:16"` or `"landscape"`.
    pub ratio: Option<String>,
    /// Provider-native size that bypasses negotiation.
    pub exact_ratio: Option<String>,
    pub reference_images: Vec<ReferenceImage>,
    /// Images to download and attach as references before submitting.
    pub reference_urls: Vec<String>,
    pub model_override: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(state: JobState, pct: u8) -> NormalizedStatus {
        NormalizedStatus::new(state, Some(pct), Vec::new())
    }

    #[test]
    fn test_fraction_conversion() {
        assert_eq!(fraction_to_percentage(0.0), 0);
        assert_eq!(fraction_to_percentage(0.42), 42);
        assert_eq!(fraction_to_percentage(1.0), 100);
        assert_eq!(fraction_to_percentage(1.7), 100);
        assert_eq!(fraction_to_percentage(-0.2), 0);
        assert_eq!(fraction_to_percentage(f64::NAN), 0);
    }

    #[test]
    fn test_percentage_floors() {
        assert_eq!(synthesize_percentage(JobState::Pending, None), 0);
        assert_eq!(synthesize_percentage(JobState::Running, None), 1);
        assert_eq!(synthesize_percentage(JobState::Running, Some(55)), 55);
        assert_eq!(synthesize_percentage(JobState::Succeeded, Some(10)), 100);
        assert_eq!(synthesize_percentage(JobState::Failed, Some(80)), 0);
    }

    #[test]
    fn test_percentage_never_regresses_while_running() {
        let mut job = GenerationJob::new("j1", ProviderKind::Runway);
        job.observe(&status(JobState::Running, 60));
        job.observe(&status(JobState::Running, 30));
        assert_eq!(job.percentage, 60);
        job.observe(&status(JobState::Throttled, 0));
        assert_eq!(job.state, JobState::Throttled);
        assert_eq!(job.percentage, 60);
    }

    #[test]
    fn test_terminal_state_is_frozen() {
        let mut job = GenerationJob::new("j1", ProviderKind::Apiframe);
        job.observe(&NormalizedStatus::new(
            JobState::Succeeded,
            None,
            vec!["https://cdn/x.png".into()],
        ));
        job.observe(&status(JobState::Running, 20));
        job.fail("late failure");
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.percentage, 100);
        assert_eq!(job.result_urls, vec!["https://cdn/x.png".to_string()]);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_unknown_keeps_last_state() {
        let mut job = GenerationJob::new("j1", ProviderKind::Apiframe);
        job.observe(&status(JobState::Running, 40));
        job.observe(&NormalizedStatus::unknown());
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.percentage, 40);
        assert!(job.last_polled_at.is_some());
    }

    #[test]
    fn test_reference_image_default_tag() {
        let r: ReferenceImage = serde_json::from_str(r#"{"uri":"https://x/y.png"}"#).unwrap();
        assert_eq!(r.tag, "ref");
    }
}
