//! Camera class detection.
//!
//! Drones fire their AEB sequences more slowly than a tripod DSLR, so a job
//! containing drone shots clusters with a wider fixed tolerance.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tolerance applied when any drone camera is present (seconds)
pub const DRONE_TIME_DELTA_SECONDS: f64 = 10.0;

/// Substrings that identify drone bodies in the EXIF `Model` tag
const DRONE_MODEL_KEYWORDS: &[&str] = &["dji", "mavic", "matrice", "autel", "skydio", "anafi"];

/// Series names also worn by high-speed cinema and thermal cameras. They only
/// count when followed by a generation number, as in `Phantom 4 Pro`.
const DRONE_SERIES_NAMES: &[&str] = &["phantom", "inspire"];

/// Hasselblad modules only shipped on Mavic airframes
const DRONE_MODEL_CODES: &[&str] = &["l1d-20c", "l2d-20c"];

/// Which heuristic path chose the effective delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionReason {
    StandardCamera,
    DroneCamera,
}

impl DetectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionReason::StandardCamera => "STANDARD_CAMERA",
            DetectionReason::DroneCamera => "DRONE_CAMERA",
        }
    }
}

impl std::fmt::Display for DetectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a single model string against the known drone signatures.
pub fn is_drone_model(model: &str) -> bool {
    let lower = model.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }
    if DRONE_MODEL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return true;
    }
    if DRONE_MODEL_CODES.iter().any(|c| lower.contains(c)) {
        return true;
    }
    is_drone_series(&lower) || is_dji_gimbal_code(&lower)
}

fn is_drone_series(lower: &str) -> bool {
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    tokens.iter().enumerate().any(|(i, token)| {
        DRONE_SERIES_NAMES.iter().any(|series| match token.strip_prefix(series) {
            Some("") => tokens
                .get(i + 1)
                .is_some_and(|next| next.starts_with(|c: char| c.is_ascii_digit())),
            Some(rest) => rest.chars().all(|c| c.is_ascii_digit()),
            None => false,
        })
    })
}

/// DJI integrated cameras report models like `FC3170` or `FC7303`.
fn is_dji_gimbal_code(lower: &str) -> bool {
    lower.split_whitespace().any(|token| {
        token
            .strip_prefix("fc")
            .map(|rest| rest.len() >= 3 && rest.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    })
}

/// Pick the clustering tolerance for a job from the models seen in it.
pub fn detect_effective_delta<I, S>(camera_models: I, configured_delta: f64) -> (f64, DetectionReason)
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    let drone = camera_models
        .into_iter()
        .flatten()
        .find(|model| is_drone_model(model.as_ref()));

    match drone {
        Some(model) => {
            debug!(model = model.as_ref(), "drone camera detected");
            (DRONE_TIME_DELTA_SECONDS, DetectionReason::DroneCamera)
        }
        None => (configured_delta, DetectionReason::StandardCamera),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drone_models() {
        assert!(is_drone_model("FC3170"));
        assert!(is_drone_model("FC7303"));
        assert!(is_drone_model("DJI Mini 3 Pro"));
        assert!(is_drone_model("Mavic 3"));
        assert!(is_drone_model("L1D-20c"));
        assert!(is_drone_model("Autel EVO II Pro"));
        assert!(is_drone_model("Phantom 4 Pro"));
        assert!(is_drone_model("DJI Phantom 4"));
        assert!(is_drone_model("Inspire 2"));
        assert!(is_drone_model("Phantom4"));
    }

    #[test]
    fn test_series_names_need_generation_number() {
        assert!(!is_drone_model("Phantom VEO 640"));
        assert!(!is_drone_model("Phantom Flex4K"));
        assert!(!is_drone_model("Phantom v2640"));
        assert!(!is_drone_model("Inspire"));
        assert!(!is_drone_model("Phantomatic 3"));

        let (delta, reason) = detect_effective_delta([Some("Phantom VEO 640")], 2.0);
        assert_eq!(delta, 2.0);
        assert_eq!(reason, DetectionReason::StandardCamera);
    }

    #[test]
    fn test_standard_models() {
        assert!(!is_drone_model("Canon EOS R5"));
        assert!(!is_drone_model("NIKON Z 9"));
        assert!(!is_drone_model("ILCE-7RM4"));
        assert!(!is_drone_model("FC"));
        assert!(!is_drone_model("FCX12"));
        assert!(!is_drone_model(""));
        assert!(!is_drone_model("   "));
    }

    #[test]
    fn test_drone_overrides_configured_delta() {
        let models = vec![Some("Canon EOS R5"), Some("FC3170"), None];
        let (delta, reason) = detect_effective_delta(models, 2.0);
        assert_eq!(delta, 10.0);
        assert_eq!(reason, DetectionReason::DroneCamera);
    }

    #[test]
    fn test_missing_models_stay_standard() {
        let models: Vec<Option<&str>> = vec![None, Some(""), None];
        let (delta, reason) = detect_effective_delta(models, 2.5);
        assert_eq!(delta, 2.5);
        assert_eq!(reason, DetectionReason::StandardCamera);
    }

    #[test]
    fn test_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&DetectionReason::DroneCamera).unwrap(),
            "\"DRONE_CAMERA\""
        );
        assert_eq!(DetectionReason::StandardCamera.to_string(), "STANDARD_CAMERA");
    }
}
