//! Effect registry
//!
//! The fixed set of voice effects and the transform parameters each maps to.
//! Built once at startup and read-only afterwards.

use serde::Serialize;

use crate::config::EffectSettings;
use crate::dsp::transform::TransformParams;
use crate::error::{Result, VoxError};

/// An effect the engine can apply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectDescriptor {
    /// Stable identifier, also the suffix of derived filenames
    pub id: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub parameters: TransformParams,
}

/// Display name and description for each effect id
const EFFECT_INFO: [(&str, &str, &str); 4] = [
    (
        "robotic",
        "Robotic Voice",
        "Applies ring modulation for a metallic robot sound",
    ),
    (
        "male",
        "Male Voice",
        "Transforms voice to sound more masculine by lowering pitch",
    ),
    (
        "female",
        "Female Voice",
        "Transforms voice to sound more feminine by raising pitch",
    ),
    (
        "baby",
        "Baby Voice",
        "Creates a high-pitched baby-like voice with time compression",
    ),
];

/// Read-only registry of the available effects
#[derive(Debug, Clone)]
pub struct EffectRegistry {
    effects: Vec<EffectDescriptor>,
}

impl EffectRegistry {
    /// Registry with the shipped default parameters
    pub fn with_defaults() -> Self {
        Self::from_settings(&EffectSettings::default())
    }

    /// Registry with parameters taken from configuration
    pub fn from_settings(settings: &EffectSettings) -> Self {
        let effects = settings
            .entries()
            .into_iter()
            .zip(EFFECT_INFO)
            .map(|((id, parameters), (_, display_name, description))| EffectDescriptor {
                id,
                display_name,
                description,
                parameters,
            })
            .collect();

        Self { effects }
    }

    /// Look up an effect by id (case-insensitive, surrounding whitespace ignored)
    pub fn resolve(&self, effect_id: &str) -> Result<&EffectDescriptor> {
        let wanted = effect_id.trim();
        self.effects
            .iter()
            .find(|e| e.id.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| VoxError::UnknownEffect {
                effect_id: effect_id.to_string(),
            })
    }

    /// All effects, in presentation order
    pub fn list(&self) -> &[EffectDescriptor] {
        &self.effects
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.effects.iter().map(|e| e.id).collect()
    }

    pub fn contains(&self, effect_id: &str) -> bool {
        self.resolve(effect_id).is_ok()
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use test_case::test_case;

    #[test]
    fn test_ids_follow_settings_order() {
        assert_eq!(
            EffectRegistry::with_defaults().ids(),
            vec!["robotic", "male", "female", "baby"]
        );
        // Table rows and settings entries must line up
        let settings = EffectSettings::default();
        for ((id, _), (info_id, _, _)) in settings.entries().iter().zip(EFFECT_INFO) {
            assert_eq!(*id, info_id);
        }
    }

    #[test_case("robotic", TransformParams::RingModulation { carrier_hz: 30.0, depth: 1.0 })]
    #[test_case("male", TransformParams::PitchShift { semitone_shift: -5.0 })]
    #[test_case("female", TransformParams::PitchShift { semitone_shift: 5.0 })]
    #[test_case("baby", TransformParams::PitchShiftCompress { semitone_shift: 10.0, stretch_ratio: 0.85 })]
    fn test_default_parameters(id: &str, expected: TransformParams) {
        let registry = EffectRegistry::with_defaults();
        assert_eq!(registry.resolve(id).unwrap().parameters, expected);
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = EffectRegistry::with_defaults();
        assert_eq!(registry.resolve("Robotic").unwrap().id, "robotic");
        assert_eq!(registry.resolve(" baby ").unwrap().display_name, "Baby Voice");
    }

    #[test_case("alien")]
    #[test_case("")]
    #[test_case("cartoon")]
    fn test_unknown_effect(id: &str) {
        let err = EffectRegistry::with_defaults().resolve(id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownEffect);
    }

    #[test]
    fn test_settings_flow_into_parameters() {
        let mut settings = EffectSettings::default();
        settings.baby.stretch_ratio = 0.7;
        let registry = EffectRegistry::from_settings(&settings);
        assert_eq!(
            registry.resolve("baby").unwrap().parameters.stretch_ratio(),
            Some(0.7)
        );
    }
}
