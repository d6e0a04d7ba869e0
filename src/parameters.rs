//! Parameter map registry.
//!
//! Curated mappings from instrument name to the variables resampled from it
//! and the names they are written under. Built-in science and engineering
//! profiles can be used alone, merged, or replaced by a JSON override.

use crate::error::{LrauvError, Result};
use crate::models::Profile;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// One source variable and its renamed output identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterRename {
    pub name: String,
    pub rename: String,
}

impl ParameterRename {
    fn new(name: &str, rename: &str) -> Self {
        Self {
            name: name.to_string(),
            rename: rename.to_string(),
        }
    }
}

/// A renamed variable used by more than one instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameCollision {
    pub rename: String,
    /// `instrument.variable` sources writing to the same output name
    pub sources: Vec<String>,
}

/// Instrument name to ordered list of variable renames
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterMap(BTreeMap<String, Vec<ParameterRename>>);

impl ParameterMap {
    /// Build and validate a map from instrument entries
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, Vec<ParameterRename>)>,
    ) -> Result<Self> {
        let map = Self(entries.into_iter().collect());
        map.validate()?;
        Ok(map)
    }

    /// Parse a JSON override with the same shape as the built-in profiles
    pub fn from_json(json: &str) -> Result<Self> {
        let map: Self = serde_json::from_str(json).map_err(|e| {
            LrauvError::configuration(format!("Parameter argument invalid: {}", e))
        })?;
        if map.0.is_empty() {
            return Err(LrauvError::configuration(
                "Parameter argument names no instruments",
            ));
        }
        map.validate()?;
        Ok(map)
    }

    /// Serialize to the JSON shape accepted by the interpolator
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            LrauvError::configuration(format!("Can't serialize parameter map: {}", e))
        })
    }

    pub fn instruments(&self) -> impl Iterator<Item = (&str, &[ParameterRename])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn get(&self, instrument: &str) -> Option<&[ParameterRename]> {
        self.0.get(instrument).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of variables across all instruments
    pub fn variable_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Every renamed output identifier
    pub fn renames(&self) -> HashSet<&str> {
        self.0
            .values()
            .flatten()
            .map(|p| p.rename.as_str())
            .collect()
    }

    /// Source names must be unique within an instrument and no name may be empty
    fn validate(&self) -> Result<()> {
        for (instrument, renames) in &self.0 {
            if instrument.trim().is_empty() {
                return Err(LrauvError::configuration("Empty instrument name in parameter map"));
            }
            if renames.is_empty() {
                return Err(LrauvError::configuration(format!(
                    "Instrument '{}' lists no variables",
                    instrument
                )));
            }
            let mut seen = HashSet::new();
            for rename in renames {
                if rename.name.trim().is_empty() || rename.rename.trim().is_empty() {
                    return Err(LrauvError::configuration(format!(
                        "Instrument '{}' has an empty variable name",
                        instrument
                    )));
                }
                if !seen.insert(rename.name.as_str()) {
                    return Err(LrauvError::configuration(format!(
                        "Instrument '{}' lists variable '{}' twice",
                        instrument, rename.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Renamed outputs written by more than one source variable
    pub fn rename_collisions(&self) -> Vec<RenameCollision> {
        let mut by_rename: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (instrument, renames) in &self.0 {
            for rename in renames {
                by_rename
                    .entry(rename.rename.as_str())
                    .or_default()
                    .push(format!("{}.{}", instrument, rename.name));
            }
        }
        by_rename
            .into_iter()
            .filter(|(_, sources)| sources.len() > 1)
            .map(|(rename, sources)| RenameCollision {
                rename: rename.to_string(),
                sources,
            })
            .collect()
    }

    /// Union of two maps that must not overlap.
    ///
    /// An instrument present in both with different entries, or an output
    /// name claimed by both sides, is rejected instead of letting one side
    /// overwrite the other.
    pub fn merge(&self, other: &ParameterMap) -> Result<ParameterMap> {
        let ours = self.renames();
        let mut merged = self.0.clone();
        for (instrument, renames) in &other.0 {
            match merged.get(instrument) {
                Some(existing) if existing != renames => {
                    return Err(LrauvError::configuration(format!(
                        "Instrument '{}' is defined differently in merged profiles",
                        instrument
                    )));
                }
                Some(_) => continue,
                None => {}
            }
            if let Some(clash) = renames.iter().find(|r| ours.contains(r.rename.as_str())) {
                return Err(LrauvError::configuration(format!(
                    "Output name '{}' from '{}.{}' is already used by another profile",
                    clash.rename, instrument, clash.name
                )));
            }
            merged.insert(instrument.clone(), renames.clone());
        }
        Ok(ParameterMap(merged))
    }
}

/// Resolve the parameter map for a run.
///
/// An override replaces the profile's map entirely. Output names shared by
/// several instruments are logged so that shadowed columns are visible.
pub fn resolve(profile: Profile, override_json: Option<&str>) -> Result<ParameterMap> {
    let map = match override_json {
        Some(json) => ParameterMap::from_json(json)?,
        None => builtin(profile)?,
    };

    for collision in map.rename_collisions() {
        warn!(
            "Output variable '{}' is written by {}; only one is expected per vehicle",
            collision.rename,
            collision.sources.join(", ")
        );
    }
    debug!(
        "Resolved {} parameter map: {} instruments, {} variables",
        profile,
        map.len(),
        map.variable_count()
    );
    Ok(map)
}

/// Built-in map for a profile
pub fn builtin(profile: Profile) -> Result<ParameterMap> {
    match profile {
        Profile::Sci => science(),
        Profile::Eng => engineering(),
        Profile::Scieng => science()?.merge(&engineering()?),
    }
}

fn entries(table: &[(&str, &[(&str, &str)])]) -> Result<ParameterMap> {
    ParameterMap::from_entries(table.iter().map(|(instrument, vars)| {
        (
            instrument.to_string(),
            vars.iter()
                .map(|(name, rename)| ParameterRename::new(name, rename))
                .collect(),
        )
    }))
}

/// Science instrument variables
pub fn science() -> Result<ParameterMap> {
    entries(&[
        ("Aanderaa_O2", &[("mass_concentration_of_oxygen_in_sea_water", "oxygen")]),
        (
            "CTD_NeilBrown",
            &[
                ("sea_water_salinity", "salinity"),
                ("sea_water_temperature", "temperature"),
            ],
        ),
        (
            "CTD_Seabird",
            &[
                ("sea_water_salinity", "salinity"),
                ("sea_water_temperature", "temperature"),
            ],
        ),
        ("ISUS", &[("mole_concentration_of_nitrate_in_sea_water", "nitrate")]),
        (
            "PAR_Licor",
            &[("downwelling_photosynthetic_photon_flux_in_sea_water", "PAR")],
        ),
        (
            "WetLabsBB2FL",
            &[
                ("mass_concentration_of_chlorophyll_in_sea_water", "chlorophyll"),
                ("Output470", "bbp470"),
                ("Output650", "bbp650"),
            ],
        ),
        (
            "WetLabsSeaOWL_UV_A",
            &[
                (
                    "concentration_of_chromophoric_dissolved_organic_matter_in_sea_water",
                    "chromophoric_dissolved_organic_matter",
                ),
                ("mass_concentration_of_chlorophyll_in_sea_water", "chlorophyll"),
                ("BackscatteringCoeff700nm", "BackscatteringCoeff700nm"),
                ("VolumeScatCoeff117deg700nm", "VolumeScatCoeff117deg700nm"),
                (
                    "mass_concentration_of_petroleum_hydrocarbons_in_sea_water",
                    "petroleum_hydrocarbons",
                ),
            ],
        ),
    ])
}

/// Engineering and navigation variables
pub fn engineering() -> Result<ParameterMap> {
    entries(&[
        (
            "BPC1",
            &[
                ("platform_battery_charge", "health_platform_battery_charge"),
                ("platform_battery_voltage", "health_platform_average_voltage"),
            ],
        ),
        (
            "BuoyancyServo",
            &[("platform_buoyancy_position", "control_inputs_buoyancy_position")],
        ),
        (
            "DeadReckonUsingMultipleVelocitySources",
            &[
                (
                    "fix_residual_percent_distance_traveled",
                    "fix_residual_percent_distance_traveled_DeadReckonUsingMultipleVelocitySources",
                ),
                ("longitude", "pose_longitude_DeadReckonUsingMultipleVelocitySources"),
                ("latitude", "pose_latitude_DeadReckonUsingMultipleVelocitySources"),
                ("depth", "pose_depth_DeadReckonUsingMultipleVelocitySources"),
            ],
        ),
        (
            "DeadReckonUsingSpeedCalculator",
            &[
                (
                    "fix_residual_percent_distance_traveled",
                    "fix_residual_percent_distance_traveled_DeadReckonUsingSpeedCalculator",
                ),
                ("longitude", "pose_longitude_DeadReckonUsingSpeedCalculator"),
                ("latitude", "pose_latitude_DeadReckonUsingSpeedCalculator"),
                ("depth", "pose_depth_DeadReckonUsingSpeedCalculator"),
            ],
        ),
        (
            "ElevatorServo",
            &[("platform_elevator_angle", "control_inputs_elevator_angle")],
        ),
        (
            "MassServo",
            &[("platform_mass_position", "control_inputs_mass_position")],
        ),
        (
            "NAL9602",
            &[
                ("time_fix", "fix_time"),
                ("latitude_fix", "fix_latitude"),
                ("longitude_fix", "fix_longitude"),
            ],
        ),
        (
            "Onboard",
            &[("platform_average_current", "health_platform_average_current")],
        ),
        (
            "RudderServo",
            &[("platform_rudder_angle", "control_inputs_rudder_angle")],
        ),
        (
            "ThrusterServo",
            &[(
                "platform_propeller_rotation_rate",
                "control_inputs_propeller_rotation_rate",
            )],
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scieng_is_union_of_sci_and_eng() {
        let sci = builtin(Profile::Sci).unwrap();
        let eng = builtin(Profile::Eng).unwrap();
        let scieng = builtin(Profile::Scieng).unwrap();

        assert_eq!(scieng.len(), sci.len() + eng.len());
        assert_eq!(
            scieng.variable_count(),
            sci.variable_count() + eng.variable_count()
        );
        for (instrument, renames) in sci.instruments().chain(eng.instruments()) {
            assert_eq!(scieng.get(instrument), Some(renames));
        }
    }

    #[test]
    fn test_shared_renames_are_detectable() {
        let sci = science().unwrap();
        let collisions = sci.rename_collisions();
        let names: Vec<&str> = collisions.iter().map(|c| c.rename.as_str()).collect();

        assert!(names.contains(&"salinity"));
        assert!(names.contains(&"temperature"));
        assert!(names.contains(&"chlorophyll"));

        let salinity = collisions.iter().find(|c| c.rename == "salinity").unwrap();
        assert_eq!(
            salinity.sources,
            vec![
                "CTD_NeilBrown.sea_water_salinity".to_string(),
                "CTD_Seabird.sea_water_salinity".to_string()
            ]
        );

        // The engineering profile has no shared outputs
        assert!(engineering().unwrap().rename_collisions().is_empty());
    }

    #[test]
    fn test_merge_rejects_clashing_output_names() {
        let a = ParameterMap::from_json(
            r#"{"CTD_Seabird": [{"name": "sea_water_temperature", "rename": "temperature"}]}"#,
        )
        .unwrap();
        let b = ParameterMap::from_json(
            r#"{"Onboard": [{"name": "platform_temperature", "rename": "temperature"}]}"#,
        )
        .unwrap();

        assert!(matches!(a.merge(&b), Err(LrauvError::Configuration { .. })));
    }

    #[test]
    fn test_merge_rejects_redefined_instrument() {
        let a = ParameterMap::from_json(
            r#"{"ISUS": [{"name": "nitrate_a", "rename": "nitrate"}]}"#,
        )
        .unwrap();
        let b = ParameterMap::from_json(
            r#"{"ISUS": [{"name": "nitrate_b", "rename": "nitrate_b"}]}"#,
        )
        .unwrap();

        assert!(a.merge(&b).is_err());
        // Identical definitions merge cleanly
        assert_eq!(a.merge(&a).unwrap(), a);
    }

    #[test]
    fn test_override_replaces_profile() {
        let json = r#"{"CTD_Seabird": [{"name": "sea_water_salinity", "rename": "salinity"}]}"#;
        let map = resolve(Profile::Scieng, Some(json)).unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(map.get("CTD_Seabird").unwrap()[0].rename, "salinity");
    }

    #[test]
    fn test_malformed_overrides_fail_fast() {
        let bad = [
            "not json",
            "{}",
            r#"{"CTD_Seabird": "salinity"}"#,
            r#"{"CTD_Seabird": [{"name": "sea_water_salinity"}]}"#,
            r#"{"CTD_Seabird": [{"name": "a", "rename": "b", "units": "psu"}]}"#,
            r#"{"CTD_Seabird": []}"#,
            r#"{"CTD_Seabird": [{"name": "", "rename": "salinity"}]}"#,
            r#"{"CTD_Seabird": [{"name": "a", "rename": "x"}, {"name": "a", "rename": "y"}]}"#,
        ];
        for json in bad {
            assert!(
                matches!(resolve(Profile::Sci, Some(json)), Err(LrauvError::Configuration { .. })),
                "{json} should be rejected"
            );
        }
    }

    #[test]
    fn test_json_shape_matches_interpolator_format() {
        let map = builtin(Profile::Eng).unwrap();
        let json = map.to_json().unwrap();
        assert!(json.contains(
            r#""MassServo":[{"name":"platform_mass_position","rename":"control_inputs_mass_position"}]"#
        ));
        assert_eq!(ParameterMap::from_json(&json).unwrap(), map);
    }
}
