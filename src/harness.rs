//! Harness configuration: profiles, the user-facing option surface, and the
//! resolved settings handed to the runner.

use std::path::Path;

use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::memory::ReclaimSupport;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    #[default]
    Quick,
    Full,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Quick => "quick",
            Profile::Full => "full",
        }
    }

    pub fn warmup_iters(&self) -> u64 {
        match self {
            Profile::Quick => 3,
            Profile::Full => 5,
        }
    }

    pub fn iters(&self) -> u64 {
        match self {
            Profile::Quick => 20,
            Profile::Full => 50,
        }
    }
}

/// Upper bound on measured iterations per contender and fixture.
pub const MAX_ITERATIONS: u64 = 10_000_000;

/// Recognized options. Missing keys in a config file fall back to the
/// defaults of the file's profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConfigFile")]
pub struct HarnessConfig {
    pub profile: Profile,
    pub warmup_iterations: u64,
    pub measured_iterations: u64,
    /// `None` means use the hint whenever the sampler supports it.
    pub reclaim_hint: Option<bool>,
    /// Iterations between forced reclaims inside the measured phase.
    pub reclaim_cadence: u64,
    pub track_memory: bool,
    /// Also time the input clone alone, for mutating contenders.
    pub baseline_clone: bool,
    /// Fixed seed for contender ordering; a fresh one is drawn when absent.
    pub seed: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::for_profile(Profile::Quick)
    }
}

/// On-disk shape of a config file; every key is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub profile: Option<Profile>,
    pub warmup_iterations: Option<u64>,
    pub measured_iterations: Option<u64>,
    pub reclaim_hint: Option<bool>,
    pub reclaim_cadence: Option<u64>,
    pub track_memory: Option<bool>,
    pub baseline_clone: Option<bool>,
    pub seed: Option<u64>,
}

impl ConfigFile {
    /// Fill unset keys from `profile`, or from the file's own profile when
    /// `profile` is `None`.
    pub fn resolve(self, profile: Option<Profile>) -> HarnessConfig {
        let profile = profile.or(self.profile).unwrap_or_default();
        let base = HarnessConfig::for_profile(profile);
        HarnessConfig {
            profile,
            warmup_iterations: self.warmup_iterations.unwrap_or(base.warmup_iterations),
            measured_iterations: self.measured_iterations.unwrap_or(base.measured_iterations),
            reclaim_hint: self.reclaim_hint,
            reclaim_cadence: self.reclaim_cadence.unwrap_or(base.reclaim_cadence),
            track_memory: self.track_memory.unwrap_or(base.track_memory),
            baseline_clone: self.baseline_clone.unwrap_or(base.baseline_clone),
            seed: self.seed,
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| BenchError::config(format!("{}: {e}", path.display())))
    }
}

impl From<ConfigFile> for HarnessConfig {
    fn from(file: ConfigFile) -> Self {
        file.resolve(None)
    }
}

impl HarnessConfig {
    pub fn for_profile(profile: Profile) -> Self {
        Self {
            profile,
            warmup_iterations: profile.warmup_iters(),
            measured_iterations: profile.iters(),
            reclaim_hint: None,
            reclaim_cadence: 3,
            track_memory: true,
            baseline_clone: false,
            seed: None,
        }
    }

    /// Read a JSON config file. `profile`, when given, replaces the file's
    /// `profile` key and supplies any iteration counts the file leaves unset.
    pub fn from_json_file(path: &Path, profile: Option<Profile>) -> Result<Self> {
        Ok(ConfigFile::from_json_file(path)?.resolve(profile))
    }

    pub fn validate(&self) -> Result<()> {
        if self.measured_iterations == 0 {
            return Err(BenchError::config("measured_iterations must be at least 1"));
        }
        if self.measured_iterations > MAX_ITERATIONS {
            return Err(BenchError::config(format!(
                "measured_iterations must be at most {MAX_ITERATIONS}"
            )));
        }
        if self.reclaim_cadence == 0 {
            return Err(BenchError::config("reclaim_cadence must be at least 1"));
        }
        Ok(())
    }

    /// Seed used for this session, drawing one from the OS when unset.
    pub fn session_seed(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }

    /// Settle the reclaim hint against what the sampler can actually do.
    pub fn resolve(&self, support: ReclaimSupport) -> RunnerConfig {
        let available = support == ReclaimSupport::Available;
        let reclaim = match self.reclaim_hint {
            None => available,
            Some(true) if !available => {
                tracing::warn!("reclaim hint requested but unsupported; continuing without it");
                false
            }
            Some(wanted) => wanted,
        };
        RunnerConfig {
            warmup_iters: self.warmup_iterations,
            iters: self.measured_iterations,
            reclaim,
            reclaim_cadence: self.reclaim_cadence.max(1),
            track_memory: self.track_memory,
            baseline_clone: self.baseline_clone,
        }
    }
}

/// Settings the runner works from, after validation and capability detection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerConfig {
    pub warmup_iters: u64,
    pub iters: u64,
    pub reclaim: bool,
    pub reclaim_cadence: u64,
    pub track_memory: bool,
    pub baseline_clone: bool,
}

/// Derive the RNG for fixture `index` from the session seed.
pub fn fixture_rng(seed: u64, index: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(
        seed.wrapping_add(index as u64)
            .wrapping_mul(0x517cc1b727220a95),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_profile_defaults() {
        let cfg = HarnessConfig::default();
        assert_eq!(cfg.warmup_iterations, 3);
        assert_eq!(cfg.measured_iterations, 20);
        assert_eq!(cfg.reclaim_cadence, 3);
        assert!(cfg.validate().is_ok());

        let full = HarnessConfig::for_profile(Profile::Full);
        assert_eq!(full.measured_iterations, 50);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let cfg = HarnessConfig {
            measured_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(BenchError::Config(_))));
    }

    #[test]
    fn test_zero_cadence_rejected() {
        let cfg = HarnessConfig {
            reclaim_cadence: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_resolve_reclaim() {
        let auto = HarnessConfig::default();
        assert!(auto.resolve(ReclaimSupport::Available).reclaim);
        assert!(!auto.resolve(ReclaimSupport::Unsupported).reclaim);

        let forced = HarnessConfig {
            reclaim_hint: Some(true),
            ..Default::default()
        };
        assert!(!forced.resolve(ReclaimSupport::Unsupported).reclaim);

        let off = HarnessConfig {
            reclaim_hint: Some(false),
            ..Default::default()
        };
        assert!(!off.resolve(ReclaimSupport::Available).reclaim);
    }

    #[test]
    fn test_partial_json_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"measured_iterations": 7, "seed": 11}}"#).unwrap();
        let cfg = HarnessConfig::from_json_file(f.path(), None).unwrap();
        assert_eq!(cfg.measured_iterations, 7);
        assert_eq!(cfg.seed, Some(11));
        assert_eq!(cfg.reclaim_cadence, 3);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"iterations": 7}}"#).unwrap();
        assert!(matches!(
            HarnessConfig::from_json_file(f.path(), None),
            Err(BenchError::Config(_))
        ));
    }

    #[test]
    fn test_too_many_iterations_rejected() {
        let cfg = HarnessConfig {
            measured_iterations: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(BenchError::Config(_))));
    }

    #[test]
    fn test_file_profile_sets_iteration_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"profile": "full"}}"#).unwrap();
        let cfg = HarnessConfig::from_json_file(f.path(), None).unwrap();
        assert_eq!(cfg.profile, Profile::Full);
        assert_eq!(cfg.warmup_iterations, Profile::Full.warmup_iters());
        assert_eq!(cfg.measured_iterations, Profile::Full.iters());

        let parsed: HarnessConfig = serde_json::from_str(r#"{"profile": "full"}"#).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn test_explicit_profile_overrides_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"profile": "quick", "reclaim_cadence": 4}}"#).unwrap();
        let cfg = HarnessConfig::from_json_file(f.path(), Some(Profile::Full)).unwrap();
        assert_eq!(cfg.profile, Profile::Full);
        assert_eq!(cfg.measured_iterations, 50);
        assert_eq!(cfg.reclaim_cadence, 4);

        let mut g = tempfile::NamedTempFile::new().unwrap();
        write!(g, r#"{{"measured_iterations": 7}}"#).unwrap();
        let cfg = HarnessConfig::from_json_file(g.path(), Some(Profile::Full)).unwrap();
        assert_eq!(cfg.measured_iterations, 7);
        assert_eq!(cfg.warmup_iterations, 5);
    }

    #[test]
    fn test_fixture_rng_deterministic() {
        use rand::RngCore;
        let a = fixture_rng(9, 2).next_u64();
        let b = fixture_rng(9, 2).next_u64();
        let c = fixture_rng(9, 3).next_u64();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
