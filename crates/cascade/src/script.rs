//! # Demo Script
//!
//! A TOML file describing a headless run: initial C1 values, then per-frame
//! spawns, edits and destroys, applied before the frame they name.
//!
//! ```toml
//! frames = 3
//! delta_time = 0.016666668
//! initial = [5.0]
//!
//! [engine]
//! warn_on_late_reads = true
//!
//! [[edit]]
//! frame = 2
//! entity = 0
//! value = 10.0
//! ```
//!
//! Entities are addressed by spawn order: `initial` first, then `[[spawn]]`
//! entries as they happen.

use std::path::Path;

use anyhow::{bail, Context, Result};
use cascade_core::{EngineConfig, FrameReport};
use serde::Deserialize;

use crate::demo::Pipeline;

/// Sets C1 of a spawned entity.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Edit {
    /// Frame the edit lands before (1-based).
    pub frame: u32,
    /// Spawn-order index of the entity.
    pub entity: usize,
    /// New C1 value.
    pub value: f32,
}

/// Creates an entity with a C1 value.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Spawn {
    /// Frame the spawn lands before (1-based).
    pub frame: u32,
    /// Initial C1 value.
    pub value: f32,
}

/// Destroys a spawned entity.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Destroy {
    /// Frame the destroy lands before (1-based).
    pub frame: u32,
    /// Spawn-order index of the entity.
    pub entity: usize,
}

/// A scripted headless run.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    /// Frames to run.
    pub frames: u32,
    /// Seconds per frame.
    pub delta_time: f32,
    /// C1 values of the entities created before the first frame.
    pub initial: Vec<f32>,
    /// Engine settings.
    pub engine: EngineConfig,
    /// Scripted edits.
    #[serde(rename = "edit")]
    pub edits: Vec<Edit>,
    /// Scripted spawns.
    #[serde(rename = "spawn")]
    pub spawns: Vec<Spawn>,
    /// Scripted destroys.
    #[serde(rename = "destroy")]
    pub destroys: Vec<Destroy>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frames: 3,
            delta_time: 1.0 / 60.0,
            initial: vec![5.0],
            engine: EngineConfig::default(),
            edits: Vec::new(),
            spawns: Vec::new(),
            destroys: Vec::new(),
        }
    }
}

impl DemoConfig {
    /// Parses a script from TOML text.
    ///
    /// # Errors
    ///
    /// Fails on invalid TOML, unknown keys, or a non-positive delta time.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("invalid demo script")?;
        if config.delta_time <= 0.0 {
            bail!("delta_time must be positive, got {}", config.delta_time);
        }
        Ok(config)
    }

    /// Reads and parses a script file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }
}

/// Runs `config` on a fresh pipeline.
///
/// Returns the pipeline (for inspection) and one report per frame.
///
/// # Errors
///
/// Fails if the pipeline cannot be built or an action names an entity that
/// was never spawned or is no longer alive.
pub fn run(config: &DemoConfig) -> Result<(Pipeline, Vec<FrameReport>)> {
    let mut pipeline = Pipeline::new(&config.engine)?;
    for &value in &config.initial {
        pipeline.spawn(value)?;
    }

    let mut reports = Vec::with_capacity(config.frames as usize);
    for frame in 1..=config.frames {
        apply(&mut pipeline, config, frame)?;

        let report = pipeline.frame(config.delta_time);
        for failure in report.failures() {
            tracing::warn!(frame, system = %failure.name, "system failed; entities retried next frame");
        }
        reports.push(report);
    }
    Ok((pipeline, reports))
}

fn apply(pipeline: &mut Pipeline, config: &DemoConfig, frame: u32) -> Result<()> {
    for spawn in config.spawns.iter().filter(|s| s.frame == frame) {
        pipeline.spawn(spawn.value)?;
    }

    for edit in config.edits.iter().filter(|e| e.frame == frame) {
        let Some(entity) = pipeline.spawned(edit.entity) else {
            bail!("frame {frame}: edit of entity #{} which was never spawned", edit.entity);
        };
        pipeline
            .edit(entity, edit.value)
            .with_context(|| format!("frame {frame}: edit of entity #{}", edit.entity))?;
    }

    for destroy in config.destroys.iter().filter(|d| d.frame == frame) {
        let Some(entity) = pipeline.spawned(destroy.entity) else {
            bail!("frame {frame}: destroy of entity #{} which was never spawned", destroy.entity);
        };
        if !pipeline.destroy(entity) {
            bail!("frame {frame}: entity #{} is already destroyed", destroy.entity);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::{C1, C2, C3};

    const SCRIPT: &str = r#"
        frames = 3
        initial = [5.0, 1.0]

        [engine]
        warn_on_late_reads = false

        [[edit]]
        frame = 2
        entity = 0
        value = 10.0

        [[spawn]]
        frame = 3
        value = 0.5

        [[destroy]]
        frame = 3
        entity = 1
    "#;

    #[test]
    fn test_parse_script() {
        let config = DemoConfig::from_toml_str(SCRIPT).unwrap();
        assert_eq!(config.frames, 3);
        assert_eq!(config.initial, vec![5.0, 1.0]);
        assert!(!config.engine.warn_on_late_reads);
        assert_eq!(
            config.edits,
            vec![Edit {
                frame: 2,
                entity: 0,
                value: 10.0
            }]
        );
        assert_eq!(config.spawns.len(), 1);
        assert_eq!(config.destroys.len(), 1);
    }

    #[test]
    fn test_empty_script_uses_defaults() {
        assert_eq!(DemoConfig::from_toml_str("").unwrap(), DemoConfig::default());
    }

    #[test]
    fn test_rejects_bad_delta_time() {
        assert!(DemoConfig::from_toml_str("delta_time = 0.0").is_err());
        assert!(DemoConfig::from_toml_str("speed = 2").is_err());
    }

    #[test]
    fn test_run_script() {
        let config = DemoConfig::from_toml_str(SCRIPT).unwrap();
        let (pipeline, reports) = run(&config).unwrap();

        assert_eq!(reports.len(), 3);
        // Frame 1: both initial entities through both systems
        assert_eq!(reports[0].processed(), 4);
        // Frame 2: one edit
        assert_eq!(reports[1].processed(), 2);

        let first = pipeline.spawned(0).unwrap();
        assert_eq!(pipeline.registry().get::<C1>(first), Some(C1 { v: 10.0 }));
        assert_eq!(pipeline.registry().get::<C2>(first), Some(C2 { v: 11.0 }));
        assert_eq!(pipeline.registry().get::<C3>(first), Some(C3 { v: 21.0 }));

        let destroyed = pipeline.spawned(1).unwrap();
        assert!(!pipeline.registry().is_alive(destroyed));

        let late = pipeline.spawned(2).unwrap();
        assert_eq!(pipeline.registry().get::<C3>(late), Some(C3 { v: 2.0 }));
    }

    #[test]
    fn test_edit_of_unknown_entity_fails() {
        let config = DemoConfig::from_toml_str(
            r#"
            initial = []
            [[edit]]
            frame = 1
            entity = 0
            value = 1.0
            "#,
        )
        .unwrap();
        let err = run(&config).err().unwrap();
        assert!(err.to_string().contains("never spawned"));
    }
}
