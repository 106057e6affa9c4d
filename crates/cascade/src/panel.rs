//! Text rendering of the pipeline state for the headless driver.

use std::fmt::Write as _;

use cascade_core::{ChangeLog, Component, EntityId, FrameReport, Registry};

use crate::demo::{C1, C2, C3};

fn cell<C: Component>(registry: &Registry, entity: EntityId, value: impl Fn(&C) -> f32) -> String {
    registry
        .get::<C>(entity)
        .map_or_else(|| "-".to_string(), |c| format!("{:.2}", value(&c)))
}

/// One row per alive entity: index, C1, C2, C3. Absent values print as `-`.
#[must_use]
pub fn entity_table(registry: &Registry) -> String {
    let mut out = format!("{:>6} {:>10} {:>10} {:>10}\n", "entity", "C1", "C2", "C3");
    for entity in registry.entities() {
        let _ = writeln!(
            out,
            "{:>6} {:>10} {:>10} {:>10}",
            entity.index(),
            cell::<C1>(registry, entity, |c| c.v),
            cell::<C2>(registry, entity, |c| c.v),
            cell::<C3>(registry, entity, |c| c.v),
        );
    }
    out
}

/// One line per change-log row with its trigger count.
#[must_use]
pub fn change_log(log: &ChangeLog) -> String {
    let mut out = String::new();
    for (_, _, record) in log.entries() {
        let _ = writeln!(out, "{} (x{})", record.text, record.count);
    }
    out
}

/// One line per system run.
#[must_use]
pub fn frame_summary(report: &FrameReport) -> String {
    let mut out = format!("frame {}\n", report.frame);
    for run in &report.runs {
        match &run.error {
            None => {
                let _ = writeln!(out, "  {:<12} processed {:>4} in {}us", run.name, run.processed, run.elapsed_us);
            }
            Some(error) => {
                let _ = writeln!(out, "  {:<12} FAILED: {error}", run.name);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::Pipeline;
    use cascade_core::EngineConfig;

    #[test]
    fn test_table_marks_missing_values() {
        let mut pipeline = Pipeline::new(&EngineConfig::default()).unwrap();
        pipeline.spawn(5.0).unwrap();

        let before = entity_table(pipeline.registry());
        assert!(before.lines().nth(1).unwrap().ends_with("5.00          -          -"));

        pipeline.frame(0.016);
        let after = entity_table(pipeline.registry());
        assert!(after.lines().nth(1).unwrap().ends_with("5.00       6.00      11.00"));
    }

    #[test]
    fn test_change_log_lines() {
        let mut pipeline = Pipeline::new(&EngineConfig::default()).unwrap();
        let e = pipeline.spawn(1.0).unwrap();
        pipeline.frame(0.016);

        let text = change_log(&pipeline.log().lock());
        let expected = format!(
            "Callback - Type: [C1] created or modified on entity: [{}] (x1)",
            e.index()
        );
        assert_eq!(text.lines().next(), Some(expected.as_str()));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_frame_summary_names_systems() {
        let mut pipeline = Pipeline::new(&EngineConfig::default()).unwrap();
        pipeline.spawn(1.0).unwrap();
        let summary = frame_summary(&pipeline.frame(0.016));
        assert!(summary.starts_with("frame 1"));
        assert!(summary.contains("system_a"));
        assert!(summary.contains("system_b"));
    }
}
