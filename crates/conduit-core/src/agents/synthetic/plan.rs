//! Step plans and their record rendering.

use super::parser::SyntheticRecord;

/// One planned step: phase label plus human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    pub phase: String,
    pub message: String,
}

impl StepPlan {
    pub fn new(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// The fifteen-step run: understanding, clarifying, implementing,
    /// verifying, then a single finalizing step at 100%.
    pub fn standard() -> Vec<StepPlan> {
        let mut steps = Vec::with_capacity(15);
        for message in ["Reading the request", "Mapping the affected code"] {
            steps.push(StepPlan::new("understanding", message));
        }
        for message in [
            "Listing open questions",
            "Checking existing conventions",
            "Settling on an approach",
        ] {
            steps.push(StepPlan::new("clarifying", message));
        }
        for message in [
            "Scaffolding changes",
            "Editing core logic",
            "Updating call sites",
            "Adding tests",
            "Cleaning up",
        ] {
            steps.push(StepPlan::new("implementing", message));
        }
        for message in [
            "Running the build",
            "Running tests",
            "Reviewing the diff",
            "Checking edge cases",
        ] {
            steps.push(StepPlan::new("verifying", message));
        }
        steps.push(StepPlan::new("finalizing", "Preparing the summary"));
        steps
    }

    /// Progress after completing step `index` (1-based) of `total`.
    pub fn progress_for(index: usize, total: usize) -> u8 {
        if total == 0 {
            return 100;
        }
        ((index.min(total) * 100) / total) as u8
    }
}

/// Render a full synthetic run as newline-terminated JSON records.
pub fn render_run(steps: &[StepPlan], output: &str) -> String {
    let mut records = vec![SyntheticRecord::Start {
        message: "Synthetic agent started".to_string(),
    }];
    for (i, step) in steps.iter().enumerate() {
        records.push(SyntheticRecord::Step {
            phase: step.phase.clone(),
            message: step.message.clone(),
            progress: StepPlan::progress_for(i + 1, steps.len()),
        });
    }
    records.push(SyntheticRecord::Done {
        message: "Synthetic run complete".to_string(),
        output: output.to_string(),
    });

    records
        .iter()
        .filter_map(|record| serde_json::to_string(record).ok())
        .map(|line| line + "\n")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_plan_has_fifteen_steps_in_phase_order() {
        let plan = StepPlan::standard();
        assert_eq!(plan.len(), 15);
        let phases: Vec<&str> = plan.iter().map(|s| s.phase.as_str()).collect();
        assert_eq!(&phases[..2], ["understanding"; 2]);
        assert_eq!(&phases[2..5], ["clarifying"; 3]);
        assert_eq!(&phases[5..10], ["implementing"; 5]);
        assert_eq!(&phases[10..14], ["verifying"; 4]);
        assert_eq!(phases[14], "finalizing");
    }

    #[test]
    fn progress_runs_from_six_to_hundred() {
        assert_eq!(StepPlan::progress_for(1, 15), 6);
        assert_eq!(StepPlan::progress_for(2, 15), 13);
        assert_eq!(StepPlan::progress_for(15, 15), 100);
        assert_eq!(StepPlan::progress_for(3, 0), 100);
    }

    #[test]
    fn render_run_emits_one_line_per_record() {
        let text = render_run(&StepPlan::standard(), "patch applied");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 17);
        assert!(lines[0].contains("\"type\":\"start\""));
        assert!(lines[16].contains("\"type\":\"done\""));
        assert!(text.ends_with('\n'));
    }
}
