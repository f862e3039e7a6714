//! Output formatting

use crate::error::{CliError, CliResult};
use gitsync_engine::{Plan, SyncReport, ValidationReport};

/// Output format for `gitsync plan`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PlanFormat {
    /// One description per operation, then warnings
    #[default]
    Text,
    Json,
    Yaml,
}

pub fn render_plan(plan: &Plan, format: PlanFormat) -> CliResult<String> {
    match format {
        PlanFormat::Text if plan.is_empty() => Ok("no changes".to_string()),
        PlanFormat::Text => Ok(plan.describe().join("\n")),
        PlanFormat::Json => {
            serde_json::to_string_pretty(plan).map_err(|e| CliError::Output(e.to_string()))
        }
        PlanFormat::Yaml => serde_yaml::to_string(plan).map_err(|e| CliError::Output(e.to_string())),
    }
}

pub fn render_validation(report: &ValidationReport) -> String {
    if report.is_clean() {
        return "manifest is in sync".to_string();
    }
    let mut lines = vec![format!("{} difference(s):", report.issues.len())];
    lines.extend(report.issues.iter().map(|issue| format!("  {issue}")));
    lines.join("\n")
}

pub fn render_report(report: &SyncReport) -> String {
    let mut lines = vec![format!(
        "created {}, updated {} ({} reassigned), deactivated {}, reactivated {}",
        report.created, report.updated, report.reassigned, report.deactivated, report.reactivated
    )];
    lines.push(format!(
        "roles granted {}, revoked {}; child rows written {}, deleted {}",
        report.roles_granted,
        report.roles_revoked,
        report.children_written,
        report.children_deleted
    ));
    lines.extend(report.warnings.iter().map(|w| format!("warning: {w}")));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitsync_engine::SyncWarning;
    use gitsync_types::EntityKind;
    use uuid::Uuid;

    #[test]
    fn test_empty_plan_renders_no_changes() {
        let plan = Plan::default();
        assert_eq!(render_plan(&plan, PlanFormat::Text).unwrap(), "no changes");

        let json: serde_json::Value =
            serde_json::from_str(&render_plan(&plan, PlanFormat::Json).unwrap()).unwrap();
        assert!(json["queue"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_validation_lists_differences() {
        let clean = ValidationReport::default();
        assert_eq!(render_validation(&clean), "manifest is in sync");

        let dirty = ValidationReport {
            issues: vec!["would create Organization 'Acme'".into()],
        };
        let text = render_validation(&dirty);
        assert!(text.starts_with("1 difference(s):"));
        assert!(text.contains("would create Organization 'Acme'"));
    }

    #[test]
    fn test_report_includes_warnings() {
        let report = SyncReport {
            created: 2,
            warnings: vec![SyncWarning::MissingContent {
                kind: EntityKind::Agent,
                id: Uuid::nil(),
                path: "agents/triage.yaml".into(),
            }],
            ..SyncReport::default()
        };
        let text = render_report(&report);
        assert!(text.starts_with("created 2, updated 0"));
        assert!(text.contains("warning:"));
        assert!(text.contains("agents/triage.yaml"));
    }
}
