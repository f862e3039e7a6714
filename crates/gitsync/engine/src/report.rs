use crate::error::SyncWarning;
use crate::operation::Effect;
use serde::Serialize;

/// Counts of what a committed pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    /// Updates that also rewrote a row's id to the manifest id
    pub reassigned: usize,
    pub deactivated: usize,
    pub reactivated: usize,
    pub roles_granted: usize,
    pub roles_revoked: usize,
    pub children_written: usize,
    pub children_deleted: usize,
    pub warnings: Vec<SyncWarning>,
}

impl SyncReport {
    pub fn record(&mut self, effect: Effect) {
        match effect {
            Effect::Created => self.created += 1,
            Effect::Updated => self.updated += 1,
            Effect::Reassigned => {
                self.updated += 1;
                self.reassigned += 1;
            }
            Effect::Deactivated => self.deactivated += 1,
            Effect::Reactivated => self.reactivated += 1,
            Effect::Roles { granted, revoked } => {
                self.roles_granted += granted;
                self.roles_revoked += revoked;
            }
            Effect::ChildWritten => self.children_written += 1,
            Effect::ChildDeleted => self.children_deleted += 1,
            Effect::Unchanged => {}
        }
    }

    /// Whether any row, grant or child row was written.
    pub fn has_changes(&self) -> bool {
        self.created
            + self.updated
            + self.deactivated
            + self.reactivated
            + self.roles_granted
            + self.roles_revoked
            + self.children_written
            + self.children_deleted
            > 0
    }
}

/// Every change a commit would make, followed by every warning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassignment_counts_as_update() {
        let mut report = SyncReport::default();
        report.record(Effect::Reassigned);
        report.record(Effect::Roles {
            granted: 2,
            revoked: 1,
        });
        report.record(Effect::Unchanged);

        assert_eq!(report.updated, 1);
        assert_eq!(report.reassigned, 1);
        assert_eq!(report.roles_granted, 2);
        assert_eq!(report.roles_revoked, 1);
        assert!(report.has_changes());
    }

    #[test]
    fn empty_report_has_no_changes() {
        let mut report = SyncReport::default();
        report.record(Effect::Unchanged);
        assert!(!report.has_changes());
    }
}
