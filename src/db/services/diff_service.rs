use tracing::warn;

use crate::db::enums::DefinitionStatus;
use crate::db::models::DefinitionsDiff;
use crate::db::services::definition_store::DefinitionRow;

/// The slice of snapshot history a diff covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffWindow {
    /// No usable baseline: every ACTIVE definition, no disable list.
    Full { upto: i64 },
    /// Rows stamped in `(after, upto]`.
    Since { after: i64, upto: i64 },
    /// Baseline is the current snapshot; nothing to report.
    UpToDate { at: i64 },
}

impl DiffWindow {
    pub fn new(since: Option<i64>, current: i64) -> Self {
        match since {
            None => DiffWindow::Full { upto: current },
            Some(baseline) if baseline == current => DiffWindow::UpToDate { at: current },
            Some(baseline) if baseline > current => {
                warn!(
                    baseline,
                    current, "Diff baseline is ahead of the registry, sending a full snapshot."
                );
                DiffWindow::Full { upto: current }
            }
            Some(baseline) => DiffWindow::Since {
                after: baseline,
                upto: current,
            },
        }
    }

    pub fn snapshot_id(&self) -> i64 {
        match *self {
            DiffWindow::Full { upto } | DiffWindow::Since { upto, .. } => upto,
            DiffWindow::UpToDate { at } => at,
        }
    }

    /// Exclusive lower bound on `last_modified_snapshot_id`, `None` for a full snapshot.
    pub fn after(&self) -> Option<i64> {
        match *self {
            DiffWindow::Since { after, .. } => Some(after),
            _ => None,
        }
    }

    pub fn needs_rows(&self) -> bool {
        !matches!(self, DiffWindow::UpToDate { .. })
    }

    pub fn reports_disabled(&self) -> bool {
        matches!(self, DiffWindow::Since { .. })
    }
}

/// Builds the diff payload; empty categories are reported as absent.
pub fn assemble<T>(window: DiffWindow, changed: Vec<T>, disabled: Vec<i32>) -> DefinitionsDiff<T> {
    let (changed_definitions, disabled_definitions) = match window {
        DiffWindow::UpToDate { .. } => (None, None),
        DiffWindow::Full { .. } => (non_empty(changed), None),
        DiffWindow::Since { .. } => (non_empty(changed), non_empty(disabled)),
    };
    DefinitionsDiff {
        snapshot_id: window.snapshot_id(),
        disabled_definitions,
        changed_definitions,
    }
}

/// Splits diff rows into ACTIVE definitions and the ids of everything else.
///
/// A row created INACTIVE inside the window is disabled, not changed.
pub fn classify<R: DefinitionRow>(rows: Vec<R>) -> (Vec<R>, Vec<i32>) {
    let mut changed = Vec::new();
    let mut disabled = Vec::new();
    for row in rows {
        if row.status() == DefinitionStatus::Active {
            changed.push(row);
        } else {
            disabled.push(row.id());
        }
    }
    (changed, disabled)
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() { None } else { Some(items) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Row(i32, DefinitionStatus);

    impl DefinitionRow for Row {
        fn id(&self) -> i32 {
            self.0
        }

        fn status(&self) -> DefinitionStatus {
            self.1
        }
    }

    #[test]
    fn test_classify_splits_active_from_disabled() {
        let (changed, disabled) = classify(vec![
            Row(1, DefinitionStatus::Active),
            Row(2, DefinitionStatus::Inactive),
            Row(3, DefinitionStatus::Deleted),
            Row(4, DefinitionStatus::Active),
        ]);
        assert_eq!(changed, vec![Row(1, DefinitionStatus::Active), Row(4, DefinitionStatus::Active)]);
        assert_eq!(disabled, vec![2, 3]);
    }

    #[test]
    fn test_window_selection() {
        assert_eq!(DiffWindow::new(None, 5), DiffWindow::Full { upto: 5 });
        assert_eq!(DiffWindow::new(Some(5), 5), DiffWindow::UpToDate { at: 5 });
        assert_eq!(DiffWindow::new(Some(9), 5), DiffWindow::Full { upto: 5 });
        assert_eq!(
            DiffWindow::new(Some(2), 5),
            DiffWindow::Since { after: 2, upto: 5 }
        );
    }

    #[test]
    fn test_up_to_date_diff_has_no_lists() {
        let diff = assemble(DiffWindow::UpToDate { at: 3 }, vec!["ignored"], vec![1]);
        assert_eq!(diff.snapshot_id, 3);
        assert!(diff.changed_definitions.is_none());
        assert!(diff.disabled_definitions.is_none());
    }

    #[test]
    fn test_full_diff_never_reports_disabled() {
        let diff = assemble(DiffWindow::Full { upto: 7 }, vec!["a", "b"], vec![4]);
        assert_eq!(diff.snapshot_id, 7);
        assert_eq!(diff.changed_definitions, Some(vec!["a", "b"]));
        assert!(diff.disabled_definitions.is_none());
    }

    #[test]
    fn test_since_diff_drops_empty_categories() {
        let diff = assemble::<&str>(DiffWindow::Since { after: 1, upto: 2 }, vec![], vec![9]);
        assert!(diff.changed_definitions.is_none());
        assert_eq!(diff.disabled_definitions, Some(vec![9]));
    }
}
