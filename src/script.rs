//! SQL script runner for `scoreboard sql`.
//!
//! Scripts are split into batches on lines reading `GO`. Statements run in
//! order and each commits on its own; the first failure stops the script.

use crate::error::StoreError;
use crate::store::ScoreStore;
use rusqlite::Batch;
use rusqlite::types::ValueRef;
use std::fmt::Write as _;
use tracing::debug;

/// Rows kept per result set for display.
pub const ROW_PREVIEW: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
        total: usize,
    },
    Affected(usize),
}

/// Split a script on separator lines (`GO`, any case, surrounding whitespace ignored).
pub fn split_batches(script: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();
    for line in script.lines() {
        if line.trim().eq_ignore_ascii_case("go") {
            push_batch(&mut batches, &mut current);
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    push_batch(&mut batches, &mut current);
    batches
}

fn push_batch(batches: &mut Vec<String>, current: &mut String) {
    let batch = current.trim();
    if !batch.is_empty() {
        batches.push(batch.to_string());
    }
    current.clear();
}

impl ScoreStore {
    /// Run a script, creating the database file if needed.
    pub fn run_script(&self, script: &str) -> Result<Vec<StatementOutcome>, StoreError> {
        let conn = self.connect_or_create()?;
        let mut outcomes = Vec::new();

        for (index, sql) in split_batches(script).iter().enumerate() {
            let batch_no = index + 1;
            debug!(batch = batch_no, "Executing batch");
            let fail = |source: rusqlite::Error| StoreError::Statement {
                batch: batch_no,
                source,
            };

            let mut batch = Batch::new(&conn, sql);
            while let Some(mut stmt) = batch.next().map_err(fail)? {
                if stmt.column_count() == 0 {
                    outcomes.push(StatementOutcome::Affected(stmt.execute([]).map_err(fail)?));
                    continue;
                }

                let columns: Vec<String> =
                    stmt.column_names().into_iter().map(str::to_string).collect();
                let width = columns.len();
                let mut rows = Vec::new();
                let mut total = 0;
                let mut cursor = stmt.query([]).map_err(fail)?;
                while let Some(row) = cursor.next().map_err(fail)? {
                    total += 1;
                    if rows.len() < ROW_PREVIEW {
                        let mut cells = Vec::with_capacity(width);
                        for i in 0..width {
                            cells.push(render_value(row.get_ref(i).map_err(fail)?));
                        }
                        rows.push(cells);
                    }
                }
                outcomes.push(StatementOutcome::Rows {
                    columns,
                    rows,
                    total,
                });
            }
        }

        Ok(outcomes)
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

/// Human-readable report of a script run.
pub fn render_report(outcomes: &[StatementOutcome]) -> String {
    let mut out = String::new();
    for (i, outcome) in outcomes.iter().enumerate() {
        let _ = writeln!(out, "[{}/{}]", i + 1, outcomes.len());
        match outcome {
            StatementOutcome::Affected(n) => {
                let _ = writeln!(out, "ok ({n} rows affected)");
            }
            StatementOutcome::Rows { total: 0, .. } => {
                let _ = writeln!(out, "ok (no rows)");
            }
            StatementOutcome::Rows {
                columns,
                rows,
                total,
            } => {
                let header = columns.join(" | ");
                let _ = writeln!(out, "{total} rows");
                let _ = writeln!(out, "{header}");
                let _ = writeln!(out, "{}", "-".repeat(header.len()));
                for row in rows {
                    let _ = writeln!(out, "{}", row.join(" | "));
                }
                if *total > rows.len() {
                    let _ = writeln!(out, "... ({} more rows)", total - rows.len());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_go_lines_only() {
        let script = "CREATE TABLE t (x);\ngo\nINSERT INTO t VALUES ('GOAL');\n  GO  \n\nGO\nSELECT * FROM t;";
        let batches = split_batches(script);
        assert_eq!(
            batches,
            vec![
                "CREATE TABLE t (x);",
                "INSERT INTO t VALUES ('GOAL');",
                "SELECT * FROM t;"
            ]
        );
    }

    #[test]
    fn runs_statements_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScoreStore::new(dir.path().join("s.db"));
        let outcomes = store
            .run_script(
                "CREATE TABLE t (x INTEGER, y TEXT);\nGO\n\
                 INSERT INTO t VALUES (1, 'a'); INSERT INTO t VALUES (2, NULL);\nGO\n\
                 SELECT x, y FROM t ORDER BY x;",
            )
            .unwrap();
        assert_eq!(outcomes[0], StatementOutcome::Affected(0));
        assert_eq!(outcomes[1], StatementOutcome::Affected(1));
        assert_eq!(outcomes[2], StatementOutcome::Affected(1));
        assert_eq!(
            outcomes[3],
            StatementOutcome::Rows {
                columns: vec!["x".into(), "y".into()],
                rows: vec![
                    vec!["1".into(), "a".into()],
                    vec!["2".into(), "NULL".into()]
                ],
                total: 2,
            }
        );
    }

    #[test]
    fn large_result_sets_are_truncated_for_display() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScoreStore::new(dir.path().join("s.db"));
        let outcomes = store
            .run_script(
                "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 150) \
                 SELECT i FROM n;",
            )
            .unwrap();
        let StatementOutcome::Rows { rows, total, .. } = &outcomes[0] else {
            panic!("expected rows");
        };
        assert_eq!(*total, 150);
        assert_eq!(rows.len(), ROW_PREVIEW);
        assert!(render_report(&outcomes).contains("... (50 more rows)"));
    }

    #[test]
    fn failing_batch_reports_its_number() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScoreStore::new(dir.path().join("s.db"));
        let err = store
            .run_script("CREATE TABLE t (x);\nGO\nINSERT INTO missing VALUES (1);")
            .unwrap_err();
        assert!(matches!(err, StoreError::Statement { batch: 2, .. }));
    }

    #[test]
    fn schema_script_prepares_scores_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScoreStore::new(dir.path().join("s.db"));
        store.init().unwrap();
        store
            .run_script("INSERT INTO scores (player_name, score, game_date, created_at) VALUES ('z', 3, '2024-01-01 00:00:00', '2024-01-01 00:00:00');")
            .unwrap();
        assert_eq!(store.scores_for_player("z").unwrap().len(), 1);
    }
}
