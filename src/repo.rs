use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::{EntryWindow, GradeRecord, GradeWrite, RecordFilter, WriteSummary};
use crate::normalize::normalize_label;
use crate::sheet::{self, SheetFile};

#[async_trait]
pub trait GradeRepository: Send + Sync {
    async fn load_records(&self, filter: &RecordFilter) -> anyhow::Result<Vec<GradeRecord>>;

    async fn append_or_update(&self, writes: &[GradeWrite]) -> anyhow::Result<WriteSummary>;

    async fn entry_windows(&self) -> anyhow::Result<Vec<EntryWindow>>;

    async fn set_entry_window(&self, window: &EntryWindow) -> anyhow::Result<()>;

    /// Monotonic token that changes whenever stored grades change.
    async fn store_version(&self) -> anyhow::Result<u64>;
}

pub fn is_update_target(
    record: &GradeRecord,
    student_id: &str,
    grade_level: &str,
    subject: &str,
    period: &str,
    category: crate::models::Category,
) -> bool {
    normalize_label(&record.student_id) == normalize_label(student_id)
        && normalize_label(&record.grade_level) == normalize_label(grade_level)
        && normalize_label(&record.subject) == normalize_label(subject)
        && normalize_label(&record.period) == normalize_label(period)
        && record.category == category
}

#[derive(Debug)]
struct SnapshotState {
    records: Vec<GradeRecord>,
    // Sheet row of each record.
    rows: Vec<usize>,
    sheet: SheetFile,
    windows: Vec<EntryWindow>,
    version: u64,
}

/// In-memory store over a CSV export of the grade sheet.
#[derive(Debug)]
pub struct SnapshotStore {
    state: RwLock<SnapshotState>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl SnapshotStore {
    pub fn new(records: Vec<GradeRecord>, windows: Vec<EntryWindow>) -> Self {
        let (sheet, rows) = SheetFile::from_records(&records);
        Self::with_sheet(records, rows, sheet, windows)
    }

    fn with_sheet(
        records: Vec<GradeRecord>,
        rows: Vec<usize>,
        sheet: SheetFile,
        windows: Vec<EntryWindow>,
    ) -> Self {
        Self {
            state: RwLock::new(SnapshotState {
                records,
                rows,
                sheet,
                windows,
                version: 0,
            }),
        }
    }

    pub fn from_csv(grades: &Path, windows: Option<&Path>) -> anyhow::Result<Self> {
        let (sheet, loaded) = SheetFile::read(grades)?;
        let (rows, records): (Vec<usize>, Vec<GradeRecord>) = loaded.into_iter().unzip();
        let windows = match windows {
            Some(path) if path.exists() => sheet::read_entry_windows(path)?,
            _ => Vec::new(),
        };
        info!(
            path = %grades.display(),
            rows = sheet.len(),
            records = records.len(),
            windows = windows.len(),
            "Loaded grade snapshot"
        );
        Ok(Self::with_sheet(records, rows, sheet, windows))
    }

    pub async fn save_csv(&self, grades: &Path, windows: Option<&Path>) -> anyhow::Result<()> {
        let state = self.state.read().await;
        state.sheet.write(grades)?;
        if let Some(path) = windows {
            sheet::write_entry_windows(path, &state.windows)?;
        }
        debug!(path = %grades.display(), rows = state.sheet.len(), "Saved grade snapshot");
        Ok(())
    }
}

#[async_trait]
impl GradeRepository for SnapshotStore {
    async fn load_records(&self, filter: &RecordFilter) -> anyhow::Result<Vec<GradeRecord>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    async fn append_or_update(&self, writes: &[GradeWrite]) -> anyhow::Result<WriteSummary> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut summary = WriteSummary::default();

        for write in writes {
            match write {
                GradeWrite::Append(record) => {
                    let row = state.sheet.append(record);
                    state.records.push(record.clone());
                    state.rows.push(row);
                    summary.appended += 1;
                }
                GradeWrite::UpdateScore {
                    student_id,
                    grade_level,
                    subject,
                    period,
                    category,
                    score,
                } => {
                    let target = state.records.iter().position(|record| {
                        is_update_target(record, student_id, grade_level, subject, period, *category)
                    });
                    match target {
                        Some(index) => {
                            state.records[index].score = *score;
                            state.sheet.set_score(state.rows[index], *score);
                            summary.updated += 1;
                        }
                        None => warn!(%student_id, %subject, %period, "No row to update"),
                    }
                }
            }
        }

        if summary.changed() {
            state.version += 1;
        }
        Ok(summary)
    }

    async fn entry_windows(&self) -> anyhow::Result<Vec<EntryWindow>> {
        Ok(self.state.read().await.windows.clone())
    }

    async fn set_entry_window(&self, window: &EntryWindow) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        let position = state
            .windows
            .iter()
            .position(|existing| normalize_label(&existing.period) == normalize_label(&window.period));
        match position {
            Some(index) => state.windows[index] = window.clone(),
            None => state.windows.push(window.clone()),
        }
        Ok(())
    }

    async fn store_version(&self) -> anyhow::Result<u64> {
        Ok(self.state.read().await.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{record, student_record};
    use crate::models::Category;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn filters_in_source_order() {
        let store = SnapshotStore::new(
            vec![
                record("MATH", Category::Monthly, 7.0),
                student_record("Bruno Lima", "2025002", "MATH", Category::Monthly, 5.0),
                record("ART", Category::Monthly, 9.0),
            ],
            Vec::new(),
        );

        let filter = RecordFilter::student("6º ano", "Ana Souza", "2025001", "1º");
        let records = store.load_records(&filter).await.unwrap();
        let subjects: Vec<&str> = records.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(subjects, vec!["MATH", "ART"]);
    }

    #[tokio::test]
    async fn writes_bump_the_version_only_when_something_changed() {
        let store = SnapshotStore::new(vec![record("MATH", Category::Monthly, 7.0)], Vec::new());
        assert_eq!(store.store_version().await.unwrap(), 0);

        let missing = GradeWrite::UpdateScore {
            student_id: "9999".to_string(),
            grade_level: "6º ANO".to_string(),
            subject: "MATH".to_string(),
            period: "1º".to_string(),
            category: Category::Monthly,
            score: 9.0,
        };
        let summary = store.append_or_update(&[missing]).await.unwrap();
        assert!(!summary.changed());
        assert_eq!(store.store_version().await.unwrap(), 0);

        let writes = vec![
            GradeWrite::UpdateScore {
                student_id: "2025001".to_string(),
                grade_level: "6º ano".to_string(),
                subject: "math".to_string(),
                period: "1º".to_string(),
                category: Category::Monthly,
                score: 9.0,
            },
            GradeWrite::Append(record("MATH", Category::Bimonthly, 8.0)),
        ];
        let summary = store.append_or_update(&writes).await.unwrap();
        assert_eq!(summary, WriteSummary { appended: 1, updated: 1 });
        assert_eq!(store.store_version().await.unwrap(), 1);

        let records = store.load_records(&RecordFilter::default()).await.unwrap();
        assert_eq!(records[0].score, 9.0);
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn set_entry_window_replaces_existing_period() {
        let store = SnapshotStore::default();
        let date = |d| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
        store
            .set_entry_window(&EntryWindow {
                period: "1º".to_string(),
                opens_on: date(1),
                closes_on: date(10),
            })
            .await
            .unwrap();
        store
            .set_entry_window(&EntryWindow {
                period: "1º".to_string(),
                opens_on: date(2),
                closes_on: date(20),
            })
            .await
            .unwrap();

        let windows = store.entry_windows().await.unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].closes_on, date(20));
    }

    #[tokio::test]
    async fn saved_snapshot_can_be_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grades.csv");
        let store = SnapshotStore::new(
            vec![
                record("MATH", Category::Monthly, 6.5),
                record("MATH", Category::FinalRecovery, 8.25),
            ],
            Vec::new(),
        );
        store.save_csv(&path, None).await.unwrap();

        let reloaded = SnapshotStore::from_csv(&path, None).unwrap();
        let records = reloaded.load_records(&RecordFilter::default()).await.unwrap();
        assert_eq!(records[0].score, 6.5);
        assert_eq!(records[1].category, Category::FinalRecovery);
        assert_eq!(records[1].teacher_id, "P100");
    }

    #[tokio::test]
    async fn saving_an_entry_preserves_the_rest_of_the_sheet() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notas.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "Nome do Aluno,Matrícula,Série,Turno,Bimestre,Componente Curricular,Tipo de Avaliação,Nota,Professor,Mat_Professor"
        )
        .unwrap();
        writeln!(file, "Ana Souza,2025001,6º ano,Manhã,1º,Matemática,Mensal,7,Carla,P100").unwrap();
        writeln!(file, "Ana Souza,2025001,6º ano,Manhã,1º,Matemática,Simulado,9,Carla,P100").unwrap();
        writeln!(file, "Ana Souza,2025001,6º ano,Manhã,1º,Ciências,Mensal,5,Diego,P200").unwrap();
        drop(file);

        let store = SnapshotStore::from_csv(&path, None).unwrap();
        let update = GradeWrite::UpdateScore {
            student_id: "2025001".to_string(),
            grade_level: "6º ANO".to_string(),
            subject: "CIÊNCIAS".to_string(),
            period: "1º".to_string(),
            category: Category::Monthly,
            score: 6.0,
        };
        let summary = store.append_or_update(&[update]).await.unwrap();
        assert_eq!(summary.updated, 1);
        store.save_csv(&path, None).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Nome do Aluno,"));
        assert_eq!(lines[1], "Ana Souza,2025001,6º ano,Manhã,1º,Matemática,Mensal,7,Carla,P100");
        assert_eq!(lines[2], "Ana Souza,2025001,6º ano,Manhã,1º,Matemática,Simulado,9,Carla,P100");
        assert_eq!(lines[3], "Ana Souza,2025001,6º ano,Manhã,1º,Ciências,Mensal,6,Diego,P200");

        let reloaded = SnapshotStore::from_csv(&path, None).unwrap();
        let records = reloaded.load_records(&RecordFilter::default()).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].score, 6.0);
    }
}
