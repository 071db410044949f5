use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use csv::StringRecord;
use serde::Deserialize;
use tracing::warn;

use crate::error::GradebookError;
use crate::models::{Category, EntryWindow, GradeRecord};
use crate::normalize::{normalize_label, normalize_score};

/// One row of the grade sheet export. Accepts both the English column names
/// and the headers of the school's spreadsheet.
#[derive(Debug, Clone, Deserialize)]
pub struct SheetRow {
    #[serde(alias = "Nome do Aluno")]
    pub student_name: String,
    #[serde(alias = "Matrícula")]
    pub student_id: String,
    #[serde(alias = "Série")]
    pub grade_level: String,
    #[serde(default, alias = "Turno")]
    pub shift: String,
    #[serde(alias = "Bimestre")]
    pub period: String,
    #[serde(alias = "Componente Curricular")]
    pub subject: String,
    #[serde(alias = "Tipo de Avaliação")]
    pub category: String,
    #[serde(default, alias = "Nota")]
    pub score: Option<String>,
    #[serde(default, alias = "Professor")]
    pub teacher_name: String,
    #[serde(default, alias = "Mat_Professor")]
    pub teacher_id: String,
}

impl SheetRow {
    pub fn into_record(self) -> Result<GradeRecord, GradebookError> {
        let category: Category = self.category.parse()?;
        Ok(GradeRecord {
            student_name: self.student_name.trim().to_string(),
            student_id: normalize_label(&self.student_id),
            grade_level: normalize_label(&self.grade_level),
            shift: normalize_label(&self.shift),
            period: normalize_label(&self.period),
            subject: normalize_label(&self.subject),
            category,
            score: normalize_score(self.score.as_deref()),
            teacher_name: self.teacher_name.trim().to_string(),
            teacher_id: normalize_label(&self.teacher_id),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WindowRow {
    #[serde(alias = "Bimestre")]
    period: String,
    #[serde(alias = "Data Início")]
    opens_on: String,
    #[serde(alias = "Data Fim")]
    closes_on: String,
}

pub fn read_sheet_rows(path: &Path) -> anyhow::Result<Vec<SheetRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open grade sheet {}", path.display()))?;
    let mut rows = Vec::new();
    for result in reader.deserialize::<SheetRow>() {
        rows.push(result?);
    }
    Ok(rows)
}

// Field order matches `SheetRow`: English name, then the spreadsheet header.
const COLUMNS: [(&str, &str); 10] = [
    ("student_name", "Nome do Aluno"),
    ("student_id", "Matrícula"),
    ("grade_level", "Série"),
    ("shift", "Turno"),
    ("period", "Bimestre"),
    ("subject", "Componente Curricular"),
    ("category", "Tipo de Avaliação"),
    ("score", "Nota"),
    ("teacher_name", "Professor"),
    ("teacher_id", "Mat_Professor"),
];
const CATEGORY: usize = 6;
const SCORE: usize = 7;

/// The grade sheet as written on disk. Rows are kept verbatim, including the
/// ones no record could be built from, so saving only adds rows and rewrites
/// score cells.
#[derive(Debug, Clone)]
pub struct SheetFile {
    headers: StringRecord,
    rows: Vec<StringRecord>,
    columns: [usize; 10],
    spreadsheet_labels: bool,
}

impl SheetFile {
    /// Reads the sheet and the records it holds, each paired with its row index.
    pub fn read(path: &Path) -> anyhow::Result<(Self, Vec<(usize, GradeRecord)>)> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open grade sheet {}", path.display()))?;
        let headers = reader.headers()?.clone();
        let mut rows = Vec::new();
        let mut records = Vec::new();

        for (index, result) in reader.records().enumerate() {
            let row = result?;
            let parsed: SheetRow = row.deserialize(Some(&headers))?;
            match parsed.into_record() {
                Ok(record) => records.push((index, record)),
                Err(err) => warn!(line = index + 2, error = %err, "Skipping grade row"),
            }
            rows.push(row);
        }

        let mut sheet = Self {
            headers,
            rows,
            columns: [0; 10],
            spreadsheet_labels: false,
        };
        sheet.index_columns();
        Ok((sheet, records))
    }

    pub fn from_records(records: &[GradeRecord]) -> (Self, Vec<usize>) {
        let mut sheet = Self {
            headers: COLUMNS.iter().map(|(name, _)| *name).collect(),
            rows: Vec::new(),
            columns: std::array::from_fn(|slot| slot),
            spreadsheet_labels: false,
        };
        let rows = records.iter().map(|record| sheet.append(record)).collect();
        (sheet, rows)
    }

    // Missing optional columns are added at the end, blank for existing rows.
    fn index_columns(&mut self) {
        for (slot, (name, alias)) in COLUMNS.iter().enumerate() {
            let found = self
                .headers
                .iter()
                .position(|header| header == *name || header == *alias);
            self.columns[slot] = match found {
                Some(position) => position,
                None => {
                    self.headers.push_field(name);
                    for row in &mut self.rows {
                        row.push_field("");
                    }
                    self.headers.len() - 1
                }
            };
        }
        self.spreadsheet_labels = self.headers.get(self.columns[CATEGORY]) == Some(COLUMNS[CATEGORY].1);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn append(&mut self, record: &GradeRecord) -> usize {
        let category = if self.spreadsheet_labels {
            record.category.sheet_label()
        } else {
            record.category.as_str()
        };
        let score = self.format_score(record.score);
        let values = [
            record.student_name.as_str(),
            record.student_id.as_str(),
            record.grade_level.as_str(),
            record.shift.as_str(),
            record.period.as_str(),
            record.subject.as_str(),
            category,
            score.as_str(),
            record.teacher_name.as_str(),
            record.teacher_id.as_str(),
        ];
        let mut row = vec![String::new(); self.headers.len()];
        for (slot, value) in values.into_iter().enumerate() {
            row[self.columns[slot]] = value.to_string();
        }
        self.rows.push(StringRecord::from(row));
        self.rows.len() - 1
    }

    pub fn set_score(&mut self, row: usize, score: f64) {
        let score = self.format_score(score);
        let column = self.columns[SCORE];
        if let Some(existing) = self.rows.get_mut(row) {
            *existing = existing
                .iter()
                .enumerate()
                .map(|(index, field)| if index == column { score.as_str() } else { field })
                .collect();
        }
    }

    fn format_score(&self, score: f64) -> String {
        let score = score.to_string();
        if self.spreadsheet_labels {
            score.replace('.', ",")
        } else {
            score
        }
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to write grade sheet {}", path.display()))?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

pub fn read_entry_windows(path: &Path) -> anyhow::Result<Vec<EntryWindow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open entry windows {}", path.display()))?;
    let mut windows = Vec::new();
    for result in reader.deserialize::<WindowRow>() {
        let row = result?;
        windows.push(EntryWindow {
            period: normalize_label(&row.period),
            opens_on: parse_window_date(&row.opens_on)?,
            closes_on: parse_window_date(&row.closes_on)?,
        });
    }
    Ok(windows)
}

pub fn write_entry_windows(path: &Path, windows: &[EntryWindow]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["period", "opens_on", "closes_on"])?;
    for window in windows {
        writer.write_record([
            window.period.clone(),
            format_date(window.opens_on),
            format_date(window.closes_on),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

// dd/mm/yyyy as in the sheet, or ISO.
pub fn parse_window_date(value: &str) -> Result<NaiveDate, GradebookError> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map_err(|_| GradebookError::InvalidDate(value.to_string()))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_spreadsheet_headers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "Nome do Aluno,Matrícula,Série,Turno,Bimestre,Componente Curricular,Tipo de Avaliação,Nota,Professor,Mat_Professor"
        )
        .unwrap();
        writeln!(file, "Ana Souza,2025001,6º ano,Manhã,1º,Matemática,Mensal,\"8,5\",Carla,p100").unwrap();
        writeln!(file, "Ana Souza,2025001,6º ano,Manhã,1º,Matemática,Simulado,9,Carla,p100").unwrap();
        writeln!(file, "Ana Souza,2025001,6º ano,Manhã,1º,Matemática,Bimestral,,Carla,p100").unwrap();

        let (sheet, records) = SheetFile::read(file.path()).unwrap();
        let records: Vec<GradeRecord> = records.into_iter().map(|(_, record)| record).collect();
        assert_eq!(sheet.len(), 3);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].grade_level, "6º ANO");
        assert_eq!(records[0].subject, "MATEMÁTICA");
        assert_eq!(records[0].teacher_id, "P100");
        assert_eq!(records[0].score, 8.5);
        assert_eq!(records[1].category, Category::Bimonthly);
        assert_eq!(records[1].score, 0.0);
    }

    #[test]
    fn reads_english_headers_without_optional_columns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "student_name,student_id,grade_level,period,subject,category,score").unwrap();
        writeln!(file, "Bruno Lima,2025002,7A,2,History,RECOVERY,7.5").unwrap();

        let (_, records) = SheetFile::read(file.path()).unwrap();
        assert_eq!(records.len(), 1);
        let (row, record) = &records[0];
        assert_eq!(*row, 0);
        assert_eq!(record.shift, "");
        assert_eq!(record.teacher_id, "");
        assert_eq!(record.category, Category::Recovery);
    }

    #[test]
    fn saving_keeps_unparsed_rows_and_original_cells() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "Nome do Aluno,Matrícula,Série,Turno,Bimestre,Componente Curricular,Tipo de Avaliação,Nota,Professor,Mat_Professor"
        )
        .unwrap();
        writeln!(file, "Ana Souza,2025001,6º ano,Manhã,1º,Matemática,Mensal,7,Carla,p100").unwrap();
        writeln!(file, "Ana Souza,2025001,6º ano,Manhã,1º,Matemática,Simulado,9,Carla,p100").unwrap();
        file.flush().unwrap();

        let (mut sheet, records) = SheetFile::read(file.path()).unwrap();
        let (row, mut record) = records[0].clone();
        sheet.set_score(row, 8.5);
        record.category = Category::Bimonthly;
        record.score = 6.0;
        assert_eq!(sheet.append(&record), 2);
        sheet.write(file.path()).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Nome do Aluno,Matrícula,"));
        assert_eq!(lines[1], "Ana Souza,2025001,6º ano,Manhã,1º,Matemática,Mensal,\"8,5\",Carla,p100");
        assert_eq!(lines[2], "Ana Souza,2025001,6º ano,Manhã,1º,Matemática,Simulado,9,Carla,p100");
        assert!(lines[3].contains(",BIMESTRAL,6,"));
    }

    #[test]
    fn missing_optional_columns_are_added_at_the_end() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "student_name,student_id,grade_level,period,subject,category").unwrap();
        writeln!(file, "Bruno Lima,2025002,7A,2,History,MONTHLY").unwrap();
        file.flush().unwrap();

        let (mut sheet, records) = SheetFile::read(file.path()).unwrap();
        sheet.set_score(records[0].0, 7.5);
        sheet.write(file.path()).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "student_name,student_id,grade_level,period,subject,category,shift,score,teacher_name,teacher_id"
        );
        assert_eq!(lines[1], "Bruno Lima,2025002,7A,2,History,MONTHLY,,7.5,,");
    }

    #[test]
    fn windows_round_trip_through_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Bimestre,Data Início,Data Fim").unwrap();
        writeln!(file, "1º,01/03/2025,2025-04-15").unwrap();
        file.flush().unwrap();

        let windows = read_entry_windows(file.path()).unwrap();
        assert_eq!(windows[0].period, "1º");
        assert_eq!(windows[0].opens_on, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());

        write_entry_windows(file.path(), &windows).unwrap();
        assert_eq!(read_entry_windows(file.path()).unwrap(), windows);
    }

    #[test]
    fn rejects_unknown_date_formats() {
        assert_eq!(
            parse_window_date("March 1"),
            Err(GradebookError::InvalidDate("March 1".to_string()))
        );
    }
}
