use std::fmt::Write;

use serde::Serialize;

use crate::grades;
use crate::models::{Category, GradeRecord, SubjectAggregate};

pub const LOW_SCORE_THRESHOLD: f64 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReportCell {
    pub value: Option<f64>,
    pub low: bool,
}

impl ReportCell {
    fn new(value: Option<f64>) -> Self {
        Self {
            value,
            low: value.is_some_and(|score| score < LOW_SCORE_THRESHOLD),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub subject: String,
    pub cells: Vec<ReportCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTable {
    pub columns: Vec<Category>,
    pub rows: Vec<ReportRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportCard {
    pub student_name: String,
    pub student_id: String,
    pub grade_level: String,
    pub period: String,
    pub table: ReportTable,
    pub subjects: Vec<SubjectAggregate>,
}

impl ReportCard {
    pub fn build(records: &[GradeRecord]) -> Option<Self> {
        let first = records.first()?;
        Some(Self {
            student_name: first.student_name.clone(),
            student_id: first.student_id.clone(),
            grade_level: first.grade_level.clone(),
            period: first.period.clone(),
            table: assemble(records),
            subjects: grades::evaluate(records),
        })
    }

    pub fn recovery_required(&self) -> Vec<String> {
        self.subjects
            .iter()
            .filter(|subject| subject.needs_recovery())
            .map(|subject| format!("{} (average: {:.2})", subject.subject, subject.average))
            .collect()
    }

    pub fn recovery_results(&self) -> Vec<String> {
        self.subjects
            .iter()
            .filter_map(|subject| {
                subject.recovery.map(|outcome| {
                    format!(
                        "{} (recovery score: {:.2} - {})",
                        subject.subject, outcome.score, outcome.status
                    )
                })
            })
            .collect()
    }
}

// Literal average rows are replaced by the computed value.
pub fn assemble(records: &[GradeRecord]) -> ReportTable {
    let averages = grades::subject_averages(records);

    let columns: Vec<Category> = Category::DISPLAY_ORDER
        .into_iter()
        .filter(|category| {
            (*category == Category::Average && !records.is_empty())
                || records.iter().any(|record| record.category == *category)
        })
        .collect();

    let mut subjects = grades::subjects(records);
    subjects.sort_unstable();

    let rows = subjects
        .into_iter()
        .map(|subject| {
            let cells = columns
                .iter()
                .map(|category| match category {
                    Category::Average => ReportCell::new(
                        averages
                            .iter()
                            .find(|(name, _)| name == subject)
                            .map(|(_, average)| *average),
                    ),
                    other => ReportCell::new(grades::first_score(records, subject, *other)),
                })
                .collect();
            ReportRow {
                subject: subject.to_string(),
                cells,
            }
        })
        .collect();

    ReportTable { columns, rows }
}

pub fn build_report(card: &ReportCard) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Report Card");
    let _ = writeln!(
        output,
        "{} ({}), grade level {}, period {}",
        card.student_name, card.student_id, card.grade_level, card.period
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Grades");

    if card.table.rows.is_empty() {
        let _ = writeln!(output, "No grades recorded for this selection.");
    } else {
        let mut header = String::from("| Subject |");
        let mut divider = String::from("|---|");
        for column in &card.table.columns {
            let _ = write!(header, " {} |", column.short_label());
            divider.push_str("---|");
        }
        let _ = writeln!(output, "{header}");
        let _ = writeln!(output, "{divider}");

        for row in &card.table.rows {
            let mut line = format!("| {} |", row.subject);
            for cell in &row.cells {
                match (cell.value, cell.low) {
                    (None, _) => line.push_str(" - |"),
                    (Some(value), true) => {
                        let _ = write!(line, " **{value:.2}** |");
                    }
                    (Some(value), false) => {
                        let _ = write!(line, " {value:.2} |");
                    }
                }
            }
            let _ = writeln!(output, "{line}");
        }
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Scores in bold are below {LOW_SCORE_THRESHOLD:.1}."
        );
    }

    let required = card.recovery_required();
    if !required.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Recovery Required");
        for line in &required {
            let _ = writeln!(output, "- {line}");
        }
        let names: Vec<&str> = card
            .subjects
            .iter()
            .filter(|subject| subject.needs_recovery())
            .map(|subject| subject.subject.as_str())
            .collect();
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "The student must sit the recovery exam in: {}",
            names.join(", ")
        );
    }

    let results = card.recovery_results();
    if !results.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Recovery Results");
        for line in &results {
            let _ = writeln!(output, "- {line}");
        }
    }

    output
}

pub fn write_csv_export<W: std::io::Write>(records: &[GradeRecord], writer: W) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_file_name(student_name: &str, period: &str) -> String {
    let clean = |value: &str| {
        value
            .trim()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect::<String>()
    };
    format!("report_card_{}_{}.csv", clean(student_name), clean(period))
}
