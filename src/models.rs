use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::GradebookError;
use crate::normalize::{normalize_label, same_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Monthly,
    Bimonthly,
    Average,
    Recovery,
    FinalRecovery,
}

impl Category {
    /// Report card column order.
    pub const DISPLAY_ORDER: [Category; 5] = [
        Category::Monthly,
        Category::Bimonthly,
        Category::Average,
        Category::Recovery,
        Category::FinalRecovery,
    ];

    pub const ENTERABLE: [Category; 3] =
        [Category::Monthly, Category::Bimonthly, Category::Recovery];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Monthly => "MONTHLY",
            Category::Bimonthly => "BIMONTHLY",
            Category::Average => "AVERAGE",
            Category::Recovery => "RECOVERY",
            Category::FinalRecovery => "FINAL_RECOVERY",
        }
    }

    pub fn sheet_label(&self) -> &'static str {
        match self {
            Category::Monthly => "MENSAL",
            Category::Bimonthly => "BIMESTRAL",
            Category::Average => "MÉDIA",
            Category::Recovery => "RECUPERAÇÃO",
            Category::FinalRecovery => "RECUPERAÇÃO FINAL",
        }
    }

    pub fn short_label(&self) -> &'static str {
        match self {
            Category::Monthly => "Mon",
            Category::Bimonthly => "Bim",
            Category::Average => "Avg",
            Category::Recovery => "Rec",
            Category::FinalRecovery => "Final Rec",
        }
    }

    pub fn is_enterable(&self) -> bool {
        Self::ENTERABLE.contains(self)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = GradebookError;

    // Accepts the English names and the spreadsheet's own labels.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let label = normalize_label(value).replace(['_', '-'], " ");
        match label.as_str() {
            "MONTHLY" | "MENSAL" => Ok(Category::Monthly),
            "BIMONTHLY" | "BIMESTRAL" => Ok(Category::Bimonthly),
            "AVERAGE" | "MEDIA" | "MÉDIA" => Ok(Category::Average),
            "RECOVERY" | "RECUPERAÇÃO" | "RECUPERACAO" => Ok(Category::Recovery),
            "FINAL RECOVERY" | "RECUPERAÇÃO FINAL" | "RECUPERACAO FINAL" => {
                Ok(Category::FinalRecovery)
            }
            _ => Err(GradebookError::UnknownCategory(value.trim().to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeRecord {
    pub student_name: String,
    pub student_id: String,
    pub grade_level: String,
    pub shift: String,
    pub period: String,
    pub subject: String,
    pub category: Category,
    pub score: f64,
    pub teacher_name: String,
    pub teacher_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStatus {
    Passed,
    Failed,
}

impl fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryStatus::Passed => f.write_str("PASSED"),
            RecoveryStatus::Failed => f.write_str("FAILED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecoveryOutcome {
    pub score: f64,
    pub status: RecoveryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAggregate {
    pub subject: String,
    pub monthly: f64,
    pub bimonthly: f64,
    pub average: f64,
    /// Set only for subjects whose average is below the recovery threshold.
    pub recovery: Option<RecoveryOutcome>,
}

impl SubjectAggregate {
    pub fn needs_recovery(&self) -> bool {
        crate::grades::needs_recovery(self.average)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryWindow {
    pub period: String,
    pub opens_on: NaiveDate,
    pub closes_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRef {
    pub student_name: String,
    pub student_id: String,
    pub shift: String,
}

/// Query against the grade store. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RecordFilter {
    pub grade_level: Option<String>,
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub period: Option<String>,
    pub teacher_id: Option<String>,
}

impl RecordFilter {
    pub fn grade_level(grade_level: &str) -> Self {
        Self {
            grade_level: Some(normalize_label(grade_level)),
            ..Self::default()
        }
    }

    pub fn student(grade_level: &str, student_name: &str, student_id: &str, period: &str) -> Self {
        Self {
            grade_level: Some(normalize_label(grade_level)),
            student_id: Some(normalize_label(student_id)),
            student_name: Some(student_name.trim().to_string()),
            period: Some(normalize_label(period)),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &GradeRecord) -> bool {
        fn label_matches(expected: &Option<String>, actual: &str) -> bool {
            expected
                .as_deref()
                .map_or(true, |value| normalize_label(value) == normalize_label(actual))
        }

        label_matches(&self.grade_level, &record.grade_level)
            && label_matches(&self.student_id, &record.student_id)
            && label_matches(&self.period, &record.period)
            && label_matches(&self.teacher_id, &record.teacher_id)
            && self
                .student_name
                .as_deref()
                .map_or(true, |name| same_name(name, &record.student_name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GradeWrite {
    Append(GradeRecord),
    UpdateScore {
        student_id: String,
        grade_level: String,
        subject: String,
        period: String,
        category: Category,
        score: f64,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub appended: usize,
    pub updated: usize,
}

impl WriteSummary {
    pub fn changed(&self) -> bool {
        self.appended + self.updated > 0
    }
}
