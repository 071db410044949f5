use crate::context::Credential;
use crate::error::GradebookError;
use crate::models::{GradeRecord, StudentRef};
use crate::normalize::{normalize_label, same_name};

pub const FINAL_PERIOD: &str = "FINAL";

pub fn grade_levels(records: &[GradeRecord]) -> Vec<String> {
    let mut levels: Vec<String> = records.iter().map(|r| r.grade_level.clone()).collect();
    levels.sort();
    levels.dedup();
    levels
}

// The first row seen for an ID supplies the name and shift.
pub fn students(records: &[GradeRecord]) -> Vec<StudentRef> {
    let mut roster: Vec<StudentRef> = Vec::new();
    for record in records {
        let id = normalize_label(&record.student_id);
        if roster.iter().any(|student| student.student_id == id) {
            continue;
        }
        roster.push(StudentRef {
            student_name: record.student_name.clone(),
            student_id: id,
            shift: record.shift.clone(),
        });
    }
    roster.sort_by(|a, b| a.student_name.cmp(&b.student_name));
    roster
}

pub fn periods(records: &[GradeRecord], student_name: &str) -> Vec<String> {
    let mut periods: Vec<String> = records
        .iter()
        .filter(|record| same_name(&record.student_name, student_name))
        .map(|record| record.period.clone())
        .collect();
    periods.sort();
    periods.dedup();
    if !periods.iter().any(|period| period == FINAL_PERIOD) {
        periods.push(FINAL_PERIOD.to_string());
    }
    periods
}

pub fn subjects_for(records: &[GradeRecord], grade_level: &str) -> Vec<String> {
    let grade_level = normalize_label(grade_level);
    let mut subjects: Vec<String> = records
        .iter()
        .filter(|record| normalize_label(&record.grade_level) == grade_level)
        .map(|record| record.subject.clone())
        .collect();
    subjects.sort();
    subjects.dedup();
    subjects
}

pub fn verify_guardian<'a>(
    roster: &'a [StudentRef],
    student_name: &str,
    student_id: &str,
) -> Result<&'a StudentRef, GradebookError> {
    if student_id.trim().is_empty() {
        return Err(GradebookError::MissingCredential);
    }
    let student_id = normalize_label(student_id);
    roster
        .iter()
        .find(|student| same_name(&student.student_name, student_name) && student.student_id == student_id)
        .ok_or_else(|| {
            GradebookError::Unauthorized(
                "student ID does not match the selected student".to_string(),
            )
        })
}

pub fn verify_teacher(
    records: &[GradeRecord],
    name: &str,
    id: &str,
) -> Result<Credential, GradebookError> {
    if name.trim().is_empty() || id.trim().is_empty() {
        return Err(GradebookError::Unauthorized(
            "teacher name and ID are required".to_string(),
        ));
    }
    let id = normalize_label(id);
    if !records.iter().any(|record| normalize_label(&record.teacher_id) == id) {
        return Err(GradebookError::Unauthorized(
            "teacher ID is invalid or has no assigned classes".to_string(),
        ));
    }
    Ok(Credential::Teacher {
        name: name.trim().to_string(),
        id,
    })
}
