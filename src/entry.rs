use std::collections::HashSet;

use chrono::NaiveDate;

use crate::access;
use crate::context::RequestContext;
use crate::error::GradebookError;
use crate::models::{Category, EntryWindow, GradeRecord, GradeWrite};
use crate::normalize::normalize_label;
use crate::repo::is_update_target;
use crate::sheet::format_date;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct EntryRequest {
    pub grade_level: String,
    pub subject: String,
    pub period: String,
    pub category: Category,
    /// Submitted scores by student ID. Students left out keep their score.
    pub scores: Vec<(String, f64)>,
    pub overwrite: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryPlan {
    pub writes: Vec<GradeWrite>,
    pub appended: Vec<String>,
    pub updated: Vec<String>,
    pub rejected: Vec<String>,
    pub skipped: usize,
}

impl EntryPlan {
    pub fn is_noop(&self) -> bool {
        self.writes.is_empty()
    }
}

pub fn check_window<'a>(
    windows: &'a [EntryWindow],
    period: &str,
    today: NaiveDate,
) -> Result<&'a EntryWindow, GradebookError> {
    let label = normalize_label(period);
    let window = windows
        .iter()
        .find(|window| normalize_label(&window.period) == label)
        .ok_or_else(|| GradebookError::WindowNotConfigured(label.clone()))?;

    if today < window.opens_on || today > window.closes_on {
        return Err(GradebookError::WindowClosed {
            period: label,
            opens: format_date(window.opens_on),
            closes: format_date(window.closes_on),
        });
    }
    Ok(window)
}

pub fn validate_request(request: &EntryRequest) -> Result<(), GradebookError> {
    if !request.category.is_enterable() {
        return Err(GradebookError::CategoryNotEnterable(
            request.category.to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for (student_id, score) in &request.scores {
        if !seen.insert(normalize_label(student_id)) {
            return Err(GradebookError::DuplicateScore(normalize_label(student_id)));
        }
        if !(MIN_SCORE..=MAX_SCORE).contains(score) {
            return Err(GradebookError::ScoreOutOfRange {
                student_id: student_id.clone(),
                score: *score,
            });
        }
    }
    Ok(())
}

fn existing_row<'a>(
    snapshot: &'a [GradeRecord],
    student_id: &str,
    request: &EntryRequest,
) -> Option<&'a GradeRecord> {
    snapshot.iter().find(|record| {
        is_update_target(
            record,
            student_id,
            &request.grade_level,
            &request.subject,
            &request.period,
            request.category,
        )
    })
}

/// `ctx.snapshot` must hold the grade level's records; it is both the roster
/// and the source of existing scores.
pub fn plan_entries(
    ctx: &RequestContext,
    request: &EntryRequest,
) -> Result<EntryPlan, GradebookError> {
    let (teacher_name, teacher_id) = ctx.teacher()?;
    validate_request(request)?;

    let roster = access::students(&ctx.snapshot);
    if roster.is_empty() {
        return Err(GradebookError::NoStudents(normalize_label(&request.grade_level)));
    }
    for (student_id, _) in &request.scores {
        let id = normalize_label(student_id);
        if !roster.iter().any(|student| student.student_id == id) {
            return Err(GradebookError::NotOnRoster(id));
        }
    }

    let mut plan = EntryPlan::default();
    for student in &roster {
        let Some(score) = request
            .scores
            .iter()
            .find(|(id, _)| normalize_label(id) == student.student_id)
            .map(|(_, score)| *score)
        else {
            continue;
        };

        let existing = existing_row(&ctx.snapshot, &student.student_id, request);
        let existing_score = existing.map_or(0.0, |record| record.score);

        if score == existing_score || (score == 0.0 && existing_score == 0.0) {
            plan.skipped += 1;
            continue;
        }

        let who = format!("{} ({})", student.student_name, student.student_id);
        match existing {
            Some(_) if request.overwrite => {
                plan.writes.push(GradeWrite::UpdateScore {
                    student_id: student.student_id.clone(),
                    grade_level: normalize_label(&request.grade_level),
                    subject: normalize_label(&request.subject),
                    period: normalize_label(&request.period),
                    category: request.category,
                    score,
                });
                plan.updated.push(format!("Score updated for {who}: {score:.2}"));
            }
            Some(_) => {
                plan.rejected.push(format!(
                    "Score already exists for {who}. Pass --overwrite to replace it."
                ));
            }
            None => {
                plan.writes.push(GradeWrite::Append(GradeRecord {
                    student_name: student.student_name.clone(),
                    student_id: student.student_id.clone(),
                    grade_level: normalize_label(&request.grade_level),
                    shift: student.shift.clone(),
                    period: normalize_label(&request.period),
                    subject: normalize_label(&request.subject),
                    category: request.category,
                    score,
                    teacher_name: teacher_name.to_string(),
                    teacher_id: teacher_id.to_string(),
                }));
                plan.appended.push(format!("Score recorded for {who}: {score:.2}"));
            }
        }
    }

    Ok(plan)
}
