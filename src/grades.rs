use crate::models::{Category, GradeRecord, RecoveryOutcome, RecoveryStatus, SubjectAggregate};

// Averages below this go to recovery; recovery scores at or above it pass.
pub const RECOVERY_THRESHOLD: f64 = 8.0;

pub fn subjects(records: &[GradeRecord]) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for record in records {
        if !seen.contains(&record.subject.as_str()) {
            seen.push(&record.subject);
        }
    }
    seen
}

// First row wins for a repeated subject and category.
pub fn first_score(records: &[GradeRecord], subject: &str, category: Category) -> Option<f64> {
    records
        .iter()
        .find(|record| record.subject == subject && record.category == category)
        .map(|record| record.score)
}

pub fn term_average(monthly: f64, bimonthly: f64) -> f64 {
    if monthly > 0.0 || bimonthly > 0.0 {
        (monthly + bimonthly) / 2.0
    } else {
        0.0
    }
}

pub fn subject_averages(records: &[GradeRecord]) -> Vec<(String, f64)> {
    subjects(records)
        .into_iter()
        .map(|subject| {
            let monthly = first_score(records, subject, Category::Monthly).unwrap_or(0.0);
            let bimonthly = first_score(records, subject, Category::Bimonthly).unwrap_or(0.0);
            (subject.to_string(), term_average(monthly, bimonthly))
        })
        .collect()
}

pub fn needs_recovery(average: f64) -> bool {
    average < RECOVERY_THRESHOLD
}

pub fn recovery_outcome(records: &[GradeRecord], subject: &str) -> RecoveryOutcome {
    let score = first_score(records, subject, Category::Recovery).unwrap_or(0.0);
    let status = if score >= RECOVERY_THRESHOLD {
        RecoveryStatus::Passed
    } else {
        RecoveryStatus::Failed
    };
    RecoveryOutcome { score, status }
}

pub fn evaluate(records: &[GradeRecord]) -> Vec<SubjectAggregate> {
    subjects(records)
        .into_iter()
        .map(|subject| {
            let monthly = first_score(records, subject, Category::Monthly).unwrap_or(0.0);
            let bimonthly = first_score(records, subject, Category::Bimonthly).unwrap_or(0.0);
            let average = term_average(monthly, bimonthly);
            let recovery = needs_recovery(average).then(|| recovery_outcome(records, subject));

            SubjectAggregate {
                subject: subject.to_string(),
                monthly,
                bimonthly,
                average,
                recovery,
            }
        })
        .collect()
}
