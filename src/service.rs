use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::access;
use crate::cache::SnapshotCache;
use crate::context::{Credential, RequestContext};
use crate::entry::{self, EntryPlan, EntryRequest};
use crate::error::GradebookError;
use crate::models::{GradeRecord, RecordFilter, StudentRef, WriteSummary};
use crate::normalize::normalize_label;
use crate::repo::GradeRepository;
use crate::report::ReportCard;

#[derive(Debug, Clone)]
pub struct LookupQuery {
    pub grade_level: String,
    pub student_name: String,
    pub student_id: String,
    pub period: String,
}

#[derive(Debug, Clone)]
pub struct ReportLookup {
    pub card: ReportCard,
    pub records: Arc<[GradeRecord]>,
}

#[derive(Debug, Clone, Default)]
pub struct EntryOutcome {
    pub plan: EntryPlan,
    pub written: WriteSummary,
}

/// Lookup and entry workflows over a grade store, with query results cached
/// per store version.
pub struct Gradebook {
    repo: Arc<dyn GradeRepository>,
    cache: Mutex<SnapshotCache>,
}

impl Gradebook {
    pub fn new(repo: Arc<dyn GradeRepository>) -> Self {
        Self {
            repo,
            cache: Mutex::new(SnapshotCache::default()),
        }
    }

    pub async fn snapshot(&self, filter: &RecordFilter) -> anyhow::Result<Arc<[GradeRecord]>> {
        let version = self.repo.store_version().await?;
        if let Some(records) = self.cache.lock().await.get(filter, version) {
            debug!(version, "Snapshot cache hit");
            return Ok(records);
        }

        let records: Arc<[GradeRecord]> = self.repo.load_records(filter).await?.into();
        let mut cache = self.cache.lock().await;
        cache.insert(filter.clone(), version, records.clone());
        debug!(version, rows = records.len(), cached = cache.len(), "Snapshot loaded");
        Ok(records)
    }

    pub async fn grade_levels(&self) -> anyhow::Result<Vec<String>> {
        let records = self.snapshot(&RecordFilter::default()).await?;
        Ok(access::grade_levels(&records))
    }

    pub async fn students(&self, grade_level: &str) -> anyhow::Result<Vec<StudentRef>> {
        let records = self.snapshot(&RecordFilter::grade_level(grade_level)).await?;
        Ok(access::students(&records))
    }

    pub async fn periods(&self, grade_level: &str, student_name: &str) -> anyhow::Result<Vec<String>> {
        let records = self.snapshot(&RecordFilter::grade_level(grade_level)).await?;
        Ok(access::periods(&records, student_name))
    }

    pub async fn teacher_assignments(&self, teacher_id: &str) -> anyhow::Result<Vec<(String, Vec<String>)>> {
        let filter = RecordFilter {
            teacher_id: Some(normalize_label(teacher_id)),
            ..RecordFilter::default()
        };
        let records = self.snapshot(&filter).await?;
        Ok(access::grade_levels(&records)
            .into_iter()
            .map(|level| {
                let subjects = access::subjects_for(&records, &level);
                (level, subjects)
            })
            .collect())
    }

    #[tracing::instrument(skip(self, query), fields(grade_level = %query.grade_level, period = %query.period))]
    pub async fn report_card(&self, query: &LookupQuery, today: NaiveDate) -> anyhow::Result<ReportLookup> {
        let roster = self.students(&query.grade_level).await?;
        let student = access::verify_guardian(&roster, &query.student_name, &query.student_id)?;

        let filter = RecordFilter::student(
            &query.grade_level,
            &student.student_name,
            &student.student_id,
            &query.period,
        );
        let ctx = RequestContext::new(
            Credential::Guardian {
                student_name: student.student_name.clone(),
                student_id: student.student_id.clone(),
            },
            self.snapshot(&filter).await?,
            today,
        );

        let card = ReportCard::build(&ctx.snapshot).ok_or(GradebookError::NoData)?;
        info!(
            student_id = ctx.credential.holder_id(),
            subjects = card.subjects.len(),
            recovery = card.recovery_required().len(),
            "Report card assembled"
        );
        Ok(ReportLookup {
            card,
            records: ctx.snapshot,
        })
    }

    #[tracing::instrument(skip(self, request), fields(grade_level = %request.grade_level, subject = %request.subject, period = %request.period, category = %request.category))]
    pub async fn submit_entry(
        &self,
        teacher_name: &str,
        teacher_id: &str,
        request: &EntryRequest,
        today: NaiveDate,
    ) -> anyhow::Result<EntryOutcome> {
        let teacher_filter = RecordFilter {
            teacher_id: Some(normalize_label(teacher_id)),
            ..RecordFilter::default()
        };
        let taught = self.snapshot(&teacher_filter).await?;
        let credential = access::verify_teacher(&taught, teacher_name, teacher_id)?;
        entry::validate_request(request)?;

        if !access::subjects_for(&taught, &request.grade_level)
            .iter()
            .any(|subject| *subject == normalize_label(&request.subject))
        {
            return Err(GradebookError::SubjectNotAssigned {
                subject: normalize_label(&request.subject),
                teacher_id: normalize_label(teacher_id),
                grade_level: normalize_label(&request.grade_level),
            }
            .into());
        }

        let ctx = RequestContext::new(
            credential,
            self.snapshot(&RecordFilter::grade_level(&request.grade_level))
                .await?,
            today,
        );
        let windows = self.repo.entry_windows().await?;
        entry::check_window(&windows, &request.period, ctx.today)?;

        let plan = entry::plan_entries(&ctx, request)?;

        let written = if plan.is_noop() {
            WriteSummary::default()
        } else {
            self.repo.append_or_update(&plan.writes).await?
        };
        info!(
            teacher_id = ctx.credential.holder_id(),
            appended = written.appended,
            updated = written.updated,
            rejected = plan.rejected.len(),
            skipped = plan.skipped,
            "Grade entry processed"
        );
        Ok(EntryOutcome { plan, written })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{record, student_record};
    use crate::models::{Category, EntryWindow};
    use crate::repo::SnapshotStore;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn gradebook() -> Gradebook {
        let store = SnapshotStore::new(
            vec![
                record("SCIENCE", Category::Monthly, 4.0),
                record("SCIENCE", Category::Bimonthly, 5.0),
                record("SCIENCE", Category::Recovery, 9.0),
                record("MATH", Category::Monthly, 6.0),
                record("MATH", Category::Bimonthly, 10.0),
                student_record("Bruno Lima", "2025002", "MATH", Category::Monthly, 8.0),
            ],
            vec![EntryWindow {
                period: "1º".to_string(),
                opens_on: date(1),
                closes_on: date(15),
            }],
        );
        Gradebook::new(Arc::new(store))
    }

    fn query(student_id: &str, period: &str) -> LookupQuery {
        LookupQuery {
            grade_level: "6º ano".to_string(),
            student_name: "Ana Souza".to_string(),
            student_id: student_id.to_string(),
            period: period.to_string(),
        }
    }

    fn monthly_math(scores: Vec<(&str, f64)>, overwrite: bool) -> EntryRequest {
        EntryRequest {
            grade_level: "6º ANO".to_string(),
            subject: "MATH".to_string(),
            period: "1º".to_string(),
            category: Category::Monthly,
            scores: scores.into_iter().map(|(id, s)| (id.to_string(), s)).collect(),
            overwrite,
        }
    }

    #[tokio::test]
    async fn guardian_lookup_builds_report() {
        let lookup = gradebook().report_card(&query("2025001", "1º"), date(5)).await.unwrap();
        assert_eq!(lookup.records.len(), 5);
        assert_eq!(lookup.card.recovery_required(), vec!["SCIENCE (average: 4.50)"]);
        assert_eq!(
            lookup.card.recovery_results(),
            vec!["SCIENCE (recovery score: 9.00 - PASSED)"]
        );
    }

    #[tokio::test]
    async fn guardian_lookup_reports_auth_and_empty_results() {
        let book = gradebook();
        let err = book.report_card(&query("2025002", "1º"), date(5)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GradebookError>(),
            Some(GradebookError::Unauthorized(_))
        ));

        let err = book.report_card(&query("2025001", "FINAL"), date(5)).await.unwrap_err();
        assert_eq!(err.downcast_ref::<GradebookError>(), Some(&GradebookError::NoData));
    }

    #[tokio::test]
    async fn entry_writes_and_refreshes_lookups() {
        let book = gradebook();
        let before = book.report_card(&query("2025001", "1º"), date(5)).await.unwrap();
        assert_eq!(before.card.subjects.len(), 2);

        let outcome = book
            .submit_entry("Carla", "p100", &monthly_math(vec![("2025001", 9.0)], true), date(5))
            .await
            .unwrap();
        assert_eq!(outcome.written, WriteSummary { appended: 0, updated: 1 });

        let after = book.report_card(&query("2025001", "1º"), date(5)).await.unwrap();
        let math = after
            .card
            .subjects
            .iter()
            .find(|subject| subject.subject == "MATH")
            .unwrap();
        assert_eq!(math.average, 9.5);
    }

    #[tokio::test]
    async fn entry_outside_window_is_refused() {
        let err = gradebook()
            .submit_entry("Carla", "P100", &monthly_math(vec![("2025001", 9.0)], true), date(20))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GradebookError>(),
            Some(GradebookError::WindowClosed { .. })
        ));
    }

    #[tokio::test]
    async fn entry_requires_assigned_subject_and_known_teacher() {
        let book = gradebook();
        let mut request = monthly_math(vec![("2025001", 9.0)], false);
        request.subject = "HISTORY".to_string();
        let err = book.submit_entry("Carla", "P100", &request, date(5)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GradebookError>(),
            Some(GradebookError::SubjectNotAssigned { .. })
        ));

        let err = book
            .submit_entry("Someone", "X1", &monthly_math(vec![], false), date(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GradebookError>(),
            Some(GradebookError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn options_follow_the_selection_cascade() {
        let book = gradebook();
        assert_eq!(book.grade_levels().await.unwrap(), vec!["6º ANO"]);
        let students = book.students("6º ano").await.unwrap();
        assert_eq!(students.len(), 2);
        assert_eq!(
            book.periods("6º ano", "Ana Souza").await.unwrap(),
            vec!["1º", "FINAL"]
        );
        assert_eq!(
            book.teacher_assignments("p100").await.unwrap(),
            vec![(
                "6º ANO".to_string(),
                vec!["MATH".to_string(), "SCIENCE".to_string()]
            )]
        );
    }
}
