use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::GradebookError;
use crate::models::GradeRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Guardian { student_name: String, student_id: String },
    Teacher { name: String, id: String },
}

impl Credential {
    pub fn holder_id(&self) -> &str {
        match self {
            Credential::Guardian { student_id, .. } => student_id,
            Credential::Teacher { id, .. } => id,
        }
    }
}

/// Built per request after the access check has passed.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub credential: Credential,
    pub snapshot: Arc<[GradeRecord]>,
    pub today: NaiveDate,
}

impl RequestContext {
    pub fn new(credential: Credential, snapshot: Arc<[GradeRecord]>, today: NaiveDate) -> Self {
        Self {
            credential,
            snapshot,
            today,
        }
    }

    pub fn teacher(&self) -> Result<(&str, &str), GradebookError> {
        match &self.credential {
            Credential::Teacher { name, id } => Ok((name, id)),
            Credential::Guardian { .. } => Err(GradebookError::Unauthorized(
                "grade entry requires a teacher credential".to_string(),
            )),
        }
    }
}
