use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum GradebookError {
    #[error("Please enter the student ID.")]
    MissingCredential,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("No grades recorded for this selection.")]
    NoData,

    #[error("No students found for grade level {0}.")]
    NoStudents(String),

    #[error("Entry is not authorized for period {0}. Contact the school office.")]
    WindowNotConfigured(String),

    #[error("Entry for period {period} is only allowed between {opens} and {closes}.")]
    WindowClosed {
        period: String,
        opens: String,
        closes: String,
    },

    #[error("Subject {subject} is not assigned to teacher {teacher_id} in {grade_level}.")]
    SubjectNotAssigned {
        subject: String,
        teacher_id: String,
        grade_level: String,
    },

    #[error("Scores cannot be entered for category {0}.")]
    CategoryNotEnterable(String),

    #[error("Unknown evaluation category: {0}")]
    UnknownCategory(String),

    #[error("Score {score} for student {student_id} is outside 0.0 to 10.0.")]
    ScoreOutOfRange { student_id: String, score: f64 },

    #[error("Student {0} was given more than one score in the same submission.")]
    DuplicateScore(String),

    #[error("Student {0} is not on the roster for this grade level.")]
    NotOnRoster(String),

    #[error("Invalid date {0:?}; expected dd/mm/yyyy or yyyy-mm-dd.")]
    InvalidDate(String),
}
