use crate::models::{Category, GradeRecord};

pub fn record(subject: &str, category: Category, score: f64) -> GradeRecord {
    GradeRecord {
        student_name: "Ana Souza".to_string(),
        student_id: "2025001".to_string(),
        grade_level: "6º ANO".to_string(),
        shift: "MANHÃ".to_string(),
        period: "1º".to_string(),
        subject: subject.to_string(),
        category,
        score,
        teacher_name: "Carla Mendes".to_string(),
        teacher_id: "P100".to_string(),
    }
}

pub fn student_record(
    student_name: &str,
    student_id: &str,
    subject: &str,
    category: Category,
    score: f64,
) -> GradeRecord {
    GradeRecord {
        student_name: student_name.to_string(),
        student_id: student_id.to_string(),
        ..record(subject, category, score)
    }
}
