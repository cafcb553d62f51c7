use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::analytics::{department_rating, round_to_tenth, score};
use crate::models::{
    Department, NewSubmission, SubmissionRecord, SurveyAssignment, MAX_ANSWER, MIN_ANSWER,
    QUESTION_COUNT,
};
use crate::permissions::PermissionMatrix;
use crate::session::Session;
use crate::store::{DepartmentCatalog, PermissionStore, StoreError, SubmissionStore};

pub const QUESTIONS: [&str; QUESTION_COUNT] = [
    "How would you rate the overall service quality?",
    "How responsive is this department to your requests?",
    "How professional is the staff in this department?",
    "How satisfied are you with the communication?",
    "How likely are you to recommend this department to others?",
];

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("question {question} answered with {value}; answers must be between 1 and 5")]
    AnswerOutOfRange { question: usize, value: i16 },
    #[error("department {0} is not in the catalog")]
    UnknownDepartment(i32),
    #[error("departments cannot rate themselves")]
    SelfRating,
    #[error("department {from} is not permitted to rate department {to}")]
    NotPermitted { from: i32, to: i32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the user filled in on the survey form.
#[derive(Debug, Clone)]
pub struct SubmissionDraft {
    pub to_department_id: i32,
    pub answers: [i16; QUESTION_COUNT],
    pub remark: Option<String>,
}

impl SubmissionDraft {
    pub fn validate_answers(&self) -> Result<(), SubmissionError> {
        match self
            .answers
            .iter()
            .enumerate()
            .find(|(_, value)| !(MIN_ANSWER..=MAX_ANSWER).contains(*value))
        {
            Some((index, value)) => Err(SubmissionError::AnswerOutOfRange {
                question: index + 1,
                value: *value,
            }),
            None => Ok(()),
        }
    }
}

pub async fn submit<S>(
    store: &S,
    session: &Session,
    draft: SubmissionDraft,
    now: DateTime<Utc>,
) -> Result<SubmissionRecord, SubmissionError>
where
    S: SubmissionStore + DepartmentCatalog + PermissionStore + ?Sized,
{
    draft.validate_answers()?;

    let from = session.department_id();
    let to = draft.to_department_id;
    let departments = store.list_departments().await?;
    if !departments.iter().any(|department| department.id == to) {
        return Err(SubmissionError::UnknownDepartment(to));
    }
    if from == to {
        return Err(SubmissionError::SelfRating);
    }
    if !store.permission_matrix().await?.is_allowed(from, to) {
        return Err(SubmissionError::NotPermitted { from, to });
    }

    let remark = draft
        .remark
        .map(|remark| remark.trim().to_string())
        .filter(|remark| !remark.is_empty());

    let record = store
        .append(NewSubmission {
            user_id: session.user().id,
            from_department_id: from,
            to_department_id: to,
            answers: draft.answers,
            remark,
            timestamp: now,
        })
        .await?;

    info!(
        submission_id = record.id,
        user = %session.user().username,
        from,
        to,
        score = score(&record),
        "survey submitted"
    );
    Ok(record)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSummary {
    pub assignments: Vec<SurveyAssignment>,
    pub completed: usize,
    pub total: usize,
    pub completion_percentage: u32,
    /// What other departments think of the session user's own department.
    pub own_department_rating: Option<f64>,
}

/// Departments the session user may rate, in catalog order, with whether
/// they have already done so.
pub fn assignments(
    session: &Session,
    matrix: &PermissionMatrix,
    departments: &[Department],
    submissions: &[SubmissionRecord],
) -> AssignmentSummary {
    let user_id = session.user().id;
    let targets = matrix.allowed_targets(session.department_id());

    let assignments: Vec<SurveyAssignment> = departments
        .iter()
        .filter(|department| targets.contains(&department.id))
        .map(|department| {
            let latest = submissions
                .iter()
                .filter(|record| record.user_id == user_id && record.to_department_id == department.id)
                .max_by_key(|record| record.timestamp);
            SurveyAssignment {
                department_id: department.id,
                department_name: department.name.clone(),
                completed: latest.is_some(),
                last_rating: latest.map(|record| round_to_tenth(score(record))),
            }
        })
        .collect();

    let completed = assignments.iter().filter(|entry| entry.completed).count();
    let total = assignments.len();
    let completion_percentage = if total == 0 {
        0
    } else {
        (completed as f64 / total as f64 * 100.0).round() as u32
    };

    AssignmentSummary {
        assignments,
        completed,
        total,
        completion_percentage,
        own_department_rating: department_rating(submissions, session.department_id()),
    }
}
