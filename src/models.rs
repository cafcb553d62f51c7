use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const QUESTION_COUNT: usize = 5;
pub const MIN_ANSWER: i16 = 1;
pub const MAX_ANSWER: i16 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub id: i64,
    pub user_id: i64,
    pub from_department_id: i32,
    pub to_department_id: i32,
    pub q1: i16,
    pub q2: i16,
    pub q3: i16,
    pub q4: i16,
    pub q5: i16,
    pub remark: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn answers(&self) -> [i16; QUESTION_COUNT] {
        [self.q1, self.q2, self.q3, self.q4, self.q5]
    }

    /// Returns the first answer outside 1..=5 as `(question number, value)`.
    pub fn invalid_answer(&self) -> Option<(usize, i16)> {
        self.answers()
            .into_iter()
            .enumerate()
            .find(|(_, value)| !(MIN_ANSWER..=MAX_ANSWER).contains(value))
            .map(|(index, value)| (index + 1, value))
    }
}

/// A submission that has been validated but not yet assigned an id by a store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub user_id: i64,
    pub from_department_id: i32,
    pub to_department_id: i32,
    pub answers: [i16; QUESTION_COUNT],
    pub remark: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NewSubmission {
    pub fn into_record(self, id: i64) -> SubmissionRecord {
        let [q1, q2, q3, q4, q5] = self.answers;
        SubmissionRecord {
            id,
            user_id: self.user_id,
            from_department_id: self.from_department_id,
            to_department_id: self.to_department_id,
            q1,
            q2,
            q3,
            q4,
            q5,
            remark: self.remark,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub department_id: i32,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub department_id: i32,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn label(self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentStats {
    pub id: i32,
    pub name: String,
    pub avg_rating: f64,
    pub total_responses: usize,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingDistributionBucket {
    pub stars: u8,
    pub label: String,
    pub count: usize,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTrendPoint {
    pub month: &'static str,
    pub avg_rating: f64,
    pub responses: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub total_responses: usize,
    pub average_rating: f64,
    pub completion_rate: u32,
    pub pending_reviews: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemarkEntry {
    pub submission_id: i64,
    pub from_department: String,
    pub to_department: String,
    pub remark: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyAssignment {
    pub department_id: i32,
    pub department_name: String,
    pub completed: bool,
    pub last_rating: Option<f64>,
}

/// Everything known about one department, for the drill-down view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentDetail {
    pub id: i32,
    pub name: String,
    /// `None` until the department has received a valid rating.
    pub stats: Option<DepartmentStats>,
    pub needs_attention: bool,
    pub monthly_trends: Vec<MonthlyTrendPoint>,
    pub remarks: Vec<RemarkEntry>,
}
