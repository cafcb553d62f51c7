use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Utc};
use tracing::warn;

use crate::models::{
    Department, DepartmentStats, MonthlyTrendPoint, OverviewStats, RatingDistributionBucket,
    SubmissionRecord, Trend, QUESTION_COUNT,
};

pub const TREND_WINDOW_DAYS: i64 = 30;
pub const TREND_THRESHOLD: f64 = 0.2;
pub const DEFAULT_SURVEY_CAPACITY: u32 = 300;
pub const PENDING_REVIEW_BASELINE: usize = 12;
/// Departments averaging below 80% of the top score need attention.
pub const ALERT_THRESHOLD: f64 = 4.0;

pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const REPORTED_MONTHS: usize = 6;

/// Mean of the five answers of a submission.
pub fn score(submission: &SubmissionRecord) -> f64 {
    let total: i32 = submission.answers().iter().map(|value| i32::from(*value)).sum();
    f64::from(total) / QUESTION_COUNT as f64
}

pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percentage(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (part as f64 / total as f64 * 100.0).round() as u32
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Pairs every well-formed submission with its score. Submissions carrying an
/// answer outside 1..=5 are dropped so they cannot skew an aggregate.
fn scored(submissions: &[SubmissionRecord]) -> Vec<(&SubmissionRecord, f64)> {
    submissions
        .iter()
        .filter_map(|submission| match submission.invalid_answer() {
            Some((question, value)) => {
                warn!(
                    submission_id = submission.id,
                    question, value, "skipping submission with out-of-range answer"
                );
                None
            }
            None => Some((submission, score(submission))),
        })
        .collect()
}

pub fn department_stats(
    submissions: &[SubmissionRecord],
    departments: &[Department],
    now: DateTime<Utc>,
) -> Vec<DepartmentStats> {
    let scored = scored(submissions);

    departments
        .iter()
        .filter_map(|department| {
            let received: Vec<(&SubmissionRecord, f64)> = scored
                .iter()
                .filter(|(submission, _)| submission.to_department_id == department.id)
                .copied()
                .collect();

            let avg = mean(received.iter().map(|(_, score)| *score))?;

            Some(DepartmentStats {
                id: department.id,
                name: department.name.clone(),
                avg_rating: round_to_tenth(avg),
                total_responses: received.len(),
                trend: trend(&received, now),
            })
        })
        .collect()
}

/// Rounded average received by one department, if it has any valid ratings.
pub fn department_rating(submissions: &[SubmissionRecord], department_id: i32) -> Option<f64> {
    mean(
        scored(submissions)
            .into_iter()
            .filter(|(submission, _)| submission.to_department_id == department_id)
            .map(|(_, score)| score),
    )
    .map(round_to_tenth)
}

pub fn needs_attention(stats: &DepartmentStats) -> bool {
    stats.avg_rating < ALERT_THRESHOLD
}

/// Rated departments below the alert threshold, lowest average first.
pub fn performance_alerts(stats: &[DepartmentStats]) -> Vec<DepartmentStats> {
    let mut alerts: Vec<DepartmentStats> = stats
        .iter()
        .filter(|entry| needs_attention(entry))
        .cloned()
        .collect();
    alerts.sort_by(|a, b| a.avg_rating.total_cmp(&b.avg_rating).then(a.id.cmp(&b.id)));
    alerts
}

/// Compares the last 30 days against the 30 days before them.
pub fn trend(scored: &[(&SubmissionRecord, f64)], now: DateTime<Utc>) -> Trend {
    let recent_cutoff = now - Duration::days(TREND_WINDOW_DAYS);
    let previous_cutoff = now - Duration::days(TREND_WINDOW_DAYS * 2);

    let recent = mean(
        scored
            .iter()
            .filter(|(submission, _)| submission.timestamp >= recent_cutoff)
            .map(|(_, score)| *score),
    );
    let previous = mean(
        scored
            .iter()
            .filter(|(submission, _)| {
                submission.timestamp >= previous_cutoff && submission.timestamp < recent_cutoff
            })
            .map(|(_, score)| *score),
    );

    match (recent, previous) {
        (Some(recent), Some(previous)) if recent > previous + TREND_THRESHOLD => Trend::Up,
        (Some(recent), Some(previous)) if recent < previous - TREND_THRESHOLD => Trend::Down,
        _ => Trend::Stable,
    }
}

pub fn rating_distribution(submissions: &[SubmissionRecord]) -> Vec<RatingDistributionBucket> {
    let scored = scored(submissions);
    let mut counts = [0usize; 5];

    for (_, score) in scored.iter() {
        let stars = (score.round() as usize).clamp(1, 5);
        counts[stars - 1] += 1;
    }

    (1..=5u8)
        .rev()
        .map(|stars| {
            let count = counts[usize::from(stars) - 1];
            RatingDistributionBucket {
                stars,
                label: if stars == 1 {
                    "1 Star".to_string()
                } else {
                    format!("{stars} Stars")
                },
                count,
                percentage: percentage(count, scored.len()),
            }
        })
        .collect()
}

/// Buckets by calendar month (UTC) regardless of year and reports January
/// through June.
pub fn monthly_trends(submissions: &[SubmissionRecord]) -> Vec<MonthlyTrendPoint> {
    let mut months: HashMap<u32, (f64, usize)> = HashMap::new();

    for (submission, score) in scored(submissions) {
        let entry = months.entry(submission.timestamp.month0()).or_insert((0.0, 0));
        entry.0 += score;
        entry.1 += 1;
    }

    MONTH_LABELS
        .iter()
        .take(REPORTED_MONTHS)
        .enumerate()
        .map(|(index, month)| {
            let (total, responses) = months.get(&(index as u32)).copied().unwrap_or((0.0, 0));
            MonthlyTrendPoint {
                month: *month,
                avg_rating: if responses == 0 {
                    0.0
                } else {
                    round_to_tenth(total / responses as f64)
                },
                responses,
            }
        })
        .collect()
}

pub fn overview_stats(submissions: &[SubmissionRecord], survey_capacity: u32) -> OverviewStats {
    let scored = scored(submissions);
    let total_responses = scored.len();
    let average_rating = mean(scored.iter().map(|(_, score)| *score))
        .map(round_to_tenth)
        .unwrap_or(0.0);

    OverviewStats {
        total_responses,
        average_rating,
        completion_rate: percentage(total_responses, survey_capacity as usize),
        pending_reviews: PENDING_REVIEW_BASELINE.saturating_sub(total_responses / 10),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
    }

    pub(crate) fn submission(
        id: i64,
        to_department_id: i32,
        answers: [i16; 5],
        timestamp: DateTime<Utc>,
    ) -> SubmissionRecord {
        let [q1, q2, q3, q4, q5] = answers;
        SubmissionRecord {
            id,
            user_id: 2,
            from_department_id: 1,
            to_department_id,
            q1,
            q2,
            q3,
            q4,
            q5,
            remark: None,
            timestamp,
        }
    }

    fn departments() -> Vec<Department> {
        vec![
            Department {
                id: 1,
                name: "Administration".to_string(),
            },
            Department {
                id: 2,
                name: "Human Resources".to_string(),
            },
            Department {
                id: 3,
                name: "Information Technology".to_string(),
            },
        ]
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        fixed_now() - Duration::days(days)
    }

    #[test]
    fn score_is_mean_of_answers() {
        let record = submission(1, 2, [5, 4, 3, 2, 1], fixed_now());
        assert_eq!(score(&record), 3.0);
        let record = submission(2, 2, [5, 5, 5, 5, 4], fixed_now());
        assert!((score(&record) - 4.8).abs() < f64::EPSILON);
    }

    #[test]
    fn valid_answers_keep_score_in_range() {
        for low in 1..=5 {
            for high in low..=5 {
                let record = submission(1, 2, [low, high, low, high, low], fixed_now());
                let value = score(&record);
                assert!((1.0..=5.0).contains(&value));
            }
        }
    }

    #[test]
    fn department_average_and_count() {
        let submissions = vec![
            submission(1, 2, [5, 5, 5, 5, 5], days_ago(1)),
            submission(2, 2, [3, 3, 3, 3, 3], days_ago(2)),
        ];

        let stats = department_stats(&submissions, &departments(), fixed_now());
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].id, 2);
        assert_eq!(stats[0].name, "Human Resources");
        assert_eq!(stats[0].avg_rating, 4.0);
        assert_eq!(stats[0].total_responses, 2);
        assert_eq!(stats[0].trend, Trend::Stable);
    }

    #[test]
    fn departments_without_submissions_are_omitted() {
        let submissions = vec![
            submission(1, 3, [4, 4, 4, 4, 4], days_ago(1)),
            submission(2, 1, [2, 2, 2, 2, 2], days_ago(1)),
        ];

        let stats = department_stats(&submissions, &departments(), fixed_now());
        let ids: Vec<i32> = stats.iter().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(stats.iter().all(|entry| entry.total_responses > 0));
    }

    #[test]
    fn trend_compares_recent_and_previous_windows() {
        let improving = vec![
            submission(1, 2, [5, 5, 5, 5, 5], days_ago(5)),
            submission(2, 2, [3, 3, 3, 3, 3], days_ago(45)),
        ];
        let declining = vec![
            submission(3, 2, [2, 2, 2, 2, 2], days_ago(5)),
            submission(4, 2, [4, 4, 4, 4, 4], days_ago(45)),
        ];
        let flat = vec![
            submission(5, 2, [4, 4, 4, 4, 4], days_ago(5)),
            submission(6, 2, [4, 4, 4, 4, 4], days_ago(40)),
            submission(7, 2, [4, 4, 4, 4, 5], days_ago(50)),
        ];

        let trend_of = |submissions: &[SubmissionRecord]| {
            department_stats(submissions, &departments(), fixed_now())[0].trend
        };

        assert_eq!(trend_of(&improving), Trend::Up);
        assert_eq!(trend_of(&declining), Trend::Down);
        assert_eq!(trend_of(&flat), Trend::Stable);
    }

    #[test]
    fn trend_is_stable_when_a_window_is_empty() {
        let only_recent = vec![
            submission(1, 2, [5, 5, 5, 5, 5], days_ago(1)),
            submission(2, 2, [1, 1, 1, 1, 1], days_ago(20)),
        ];
        let too_old = vec![
            submission(3, 2, [5, 5, 5, 5, 5], days_ago(1)),
            submission(4, 2, [1, 1, 1, 1, 1], days_ago(90)),
        ];

        assert_eq!(
            department_stats(&only_recent, &departments(), fixed_now())[0].trend,
            Trend::Stable
        );
        assert_eq!(
            department_stats(&too_old, &departments(), fixed_now())[0].trend,
            Trend::Stable
        );
    }

    #[test]
    fn trend_window_edges_are_inclusive() {
        let submissions = vec![
            submission(1, 2, [5, 5, 5, 5, 5], days_ago(30)),
            submission(2, 2, [3, 3, 3, 3, 3], days_ago(60)),
        ];
        assert_eq!(
            department_stats(&submissions, &departments(), fixed_now())[0].trend,
            Trend::Up
        );

        // One second past the previous window leaves it empty.
        let outside = vec![
            submission(1, 2, [5, 5, 5, 5, 5], days_ago(30)),
            submission(2, 2, [3, 3, 3, 3, 3], days_ago(60) - Duration::seconds(1)),
        ];
        assert_eq!(
            department_stats(&outside, &departments(), fixed_now())[0].trend,
            Trend::Stable
        );
    }

    #[test]
    fn trend_threshold_is_strict() {
        let trend_of = |recent: [i16; 5], previous: [i16; 5]| {
            let submissions = vec![
                submission(1, 2, recent, days_ago(5)),
                submission(2, 2, previous, days_ago(45)),
            ];
            department_stats(&submissions, &departments(), fixed_now())[0].trend
        };

        assert_eq!(trend_of([5, 4, 4, 4, 4], [4; 5]), Trend::Stable);
        assert_eq!(trend_of([4; 5], [5, 4, 4, 4, 4]), Trend::Stable);
        assert_eq!(trend_of([5, 5, 4, 4, 4], [4; 5]), Trend::Up);
        assert_eq!(trend_of([4; 5], [5, 5, 4, 4, 4]), Trend::Down);
    }

    #[test]
    fn alerts_list_departments_below_four_lowest_first() {
        let submissions = vec![
            submission(1, 1, [4, 4, 4, 4, 4], days_ago(1)),
            submission(2, 2, [3, 3, 4, 4, 4], days_ago(1)),
            submission(3, 3, [2, 2, 2, 3, 3], days_ago(1)),
        ];

        let stats = department_stats(&submissions, &departments(), fixed_now());
        let ids: Vec<i32> = performance_alerts(&stats)
            .iter()
            .map(|entry| entry.id)
            .collect();
        assert_eq!(ids, vec![3, 2]);
        assert!(performance_alerts(&[]).is_empty());
    }

    #[test]
    fn department_rating_covers_only_received_submissions() {
        let submissions = vec![
            submission(1, 2, [5, 5, 5, 5, 4], days_ago(1)),
            submission(2, 2, [4, 4, 4, 4, 4], days_ago(90)),
            submission(3, 3, [1, 1, 1, 1, 1], days_ago(1)),
            submission(4, 2, [0, 5, 5, 5, 5], days_ago(1)),
        ];

        assert_eq!(department_rating(&submissions, 2), Some(4.4));
        assert_eq!(department_rating(&submissions, 3), Some(1.0));
        assert_eq!(department_rating(&submissions, 1), None);
    }

    #[test]
    fn distribution_is_zeroed_without_submissions() {
        let buckets = rating_distribution(&[]);
        let labels: Vec<&str> = buckets.iter().map(|bucket| bucket.label.as_str()).collect();
        assert_eq!(labels, vec!["5 Stars", "4 Stars", "3 Stars", "2 Stars", "1 Star"]);
        assert!(buckets
            .iter()
            .all(|bucket| bucket.count == 0 && bucket.percentage == 0));
    }

    #[test]
    fn distribution_puts_uniform_scores_in_one_bucket() {
        let submissions: Vec<SubmissionRecord> = (0..10)
            .map(|id| submission(id, 2, [3, 3, 4, 2, 3], fixed_now()))
            .collect();

        let buckets = rating_distribution(&submissions);
        let three = buckets.iter().find(|bucket| bucket.stars == 3).unwrap();
        assert_eq!(three.count, 10);
        assert_eq!(three.percentage, 100);
        assert!(buckets
            .iter()
            .filter(|bucket| bucket.stars != 3)
            .all(|bucket| bucket.count == 0 && bucket.percentage == 0));
    }

    #[test]
    fn distribution_percentages_sum_to_about_one_hundred() {
        let submissions = vec![
            submission(1, 2, [5, 5, 5, 5, 5], fixed_now()),
            submission(2, 2, [4, 4, 4, 4, 4], fixed_now()),
            submission(3, 2, [3, 3, 3, 3, 3], fixed_now()),
        ];

        let total: u32 = rating_distribution(&submissions)
            .iter()
            .map(|bucket| bucket.percentage)
            .sum();
        assert!((98..=102).contains(&total), "sum was {total}");
    }

    #[test]
    fn monthly_trends_report_first_half_of_year() {
        let march = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let submissions = vec![submission(1, 2, [4, 4, 4, 4, 4], march)];

        let points = monthly_trends(&submissions);
        assert_eq!(points.len(), 6);
        let months: Vec<&str> = points.iter().map(|point| point.month).collect();
        assert_eq!(months, vec!["Jan", "Feb", "Mar", "Apr", "May", "Jun"]);
        assert_eq!(points[2].avg_rating, 4.0);
        assert_eq!(points[2].responses, 1);
        assert!(points
            .iter()
            .filter(|point| point.month != "Mar")
            .all(|point| point.avg_rating == 0.0 && point.responses == 0));
    }

    #[test]
    fn monthly_trends_merge_years_and_skip_second_half() {
        let submissions = vec![
            submission(1, 2, [5, 5, 5, 5, 5], Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()),
            submission(2, 2, [2, 2, 2, 2, 2], Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()),
            submission(3, 2, [1, 1, 1, 1, 1], Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap()),
        ];

        let points = monthly_trends(&submissions);
        assert_eq!(points[1].responses, 2);
        assert_eq!(points[1].avg_rating, 3.5);
        assert_eq!(points.iter().map(|point| point.responses).sum::<usize>(), 2);
    }

    #[test]
    fn overview_defaults_without_submissions() {
        let overview = overview_stats(&[], DEFAULT_SURVEY_CAPACITY);
        assert_eq!(
            overview,
            OverviewStats {
                total_responses: 0,
                average_rating: 0.0,
                completion_rate: 0,
                pending_reviews: 12,
            }
        );
    }

    #[test]
    fn overview_completion_and_pending_reviews() {
        let submissions: Vec<SubmissionRecord> = (0..150)
            .map(|id| submission(id, 2, [4, 4, 4, 4, 4], fixed_now()))
            .collect();

        let overview = overview_stats(&submissions, DEFAULT_SURVEY_CAPACITY);
        assert_eq!(overview.total_responses, 150);
        assert_eq!(overview.average_rating, 4.0);
        assert_eq!(overview.completion_rate, 50);
        assert_eq!(overview.pending_reviews, 0);

        let partial: Vec<SubmissionRecord> = submissions.into_iter().take(35).collect();
        assert_eq!(overview_stats(&partial, DEFAULT_SURVEY_CAPACITY).pending_reviews, 9);
    }

    #[test]
    fn zero_capacity_reports_zero_completion() {
        let submissions = vec![submission(1, 2, [4, 4, 4, 4, 4], fixed_now())];
        assert_eq!(overview_stats(&submissions, 0).completion_rate, 0);
    }

    #[test]
    fn out_of_range_answers_are_excluded() {
        let submissions = vec![
            submission(1, 2, [5, 5, 5, 5, 5], days_ago(1)),
            submission(2, 2, [0, 9, 5, 5, 5], days_ago(1)),
        ];

        let overview = overview_stats(&submissions, DEFAULT_SURVEY_CAPACITY);
        assert_eq!(overview.total_responses, 1);
        assert_eq!(overview.average_rating, 5.0);

        let stats = department_stats(&submissions, &departments(), fixed_now());
        assert_eq!(stats[0].total_responses, 1);

        let buckets = rating_distribution(&submissions);
        assert_eq!(buckets[0].count, 1);
        assert_eq!(buckets[0].percentage, 100);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let submissions = vec![
            submission(1, 2, [5, 4, 3, 4, 5], days_ago(3)),
            submission(2, 3, [2, 3, 2, 3, 2], days_ago(40)),
            submission(3, 3, [4, 4, 5, 4, 4], days_ago(10)),
        ];

        assert_eq!(
            department_stats(&submissions, &departments(), fixed_now()),
            department_stats(&submissions, &departments(), fixed_now())
        );
        assert_eq!(rating_distribution(&submissions), rating_distribution(&submissions));
        assert_eq!(monthly_trends(&submissions), monthly_trends(&submissions));
        assert_eq!(
            overview_stats(&submissions, DEFAULT_SURVEY_CAPACITY),
            overview_stats(&submissions, DEFAULT_SURVEY_CAPACITY)
        );
    }

    #[test]
    fn rounding_goes_to_one_decimal() {
        assert_eq!(round_to_tenth(3.26), 3.3);
        assert_eq!(round_to_tenth(3.24), 3.2);
        assert_eq!(round_to_tenth(0.0), 0.0);
    }
}
