use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::analytics;
use crate::catalog::department_name;
use crate::models::{Department, DepartmentDetail, RemarkEntry, SubmissionRecord};

const NO_DATA: &str = "No data yet.";

/// Non-empty remarks, newest first, optionally narrowed to one receiving
/// department and a case-insensitive search term.
pub fn remarks(
    submissions: &[SubmissionRecord],
    departments: &[Department],
    to_department: Option<i32>,
    search: Option<&str>,
) -> Vec<RemarkEntry> {
    let needle = search
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty());

    let mut entries: Vec<RemarkEntry> = submissions
        .iter()
        .filter(|record| to_department.map_or(true, |id| record.to_department_id == id))
        .filter_map(|record| {
            let remark = record.remark.as_deref()?.trim();
            if remark.is_empty() {
                return None;
            }
            if let Some(needle) = needle.as_deref() {
                if !remark.to_lowercase().contains(needle) {
                    return None;
                }
            }
            Some(RemarkEntry {
                submission_id: record.id,
                from_department: department_name(departments, record.from_department_id)
                    .to_string(),
                to_department: department_name(departments, record.to_department_id).to_string(),
                remark: remark.to_string(),
                submitted_at: record.timestamp,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        b.submitted_at
            .cmp(&a.submitted_at)
            .then(b.submission_id.cmp(&a.submission_id))
    });
    entries
}

/// Drill-down for a single department. Returns `None` when the id is not in
/// the catalog.
pub fn department_detail(
    submissions: &[SubmissionRecord],
    departments: &[Department],
    department_id: i32,
    now: DateTime<Utc>,
) -> Option<DepartmentDetail> {
    let department = departments
        .iter()
        .find(|department| department.id == department_id)?;
    let received: Vec<SubmissionRecord> = submissions
        .iter()
        .filter(|record| record.to_department_id == department_id)
        .cloned()
        .collect();

    let stats = analytics::department_stats(&received, std::slice::from_ref(department), now)
        .into_iter()
        .next();

    Some(DepartmentDetail {
        id: department.id,
        name: department.name.clone(),
        needs_attention: stats.as_ref().is_some_and(analytics::needs_attention),
        stats,
        monthly_trends: analytics::monthly_trends(&received),
        remarks: remarks(&received, departments, Some(department_id), None),
    })
}

pub fn build_report(
    submissions: &[SubmissionRecord],
    departments: &[Department],
    now: DateTime<Utc>,
    survey_capacity: u32,
) -> String {
    let overview = analytics::overview_stats(submissions, survey_capacity);
    let stats = analytics::department_stats(submissions, departments, now);
    let alerts = analytics::performance_alerts(&stats);
    let distribution = analytics::rating_distribution(submissions);
    let trends = analytics::monthly_trends(submissions);
    let recent = remarks(submissions, departments, None, None);

    let mut output = String::new();

    let _ = writeln!(output, "# Department Cross-Survey Report");
    let _ = writeln!(output, "Generated at {}", now.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Total responses: {}", overview.total_responses);
    let _ = writeln!(output, "- Average rating: {:.1}", overview.average_rating);
    let _ = writeln!(output, "- Completion rate: {}%", overview.completion_rate);
    let _ = writeln!(output, "- Pending reviews: {}", overview.pending_reviews);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Department Ratings");

    if stats.is_empty() {
        let _ = writeln!(output, "{NO_DATA}");
    } else {
        for entry in stats.iter() {
            let _ = writeln!(
                output,
                "- {}: {:.1} across {} responses (trend {})",
                entry.name,
                entry.avg_rating,
                entry.total_responses,
                entry.trend.label()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Performance Alerts");

    if stats.is_empty() {
        let _ = writeln!(output, "{NO_DATA}");
    } else if alerts.is_empty() {
        let _ = writeln!(
            output,
            "All rated departments average {:.1} or higher.",
            analytics::ALERT_THRESHOLD
        );
    } else {
        for entry in alerts.iter() {
            let _ = writeln!(
                output,
                "- {}: {:.1} is below {:.1}",
                entry.name,
                entry.avg_rating,
                analytics::ALERT_THRESHOLD
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rating Distribution");

    if overview.total_responses == 0 {
        let _ = writeln!(output, "{NO_DATA}");
    } else {
        for bucket in distribution.iter() {
            let _ = writeln!(
                output,
                "- {}: {} ({}%)",
                bucket.label, bucket.count, bucket.percentage
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Trends");

    if trends.iter().all(|point| point.responses == 0) {
        let _ = writeln!(output, "{NO_DATA}");
    } else {
        for point in trends.iter() {
            let _ = writeln!(
                output,
                "- {}: {:.1} from {} responses",
                point.month, point.avg_rating, point.responses
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Remarks");

    if recent.is_empty() {
        let _ = writeln!(output, "{NO_DATA}");
    } else {
        for entry in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} -> {} on {}: {}",
                entry.from_department,
                entry.to_department,
                entry.submitted_at.date_naive(),
                entry.remark
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::tests::{fixed_now, submission};
    use crate::catalog::default_departments;
    use chrono::{Duration, TimeZone};

    fn with_remark(mut record: SubmissionRecord, remark: &str) -> SubmissionRecord {
        record.remark = Some(remark.to_string());
        record
    }

    #[test]
    fn empty_report_states_no_data_everywhere() {
        let report = build_report(&[], &default_departments(), fixed_now(), 300);
        assert!(report.contains("- Total responses: 0"));
        assert!(report.contains("- Pending reviews: 12"));
        assert_eq!(report.matches(NO_DATA).count(), 5);
    }

    #[test]
    fn report_lists_sections_with_data() {
        let march = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let submissions = vec![
            with_remark(
                submission(1, 2, [5, 5, 5, 5, 5], march),
                "Great onboarding support",
            ),
            submission(2, 2, [3, 3, 3, 3, 3], march),
        ];

        let report = build_report(&submissions, &default_departments(), fixed_now(), 300);
        assert!(report.contains("- Human Resources: 4.0 across 2 responses (trend stable)"));
        assert!(report.contains("All rated departments average 4.0 or higher."));
        assert!(report.contains("- 5 Stars: 1 (50%)"));
        assert!(report.contains("- Mar: 4.0 from 2 responses"));
        assert!(report.contains(
            "- Administration -> Human Resources on 2026-03-02: Great onboarding support"
        ));
        assert!(!report.contains(NO_DATA));
    }

    #[test]
    fn report_flags_departments_below_threshold() {
        let submissions = vec![
            submission(1, 2, [4, 4, 4, 4, 4], fixed_now()),
            submission(2, 3, [3, 3, 3, 4, 4], fixed_now()),
        ];

        let report = build_report(&submissions, &default_departments(), fixed_now(), 300);
        assert!(report.contains("## Performance Alerts\n- Information Technology: 3.4 is below 4.0\n"));
        assert!(!report.contains("- Human Resources: 4.0 is below"));
    }

    #[test]
    fn department_detail_scopes_everything_to_one_department() {
        let march = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let submissions = vec![
            with_remark(submission(1, 3, [3, 3, 3, 3, 3], march), "Tickets sit for days"),
            submission(2, 3, [4, 3, 3, 3, 3], fixed_now() - Duration::days(2)),
            with_remark(submission(3, 2, [5; 5], march), "Great onboarding"),
        ];
        let departments = default_departments();

        let detail = department_detail(&submissions, &departments, 3, fixed_now()).unwrap();
        assert_eq!(detail.name, "Information Technology");
        let stats = detail.stats.as_ref().unwrap();
        assert_eq!(stats.avg_rating, 3.1);
        assert_eq!(stats.total_responses, 2);
        assert!(detail.needs_attention);
        assert_eq!(detail.monthly_trends[2].responses, 1);
        assert_eq!(detail.monthly_trends[5].responses, 1);
        assert_eq!(detail.remarks.len(), 1);
        assert_eq!(detail.remarks[0].remark, "Tickets sit for days");

        let quiet = department_detail(&submissions, &departments, 9, fixed_now()).unwrap();
        assert!(quiet.stats.is_none());
        assert!(!quiet.needs_attention);
        assert!(quiet.remarks.is_empty());
        assert!(quiet.monthly_trends.iter().all(|point| point.responses == 0));

        assert!(department_detail(&submissions, &departments, 99, fixed_now()).is_none());
    }

    #[test]
    fn remarks_filter_and_sort_newest_first() {
        let submissions = vec![
            with_remark(
                submission(1, 2, [4; 5], fixed_now() - Duration::days(3)),
                "Slow response to tickets",
            ),
            with_remark(
                submission(2, 2, [4; 5], fixed_now() - Duration::days(1)),
                "Response time improved",
            ),
            with_remark(submission(3, 3, [4; 5], fixed_now()), "Response was fine"),
            with_remark(submission(4, 2, [4; 5], fixed_now()), "   "),
            submission(5, 2, [4; 5], fixed_now()),
        ];
        let departments = default_departments();

        let all = remarks(&submissions, &departments, None, None);
        let ids: Vec<i64> = all.iter().map(|entry| entry.submission_id).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        let hr = remarks(&submissions, &departments, Some(2), Some("RESPONSE"));
        let ids: Vec<i64> = hr.iter().map(|entry| entry.submission_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(hr[0].to_department, "Human Resources");

        assert!(remarks(&submissions, &departments, Some(2), Some("budget")).is_empty());
    }
}
