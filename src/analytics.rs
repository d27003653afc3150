//! Dashboard aggregation over progress records.

use chrono::{DateTime, Utc};

use crate::models::{
    ActivityLog, ContentType, OrgCounts, OrgDashboard, PlatformCounts, PlatformDashboard,
    ProgressBreakdown, ProgressStatus, UserContentProgress,
};

/// Percentage rounded to two decimals; 0 when `total` is 0.
pub fn rate(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    ((part as f64 / total as f64) * 10000.0).round() / 100.0
}

/// Groups `records` by status. `content_type` is only a label on the result.
pub fn breakdown<'a>(
    content_type: Option<ContentType>,
    records: impl Iterator<Item = &'a UserContentProgress>,
    now: DateTime<Utc>,
) -> ProgressBreakdown {
    let mut b = ProgressBreakdown {
        content_type,
        ..Default::default()
    };
    for record in records {
        b.total += 1;
        match record.status {
            ProgressStatus::NotStarted => b.not_started += 1,
            ProgressStatus::InProgress => b.in_progress += 1,
            ProgressStatus::Completed => b.completed += 1,
            ProgressStatus::Failed => b.failed += 1,
        }
        if record.is_overdue(now) {
            b.overdue += 1;
        }
    }
    b.completion_rate = rate(b.completed, b.total);
    b
}

/// org_dashboard
///
/// Builds the admin dashboard from the organization's counters, all of its progress
/// records and the most recent activity entries.
pub fn org_dashboard(
    counts: OrgCounts,
    records: &[UserContentProgress],
    recent_activity: Vec<ActivityLog>,
    now: DateTime<Utc>,
) -> OrgDashboard {
    let by_content_type = ContentType::all()
        .iter()
        .map(|ct| {
            breakdown(
                Some(*ct),
                records.iter().filter(|r| r.content_type == *ct),
                now,
            )
        })
        .collect();

    let scores: Vec<i32> = records
        .iter()
        .filter(|r| r.content_type == ContentType::Assessment)
        .filter_map(|r| r.score)
        .collect();
    let average_assessment_score = if scores.is_empty() {
        None
    } else {
        let sum: i64 = scores.iter().map(|s| *s as i64).sum();
        Some(((sum as f64 / scores.len() as f64) * 100.0).round() / 100.0)
    };

    OrgDashboard {
        counts,
        progress: breakdown(None, records.iter(), now),
        by_content_type,
        average_assessment_score,
        recent_activity,
    }
}

pub fn platform_dashboard(counts: PlatformCounts) -> PlatformDashboard {
    PlatformDashboard {
        completion_rate: rate(counts.completed_records, counts.progress_records),
        counts,
    }
}
