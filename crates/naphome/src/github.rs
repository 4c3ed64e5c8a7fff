//! Canned GitHub activity for the dashboard panel.

use naphome_types::{ActivityEntry, GithubActivity, HeatmapDay};
use time::macros::{date, format_description};
use time::{Date, Duration};

const HEATMAP_DAYS: u32 = 30;
const HEATMAP_END: Date = date!(2024 - 12 - 07);

pub fn mock_activity() -> GithubActivity {
    GithubActivity {
        commits: 42,
        pull_requests: 8,
        issues: 5,
        repositories: 12,
        recent_activity: vec![
            entry(
                "commit",
                "Fixed MP3 playback stack overflow",
                "2024-12-06T22:00:00Z",
            ),
            entry("pr", "Added GitHub activity dashboard", "2024-12-06T21:30:00Z"),
        ],
        heatmap: heatmap(HEATMAP_END),
    }
}

fn entry(kind: &str, title: &str, date: &str) -> ActivityEntry {
    ActivityEntry {
        kind: kind.to_string(),
        title: title.to_string(),
        repo: "Naphome-0.9".to_string(),
        date: date.to_string(),
    }
}

/// Oldest day first, ending on `end`. Every seventh day back is busy.
fn heatmap(end: Date) -> Vec<HeatmapDay> {
    let format = format_description!("[year]-[month]-[day]");
    (0..HEATMAP_DAYS)
        .rev()
        .map(|back| {
            let day = end - Duration::days(i64::from(back));
            let count = if back % 7 == 0 {
                5 + back % 3
            } else {
                back % 3
            };
            HeatmapDay {
                date: day.format(&format).unwrap_or_default(),
                count,
            }
        })
        .collect()
}
