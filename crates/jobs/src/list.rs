//! Tabular job listing

use crate::model::JobStatus;
use crate::store::JobStore;
use crate::Result;
use chrono::DateTime;

pub const JOB_LIST_HEADERS: [&str; 5] = ["job id", "steps", "date created", "date updated", "job status"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobListing {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl JobListing {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn render(&self) -> String {
        render_table(&self.headers, &self.rows)
    }
}

fn describe_date(date: Option<&str>) -> String {
    match date {
        Some(date) => DateTime::parse_from_rfc3339(date)
            .map(|parsed| parsed.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|_| date.to_string()),
        None => String::new(),
    }
}

/// One row per job of `status`, ordered by job id
pub fn compose_job_list(store: &JobStore, status: JobStatus) -> Result<JobListing> {
    let rows = store
        .find_jobs(status)?
        .into_iter()
        .map(|(job_id, job)| {
            vec![
                job_id,
                job.steps.len().to_string(),
                describe_date(Some(&job.date_created)),
                describe_date(job.date_updated.as_deref()),
                status.to_string(),
            ]
        })
        .collect();

    Ok(JobListing {
        headers: JOB_LIST_HEADERS.iter().map(ToString::to_string).collect(),
        rows,
    })
}

/// Render a pipe table with columns padded to their widest cell
#[must_use]
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let width = cell.chars().count();
            match widths.get_mut(idx) {
                Some(current) => *current = (*current).max(width),
                None => widths.push(width),
            }
        }
    }

    let format_row = |cells: &[String]| {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(idx, &width)| {
                let text = cells.get(idx).map_or("", String::as_str);
                format!(" {:<width$} ", text, width = width)
            })
            .collect();
        format!("|{}|", padded.join("|"))
    };
    let separator: Vec<String> = widths.iter().map(|&width| "-".repeat(width + 2)).collect();

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format_row(headers));
    lines.push(format!("|{}|", separator.join("|")));
    lines.extend(rows.iter().map(|row| format_row(row)));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_pipeline_common::Args;
    use serde_json::json;

    #[test]
    fn test_render_table_alignment() {
        let headers = vec!["id".to_string(), "steps".to_string()];
        let rows = vec![
            vec!["job-long-name".to_string(), "3".to_string()],
            vec!["j".to_string(), "12".to_string()],
        ];
        let table = render_table(&headers, &rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "| id            | steps |");
        assert_eq!(lines[1], "|---------------|-------|");
        assert_eq!(lines[2], "| job-long-name | 3     |");
        assert_eq!(lines[3], "| j             | 12    |");
    }

    #[test]
    fn test_compose_job_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path());
        store.init_jobs().unwrap();

        let empty = compose_job_list(&store, JobStatus::Queued).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.headers, JOB_LIST_HEADERS.to_vec());

        let mut args = Args::new();
        args.insert("target_path".to_string(), json!("in.png"));
        for job_id in ["job-b", "job-a"] {
            store.create_job(job_id).unwrap();
            store.add_step(job_id, args.clone()).unwrap();
            store.add_step(job_id, args.clone()).unwrap();
            store.submit_job(job_id).unwrap();
        }

        let listing = compose_job_list(&store, JobStatus::Queued).unwrap();
        assert_eq!(listing.rows.len(), 2);
        assert_eq!(listing.rows[0][0], "job-a");
        assert_eq!(listing.rows[0][1], "2");
        assert_eq!(listing.rows[0][2].len(), "2026-01-01 00:00:00".len());
        assert_eq!(listing.rows[1][4], "queued");
        assert!(listing.render().contains("job-b"));
    }

    #[test]
    fn test_describe_date() {
        assert_eq!(describe_date(Some("2026-03-04T05:06:07+00:00")), "2026-03-04 05:06:07");
        assert_eq!(describe_date(Some("garbage")), "garbage");
        assert_eq!(describe_date(None), "");
    }
}
