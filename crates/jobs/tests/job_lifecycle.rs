//! End-to-end job lifecycle against a temporary job store

use media_pipeline_common::Args;
use media_pipeline_jobs::{compose_job_list, JobError, JobRunner, JobStatus, JobStore, StepStatus};
use serde_json::json;
use std::path::Path;

fn step(target: &Path, output: &Path) -> Args {
    let mut args = Args::new();
    args.insert("target_path".to_string(), json!(target.to_string_lossy()));
    args.insert("output_path".to_string(), json!(output.to_string_lossy()));
    args
}

/// Appends a marker to the target content and writes it to the output
fn append_marker(_job_id: &str, index: usize, args: &Args) -> bool {
    let target = args["target_path"].as_str().unwrap_or_default();
    let output = args["output_path"].as_str().unwrap_or_default();
    let Ok(content) = std::fs::read_to_string(target) else {
        return false;
    };
    std::fs::write(output, format!("{content}{index}")).is_ok()
}

#[test]
fn test_remix_chain_runs_on_previous_step_output() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(dir.path().join("jobs"));
    store.init_jobs().unwrap();
    std::fs::write(dir.path().join("in.png"), "in-").unwrap();

    store.create_job("remix").unwrap();
    store
        .add_step("remix", step(&dir.path().join("in.png"), &dir.path().join("first.png")))
        .unwrap();
    let mut remix = Args::new();
    remix.insert("output_path".to_string(), json!(dir.path().join("second.png").to_string_lossy()));
    store.remix_step("remix", -1, remix).unwrap();
    assert_eq!(store.count_step_total("remix").unwrap(), 2);
    store.submit_job("remix").unwrap();

    let runner = JobRunner::new(store.clone());
    runner.run_job("remix", &mut append_marker).unwrap();

    assert_eq!(std::fs::read_to_string(dir.path().join("first.png")).unwrap(), "in-0");
    assert_eq!(std::fs::read_to_string(dir.path().join("second.png")).unwrap(), "in-01");
    assert!(!dir.path().join("first-remix-0.png").exists());
    assert!(!dir.path().join("second-remix-1.png").exists());

    let steps = store.get_steps("remix").unwrap();
    assert!(steps.iter().all(|s| s.status == StepStatus::Completed));
    let listing = compose_job_list(&store, JobStatus::Completed).unwrap();
    assert_eq!(listing.rows[0][0], "remix");
}

#[test]
fn test_step_edits_only_apply_to_drafted_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(dir.path().join("jobs"));
    store.init_jobs().unwrap();
    let args = step(Path::new("a.png"), Path::new("b.png"));

    store.create_job("edit").unwrap();
    assert!(matches!(store.create_job("edit"), Err(JobError::AlreadyExists(_))));
    assert!(matches!(store.submit_job("edit"), Err(JobError::NoSteps(_))));

    store.add_step("edit", args.clone()).unwrap();
    store.insert_step("edit", 0, step(Path::new("c.png"), Path::new("d.png"))).unwrap();
    let steps = store.get_steps("edit").unwrap();
    assert_eq!(steps[0].arg_str("target_path"), Some("c.png"));
    assert_eq!(steps[1].arg_str("target_path"), Some("a.png"));

    store.remove_step("edit", -1).unwrap();
    assert_eq!(store.count_step_total("edit").unwrap(), 1);
    assert!(matches!(
        store.remove_step("edit", 5),
        Err(JobError::StepOutOfRange { index: 5, .. })
    ));

    store.submit_job("edit").unwrap();
    assert!(matches!(store.add_step("edit", args), Err(JobError::InvalidStatus { .. })));
    assert!(store.get_steps("edit").unwrap().iter().all(|s| s.status == StepStatus::Queued));

    store.delete_job("edit").unwrap();
    assert_eq!(store.find_job_status("edit"), None);
}
