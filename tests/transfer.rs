//! Publishing behaviour against scripted SFTP and FTP targets.
mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::NaiveDate;
use climcomp::transfer::{RemoteLayout, TransferOutcome};
use climcomp::{
    Artifact, CancellationToken, FsTemplateStore, Language, Pipeline, RemoteTarget, RetryPolicy,
    Stage, TargetKind, TransferDispatcher, TransferError, Variant,
};
use common::{
    Behaviour, FakeEngine, ScriptedTarget, config, uniform_raster, write_sources, write_template,
};

fn artifact(dir: &Path, relative_path: &str) -> Artifact {
    let local_path: PathBuf = dir.join(relative_path);
    std::fs::create_dir_all(local_path.parent().unwrap()).unwrap();
    std::fs::write(&local_path, b"png").unwrap();
    Artifact {
        local_path,
        relative_path: relative_path.to_string(),
    }
}

fn dispatcher(targets: Vec<Arc<dyn RemoteTarget>>) -> TransferDispatcher {
    let layout = RemoteLayout {
        remote_dir: "maps".into(),
        date: None,
        keep_days: None,
    };
    let retry = RetryPolicy {
        max_attempts: 3,
        backoff_ms: 1,
        max_backoff_ms: 2,
    };
    TransferDispatcher::new(targets, layout, retry, 2).unwrap()
}

// ============================================================================
// Scenario: SFTP unreachable, FTP healthy
// ============================================================================

#[test]
fn test_unreachable_sftp_does_not_block_ftp() {
    let tmp = tempfile::tempdir().unwrap();
    let sftp = Arc::new(ScriptedTarget::new(TargetKind::Sftp, Behaviour::TimeOut));
    let ftp = Arc::new(ScriptedTarget::new(TargetKind::Ftp, Behaviour::Accept));
    let artifacts = vec![artifact(tmp.path(), "normal/en/HI.png")];

    let targets: Vec<Arc<dyn RemoteTarget>> = vec![sftp.clone(), ftp.clone()];
    let records = dispatcher(targets).dispatch(&artifacts);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].target, TargetKind::Sftp);
    assert_eq!(
        records[0].outcome,
        TransferOutcome::Failure(TransferError::ConnectionFailed("connect timed out".into()))
    );
    assert_eq!(records[0].attempts, 3);
    assert_eq!(sftp.connects.load(Ordering::SeqCst), 3);

    assert_eq!(records[1].target, TargetKind::Ftp);
    assert!(records[1].is_success());
    assert_eq!(records[1].attempts, 1);
    assert_eq!(records[1].remote_path, "maps/normal/en/HI.png");
}

#[test]
fn test_pipeline_reports_partial_publish() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config(tmp.path(), vec![Language::En], vec![Variant::Normal]);
    write_template(&config.template_root, Variant::Normal, Language::En, "bg_HI");
    let sources = write_sources(&tmp.path().join("in"), &["bg_HI.tif"]);
    let engine = Arc::new(FakeEngine::default().with("bg_HI.tif", uniform_raster(30.0)));
    let store = Arc::new(FsTemplateStore::new(&config.template_root));
    let sftp = Arc::new(ScriptedTarget::new(TargetKind::Sftp, Behaviour::TimeOut));
    let ftp = Arc::new(ScriptedTarget::new(TargetKind::Ftp, Behaviour::Accept));

    let targets: Vec<Arc<dyn RemoteTarget>> = vec![sftp, ftp.clone()];

    let report = Pipeline::new(config, engine, store)
        .with_targets(targets)
        .run(&sources)
        .unwrap();

    assert_eq!(report.batch.succeeded(), 1);
    assert!(!report.is_success());
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, Stage::Transfer);
    assert_eq!(failures[0].kind, "ConnectionFailed");
    assert_eq!(failures[0].target, Some(TargetKind::Sftp));
    let renamed = "rename maps/normal/en/HI.png.part maps/normal/en/HI.png".to_string();
    assert!(ftp.ops().contains(&renamed));

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["composited"], 1);
    assert_eq!(json["uploaded"], 1);
}

// ============================================================================
// Retry classification
// ============================================================================

#[test]
fn test_auth_failure_is_not_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let target = Arc::new(ScriptedTarget::new(TargetKind::Ftp, Behaviour::RejectLogin));
    let records = dispatcher(vec![target.clone()]).dispatch(&[artifact(tmp.path(), "normal/cs/UTCI.png")]);

    assert_eq!(records[0].attempts, 1);
    assert!(matches!(records[0].outcome, TransferOutcome::Failure(TransferError::AuthFailed(_))));
    assert_eq!(target.connects.load(Ordering::SeqCst), 1);
}

#[test]
fn test_rejected_upload_is_not_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let target = Arc::new(ScriptedTarget::new(TargetKind::Sftp, Behaviour::RejectUpload));
    let records = dispatcher(vec![target.clone()]).dispatch(&[artifact(tmp.path(), "reduced/de/AWR_0-100cm.png")]);

    assert_eq!(records[0].attempts, 1);
    assert_eq!(
        records[0].outcome.clone(),
        TransferOutcome::Failure(TransferError::RemoteRejected("553 Permission denied".into()))
    );
    // Session is still closed after the failed put
    assert_eq!(target.ops().last().map(String::as_str), Some("close"));
}

#[test]
fn test_transient_failure_recovers() {
    let tmp = tempfile::tempdir().unwrap();
    let target = Arc::new(ScriptedTarget::new(TargetKind::Sftp, Behaviour::Flaky(1)));
    let records = dispatcher(vec![target.clone()]).dispatch(&[artifact(tmp.path(), "normal/en/HI.png")]);

    assert!(records[0].is_success());
    assert_eq!(records[0].attempts, 2);
    assert_eq!(target.connects.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Publish protocol
// ============================================================================

#[test]
fn test_upload_goes_through_partial_name() {
    let tmp = tempfile::tempdir().unwrap();
    let target = Arc::new(ScriptedTarget::new(TargetKind::Sftp, Behaviour::Accept));
    dispatcher(vec![target.clone()]).dispatch(&[artifact(tmp.path(), "normal/sk/AWD_0-40cm.png")]);

    assert_eq!(
        target.ops(),
        vec![
            "mkdir maps/normal/sk".to_string(),
            "put maps/normal/sk/AWD_0-40cm.png.part".to_string(),
            "rename maps/normal/sk/AWD_0-40cm.png.part maps/normal/sk/AWD_0-40cm.png".to_string(),
            "close".to_string(),
        ]
    );
}

#[test]
fn test_target_without_rename_uploads_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    let target = Arc::new(ScriptedTarget::new(TargetKind::Ftp, Behaviour::Accept).without_rename());
    dispatcher(vec![target.clone()]).dispatch(&[artifact(tmp.path(), "normal/pl/HI.png")]);

    assert_eq!(
        target.ops(),
        vec![
            "mkdir maps/normal/pl".to_string(),
            "put maps/normal/pl/HI.png".to_string(),
            "close".to_string(),
        ]
    );
}

#[test]
fn test_dated_layout_adds_day_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let target = Arc::new(ScriptedTarget::new(TargetKind::Ftp, Behaviour::Accept));
    let layout = RemoteLayout {
        remote_dir: "maps/".into(),
        date: NaiveDate::from_ymd_opt(2024, 7, 1),
        keep_days: None,
    };
    let records = TransferDispatcher::new(vec![target.clone()], layout, RetryPolicy::default(), 1)
        .unwrap()
        .dispatch(&[artifact(tmp.path(), "normal/hr/HI.png")]);

    assert_eq!(records[0].remote_path, "maps/2024-07-01/normal/hr/HI.png");
}

#[test]
fn test_cancelled_dispatch_makes_no_attempts() {
    let tmp = tempfile::tempdir().unwrap();
    let target = Arc::new(ScriptedTarget::new(TargetKind::Sftp, Behaviour::Accept));
    let token = CancellationToken::new();
    token.cancel();

    let records = dispatcher(vec![target.clone()])
        .with_cancellation(token)
        .dispatch(&[artifact(tmp.path(), "normal/sl/HI.png")]);

    assert_eq!(records[0].outcome, TransferOutcome::Failure(TransferError::Cancelled));
    assert_eq!(records[0].attempts, 0);
    assert_eq!(target.connects.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Pruning dated folders
// ============================================================================

fn pruning_dispatcher(targets: Vec<Arc<dyn RemoteTarget>>, keep_days: Option<u32>) -> TransferDispatcher {
    let layout = RemoteLayout {
        remote_dir: "maps".into(),
        date: NaiveDate::from_ymd_opt(2024, 7, 10),
        keep_days,
    };
    TransferDispatcher::new(targets, layout, RetryPolicy::default(), 2).unwrap()
}

#[test]
fn test_prune_removes_only_expired_dated_folders() {
    let target = Arc::new(
        ScriptedTarget::new(TargetKind::Sftp, Behaviour::Accept)
            .with_listing("maps", &["2024-06-30/", "2024-07-03/", "2024-07-10/", "normal/", "notes.txt"])
            .with_listing("maps/2024-06-30", &["normal/", "readme.txt"])
            .with_listing("maps/2024-06-30/normal", &["HI.png"]),
    );
    let today = NaiveDate::from_ymd_opt(2024, 7, 10).unwrap();

    let records = pruning_dispatcher(vec![target.clone()], Some(7)).prune(today);

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].remote_path, "maps/2024-06-30");
    assert_eq!(records[0].outcome, TransferOutcome::Success);
    assert_eq!(
        target.ops(),
        vec![
            "list maps".to_string(),
            "list maps/2024-06-30".to_string(),
            "list maps/2024-06-30/normal".to_string(),
            "rm maps/2024-06-30/normal/HI.png".to_string(),
            "rmdir maps/2024-06-30/normal".to_string(),
            "rm maps/2024-06-30/readme.txt".to_string(),
            "rmdir maps/2024-06-30".to_string(),
            "close".to_string(),
        ]
    );
}

#[test]
fn test_prune_without_window_does_not_connect() {
    let target = Arc::new(ScriptedTarget::new(TargetKind::Ftp, Behaviour::Accept));
    let today = NaiveDate::from_ymd_opt(2024, 7, 10).unwrap();

    let records = pruning_dispatcher(vec![target.clone()], None).prune(today);

    assert!(records.is_empty());
    assert_eq!(target.connects.load(Ordering::SeqCst), 0);
}

#[test]
fn test_prune_failure_on_one_target_is_recorded() {
    let down = Arc::new(ScriptedTarget::new(TargetKind::Sftp, Behaviour::TimeOut));
    let up = Arc::new(
        ScriptedTarget::new(TargetKind::Ftp, Behaviour::Accept).with_listing("maps", &["2024-01-01/"]),
    );
    let today = NaiveDate::from_ymd_opt(2024, 7, 10).unwrap();

    let targets: Vec<Arc<dyn RemoteTarget>> = vec![down.clone(), up.clone()];
    let records = pruning_dispatcher(targets, Some(7)).prune(today);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].target, TargetKind::Sftp);
    assert_eq!(records[0].remote_path, "maps");
    assert!(matches!(
        records[0].outcome,
        TransferOutcome::Failure(TransferError::ConnectionFailed(_))
    ));
    assert_eq!(records[1].target, TargetKind::Ftp);
    assert_eq!(records[1].remote_path, "maps/2024-01-01");
    assert_eq!(records[1].outcome, TransferOutcome::Success);
    assert!(up.ops().contains(&"rmdir maps/2024-01-01".to_string()));
}

#[test]
fn test_pipeline_prunes_after_publishing() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config(tmp.path(), vec![Language::En], vec![Variant::Normal]);
    config.keep_days = Some(7);
    write_template(&config.template_root, Variant::Normal, Language::En, "bg_HI");
    let sources = write_sources(&tmp.path().join("in"), &["bg_HI.tif"]);
    let engine = Arc::new(FakeEngine::default().with("bg_HI.tif", uniform_raster(30.0)));
    let store = Arc::new(FsTemplateStore::new(&config.template_root));
    let ftp = Arc::new(
        ScriptedTarget::new(TargetKind::Ftp, Behaviour::Accept)
            .with_listing("maps", &["2000-01-01/", "normal/"])
            .with_listing("maps/2000-01-01", &[]),
    );

    let report = Pipeline::new(config, engine, store)
        .with_targets(vec![ftp.clone()])
        .run(&sources)
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.pruned.len(), 1);
    assert_eq!(report.pruned[0].remote_path, "maps/2000-01-01");
    let ops = ftp.ops();
    let renamed = ops.iter().position(|op| op.starts_with("rename")).unwrap();
    let removed = ops.iter().position(|op| op == "rmdir maps/2000-01-01").unwrap();
    assert!(renamed < removed);
}
