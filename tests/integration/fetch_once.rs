//! Single-attempt fetch behavior: staging writes, failure modes, the
//! pre-fired breaker, and the stall watchdog.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::common::*;
use gcs_source_fetcher::fetcher::FetchError;

#[tokio::test]
async fn test_fetch_once_stores_file() {
    let tc = build_context();
    let j = job(SUCCESS_BUCKET, SFILE1);
    let dest = tc.work_dir.path().join("sfile1.tmp");
    let (_tx, mut breaker) = mpsc::channel(1);

    let size = tc
        .fetcher
        .fetch_once(&j, &dest, &mut breaker)
        .await
        .expect("fetch_once");

    assert_eq!(size as usize, SFILE1_CONTENTS.len());
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), SFILE1_CONTENTS);
}

#[tokio::test]
async fn test_fetch_once_access_denied_message() {
    let tc = build_context();
    let j = job(ERROR_BUCKET, EFILE_DENIED);
    let dest = tc.work_dir.path().join("efile4.tmp");
    let (_tx, mut breaker) = mpsc::channel(1);

    let err = tc
        .fetcher
        .fetch_once(&j, &dest, &mut breaker)
        .await
        .expect_err("fetch_once should fail");

    match err {
        FetchError::Permission(inner) => {
            assert_eq!(
                inner.to_string(),
                "Access to bucket error-bucket denied. You must grant Storage \
                 Object Viewer permission to some@robot. If you are using VPC \
                 Service Controls, you must also grant it access to your \
                 service perimeter."
            );
        }
        other => panic!("want permission error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_once_reader_open_failure() {
    let tc = build_context();
    let j = job(ERROR_BUCKET, EFILE_NEW_READER);
    let dest = tc.work_dir.path().join("efile1.tmp");
    let (_tx, mut breaker) = mpsc::channel(1);

    let err = tc
        .fetcher
        .fetch_once(&j, &dest, &mut breaker)
        .await
        .expect_err("fetch_once should fail");

    assert!(
        err.to_string().ends_with("instrumented GCS NewReader error"),
        "got {err}"
    );
}

#[tokio::test]
async fn test_fetch_once_prefired_breaker_times_out() {
    let tc = build_context();
    let j = job(SUCCESS_BUCKET, SFILE1);
    let dest = tc.work_dir.path().join("sfile1.tmp");

    let (tx, mut breaker) = mpsc::channel(1);
    tx.send(()).await.unwrap();

    let err = tc
        .fetcher
        .fetch_once(&j, &dest, &mut breaker)
        .await
        .expect_err("fetch_once should fail");
    assert!(matches!(err, FetchError::Timeout), "got {err:?}");
}

#[tokio::test]
async fn test_fetch_once_create_failure() {
    let tc = build_context();
    tc.fs.fail_create(1);
    let j = job(SUCCESS_BUCKET, SFILE1);
    let dest = tc.work_dir.path().join("sfile1.tmp");
    let (_tx, mut breaker) = mpsc::channel(1);

    let err = tc
        .fetcher
        .fetch_once(&j, &dest, &mut breaker)
        .await
        .expect_err("fetch_once should fail");

    assert!(
        err.to_string().ends_with("instrumented create error"),
        "got {err}"
    );
}

#[tokio::test]
async fn test_fetch_once_read_failure() {
    let tc = build_context();
    let j = job(ERROR_BUCKET, EFILE_READ);
    let dest = tc.work_dir.path().join("efile2.tmp");
    let (_tx, mut breaker) = mpsc::channel(1);

    let err = tc
        .fetcher
        .fetch_once(&j, &dest, &mut breaker)
        .await
        .expect_err("fetch_once should fail");

    assert!(
        err.to_string().ends_with("instrumented GCS Read err"),
        "got {err}"
    );
}

#[tokio::test]
async fn test_fetch_once_with_deadline_succeeds() {
    let tc = build_context();
    let j = job(SUCCESS_BUCKET, SFILE1);
    let dest = tc.work_dir.path().join("sfile1.tmp");

    let size = tc
        .fetcher
        .fetch_once_with_deadline(&j, Duration::from_secs(10), &dest)
        .await
        .expect("fetch_once_with_deadline");
    assert_eq!(size as usize, SFILE1_CONTENTS.len());
}

#[tokio::test]
async fn test_fetch_once_with_deadline_fails_on_stall() {
    let tc = build_context();
    let j = job(ERROR_BUCKET, EFILE_SLOW_READ);
    let dest = tc.work_dir.path().join("efile3.tmp");

    let started = Instant::now();
    let err = tc
        .fetcher
        .fetch_once_with_deadline(&j, Duration::from_millis(100), &dest)
        .await
        .expect_err("stalled read should time out");

    assert!(matches!(err, FetchError::Timeout), "got {err:?}");
    // The watchdog must cut the stall short, well before the reader's
    // one-second sleep elapses.
    assert!(started.elapsed() < Duration::from_secs(1));
}
