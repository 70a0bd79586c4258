// tests/harvest_window.rs
//
// Window filtering end-to-end: which posts land on disk for a given "now".

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use repost_relay::media::MediaKind;
use repost_relay::rng::SharedRng;
use repost_relay::testing::{post, ScriptedSource};
use repost_relay::{Harvester, RetryPolicy, Storage};

fn harvester(storage: &Storage, source: Arc<ScriptedSource>) -> Harvester {
    Harvester::new(
        storage.clone(),
        source,
        RetryPolicy::immediate(3),
        SharedRng::seeded(11),
    )
}

#[tokio::test]
async fn forty_eight_hour_window_keeps_first_two_posts() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = Storage::new(tmp.path().join("posts"));
    storage.reset_dataset().unwrap();

    let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
    // Deliberately unsorted: the harvester sorts newest-first itself.
    let source = Arc::new(ScriptedSource::new().with_account(
        "acctA",
        vec![
            post("old49", now - ChronoDuration::hours(49), &[MediaKind::Image]),
            post("new1", now - ChronoDuration::hours(1), &[MediaKind::Image]),
            post("mid47", now - ChronoDuration::hours(47), &[MediaKind::Video]),
        ],
    ));

    let report = harvester(&storage, source.clone())
        .harvest_at(now, &["acctA".to_string()], 48)
        .await;

    assert_eq!(storage.list_posts("acctA"), vec!["mid47", "new1"]);
    assert_eq!(source.attempts("old49"), 0, "out-of-window post must not be touched");
    assert_eq!(report.downloaded(), 2);
    assert_eq!(report.accounts[0].examined, 3);
    assert_eq!(report.accounts[0].in_window, 2);

    for id in ["new1", "mid47"] {
        let meta = storage.read_metadata("acctA", id).unwrap().expect("metadata");
        assert_eq!(meta.id, id);
        assert_eq!(meta.username, "acctA");
        assert_eq!(meta.likes, 10);
        assert_eq!(storage.list_media("acctA", id).len(), 1);
    }
}

#[tokio::test]
async fn window_boundaries_are_inclusive() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = Storage::new(tmp.path());

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let since = now - ChronoDuration::hours(24);
    let source = Arc::new(ScriptedSource::new().with_account(
        "acct",
        vec![
            post("at_until", now, &[MediaKind::Image]),
            post("at_since", since, &[MediaKind::Image]),
            post("just_before", since - ChronoDuration::seconds(1), &[MediaKind::Image]),
            post("just_after", now + ChronoDuration::seconds(1), &[MediaKind::Image]),
        ],
    ));

    harvester(&storage, source)
        .harvest_at(now, &["acct".to_string()], 24)
        .await;

    assert_eq!(storage.list_posts("acct"), vec!["at_since", "at_until"]);
}

#[tokio::test]
async fn account_without_matching_posts_is_not_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = Storage::new(tmp.path());
    let now = Utc::now();
    let source = Arc::new(ScriptedSource::new().with_account(
        "quiet",
        vec![post("ancient", now - ChronoDuration::days(30), &[MediaKind::Image])],
    ));

    let report = harvester(&storage, source)
        .harvest_at(now, &["quiet".to_string()], 48)
        .await;

    assert_eq!(report.accounts[0].downloaded, 0);
    assert!(report.accounts[0].error.is_none());
    assert!(storage.list_posts("quiet").is_empty());
}

#[tokio::test]
async fn carousel_media_all_stored_with_metadata() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = Storage::new(tmp.path());
    let now = Utc::now();
    let source = Arc::new(ScriptedSource::new().with_account(
        "acct",
        vec![post(
            "side",
            now - ChronoDuration::hours(2),
            &[MediaKind::Image, MediaKind::Video, MediaKind::Image],
        )],
    ));

    harvester(&storage, source)
        .harvest_at(now, &["acct".to_string()], 48)
        .await;

    assert_eq!(storage.list_media("acct", "side").len(), 3);
    let meta = storage.read_metadata("acct", "side").unwrap().unwrap();
    assert_eq!(meta.media_type, "GraphSidecar");
}
