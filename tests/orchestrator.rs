// tests/orchestrator.rs
//
// Random-post transform pipeline against in-memory doubles.

use std::path::Path;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use repost_relay::caption::{MockGenerator, TextGenerator, CAPTION_FALLBACK_PREFIX};
use repost_relay::harvest::metadata_for;
use repost_relay::media::{MediaKind, WatermarkPlacement};
use repost_relay::orchestrator::{OrchestratorSettings, PROCESS_FAILED_PREFIX, UPLOAD_FAILED_PREFIX};
use repost_relay::rng::SharedRng;
use repost_relay::source::http::media_file_name;
use repost_relay::testing::{post, CopyTransformer, FailingGenerator, ScriptedHost};
use repost_relay::{Orchestrator, Storage, TransformError};

/// Lay a harvested post out on disk exactly as the harvester would.
fn seed(storage: &Storage, account: &str, shortcode: &str, kinds: &[MediaKind]) {
    let p = post(
        shortcode,
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        kinds,
    );
    let dir = storage.create_post_dir(account, shortcode).unwrap();
    for i in 0..kinds.len() {
        let name = media_file_name(&p, i).unwrap();
        std::fs::write(dir.join(name), b"media").unwrap();
    }
    storage.write_metadata(&dir, &metadata_for(account, &p)).unwrap();
}

struct Fixture {
    _tmp: tempfile::TempDir,
    storage: Storage,
    transformer: Arc<CopyTransformer>,
    host: Arc<ScriptedHost>,
}

impl Fixture {
    fn new(transformer: CopyTransformer, host: ScriptedHost) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Storage::new(tmp.path().join("posts"));
        storage.reset_dataset().unwrap();
        Self {
            _tmp: tmp,
            storage,
            transformer: Arc::new(transformer),
            host: Arc::new(host),
        }
    }

    fn orchestrator(&self, captions: Arc<dyn TextGenerator>, seed: u64) -> Orchestrator {
        Orchestrator::new(
            self.storage.clone(),
            self.transformer.clone(),
            self.host.clone(),
            captions,
            OrchestratorSettings {
                logo_path: Path::new("logos/logo.png").to_path_buf(),
                placement: WatermarkPlacement::default(),
            },
            SharedRng::seeded(seed),
        )
    }
}

fn mock(text: &str) -> Arc<dyn TextGenerator> {
    Arc::new(MockGenerator {
        fixed: text.to_string(),
    })
}

#[tokio::test]
async fn empty_dataset_reports_no_content() {
    let fx = Fixture::new(CopyTransformer::new((1080, 1080)), ScriptedHost::new());
    // An account folder with no posts does not count as content.
    std::fs::create_dir_all(fx.storage.account_dir("hollow")).unwrap();

    let res = fx.orchestrator(mock("x"), 1).process_random_post().await;

    assert!(matches!(res, Err(TransformError::NoContentAvailable)));
}

#[tokio::test]
async fn successful_transform_returns_urls_and_deletes_account() {
    let fx = Fixture::new(CopyTransformer::new((1080, 1080)), ScriptedHost::new());
    seed(&fx.storage, "acctA", "p1", &[MediaKind::Image, MediaKind::Image]);

    let out = fx
        .orchestrator(mock("Brand new caption"), 1)
        .process_random_post()
        .await
        .unwrap();

    assert_eq!(out.original_post.id, "p1");
    assert_eq!(out.original_post.username, "acctA");
    assert_eq!(out.processed_media.len(), 2);
    for url in &out.processed_media {
        assert!(url.starts_with("https://tmpfiles.org/dl/"), "{url}");
    }
    assert!(out.processed_media[0].ends_with("processed_01_2024-06-01_12-00-00_UTC_1.jpg"));
    assert!(out.processed_media[1].ends_with("processed_02_2024-06-01_12-00-00_UTC_2.jpg"));
    assert_eq!(out.new_caption, "Brand new caption");
    assert!(!fx.storage.account_dir("acctA").exists());
    assert_eq!(fx.host.uploads().len(), 2);
}

#[tokio::test]
async fn upload_failure_on_one_item_keeps_the_other() {
    let fx = Fixture::new(
        CopyTransformer::new((1080, 1080)),
        ScriptedHost::new().failing_on("processed_02_2024-06-01_12-00-00_UTC_2.jpg"),
    );
    seed(&fx.storage, "acctA", "p1", &[MediaKind::Image, MediaKind::Image]);

    let out = fx
        .orchestrator(mock("ok"), 1)
        .process_random_post()
        .await
        .unwrap();

    assert_eq!(out.processed_media.len(), 2);
    assert!(out.processed_media[0].starts_with("https://tmpfiles.org/dl/"));
    assert!(out.processed_media[1].starts_with(UPLOAD_FAILED_PREFIX));
    assert!(out.processed_media[1].ends_with("processed_02_2024-06-01_12-00-00_UTC_2.jpg"));
    assert!(!fx.storage.account_dir("acctA").exists(), "deleted even with failures");
}

#[tokio::test]
async fn processing_failure_yields_marker_naming_the_input() {
    let fx = Fixture::new(
        CopyTransformer::new((1080, 1080)).failing_on("2024-06-01_12-00-00_UTC.jpg"),
        ScriptedHost::new(),
    );
    seed(&fx.storage, "acctA", "p1", &[MediaKind::Image]);

    let out = fx
        .orchestrator(mock("ok"), 1)
        .process_random_post()
        .await
        .unwrap();

    assert_eq!(out.processed_media.len(), 1);
    assert!(out.processed_media[0].starts_with(PROCESS_FAILED_PREFIX));
    assert!(out.processed_media[0].ends_with("2024-06-01_12-00-00_UTC.jpg"));
    assert!(fx.host.uploads().is_empty());
}

#[tokio::test]
async fn video_failure_is_isolated_like_images() {
    let fx = Fixture::new(
        CopyTransformer::new((1080, 1920)).failing_on("2024-06-01_12-00-00_UTC_2.mp4"),
        ScriptedHost::new(),
    );
    seed(&fx.storage, "acctA", "mix", &[MediaKind::Image, MediaKind::Video]);

    let out = fx
        .orchestrator(mock("ok"), 1)
        .process_random_post()
        .await
        .unwrap();

    assert_eq!(out.processed_media.len(), 2);
    assert!(out.processed_media[0].starts_with("https://tmpfiles.org/dl/"));
    assert!(out.processed_media[1].starts_with(PROCESS_FAILED_PREFIX));
    assert!(out.processed_media[1].ends_with("2024-06-01_12-00-00_UTC_2.mp4"));
    assert_eq!(fx.transformer.video_positions(), vec![(870, 10)]);
    assert_eq!(fx.host.uploads().len(), 1);
    assert!(!fx.storage.account_dir("acctA").exists());
}

#[tokio::test]
async fn caption_failure_falls_back_to_marked_original() {
    let fx = Fixture::new(CopyTransformer::new((1080, 1080)), ScriptedHost::new());
    seed(&fx.storage, "acctA", "p1", &[MediaKind::Image]);

    let out = fx
        .orchestrator(Arc::new(FailingGenerator), 1)
        .process_random_post()
        .await
        .unwrap();

    assert_eq!(
        out.new_caption,
        format!("{CAPTION_FALLBACK_PREFIX}caption of p1")
    );
}

#[tokio::test]
async fn video_logo_is_anchored_top_right() {
    let fx = Fixture::new(CopyTransformer::new((1080, 1920)), ScriptedHost::new());
    seed(&fx.storage, "acctA", "v1", &[MediaKind::Video]);

    let out = fx
        .orchestrator(mock("ok"), 1)
        .process_random_post()
        .await
        .unwrap();

    assert_eq!(fx.transformer.video_positions(), vec![(870, 10)]);
    assert!(out.processed_media[0].ends_with("processed_01_2024-06-01_12-00-00_UTC.mp4"));
}

#[tokio::test]
async fn post_without_metadata_is_rejected_and_left_in_place() {
    let fx = Fixture::new(CopyTransformer::new((1080, 1080)), ScriptedHost::new());
    let dir = fx.storage.create_post_dir("acctA", "orphan").unwrap();
    std::fs::write(dir.join("2024-06-01_12-00-00_UTC.jpg"), b"media").unwrap();

    let res = fx.orchestrator(mock("ok"), 1).process_random_post().await;

    match res {
        Err(TransformError::MetadataMissing { account, post_id }) => {
            assert_eq!(account, "acctA");
            assert_eq!(post_id, "orphan");
        }
        other => panic!("expected MetadataMissing, got {other:?}"),
    }
    assert!(dir.exists());
}

#[tokio::test]
async fn same_seed_picks_the_same_post() {
    let a = Fixture::new(CopyTransformer::new((1080, 1080)), ScriptedHost::new());
    let b = Fixture::new(CopyTransformer::new((1080, 1080)), ScriptedHost::new());
    for fx in [&a, &b] {
        for acct in ["acctA", "acctB", "acctC"] {
            for p in ["p1", "p2", "p3", "p4"] {
                seed(&fx.storage, acct, p, &[MediaKind::Image]);
            }
        }
    }

    let picks_a: Vec<_> = {
        let o = a.orchestrator(mock("x"), 99);
        (0..5).map(|_| o.pick_random_post().unwrap()).collect()
    };
    let picks_b: Vec<_> = {
        let o = b.orchestrator(mock("x"), 99);
        (0..5).map(|_| o.pick_random_post().unwrap()).collect()
    };

    assert_eq!(picks_a, picks_b);
}
