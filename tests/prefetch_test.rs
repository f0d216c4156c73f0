mod common;

use async_trait::async_trait;
use common::{gated, harness, settle, wav, RecordingSink, VoiceMode};
use lucid_narrator::backends::SpeechBackend;
use lucid_narrator::SpeechError;
use mockall::predicate::eq;
use std::time::Duration;
use tokio::time::{sleep, Instant};

mockall::mock! {
    pub Backend {}
    #[async_trait]
    impl SpeechBackend for Backend {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
        fn id(&self) -> &'static str;
    }
}

#[tokio::test]
async fn test_prefetch_is_deduplicated() {
    let mut backend = MockBackend::new();
    backend
        .expect_synthesize()
        .with(eq("Photosynthesis"))
        .times(1)
        .returning(|text| Ok(wav(text)));
    backend.expect_id().return_const("mock");
    let h = harness(backend, RecordingSink::default(), VoiceMode::Speak, 30);

    assert!(h.narrator.prefetch_speech("Photosynthesis"));
    // Pending
    assert!(!h.narrator.prefetch_speech("Photosynthesis"));
    settle().await;
    // Cached
    assert!(!h.narrator.prefetch_speech(" Photosynthesis "));

    assert!(h.narrator.is_cached("Photosynthesis"));
    assert_eq!(h.narrator.status().pending, 0);
}

#[tokio::test]
async fn test_prefetch_failure_is_swallowed() {
    let mut backend = MockBackend::new();
    backend
        .expect_synthesize()
        .times(2)
        .returning(|_| Err(SpeechError::Network("connection refused".into())));
    backend.expect_id().return_const("mock");
    let h = harness(backend, RecordingSink::default(), VoiceMode::Speak, 30);

    assert!(h.narrator.prefetch_speech("Erosion"));
    settle().await;

    assert!(!h.narrator.is_cached("Erosion"));
    assert_eq!(h.narrator.status().pending, 0);
    // Nothing remembered, so a retry goes out again.
    assert!(h.narrator.prefetch_speech("Erosion"));
    settle().await;
}

#[tokio::test]
async fn test_empty_prefetch_is_ignored() {
    let h = gated();

    assert!(!h.narrator.prefetch_speech("  "));
    settle().await;
    assert!(h.backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_batch_is_staggered_in_order() {
    let h = gated();
    let start = Instant::now();

    h.narrator
        .prefetch_all_scenes(["Scene one", "Scene two", "Scene one", "", "Scene three"]);
    settle().await;
    assert_eq!(h.backend.calls(), vec!["Scene one"]);

    sleep(Duration::from_millis(160)).await;
    settle().await;
    assert_eq!(h.backend.calls(), vec!["Scene one", "Scene two"]);

    sleep(Duration::from_millis(1000)).await;
    settle().await;
    let issued = h.backend.issued_after(start);
    let texts: Vec<&str> = issued.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(texts, vec!["Scene one", "Scene two", "Scene three"]);
    assert_eq!(issued[0].1, Duration::ZERO);
    assert!(issued[1].1 >= Duration::from_millis(150));
    assert!(issued[2].1 >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_delayed_item_skips_text_already_pending() {
    let h = gated();

    h.narrator.prefetch_all_scenes(["Intro", "Outro"]);
    assert!(h.narrator.prefetch_speech("Outro"));
    sleep(Duration::from_millis(500)).await;
    settle().await;

    assert_eq!(h.backend.call_count("Outro"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delayed_item_skips_text_already_cached() {
    let h = gated();

    h.narrator.prefetch_all_scenes(["Intro", "Outro"]);
    h.narrator.prefetch_speech("Outro");
    settle().await;
    assert!(h.backend.succeed("Outro"));
    settle().await;
    assert!(h.narrator.is_cached("Outro"));

    sleep(Duration::from_millis(500)).await;
    settle().await;
    assert_eq!(h.backend.call_count("Outro"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_aborts_in_flight_and_scheduled() {
    let h = gated();

    h.narrator.prefetch_all_scenes(["a", "b", "c"]);
    settle().await;

    assert_eq!(h.narrator.cancel_all_prefetches(), 1);
    assert_eq!(h.narrator.status().pending, 0);

    sleep(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(h.backend.calls(), vec!["a"]);
    assert!(!h.backend.succeed("a"));
    assert!(!h.narrator.is_cached("a"));
}

#[tokio::test]
async fn test_cancel_all_keeps_cached_entries() {
    let h = gated();

    h.narrator.prefetch_speech("Kept");
    settle().await;
    h.backend.succeed("Kept");
    settle().await;

    assert_eq!(h.narrator.cancel_all_prefetches(), 0);
    assert!(h.narrator.is_cached("Kept"));
}

#[tokio::test]
async fn test_prefetch_survives_speech_cancel() {
    let h = gated();

    h.narrator.prefetch_speech("Background");
    let _utterance = h.narrator.speak("Foreground");
    settle().await;
    h.narrator.cancel_speech();

    assert!(h.backend.succeed("Background"));
    settle().await;
    assert!(h.narrator.is_cached("Background"));
}
