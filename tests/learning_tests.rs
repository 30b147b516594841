use proptest::prelude::*;

use lexis_backend::services::learning::{
    clamp_confidence, merge_confidence, BulkOptions, BulkTier, BulkWord, LearningConfig,
};
use lexis_backend::store::LedgerStore;

mod common;

use common::{harness, translations, with_confidence};

fn bulk_words(count: usize) -> Vec<BulkWord> {
    (0..count)
        .map(|i| BulkWord {
            word: format!("word{i:04}"),
            translations: translations("es", &format!("palabra{i}")),
            pos: None,
            context: None,
            confidence: None,
        })
        .collect()
}

#[tokio::test]
async fn storing_casa_on_fresh_ledger() {
    let h = harness().build();

    let outcome = h
        .state
        .learning()
        .store_learned_word("casa", translations("es", "house"), with_confidence(0.8))
        .await
        .unwrap();

    assert!(outcome.stored);
    assert!(!outcome.should_trigger_pr);
    assert_eq!(outcome.pending_count, 1);

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "stored": true, "shouldTriggerPR": false, "pendingCount": 1 })
    );
}

#[tokio::test]
async fn repeat_sightings_average_confidence() {
    let h = harness().build();
    let learning = h.state.learning();

    learning
        .store_learned_word("river", translations("es", "río"), with_confidence(0.7))
        .await
        .unwrap();
    for _ in 0..3 {
        learning
            .store_learned_word("river", translations("es", "río"), with_confidence(0.6))
            .await
            .unwrap();
    }

    let record = learning.get_learned_word("river").await.unwrap().unwrap();
    assert_eq!(record.seen_count, 4);
    assert!((record.confidence - 0.6125).abs() < 1e-9, "{}", record.confidence);
}

#[tokio::test]
async fn storing_twice_does_not_grow_queue() {
    let h = harness().build();
    let learning = h.state.learning();

    let first = learning
        .store_learned_word("river", translations("es", "río"), with_confidence(0.8))
        .await
        .unwrap();
    let second = learning
        .store_learned_word("River", translations("fr", "rivière"), with_confidence(0.8))
        .await
        .unwrap();

    assert_eq!(first.pending_count, 1);
    assert_eq!(second.pending_count, 1);
    assert_eq!(h.ledger.pending_len().await.unwrap(), 1);

    let record = learning.get_learned_word("river").await.unwrap().unwrap();
    assert_eq!(record.translations.len(), 2);
}

#[tokio::test]
async fn learned_translation_lookup() {
    let h = harness().build();
    let learning = h.state.learning();

    learning
        .store_learned_word("casa", translations("es", "house"), with_confidence(0.8))
        .await
        .unwrap();

    assert_eq!(
        learning.get_learned_translation("CASA", "es").await.unwrap().as_deref(),
        Some("house")
    );
    assert_eq!(learning.get_learned_translation("casa", "fr").await.unwrap(), None);
    assert_eq!(learning.get_learned_translation("nada", "es").await.unwrap(), None);
}

#[tokio::test]
async fn invalid_words_are_rejected_before_storing() {
    let h = harness().build();
    let learning = h.state.learning();

    assert!(learning
        .store_learned_word("a", translations("es", "un"), with_confidence(0.8))
        .await
        .is_err());
    assert!(learning
        .store_learned_word("river", translations("es", "  "), with_confidence(0.8))
        .await
        .is_err());
    assert!(learning
        .store_learned_word("river", translations("es", "río"), with_confidence(f64::NAN))
        .await
        .is_err());

    assert_eq!(h.ledger.pending_len().await.unwrap(), 0);
}

#[tokio::test]
async fn tenth_distinct_word_requests_contribution() {
    let h = harness().build();
    let learning = h.state.learning();

    for i in 0..9 {
        let outcome = learning
            .store_learned_word(&format!("word{i}"), translations("es", "x"), with_confidence(0.8))
            .await
            .unwrap();
        assert!(!outcome.should_trigger_pr, "word {i} triggered early");
    }

    let tenth = learning
        .store_learned_word("word9", translations("es", "x"), with_confidence(0.8))
        .await
        .unwrap();
    assert_eq!(tenth.pending_count, 10);
    assert!(tenth.should_trigger_pr);
}

#[tokio::test]
async fn held_guard_suppresses_trigger() {
    let h = harness().build();
    let learning = h.state.learning();

    assert!(h
        .ledger
        .try_acquire_processing(std::time::Duration::from_secs(60))
        .await
        .unwrap());
    for i in 0..10 {
        let outcome = learning
            .store_learned_word(&format!("word{i}"), translations("es", "x"), with_confidence(0.8))
            .await
            .unwrap();
        assert!(!outcome.should_trigger_pr);
    }
}

#[tokio::test]
async fn small_tier_rejects_101_words() {
    let h = harness().build();
    let learning = h.state.learning();

    let opts = BulkOptions {
        tier: BulkTier::Small,
        source_language: None,
    };
    let rejected = learning.bulk_upload_words(bulk_words(101), opts.clone()).await;
    assert!(!rejected.success);
    assert!(rejected.rejected);
    assert_eq!(rejected.added, 0);
    assert!(!rejected.errors.is_empty());
    assert_eq!(h.ledger.pending_len().await.unwrap(), 0);

    let accepted = learning.bulk_upload_words(bulk_words(100), opts).await;
    assert!(accepted.success);
    assert_eq!(accepted.added, 100);
    assert_eq!(accepted.pending_count, 100);
}

#[tokio::test]
async fn bulk_upload_applies_repeats_in_order() {
    let h = harness().build();
    let learning = h.state.learning();

    learning
        .store_learned_word("word0000", translations("es", "vieja"), with_confidence(0.8))
        .await
        .unwrap();

    let mut words = bulk_words(3);
    words.push(BulkWord {
        word: "WORD0001".to_string(),
        translations: translations("es", "nueva"),
        pos: None,
        context: None,
        confidence: None,
    });
    words.push(BulkWord {
        word: "x".to_string(),
        translations: translations("es", "equis"),
        pos: None,
        context: None,
        confidence: None,
    });

    let result = learning.bulk_upload_words(words, BulkOptions::default()).await;
    assert!(result.success);
    assert_eq!(result.updated, 2);
    assert_eq!(result.added, 2);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.pending_count, 3);

    assert_eq!(
        learning.get_learned_translation("word0001", "es").await.unwrap().as_deref(),
        Some("nueva")
    );
    let repeated = learning.get_learned_word("word0001").await.unwrap().unwrap();
    assert_eq!(repeated.seen_count, 2);
    assert!((repeated.confidence - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn stored_config_overrides_defaults() {
    let h = harness().build();
    let learning = h.state.learning();

    let config = LearningConfig {
        pr_threshold: 2,
        ..LearningConfig::default()
    };
    learning.update_config(config.clone()).await.unwrap();
    assert_eq!(learning.config().await, config);

    learning
        .store_learned_word("river", translations("es", "río"), with_confidence(0.8))
        .await
        .unwrap();
    let second = learning
        .store_learned_word("lake", translations("es", "lago"), with_confidence(0.8))
        .await
        .unwrap();
    assert!(second.should_trigger_pr);

    let invalid = LearningConfig {
        min_confidence: 1.5,
        ..LearningConfig::default()
    };
    assert!(learning.update_config(invalid).await.is_err());
    assert_eq!(learning.config().await, config);
}

#[tokio::test]
async fn stats_track_totals() {
    let h = harness().build();
    let learning = h.state.learning();

    learning
        .store_learned_word("river", translations("es", "río"), with_confidence(0.8))
        .await
        .unwrap();
    learning
        .store_learned_word("river", translations("es", "río"), with_confidence(0.8))
        .await
        .unwrap();
    learning
        .store_learned_word("lake", translations("es", "lago"), with_confidence(0.8))
        .await
        .unwrap();

    let stats = learning.stats().await.unwrap();
    assert_eq!(stats.total_learned, 2);
    assert_eq!(stats.pending_count, 2);
    assert!(!stats.is_processing);
    assert_eq!(stats.last_pr_number, None);
}

proptest! {
    #[test]
    fn merged_confidence_stays_in_unit_interval(
        existing in -5.0f64..5.0,
        incoming in -5.0f64..5.0,
    ) {
        let existing = clamp_confidence(existing).unwrap();
        let incoming = clamp_confidence(incoming).unwrap();
        let merged = merge_confidence(existing, incoming);
        prop_assert!((0.0..=1.0).contains(&merged));
        prop_assert!(merged >= existing.min(incoming) - 1e-12);
        prop_assert!(merged <= existing.max(incoming) + 1e-12);
    }

    #[test]
    fn trigger_requires_every_condition(
        pending in 0usize..30,
        threshold in 1usize..20,
        auto in any::<bool>(),
        processing in any::<bool>(),
    ) {
        let config = LearningConfig {
            pr_threshold: threshold,
            auto_trigger: auto,
            ..LearningConfig::default()
        };
        let expected = auto && pending >= threshold && !processing;
        prop_assert_eq!(config.should_trigger_pr(pending, processing), expected);
    }
}
