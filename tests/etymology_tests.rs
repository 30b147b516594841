use lexis_backend::lexicon::EtymologyData;
use lexis_backend::services::etymology::{EtymologyError, EtymologySource};
use lexis_backend::services::wiktionary::ExternalEntry;

mod common;

use common::{harness, MockInference, MockLexicon};

fn wiktionary_entry() -> ExternalEntry {
    ExternalEntry {
        etymology_text: Some("From Middle English serendipite, coined by Horace Walpole.".to_string()),
        etymology: Some(EtymologyData {
            origin: Some("Middle English".to_string()),
            original_form: Some("serendipite".to_string()),
            ..EtymologyData::default()
        }),
        definitions: vec!["A happy accident.".to_string()],
        pronunciations: vec!["/ˌsɛɹ.ənˈdɪp.ɪ.ti/".to_string()],
        pos: Some("Noun".to_string()),
    }
}

#[tokio::test]
async fn embedded_entry_needs_no_external_calls() {
    let h = harness()
        .inference(MockInference::replying("{}"))
        .external(MockLexicon::with_entry(wiktionary_entry()))
        .build();

    let result = h.state.etymology().get_full_etymology("hello", Some("en")).await.unwrap();

    assert_eq!(result.source, EtymologySource::Dictionary);
    assert!(!result.cached);
    assert_eq!(result.etymology.origin.as_deref(), Some("Old English"));
    assert_eq!(h.external.calls(), 0);
    assert_eq!(h.inference.calls(), 0);
}

#[tokio::test]
async fn wiktionary_result_is_cached() {
    let h = harness().external(MockLexicon::with_entry(wiktionary_entry())).build();
    let etymology = h.state.etymology();

    let first = etymology.get_full_etymology("Serendipity", None).await.unwrap();
    assert_eq!(first.source, EtymologySource::Wiktionary);
    assert!(!first.cached);
    assert_eq!(first.word, "serendipity");
    assert_eq!(first.language, "en");
    assert_eq!(first.etymology.origin.as_deref(), Some("Middle English"));
    assert_eq!(first.definitions, vec!["A happy accident."]);

    let second = etymology.get_full_etymology("serendipity", Some("en")).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.source, EtymologySource::Wiktionary);
    assert_eq!(h.external.calls(), 1);
}

#[tokio::test]
async fn ai_fills_in_when_wiktionary_has_nothing() {
    let h = harness()
        .inference(MockInference::replying(
            "```json\n{\"origin\":\"Latin\",\"originalForm\":\"aqua\",\"cognates\":[{\"word\":\"eau\",\"language\":\"French\"}]}\n```",
        ))
        .build();

    let result = h.state.etymology().get_full_etymology("aquarium", None).await.unwrap();

    assert_eq!(result.source, EtymologySource::Ai);
    assert_eq!(result.etymology.origin.as_deref(), Some("Latin"));
    assert_eq!(result.etymology.cognates.as_ref().map(Vec::len), Some(1));
    assert!(result.notes.is_none());
    assert_eq!(h.external.calls(), 1);
    assert_eq!(h.inference.calls(), 1);

    let again = h.state.etymology().get_full_etymology("aquarium", None).await.unwrap();
    assert!(again.cached);
    assert_eq!(h.inference.calls(), 1);
}

#[tokio::test]
async fn prose_from_ai_is_kept_as_notes_and_not_cached() {
    let h = harness()
        .inference(MockInference::replying("It probably comes from Latin."))
        .build();

    let result = h.state.etymology().get_full_etymology("zyxword", None).await.unwrap();

    assert_eq!(result.source, EtymologySource::Ai);
    assert_eq!(result.etymology, EtymologyData::unknown());
    assert_eq!(result.notes.as_deref(), Some("It probably comes from Latin."));

    let again = h.state.etymology().get_full_etymology("zyxword", None).await.unwrap();
    assert!(!again.cached);
}

#[tokio::test]
async fn nothing_available_yields_unknown() {
    let h = harness().build();

    let result = h.state.etymology().get_full_etymology("zyxword", Some("de")).await.unwrap();

    assert_eq!(result.source, EtymologySource::None);
    assert_eq!(result.etymology, EtymologyData::unknown());
    assert_eq!(result.language, "de");
    assert!(!result.cached);
}

#[tokio::test]
async fn lexicon_is_only_consulted_for_english() {
    let h = harness().build();

    let result = h.state.etymology().get_full_etymology("hello", Some("de")).await.unwrap();

    assert_eq!(result.source, EtymologySource::None);
    assert_eq!(h.external.calls(), 1);
}

#[tokio::test]
async fn invalid_words_are_rejected() {
    let h = harness().build();
    let etymology = h.state.etymology();

    assert!(matches!(
        etymology.get_full_etymology("  ", None).await,
        Err(EtymologyError::Validation(_))
    ));
    assert!(matches!(
        etymology.get_full_etymology(&"a".repeat(101), None).await,
        Err(EtymologyError::Validation(_))
    ));
    assert_eq!(h.external.calls(), 0);
}
