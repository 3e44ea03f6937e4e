/*!
 * End-to-end tests of deck translation through `DeckTranslator`
 */

use std::sync::Arc;
use std::time::Duration;

use decktrans::package::DocumentPackage;
use decktrans::providers::dummy::DummyBackend;
use decktrans::translation::{AdaptiveSettings, BoundingBox, RetryPolicy, RunSummary, UnitLocation};
use decktrans::{DeckTranslator, PipelineOptions, TranslatableUnit, TranslationError};

use crate::common::mock_backends::{
    FailingBackend, GuidanceRecordingBackend, RandomLatencyBackend, SizeLimitedBackend,
};
use crate::common::{self, DeckBuilder};

fn options(target: &str) -> PipelineOptions {
    PipelineOptions {
        source_language: Some("en".to_string()),
        target_language: target.to_string(),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(10),
        },
        ..PipelineOptions::default()
    }
}

fn no_progress(_: usize, _: usize) {}

fn slide_text(bytes: &[u8], index: u32) -> String {
    String::from_utf8(common::read_entry(bytes, &format!("ppt/slides/slide{}.xml", index))).unwrap()
}

#[tokio::test]
async fn test_translate_withIdentityBackend_shouldReproduceInputBytes() {
    let input = common::large_deck(3, 2);
    let translator = DeckTranslator::new(Arc::new(DummyBackend::identity()), options("de"));

    let outcome = translator.translate_bytes(input.clone(), &no_progress).await.unwrap();

    assert_eq!(outcome.package, input);
    assert_eq!(outcome.summary.changed_nodes, 0);
    assert!(outcome.units.iter().all(|u| u.translated_text.as_deref() == Some(u.source_text.as_str())));
}

#[tokio::test]
async fn test_translate_withWelcomeDeck_shouldTranslateOnceAndKeepStructure() {
    common::init_logging();
    let input = common::welcome_deck();
    let backend = Arc::new(DummyBackend::tagging());
    let translator = DeckTranslator::new(backend.clone(), options("de"));

    let outcome = translator.translate_bytes(input.clone(), &no_progress).await.unwrap();

    assert_eq!(outcome.summary.units, 4);
    assert_eq!(outcome.summary.unique_tasks, 3);
    assert_eq!(backend.calls(), 1);
    assert_eq!(outcome.summary.changed_nodes, 4);

    let output = &outcome.package;
    assert!(slide_text(output, 1).contains("<a:t>[de] Welcome</a:t>"));
    assert!(slide_text(output, 2).contains("<a:t>[de] Grow revenue</a:t>"));
    assert!(slide_text(output, 2).contains("<a:t>[de] Hire engineers</a:t>"));
    assert!(slide_text(output, 3).contains("<a:t>[de] Welcome</a:t>"));

    for slide in 1..=3 {
        let part = format!("ppt/slides/slide{}.xml", slide);
        assert_eq!(
            common::structure_counts(output, &part),
            common::structure_counts(&input, &part),
            "{}",
            part
        );
        assert_eq!(common::strip_text(&slide_text(output, slide)), common::strip_text(&slide_text(&input, slide)));
    }
    assert_eq!(common::read_entry(output, "ppt/media/image1.png"), common::IMAGE_BYTES);
    assert_eq!(
        common::read_entry(output, "ppt/presentation.xml"),
        common::read_entry(&input, "ppt/presentation.xml")
    );
    assert_eq!(common::entry_names(output), common::entry_names(&input));

    let reopened = DocumentPackage::open(output.clone()).unwrap();
    assert_eq!(reopened.parts().len(), 3);
}

#[tokio::test]
async fn test_translate_withNotesExcluded_shouldLeaveNotesUntouched() {
    let input = common::large_deck(2, 1);
    let mut opts = options("de");
    opts.extract.include_notes = false;
    let translator = DeckTranslator::new(Arc::new(DummyBackend::tagging()), opts);

    let outcome = translator.translate_bytes(input.clone(), &no_progress).await.unwrap();

    assert_eq!(
        common::read_entry(&outcome.package, "ppt/notesSlides/notesSlide1.xml"),
        common::read_entry(&input, "ppt/notesSlides/notesSlide1.xml")
    );
    assert!(slide_text(&outcome.package, 1).contains("[de] Quarterly review part 1"));
}

#[tokio::test]
async fn test_translate_withRandomLatency_shouldPlaceEveryTranslationAtItsSource() {
    let input = common::large_deck(6, 4);
    let backend = Arc::new(RandomLatencyBackend::new(15));
    let mut opts = options("de");
    opts.max_concurrent = 4;
    opts.adaptive = AdaptiveSettings {
        max_batch_chars: 120,
        min_batch_chars: 20,
        ..AdaptiveSettings::default()
    };
    let translator = DeckTranslator::new(backend.clone(), opts);

    let outcome = translator.translate_bytes(input, &no_progress).await.unwrap();

    assert!(backend.tracker.calls() > 4);
    assert!(outcome.summary.peak_in_flight <= 4);
    for unit in &outcome.units {
        assert_eq!(unit.translated_text, Some(format!("[de] {}", unit.source_text)), "{}", unit.id);
    }
    let slide = slide_text(&outcome.package, 5);
    assert!(slide.contains("<a:t>[de] Slide 5 point 3: customers expect faster delivery</a:t>"));
    assert!(!slide.contains("<a:t>Slide 5 point 3"));
}

async fn translate_against_cap(cap: usize, adaptive: AdaptiveSettings) -> (Arc<SizeLimitedBackend>, RunSummary) {
    common::init_logging();
    let backend = Arc::new(SizeLimitedBackend::new(cap));
    let mut opts = options("de");
    opts.adaptive = adaptive;
    let translator = DeckTranslator::new(backend.clone(), opts);

    let outcome = translator.translate_bytes(common::large_deck(5, 3), &no_progress).await.unwrap();

    assert!(outcome.units.iter().all(|u| u.translated_text.as_deref().is_some_and(|t| t.starts_with("[de] "))));
    (backend, outcome.summary)
}

#[tokio::test]
async fn test_translate_withContextWindowLimit_shouldShrinkBatchesAndFinish() {
    let (backend, summary) = translate_against_cap(
        150,
        AdaptiveSettings {
            max_batch_chars: 4000,
            min_batch_chars: 20,
            grow_after_fast_batches: 1000,
            fast_batch_threshold: Duration::from_secs(2),
        },
    )
    .await;

    assert!(summary.limit_adjustments >= 1);
    assert!(summary.final_limit <= 150);
    assert!(backend.tracker.weights().iter().any(|w| *w > 150));
}

#[tokio::test]
async fn test_translate_withContextWindowLimitAndGrowth_shouldNotGrowPastAcceptedSize() {
    let (_, summary) = translate_against_cap(
        150,
        AdaptiveSettings {
            min_batch_chars: 20,
            ..AdaptiveSettings::default()
        },
    )
    .await;

    assert!(summary.final_limit <= 150);
}

#[tokio::test]
async fn test_translate_withContextWindowBelowFloor_shouldShrinkPastFloor() {
    let (backend, summary) = translate_against_cap(100, AdaptiveSettings::default()).await;

    assert!(summary.final_limit <= 100);
    let rejected = backend.tracker.weights().iter().filter(|w| **w > 100).count();
    assert!(rejected <= 6, "{} rejected calls", rejected);
}

#[tokio::test]
async fn test_translate_withPersistentTimeouts_shouldFailAfterMaxAttempts() {
    let backend = Arc::new(FailingBackend::transient());
    let translator = DeckTranslator::new(backend.clone(), options("de"));

    let result = translator.translate_bytes(common::welcome_deck(), &no_progress).await;

    assert!(matches!(result, Err(TranslationError::RetriesExhausted { attempts: 3, .. })));
    assert_eq!(backend.tracker.calls(), 3);
}

#[tokio::test]
async fn test_translate_withAuthenticationFailure_shouldAbortAfterOneCall() {
    let backend = Arc::new(FailingBackend::unauthorized());
    let mut opts = options("de");
    opts.max_concurrent = 4;
    let translator = DeckTranslator::new(backend.clone(), opts);

    let result = translator.translate_bytes(common::large_deck(3, 3), &no_progress).await;

    assert!(matches!(result, Err(TranslationError::BackendFatal(_))));
    assert_eq!(backend.tracker.calls(), 1);
}

#[test]
fn test_translate_withCorruptArchive_shouldFailAsPackageError() {
    let translator = DeckTranslator::new(Arc::new(DummyBackend::tagging()), options("de"));
    let result = tokio_test::block_on(translator.translate_bytes(b"PK\x03\x04 truncated".to_vec(), &no_progress));
    assert!(matches!(result, Err(TranslationError::Package(_))));
}

#[tokio::test]
async fn test_translate_withUserContextAndGlossary_shouldShareThemWithEveryBatch() {
    let backend = Arc::new(GuidanceRecordingBackend::default());
    let mut opts = options("de");
    opts.user_context = Some("Internal all-hands meeting".to_string());
    opts.glossary.insert("Welcome".to_string(), "Willkommen".to_string());
    opts.adaptive.max_batch_chars = 20;
    opts.adaptive.min_batch_chars = 5;
    let translator = DeckTranslator::new(backend.clone(), opts);

    translator.translate_bytes(common::welcome_deck(), &no_progress).await.unwrap();

    let contexts = backend.contexts();
    assert!(contexts.len() > 1);
    assert!(contexts.iter().all(|c| c == &contexts[0]));
    assert!(contexts[0].starts_with("Internal all-hands meeting"));
    assert!(contexts[0].contains("Deck title: Welcome"));
    assert!(backend
        .glossaries()
        .iter()
        .all(|g| g == &vec![("Welcome".to_string(), "Willkommen".to_string())]));
}

#[tokio::test]
async fn test_translatePackage_withImageRegions_shouldTranslateThemAlongsideText() {
    let package = DocumentPackage::open(common::welcome_deck()).unwrap();
    let translator = DeckTranslator::new(Arc::new(DummyBackend::tagging()), options("de"));
    let region = TranslatableUnit::image_region(
        "",
        2,
        1,
        BoundingBox {
            x: 0,
            y: 0,
            width: 914400,
            height: 457200,
        },
        "Revenue chart",
    );

    let outcome = translator
        .translate_package(package, vec![region], &no_progress)
        .await
        .unwrap();

    let image = outcome.units.iter().find(|u| u.id == "x1").unwrap();
    assert!(matches!(image.location, UnitLocation::ImageRegion { slide_index: 2, .. }));
    assert_eq!(image.translated_text.as_deref(), Some("[de] Revenue chart"));
    assert_eq!(outcome.summary.units, 5);
}

#[tokio::test]
async fn test_translate_withMultilineParagraphSplit_shouldTranslateEachRun() {
    let slide = common::slide_xml(&[common::shape(None, &[&["First part, ", "second part"]])]);
    let input = DeckBuilder::new().slide(1, &slide).build();
    let translator = DeckTranslator::new(Arc::new(DummyBackend::tagging()), options("it"));

    let outcome = translator.translate_bytes(input.clone(), &no_progress).await.unwrap();

    let xml = slide_text(&outcome.package, 1);
    assert!(xml.contains("<a:t>[it] First part, </a:t>"));
    assert!(xml.contains("<a:t>[it] second part</a:t>"));
    assert_eq!(
        common::structure_counts(&outcome.package, "ppt/slides/slide1.xml"),
        common::structure_counts(&input, "ppt/slides/slide1.xml")
    );
}
