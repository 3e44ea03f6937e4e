/*!
 * Tests for unit extraction, context building and deduplication
 */

use std::collections::HashMap;

use decktrans::package::DocumentPackage;
use decktrans::translation::context::annotate_units;
use decktrans::translation::{extract, reinsert, DedupIndex, DedupScope, DeckProfile, ExtractOptions, TextRole};
use decktrans::TranslationError;

use crate::common::{self, DeckBuilder};

fn welcome_units() -> Vec<decktrans::TranslatableUnit> {
    let package = DocumentPackage::open(common::welcome_deck()).unwrap();
    extract(&package, &ExtractOptions::default()).unwrap()
}

#[test]
fn test_extract_withWelcomeDeck_shouldYieldUnitsInDocumentOrder() {
    let units = welcome_units();
    let summary: Vec<(&str, TextRole, &str)> = units
        .iter()
        .map(|u| (u.id.as_str(), u.role, u.source_text.as_str()))
        .collect();

    assert_eq!(
        summary,
        vec![
            ("slide1:s0:p0:r0", TextRole::Title, "Welcome"),
            ("slide2:s0:p0:r0", TextRole::Body, "Grow revenue"),
            ("slide2:s0:p1:r0", TextRole::Body, "Hire engineers"),
            ("slide3:s0:p0:r0", TextRole::Footer, "Welcome"),
        ]
    );
    assert!(units.iter().all(|u| u.translated_text.is_none()));
}

#[test]
fn test_extract_withSameDeckTwice_shouldProduceIdenticalIds() {
    let bytes = common::large_deck(4, 3);
    let first = extract(&DocumentPackage::open(bytes.clone()).unwrap(), &ExtractOptions::default()).unwrap();
    let second = extract(&DocumentPackage::open(bytes).unwrap(), &ExtractOptions::default()).unwrap();

    let ids = |units: &[decktrans::TranslatableUnit]| units.iter().map(|u| u.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(first.len(), 4 * (1 + 3) + 4);
}

#[test]
fn test_extract_withNotesDisabled_shouldSkipNotesParts() {
    let bytes = common::large_deck(2, 1);
    let package = DocumentPackage::open(bytes).unwrap();
    let options = ExtractOptions {
        include_notes: false,
        include_masters: true,
    };
    let units = extract(&package, &options).unwrap();

    assert_eq!(units.len(), 4);
    assert!(units.iter().all(|u| u.role != TextRole::Notes));
}

#[test]
fn test_extract_withLayoutsDisabled_shouldSkipLayoutText() {
    let layout = common::slide_xml(&[common::shape(Some("title"), &[&["Click to edit title"]])]);
    let bytes = DeckBuilder::new()
        .slide(1, &common::slide_xml(&[common::shape(Some("title"), &[&["Hello"]])]))
        .layout(1, &layout)
        .build();
    let package = DocumentPackage::open(bytes).unwrap();

    let all = extract(&package, &ExtractOptions::default()).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].id, "layout1:s0:p0:r0");

    let options = ExtractOptions {
        include_notes: true,
        include_masters: false,
    };
    assert_eq!(extract(&package, &options).unwrap().len(), 1);
}

#[test]
fn test_dedup_withWelcomeDeck_shouldShareOneTaskForRepeatedText() {
    let units = welcome_units();
    let index = DedupIndex::register(&units, DedupScope::Text);

    assert_eq!(index.key_count(), 3);
    let texts: Vec<&str> = index.tasks().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["Welcome", "Grow revenue", "Hire engineers"]);
}

#[test]
fn test_dedup_withRoleScope_shouldSeparateTitleAndFooter() {
    let units = welcome_units();
    let index = DedupIndex::register(&units, DedupScope::Role);
    assert_eq!(index.key_count(), 4);

    let off = DedupIndex::register(&units, DedupScope::Off);
    assert_eq!(off.tasks().len(), 4);
}

#[test]
fn test_dedupApply_withSharedKey_shouldGiveIdenticalTranslations() {
    let mut units = welcome_units();
    let index = DedupIndex::register(&units, DedupScope::Text);
    let translated: HashMap<String, String> = index
        .tasks()
        .iter()
        .map(|t| (t.id.clone(), format!("[de] {}", t.text)))
        .collect();

    index.apply(&mut units, &translated).unwrap();

    assert_eq!(units[0].translated_text.as_deref(), Some("[de] Welcome"));
    assert_eq!(units[3].translated_text, units[0].translated_text);
}

#[test]
fn test_dedupApply_withMissingResult_shouldFailIncomplete() {
    let mut units = welcome_units();
    let index = DedupIndex::register(&units, DedupScope::Text);
    let translated: HashMap<String, String> = HashMap::new();

    let error = index.apply(&mut units, &translated).unwrap_err();
    assert!(matches!(error, decktrans::TranslationError::Incomplete { missing } if missing.len() == 3));
}

#[test]
fn test_annotateUnits_withWelcomeDeck_shouldDescribeRoleAndPosition() {
    let mut units = welcome_units();
    annotate_units(&mut units);

    assert!(units.iter().all(|u| u.context.is_some()));
    let bullet = units[1].context.as_deref().unwrap();
    assert_eq!(bullet, "Slide 2, bullet");

    let profile = DeckProfile::build(&units);
    assert!(!profile.to_context_string().is_empty());
}

fn translated_welcome_units() -> Vec<decktrans::TranslatableUnit> {
    let mut units = welcome_units();
    for unit in &mut units {
        unit.translated_text = Some(format!("[de] {}", unit.source_text));
    }
    units
}

fn inconsistent_unit(package_bytes: Vec<u8>) -> Option<String> {
    let mut package = DocumentPackage::open(package_bytes).unwrap();
    match reinsert(&mut package, &translated_welcome_units()) {
        Err(TranslationError::ExtractionConsistency { unit_id, .. }) => Some(unit_id),
        _ => None,
    }
}

fn welcome_slides(second: String, third: Option<String>) -> Vec<u8> {
    let mut builder = DeckBuilder::new()
        .slide(1, &common::slide_xml(&[common::shape(Some("title"), &[&["Welcome"]])]))
        .slide(2, &second);
    if let Some(third) = third {
        builder = builder.slide(3, &third);
    }
    builder.build()
}

fn footer_slide() -> Option<String> {
    Some(common::slide_xml(&[common::shape(Some("ftr"), &[&["Welcome"]])]))
}

#[test]
fn test_reinsert_withEditedSourceText_shouldFailConsistencyCheck() {
    let second = common::slide_xml(&[common::shape(None, &[&["Grow margins"], &["Hire engineers"]])]);
    assert_eq!(
        inconsistent_unit(welcome_slides(second, footer_slide())).as_deref(),
        Some("slide2:s0:p0:r0")
    );
}

#[test]
fn test_reinsert_withMissingParagraph_shouldFailConsistencyCheck() {
    let second = common::slide_xml(&[common::shape(None, &[&["Grow revenue"]])]);
    assert_eq!(
        inconsistent_unit(welcome_slides(second, footer_slide())).as_deref(),
        Some("slide2:s0:p1:r0")
    );
}

#[test]
fn test_reinsert_withMissingSlide_shouldFailConsistencyCheck() {
    let second = common::slide_xml(&[common::shape(None, &[&["Grow revenue"], &["Hire engineers"]])]);
    assert_eq!(inconsistent_unit(welcome_slides(second, None)).as_deref(), Some("slide3:s0:p0:r0"));
}

#[test]
fn test_reinsert_withMatchingPackage_shouldSucceed() {
    let mut package = DocumentPackage::open(common::welcome_deck()).unwrap();
    assert_eq!(reinsert(&mut package, &translated_welcome_units()).unwrap(), 4);
}
