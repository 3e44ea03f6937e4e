/*!
 * Deduplication of repeated source text.
 *
 * Units whose source text (and optionally role) match are collapsed into a
 * single translation task. After translation every unit sharing a key gets
 * the identical translated text.
 */

use std::collections::HashMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::TranslationError;
use crate::translation::units::TranslatableUnit;

/// How aggressively identical strings are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupScope {
    /// Every unit is its own task
    Off,
    /// Identical text anywhere in the deck shares one translation
    #[default]
    Text,
    /// Identical text shares a translation only within the same role
    Role,
}

/// Identity of a translation task
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeduplicationKey {
    pub source_text: String,
    pub context_bucket: String,
}

impl DeduplicationKey {
    fn for_unit(unit: &TranslatableUnit, scope: DedupScope) -> Self {
        let context_bucket = match scope {
            DedupScope::Off => unit.id.clone(),
            DedupScope::Text => String::new(),
            DedupScope::Role => unit.role.label().to_string(),
        };
        Self {
            source_text: unit.source_text.clone(),
            context_bucket,
        }
    }
}

/// A unique piece of text to translate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationTask {
    /// Id of the first unit carrying this text
    pub id: String,
    pub text: String,
    pub context: Option<String>,
}

impl TranslationTask {
    /// Size of the task as counted by the batch limit
    pub fn weight(&self) -> usize {
        self.text.chars().count()
    }
}

/// Maps units to their deduplicated tasks
#[derive(Debug, Clone)]
pub struct DedupIndex {
    scope: DedupScope,
    tasks: Vec<TranslationTask>,
    by_key: HashMap<DeduplicationKey, usize>,
    /// Task position for every unit, `None` for blank units
    assignments: HashMap<String, Option<usize>>,
}

impl DedupIndex {
    /// Register units in document order, producing tasks in first-seen order
    pub fn register(units: &[TranslatableUnit], scope: DedupScope) -> Self {
        let mut tasks: Vec<TranslationTask> = Vec::new();
        let mut by_key = HashMap::new();
        let mut assignments = HashMap::with_capacity(units.len());

        for unit in units {
            if unit.is_blank() {
                assignments.insert(unit.id.clone(), None);
                continue;
            }
            let key = DeduplicationKey::for_unit(unit, scope);
            let position = *by_key.entry(key).or_insert_with(|| {
                tasks.push(TranslationTask {
                    id: unit.id.clone(),
                    text: unit.source_text.clone(),
                    context: unit.context.clone(),
                });
                tasks.len() - 1
            });
            assignments.insert(unit.id.clone(), Some(position));
        }

        let submitted = units.iter().filter(|u| !u.is_blank()).count();
        if submitted > 0 {
            info!(
                "Deduplicated {} units into {} tasks ({:.0}% saved)",
                submitted,
                tasks.len(),
                (1.0 - tasks.len() as f64 / submitted as f64) * 100.0
            );
        }

        Self {
            scope,
            tasks,
            by_key,
            assignments,
        }
    }

    pub fn scope(&self) -> DedupScope {
        self.scope
    }

    /// Unique tasks in first-seen order
    pub fn tasks(&self) -> &[TranslationTask] {
        &self.tasks
    }

    /// Number of distinct keys
    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }

    /// Representative text per key
    pub fn representatives(&self) -> impl Iterator<Item = (&DeduplicationKey, &str)> {
        self.by_key
            .iter()
            .map(|(key, &i)| (key, self.tasks[i].text.as_str()))
    }

    /// Translated value for a unit given translations keyed by task id
    pub fn resolve(
        &self,
        unit: &TranslatableUnit,
        translated: &HashMap<String, String>,
    ) -> Result<String, TranslationError> {
        match self.assignments.get(&unit.id) {
            Some(None) => Ok(unit.source_text.clone()),
            Some(Some(position)) => {
                let task = &self.tasks[*position];
                translated
                    .get(&task.id)
                    .cloned()
                    .ok_or_else(|| TranslationError::Incomplete {
                        missing: vec![task.id.clone()],
                    })
            }
            None => Err(TranslationError::ExtractionConsistency {
                unit_id: unit.id.clone(),
                reason: "unit was not registered for translation".to_string(),
            }),
        }
    }

    /// Fill `translated_text` on every unit, failing if any task lacks a result
    pub fn apply(
        &self,
        units: &mut [TranslatableUnit],
        translated: &HashMap<String, String>,
    ) -> Result<(), TranslationError> {
        let missing: Vec<String> = self
            .tasks
            .iter()
            .filter(|t| !translated.contains_key(&t.id))
            .map(|t| t.id.clone())
            .collect();
        if !missing.is_empty() {
            return Err(TranslationError::Incomplete { missing });
        }
        for unit in units.iter_mut() {
            unit.translated_text = Some(self.resolve(unit, translated)?);
        }
        Ok(())
    }
}
