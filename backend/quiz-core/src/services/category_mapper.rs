//! Free-text weakness labels → fixed category set.
//!
//! Matching is a case-insensitive substring scan: categories in declared
//! order, keywords in declared order, first hit wins for a label. Labels
//! that hit nothing land in the catch-all category.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

pub const CATCH_ALL_CATEGORY: &str = "other weakness";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    pub keywords: Vec<String>,
}

/// On-disk shape of a category table.
#[derive(Debug, Deserialize)]
struct CategoryTableFile {
    categories: Vec<CategoryEntry>,
    #[serde(default)]
    catch_all: Option<String>,
}

/// Immutable category → keyword table. Keywords are lower-cased once at
/// construction.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    entries: Vec<CategoryEntry>,
    catch_all: String,
}

impl CategoryTable {
    pub fn from_entries(entries: Vec<CategoryEntry>, catch_all: impl Into<String>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| CategoryEntry {
                name: entry.name,
                keywords: entry
                    .keywords
                    .into_iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();

        Self {
            entries,
            catch_all: catch_all.into(),
        }
    }

    /// Loads a JSON table: `{"categories": [{"name": .., "keywords": [..]}], "catch_all": ..}`.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read category table {}", path.display()))?;
        let file: CategoryTableFile = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid category table {}", path.display()))?;

        if file.categories.is_empty() {
            anyhow::bail!("Category table {} has no categories", path.display());
        }

        Ok(Self::from_entries(
            file.categories,
            file.catch_all
                .unwrap_or_else(|| CATCH_ALL_CATEGORY.to_string()),
        ))
    }

    pub fn entries(&self) -> &[CategoryEntry] {
        &self.entries
    }

    pub fn catch_all(&self) -> &str {
        &self.catch_all
    }

    fn category_for(&self, label: &str) -> Option<&str> {
        let label = label.to_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.keywords.iter().any(|k| label.contains(k.as_str())))
            .map(|entry| entry.name.as_str())
    }

    pub fn map_to_categories<S: AsRef<str>>(&self, labels: &[S]) -> BTreeSet<String> {
        let mut categories = BTreeSet::new();
        for label in labels {
            let label = label.as_ref();
            match self.category_for(label) {
                Some(name) => {
                    categories.insert(name.to_string());
                }
                None if !label.is_empty() => {
                    categories.insert(self.catch_all.clone());
                }
                None => {}
            }
        }
        categories
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        let entry = |name: &str, keywords: &[&str]| CategoryEntry {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        };

        Self::from_entries(
            vec![
                entry(
                    "verb tense",
                    &["時態", "tense", "過去式", "完成式", "現在式", "未來式", "verb form", "動詞變化"],
                ),
                entry(
                    "nouns and articles",
                    &["名詞", "noun", "冠詞", "article", "a/an/the", "可數", "不可數"],
                ),
                entry("pronouns", &["代名詞", "pronoun", "he/she/it", "they/them"]),
                entry(
                    "adjectives and adverbs",
                    &["形容詞", "adjective", "副詞", "adverb", "比較級", "最高級"],
                ),
                entry(
                    "prepositions and phrases",
                    &["介係詞", "介詞", "preposition", "片語", "phrase", "in/on/at"],
                ),
                entry(
                    "conjunctions and clauses",
                    &["連接詞", "conjunction", "子句", "clause", "because", "although", "but"],
                ),
                entry(
                    "sentence structure",
                    &["句型", "句子結構", "sentence structure", "語序", "倒裝"],
                ),
                entry(
                    "vocabulary and confusable words",
                    &["單字", "詞彙", "vocabulary", "meaning", "混淆字", "synonym", "antonym", "用字"],
                ),
                entry("subjunctive mood", &["假設", "subjunctive", "if clause", "條件句"]),
                entry("passive voice", &["被動", "passive voice"]),
                entry(
                    "reported speech",
                    &["間接引語", "reported speech", "indirect speech"],
                ),
                entry(
                    "reading comprehension",
                    &["閱讀", "reading comprehension", "主旨", "細節"],
                ),
            ],
            CATCH_ALL_CATEGORY,
        )
    }
}
