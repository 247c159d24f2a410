//! Ingredient reconciliation between a recipe and the stock list
//!
//! Determines which required ingredients are not covered by stock using
//! data-driven tables:
//! - staples that are always available
//! - a unit vocabulary used to strip trailing quantities ("豚肉200g" -> "豚肉")
//! - synonym groups of equivalent spellings
//!
//! Matching order is exact equality, then synonym group, then substring
//! containment in either direction.

use crate::errors::{AppError, Result};
use crate::extract::StructuredExtractor;
use crate::generative::TextGenerator;
use crate::prompt::PromptKind;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Matching tables for ingredient reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingTables {
    /// Ingredients assumed to be in stock regardless of the stock list
    #[serde(default = "default_staples")]
    pub staples: Vec<String>,

    /// Units that may follow a numeric amount ("200g", "2個")
    #[serde(default = "default_units")]
    pub units: Vec<String>,

    /// Units written before the amount ("大さじ2")
    #[serde(default = "default_prefix_units")]
    pub prefix_units: Vec<String>,

    /// Trailing amount words that carry no number ("少々", "適量")
    #[serde(default = "default_amount_words")]
    pub amount_words: Vec<String>,

    /// Groups of spellings treated as the same ingredient
    #[serde(default = "default_synonym_groups")]
    pub synonym_groups: Vec<Vec<String>>,
}

impl Default for MatchingTables {
    fn default() -> Self {
        Self {
            staples: default_staples(),
            units: default_units(),
            prefix_units: default_prefix_units(),
            amount_words: default_amount_words(),
            synonym_groups: default_synonym_groups(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_staples() -> Vec<String> {
    strings(&[
        "塩", "砂糖", "醤油", "しょうゆ", "しょう油", "味噌", "みそ", "酢", "油", "サラダ油",
        "食用油", "こしょう", "胡椒", "コショウ", "塩こしょう", "塩コショウ", "にんにく", "ニンニク",
        "しょうが", "生姜", "ショウガ", "水", "お湯", "湯", "salt", "sugar", "soy sauce", "miso",
        "vinegar", "oil", "cooking oil", "pepper", "garlic", "ginger", "water", "hot water",
    ])
}

fn default_units() -> Vec<String> {
    strings(&[
        "g", "kg", "mg", "ml", "l", "cc", "グラム", "キロ", "ミリリットル", "リットル", "個", "本", "枚",
        "切れ", "片", "かけ", "玉", "束", "把", "パック", "袋", "缶", "丁", "尾", "匹", "株", "房", "合",
        "杯", "人分", "大さじ", "小さじ", "カップ", "cup", "cups", "tbsp", "tsp", "piece", "pieces",
        "slice", "slices", "pack", "packs", "bunch", "bunches",
    ])
}

fn default_prefix_units() -> Vec<String> {
    strings(&["大さじ", "小さじ", "カップ", "cup", "tbsp", "tsp"])
}

fn default_amount_words() -> Vec<String> {
    strings(&["少々", "適量", "少量", "適宜", "お好みで", "ひとつまみ", "to taste"])
}

fn default_synonym_groups() -> Vec<Vec<String>> {
    vec![
        strings(&[
            "豚肉", "豚バラ肉", "豚バラ", "豚こま切れ肉", "豚こま", "豚ロース", "豚薄切り肉", "pork",
            "pork belly", "sliced pork",
        ]),
        strings(&["鶏肉", "鶏もも肉", "鶏むね肉", "とり肉", "鳥肉", "チキン", "chicken"]),
        strings(&["牛肉", "牛こま切れ肉", "牛薄切り肉", "牛バラ肉", "beef"]),
        strings(&["ひき肉", "挽き肉", "挽肉", "合いびき肉", "合挽き肉", "ミンチ", "minced meat"]),
        strings(&["にんじん", "人参", "ニンジン", "carrot"]),
        strings(&["じゃがいも", "ジャガイモ", "じゃが芋", "馬鈴薯", "potato"]),
        strings(&["玉ねぎ", "たまねぎ", "玉葱", "タマネギ", "onion"]),
        strings(&["長ねぎ", "長ネギ", "ねぎ", "ネギ", "葱", "白ねぎ", "green onion"]),
        strings(&["卵", "たまご", "玉子", "タマゴ", "鶏卵", "egg", "eggs"]),
        strings(&["キャベツ", "きゃべつ", "cabbage"]),
        strings(&["トマト", "とまと", "tomato"]),
        strings(&["豆腐", "とうふ", "木綿豆腐", "絹ごし豆腐", "tofu"]),
        strings(&["ご飯", "ごはん", "白米", "白ご飯", "rice"]),
    ]
}

/// Heuristic ingredient matcher built from `MatchingTables`
#[derive(Debug, Clone)]
pub struct IngredientReconciler {
    staples: Vec<String>,
    amount_words: Vec<String>,
    quantity: Regex,
    parenthetical: Regex,
    /// normalized spelling -> synonym group index
    groups: HashMap<String, usize>,
}

impl IngredientReconciler {
    /// Compile the matching tables
    pub fn new(tables: &MatchingTables) -> Result<Self> {
        let units = alternation(&tables.units);
        let prefix_units = alternation(&tables.prefix_units);

        let prefix = if prefix_units.is_empty() {
            String::new()
        } else {
            format!(r"(?:(?:{prefix_units})[\s　]*)?")
        };
        let suffix = if units.is_empty() {
            String::new()
        } else {
            format!(r"(?:{units})?")
        };
        let pattern = format!(
            r"[\s　]*{prefix}[0-9０-９][0-9０-９.,/／~～\-]*[\s　]*{suffix}[\s　]*$"
        );
        let quantity = Regex::new(&pattern).map_err(|e| AppError::Configuration {
            message: format!("invalid unit vocabulary: {}", e),
        })?;
        let parenthetical = Regex::new(r"[\s　]*[(（][^()（）]*[)）][\s　]*$").map_err(|e| {
            AppError::Configuration {
                message: format!("invalid parenthetical pattern: {}", e),
            }
        })?;

        let mut groups = HashMap::new();
        for (idx, group) in tables.synonym_groups.iter().enumerate() {
            for spelling in group {
                groups.insert(normalize(spelling), idx);
            }
        }

        Ok(Self {
            staples: tables.staples.iter().map(|s| normalize(s)).collect(),
            amount_words: tables.amount_words.iter().map(|s| normalize(s)).collect(),
            quantity,
            parenthetical,
            groups,
        })
    }

    /// Strip trailing quantity, unit and amount noise from an entry
    pub fn bare_name(&self, entry: &str) -> String {
        let original = normalize(entry);
        let mut name = original.clone();

        loop {
            let before = name.clone();
            name = self.parenthetical.replace(&name, "").into_owned();
            name = self.quantity.replace(&name, "").into_owned();
            for word in &self.amount_words {
                if let Some(stripped) = name.strip_suffix(word.as_str()) {
                    name = stripped.trim_end().to_string();
                }
            }
            name = name.trim().to_string();
            if name == before || name.is_empty() {
                break;
            }
        }

        if name.is_empty() {
            original
        } else {
            name
        }
    }

    /// Whether a bare name is on the staple allow-list
    pub fn is_staple(&self, bare: &str) -> bool {
        self.staples.iter().any(|s| s == bare)
    }

    /// Whether two bare names refer to the same ingredient
    pub fn matches(&self, a: &str, b: &str) -> bool {
        if a.is_empty() || b.is_empty() {
            return false;
        }
        if a == b {
            return true;
        }
        if let (Some(ga), Some(gb)) = (self.groups.get(a), self.groups.get(b)) {
            if ga == gb {
                return true;
            }
        }
        a.contains(b) || b.contains(a)
    }

    /// Entries of `required` not satisfiable from `stock`, in original order
    pub fn needed(&self, required: &[String], stock: &[String]) -> Vec<String> {
        let stock: Vec<String> = stock
            .iter()
            .map(|s| self.bare_name(s))
            .filter(|s| !s.is_empty())
            .collect();

        required
            .iter()
            .filter(|entry| {
                let bare = self.bare_name(entry);
                if bare.is_empty() || self.is_staple(&bare) {
                    return false;
                }
                !stock.iter().any(|s| self.matches(&bare, s))
            })
            .cloned()
            .collect()
    }

    /// Heuristic matching narrowed by the generative model
    ///
    /// The model may only remove entries from the heuristic result. Any
    /// failure of the generative call returns `required` unchanged.
    pub async fn needed_with_assist(
        &self,
        generator: &dyn TextGenerator,
        extractor: &StructuredExtractor,
        required: &[String],
        stock: &[String],
        timeout: Duration,
    ) -> Vec<String> {
        let heuristic = self.needed(required, stock);
        if heuristic.is_empty() {
            return heuristic;
        }

        let prompt = PromptKind::IngredientReconciliation {
            required: heuristic.clone(),
            stock: stock.to_vec(),
        };

        let answer = match generator.generate(&prompt.build(), timeout).await {
            Ok(text) => extractor.extract_as::<Vec<String>>(&text, prompt.output_shape()),
            Err(e) => Err(e),
        };

        match answer {
            Ok(model_needed) => {
                let model_needed: Vec<String> =
                    model_needed.iter().map(|s| self.bare_name(s)).collect();
                let narrowed: Vec<String> = heuristic
                    .into_iter()
                    .filter(|entry| {
                        let bare = self.bare_name(entry);
                        model_needed.iter().any(|m| *m == bare)
                    })
                    .collect();
                debug!(needed = narrowed.len(), "Generative reconciliation applied");
                narrowed
            }
            Err(e) => {
                warn!(error = %e, "Generative reconciliation failed, returning required list");
                metrics::counter!("recipe_suggest_reconcile_fail_open_total").increment(1);
                required.to_vec()
            }
        }
    }
}

/// Regex alternation of the given words, longest first so "kg" wins over "g"
fn alternation(words: &[String]) -> String {
    let mut words: Vec<String> = words
        .iter()
        .map(|w| normalize(w))
        .filter(|w| !w.is_empty())
        .collect();
    words.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    words
        .iter()
        .map(|w| regex_lite::escape(w))
        .collect::<Vec<_>>()
        .join("|")
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generative::MockGenerator;

    fn reconciler() -> IngredientReconciler {
        IngredientReconciler::new(&MatchingTables::default()).unwrap()
    }

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_synonym_and_staple_cover_everything() {
        let needed = reconciler().needed(&list(&["豚肉200g", "塩"]), &list(&["豚バラ肉"]));
        assert!(needed.is_empty());
    }

    #[test]
    fn test_egg_needed_soy_sauce_staple() {
        let needed = reconciler().needed(&list(&["卵", "醤油"]), &[]);
        assert_eq!(needed, list(&["卵"]));
    }

    #[test]
    fn test_result_is_ordered_subsequence() {
        let required = list(&["牛乳 200ml", "卵 2個", "小麦粉 100g", "砂糖 大さじ2", "バター10g"]);
        let needed = reconciler().needed(&required, &list(&["たまご"]));
        assert_eq!(needed, list(&["牛乳 200ml", "小麦粉 100g", "バター10g"]));
    }

    #[test]
    fn test_duplicates_are_kept() {
        let needed = reconciler().needed(&list(&["卵", "卵"]), &[]);
        assert_eq!(needed, list(&["卵", "卵"]));
    }

    #[test]
    fn test_bare_name_strips_quantities() {
        let r = reconciler();
        assert_eq!(r.bare_name("豚肉200g"), "豚肉");
        assert_eq!(r.bare_name("にんじん 1/2本"), "にんじん");
        assert_eq!(r.bare_name("醤油 大さじ2"), "醤油");
        assert_eq!(r.bare_name("塩 少々"), "塩");
        assert_eq!(r.bare_name("鶏もも肉（300g）"), "鶏もも肉");
        assert_eq!(r.bare_name("ひき肉1.5kg"), "ひき肉");
        assert_eq!(r.bare_name("Carrot 2 pieces"), "carrot");
    }

    #[test]
    fn test_bare_name_keeps_quantity_only_entries() {
        assert_eq!(reconciler().bare_name("200g"), "200g");
    }

    #[test]
    fn test_spelling_variants_match() {
        let r = reconciler();
        let needed = r.needed(
            &list(&["人参 1本", "ジャガイモ 3個", "玉ねぎ 1個"]),
            &list(&["ニンジン", "じゃがいも", "たまねぎ"]),
        );
        assert!(needed.is_empty());
    }

    #[test]
    fn test_substring_containment_either_direction() {
        let r = reconciler();
        assert!(r.needed(&list(&["しめじ"]), &list(&["しめじ 1パック"])).is_empty());
        assert!(r.needed(&list(&["ぶなしめじ"]), &list(&["しめじ"])).is_empty());
        assert!(r.needed(&list(&["しめじ"]), &list(&["ぶなしめじ"])).is_empty());
    }

    #[test]
    fn test_custom_tables() {
        let tables = MatchingTables {
            staples: list(&["バター"]),
            units: list(&["片"]),
            prefix_units: vec![],
            amount_words: vec![],
            synonym_groups: vec![list(&["鮭", "サーモン"])],
        };
        let r = IngredientReconciler::new(&tables).unwrap();
        let needed = r.needed(
            &list(&["バター 1片", "鮭", "鮭 2切れ", "塩"]),
            &list(&["サーモン"]),
        );
        // "切れ" is not in the custom vocabulary and "塩" is not a custom staple
        assert_eq!(needed, list(&["鮭 2切れ", "塩"]));
    }

    #[tokio::test]
    async fn test_assist_narrows_heuristic_result() {
        let generator = MockGenerator::new().with_response("手元の食材", "```json\n[\"卵\"]\n```");
        let needed = reconciler()
            .needed_with_assist(
                &generator,
                &StructuredExtractor::default(),
                &list(&["卵", "牛乳", "塩"]),
                &list(&["ミルク"]),
                Duration::from_secs(30),
            )
            .await;
        assert_eq!(needed, list(&["卵"]));
    }

    #[tokio::test]
    async fn test_assist_fails_open() {
        let generator = MockGenerator::new();
        let required = list(&["卵", "塩"]);
        let needed = reconciler()
            .needed_with_assist(
                &generator,
                &StructuredExtractor::default(),
                &required,
                &[],
                Duration::from_secs(30),
            )
            .await;
        assert_eq!(needed, required);
    }

    #[tokio::test]
    async fn test_assist_skips_call_when_nothing_missing() {
        let generator = MockGenerator::new();
        let needed = reconciler()
            .needed_with_assist(
                &generator,
                &StructuredExtractor::default(),
                &list(&["塩"]),
                &[],
                Duration::from_secs(30),
            )
            .await;
        assert!(needed.is_empty());
        assert_eq!(generator.call_count(), 0);
    }
}
