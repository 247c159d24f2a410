//! Prompt construction for every generative task
//!
//! Each prompt embeds its parameters verbatim and ends with an explicit
//! output-format contract whenever structured output is expected.

use serde::{Deserialize, Serialize};

/// Number of recipes requested per suggestion
pub const RECIPES_PER_REQUEST: usize = 3;

/// A generative task and its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptKind {
    /// Recipes using only the ingredients in stock
    RecipeFromStock {
        ingredients: Vec<String>,
        meal_type: Option<String>,
        extra_condition: Option<String>,
    },
    /// Recipes not limited to the stock list
    RecipeUnconstrained {
        ingredients: Vec<String>,
        meal_type: Option<String>,
        extra_condition: Option<String>,
    },
    /// Reading, synonyms and an image description for a new ingredient
    IngredientEnrichment { name: String, category: String },
    /// Blog article about a generated recipe
    BlogArticle { recipe_title: String },
    /// Which required ingredients are missing from stock
    IngredientReconciliation {
        required: Vec<String>,
        stock: Vec<String>,
    },
}

/// Expected shape of a structured answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    Array,
    Object,
}

impl PromptKind {
    /// Shape the model is told to answer with
    pub fn output_shape(&self) -> OutputShape {
        match self {
            PromptKind::IngredientEnrichment { .. } | PromptKind::BlogArticle { .. } => {
                OutputShape::Object
            }
            _ => OutputShape::Array,
        }
    }

    /// Short name used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            PromptKind::RecipeFromStock { .. } => "recipe_from_stock",
            PromptKind::RecipeUnconstrained { .. } => "recipe_unconstrained",
            PromptKind::IngredientEnrichment { .. } => "ingredient_enrichment",
            PromptKind::BlogArticle { .. } => "blog_article",
            PromptKind::IngredientReconciliation { .. } => "ingredient_reconciliation",
        }
    }

    /// Render the instruction string
    pub fn build(&self) -> String {
        match self {
            PromptKind::RecipeFromStock {
                ingredients,
                meal_type,
                extra_condition,
            } => {
                let mut prompt = format!(
                    "以下の食材だけを使って作れる家庭料理のレシピを{}件、日本語で提案してください。\n\
                     塩、砂糖、醤油などの基本的な調味料は使ってかまいません。\n\
                     食材: {}\n",
                    RECIPES_PER_REQUEST,
                    ingredients.join(", ")
                );
                push_conditions(&mut prompt, meal_type.as_deref(), extra_condition.as_deref());
                prompt.push_str(RECIPE_CONTRACT);
                prompt
            }
            PromptKind::RecipeUnconstrained {
                ingredients,
                meal_type,
                extra_condition,
            } => {
                let mut prompt = format!(
                    "家庭で作れる料理のレシピを{}件、日本語で提案してください。\n\
                     手元にない食材を使ってもかまいません。\n",
                    RECIPES_PER_REQUEST
                );
                if !ingredients.is_empty() {
                    prompt.push_str(&format!("できれば使いたい食材: {}\n", ingredients.join(", ")));
                }
                push_conditions(&mut prompt, meal_type.as_deref(), extra_condition.as_deref());
                prompt.push_str(RECIPE_CONTRACT);
                prompt
            }
            PromptKind::IngredientEnrichment { name, category } => format!(
                "以下の食材名について、\n\
                 1. カナ表記（ひらがな）\n\
                 2. 一般的な同義語（3つ程度）\n\
                 3. 料理用途に適した画像の説明文（英語）\n\
                 をJSONで出力してください。\n\
                 食材名: {}\n\
                 カテゴリ: {}\n\
                 出力形式: JSONオブジェクトのみを返してください。キーは \"kana\"（文字列）、\"synonyms\"（文字列の配列）、\"image_prompt\"（英語の文字列）です。\n\
                 出力例: {{\"kana\": \"とまと\", \"synonyms\": [\"トマト\", \"赤茄子\", \"ミニトマト\"], \"image_prompt\": \"a fresh red tomato on a white background\"}}",
                name, category
            ),
            PromptKind::BlogArticle { recipe_title } => format!(
                "料理「{}」について、家庭料理ブログの記事を日本語で書いてください。\n\
                 料理の魅力、材料、作り方のコツを含め、本文はHTML（<h2>, <p>, <ul>, <li> を使用）で記述してください。\n\
                 出力形式: JSONオブジェクトのみを返してください。キーは \"title\"（記事タイトル、日本語の文字列）と \"content\"（HTML本文の文字列）です。\n\
                 出力例: {{\"title\": \"○○の作り方\", \"content\": \"<h2>○○</h2><p>○○</p>\"}}",
                recipe_title
            ),
            PromptKind::IngredientReconciliation { required, stock } => format!(
                "レシピに必要な材料と、手元にある食材の一覧があります。\n\
                 同じ食材の別名や表記ゆれ（例: 豚バラ肉と豚肉、にんじんと人参）は同じものとして扱ってください。\n\
                 塩、砂糖、醤油、味噌、酢、油、こしょう、にんにく、しょうが、水は常にあるものとします。\n\
                 必要な材料: {}\n\
                 手元の食材: {}\n\
                 出力形式: 手元の食材では用意できない材料だけを、必要な材料の表記のままJSON配列で返してください。すべて揃っている場合は [] を返してください。\n\
                 出力例: [\"卵\", \"牛乳\"]",
                required.join(", "),
                stock.join(", ")
            ),
        }
    }
}

const RECIPE_CONTRACT: &str = "出力形式: 各レシピはタイトル・説明・材料・手順を含めて、JSON配列のみで返してください。\
     キーは \"title\"（文字列）、\"description\"（文字列）、\"ingredients\"（分量付きの文字列の配列）、\"steps\"（文字列の配列）で、値はすべて日本語です。\n\
     例: [{\"title\": \"○○\", \"description\": \"○○\", \"ingredients\": [\"○○ 100g\"], \"steps\": [\"○○\"]}]";

fn push_conditions(prompt: &mut String, meal_type: Option<&str>, extra_condition: Option<&str>) {
    if let Some(meal_type) = meal_type.filter(|m| !m.trim().is_empty()) {
        prompt.push_str(&format!("食事の種類: {}\n", meal_type));
    }
    if let Some(condition) = extra_condition.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("追加の条件: {}\n", condition));
    }
}
