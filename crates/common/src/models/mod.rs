//! Domain models shared by the gateway and the enrichment worker

use serde::{Deserialize, Serialize};

/// A recipe suggested by the generative model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Fields generated for a new ingredient master entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientProfile {
    #[serde(default)]
    pub kana: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub image_prompt: String,
}

/// Ingredient master entry as stored in the document store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientMaster {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub kana: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default, rename = "imageUrl")]
    pub image_url: String,
}

/// Generated blog article before it is archived or posted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogArticle {
    pub title: String,
    pub content: String,
}

/// Publication status of a blog post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Publish,
    Private,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Publish => "publish",
            PostStatus::Private => "private",
        }
    }

    /// Parse a configured status, falling back to `publish`
    pub fn from_config(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "draft" => PostStatus::Draft,
            "private" => PostStatus::Private,
            _ => PostStatus::Publish,
        }
    }
}

/// Blog post archived in the document store and posted to the CMS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogPost {
    pub title: String,
    pub content: String,
    /// Ingredients of the recipe the article was derived from
    pub ingredients: Vec<String>,
    pub status: PostStatus,
}

impl BlogPost {
    pub fn from_article(article: BlogArticle, ingredients: Vec<String>, status: PostStatus) -> Self {
        Self {
            title: article.title,
            content: article.content,
            ingredients,
            status,
        }
    }
}
