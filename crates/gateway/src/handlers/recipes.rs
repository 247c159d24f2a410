//! Recipe suggestion handler
//!
//! One POST endpoint with three modes:
//! - `action: "judge_ingredients"` answers which recipe ingredients are missing
//! - `generateExternal: true` suggests recipes not limited to the stock
//! - otherwise recipes are built from the given `ingredients`
//!
//! `generateBlog: true` additionally hands the first recipe to the blog
//! publisher as detached work; the response does not wait for it.

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::AppState;
use recipe_suggest_common::{
    errors::{AppError, Result},
    models::Recipe,
    prompt::PromptKind,
};

/// Action name selecting the ingredient judge
pub const JUDGE_ACTION: &str = "judge_ingredients";

/// Message returned when blog publishing was started
pub const BLOG_STARTED_MESSAGE: &str = "ブログ記事の生成を開始しました";

/// Recipe request body
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SuggestRequest {
    #[serde(default)]
    pub ingredients: Vec<String>,

    #[validate(length(max = 200))]
    pub meal_type: Option<String>,

    #[validate(length(max = 1000))]
    pub extra_condition: Option<String>,

    pub action: Option<String>,

    #[serde(rename = "recipe_ingredients")]
    pub recipe_ingredients: Option<Vec<String>>,

    #[serde(rename = "stock_ingredients", default)]
    pub stock_ingredients: Vec<String>,

    #[serde(default)]
    pub generate_blog: bool,

    #[serde(default)]
    pub generate_external: bool,
}

/// Recipes response, with the blog kickoff fields when requested
#[derive(Debug, Serialize)]
pub struct RecipesResponse {
    pub recipes: Vec<Recipe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Ingredient judge response
#[derive(Debug, Serialize)]
pub struct NeededResponse {
    pub needed_ingredients: Vec<String>,
}

/// Handle a recipe request
pub async fn suggest(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let request = parse_request(&body)?;

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;
    check_list_sizes(&request, state.config.limits.max_ingredients)?;

    if request.action.as_deref() == Some(JUDGE_ACTION) {
        return Ok(Json(judge(&state, request).await?).into_response());
    }
    Ok(Json(generate(&state, request).await?).into_response())
}

/// An empty body is an empty request
fn parse_request(body: &[u8]) -> Result<SuggestRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SuggestRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation {
        message: format!("invalid JSON body: {}", e),
        field: None,
    })
}

fn check_list_sizes(request: &SuggestRequest, max: usize) -> Result<()> {
    let lists = [
        ("ingredients", request.ingredients.len()),
        (
            "recipe_ingredients",
            request.recipe_ingredients.as_ref().map_or(0, Vec::len),
        ),
        ("stock_ingredients", request.stock_ingredients.len()),
    ];

    for (field, len) in lists {
        if len > max {
            return Err(AppError::Validation {
                message: format!("{} has {} entries, at most {} allowed", field, len, max),
                field: Some(field.to_string()),
            });
        }
    }
    Ok(())
}

async fn judge(state: &AppState, request: SuggestRequest) -> Result<NeededResponse> {
    let required = request
        .recipe_ingredients
        .ok_or_else(|| AppError::MissingInput {
            field: "recipe_ingredients".to_string(),
        })?;
    let stock = request.stock_ingredients;

    let needed = if state.config.reconciliation.generative_assist {
        state
            .reconciler
            .needed_with_assist(
                state.generator.as_ref(),
                &state.extractor,
                &required,
                &stock,
                state.config.generative.reconcile_timeout(),
            )
            .await
    } else {
        state.reconciler.needed(&required, &stock)
    };

    info!(
        required = required.len(),
        stock = stock.len(),
        needed = needed.len(),
        "Ingredients judged"
    );
    Ok(NeededResponse {
        needed_ingredients: needed,
    })
}

async fn generate(state: &AppState, request: SuggestRequest) -> Result<RecipesResponse> {
    let ingredients: Vec<String> = request
        .ingredients
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let kind = if request.generate_external {
        PromptKind::RecipeUnconstrained {
            ingredients,
            meal_type: request.meal_type,
            extra_condition: request.extra_condition,
        }
    } else {
        if ingredients.is_empty() {
            return Err(AppError::MissingInput {
                field: "ingredients".to_string(),
            });
        }
        PromptKind::RecipeFromStock {
            ingredients,
            meal_type: request.meal_type,
            extra_condition: request.extra_condition,
        }
    };

    let text = state
        .generator
        .generate(&kind.build(), state.config.generative.recipe_timeout())
        .await?;
    let recipes: Vec<Recipe> = state.extractor.extract_as(&text, kind.output_shape())?;

    metrics::counter!("recipe_suggest_recipes_generated_total", "kind" => kind.name())
        .increment(recipes.len() as u64);
    info!(kind = kind.name(), count = recipes.len(), "Recipes generated");

    let mut response = RecipesResponse {
        recipes,
        message: None,
        title: None,
    };

    if request.generate_blog {
        match response.recipes.first() {
            Some(first) => {
                state.publisher.submit(state.tasks.as_ref(), first.clone());
                response.message = Some(BLOG_STARTED_MESSAGE.to_string());
                response.title = Some(first.title.clone());
            }
            None => warn!("Blog requested but no recipe was generated"),
        }
    }

    Ok(response)
}
