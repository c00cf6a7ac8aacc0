use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, header, request::Parts},
    response::IntoResponse,
    routing::{get, patch, post},
};
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use schema::{AdUnit, AttemptAnswer, DailyActivity, Question, QuestionType, Theme, UserEarnings};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{config::AppState, error::Error, rewards::CommitReceipt, store::parse_object_id};

/// Set by the auth gateway in front of this service
pub const USER_ID_HEADER: &str = "x-user-id";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status/ping", get(get_status_ping))
        .route("/ad-units/available", get(get_available_ad_units))
        .route("/ad-units/completed", get(get_completed_ad_units))
        .route("/ad-units/{id}/commit", post(post_commit))
        .route("/activity/today", get(get_activity_today))
        .route("/earnings", get(get_earnings))
        .route("/theme", get(get_theme))
        .route("/admin/ad-units", post(post_ad_unit))
        .route("/admin/ad-units/{id}/status", patch(patch_ad_unit_status))
        .route("/admin/themes", post(post_theme))
        .route("/admin/themes/{id}/activate", post(post_activate_theme))
        .with_state(state)
}

/// The caller's user id
pub struct AuthUser(pub String);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user_id| !user_id.is_empty())
            .map(|user_id| AuthUser(user_id.to_string()))
            .ok_or(Error::NotAuthenticated)
    }
}

/// A caller listed in `ADMIN_USER_IDS`
pub struct AdminUser(pub String);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user_id) = AuthUser::from_request_parts(parts, state).await?;
        if !state.env_vars.admin_user_ids.contains(&user_id) {
            return Err(Error::Forbidden);
        }
        Ok(AdminUser(user_id))
    }
}

#[derive(Serialize, Deserialize)]
pub struct CommitRequest {
    pub answers: Vec<AttemptAnswer>,
}

#[derive(Serialize, Deserialize)]
pub struct NewQuestion {
    #[serde(rename = "type")]
    pub _type: QuestionType,
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(rename = "correctOption", default)]
    pub correct_option: Option<usize>,
    #[serde(default)]
    pub reward: Option<f64>,
}

#[derive(Serialize, Deserialize)]
pub struct NewAdUnit {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "videoUrl")]
    pub video_url: String,
    #[serde(default)]
    pub questions: Vec<NewQuestion>,
    #[serde(rename = "totalReward")]
    pub total_reward: f64,
    #[serde(rename = "isOneTimePerUser", default)]
    pub is_one_time_per_user: bool,
    #[serde(rename = "maxDailyViews", default)]
    pub max_daily_views: Option<u32>,
}

impl From<NewAdUnit> for AdUnit {
    fn from(new: NewAdUnit) -> Self {
        AdUnit {
            id: ObjectId::new(),
            title: new.title,
            description: new.description,
            video_url: new.video_url,
            questions: new
                .questions
                .into_iter()
                .map(|q| Question {
                    id: ObjectId::new(),
                    _type: q._type,
                    text: q.text,
                    options: q.options,
                    correct_option: q.correct_option,
                    reward: q.reward,
                })
                .collect(),
            total_reward: new.total_reward,
            is_active: true,
            is_paused: false,
            total_views: 0,
            total_completions: 0,
            is_one_time_per_user: new.is_one_time_per_user,
            max_daily_views: new.max_daily_views,
            created_at: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(rename = "isActive", default)]
    pub is_active: Option<bool>,
    #[serde(rename = "isPaused", default)]
    pub is_paused: Option<bool>,
}

#[derive(Serialize, Deserialize)]
pub struct NewTheme {
    pub name: String,
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
}

pub async fn get_status_ping() -> impl IntoResponse {
    info!("Status");
    StatusCode::OK
}

pub async fn get_available_ad_units(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<AdUnit>>, Error> {
    let today = Utc::now().date_naive();
    let ad_units = state
        .service
        .list_available_ad_units(&user_id, today)
        .await?;
    Ok(Json(ad_units))
}

/// Completed ad unit ids as hex strings
pub async fn get_completed_ad_units(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<String>>, Error> {
    let ids = state.service.get_completed_ad_unit_ids(&user_id).await?;
    Ok(Json(ids.into_iter().map(|id| id.to_hex()).collect()))
}

pub async fn get_activity_today(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<DailyActivity>, Error> {
    let today = Utc::now().date_naive();
    let activity = state
        .service
        .get_user_daily_activity(&user_id, today)
        .await?;
    Ok(Json(activity))
}

pub async fn post_commit(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Json(commit_request): Json<CommitRequest>,
) -> Result<Json<CommitReceipt>, Error> {
    let ad_unit_id = parse_object_id(&id)?;
    let receipt = state
        .service
        .commit_attempt(&user_id, &ad_unit_id, commit_request.answers, Utc::now())
        .await?;
    Ok(Json(receipt))
}

pub async fn get_earnings(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserEarnings>, Error> {
    let earnings = state.service.get_user_earnings(&user_id).await?;
    Ok(Json(earnings))
}

/// Active theme as CSS custom properties
pub async fn get_theme(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let context = state.service.active_theme_context().await?;
    Ok((
        [(header::CONTENT_TYPE, "text/css")],
        context.style_sheet().to_css(),
    ))
}

pub async fn post_ad_unit(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(new_ad_unit): Json<NewAdUnit>,
) -> Result<(StatusCode, Json<AdUnit>), Error> {
    let ad_unit = state.service.create_ad_unit(new_ad_unit.into()).await?;
    info!(admin = %admin, ad_unit = %ad_unit.id, "ad unit created");
    Ok((StatusCode::CREATED, Json(ad_unit)))
}

pub async fn patch_ad_unit_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<AdUnit>, Error> {
    if update.is_active.is_none() && update.is_paused.is_none() {
        return Err(Error::BadRequest(
            "one of isActive or isPaused is required".into(),
        ));
    }
    let ad_unit_id = parse_object_id(&id)?;
    let ad_unit = state
        .service
        .set_ad_unit_status(&ad_unit_id, update.is_active, update.is_paused)
        .await?;
    info!(
        admin = %admin,
        ad_unit = %ad_unit.id,
        is_active = ad_unit.is_active,
        is_paused = ad_unit.is_paused,
        "ad unit status updated"
    );
    Ok(Json(ad_unit))
}

pub async fn post_theme(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(new_theme): Json<NewTheme>,
) -> Result<(StatusCode, Json<Theme>), Error> {
    let theme = Theme {
        id: ObjectId::new(),
        name: new_theme.name,
        colors: new_theme.colors,
        is_active: false,
    };
    let theme = state.service.create_theme(theme).await?;
    info!(admin = %admin, theme = %theme.id, "theme created");
    Ok((StatusCode::CREATED, Json(theme)))
}

pub async fn post_activate_theme(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    let theme_id = parse_object_id(&id)?;
    state.service.activate_theme(&theme_id).await?;
    info!(admin = %admin, theme = %theme_id, "theme activated");
    Ok(StatusCode::NO_CONTENT)
}
