use std::collections::HashMap;
use std::sync::Arc;

use academy_core::requests::{
    CreateAchievementRequest, CreateOrderedRequest, NameRequest, RecordProgressRequest,
    UpdateAchievementRequest, UpdateOrderedRequest,
};
use academy_core::responses::{
    AchievementCatalog, ChapterList, CourseList, LessonList, ProgressRecorded, UserAchievementList,
    UserList,
};
use academy_core::validation::parse_id;
use academy_core::{Achievement, Chapter, Course, Id, Lesson, User};
use academy_storage::AcademyStore;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::error::ApiError;

type Body = Result<Json<Value>, JsonRejection>;
type Params = Result<Query<HashMap<String, String>>, QueryRejection>;
type ApiResult<T> = Result<T, ApiError>;
type Created<T> = ApiResult<(StatusCode, Json<T>)>;

/// Shared by every handler. The store sits behind one async mutex, so writes
/// from concurrent requests apply one at a time.
pub struct AppState {
    store: AsyncMutex<AcademyStore>,
}

impl AppState {
    pub fn new(store: AcademyStore) -> Self {
        Self {
            store: AsyncMutex::new(store),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/courses", get(list_courses).post(create_course))
        .route(
            "/api/courses/:id",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/chapters", get(list_chapters).post(create_chapter))
        .route(
            "/api/chapters/:id",
            get(get_chapter).put(update_chapter).delete(delete_chapter),
        )
        .route("/api/lessons", get(list_lessons).post(create_lesson))
        .route(
            "/api/lessons/:id",
            get(get_lesson).put(update_lesson).delete(delete_lesson),
        )
        .route("/api/lesson-progress", post(record_progress))
        .route("/api/achievements", get(list_user_achievements))
        .route(
            "/api/admin/achievements",
            get(list_achievements).post(create_achievement),
        )
        .route(
            "/api/admin/achievements/:id",
            get(get_achievement)
                .put(update_achievement)
                .delete(delete_achievement),
        )
        .with_state(state)
}

fn path_id(raw: &str) -> ApiResult<Id> {
    Ok(parse_id("id", Some(raw))?)
}

fn query_id(params: Params, field: &str) -> ApiResult<Id> {
    let Query(params) = params?;
    Ok(parse_id(field, params.get(field).map(String::as_str))?)
}

fn created<T>(value: T) -> Created<T> {
    Ok((StatusCode::CREATED, Json(value)))
}

// Courses

async fn list_courses(State(state): State<Arc<AppState>>) -> ApiResult<Json<CourseList>> {
    let store = state.store.lock().await;
    Ok(Json(CourseList {
        courses: store.courses()?,
    }))
}

async fn create_course(State(state): State<Arc<AppState>>, body: Body) -> Created<Course> {
    let Json(payload) = body?;
    let request = NameRequest::from_json(&payload)?;
    let course = state.store.lock().await.create_course(&request)?;
    info!(event = "course_created", course_id = course.id);
    created(course)
}

async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Course>> {
    let id = path_id(&id)?;
    Ok(Json(state.store.lock().await.course(id)?))
}

async fn update_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Body,
) -> ApiResult<Json<Course>> {
    let id = path_id(&id)?;
    let Json(payload) = body?;
    let request = NameRequest::from_json(&payload)?;
    Ok(Json(state.store.lock().await.update_course(id, &request)?))
}

async fn delete_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = path_id(&id)?;
    state.store.lock().await.delete_course(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// Users

async fn list_users(State(state): State<Arc<AppState>>) -> ApiResult<Json<UserList>> {
    let store = state.store.lock().await;
    Ok(Json(UserList {
        users: store.users()?,
    }))
}

async fn create_user(State(state): State<Arc<AppState>>, body: Body) -> Created<User> {
    let Json(payload) = body?;
    let request = NameRequest::from_json(&payload)?;
    let user = state.store.lock().await.create_user(&request)?;
    info!(event = "user_created", user_id = user.id);
    created(user)
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<User>> {
    let id = path_id(&id)?;
    Ok(Json(state.store.lock().await.user(id)?))
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Body,
) -> ApiResult<Json<User>> {
    let id = path_id(&id)?;
    let Json(payload) = body?;
    let request = NameRequest::from_json(&payload)?;
    Ok(Json(state.store.lock().await.update_user(id, &request)?))
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = path_id(&id)?;
    state.store.lock().await.delete_user(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// Chapters

async fn list_chapters(
    State(state): State<Arc<AppState>>,
    params: Params,
) -> ApiResult<Json<ChapterList>> {
    let course_id = query_id(params, "courseId")?;
    let store = state.store.lock().await;
    Ok(Json(ChapterList {
        chapters: store.chapters(course_id)?,
    }))
}

async fn create_chapter(State(state): State<Arc<AppState>>, body: Body) -> Created<Chapter> {
    let Json(payload) = body?;
    let request = CreateOrderedRequest::chapter_from_json(&payload)?;
    created(state.store.lock().await.create_chapter(&request)?)
}

async fn get_chapter(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Chapter>> {
    let id = path_id(&id)?;
    Ok(Json(state.store.lock().await.chapter(id)?))
}

async fn update_chapter(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Body,
) -> ApiResult<Json<Chapter>> {
    let id = path_id(&id)?;
    let Json(payload) = body?;
    let request = UpdateOrderedRequest::from_json(&payload)?;
    Ok(Json(state.store.lock().await.update_chapter(id, &request)?))
}

async fn delete_chapter(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = path_id(&id)?;
    state.store.lock().await.delete_chapter(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// Lessons

async fn list_lessons(
    State(state): State<Arc<AppState>>,
    params: Params,
) -> ApiResult<Json<LessonList>> {
    let chapter_id = query_id(params, "chapterId")?;
    let store = state.store.lock().await;
    Ok(Json(LessonList {
        lessons: store.lessons(chapter_id)?,
    }))
}

async fn create_lesson(State(state): State<Arc<AppState>>, body: Body) -> Created<Lesson> {
    let Json(payload) = body?;
    let request = CreateOrderedRequest::lesson_from_json(&payload)?;
    created(state.store.lock().await.create_lesson(&request)?)
}

async fn get_lesson(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Lesson>> {
    let id = path_id(&id)?;
    Ok(Json(state.store.lock().await.lesson(id)?))
}

async fn update_lesson(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Body,
) -> ApiResult<Json<Lesson>> {
    let id = path_id(&id)?;
    let Json(payload) = body?;
    let request = UpdateOrderedRequest::from_json(&payload)?;
    Ok(Json(state.store.lock().await.update_lesson(id, &request)?))
}

async fn delete_lesson(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = path_id(&id)?;
    state.store.lock().await.delete_lesson(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// Progress and achievements

async fn record_progress(
    State(state): State<Arc<AppState>>,
    body: Body,
) -> Created<ProgressRecorded> {
    let Json(payload) = body?;
    let request = RecordProgressRequest::from_json(&payload)?;
    let recorded = state.store.lock().await.record_progress(&request)?;
    created(ProgressRecorded::new(recorded.to_receipt()))
}

async fn list_user_achievements(
    State(state): State<Arc<AppState>>,
    params: Params,
) -> ApiResult<Json<UserAchievementList>> {
    let user_id = query_id(params, "userId")?;
    let store = state.store.lock().await;
    Ok(Json(UserAchievementList {
        achievements: store.user_achievements(user_id)?,
    }))
}

async fn list_achievements(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<AchievementCatalog>> {
    let store = state.store.lock().await;
    Ok(Json(AchievementCatalog {
        achievements: store.achievements()?,
    }))
}

async fn create_achievement(
    State(state): State<Arc<AppState>>,
    body: Body,
) -> Created<Achievement> {
    let Json(payload) = body?;
    let request = CreateAchievementRequest::from_json(&payload)?;
    created(state.store.lock().await.create_achievement(&request)?)
}

async fn get_achievement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Achievement>> {
    let id = path_id(&id)?;
    Ok(Json(state.store.lock().await.achievement(id)?))
}

async fn update_achievement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Body,
) -> ApiResult<Json<Achievement>> {
    let id = path_id(&id)?;
    let Json(payload) = body?;
    let request = UpdateAchievementRequest::from_json(&payload)?;
    Ok(Json(
        state.store.lock().await.update_achievement(id, &request)?,
    ))
}

async fn delete_achievement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = path_id(&id)?;
    state.store.lock().await.delete_achievement(id)?;
    Ok(StatusCode::NO_CONTENT)
}
