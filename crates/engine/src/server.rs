//! HTTP routes for the recommender service

use crate::recommendation::Recommendation;
use crate::service::RecommenderService;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_TOP_K: usize = 10;
const DEFAULT_PER_PAGE: usize = 50;

/// Application state shared across all handlers
///
/// `service` is `None` when models failed to load; only health answers then.
pub struct AppState {
    pub service: Option<Arc<RecommenderService>>,
    pub load_error: Option<String>,
}

impl AppState {
    pub fn loaded(service: Arc<RecommenderService>) -> Self {
        Self {
            service: Some(service),
            load_error: None,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            service: None,
            load_error: Some(reason.into()),
        }
    }

    fn service(&self) -> Result<&RecommenderService, ApiError> {
        self.service.as_deref().ok_or_else(|| {
            ApiError::ModelsNotLoaded(
                self.load_error
                    .clone()
                    .unwrap_or_else(|| "Models are still loading".to_string()),
            )
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Models not loaded: {0}")]
    ModelsNotLoaded(String),

    #[error("Student not found: {0}")]
    StudentNotFound(String),

    #[error("Course not found: {0}")]
    CourseNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ModelsNotLoaded(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::StudentNotFound(_) | ApiError::CourseNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            ApiError::ModelsNotLoaded(_) => "models_not_loaded",
            ApiError::StudentNotFound(_) => "student_not_found",
            ApiError::CourseNotFound(_) => "course_not_found",
            ApiError::Internal(_) => "internal_error",
        };
        if let ApiError::Internal(message) = self {
            error!(error = %message, "Request failed");
        }
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error.to_string(),
            message: self.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    /// Only list courses carrying this track
    pub track: Option<String>,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    DEFAULT_PER_PAGE
}

impl PageQuery {
    fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let per_page = self.per_page.max(1);
        let start = self.page.saturating_sub(1).saturating_mul(per_page);
        if start >= items.len() {
            return &[];
        }
        let end = (start + per_page).min(items.len());
        &items[start..end]
    }

    fn total_pages(&self, total: usize) -> usize {
        total.div_ceil(self.per_page.max(1))
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

#[derive(Debug, Deserialize)]
pub struct TopKQuery {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub student_id: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub student_id: String,
    pub top_k: usize,
    pub recommendations: Vec<Recommendation>,
}

fn round_to(value: f32, decimals: i32) -> f32 {
    let factor = 10f32.powi(decimals);
    (value * factor).round() / factor
}

/// Scores to 4 decimals, explanation figures to 3
fn rounded(mut rec: Recommendation) -> Recommendation {
    rec.score = round_to(rec.score, 4);
    rec.reasons.content_similarity = round_to(rec.reasons.content_similarity, 3);
    rec.reasons.collaborative_score = round_to(rec.reasons.collaborative_score, 3);
    rec.reasons.track_performance = round_to(rec.reasons.track_performance, 3);
    rec
}

fn recommendations_for(
    service: &RecommenderService,
    student_id: &str,
    top_k: usize,
) -> Result<RecommendationsResponse, ApiError> {
    if !service.has_student(student_id) {
        return Err(ApiError::StudentNotFound(student_id.to_string()));
    }

    info!(student = %student_id, top_k, "Generating recommendations");
    let recommendations = service
        .recommend(student_id, top_k)?
        .into_iter()
        .map(rounded)
        .collect();

    Ok(RecommendationsResponse {
        student_id: student_id.to_string(),
        top_k,
        recommendations,
    })
}

/// GET /api/health
async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "online",
        "service": "curricula-service",
        "models_loaded": state.service.is_some(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /api/students
async fn list_students(
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let students = state.service()?.catalog().all_students();
    Ok(HttpResponse::Ok().json(Page {
        items: query.slice(students).to_vec(),
        total: students.len(),
        page: query.page,
        per_page: query.per_page,
        total_pages: query.total_pages(students.len()),
    }))
}

/// GET /api/students/{id}
async fn get_student(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let student_id = path.into_inner();
    let detail = state
        .service()?
        .student_detail(&student_id)
        .ok_or(ApiError::StudentNotFound(student_id))?;
    Ok(HttpResponse::Ok().json(detail))
}

/// GET /api/students/{id}/history
async fn get_student_history(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let service = state.service()?;
    let student_id = path.into_inner();
    if !service.has_student(&student_id) {
        return Err(ApiError::StudentNotFound(student_id));
    }
    Ok(HttpResponse::Ok().json(service.student_history(&student_id)))
}

/// GET /api/students/{id}/recommendations?top_k=
async fn get_recommendations(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<TopKQuery>,
) -> Result<HttpResponse, ApiError> {
    let response = recommendations_for(state.service()?, &path, query.top_k)?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /api/recommend
async fn recommend(
    state: web::Data<AppState>,
    body: web::Json<RecommendRequest>,
) -> Result<HttpResponse, ApiError> {
    let response = recommendations_for(state.service()?, &body.student_id, body.top_k)?;
    Ok(HttpResponse::Ok().json(response))
}

/// GET /api/courses?track=&page=&per_page=
async fn list_courses(
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let courses: Vec<_> = state
        .service()?
        .catalog()
        .courses()
        .iter()
        .filter(|c| match query.track {
            Some(ref track) => c.tracks.contains(track),
            None => true,
        })
        .cloned()
        .collect();

    Ok(HttpResponse::Ok().json(Page {
        items: query.slice(&courses).to_vec(),
        total: courses.len(),
        page: query.page,
        per_page: query.per_page,
        total_pages: query.total_pages(courses.len()),
    }))
}

/// GET /api/courses/{code}
async fn get_course(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let code = path.into_inner();
    let detail = state
        .service()?
        .course_detail(&code)
        .ok_or(ApiError::CourseNotFound(code))?;
    Ok(HttpResponse::Ok().json(detail))
}

/// GET /api/courses/{code}/students
async fn get_course_students(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let service = state.service()?;
    let code = path.into_inner();
    let students = service.students_who_took(&code);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "course_code": code,
        "total": students.len(),
        "students": students,
    })))
}

/// GET /api/stats
async fn get_stats(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(state.service()?.system_stats()))
}

/// GET /api/tracks
async fn get_tracks(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(state.service()?.tracks()))
}

/// Configure application routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health))
            // Students
            .route("/students", web::get().to(list_students))
            .route("/students/{id}", web::get().to(get_student))
            .route("/students/{id}/history", web::get().to(get_student_history))
            .route(
                "/students/{id}/recommendations",
                web::get().to(get_recommendations),
            )
            .route("/recommend", web::post().to(recommend))
            // Courses
            .route("/courses", web::get().to(list_courses))
            .route("/courses/{code}", web::get().to(get_course))
            .route(
                "/courses/{code}/students",
                web::get().to(get_course_students),
            )
            // System
            .route("/stats", web::get().to(get_stats))
            .route("/tracks", web::get().to(get_tracks)),
    );
}
