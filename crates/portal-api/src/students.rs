use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use portal_types::api::{Claims, CreateStudentRequest, ListStudentsQuery, UpdateStudentRequest};
use portal_types::models::Student;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

pub async fn create_student(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateStudentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let student = state
        .students
        .create(claims.sub, &req.name, &req.email)
        .await?;
    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn list_students(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListStudentsQuery>,
) -> Result<Json<Vec<Student>>, ApiError> {
    let students = state.students.list(claims.sub, query.q.as_deref()).await?;
    Ok(Json(students))
}

pub async fn get_student(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<Student>, ApiError> {
    let student = state.students.get(claims.sub, student_id).await?;
    Ok(Json(student))
}

pub async fn update_student(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(student_id): Path<Uuid>,
    Json(req): Json<UpdateStudentRequest>,
) -> Result<Json<Student>, ApiError> {
    let student = state
        .students
        .update(claims.sub, student_id, &req.name, &req.email)
        .await?;
    Ok(Json(student))
}

pub async fn delete_student(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(student_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.students.delete(claims.sub, student_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
