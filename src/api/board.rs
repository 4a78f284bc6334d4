/// Question board endpoints under /api
use crate::{
    account::StatusMessage,
    auth::AuthContext,
    board::{Answer, Question},
    context::AppContext,
    error::{AppError, AppResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Form, Router,
};
use serde::{Deserialize, Serialize};

/// Build board routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/question", get(list_questions))
        .route("/api/question/:id", get(get_question))
        .route("/api/add-question", post(add_question))
        .route("/api/edit-question/:id", put(edit_question))
        .route("/api/answer/:id", get(list_answers))
        .route("/api/add-answer/:id", post(add_answer))
        .route("/api/edit-answer/:id", put(edit_answer))
        .route("/api/like", post(like))
        .route("/api/dislike", post(dislike))
        .route("/api/get-likes", post(get_likes))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuestionForm {
    question: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnswerForm {
    answer: String,
}

/// Question reference sent by the like endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LikeForm {
    id: String,
}

impl LikeForm {
    fn question_id(&self) -> AppResult<&str> {
        match self.id.trim() {
            "" => Err(AppError::Validation("question id is required".to_string())),
            id => Ok(id),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeCount {
    pub likes: i64,
}

async fn list_questions(State(ctx): State<AppContext>) -> AppResult<Json<Vec<Question>>> {
    Ok(Json(ctx.board.list_questions().await?))
}

async fn get_question(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> AppResult<Json<Question>> {
    Ok(Json(ctx.board.get_question(&id).await?))
}

async fn add_question(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Form(form): Form<QuestionForm>,
) -> AppResult<(StatusCode, Json<Question>)> {
    let question = ctx
        .board
        .post_question(&auth.account_id, &form.question)
        .await?;
    Ok((StatusCode::CREATED, Json(question)))
}

async fn edit_question(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Form(form): Form<QuestionForm>,
) -> AppResult<Json<Question>> {
    Ok(Json(
        ctx.board
            .edit_question(&auth.account_id, &id, &form.question)
            .await?,
    ))
}

async fn list_answers(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Answer>>> {
    Ok(Json(ctx.board.list_answers(&id).await?))
}

async fn add_answer(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Form(form): Form<AnswerForm>,
) -> AppResult<(StatusCode, Json<Answer>)> {
    let answer = ctx
        .board
        .add_answer(&auth.account_id, &id, &form.answer)
        .await?;
    Ok((StatusCode::CREATED, Json(answer)))
}

async fn edit_answer(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Form(form): Form<AnswerForm>,
) -> AppResult<Json<Answer>> {
    Ok(Json(
        ctx.board
            .edit_answer(&auth.account_id, &id, &form.answer)
            .await?,
    ))
}

async fn like(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Form(form): Form<LikeForm>,
) -> AppResult<Json<StatusMessage>> {
    ctx.board.like(&auth.account_id, form.question_id()?).await?;
    Ok(Json(StatusMessage::new("done")))
}

async fn dislike(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Form(form): Form<LikeForm>,
) -> AppResult<Json<StatusMessage>> {
    ctx.board
        .dislike(&auth.account_id, form.question_id()?)
        .await?;
    Ok(Json(StatusMessage::new("done")))
}

async fn get_likes(
    State(ctx): State<AppContext>,
    Form(form): Form<LikeForm>,
) -> AppResult<Json<LikeCount>> {
    let likes = ctx.board.like_count(form.question_id()?).await?;
    Ok(Json(LikeCount { likes }))
}
