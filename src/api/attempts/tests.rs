use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::core::security::ActorRole;
use crate::test_support::{self, TestContext, ORG, OTHER_ORG};

struct Tokens {
    student: String,
    other_student: String,
    teacher: String,
    admin: String,
}

fn tokens(ctx: &TestContext) -> Tokens {
    let settings = ctx.state.settings();
    Tokens {
        student: test_support::bearer_token("student-1", ORG, ActorRole::Student, settings),
        other_student: test_support::bearer_token("student-2", ORG, ActorRole::Student, settings),
        teacher: test_support::bearer_token("teacher-1", ORG, ActorRole::Teacher, settings),
        admin: test_support::bearer_token("admin-1", ORG, ActorRole::Admin, settings),
    }
}

async fn send(
    ctx: &TestContext,
    method: Method,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(method, uri, Some(token), body))
        .await
        .expect("response");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

fn answer_for<'a>(attempt: &'a serde_json::Value, question_id: &str) -> &'a serde_json::Value {
    attempt["answers"]
        .as_array()
        .expect("answers")
        .iter()
        .find(|answer| answer["question_id"] == question_id)
        .expect("answer for question")
}

#[tokio::test]
async fn starting_twice_returns_the_same_attempt() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;
    test_support::insert_single_question(ctx.state.db(), &quiz, 1.0, "B", 0).await;

    let body = json!({"quizID": quiz.id, "answers": []});
    let (status, first) =
        send(&ctx, Method::POST, "/api/v1/attempts", &tokens.student, Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "response: {first}");
    assert_eq!(first["status"], "in_progress");
    assert_eq!(first["student_id"], "student-1");
    assert!(first["score_raw"].is_null());

    let (status, second) =
        send(&ctx, Method::POST, "/api/v1/attempts", &tokens.student, Some(body)).await;
    assert_eq!(status, StatusCode::OK, "response: {second}");
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["status"], "in_progress");
    assert_eq!(second["started_at"], first["started_at"]);
    assert!(second["score_raw"].is_null());
    assert_eq!(test_support::count_attempts(ctx.state.db()).await, 1);
}

#[tokio::test]
async fn concurrent_starts_share_one_attempt() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;

    let request = || {
        test_support::json_request(
            Method::POST,
            "/api/v1/attempts",
            Some(&tokens.student),
            Some(json!({"quiz_id": quiz.id})),
        )
    };
    let (first, second) =
        tokio::join!(ctx.app.clone().oneshot(request()), ctx.app.clone().oneshot(request()));
    let first = first.expect("first response");
    let second = second.expect("second response");

    let mut statuses = vec![first.status(), second.status()];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CREATED]);

    let first = test_support::read_json(first).await;
    let second = test_support::read_json(second).await;
    assert_eq!(first["id"], second["id"]);
    assert_eq!(test_support::count_attempts(ctx.state.db()).await, 1);
}

#[tokio::test]
async fn submission_auto_grades_and_scores() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;
    let q1 = test_support::insert_single_question(ctx.state.db(), &quiz, 1.0, "B", 0).await;
    let q2 = test_support::insert_single_question(ctx.state.db(), &quiz, 2.0, "C", 1).await;

    let (status, attempt) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({
            "quiz_id": quiz.id,
            "include_answers": true,
            "answers": [
                {"question_id": q1.id, "text": "b"},
                {"question_id": q2.id, "text": "a"}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {attempt}");
    assert_eq!(attempt["status"], "finished");
    assert!(attempt["finished_at"].is_string());
    assert_eq!(attempt["score_raw"].as_f64(), Some(1.0));
    assert_eq!(attempt["score_percent"].as_f64(), Some(33.33));

    let correct = answer_for(&attempt, &q1.id);
    assert_eq!(correct["is_correct"], true);
    assert_eq!(correct["earned_points"].as_f64(), Some(1.0));
    let wrong = answer_for(&attempt, &q2.id);
    assert_eq!(wrong["is_correct"], false);
    assert_eq!(wrong["earned_points"].as_f64(), Some(0.0));
}

#[tokio::test]
async fn resubmission_replaces_answers_and_rescores_everything() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;
    let q1 = test_support::insert_single_question(ctx.state.db(), &quiz, 1.0, "B", 0).await;
    let q2 = test_support::insert_single_question(ctx.state.db(), &quiz, 1.0, "A", 1).await;

    let submit = |question_id: String, text: &'static str| {
        json!({"quiz_id": quiz.id, "answers": [{"question_id": question_id, "text": text}]})
    };

    let (status, first) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(submit(q1.id.clone(), "B")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {first}");
    assert_eq!(first["score_percent"].as_f64(), Some(50.0));

    let (status, second) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(submit(q1.id.clone(), "B")),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {second}");
    let attempt_id = second["id"].as_str().expect("attempt id").to_string();
    assert_eq!(test_support::count_answers(ctx.state.db(), &attempt_id).await, 1);

    // Answering the second question keeps the first one in the score.
    let (status, third) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(submit(q2.id.clone(), "a")),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {third}");
    assert_eq!(third["score_raw"].as_f64(), Some(2.0));
    assert_eq!(third["score_percent"].as_f64(), Some(100.0));

    // Changing an answer replaces its grade.
    let (status, fourth) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(submit(q1.id.clone(), "D")),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {fourth}");
    assert_eq!(fourth["score_raw"].as_f64(), Some(1.0));
    assert_eq!(test_support::count_answers(ctx.state.db(), &attempt_id).await, 2);
}

#[tokio::test]
async fn foreign_question_rejects_the_whole_batch() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;
    let other_quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;
    let own = test_support::insert_single_question(ctx.state.db(), &quiz, 1.0, "A", 0).await;
    let foreign =
        test_support::insert_single_question(ctx.state.db(), &other_quiz, 1.0, "A", 0).await;

    let (status, body) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({
            "quiz_id": quiz.id,
            "answers": [
                {"question_id": own.id, "text": "A"},
                {"question_id": foreign.id, "text": "A"}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "response: {body}");
    assert!(body["detail"].as_str().expect("detail").contains(&foreign.id));
    assert_eq!(test_support::count_attempts(ctx.state.db()).await, 0);
}

#[tokio::test]
async fn blank_answer_is_rejected_before_any_write() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;
    let question = test_support::insert_essay_question(ctx.state.db(), &quiz, 5.0, 0).await;

    let (status, body) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({"quiz_id": quiz.id, "answers": [{"question_id": question.id, "text": "  "}]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");
    assert!(body["detail"].as_str().expect("detail").contains(&question.id));
    assert_eq!(test_support::count_attempts(ctx.state.db()).await, 0);
}

#[tokio::test]
async fn hidden_quizzes_are_not_found() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let draft = test_support::insert_quiz(ctx.state.db(), ORG, false).await;
    let foreign = test_support::insert_quiz(ctx.state.db(), OTHER_ORG, true).await;

    for quiz_id in [&draft.id, &foreign.id] {
        let (status, body) = send(
            &ctx,
            Method::POST,
            "/api/v1/attempts",
            &tokens.student,
            Some(json!({"quiz_id": quiz_id})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "response: {body}");
    }
}

#[tokio::test]
async fn staff_submit_on_behalf_of_a_named_student() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, false).await;

    let (status, body) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.teacher,
        Some(json!({"quiz_id": quiz.id})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");

    let (status, body) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.teacher,
        Some(json!({
            "quiz_id": quiz.id,
            "studentID": "student-7",
            "startedAt": "2025-03-01T09:00:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {body}");
    assert_eq!(body["student_id"], "student-7");
    assert_eq!(body["started_at"], "2025-03-01T09:00:00Z");

    let (status, body) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({"quiz_id": quiz.id, "student_id": "student-7"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "response: {body}");
}

#[tokio::test]
async fn essay_grade_survives_resubmission() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;
    let single = test_support::insert_single_question(ctx.state.db(), &quiz, 1.0, "A", 0).await;
    let essay = test_support::insert_essay_question(ctx.state.db(), &quiz, 10.0, 1).await;

    let (status, attempt) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({
            "quiz_id": quiz.id,
            "include_answers": true,
            "answers": [
                {"question_id": single.id, "text": "A"},
                {"question_id": essay.id, "text": "Water is a polar molecule."}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {attempt}");
    assert_eq!(attempt["score_raw"].as_f64(), Some(1.0));
    let essay_answer = answer_for(&attempt, &essay.id);
    assert!(essay_answer["is_correct"].is_null());
    assert_eq!(essay_answer["earned_points"].as_f64(), Some(0.0));
    let essay_answer_id = essay_answer["id"].as_str().expect("answer id").to_string();

    let (status, graded) = send(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/attempt-answers/{essay_answer_id}"),
        &tokens.teacher,
        Some(json!({"earnedPoints": 5.0, "feedback": "Good start"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {graded}");
    assert_eq!(graded["answer"]["earned_points"].as_f64(), Some(5.0));
    assert_eq!(graded["answer"]["is_correct"], true);
    assert_eq!(graded["answer"]["graded_by_teacher_id"], "teacher-1");
    assert!(graded["attempt"].is_null());
    let graded_at = graded["answer"]["graded_at"].clone();

    let (status, resubmitted) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({
            "quiz_id": quiz.id,
            "include_answers": true,
            "answers": [
                {"question_id": single.id, "text": "A"},
                {"question_id": essay.id, "text": "Water is a polar molecule."}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {resubmitted}");
    assert_eq!(resubmitted["score_raw"].as_f64(), Some(6.0));
    let essay_answer = answer_for(&resubmitted, &essay.id);
    assert_eq!(essay_answer["graded_by_teacher_id"], "teacher-1");
    assert_eq!(essay_answer["graded_at"], graded_at);
    assert_eq!(essay_answer["feedback"], "Good start");
}

#[tokio::test]
async fn grading_rules_are_enforced() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;
    let single = test_support::insert_single_question(ctx.state.db(), &quiz, 1.0, "A", 0).await;
    let essay = test_support::insert_essay_question(ctx.state.db(), &quiz, 3.0, 1).await;

    let (_, attempt) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({
            "quiz_id": quiz.id,
            "include_answers": true,
            "answers": [
                {"question_id": single.id, "text": "B"},
                {"question_id": essay.id, "text": "Answer"}
            ]
        })),
    )
    .await;
    let single_uri = format!(
        "/api/v1/attempt-answers/{}",
        answer_for(&attempt, &single.id)["id"].as_str().expect("id")
    );
    let essay_uri = format!(
        "/api/v1/attempt-answers/{}",
        answer_for(&attempt, &essay.id)["id"].as_str().expect("id")
    );

    let (status, body) = send(
        &ctx,
        Method::PATCH,
        &essay_uri,
        &tokens.student,
        Some(json!({"earned_points": 3.0})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "response: {body}");

    let (status, body) =
        send(&ctx, Method::PATCH, &essay_uri, &tokens.teacher, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");

    let (status, body) = send(
        &ctx,
        Method::PATCH,
        &essay_uri,
        &tokens.teacher,
        Some(json!({"earned_points": 4.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");

    let (status, body) = send(
        &ctx,
        Method::PATCH,
        &single_uri,
        &tokens.teacher,
        Some(json!({"is_correct": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");

    let (status, body) = send(
        &ctx,
        Method::PATCH,
        &single_uri,
        &tokens.teacher,
        Some(json!({"is_correct": true, "override_auto_grade": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["answer"]["earned_points"].as_f64(), Some(1.0));

    let (status, body) = send(
        &ctx,
        Method::PATCH,
        "/api/v1/attempt-answers/missing",
        &tokens.teacher,
        Some(json!({"earned_points": 1.0})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "response: {body}");
}

#[tokio::test]
async fn eager_recompute_updates_the_attempt_on_grade() {
    let ctx = test_support::setup_test_context_with(|| {
        std::env::set_var("GRADING_EAGER_RECOMPUTE", "true");
    })
    .await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;
    let essay = test_support::insert_essay_question(ctx.state.db(), &quiz, 4.0, 0).await;

    let (_, attempt) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({
            "quiz_id": quiz.id,
            "include_answers": true,
            "answers": [{"question_id": essay.id, "text": "Answer"}]
        })),
    )
    .await;
    assert_eq!(attempt["score_percent"].as_f64(), Some(0.0));
    let answer_id = answer_for(&attempt, &essay.id)["id"].as_str().expect("id").to_string();

    let (status, graded) = send(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/attempt-answers/{answer_id}"),
        &tokens.teacher,
        Some(json!({"is_correct": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {graded}");
    assert_eq!(graded["attempt"]["score_raw"].as_f64(), Some(4.0));
    assert_eq!(graded["attempt"]["score_percent"].as_f64(), Some(100.0));
    assert_eq!(graded["attempt"]["status"], "finished");
}

#[tokio::test]
async fn regrade_drops_removed_questions() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;
    let kept = test_support::insert_single_question(ctx.state.db(), &quiz, 1.0, "A", 0).await;
    let removed = test_support::insert_single_question(ctx.state.db(), &quiz, 3.0, "A", 1).await;

    let (_, attempt) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({
            "quiz_id": quiz.id,
            "answers": [
                {"question_id": kept.id, "text": "B"},
                {"question_id": removed.id, "text": "A"}
            ]
        })),
    )
    .await;
    assert_eq!(attempt["score_percent"].as_f64(), Some(75.0));
    let attempt_id = attempt["id"].as_str().expect("id").to_string();

    test_support::soft_delete_question(ctx.state.db(), &removed.id).await;

    let uri = format!("/api/v1/attempts/{attempt_id}/regrade");
    let (status, body) = send(&ctx, Method::POST, &uri, &tokens.student, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "response: {body}");

    let (status, regraded) = send(&ctx, Method::POST, &uri, &tokens.teacher, None).await;
    assert_eq!(status, StatusCode::OK, "response: {regraded}");
    assert_eq!(regraded["score_raw"].as_f64(), Some(0.0));
    assert_eq!(regraded["score_percent"].as_f64(), Some(0.0));
    assert_eq!(regraded["status"], "finished");
    assert_eq!(regraded["finished_at"], attempt["finished_at"]);
}

#[tokio::test]
async fn abandoned_attempts_refuse_answers() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;
    let question = test_support::insert_single_question(ctx.state.db(), &quiz, 1.0, "A", 0).await;

    let (_, started) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({"quiz_id": quiz.id})),
    )
    .await;
    let uri = format!("/api/v1/attempts/{}/abandon", started["id"].as_str().expect("id"));

    let (status, body) = send(&ctx, Method::POST, &uri, &tokens.teacher, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "response: {body}");

    let (status, abandoned) = send(&ctx, Method::POST, &uri, &tokens.admin, None).await;
    assert_eq!(status, StatusCode::OK, "response: {abandoned}");
    assert_eq!(abandoned["status"], "abandoned");

    let (status, body) = send(&ctx, Method::POST, &uri, &tokens.admin, None).await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");

    let (status, body) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({"quiz_id": quiz.id, "answers": [{"question_id": question.id, "text": "A"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");

    // A bare start still returns the attempt as it is.
    let (status, body) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({"quiz_id": quiz.id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["status"], "abandoned");
}

#[tokio::test]
async fn admin_corrections_follow_the_lenient_policy() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;

    let (_, started) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({"quiz_id": quiz.id})),
    )
    .await;
    let uri = format!("/api/v1/attempts/{}", started["id"].as_str().expect("id"));

    let (status, body) =
        send(&ctx, Method::PATCH, &uri, &tokens.teacher, Some(json!({"status": "finished"})))
            .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "response: {body}");

    let (status, corrected) = send(
        &ctx,
        Method::PATCH,
        &uri,
        &tokens.admin,
        Some(json!({
            "status": "finished",
            "started_at": "2025-03-01T09:00:00Z",
            "finished_at": "2025-03-01T09:45:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {corrected}");
    assert_eq!(corrected["status"], "finished");
    assert_eq!(corrected["finished_at"], "2025-03-01T09:45:00Z");

    let (status, corrected) =
        send(&ctx, Method::PATCH, &uri, &tokens.admin, Some(json!({"status": "paused"}))).await;
    assert_eq!(status, StatusCode::OK, "response: {corrected}");
    assert_eq!(corrected["status"], "in_progress");

    let (status, body) = send(
        &ctx,
        Method::PATCH,
        &uri,
        &tokens.admin,
        Some(json!({"finished_at": "2025-03-01T08:00:00Z"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");
}

#[tokio::test]
async fn strict_policy_rejects_unknown_statuses() {
    let ctx = test_support::setup_test_context_with(|| {
        std::env::set_var("ATTEMPT_STATUS_POLICY", "strict");
    })
    .await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;

    let (_, started) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({"quiz_id": quiz.id})),
    )
    .await;
    let uri = format!("/api/v1/attempts/{}", started["id"].as_str().expect("id"));

    let (status, body) =
        send(&ctx, Method::PATCH, &uri, &tokens.admin, Some(json!({"status": "paused"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");
    assert!(body["detail"].as_str().expect("detail").contains("paused"));
}

#[tokio::test]
async fn listing_is_scoped_to_organization_and_student() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;

    for token in [&tokens.student, &tokens.other_student] {
        let (status, body) = send(
            &ctx,
            Method::POST,
            "/api/v1/attempts",
            token,
            Some(json!({"quiz_id": quiz.id})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "response: {body}");
    }

    let (status, own) = send(&ctx, Method::GET, "/api/v1/attempts", &tokens.student, None).await;
    assert_eq!(status, StatusCode::OK, "response: {own}");
    assert_eq!(own["total_count"], 1);
    assert_eq!(own["items"][0]["student_id"], "student-1");

    let (status, body) =
        send(&ctx, Method::GET, "/api/v1/attempts?studentID=student-2", &tokens.student, None)
            .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "response: {body}");

    let uri = format!("/api/v1/attempts?quiz_id={}&status=in_progress&limit=1", quiz.id);
    let (status, page) = send(&ctx, Method::GET, &uri, &tokens.teacher, None).await;
    assert_eq!(status, StatusCode::OK, "response: {page}");
    assert_eq!(page["total_count"], 2);
    assert_eq!(page["limit"], 1);
    assert_eq!(page["items"].as_array().expect("items").len(), 1);

    let (status, body) =
        send(&ctx, Method::GET, "/api/v1/attempts?status=done", &tokens.teacher, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");

    let outsider = test_support::bearer_token(
        "teacher-9",
        OTHER_ORG,
        ActorRole::Teacher,
        ctx.state.settings(),
    );
    let (status, foreign) = send(&ctx, Method::GET, "/api/v1/attempts", &outsider, None).await;
    assert_eq!(status, StatusCode::OK, "response: {foreign}");
    assert_eq!(foreign["total_count"], 0);
}

#[tokio::test]
async fn attempts_are_hidden_from_other_students_and_organizations() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;

    let (_, started) = send(
        &ctx,
        Method::POST,
        "/api/v1/attempts",
        &tokens.student,
        Some(json!({"quiz_id": quiz.id})),
    )
    .await;
    let uri = format!("/api/v1/attempts/{}", started["id"].as_str().expect("id"));

    let (status, own) = send(&ctx, Method::GET, &uri, &tokens.student, None).await;
    assert_eq!(status, StatusCode::OK, "response: {own}");
    assert_eq!(own["answers"].as_array().expect("answers").len(), 0);

    let (status, body) = send(&ctx, Method::GET, &uri, &tokens.other_student, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "response: {body}");

    let outsider =
        test_support::bearer_token("admin-9", OTHER_ORG, ActorRole::Admin, ctx.state.settings());
    let (status, body) = send(&ctx, Method::GET, &uri, &outsider, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "response: {body}");

    let (status, body) = send(&ctx, Method::POST, &format!("{uri}/abandon"), &outsider, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "response: {body}");
}

async fn stored_score(ctx: &TestContext, attempt_id: &str) -> (Option<f64>, f64) {
    sqlx::query_as(
        "SELECT a.score_raw, COALESCE(SUM(ans.earned_points), 0)::float8
         FROM quiz_attempts a
         LEFT JOIN quiz_attempt_answers ans ON ans.attempt_id = a.id
         WHERE a.id = $1
         GROUP BY a.id, a.score_raw",
    )
    .bind(attempt_id)
    .fetch_one(ctx.state.db())
    .await
    .expect("stored score")
}

async fn submit_as(
    ctx: &TestContext,
    token: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(ctx, Method::POST, "/api/v1/attempts", token, Some(body)).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_submissions_are_accepted_and_fully_scored() {
    let ctx = test_support::setup_test_context().await;
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;
    let q1 = test_support::insert_single_question(ctx.state.db(), &quiz, 1.0, "A", 0).await;
    let q2 = test_support::insert_single_question(ctx.state.db(), &quiz, 2.0, "B", 1).await;

    for round in 0..15 {
        let student = format!("racer-{round}");
        let token =
            test_support::bearer_token(&student, ORG, ActorRole::Student, ctx.state.settings());

        let ((first_status, first), (second_status, second)) = tokio::join!(
            submit_as(
                &ctx,
                &token,
                json!({"quiz_id": quiz.id, "answers": [{"question_id": q1.id, "text": "A"}]}),
            ),
            submit_as(
                &ctx,
                &token,
                json!({"quiz_id": quiz.id, "answers": [{"question_id": q2.id, "text": "B"}]}),
            ),
        );
        assert!(first_status.is_success(), "round {round}: {first_status} {first}");
        assert!(second_status.is_success(), "round {round}: {second_status} {second}");
        assert_eq!(first["id"], second["id"]);

        let attempt_id = first["id"].as_str().expect("attempt id");
        let (score_raw, answers_sum) = stored_score(&ctx, attempt_id).await;
        assert_eq!(answers_sum, 3.0, "round {round}");
        assert_eq!(score_raw, Some(3.0), "round {round}");
    }

    assert_eq!(test_support::count_attempts(ctx.state.db()).await, 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_incremental_submissions_never_leave_a_stale_score() {
    let ctx = test_support::setup_test_context().await;
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;
    let q1 = test_support::insert_single_question(ctx.state.db(), &quiz, 1.0, "A", 0).await;
    let q2 = test_support::insert_single_question(ctx.state.db(), &quiz, 2.0, "B", 1).await;

    for round in 0..15 {
        let student = format!("incremental-{round}");
        let token =
            test_support::bearer_token(&student, ORG, ActorRole::Student, ctx.state.settings());
        let (status, started) = submit_as(&ctx, &token, json!({"quiz_id": quiz.id})).await;
        assert_eq!(status, StatusCode::CREATED, "round {round}: {started}");

        let ((first_status, _), (second_status, _)) = tokio::join!(
            submit_as(
                &ctx,
                &token,
                json!({"quiz_id": quiz.id, "answers": [{"question_id": q1.id, "text": "a"}]}),
            ),
            submit_as(
                &ctx,
                &token,
                json!({"quiz_id": quiz.id, "answers": [{"question_id": q2.id, "text": "b"}]}),
            ),
        );
        assert_eq!(first_status, StatusCode::OK, "round {round}");
        assert_eq!(second_status, StatusCode::OK, "round {round}");

        let attempt_id = started["id"].as_str().expect("attempt id");
        let (score_raw, answers_sum) = stored_score(&ctx, attempt_id).await;
        assert_eq!(score_raw, Some(answers_sum), "round {round}");
        assert_eq!(answers_sum, 3.0, "round {round}");
    }
}

#[tokio::test]
async fn staff_started_at_cannot_silently_change_an_existing_attempt() {
    let ctx = test_support::setup_test_context().await;
    let tokens = tokens(&ctx);
    let quiz = test_support::insert_quiz(ctx.state.db(), ORG, true).await;

    let body = |started_at: &str| {
        json!({"quiz_id": quiz.id, "student_id": "student-1", "started_at": started_at})
    };

    let (status, created) = submit_as(&ctx, &tokens.teacher, body("2025-03-01T09:00:00Z")).await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    assert_eq!(created["started_at"], "2025-03-01T09:00:00Z");

    let (status, same) = submit_as(&ctx, &tokens.teacher, body("2025-03-01T09:00:00Z")).await;
    assert_eq!(status, StatusCode::OK, "response: {same}");
    assert_eq!(same["id"], created["id"]);

    let (status, moved) = submit_as(&ctx, &tokens.teacher, body("2025-03-01T10:00:00Z")).await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {moved}");

    let (status, stored) = send(
        &ctx,
        Method::GET,
        &format!("/api/v1/attempts/{}", created["id"].as_str().expect("id")),
        &tokens.teacher,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["started_at"], "2025-03-01T09:00:00Z");
}
