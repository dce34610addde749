//! Integration tests for accounts, course management, module reordering
//! and the public catalogue

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{
    authorization, bearer, create_course, create_module, csrf_for, csrf_header, register, spawn_app, PASSWORD,
};
use educa::models::UserRole;

#[tokio::test]
async fn test_anonymous_visitor_is_sent_to_login() {
    let app = spawn_app().await;

    let response = app.server.get("/course/mine/").await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/accounts/login/?next=%2Fcourse%2Fmine%2F");

    app.server
        .post("/module/order/")
        .json(&json!({}))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn test_register_then_login_and_logout() {
    let app = spawn_app().await;

    let response = app
        .server
        .post("/accounts/register/")
        .form(&[
            ("username", "bob"),
            ("email", "bob@example.com"),
            ("password", PASSWORD),
            ("password2", PASSWORD),
            ("instructor", "on"),
        ])
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/course/mine/");
    let cookie = response.header("set-cookie").to_str().unwrap().to_string();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));

    let bad = app
        .server
        .post("/accounts/login/")
        .form(&[("username", "bob"), ("password", "wrong-password")])
        .await;
    bad.assert_status_bad_request();
    assert!(bad.text().contains("Please enter a correct username and password."));

    let response = app
        .server
        .post("/accounts/login/")
        .form(&[("username", "bob"), ("password", PASSWORD), ("next", "/course/create/")])
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/course/create/");

    let session = response.header("set-cookie").to_str().unwrap().to_string();
    let pair = session.split(';').next().unwrap().to_string();
    let page = app
        .server
        .get("/course/mine/")
        .add_header(axum::http::header::COOKIE, pair.clone())
        .await;
    page.assert_status_ok();
    assert!(page.text().contains("bob"));

    app.server
        .post("/accounts/logout/")
        .add_header(axum::http::header::COOKIE, pair.clone())
        .await
        .assert_status(StatusCode::SEE_OTHER);
    app.server
        .get("/course/mine/")
        .add_header(axum::http::header::COOKIE, pair)
        .await
        .assert_status(StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_register_password_mismatch() {
    let app = spawn_app().await;

    let response = app
        .server
        .post("/accounts/register/")
        .form(&[
            ("username", "bob"),
            ("email", "bob@example.com"),
            ("password", PASSWORD),
            ("password2", "something-else"),
        ])
        .await;
    response.assert_status_bad_request();
    assert!(app.state.user_service.login("bob", PASSWORD).await.is_err());
}

#[tokio::test]
async fn test_course_create_edit_and_delete() {
    let app = spawn_app().await;
    let (owner, token) = register(&app.state, "alice", UserRole::Instructor).await;
    let subject_id = app.subject.id.to_string();

    let invalid = app
        .server
        .post("/course/create/")
        .add_header(authorization(), bearer(&token))
        .form(&[("subject_id", subject_id.as_str()), ("title", ""), ("slug", "bad slug"), ("overview", "x")])
        .await;
    invalid.assert_status_bad_request();
    assert!(invalid.text().contains("This field is required."));

    let created = app
        .server
        .post("/course/create/")
        .add_header(authorization(), bearer(&token))
        .form(&[
            ("subject_id", subject_id.as_str()),
            ("title", "Linear algebra"),
            ("slug", "linear-algebra"),
            ("overview", "Vectors and matrices"),
        ])
        .await;
    created.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(created.header("location"), "/course/mine/");

    let courses = app.state.course_service.list_owned(&owner).await.unwrap();
    assert_eq!(courses.len(), 1);
    let course = &courses[0];
    assert_eq!(course.owner_id, owner.id);

    app.server
        .post(&format!("/course/{}/edit/", course.id))
        .add_header(authorization(), bearer(&token))
        .form(&[
            ("subject_id", subject_id.as_str()),
            ("title", "Linear algebra II"),
            ("slug", "linear-algebra"),
            ("overview", "More matrices"),
        ])
        .await
        .assert_status(StatusCode::SEE_OTHER);
    let course = app.state.course_service.get_owned(course.id, owner.id).await.unwrap();
    assert_eq!(course.title, "Linear algebra II");

    let (_, other_token) = register(&app.state, "mallory", UserRole::Instructor).await;
    app.server
        .post(&format!("/course/{}/delete/", course.id))
        .add_header(authorization(), bearer(&other_token))
        .await
        .assert_status_not_found();

    app.server
        .post(&format!("/course/{}/delete/", course.id))
        .add_header(authorization(), bearer(&token))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    assert!(app.state.course_service.list_owned(&owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_student_cannot_create_course() {
    let app = spawn_app().await;
    let (_, token) = register(&app.state, "sam", UserRole::Student).await;

    app.server
        .get("/course/create/")
        .add_header(authorization(), bearer(&token))
        .await
        .assert_status_forbidden();
}

#[tokio::test]
async fn test_module_formset_creates_rows_in_order() {
    let app = spawn_app().await;
    let (owner, token) = register(&app.state, "alice", UserRole::Instructor).await;
    let course = create_course(&app, &owner, "algebra").await;

    let page = app
        .server
        .get(&format!("/course/{}/module/", course.id))
        .add_header(authorization(), bearer(&token))
        .await;
    page.assert_status_ok();
    assert!(page.text().contains("form-TOTAL_FORMS"));

    app.server
        .post(&format!("/course/{}/module/", course.id))
        .add_header(authorization(), bearer(&token))
        .form(&[
            ("form-TOTAL_FORMS", "2"),
            ("form-0-title", "Intro"),
            ("form-0-description", ""),
            ("form-1-title", "Vectors"),
            ("form-1-description", "Arrows"),
        ])
        .await
        .assert_status(StatusCode::SEE_OTHER);

    let (_, modules) = app.state.module_service.list(course.id, owner.id).await.unwrap();
    let rows: Vec<(&str, i32)> = modules.iter().map(|m| (m.title.as_str(), m.order)).collect();
    assert_eq!(rows, vec![("Intro", 0), ("Vectors", 1)]);

    let tampered = app
        .server
        .post(&format!("/course/{}/module/", course.id))
        .add_header(authorization(), bearer(&token))
        .form(&[("form-0-title", "Orphan")])
        .await;
    tampered.assert_status_bad_request();
    assert!(tampered.text().contains("ManagementForm data is missing or has been tampered with."));
}

#[tokio::test]
async fn test_module_reorder_swaps_positions() {
    let app = spawn_app().await;
    let (owner, token) = register(&app.state, "alice", UserRole::Instructor).await;
    let course = create_course(&app, &owner, "algebra").await;
    let first = create_module(&app, &owner, &course, "First").await;
    let second = create_module(&app, &owner, &course, "Second").await;
    assert_eq!((first.order, second.order), (0, 1));

    let response = app
        .server
        .post("/module/order/")
        .add_header(authorization(), bearer(&token))
        .add_header(csrf_header(), csrf_for(&app, &token))
        .json(&json!({ first.id.to_string(): 1, second.id.to_string(): 0 }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!({ "saved": "OK" }));

    let (_, modules) = app.state.module_service.list(course.id, owner.id).await.unwrap();
    let titles: Vec<&str> = modules.iter().map(|m| m.title.as_str()).collect();
    assert_eq!(titles, vec!["Second", "First"]);
}

#[tokio::test]
async fn test_module_reorder_requires_csrf_token() {
    let app = spawn_app().await;
    let (owner, token) = register(&app.state, "alice", UserRole::Instructor).await;
    let course = create_course(&app, &owner, "algebra").await;
    let module = create_module(&app, &owner, &course, "First").await;

    app.server
        .post("/module/order/")
        .add_header(authorization(), bearer(&token))
        .json(&json!({ module.id.to_string(): 5 }))
        .await
        .assert_status_forbidden();

    app.server
        .post("/module/order/")
        .add_header(authorization(), bearer(&token))
        .add_header(csrf_header(), "deadbeef".to_string())
        .json(&json!({ module.id.to_string(): 5 }))
        .await
        .assert_status_forbidden();

    let module = app.state.module_service.get_owned(module.id, owner.id).await.unwrap();
    assert_eq!(module.order, 0);
}

#[tokio::test]
async fn test_module_reorder_skips_foreign_modules() {
    let app = spawn_app().await;
    let (owner, _) = register(&app.state, "alice", UserRole::Instructor).await;
    let (intruder, intruder_token) = register(&app.state, "mallory", UserRole::Instructor).await;
    let course = create_course(&app, &owner, "algebra").await;
    let theirs = create_module(&app, &owner, &course, "Theirs").await;
    let own_course = create_course(&app, &intruder, "geometry").await;
    let own = create_module(&app, &intruder, &own_course, "Own").await;

    app.server
        .post("/module/order/")
        .add_header(authorization(), bearer(&intruder_token))
        .add_header(csrf_header(), csrf_for(&app, &intruder_token))
        .json(&json!({ theirs.id.to_string(): 9, own.id.to_string(): 3, "not-a-number": 1 }))
        .await
        .assert_status_ok();

    let theirs = app.state.module_service.get_owned(theirs.id, owner.id).await.unwrap();
    let own = app.state.module_service.get_owned(own.id, intruder.id).await.unwrap();
    assert_eq!(theirs.order, 0);
    assert_eq!(own.order, 3);
}

#[tokio::test]
async fn test_catalogue_detail_and_enrollment() {
    let app = spawn_app().await;
    let (owner, _) = register(&app.state, "alice", UserRole::Instructor).await;
    let (_, student_token) = register(&app.state, "sam", UserRole::Student).await;
    let course = create_course(&app, &owner, "algebra").await;
    create_module(&app, &owner, &course, "Basics").await;

    let catalogue = app.server.get("/").await;
    catalogue.assert_status_ok();
    assert!(catalogue.text().contains("Course algebra"));

    let by_subject = app.server.get("/subject/mathematics/").await;
    by_subject.assert_status_ok();
    assert!(by_subject.text().contains("Course algebra"));
    app.server.get("/subject/unknown/").await.assert_status_not_found();

    let detail = app.server.get("/course/algebra/").await;
    detail.assert_status_ok();
    assert!(detail.text().contains("Basics"));

    let response = app
        .server
        .post(&format!("/course/{}/enroll/", course.id))
        .add_header(authorization(), bearer(&student_token))
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/course/algebra/");

    let detail = app
        .server
        .get("/course/algebra/")
        .add_header(authorization(), bearer(&student_token))
        .await;
    assert!(detail.text().contains("You are enrolled in this course."));

    let enrolled = app
        .server
        .get("/students/courses/")
        .add_header(authorization(), bearer(&student_token))
        .await;
    enrolled.assert_status_ok();
    assert!(enrolled.text().contains("Course algebra"));
}

#[tokio::test]
async fn test_unknown_route_renders_not_found_page() {
    let app = spawn_app().await;

    let response = app.server.get("/no/such/page/").await;
    response.assert_status_not_found();
    assert!(response.text().contains("Educa"));
}
