//! REST API tests: boots the server on a random port and drives the full
//! register → login → assign → complete flow over HTTP.

use std::sync::Arc;

use serde_json::{json, Value};
use taskd::config::DaemonConfig;
use taskd::{rest, AppContext};
use tempfile::TempDir;

async fn spawn_server(dir: &TempDir) -> (Arc<AppContext>, String) {
    let config = Arc::new(DaemonConfig::new(
        Some(0),
        Some(dir.path().to_path_buf()),
        Some("error".to_string()),
        None,
    ));
    let ctx = Arc::new(AppContext::init(config).await.unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = rest::build_router(ctx.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (ctx, format!("http://{addr}"))
}

async fn register(base: &str, client: &reqwest::Client, username: &str, role: Option<&str>) {
    let mut body = json!({
        "username": username,
        "email": format!("{username}@example.com"),
        "password": "Sup3r!secret",
        "securityQuestion": "favorite color?",
        "answer": "teal",
    });
    if let Some(r) = role {
        body["role"] = json!(r);
    }
    let resp = client
        .post(format!("{base}/api/v1/auth/register"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

async fn login(base: &str, client: &reqwest::Client, username: &str) -> String {
    let resp = client
        .post(format!("{base}/api/v1/auth/login"))
        .json(&json!({ "username": username, "password": "Sup3r!secret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

fn due_tomorrow() -> i64 {
    chrono::Utc::now().timestamp() + 24 * 3_600
}

#[tokio::test]
async fn health_reports_ok() {
    let dir = TempDir::new().unwrap();
    let (_ctx, base) = spawn_server(&dir).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/v1/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn requests_without_a_token_are_rejected() {
    let dir = TempDir::new().unwrap();
    let (_ctx, base) = spawn_server(&dir).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/v1/me/tasks"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn full_assignment_flow_over_http() {
    let dir = TempDir::new().unwrap();
    let (_ctx, base) = spawn_server(&dir).await;
    let client = reqwest::Client::new();

    register(&base, &client, "admin001", Some("Admin")).await;
    register(&base, &client, "worker01", None).await;
    let admin_token = login(&base, &client, "admin001").await;
    let user_token = login(&base, &client, "worker01").await;

    // Look up the worker's id through the admin user search.
    let resp = client
        .get(format!("{base}/api/v1/admin/users?search=worker01"))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["count"], 1);
    let worker_id = body["users"][0]["id"].as_str().unwrap().to_string();
    // Hashes never appear on the wire.
    assert!(body["users"][0].get("passwordHash").is_none());

    // A non-admin cannot create tasks.
    let task_body = json!({
        "title": "file expenses",
        "assignedTo": worker_id,
        "dueDate": due_tomorrow(),
    });
    let resp = client
        .post(format!("{base}/api/v1/tasks"))
        .bearer_auth(&user_token)
        .json(&task_body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // The admin can; a past due date is refused first.
    let resp = client
        .post(format!("{base}/api/v1/tasks"))
        .bearer_auth(&admin_token)
        .json(&json!({
            "title": "file expenses",
            "assignedTo": worker_id,
            "dueDate": chrono::Utc::now().timestamp() - 86_400,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/api/v1/tasks"))
        .bearer_auth(&admin_token)
        .json(&task_body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let task: Value = resp.json().await.unwrap();
    let task_id = task["id"].as_str().unwrap().to_string();
    assert_eq!(task["status"], "Todo");
    assert_eq!(task["locked"], false);

    // The assignee sees and completes it.
    let resp = client
        .get(format!("{base}/api/v1/me/tasks"))
        .bearer_auth(&user_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["count"], 1);

    let resp = client
        .post(format!("{base}/api/v1/tasks/{task_id}/complete"))
        .bearer_auth(&user_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{base}/api/v1/admin/dashboard"))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    let stats: Value = resp.json().await.unwrap();
    assert_eq!(stats["totalTasks"], 1);
    assert_eq!(stats["completedTasks"], 1);
    assert_eq!(stats["totalUsers"], 1);
}

#[tokio::test]
async fn locked_task_rejections_surface_as_403_over_http() {
    let dir = TempDir::new().unwrap();
    let (ctx, base) = spawn_server(&dir).await;
    let client = reqwest::Client::new();

    register(&base, &client, "admin001", Some("Admin")).await;
    register(&base, &client, "worker01", None).await;
    let admin_token = login(&base, &client, "admin001").await;
    let user_token = login(&base, &client, "worker01").await;

    let resp = client
        .get(format!("{base}/api/v1/admin/users?search=worker01"))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let worker_id = body["users"][0]["id"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{base}/api/v1/tasks"))
        .bearer_auth(&admin_token)
        .json(&json!({
            "title": "overdue soon",
            "assignedTo": worker_id,
            "dueDate": due_tomorrow(),
        }))
        .send()
        .await
        .unwrap();
    let task: Value = resp.json().await.unwrap();
    let task_id = task["id"].as_str().unwrap().to_string();

    sqlx::query("UPDATE tasks SET due_date = 1 WHERE id = ?")
        .bind(&task_id)
        .execute(&ctx.storage.pool())
        .await
        .unwrap();

    let resp = client
        .post(format!("{base}/api/v1/tasks/{task_id}/complete"))
        .bearer_auth(&user_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);

    // Admin unlock clears the way.
    let resp = client
        .post(format!("{base}/api/v1/tasks/{task_id}/unlock"))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{base}/api/v1/tasks/{task_id}/complete"))
        .bearer_auth(&user_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}
