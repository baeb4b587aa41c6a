use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, router, MockState, Store, HIERARCHY_FORWARD, HIERARCHY_REVERSE};
use serde_json::{json, Value};
use tower::ServiceExt;

const API: &str = "/DefaultCollection/_apis/wit";

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<String> {
    Request::builder()
        .uri(uri)
        .header(http::header::HOST, "tfs.test")
        .body(String::new())
        .unwrap()
}

fn patch_request(method: &str, uri: &str, body: Value) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::HOST, "tfs.test")
        .header(http::header::CONTENT_TYPE, "application/json-patch+json")
        .body(body.to_string())
        .unwrap()
}

fn seeded() -> Router {
    router(MockState::new(
        Store::default()
            .with_item("Feature", "Parent")
            .with_item("Task", "Child")
            .with_item("Bug", "Defect")
            .with_query("Shared Queries/Bugs", "SELECT [System.Id] FROM WorkItems WHERE [System.WorkItemType] = 'Bug'"),
    ))
}

// --- fetch ---

#[tokio::test]
async fn get_missing_item_returns_404() {
    let resp = app().oneshot(get(&format!("{API}/workitems/1"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert!(body["message"].as_str().unwrap().contains("does not exist"));
}

#[tokio::test]
async fn get_item_renders_urls_from_host() {
    let resp = seeded()
        .oneshot(get(&format!("{API}/workitems/2?$expand=relations&api-version=5.0")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["id"], 2);
    assert_eq!(body["fields"]["System.WorkItemType"], "Task");
    assert_eq!(body["url"], "http://tfs.test/DefaultCollection/_apis/wit/workItems/2");
}

#[tokio::test]
async fn non_numeric_id_is_bad_request() {
    let resp = seeded().oneshot(get(&format!("{API}/workitems/abc"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_omits_missing_ids() {
    let resp = seeded()
        .oneshot(get(&format!("{API}/workitems?ids=3,99,1&errorPolicy=omit")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["value"][0]["id"], 3);
    assert!(body["value"][1].is_null());
    assert_eq!(body["value"][2]["id"], 1);
}

#[tokio::test]
async fn batch_without_omit_fails_on_missing_id() {
    let resp = seeded()
        .oneshot(get(&format!("{API}/workitems?ids=1,99")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- create ---

#[tokio::test]
async fn create_requires_title() {
    let resp = app()
        .oneshot(patch_request(
            "POST",
            &format!("{API}/workitems/$Bug"),
            json!([{"op": "add", "path": "/fields/System.Description", "value": "x"}]),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_unknown_type_returns_404() {
    let resp = app()
        .oneshot(patch_request(
            "POST",
            &format!("{API}/workitems/$Spaceship"),
            json!([{"op": "add", "path": "/fields/System.Title", "value": "x"}]),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_assigns_next_id_and_type() {
    let resp = seeded()
        .oneshot(patch_request(
            "POST",
            &format!("{API}/workitems/$User%20Story?suppressNotifications=true"),
            json!([{"op": "add", "path": "/fields/System.Title", "value": "Story"}]),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["id"], 4);
    assert_eq!(body["rev"], 1);
    assert_eq!(body["fields"]["System.WorkItemType"], "User Story");
    assert_eq!(body["fields"]["System.Title"], "Story");
}

// --- update ---

#[tokio::test]
async fn patch_sets_fields_and_bumps_rev() {
    let resp = seeded()
        .oneshot(patch_request(
            "PATCH",
            &format!("{API}/workitems/1"),
            json!([{"op": "add", "path": "/fields/System.Title", "value": "Renamed"}]),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["fields"]["System.Title"], "Renamed");
    assert_eq!(body["rev"], 2);
}

#[tokio::test]
async fn child_link_is_visible_from_both_ends() {
    let app = seeded();
    let resp = app
        .clone()
        .oneshot(patch_request(
            "PATCH",
            &format!("{API}/workitems/1"),
            json!([{"op": "add", "path": "/relations/-", "value": {
                "rel": HIERARCHY_FORWARD,
                "url": "http://tfs.test/DefaultCollection/_apis/wit/workItems/2"
            }}]),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let parent = body_json(resp).await;
    assert_eq!(parent["relations"][0]["rel"], HIERARCHY_FORWARD);

    let child = body_json(app.oneshot(get(&format!("{API}/workitems/2"))).await.unwrap()).await;
    assert_eq!(child["relations"][0]["rel"], HIERARCHY_REVERSE);
    assert_eq!(
        child["relations"][0]["url"],
        "http://tfs.test/DefaultCollection/_apis/wit/workItems/1"
    );
}

#[tokio::test]
async fn patch_missing_item_returns_404() {
    let resp = seeded()
        .oneshot(patch_request(
            "PATCH",
            &format!("{API}/workitems/42"),
            json!([{"op": "add", "path": "/fields/System.Title", "value": "x"}]),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- queries ---

#[tokio::test]
async fn stored_query_resolves_by_path_then_runs() {
    let app = seeded();
    let resp = app
        .clone()
        .oneshot(get(&format!("{API}/queries/Shared%20Queries/Bugs")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let query = body_json(resp).await;
    assert_eq!(query["name"], "Bugs");
    let id = query["id"].as_str().unwrap().to_string();

    let result = body_json(app.oneshot(get(&format!("{API}/wiql/{id}"))).await.unwrap()).await;
    assert_eq!(result["queryType"], "flat");
    assert_eq!(result["workItems"], json!([{
        "id": 3, "url": "http://tfs.test/DefaultCollection/_apis/wit/workItems/3"
    }]));
}

#[tokio::test]
async fn query_folder_is_flagged() {
    let resp = seeded()
        .oneshot(get(&format!("{API}/queries/Shared%20Queries")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let folder = body_json(resp).await;
    assert_eq!(folder["isFolder"], true);
    assert_eq!(folder["name"], "Shared Queries");
}

#[tokio::test]
async fn unknown_query_returns_404() {
    let resp = seeded()
        .oneshot(get(&format!("{API}/queries/Shared%20Queries/Nope")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wiql_honors_top() {
    let request = Request::builder()
        .method("POST")
        .uri(format!("{API}/wiql?%24top=2&api-version=5.0"))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(json!({"query": "SELECT [System.Id] FROM WorkItems"}).to_string())
        .unwrap();
    let body = body_json(seeded().oneshot(request).await.unwrap()).await;
    let ids: Vec<i64> = body["workItems"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2]);
}

// --- auth ---

#[tokio::test]
async fn credentials_are_enforced() {
    let app = router(MockState::new(Store::default().with_item("Task", "probe")).with_credentials("alice", "secret"));

    let resp = app.clone().oneshot(get(&format!("{API}/workitems/1"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let authorized = Request::builder()
        .uri(format!("{API}/workitems/1"))
        .header(http::header::AUTHORIZATION, "Basic YWxpY2U6c2VjcmV0")
        .body(String::new())
        .unwrap();
    let resp = app.oneshot(authorized).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
