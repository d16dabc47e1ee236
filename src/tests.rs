//! Integration tests for the OAI-PMH explore backend.

use std::sync::Arc;

use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::search::{OrderField, PaginationBackend};
use crate::{create_router, AppState};

const API_KEY: &str = "test-api-key";

fn test_config(temp_dir: &TempDir, psk: Option<String>) -> Config {
    Config {
        api_psk: psk,
        db_path: temp_dir.path().join("test.sqlite"),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "warn".to_string(),
        log_json: false,
        server_uri: "http://testserver".to_string(),
        results_per_page: 10,
        pagination: PaginationBackend::StoreNative,
        sorting_fields: vec![OrderField::asc("title")],
        linked_records_enabled: false,
        anonymous_record_access: true,
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    repo: Arc<Repository>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    async fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = test_config(&temp_dir, Some(API_KEY.to_string()));
        customize(&mut config);

        // Initialize database
        let pool = init_database(&config.db_path)
            .await
            .expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        let psk = config.api_psk.clone();
        let state = AppState {
            repo: repo.clone(),
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            repo,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/explore/oaipmh{}", self.base_url, path)
    }

    async fn execute_query(&self, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(self.url("/rest/execute-query"))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn update_data_sources(&self, user: Option<&str>, params: &[(&str, String)]) -> u16 {
        let mut request = self
            .client
            .get(self.url("/update_data_sources"))
            .query(params);
        if let Some(user) = user {
            request = request.header("x-user-id", user);
        }
        request.send().await.unwrap().status().as_u16()
    }
}

/// Ids of the seeded data.
struct Seed {
    alpha: i64,
    beta: i64,
    closed: i64,
    template: i64,
    alpha_record: i64,
}

/// Two activated registries and one deactivated one, with records in each.
async fn seed(repo: &Repository) -> Seed {
    let alpha = repo.insert_registry("Alpha", true).await;
    let beta = repo.insert_registry("Beta", true).await;
    let closed = repo.insert_registry("Closed", false).await;
    let template = repo.insert_template("Dublin Core", "tpl-hash").await;

    let alpha_format = repo
        .insert_metadata_format(alpha, "oai_dc", Some(template))
        .await;
    let beta_format = repo.insert_metadata_format(beta, "oai_dc", None).await;
    let closed_format = repo
        .insert_metadata_format(closed, "oai_dc", Some(template))
        .await;

    let test1 = json!({"field": {"subfield": "Test 1"}});
    let test2 = json!({"field": {"subfield": "Test 2"}});

    repo.insert_record(
        alpha_format,
        "oai:alpha:2",
        test1.clone(),
        false,
        Some("2024-05-01T12:00:00+02:00"),
    )
    .await;
    let alpha_record = repo
        .insert_record(alpha_format, "oai:alpha:1", test1.clone(), false, None)
        .await;
    repo.insert_record(alpha_format, "oai:alpha:3", test2, false, None)
        .await;
    repo.insert_record(alpha_format, "oai:alpha:deleted", test1.clone(), true, None)
        .await;
    repo.insert_record(beta_format, "oai:beta:1", test1.clone(), false, None)
        .await;
    repo.insert_record(closed_format, "oai:closed:1", test1, false, None)
        .await;

    Seed {
        alpha,
        beta,
        closed,
        template,
        alpha_record,
    }
}

fn titles(body: &Value) -> Vec<String> {
    body["data"]["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["title"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(format!("{}/health", fixture.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .post(fixture.url("/rest/execute-query"))
        .json(&json!({"query": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    // Bearer token is accepted as well
    let resp = Client::new()
        .get(fixture.url("/rest/execute-query"))
        .query(&[("query", "{}")])
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_router_without_psk() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir, None);
    let pool = init_database(&config.db_path).await.unwrap();
    let state = AppState {
        repo: Arc::new(Repository::new(pool)),
        config: Arc::new(config),
    };

    let response = create_router(state)
        .oneshot(
            Request::builder()
                .uri("/explore/oaipmh/rest/execute-query?query=%7B%7D")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_execute_query_end_to_end() {
    let fixture = TestFixture::new().await;
    seed(&fixture.repo).await;

    let (status, body) = fixture
        .execute_query(json!({"query": {"field.subfield": "Test 1"}}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["count"], 3);
    assert_eq!(
        titles(&body),
        vec!["oai:alpha:1", "oai:alpha:2", "oai:beta:1"]
    );

    let first = &body["data"]["results"][1];
    assert!(first["content"]
        .as_str()
        .unwrap()
        .contains("<identifier>oai:alpha:2</identifier>"));
    assert_eq!(first["templateInfo"]["name"], "oai_dc (Alpha)");
    assert_eq!(first["templateInfo"]["hash"], "hash-oai_dc");
    assert_eq!(first["lastModificationDate"], "2024-05-01T10:00:00Z");
    assert!(first["detailUrl"]
        .as_str()
        .unwrap()
        .starts_with("http://testserver/explore/oaipmh/data?id="));
}

#[tokio::test]
async fn test_execute_query_get_with_string_parameters() {
    let fixture = TestFixture::new().await;
    let seed = seed(&fixture.repo).await;

    let resp = fixture
        .client
        .get(fixture.url("/rest/execute-query"))
        .query(&[
            ("query", r#"{"field.subfield": "Test 1"}"#.to_string()),
            ("options", json!({"instance_id": seed.beta.to_string()}).to_string()),
            ("format", "json".to_string()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(titles(&body), vec!["oai:beta:1"]);
    assert_eq!(
        body["data"]["results"][0]["content"],
        json!({"field": {"subfield": "Test 1"}})
    );
}

#[tokio::test]
async fn test_execute_query_form_post() {
    let fixture = TestFixture::new().await;
    seed(&fixture.repo).await;

    let resp = fixture
        .client
        .post(fixture.url("/rest/execute-query"))
        .form(&[
            ("query", r#"{"field.subfield": "Test 1"}"#),
            ("order_by_field", "-title"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["count"], 3);
    assert_eq!(
        titles(&body),
        vec!["oai:beta:1", "oai:alpha:2", "oai:alpha:1"]
    );

    let resp = fixture
        .client
        .post(fixture.url("/rest/execute-query"))
        .form(&[("page", "1")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_execute_query_invalid_sort_field() {
    let fixture = TestFixture::new().await;
    seed(&fixture.repo).await;

    let (status, body) = fixture
        .execute_query(json!({"query": {}, "order_by_field": "a..b"}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_execute_query_missing_query() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.execute_query(json!({"page": 1})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(
        body["error"]["message"],
        "Query should be passed in parameter"
    );

    let (status, _) = fixture
        .execute_query(json!({"query": {"a": {"$regex": "x"}}}))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_execute_query_template_filter() {
    let fixture = TestFixture::new().await;
    let seed = seed(&fixture.repo).await;

    let (status, body) = fixture
        .execute_query(json!({
            "query": {},
            "templates": [{"id": seed.template}],
            "order_by_field": "-title",
        }))
        .await;
    assert_eq!(status, 200);
    // The deactivated registry shares the template but stays out of scope.
    assert_eq!(
        titles(&body),
        vec!["oai:alpha:3", "oai:alpha:2", "oai:alpha:1"]
    );

    // A registry outside the current scope yields nothing, not an error.
    let (status, body) = fixture
        .execute_query(json!({
            "query": {},
            "options": {"instance_id": seed.closed},
        }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["count"], 0);
}

#[tokio::test]
async fn test_pagination_backends_agree() {
    for backend in [PaginationBackend::InMemory, PaginationBackend::StoreNative] {
        let fixture = TestFixture::with_config(|config| config.pagination = backend).await;
        seed(&fixture.repo).await;

        let mut seen = Vec::new();
        for page in 1..=3 {
            let (status, body) = fixture
                .execute_query(json!({"query": {}, "page": page, "page_size": 2}))
                .await;
            assert_eq!(status, 200);
            assert_eq!(body["data"]["count"], 4);
            assert_eq!(body["data"]["numPages"], 2);
            assert_eq!(body["data"]["hasNext"], page < 2);
            assert_eq!(body["data"]["hasPrevious"], page > 1);
            seen.extend(titles(&body));
        }

        assert_eq!(
            seen,
            vec!["oai:alpha:1", "oai:alpha:2", "oai:alpha:3", "oai:beta:1"],
            "backend {:?}",
            backend
        );
    }
}

#[tokio::test]
async fn test_update_data_sources_add_and_remove() {
    let fixture = TestFixture::new().await;
    let seed = seed(&fixture.repo).await;
    let query_id = fixture.repo.insert_query("alice", &[]).await;

    let add = [
        ("id_query", query_id.to_string()),
        ("id_instance", seed.alpha.to_string()),
        ("to_be_added", "true".to_string()),
    ];
    assert_eq!(fixture.update_data_sources(Some("alice"), &add).await, 200);
    assert_eq!(fixture.update_data_sources(Some("alice"), &add).await, 200);

    let query = fixture.repo.get_query(query_id).await.unwrap().unwrap();
    assert_eq!(query.data_sources.len(), 1);
    let source = &query.data_sources[0];
    assert_eq!(source.name, "Alpha");
    assert_eq!(source.instance_id(), Some(seed.alpha.to_string()));
    assert_eq!(
        source.url_query,
        "http://testserver/explore/oaipmh/rest/execute-query"
    );
    assert_eq!(source.order_by_field, "+title");

    let html = fixture
        .client
        .get(fixture.url("/get_data_sources"))
        .query(&[("id_query", query_id.to_string())])
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains(&format!("value=\"{}\" checked>", seed.alpha)));
    assert!(html.contains(&format!("value=\"{}\">", seed.beta)));
    assert!(!html.contains("Closed"));

    let remove = [
        ("id_query", query_id.to_string()),
        ("id_instance", seed.alpha.to_string()),
        ("to_be_added", "false".to_string()),
    ];
    assert_eq!(fixture.update_data_sources(Some("alice"), &remove).await, 200);
    assert_eq!(fixture.update_data_sources(Some("alice"), &remove).await, 200);

    let query = fixture.repo.get_query(query_id).await.unwrap().unwrap();
    assert!(query.data_sources.is_empty());
}

#[tokio::test]
async fn test_update_data_sources_errors() {
    let fixture = TestFixture::new().await;
    let seed = seed(&fixture.repo).await;
    let query_id = fixture.repo.insert_query("alice", &[]).await;

    let add = [
        ("id_query", query_id.to_string()),
        ("id_instance", seed.alpha.to_string()),
        ("to_be_added", "true".to_string()),
    ];
    assert_eq!(fixture.update_data_sources(Some("bob"), &add).await, 403);
    assert_eq!(fixture.update_data_sources(None, &add).await, 403);

    let missing_query = [("id_instance", seed.alpha.to_string())];
    assert_eq!(
        fixture.update_data_sources(Some("alice"), &missing_query).await,
        400
    );

    let unknown_registry = [
        ("id_query", query_id.to_string()),
        ("id_instance", "999".to_string()),
        ("to_be_added", "true".to_string()),
    ];
    assert_eq!(
        fixture.update_data_sources(Some("alice"), &unknown_registry).await,
        400
    );

    let unknown_query = [
        ("id_query", (query_id + 1).to_string()),
        ("id_instance", seed.alpha.to_string()),
        ("to_be_added", "true".to_string()),
    ];
    assert_eq!(
        fixture.update_data_sources(Some("alice"), &unknown_query).await,
        400
    );

    let query = fixture.repo.get_query(query_id).await.unwrap().unwrap();
    assert!(query.data_sources.is_empty());

    // Superusers may edit any query
    let resp = fixture
        .client
        .get(fixture.url("/update_data_sources"))
        .query(&add)
        .header("x-user-id", "root")
        .header("x-user-superuser", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .client
        .get(fixture.url("/get_data_sources"))
        .query(&[("id_query", query_id.to_string())])
        .header("x-user-id", "bob")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_get_result() {
    let fixture = TestFixture::new().await;
    let seed = seed(&fixture.repo).await;

    let resp = fixture
        .client
        .get(fixture.url("/rest/result"))
        .query(&[("id", seed.alpha_record.to_string())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["title"], "oai:alpha:1");
    assert_eq!(body["data"]["templateInfo"]["id"], seed.template);

    let resp = fixture
        .client
        .get(fixture.url("/rest/result"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .client
        .get(fixture.url("/rest/result"))
        .query(&[("id", "999")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_data_detail_page() {
    let fixture = TestFixture::new().await;
    let seed = seed(&fixture.repo).await;

    let resp = fixture
        .client
        .get(fixture.url("/data"))
        .query(&[("id", seed.alpha_record.to_string())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let html = resp.text().await.unwrap();
    assert!(html.contains("<h1>oai:alpha:1</h1>"));
    assert!(html.contains("&lt;identifier&gt;oai:alpha:1&lt;/identifier&gt;"));
    assert!(html.contains("oai_dc (Alpha)"));

    let resp = fixture
        .client
        .get(fixture.url("/data"))
        .query(&[("id", "999")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .client
        .get(fixture.url("/data"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_anonymous_record_access_disabled() {
    let fixture =
        TestFixture::with_config(|config| config.anonymous_record_access = false).await;
    let seed = seed(&fixture.repo).await;
    let id = seed.alpha_record.to_string();

    let resp = fixture
        .client
        .get(fixture.url("/data"))
        .query(&[("id", id.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert!(resp.text().await.unwrap().contains("Access Forbidden"));

    let resp = fixture
        .client
        .get(fixture.url("/rest/result"))
        .query(&[("id", id.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .client
        .get(fixture.url("/rest/result"))
        .query(&[("id", id.as_str())])
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}
