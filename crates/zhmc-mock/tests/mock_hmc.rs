//! Behavior of the faked HMC through its connection interface.

use serde_json::{Value, json};

use zhmc_core::{ApiRequest, HmcConnection, PropertyMap, Secret};
use zhmc_mock::{MockHmc, MockHmcDefinition};

fn props(value: Value) -> PropertyMap {
    value.as_object().cloned().unwrap()
}

async fn logon(hmc: &MockHmc) -> Secret {
    let conn = hmc.connection();
    let request = ApiRequest::post(
        "/api/sessions",
        Some(json!({"userid": "user", "password": "pw"})),
    );
    let response = conn.execute(request).await.unwrap();
    assert_eq!(response.status, 200);
    let body = response.json().unwrap();
    Secret::new(body["api-session"].as_str().unwrap())
}

#[tokio::test]
async fn version_endpoint_needs_no_session() {
    let hmc = MockHmc::new("mock1", "2.16.0", (4, 10));
    let conn = hmc.connection();
    let response = conn.execute(ApiRequest::get("/api/version")).await.unwrap();
    assert_eq!(response.status, 200);
    let body = response.json().unwrap();
    assert_eq!(body["api-major-version"], json!(4));
    assert_eq!(body["hmc-version"], json!("2.16.0"));
}

#[tokio::test]
async fn authenticated_request_without_token_is_403_5() {
    let hmc = MockHmc::new("mock1", "2.16.0", (4, 10));
    let conn = hmc.connection();
    let response = conn.execute(ApiRequest::get("/api/cpcs")).await.unwrap();
    assert_eq!(response.status, 403);
    assert_eq!(response.json().unwrap()["reason"], json!(5));
}

#[tokio::test]
async fn wrong_credentials_are_rejected() {
    let hmc = MockHmc::new("mock1", "2.16.0", (4, 10));
    hmc.set_credentials("user", "right");
    let conn = hmc.connection();
    let request = ApiRequest::post(
        "/api/sessions",
        Some(json!({"userid": "user", "password": "wrong"})),
    );
    let response = conn.execute(request).await.unwrap();
    assert_eq!(response.status, 403);
}

#[tokio::test]
async fn logon_accepts_basic_auth_credentials() {
    let hmc = MockHmc::new("mock1", "2.16.0", (4, 10));
    hmc.set_credentials("user", "right");
    let conn = hmc.connection();

    // Basic-auth credentials carry the logon even without a body.
    let request =
        ApiRequest::post("/api/sessions", None).with_logon_auth("user", Secret::new("right"));
    let response = conn.execute(request).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.json().unwrap()["api-session"].is_string());

    // And are validated like body credentials.
    let request =
        ApiRequest::post("/api/sessions", None).with_logon_auth("user", Secret::new("wrong"));
    let response = conn.execute(request).await.unwrap();
    assert_eq!(response.status, 403);
}

#[tokio::test]
async fn notification_topics_are_reported_per_session() {
    let hmc = MockHmc::new("mock1", "2.16.0", (4, 10));
    let token = logon(&hmc).await;
    let conn = hmc.connection();
    let request = ApiRequest::get("/api/sessions/operations/get-notification-topics")
        .with_session_token(Some(token));
    let response = conn.execute(request).await.unwrap();
    assert_eq!(response.status, 200);
    let topics = response.json().unwrap();
    assert!(
        topics["topics"]
            .as_array()
            .unwrap()
            .iter()
            .any(|t| t["topic-type"] == json!("object-notification"))
    );
}

#[tokio::test]
async fn list_applies_server_side_regex_filters() {
    let hmc = MockHmc::new("mock1", "2.16.0", (4, 10));
    hmc.add_cpc("CPC1", PropertyMap::new());
    hmc.add_cpc("CPC2", PropertyMap::new());
    hmc.add_cpc("OTHER", PropertyMap::new());
    let token = logon(&hmc).await;
    let conn = hmc.connection();

    let request = ApiRequest::get("/api/cpcs?name=CPC.%2A").with_session_token(Some(token));
    let response = conn.execute(request).await.unwrap();
    let body = response.json().unwrap();
    let names: Vec<&str> = body["cpcs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["CPC1", "CPC2"]);
}

#[tokio::test]
async fn partition_start_enforces_preconditions_and_runs_a_job() {
    let hmc = MockHmc::new("mock1", "2.16.0", (4, 10));
    let cpc = hmc.add_cpc("CPC1", props(json!({"dpm-enabled": true})));
    let partition = hmc.add_partition(&cpc, "P1", PropertyMap::new());
    let token = logon(&hmc).await;
    let conn = hmc.connection();

    // Start from "stopped" is accepted and returns a job URI.
    let request = ApiRequest::post(&format!("{partition}/operations/start"), None)
        .with_session_token(Some(token.clone()));
    let response = conn.execute(request).await.unwrap();
    assert_eq!(response.status, 202);
    let job_uri = response.json().unwrap()["job-uri"]
        .as_str()
        .unwrap()
        .to_string();

    // The job completed immediately and the status changed.
    let request = ApiRequest::get(&job_uri).with_session_token(Some(token.clone()));
    let response = conn.execute(request).await.unwrap();
    assert_eq!(response.json().unwrap()["status"], json!("complete"));
    assert_eq!(
        hmc.resource_properties(&partition).unwrap()["status"],
        json!("active")
    );

    // A second start is rejected with 409.1.
    let request = ApiRequest::post(&format!("{partition}/operations/start"), None)
        .with_session_token(Some(token));
    let response = conn.execute(request).await.unwrap();
    assert_eq!(response.status, 409);
    assert_eq!(response.json().unwrap()["reason"], json!(1));
}

#[tokio::test]
async fn lpar_lifecycle_preconditions() {
    let hmc = MockHmc::new("mock1", "2.16.0", (4, 10));
    let cpc = hmc.add_cpc("CPC1", PropertyMap::new());
    let lpar = hmc.add_lpar(&cpc, "LP1", PropertyMap::new());
    let token = logon(&hmc).await;
    let conn = hmc.connection();

    // Load before activate is rejected.
    let request = ApiRequest::post(&format!("{lpar}/operations/load"), None)
        .with_session_token(Some(token.clone()));
    let response = conn.execute(request).await.unwrap();
    assert_eq!(response.status, 409);

    // Activate, then load.
    for op in ["activate", "load"] {
        let request = ApiRequest::post(&format!("{lpar}/operations/{op}"), None)
            .with_session_token(Some(token.clone()));
        let response = conn.execute(request).await.unwrap();
        assert_eq!(response.status, 202, "operation {op}");
    }
    assert_eq!(
        hmc.resource_properties(&lpar).unwrap()["status"],
        json!("operating")
    );
}

#[tokio::test]
async fn create_and_delete_partition_updates_the_store() {
    let hmc = MockHmc::new("mock1", "2.16.0", (4, 10));
    let cpc = hmc.add_cpc("CPC1", PropertyMap::new());
    let token = logon(&hmc).await;
    let conn = hmc.connection();

    let request = ApiRequest::post(
        &format!("{cpc}/partitions"),
        Some(json!({"name": "NEW1", "ifl-processors": 2})),
    )
    .with_session_token(Some(token.clone()));
    let response = conn.execute(request).await.unwrap();
    assert_eq!(response.status, 201);
    let uri = response.json().unwrap()["object-uri"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(hmc.resource_properties(&uri).is_some());

    // Duplicate names are rejected.
    let request = ApiRequest::post(&format!("{cpc}/partitions"), Some(json!({"name": "NEW1"})))
        .with_session_token(Some(token.clone()));
    let response = conn.execute(request).await.unwrap();
    assert_eq!(response.status, 400);

    let request = ApiRequest::delete(&uri).with_session_token(Some(token));
    let response = conn.execute(request).await.unwrap();
    assert_eq!(response.status, 204);
    assert!(hmc.resource_properties(&uri).is_none());
}

#[tokio::test]
async fn definition_yaml_round_trip() {
    let yaml = "\
hmc-name: mocked-z16
hmc-version: 2.16.0
api-major-version: 4
api-minor-version: 10
console:
  name: console1
  users:
    - name: apiuser
cpcs:
  - name: CPC1
    properties:
      dpm-enabled: true
    partitions:
      - name: P1
        properties:
          status: stopped
    adapters:
      - name: osa1
        properties:
          state: active
";
    let definition = MockHmcDefinition::from_yaml_str(yaml).unwrap();
    let hmc = definition.build();
    let token = logon(&hmc).await;
    let conn = hmc.connection();
    let request = ApiRequest::get("/api/cpcs").with_session_token(Some(token));
    let response = conn.execute(request).await.unwrap();
    assert_eq!(response.json().unwrap()["cpcs"].as_array().unwrap().len(), 1);

    let dumped = hmc.dump();
    assert_eq!(dumped.hmc_name, "mocked-z16");
    assert_eq!(dumped.cpcs.len(), 1);
    assert_eq!(dumped.cpcs[0].partitions.len(), 1);
    assert_eq!(dumped.cpcs[0].adapters.len(), 1);
    assert_eq!(dumped.console.as_ref().unwrap().users.len(), 1);

    // The dump parses back to the same tree shape.
    let reparsed = MockHmcDefinition::from_yaml_str(&dumped.to_yaml_string().unwrap()).unwrap();
    assert_eq!(reparsed.cpcs[0].name, "CPC1");
    assert_eq!(reparsed.cpcs[0].partitions[0].name, "P1");
}

#[tokio::test]
async fn unavailable_hmc_fails_connections() {
    let hmc = MockHmc::new("mock1", "2.16.0", (4, 10));
    hmc.set_available(false);
    let conn = hmc.connection();
    let err = conn.execute(ApiRequest::get("/api/version")).await.unwrap_err();
    assert!(err.is_connection());
}
