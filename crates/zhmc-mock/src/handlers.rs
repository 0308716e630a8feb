//! URI handler tree mirroring the HMC's REST surface.
//!
//! Requests arrive here with the session already validated (see
//! `MockConnection`). Handlers reproduce status codes, reason codes, the
//! 202/job flow, and the documented operation preconditions, and publish
//! the notifications a real HMC would.

use bytes::Bytes;
use serde_json::{Value, json};
use uuid::Uuid;

use zhmc_core::{ApiResponse, Method, PropertyMap, RequestBody, Secret};

use crate::hmc::{JOB_TOPIC, MockHmc, OBJECT_TOPIC};

/// Response of a handler, before serialization.
#[derive(Debug)]
pub(crate) struct MockResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl MockResponse {
    pub(crate) fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body: Some(body),
        }
    }

    fn created(body: Value) -> Self {
        Self {
            status: 201,
            body: Some(body),
        }
    }

    fn accepted(body: Option<Value>) -> Self {
        Self {
            status: 202,
            body,
        }
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }

    pub(crate) fn error(status: u16, reason: i64, message: &str) -> Self {
        Self {
            status,
            body: Some(json!({
                "http-status": status,
                "reason": reason,
                "message": message,
            })),
        }
    }

    pub(crate) fn into_api_response(self) -> ApiResponse {
        match self.body {
            Some(body) => ApiResponse {
                status: self.status,
                content_type: Some("application/json".to_string()),
                body: Bytes::from(serde_json::to_vec(&body).unwrap_or_default()),
            },
            None => ApiResponse {
                status: self.status,
                content_type: None,
                body: Bytes::new(),
            },
        }
    }
}

fn not_found(uri: &str) -> MockResponse {
    MockResponse::error(404, 1, &format!("Resource {uri} does not exist"))
}

fn json_body(body: Option<&RequestBody>) -> Option<Value> {
    match body {
        Some(RequestBody::Json(value)) => Some(value.clone()),
        _ => None,
    }
}

fn query_pairs(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Dispatch one request through the handler tree.
pub(crate) fn dispatch(
    hmc: &MockHmc,
    method: Method,
    path: &str,
    query: &str,
    body: Option<&RequestBody>,
) -> MockResponse {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let filters = query_pairs(query);
    let body_json = json_body(body);

    use Method::{Delete, Get, Post};
    match (method, segments.as_slice()) {
        (Get, ["api", "version"]) => version_info(hmc),
        // POST /api/sessions and DELETE /api/sessions/this-session are
        // handled by MockConnection, which owns the credentials and the
        // token.
        (Get, ["api", "sessions", "operations", "get-notification-topics"]) => {
            notification_topics()
        }

        (Get, ["api", "console"]) => get_object(hmc, "/api/console"),
        (Post, ["api", "console", "operations", "restart"]) => MockResponse::accepted(None),
        (Get, ["api", "console", "users"]) => list(hmc, "user", None, &filters, "users"),
        (Post, ["api", "console", "users"]) => create_user(hmc, body_json.as_ref()),

        (Get, ["api", "cpcs"]) => list(hmc, "cpc", None, &filters, "cpcs"),
        (Get, ["api", "cpcs", oid]) => get_object(hmc, &format!("/api/cpcs/{oid}")),
        (Post, ["api", "cpcs", oid]) => {
            update_object(hmc, &format!("/api/cpcs/{oid}"), body_json.as_ref())
        }
        (Get, ["api", "cpcs", oid, "partitions"]) => {
            let cpc_uri = format!("/api/cpcs/{oid}");
            list(hmc, "partition", Some(&cpc_uri), &filters, "partitions")
        }
        (Post, ["api", "cpcs", oid, "partitions"]) => {
            create_partition(hmc, &format!("/api/cpcs/{oid}"), body_json.as_ref())
        }
        (Get, ["api", "cpcs", oid, "logical-partitions"]) => {
            let cpc_uri = format!("/api/cpcs/{oid}");
            list(
                hmc,
                "logical-partition",
                Some(&cpc_uri),
                &filters,
                "logical-partitions",
            )
        }
        (Get, ["api", "cpcs", oid, "adapters"]) => {
            let cpc_uri = format!("/api/cpcs/{oid}");
            list(hmc, "adapter", Some(&cpc_uri), &filters, "adapters")
        }

        (Get, ["api", "partitions", oid]) => get_object(hmc, &format!("/api/partitions/{oid}")),
        (Post, ["api", "partitions", oid]) => {
            update_object(hmc, &format!("/api/partitions/{oid}"), body_json.as_ref())
        }
        (Delete, ["api", "partitions", oid]) => {
            delete_partition(hmc, &format!("/api/partitions/{oid}"))
        }
        (Post, ["api", "partitions", oid, "operations", op]) => {
            partition_operation(hmc, &format!("/api/partitions/{oid}"), op, &filters)
        }
        (Post, ["api", "partitions", oid, "nics"]) => {
            create_nic(hmc, &format!("/api/partitions/{oid}"), body_json.as_ref())
        }
        (Get, ["api", "partitions", oid, "nics", noid]) => {
            get_object(hmc, &format!("/api/partitions/{oid}/nics/{noid}"))
        }
        (Post, ["api", "partitions", oid, "nics", noid]) => update_object(
            hmc,
            &format!("/api/partitions/{oid}/nics/{noid}"),
            body_json.as_ref(),
        ),
        (Delete, ["api", "partitions", oid, "nics", noid]) => {
            delete_nic(hmc, &format!("/api/partitions/{oid}/nics/{noid}"))
        }

        (Get, ["api", "logical-partitions", oid]) => {
            get_object(hmc, &format!("/api/logical-partitions/{oid}"))
        }
        (Post, ["api", "logical-partitions", oid]) => update_object(
            hmc,
            &format!("/api/logical-partitions/{oid}"),
            body_json.as_ref(),
        ),
        (Post, ["api", "logical-partitions", oid, "operations", op]) => {
            lpar_operation(hmc, &format!("/api/logical-partitions/{oid}"), op)
        }

        (Get, ["api", "adapters", oid]) => get_object(hmc, &format!("/api/adapters/{oid}")),
        (Post, ["api", "adapters", oid]) => {
            update_object(hmc, &format!("/api/adapters/{oid}"), body_json.as_ref())
        }

        (Get, ["api", "storage-groups"]) => {
            list(hmc, "storage-group", None, &filters, "storage-groups")
        }
        (Get, ["api", "storage-groups", oid]) => {
            get_object(hmc, &format!("/api/storage-groups/{oid}"))
        }

        (Get, ["api", "users", oid]) => get_object(hmc, &format!("/api/users/{oid}")),
        (Post, ["api", "users", oid]) => {
            update_object(hmc, &format!("/api/users/{oid}"), body_json.as_ref())
        }
        (Delete, ["api", "users", oid]) => delete_user(hmc, &format!("/api/users/{oid}")),

        (Get, ["api", "jobs", oid]) => job_status(hmc, &format!("/api/jobs/{oid}")),
        (Delete, ["api", "jobs", oid]) => delete_job(hmc, &format!("/api/jobs/{oid}")),

        _ => not_found(path),
    }
}

fn version_info(hmc: &MockHmc) -> MockResponse {
    MockResponse::ok(json!({
        "hmc-name": hmc.inner.name,
        "hmc-version": hmc.inner.hmc_version,
        "api-major-version": hmc.inner.api_version.0,
        "api-minor-version": hmc.inner.api_version.1,
    }))
}

/// Logon credentials come from the `Authorization: Basic` header when
/// present, with the JSON body as the fallback.
pub(crate) fn logon(
    hmc: &MockHmc,
    auth: Option<&(String, Secret)>,
    body: Option<&Value>,
) -> MockResponse {
    let (userid, password) = if let Some((userid, password)) = auth {
        (userid.clone(), password.expose().to_string())
    } else if let Some(body) = body {
        match (
            body.get("userid").and_then(Value::as_str),
            body.get("password").and_then(Value::as_str),
        ) {
            (Some(userid), Some(password)) => (userid.to_string(), password.to_string()),
            _ => {
                return MockResponse::error(400, 5, "Request body lacks 'userid' or 'password'");
            }
        }
    } else {
        return MockResponse::error(
            400,
            6,
            "Request carries neither basic-auth credentials nor a body",
        );
    };
    {
        let state = hmc.inner.state.lock();
        if let Some((expected_userid, expected_password)) = &state.credentials {
            if *expected_userid != userid || *expected_password != password {
                return MockResponse::error(403, 0, "The userid or password is not valid");
            }
        }
    }
    let token = Uuid::new_v4().to_string();
    {
        let mut state = hmc.inner.state.lock();
        state.sessions.insert(token.clone(), userid);
        state.logon_count += 1;
    }
    MockResponse::ok(json!({
        "api-session": token,
        "notification-topic": OBJECT_TOPIC,
        "job-notification-topic": JOB_TOPIC,
        "api-major-version": hmc.inner.api_version.0,
        "api-minor-version": hmc.inner.api_version.1,
        "hmc-version": hmc.inner.hmc_version,
    }))
}

fn notification_topics() -> MockResponse {
    MockResponse::ok(json!({
        "topics": [
            {"topic-type": "object-notification", "topic-name": OBJECT_TOPIC},
            {"topic-type": "job-notification", "topic-name": JOB_TOPIC},
        ],
    }))
}

/// Server-side filter evaluation: string properties match the query
/// value as an anchored regular expression, scalars by textual equality,
/// repeated parameters for one property are OR'd.
fn query_matches(
    props: &PropertyMap,
    filters: &[(String, String)],
) -> Result<bool, MockResponse> {
    let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
    for (name, value) in filters {
        match grouped.iter_mut().find(|(n, _)| *n == name.as_str()) {
            Some((_, values)) => values.push(value),
            None => grouped.push((name, vec![value])),
        }
    }
    for (name, patterns) in grouped {
        let matched = match props.get(name) {
            Some(Value::String(actual)) => {
                let mut any = false;
                for pattern in patterns {
                    let regex =
                        regex::Regex::new(&format!("^(?:{pattern})$")).map_err(|_| {
                            MockResponse::error(
                                400,
                                14,
                                &format!("Invalid filter pattern for {name:?}"),
                            )
                        })?;
                    if regex.is_match(actual) {
                        any = true;
                        break;
                    }
                }
                any
            }
            Some(actual) => patterns
                .iter()
                .any(|pattern| scalar_text(actual) == **pattern),
            None => false,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn list(
    hmc: &MockHmc,
    class: &str,
    parent: Option<&str>,
    filters: &[(String, String)],
    list_key: &str,
) -> MockResponse {
    let state = hmc.inner.state.lock();
    let mut items = Vec::new();
    for resource in &state.resources {
        if resource.class != class {
            continue;
        }
        if let Some(parent) = parent {
            if resource.parent.as_deref() != Some(parent) {
                continue;
            }
        }
        match query_matches(&resource.properties, filters) {
            Ok(true) => items.push(Value::Object(resource.properties.clone())),
            Ok(false) => {}
            Err(response) => return response,
        }
    }
    MockResponse::ok(json!({ list_key: items }))
}

fn get_object(hmc: &MockHmc, uri: &str) -> MockResponse {
    match hmc.resource_properties(uri) {
        Some(props) => MockResponse::ok(Value::Object(props)),
        None => not_found(uri),
    }
}

fn update_object(hmc: &MockHmc, uri: &str, body: Option<&Value>) -> MockResponse {
    let Some(diff) = body.and_then(Value::as_object) else {
        return MockResponse::error(400, 6, "Request body is missing or not an object");
    };
    if hmc.resource_properties(uri).is_none() {
        return not_found(uri);
    }
    let changes: Vec<(&str, Value)> = diff
        .iter()
        .map(|(name, value)| (name.as_str(), value.clone()))
        .collect();
    hmc.publish_property_change(uri, &changes);
    MockResponse::no_content()
}

fn create_partition(hmc: &MockHmc, cpc_uri: &str, body: Option<&Value>) -> MockResponse {
    if hmc.resource_properties(cpc_uri).is_none() {
        return not_found(cpc_uri);
    }
    let Some(props) = body.and_then(Value::as_object) else {
        return MockResponse::error(400, 6, "Request body is missing or not an object");
    };
    let Some(name) = props.get("name").and_then(Value::as_str) else {
        return MockResponse::error(400, 5, "Request body lacks the 'name' property");
    };
    {
        let state = hmc.inner.state.lock();
        let duplicate = state.resources.iter().any(|r| {
            r.class == "partition"
                && r.parent.as_deref() == Some(cpc_uri)
                && r.properties.get("name").and_then(Value::as_str) == Some(name)
        });
        if duplicate {
            return MockResponse::error(
                400,
                8,
                &format!("A partition named {name:?} already exists"),
            );
        }
    }
    let uri = hmc.add_partition(cpc_uri, name, props.clone());
    hmc.publish_inventory_add(&uri);
    MockResponse::created(json!({ "object-uri": uri }))
}

fn delete_partition(hmc: &MockHmc, uri: &str) -> MockResponse {
    let Some(props) = hmc.resource_properties(uri) else {
        return not_found(uri);
    };
    let status = props.get("status").and_then(Value::as_str).unwrap_or("");
    if status != "stopped" {
        return MockResponse::error(
            409,
            1,
            &format!("Partition cannot be deleted in status {status:?}"),
        );
    }
    hmc.publish_inventory_remove(uri);
    MockResponse::no_content()
}

fn create_user(hmc: &MockHmc, body: Option<&Value>) -> MockResponse {
    let Some(props) = body.and_then(Value::as_object) else {
        return MockResponse::error(400, 6, "Request body is missing or not an object");
    };
    let Some(name) = props.get("name").and_then(Value::as_str) else {
        return MockResponse::error(400, 5, "Request body lacks the 'name' property");
    };
    let uri = hmc.add_user(name, props.clone());
    hmc.publish_inventory_add(&uri);
    MockResponse::created(json!({ "object-uri": uri }))
}

fn delete_user(hmc: &MockHmc, uri: &str) -> MockResponse {
    if hmc.resource_properties(uri).is_none() {
        return not_found(uri);
    }
    hmc.publish_inventory_remove(uri);
    MockResponse::no_content()
}

fn create_nic(hmc: &MockHmc, partition_uri: &str, body: Option<&Value>) -> MockResponse {
    if hmc.resource_properties(partition_uri).is_none() {
        return not_found(partition_uri);
    }
    let Some(props) = body.and_then(Value::as_object) else {
        return MockResponse::error(400, 6, "Request body is missing or not an object");
    };
    let Some(name) = props.get("name").and_then(Value::as_str) else {
        return MockResponse::error(400, 5, "Request body lacks the 'name' property");
    };
    let uri = hmc.add_nic(partition_uri, name, props.clone());
    hmc.publish_inventory_add(&uri);
    MockResponse::created(json!({ "element-uri": uri }))
}

fn delete_nic(hmc: &MockHmc, uri: &str) -> MockResponse {
    if hmc.resource_properties(uri).is_none() {
        return not_found(uri);
    }
    hmc.detach_from_parent_uris(uri, "nic-uris");
    hmc.publish_inventory_remove(uri);
    MockResponse::no_content()
}

fn partition_operation(
    hmc: &MockHmc,
    uri: &str,
    op: &str,
    filters: &[(String, String)],
) -> MockResponse {
    if hmc.resource_properties(uri).is_none() {
        return not_found(uri);
    }
    match op {
        "start" => transition(hmc, uri, &["stopped"], "active"),
        "stop" => transition(hmc, uri, &["active", "degraded", "paused"], "stopped"),
        "mount-iso" => {
            let Some((_, image_name)) = filters.iter().find(|(name, _)| name == "image-name")
            else {
                return MockResponse::error(400, 5, "Missing 'image-name' query parameter");
            };
            hmc.publish_property_change(uri, &[("boot-iso-image-name", json!(image_name))]);
            MockResponse::no_content()
        }
        _ => not_found(&format!("{uri}/operations/{op}")),
    }
}

fn lpar_operation(hmc: &MockHmc, uri: &str, op: &str) -> MockResponse {
    if hmc.resource_properties(uri).is_none() {
        return not_found(uri);
    }
    match op {
        "activate" => transition(hmc, uri, &["not-activated"], "not-operating"),
        "deactivate" => transition(
            hmc,
            uri,
            &["not-operating", "operating", "exceptions"],
            "not-activated",
        ),
        "load" => transition(hmc, uri, &["not-operating"], "operating"),
        _ => not_found(&format!("{uri}/operations/{op}")),
    }
}

/// Status-gated asynchronous operation: reject with 409.1 outside the
/// permitted statuses, otherwise create a job and (unless jobs are held)
/// complete it immediately with the status transition applied.
fn transition(hmc: &MockHmc, uri: &str, allowed_from: &[&str], target: &str) -> MockResponse {
    let props = hmc.resource_properties(uri).unwrap_or_default();
    let current = props.get("status").and_then(Value::as_str).unwrap_or("");
    if !allowed_from.contains(&current) {
        return MockResponse::error(
            409,
            1,
            &format!("Operation is not permitted in status {current:?}"),
        );
    }
    let (job_uri, held) = hmc.create_job();
    if !held {
        hmc.publish_status_change(uri, target);
        hmc.publish_job_completion(job_uri.as_str(), json!({ "status": "complete" }));
    }
    MockResponse::accepted(Some(json!({ "job-uri": job_uri })))
}

fn job_status(hmc: &MockHmc, uri: &str) -> MockResponse {
    let state = hmc.inner.state.lock();
    let Some(job) = state.jobs.get(uri) else {
        return not_found(uri);
    };
    let mut body = json!({ "status": job.status });
    if let Some(code) = job.status_code {
        body["job-status-code"] = json!(code);
    }
    if let Some(code) = job.reason_code {
        body["job-reason-code"] = json!(code);
    }
    if !job.results.is_null() {
        body["job-results"] = job.results.clone();
    }
    MockResponse::ok(body)
}

fn delete_job(hmc: &MockHmc, uri: &str) -> MockResponse {
    let mut state = hmc.inner.state.lock();
    let Some(job) = state.jobs.get(uri) else {
        return not_found(uri);
    };
    if job.status == "running" {
        return MockResponse::error(409, 1, "Job has not reached a terminal status");
    }
    state.jobs.remove(uri);
    MockResponse::no_content()
}
