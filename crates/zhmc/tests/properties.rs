//! Testable properties of the session and resource engine.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use common::{eventually, mock_hmc, session_for};
use zhmc::{Client, DeleteOptions, Error, PostOptions, PropertyMap};

fn props(value: Value) -> PropertyMap {
    value.as_object().cloned().unwrap()
}

/// Filter correctness: list returns exactly the matching subset for
/// combined regex, converted-scalar, and list filters.
#[tokio::test]
async fn filter_correctness() {
    let hmc = mock_hmc();
    let cpc_uri = hmc.add_cpc("CPC1", PropertyMap::new());
    hmc.add_partition(
        &cpc_uri,
        "WEB1",
        props(json!({"type": "linux", "ifl-processors": 2, "reserved": false})),
    );
    hmc.add_partition(
        &cpc_uri,
        "WEB2",
        props(json!({"type": "linux", "ifl-processors": 4, "reserved": true})),
    );
    hmc.add_partition(
        &cpc_uri,
        "DB1",
        props(json!({"type": "ssc", "ifl-processors": 4, "reserved": false})),
    );
    let session = session_for(&hmc);
    let client = Client::new(session);
    let cpc = client.cpcs().find_by_name("CPC1").await.unwrap();
    let manager = cpc.partitions();

    // Regex on a server-side property.
    let filters = props(json!({"name": "WEB.*"}));
    let found = manager.list(Some(&filters), false).await.unwrap();
    assert_eq!(found.len(), 2);

    // Converted numeric string on a client-side property.
    let filters = props(json!({"ifl-processors": "4"}));
    let found = manager.list(Some(&filters), false).await.unwrap();
    assert_eq!(found.len(), 2);

    // Combined: both must hold.
    let filters = props(json!({"name": "WEB.*", "ifl-processors": 4, "reserved": true}));
    let found = manager.list(Some(&filters), false).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name().unwrap(), "WEB2");

    // A bad conversion surfaces, never silently mismatches.
    let filters = props(json!({"ifl-processors": "many"}));
    assert!(matches!(
        manager.list(Some(&filters), false).await.unwrap_err(),
        Error::FilterConversion { .. }
    ));
}

/// Name cache coherence: a successful find populates the cache; delete
/// and re-create observe the server's view, not a stale entry.
#[tokio::test]
async fn name_cache_coherence() {
    let hmc = mock_hmc();
    let cpc_uri = hmc.add_cpc("CPC1", PropertyMap::new());
    let p1_uri = hmc.add_partition(&cpc_uri, "P1", PropertyMap::new());
    let session = session_for(&hmc);
    let client = Client::new(session);
    let cpc = client.cpcs().find_by_name("CPC1").await.unwrap();
    let manager = cpc.partitions();

    // First find populates the cache: a store-only rename (no
    // invalidation event) is not observed.
    let p1 = manager.find_by_name("P1").await.unwrap();
    assert_eq!(p1.uri(), p1_uri);
    hmc.set_resource_property(&p1_uri, "name", json!("renamed"));
    let cached = manager.find_by_name("P1").await.unwrap();
    assert_eq!(cached.uri(), p1_uri, "second find must be served from the cache");
    hmc.set_resource_property(&p1_uri, "name", json!("P1"));

    // Delete invalidates: a successor of the same name is found under
    // its new URI.
    p1.delete().await.unwrap();
    let successor_uri = hmc.add_partition(&cpc_uri, "P1", PropertyMap::new());
    let successor = manager.find_by_name("P1").await.unwrap();
    assert_eq!(successor.uri(), successor_uri);

    // Create invalidates the created name.
    let created = manager
        .create(&props(json!({"name": "P9"})))
        .await
        .unwrap();
    let found = manager.find_by_name("P9").await.unwrap();
    assert_eq!(found.uri(), created.uri());
}

/// Name cache coherence with notifications: an inventory-remove
/// notification drops the cache entry.
#[tokio::test]
async fn name_cache_invalidation_from_notifications() {
    let hmc = mock_hmc();
    let cpc_uri = hmc.add_cpc("CPC1", PropertyMap::new());
    let p1_uri = hmc.add_partition(&cpc_uri, "P1", PropertyMap::new());
    let session = session_for(&hmc);
    let client = Client::new(session);
    let cpc = client.cpcs().find_by_name("CPC1").await.unwrap();
    let manager = cpc.partitions();

    // A live engine is what applies notifications to the cache; the
    // subscribed resource's ceased flag doubles as the signal that the
    // notification was processed.
    let p1 = manager.find_by_name("P1").await.unwrap();
    assert_eq!(p1.uri(), p1_uri);
    p1.enable_auto_update().await.unwrap();

    hmc.publish_inventory_remove(&p1_uri);
    eventually("inventory-remove marks the resource ceased", || {
        p1.ceased_existence()
    })
    .await;

    // Had the cache entry survived, this find would answer with the old
    // URI instead of going to the HMC.
    let successor_uri = hmc.add_partition(&cpc_uri, "P1", PropertyMap::new());
    let successor = manager.find_by_name("P1").await.unwrap();
    assert_eq!(successor.uri(), successor_uri);
    p1.disable_auto_update().await;
}

/// Auto-update convergence: an auto-updated manager's list reflects
/// inventory changes without further network I/O.
#[tokio::test]
async fn auto_update_manager_convergence() {
    let hmc = mock_hmc();
    let cpc_uri = hmc.add_cpc("CPC1", PropertyMap::new());
    let p1_uri = hmc.add_partition(&cpc_uri, "P1", PropertyMap::new());
    let session = session_for(&hmc);
    let client = Client::new(session);
    let cpc = client.cpcs().find_by_name("CPC1").await.unwrap();
    let manager = cpc.partitions();

    manager.enable_auto_update().await.unwrap();
    assert_eq!(manager.list(None, false).await.unwrap().len(), 1);

    // Creating through the API publishes an inventory-add.
    let created = manager
        .create(&props(json!({"name": "P2"})))
        .await
        .unwrap();
    let probe = manager.clone();
    let created_uri = created.uri().to_string();
    eventually_async("live list gains the created partition", || {
        let probe = probe.clone();
        let created_uri = created_uri.clone();
        async move {
            probe
                .list(None, false)
                .await
                .unwrap()
                .iter()
                .any(|p| p.uri() == created_uri)
        }
    })
    .await;

    // Removal drops it again and marks subscribed resources as ceased.
    let p1 = manager.find_by_name("P1").await.unwrap();
    p1.enable_auto_update().await.unwrap();
    hmc.publish_inventory_remove(&p1_uri);
    let probe = manager.clone();
    let gone_uri = p1_uri.clone();
    eventually_async("live list drops the removed partition", || {
        let probe = probe.clone();
        let gone_uri = gone_uri.clone();
        async move {
            !probe
                .list(None, false)
                .await
                .unwrap()
                .iter()
                .any(|p| p.uri() == gone_uri)
        }
    })
    .await;
    eventually("removed partition is marked ceased", || p1.ceased_existence()).await;
    assert!(matches!(
        p1.pull_full_properties().await.unwrap_err(),
        Error::CeasedExistence { .. }
    ));

    p1.disable_auto_update().await;
    manager.disable_auto_update().await;
}

async fn eventually_async<F, Fut>(what: &str, mut predicate: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if predicate().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 1s: {what}");
}

/// At most one subscription per session, however many subscribers.
#[tokio::test]
async fn at_most_one_subscription_per_session() {
    let hmc = mock_hmc();
    let cpc_uri = hmc.add_cpc("CPC1", PropertyMap::new());
    hmc.add_partition(&cpc_uri, "P1", PropertyMap::new());
    hmc.add_partition(&cpc_uri, "P2", PropertyMap::new());
    let session = session_for(&hmc);
    let client = Client::new(session);
    let cpc = client.cpcs().find_by_name("CPC1").await.unwrap();
    let manager = cpc.partitions();

    let p1 = manager.find_by_name("P1").await.unwrap();
    let p2 = manager.find_by_name("P2").await.unwrap();
    p1.enable_auto_update().await.unwrap();
    p2.enable_auto_update().await.unwrap();
    manager.enable_auto_update().await.unwrap();
    assert_eq!(hmc.object_topic_subscriber_count(), 1);

    p1.disable_auto_update().await;
    p2.disable_auto_update().await;
    assert_eq!(hmc.object_topic_subscriber_count(), 1);

    manager.disable_auto_update().await;
    eventually("subscription torn down after last unsubscribe", || {
        hmc.object_topic_subscriber_count() == 0
    })
    .await;
}

/// Job polling terminates: a held job runs into OperationTimeout.
#[tokio::test]
async fn job_polling_honors_operation_timeout() {
    let hmc = mock_hmc();
    let cpc_uri = hmc.add_cpc("CPC1", PropertyMap::new());
    hmc.add_partition(&cpc_uri, "P1", PropertyMap::new());
    hmc.hold_jobs(true);
    let session = session_for(&hmc);
    let client = Client::new(session);
    let cpc = client.cpcs().find_by_name("CPC1").await.unwrap();
    let partition = cpc.partitions().find_by_name("P1").await.unwrap();

    let err = partition
        .start(true, Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::OperationTimeout { .. }), "got {err:?}");
}

/// A failed job surfaces as an HTTP error synthesized from the job
/// error fields.
#[tokio::test]
async fn failed_job_surfaces_job_error_fields() {
    let hmc = mock_hmc();
    let cpc_uri = hmc.add_cpc("CPC1", PropertyMap::new());
    hmc.add_partition(&cpc_uri, "P1", PropertyMap::new());
    hmc.hold_jobs(true);
    let session = session_for(&hmc);
    let client = Client::new(session);
    let cpc = client.cpcs().find_by_name("CPC1").await.unwrap();
    let partition = cpc.partitions().find_by_name("P1").await.unwrap();

    let job = partition.start(false, None).await.unwrap().unwrap();
    hmc.fail_job(job.uri(), 500, 263, "something went wrong");
    let err = job.wait_for_completion(Some(Duration::from_secs(5))).await.unwrap_err();
    match err {
        Error::Http {
            status: 500,
            reason: 263,
            ref message,
            ..
        } => assert_eq!(message, "something went wrong"),
        other => panic!("unexpected error: {other:?}"),
    }
}

/// Re-logon invariance: one 403.5 is recovered; two consecutive ones
/// raise ServerAuth.
#[tokio::test]
async fn double_session_expiry_is_server_auth() {
    let hmc = mock_hmc();
    hmc.add_cpc("CPC1", PropertyMap::new());
    let session = session_for(&hmc);
    let client = Client::new(session);
    let cpc = client.cpcs().find_by_name("CPC1").await.unwrap();

    hmc.force_session_expiry(2);
    let err = cpc.pull_full_properties().await.unwrap_err();
    assert!(matches!(err, Error::ServerAuth { .. }), "got {err:?}");
}

/// Busy retry: 409.1 is retried when opted in and surfaced when not.
#[tokio::test]
async fn busy_retries_on_conflict() {
    let hmc = mock_hmc();
    let cpc_uri = hmc.add_cpc("CPC1", PropertyMap::new());
    let p_uri = hmc.add_partition(&cpc_uri, "P1", props(json!({"status": "active"})));
    let session = session_for(&hmc);

    // Without opt-in the 409.1 surfaces.
    hmc.force_busy_responses(1);
    let uri = format!("{p_uri}/operations/stop");
    let err = session
        .post(&uri, None, &PostOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_http_reason(409, 1), "got {err:?}");

    // With busy retries the operation eventually goes through.
    hmc.force_busy_responses(2);
    let options = PostOptions::default().with_busy_retries(3, Duration::from_millis(50));
    session.post(&uri, None, &options).await.unwrap();
    assert_eq!(
        hmc.resource_properties(&p_uri).unwrap()["status"],
        json!("stopped")
    );
}

/// Idempotent close: logoff twice, only the first has observable
/// effect.
#[tokio::test]
async fn logoff_is_idempotent() {
    let hmc = mock_hmc();
    hmc.add_cpc("CPC1", PropertyMap::new());
    let session = session_for(&hmc);
    let client = Client::new(session.clone());

    client.cpcs().list(None, false).await.unwrap();
    assert!(session.is_logged_on().await);
    assert_eq!(hmc.session_count(), 1);

    session.logoff().await.unwrap();
    assert!(!session.is_logged_on().await);
    assert_eq!(hmc.session_count(), 0);

    session.logoff().await.unwrap();
    assert_eq!(hmc.session_count(), 0);
}

/// Password non-leakage: credential values appear in no Debug/Display
/// rendering of sessions, requests, or errors.
#[tokio::test]
async fn passwords_never_leak() {
    let hmc = mock_hmc();
    hmc.set_credentials("testuser", "s3cr3t-pa55w0rd");
    let session = zhmc::Session::with_connection(
        hmc.connection(),
        hmc.notification_backend(),
        zhmc::SessionConfig::new(hmc.name(), "testuser", zhmc::Secret::new("s3cr3t-pa55w0rd")),
    );
    assert!(!format!("{session:?}").contains("s3cr3t-pa55w0rd"));
    assert!(!format!("{:?}", session.config()).contains("s3cr3t-pa55w0rd"));

    // A rejected logon must not echo the password either.
    let bad_session = zhmc::Session::with_connection(
        hmc.connection(),
        hmc.notification_backend(),
        zhmc::SessionConfig::new(hmc.name(), "testuser", zhmc::Secret::new("wrong-pa55")),
    );
    let err = bad_session.logon().await.unwrap_err();
    assert!(matches!(err, Error::ServerAuth { .. }));
    assert!(!err.to_string().contains("wrong-pa55"));
    assert!(!format!("{err:?}").contains("wrong-pa55"));
}

/// A session constructed from a pre-existing token (no credentials)
/// authenticates REST calls and the notification subscription with that
/// token, discovering the object topic via the HMC instead of a logon
/// response.
#[tokio::test]
async fn token_only_session_uses_its_token_everywhere() {
    let hmc = mock_hmc();
    let cpc_uri = hmc.add_cpc("CPC1", PropertyMap::new());
    let partition_uri = hmc.add_partition(&cpc_uri, "P1", props(json!({"description": "foo"})));

    // Obtain a token the way an outer program would.
    let bootstrap = session_for(&hmc);
    bootstrap.logon().await.unwrap();
    let token = bootstrap.session_token().await.unwrap();

    let session = zhmc::Session::with_connection(
        hmc.connection(),
        hmc.notification_backend(),
        zhmc::SessionConfig::from_session_token(hmc.name(), token),
    );
    let client = Client::new(session.clone());

    let cpc = client.cpcs().find_by_name("CPC1").await.unwrap();
    let partition = cpc.partitions().find_by_name("P1").await.unwrap();
    // The provided token authenticated those calls; no logon happened.
    assert_eq!(hmc.logon_count(), 1);
    assert!(session.is_logged_on().await);

    partition.enable_auto_update().await.unwrap();
    hmc.publish_property_change(&partition_uri, &[("description", json!("bar"))]);
    eventually("token-authenticated subscription delivers updates", || {
        partition.prop("description") == Some(json!("bar"))
    })
    .await;
    partition.disable_auto_update().await;

    // Without credentials there is nothing to re-logon with.
    hmc.expire_all_sessions();
    let err = partition.pull_full_properties().await.unwrap_err();
    assert!(matches!(err, Error::ServerAuth { .. }), "got {err:?}");
}

/// Operations gated on a minimum API version raise VersionError below
/// it.
#[tokio::test]
async fn storage_groups_require_api_version() {
    let old_hmc = zhmc_mock::MockHmc::new("old", "2.13.1", (2, 20));
    let session = zhmc::Session::with_connection(
        old_hmc.connection(),
        old_hmc.notification_backend(),
        zhmc::SessionConfig::new("old", "testuser", zhmc::Secret::new("pw")),
    );
    let client = Client::new(session);
    let err = client.storage_groups().list(None, false).await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::Version {
                required: (2, 23),
                actual: (2, 20),
            }
        ),
        "got {err:?}"
    );

    let hmc = mock_hmc();
    hmc.add_storage_group("SG1", PropertyMap::new());
    let session = session_for(&hmc);
    let client = Client::new(session);
    let groups = client.storage_groups().list(None, false).await.unwrap();
    assert_eq!(groups.len(), 1);
}

/// wait_for_available: fails fast while the HMC is down, returns once
/// it answers version queries again.
#[tokio::test]
async fn wait_for_available_after_restart() {
    let hmc = mock_hmc();
    let session = session_for(&hmc);
    let client = Client::new(session);

    hmc.set_available(false);
    let err = client
        .wait_for_available(Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(err.is_connection());

    hmc.set_available(true);
    client
        .wait_for_available(Some(Duration::from_secs(1)))
        .await
        .unwrap();
}

/// wait_for_status observes a server-side transition and times out with
/// the actual status attached.
#[tokio::test]
async fn wait_for_status_transitions_and_timeout() {
    let hmc = mock_hmc();
    let cpc_uri = hmc.add_cpc("CPC1", PropertyMap::new());
    let p_uri = hmc.add_partition(&cpc_uri, "P1", PropertyMap::new());
    let session = session_for(&hmc);
    let client = Client::new(session);
    let cpc = client.cpcs().find_by_name("CPC1").await.unwrap();
    let partition = cpc.partitions().find_by_name("P1").await.unwrap();

    let err = partition
        .wait_for_status(&["active"], Some(Duration::from_millis(200)))
        .await
        .unwrap_err();
    match err {
        Error::StatusTimeout { actual, desired, .. } => {
            assert_eq!(actual.as_deref(), Some("stopped"));
            assert_eq!(desired, ["active"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let background_hmc = hmc.clone();
    let background_uri = p_uri.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        background_hmc.publish_status_change(&background_uri, "active");
    });
    let status = partition
        .wait_for_status(&["active", "degraded"], Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(status, "active");
}

/// ISO upload: the opaque body path reaches the HMC with its content
/// type and query parameter.
#[tokio::test]
async fn mount_iso_uploads_binary_body() {
    let hmc = mock_hmc();
    let cpc_uri = hmc.add_cpc("CPC1", PropertyMap::new());
    let p_uri = hmc.add_partition(&cpc_uri, "P1", PropertyMap::new());
    let session = session_for(&hmc);
    let client = Client::new(session);
    let cpc = client.cpcs().find_by_name("CPC1").await.unwrap();
    let partition = cpc.partitions().find_by_name("P1").await.unwrap();

    partition
        .mount_iso("boot.iso", bytes::Bytes::from_static(&[0x42; 16]))
        .await
        .unwrap();
    assert_eq!(
        hmc.resource_properties(&p_uri).unwrap()["boot-iso-image-name"],
        json!("boot.iso")
    );
}

/// NICs are element resources: created under their partition's URI,
/// listed by following the partition's `nic-uris` property, and arriving
/// with their full property set.
#[tokio::test]
async fn nics_are_elements_of_their_partition() {
    let hmc = mock_hmc();
    let cpc_uri = hmc.add_cpc("CPC1", PropertyMap::new());
    hmc.add_partition(&cpc_uri, "P1", PropertyMap::new());
    let session = session_for(&hmc);
    let client = Client::new(session);
    let cpc = client.cpcs().find_by_name("CPC1").await.unwrap();
    let partition = cpc.partitions().find_by_name("P1").await.unwrap();
    let nics = partition.nics();

    assert!(nics.list(None).await.unwrap().is_empty());

    let nic = nics
        .create(&props(json!({"name": "eth0", "device-number": "0001"})))
        .await
        .unwrap();
    assert!(nic.uri().starts_with(partition.uri()));
    assert!(nic.uri().contains("/nics/"));

    let listed = nics.list(None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name().unwrap(), "eth0");
    assert_eq!(listed[0].prop_str("device-number").as_deref(), Some("0001"));
    assert!(listed[0].has_full_properties());

    let found = nics.find_by_name("eth0").await.unwrap();
    assert_eq!(found.uri(), nic.uri());

    nic.delete().await.unwrap();
    assert!(nics.list(None).await.unwrap().is_empty());
}

/// delete() drops the resource from cache and live list and marks the
/// handle ceased.
#[tokio::test]
async fn delete_with_busy_retry_options() {
    let hmc = mock_hmc();
    let cpc_uri = hmc.add_cpc("CPC1", PropertyMap::new());
    hmc.add_partition(&cpc_uri, "P1", PropertyMap::new());
    let session = session_for(&hmc);
    let client = Client::new(session);
    let cpc = client.cpcs().find_by_name("CPC1").await.unwrap();
    let partition = cpc.partitions().find_by_name("P1").await.unwrap();

    hmc.force_busy_responses(1);
    partition
        .delete_with_options(&DeleteOptions::default().with_busy_retries(2, Duration::from_millis(50)))
        .await
        .unwrap();
    assert!(partition.ceased_existence());
    assert!(matches!(
        partition.pull_full_properties().await.unwrap_err(),
        Error::CeasedExistence { .. }
    ));
    assert!(matches!(
        cpc.partitions().find_by_name("P1").await.unwrap_err(),
        Error::NotFound { .. }
    ));
}
