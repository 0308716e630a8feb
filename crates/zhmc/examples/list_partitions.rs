//! List the partitions of every CPC of a (faked) HMC.
//!
//! Run with: `cargo run --example list_partitions`

use serde_json::json;

use zhmc::{Client, PropertyMap, Secret, Session, SessionConfig};
use zhmc_mock::MockHmc;

fn props(value: serde_json::Value) -> PropertyMap {
    value.as_object().cloned().unwrap()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> zhmc::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let hmc = MockHmc::new("demo-hmc", "2.16.0", (4, 10));
    let cpc_uri = hmc.add_cpc("CPC1", props(json!({"dpm-enabled": true})));
    hmc.add_partition(&cpc_uri, "WEB1", props(json!({"description": "web server"})));
    hmc.add_partition(&cpc_uri, "DB1", props(json!({"description": "database"})));

    let session = Session::with_connection(
        hmc.connection(),
        hmc.notification_backend(),
        SessionConfig::new("demo-hmc", "demouser", Secret::new("demo-pw")),
    );
    let client = Client::new(session);

    for cpc in client.cpcs().list(None, false).await? {
        println!("CPC {} ({})", cpc.name()?, cpc.uri());
        for partition in cpc.partitions().list(None, false).await? {
            println!(
                "  partition {} status={}",
                partition.name()?,
                partition.prop_str("status").unwrap_or_default()
            );
        }
    }
    Ok(())
}
