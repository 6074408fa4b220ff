//! Bulk API 2.0 insert, end to end
//!
//! Creates an Account insert job, uploads a few records, waits for the
//! platform to process them and prints what succeeded and what failed.
//! Then reads the inserted rows back with a bulk query.
//!
//! Credentials come from the environment (`SF_CLIENT_ID`, `SF_REFRESH_TOKEN`,
//! optionally `SF_SANDBOX=true`).
//!
//! Run with: RUST_LOG=busbar_sf=debug cargo run --example bulk_insert

use std::time::Duration;

use busbar_sf::bulk::{BulkOperation, CreateIngestJobRequest, CreateQueryJobRequest};
use busbar_sf::{Client, Config, Context};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Account {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Industry")]
    industry: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ctx = Context::with_timeout(Duration::from_secs(600));
    let client = Client::connect(&ctx, Config::from_env()?).await?;
    println!("Connected to {}", client.instance_url().unwrap_or_default());

    let bulk = client.bulk();
    let accounts = vec![
        Account {
            name: "Acme Corp".to_string(),
            industry: Some("Technology".to_string()),
        },
        Account {
            name: "Global Industries".to_string(),
            industry: Some("Manufacturing".to_string()),
        },
        // Rejected by the platform: Name is required
        Account {
            name: String::new(),
            industry: None,
        },
    ];

    let job = bulk
        .create_job(&ctx, &CreateIngestJobRequest::new("Account", BulkOperation::Insert))
        .await?;
    println!("Created job {}", job.id);

    bulk.upload_records(&ctx, &job.id, &accounts, Some(&["Name", "Industry"]))
        .await?;
    bulk.close(&ctx, &job.id).await?;

    let job = bulk
        .await_completion(&ctx, &job.id, Duration::from_secs(2))
        .await?;
    println!(
        "Job {} finished {}: {} processed, {} failed ({:.0}% success)",
        job.id,
        job.state,
        job.number_records_processed,
        job.number_records_failed,
        job.success_rate() * 100.0
    );

    for success in bulk.fetch_success(&ctx, &job.id).await? {
        println!(
            "  created {} {}",
            success.id.as_deref().unwrap_or("?"),
            success.data.get("Name").unwrap_or_default()
        );
    }
    for failure in bulk.fetch_failures(&ctx, &job.id).await? {
        println!("  failed: {}", failure.error);
    }

    let result = bulk
        .execute_query(
            &ctx,
            &CreateQueryJobRequest::new(
                "SELECT Id, Name FROM Account WHERE Name IN ('Acme Corp', 'Global Industries')",
            ),
            Duration::from_secs(2),
        )
        .await?;
    println!("Query returned {} rows", result.record_count());
    for record in &result.records {
        println!(
            "  {} {}",
            record.get("Id").unwrap_or_default(),
            record.get("Name").unwrap_or_default()
        );
    }

    Ok(())
}
