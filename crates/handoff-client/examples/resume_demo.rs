//! Transaction Handoff Example
//!
//! Walks through a producer handing its open transaction to a replacement
//! session, then shows what happens to a producer that has been fenced.
//!
//! Run with:
//! ```bash
//! RUST_LOG=handoff_client=debug cargo run --package handoff-client --example resume_demo
//! ```

use handoff_broker::{BrokerConfig, CommittedReader, InMemoryBroker, InMemoryTransport};
use handoff_client::{ProducerRecord, ProducerSession, ResumeToken, StringSerializer};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const TOPIC: &str = "orders";
const TXN_ID: &str = "orders-sink-0";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("\n🎯 Handoff: resumable transactional producer");
    println!("============================================\n");

    // Step 1: Broker and reader
    println!("📦 Step 1: Starting in-memory broker");
    let broker = InMemoryBroker::new_shared(BrokerConfig::default());
    broker.create_topic(TOPIC, 3).await?;
    let reader = CommittedReader::new(broker.clone());
    println!("   ✅ Created topic '{}' with 3 partitions\n", TOPIC);

    // Step 2: Session A writes but never commits
    println!("🚀 Step 2: Session A writes inside a transaction");
    let mut a = ProducerSession::builder()
        .transactional_id(TXN_ID)
        .transport(InMemoryTransport::new(broker.clone()))
        .build()?;
    a.initialize().await?;
    a.begin_transaction().await?;

    for (key, value) in [("user-1", "order-1"), ("user-2", "order-2")] {
        let record = ProducerRecord::serialize_with(
            TOPIC,
            Some(key),
            value,
            &StringSerializer,
            &StringSerializer,
        );
        a.send(record).await?;
    }
    a.flush().await?;

    let token_json = a.resume_token()?.to_json()?;
    println!("   ✅ Flushed 2 records, checkpointed {}", token_json);
    println!(
        "   👀 Committed reader sees {} records\n",
        reader.read_committed(TOPIC).await?.len()
    );

    // Step 3: Session B resumes and commits
    println!("🔁 Step 3: Session B resumes A's identity and commits");
    let token = ResumeToken::from_json(&token_json)?;
    let mut b = ProducerSession::builder()
        .transactional_id(TXN_ID)
        .transport(InMemoryTransport::new(broker.clone()))
        .build()?;
    b.resume_from(&token).await?;
    b.commit_transaction().await?;

    for record in reader.read_committed(TOPIC).await? {
        println!(
            "   📨 partition {} offset {}: {}",
            record.partition,
            record.offset,
            String::from_utf8_lossy(&record.value)
        );
    }

    // A's own commit arrives late and is a no-op
    a.commit_transaction().await?;
    println!("   ✅ Late commit from A accepted without effect\n");

    // Step 4: A newer instance fences everyone holding the old epoch
    println!("🛡️  Step 4: A newer instance initializes");
    let mut c = ProducerSession::builder()
        .transactional_id(TXN_ID)
        .transport(InMemoryTransport::new(broker.clone()))
        .build()?;
    c.initialize().await?;
    println!("   ✅ New identity {}", c.identity()?);

    a.begin_transaction().await?;
    let ack = a
        .send(ProducerRecord::new(TOPIC, "stale").with_key("user-1"))
        .await?;
    match ack.await {
        Ok(metadata) => println!("   ⚠️  Unexpectedly delivered at offset {}", metadata.offset),
        Err(e) => println!("   ⛔ Session A rejected: {}", e),
    }
    a.abort_transaction().await?;

    println!("\n📊 Session A stats: {}", serde_json::to_string(&a.stats())?);

    for session in [&mut a, &mut b, &mut c] {
        session.close(Duration::from_secs(1)).await;
    }

    println!("\n✅ Done\n");
    Ok(())
}
