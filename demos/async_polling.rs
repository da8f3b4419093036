//! Async Polling Example
//!
//! Demonstrates async retry calls on tokio:
//! - Polling a service until it listens
//! - A timeout preempting an attempt that hangs
//!
//! Run with: cargo run --example async_polling --features async

use std::time::Duration;

use eventually::{AttemptPolicy, Retry};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut polls = 0;
    let listening = Retry::new(
        AttemptPolicy::timeout(Duration::from_secs(5)).with_delay(Duration::from_millis(200)),
    )
    .named("lighttpd startup")
    .run_until_async(|| {
        polls += 1;
        let up = polls >= 4;
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, std::io::Error>(up)
        }
    })
    .await;
    println!("service listening: {:?} after {} polls", listening, polls);

    let hung = Retry::new(AttemptPolicy::timeout(Duration::from_millis(300)))
        .message("D-Bus call never returned")
        .run_async(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, String>(())
        })
        .await;
    println!("hung call: {}", hung.unwrap_err());
}
