//! Tor Circuit Example
//!
//! Demonstrates the retry patterns an end-to-end test suite uses:
//! - Polling for a condition with a timeout (Tor bootstrap)
//! - Retrying a flaky operation with a rate-limited recovery action
//!   (forcing a new Tor circuit between attempts)
//! - Nesting a short poll inside a longer retry
//!
//! Run with: cargo run --example tor_circuit

use std::cell::Cell;
use std::time::Duration;

use eventually::recovery::{chain, Cooldown};
use eventually::{try_for, AttemptPolicy, Fault, Retry, RetryError};

/// A stand-in for the guest VM: the circuit works on the third try.
struct FakeGuest {
    bootstrap_polls: Cell<u32>,
    fetches: Cell<u32>,
    newnyms: Cell<u32>,
}

impl FakeGuest {
    fn tor_has_bootstrapped(&self) -> Result<bool, Fault<String>> {
        self.bootstrap_polls.set(self.bootstrap_polls.get() + 1);
        Ok(self.bootstrap_polls.get() >= 2)
    }

    fn fetch_over_tor(&self, url: &str) -> Result<String, Fault<String>> {
        self.fetches.set(self.fetches.get() + 1);
        if self.fetches.get() < 3 {
            Err(Fault::Transient(format!("curl: (7) failed to connect to {}", url)))
        } else {
            Ok(format!("<html>{}</html>", url))
        }
    }

    fn signal_newnym(&self) -> Result<(), Fault<String>> {
        self.newnyms.set(self.newnyms.get() + 1);
        tracing::info!(count = self.newnyms.get(), "sent NEWNYM");
        Ok(())
    }
}

/// Retry a Tor operation, forcing a new circuit after every failure.
fn retry_tor<T>(
    guest: &FakeGuest,
    newnym: &mut Cooldown,
    max_retries: u32,
    mut reload: impl FnMut() -> Result<(), Fault<String>>,
    operation: impl FnMut() -> Result<T, Fault<String>>,
) -> Result<T, RetryError<Fault<String>>> {
    let force_new_circuit = || newnym.run(|| guest.signal_newnym());
    let recovery = chain(force_new_circuit, move || reload());

    Retry::new(AttemptPolicy::retries(max_retries).with_delay(Duration::from_millis(100)))
        .named("Tor operation")
        .recover_with(recovery)
        .run(operation)
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let guest = FakeGuest {
        bootstrap_polls: Cell::new(0),
        fetches: Cell::new(0),
        newnyms: Cell::new(0),
    };

    // Poll until Tor has bootstrapped.
    match try_for(Some(Duration::from_secs(10)), || guest.tor_has_bootstrapped()) {
        Ok(_) => tracing::info!("Tor is ready"),
        Err(e) => {
            tracing::error!("Tor never bootstrapped: {}", e);
            return;
        }
    }

    // Tor rejects NEWNYM more than once per ten seconds; keep the demo snappy.
    let mut newnym =
        Cooldown::new(Duration::from_millis(300)).with_margin(Duration::from_millis(50));

    let page = retry_tor(
        &guest,
        &mut newnym,
        5,
        || {
            tracing::info!("reloading the browser tab");
            Ok(())
        },
        || guest.fetch_over_tor("https://check.torproject.org"),
    );

    match page {
        Ok(html) => tracing::info!("fetched {} bytes", html.len()),
        Err(e) => tracing::error!("giving up: {}", e),
    }

    // A short inner poll nested inside a longer outer retry. The inner
    // timeout is just another transient failure to the outer call.
    let mut outer_attempts = 0;
    let nested = Retry::new(
        AttemptPolicy::timeout(Duration::from_secs(2)).with_delay(Duration::from_millis(100)),
    )
    .message("onion service never came up")
    .run(|| {
        outer_attempts += 1;
        let ready = outer_attempts >= 3;
        Retry::new(AttemptPolicy::timeout(Duration::from_millis(200)))
            .message("onion service port closed")
            .run_until(|| Ok::<_, Fault<String>>(ready))
    });

    match nested {
        Ok(_) => tracing::info!(outer_attempts, "onion service is up"),
        Err(e) => tracing::error!("{}", e),
    }
}
