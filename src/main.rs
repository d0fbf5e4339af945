use std::fmt::Debug;
use std::fmt::Display;

use newsletter_signup::configuration::get_configuration;
use newsletter_signup::startup::Application;
use newsletter_signup::telemetry::get_subscriber;
use newsletter_signup::telemetry::init_subscriber;
use tokio::task::JoinError;

fn report_exit(
    name: &str,
    outcome: Result<Result<(), impl Debug + Display>, JoinError>,
) {
    match outcome {
        Ok(Ok(())) => {
            tracing::info!("{name} exited gracefully")
        }

        Ok(Err(e)) => {
            tracing::error!(
                error.cause_chain=?e,
                error.message=%e,
                "{name} failed (inner)"
            )
        }

        Err(e) => {
            tracing::error!(
                error.cause_chain=?e,
                error.message=%e,
                "{name} failed (outer)"
            )
        }
    }
}

/// Initialise telemetry, load config, and start the server plus the rate
/// limit sweeper. Whichever stops first takes the process down with it.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = get_subscriber("newsletter-signup", "info", std::io::stdout);
    init_subscriber(subscriber)?;

    let cfg = get_configuration()?;

    let app = Application::build(cfg).await?;
    let expiry_worker = app.expiry_worker();

    let server_thread = tokio::spawn(app.run_until_stopped());
    let expiry_worker_thread = tokio::spawn(expiry_worker);

    tokio::select! {
        o = server_thread => { report_exit("API", o) },
        o = expiry_worker_thread => { report_exit("Rate limit expiry worker", o) },
    }

    Ok(())
}
