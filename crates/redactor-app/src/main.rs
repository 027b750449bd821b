// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Redactor — secure document cache console
//
// Entry point. Initialises logging and backend services, then hands stdin to
// the console.  Logs go to stderr so they never mix with command output.

mod console;
mod services;

use services::app_services::AppServices;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Redactor starting");

    let svc = match AppServices::init() {
        Ok(s) => {
            tracing::info!("backend services initialised");
            s
        }
        Err(e) => {
            tracing::error!(error = %e, "persistent storage failed — using in-memory fallback");
            AppServices::fallback().map_err(std::io::Error::other)?
        }
    };

    console::run(svc).await
}
