//! sign-policy: run one signing workflow against a signstation-proxy
//!
//! ```text
//! sign-policy --proxy-url http://127.0.0.1:8888 --origin https://app.example \
//!     --signer "Asha Rao" [--document policy.pdf] [--name Policy_Asha]
//! ```
//!
//! Without `--document` the placeholder policy is rendered for the signer.
//! Progress labels go to stderr; the download URL is printed to stdout.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use provider::ProxyProvider;
use signing_workflow::{
    Orchestrator, ProgressEvent, SuppliedDocument, TokenCache, WorkflowConfig, WorkflowRequest,
    policy_signature_coordinates,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let proxy_url = flag(&args, "--proxy-url")
        .map(str::to_string)
        .or_else(|| std::env::var("SIGNSTATION_PROXY_URL").ok())
        .unwrap_or_else(|| "http://127.0.0.1:8888".to_string());
    let Some(signer) = flag(&args, "--signer") else {
        bail!("usage: sign-policy --signer <name> [--proxy-url <url>] [--origin <origin>] [--document <pdf>] [--name <document name>]");
    };

    let mut provider = ProxyProvider::new(reqwest::Client::new(), &proxy_url);
    if let Some(origin) = flag(&args, "--origin") {
        provider = provider.with_origin(origin);
    }
    if let Some(secs) = flag(&args, "--timeout-secs") {
        let secs: u64 = secs.parse().context("--timeout-secs must be an integer")?;
        provider = provider.with_timeout(Duration::from_secs(secs));
    }

    let mut request = WorkflowRequest::for_signer(signer);
    if let Some(path) = flag(&args, "--document") {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read document {path}"))?;
        let name = flag(&args, "--name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("Policy_{signer}"));
        request = request.with_document(SuppliedDocument {
            bytes,
            name,
            signature_coordinates: policy_signature_coordinates(),
        });
    }

    info!(proxy_url = %proxy_url, signer, "starting signing workflow");

    let orchestrator = Orchestrator::new(
        Arc::new(provider),
        Arc::new(TokenCache::new()),
        WorkflowConfig::default(),
    );
    let observer = |event: &ProgressEvent| eprintln!("{}", event.label);

    match orchestrator.run(request, &observer).await {
        Ok(url) => {
            println!("{url}");
            Ok(())
        }
        Err(failure) => {
            eprintln!("{}", failure.user_message());
            if let Some(document_id) = &failure.document_id {
                eprintln!("signed document id: {document_id}");
            }
            Err(anyhow::Error::new(failure).context("signing workflow failed"))
        }
    }
}
