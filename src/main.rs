//! approvalflow - work order approval planner
//!
//! Reads a work order as JSON (from the path given as the first argument,
//! or stdin), runs it through the configured approver policy and prints the
//! reconciled approval tree.

use anyhow::Context;
use approvalflow::config::{LogConfig, Settings};
use approvalflow::policy::WorkOrder;
use approvalflow::state::AppState;
use std::io::Read;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log);

    let input = read_input(std::env::args().nth(1))?;
    let order: WorkOrder = serde_json::from_str(&input).context("Invalid work order JSON")?;
    info!(expense_type = ?order.expense_type, emergency = order.emergency, "Work order loaded");

    let state = Arc::new(AppState::new(settings));
    let proposal = state.service.create_proposal(order.requester.clone()).await?;
    let outcome = state
        .service
        .apply_policy(proposal.id, &state.policy, &order)
        .await?;
    let proposal = state.service.get(proposal.id).await?;
    info!(proposal_id = %proposal.id, status = %proposal.status, "Approvals planned");

    let report = serde_json::json!({
        "outcome": outcome,
        "proposal": proposal,
        "currentlyActionable": proposal.currently_actionable_assignees(),
        "subscribers": proposal.subscribers(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing(config: &LogConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

fn read_input(path: Option<String>) -> anyhow::Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path))
        }
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read work order from stdin")?;
            Ok(buffer)
        }
    }
}
