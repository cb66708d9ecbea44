//! Health Command
//!
//! Probe every configured endpoint. Probes never generate.

use serde_json::json;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, wants_json};
use crate::types::Result;

/// Returns whether every endpoint answered
pub async fn run(ctx: &CommandContext, format: &str) -> Result<bool> {
    let probes = ctx.service.probe_all().await;
    let all_reachable = probes.iter().all(|p| p.reachable);

    if wants_json(format) {
        let report = json!({
            "healthy": all_reachable,
            "endpoints": probes,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(all_reachable);
    }

    let output = Output::new();
    if probes.is_empty() {
        output.warning("No endpoints configured. Set PRIMARY_URL / SECONDARY_URL or edit the config file.");
        return Ok(false);
    }

    output.header("Endpoint Health");
    for probe in &probes {
        output.probe(probe);
    }
    println!();
    if all_reachable {
        output.success("All endpoints reachable");
    } else {
        let down = probes.iter().filter(|p| !p.reachable).count();
        output.warning(&format!("{} of {} endpoints unreachable", down, probes.len()));
    }
    Ok(all_reachable)
}
