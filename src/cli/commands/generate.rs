//! Generate Command
//!
//! Route one prompt through the service.
//!
//! Usage:
//!   modelroute generate "prompt" [--task summarize] [--context key=value]
//!                       [--max-tokens N] [--timeout SECS] [-f json]

use serde_json::Value;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, parse_context, wants_json};
use crate::types::Result;

pub struct GenerateArgs {
    pub prompt: String,
    pub task: Option<String>,
    pub context: Vec<String>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<f64>,
    pub format: String,
}

/// Returns whether the request was served
pub async fn run(ctx: &CommandContext, args: GenerateArgs) -> Result<bool> {
    let mut context = parse_context(&args.context)?;
    if let Some(task) = args.task {
        context.insert("task".to_string(), Value::from(task));
    }

    let defaults = ctx.service.defaults();
    let max_tokens = args.max_tokens.unwrap_or(defaults.max_tokens);
    let timeout = args
        .timeout_secs
        .unwrap_or_else(|| defaults.timeout.as_secs_f64());

    let result = ctx
        .service
        .generate(&args.prompt, &context, max_tokens, timeout)
        .await?;

    if wants_json(&args.format) {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        Output::new().generation(&result);
    }

    Ok(result.ok)
}
