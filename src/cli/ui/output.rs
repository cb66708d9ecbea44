use console::style;

use crate::service::{EndpointProbe, GenerateResult};
use crate::transport::{CircuitState, HealthSnapshot};

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    pub fn field(&self, label: &str, value: &str) {
        println!("  {:<10} {}", style(label).dim(), value);
    }

    /// Generated text followed by a dim attribution line
    pub fn generation(&self, result: &GenerateResult) {
        match (&result.result, &result.error) {
            (Some(payload), _) => {
                println!("{}", payload.response);
                let mut line = format!("{} · {}", payload.provider, payload.model);
                if let Some(score) = payload.score {
                    line.push_str(&format!(" · score {:.1}", score));
                }
                eprintln!("{}", style(line).dim());
                if payload.degraded {
                    self.warning("served by fallback after primary failure (degraded)");
                }
            }
            (None, Some(error)) => self.error(error),
            (None, None) => self.error("no result"),
        }
    }

    pub fn health(&self, snapshot: &HealthSnapshot) {
        let marker = match snapshot.state {
            CircuitState::Closed => style("●").green(),
            CircuitState::Open if snapshot.available => style("●").yellow(),
            CircuitState::Open => style("●").red(),
        };
        println!("  {} {}", marker, snapshot.summary());
    }

    pub fn probe(&self, probe: &EndpointProbe) {
        let reachable = if probe.reachable {
            style("reachable").green()
        } else {
            style("unreachable").red()
        };
        println!(
            "  {:<12} {:<24} {}",
            style(&probe.endpoint).bold(),
            probe.model,
            reachable
        );
        self.health(&probe.health);
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
