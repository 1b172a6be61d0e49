// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `stampede mission` - mission operations against a running daemon.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;

use stampede_core::domain::executor::BackendKind;
use stampede_core::domain::mission::{CreateMissionRequest, Mission, MissionStatusResponse};

#[derive(Subcommand)]
pub enum MissionCommand {
    /// Launch a new mission
    Create {
        /// Human-readable mission name
        #[arg(long)]
        name: String,

        /// Absolute URL the swarm starts from
        #[arg(long)]
        target_url: String,

        /// Number of agents in the swarm
        #[arg(long, default_value = "3")]
        agents: u32,

        /// Natural-language goal the agents pursue
        #[arg(long)]
        goal: String,

        /// Mission deadline in seconds
        #[arg(long, default_value = "300")]
        duration: u64,

        /// Shared requests-per-second budget for the swarm
        #[arg(long, default_value = "5.0")]
        rate: f64,

        /// Override the default decision-policy system prompt
        #[arg(long)]
        system_prompt: Option<String>,

        /// Action backend: http or browser
        #[arg(long, default_value = "http")]
        backend: String,
    },

    /// List all missions
    List,

    /// Show one mission's status and per-agent state
    Status {
        /// Mission ID (mission-<uuid8>)
        #[arg(value_name = "MISSION_ID")]
        mission_id: String,
    },
}

pub async fn handle_command(command: MissionCommand, host: &str, port: u16) -> Result<()> {
    let base = format!("http://{host}:{port}");
    let client = reqwest::Client::new();

    match command {
        MissionCommand::Create {
            name,
            target_url,
            agents,
            goal,
            duration,
            rate,
            system_prompt,
            backend,
        } => {
            let request = CreateMissionRequest {
                name,
                target_url,
                num_agents: agents,
                goal,
                max_duration_seconds: duration,
                rate_limit_per_second: rate,
                initial_system_prompt: system_prompt.unwrap_or_default(),
                backend: parse_backend(&backend)?,
            };

            let response = client
                .post(format!("{base}/api/missions"))
                .json(&request)
                .send()
                .await
                .context("Failed to reach daemon")?;
            let mission: Mission = read_json(response).await?;

            println!("{} {}", "Mission launched:".green(), mission.id.to_string().bold());
            println!("  target: {}", mission.target_url);
            println!("  agents: {}", mission.num_agents);
            println!("  watch:  ws://{host}:{port}/ws");
        }

        MissionCommand::List => {
            let response = client
                .get(format!("{base}/api/missions"))
                .send()
                .await
                .context("Failed to reach daemon")?;
            let missions: Vec<Mission> = read_json(response).await?;

            if missions.is_empty() {
                println!("{}", "No missions.".yellow());
                return Ok(());
            }
            for mission in missions {
                println!(
                    "{}  {:?}  {} agents  {}",
                    mission.id.to_string().bold(),
                    mission.status,
                    mission.num_agents,
                    mission.name
                );
            }
        }

        MissionCommand::Status { mission_id } => {
            let response = client
                .get(format!("{base}/api/missions/{mission_id}"))
                .send()
                .await
                .context("Failed to reach daemon")?;
            let status: MissionStatusResponse = read_json(response).await?;

            let summary = &status.summary;
            println!("{} {:?}", status.mission.id.to_string().bold(), status.mission.status);
            println!("  goal:    {}", status.mission.goal);
            println!(
                "  agents:  {} total, {} active, {} completed, {} failed",
                summary.total_agents,
                summary.active_agents,
                summary.completed_agents,
                summary.failed_agents
            );
            println!(
                "  actions: {} ok, {} errors ({:.1}% error rate), avg {}ms",
                summary.total_actions,
                summary.total_errors,
                summary.error_rate_percent,
                summary.average_latency_ms
            );
            for agent in &status.agent_states {
                println!(
                    "  {}  {}  {} ok / {} err  at {}",
                    agent.id,
                    agent.status,
                    agent.success_count,
                    agent.error_count,
                    agent.current_url
                );
            }
        }
    }

    Ok(())
}

fn parse_backend(value: &str) -> Result<BackendKind> {
    match value {
        "http" => Ok(BackendKind::Http),
        "browser" => Ok(BackendKind::Browser),
        other => bail!("unknown backend '{other}' (expected http or browser)"),
    }
}

/// Deserialize a 2xx body, or surface the daemon's error message.
async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await.context("Failed to read response")?;
    if !status.is_success() {
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["error"].as_str().map(str::to_string))
            .unwrap_or(body);
        bail!("daemon returned {status}: {message}");
    }
    serde_json::from_str(&body).with_context(|| format!("Unexpected response body: {body}"))
}
