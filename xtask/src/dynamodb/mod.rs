//! DynamoDB infrastructure management commands.

mod client;
mod config;
mod deploy;
mod error;
mod planning;

pub use error::{DynamodbError, Result};

use cloudlydb::StoreConfig;
use dialoguer::Confirm;

use crate::prelude::*;

/// DynamoDB infrastructure management commands.
#[derive(Debug, clap::Parser)]
pub struct DynamodbCommand {
    #[command(subcommand)]
    pub action: DynamodbAction,
}

/// Available DynamoDB actions.
#[derive(Debug, clap::Subcommand)]
pub enum DynamodbAction {
    /// Deploy or destroy the table.
    Deploy(DeployCommand),
}

/// Deploy or update DynamoDB infrastructure.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Deploy or destroy the DynamoDB table used by cloudlydb.

By default, this command creates the table with string `pk` (HASH) and `sk`
(RANGE) keys. Each `--gsi NAME` adds a Global Secondary Index keyed on
`<NAME>pk` and `<NAME>sk`; indexes missing from an existing table are added.

The command shows a plan of changes before applying and asks for confirmation.

Environment variables:
  AWS_ENDPOINT_URL    - Use local DynamoDB (e.g., http://localhost:8000)
  AWS_REGION          - AWS region (defaults to us-east-1)
  AWS_PROFILE         - AWS profile to use for credentials")]
pub struct DeployCommand {
    /// Skip confirmation prompts.
    #[arg(long)]
    pub force: bool,

    /// Destroy the table instead of creating/updating.
    #[arg(long)]
    pub destroy: bool,

    /// Table name to use.
    #[arg(long, env = "CLOUDLYDB_TABLE", default_value = config::DEFAULT_TABLE_NAME)]
    pub table_name: String,

    /// Global Secondary Index to create. Repeatable.
    #[arg(long = "gsi", value_name = "NAME")]
    pub gsis: Vec<String>,
}

/// Main entry point for dynamodb command.
pub async fn run(command: DynamodbCommand, global: crate::Global) -> Result<()> {
    match command.action {
        DynamodbAction::Deploy(deploy_cmd) => run_deploy(deploy_cmd, &global).await,
    }
}

fn confirm(prompt: &str, default: bool) -> Result<()> {
    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?;
    if confirmed {
        Ok(())
    } else {
        Err(DynamodbError::UserCancelled)
    }
}

async fn run_deploy(cmd: DeployCommand, global: &crate::Global) -> Result<()> {
    // Validate before touching the network.
    let table_config = config::TableConfig::cloudlydb(&cmd.table_name, &cmd.gsis)?;
    let store_config = StoreConfig::from_env();

    if !global.is_silent() {
        aprintln!("{} {}", p_b("Target:"), store_config.target_display());
        aprintln!();
    }

    let dynamo_client = client::create_client(&store_config).await;
    let current_state = client::get_table_state(&dynamo_client, &cmd.table_name).await?;

    if cmd.destroy {
        let plan = planning::calculate_destroy_plan(current_state.as_ref(), &cmd.table_name);

        if !global.is_silent() {
            aprintln!("{}", p_y("Destroy Plan:"));
            for line in planning::format_destroy_plan(&plan) {
                aprintln!("  {}", p_plan(&line));
            }
            aprintln!();
        }

        if matches!(plan, planning::DestroyPlan::AlreadyGone { .. }) {
            if !global.is_silent() {
                aprintln!("{}", p_g("Nothing to destroy."));
            }
            return Ok(());
        }

        if !cmd.force {
            confirm(
                "Are you sure you want to delete this table? ALL DATA WILL BE LOST",
                false,
            )?;
        }

        if !global.is_silent() {
            aprintln!("{}", p_b("Deleting table..."));
        }
        deploy::execute_destroy_plan(&dynamo_client, &plan).await?;
        if !global.is_silent() {
            aprintln!("{}", p_g("Table destroyed successfully."));
        }
        return Ok(());
    }

    let plan = planning::calculate_deploy_plan(current_state.as_ref(), &table_config);

    if !global.is_silent() {
        aprintln!("{}", p_c("Deploy Plan:"));
        for line in planning::format_deploy_plan(&plan) {
            aprintln!("  {}", p_plan(&line));
        }
        aprintln!();
    }

    if matches!(plan, planning::DeployPlan::NoChanges { .. }) {
        if !global.is_silent() {
            aprintln!("{}", p_g("Infrastructure is up to date."));
        }
        return Ok(());
    }

    if !cmd.force {
        confirm("Apply these changes?", true)?;
    }

    if !global.is_silent() {
        aprintln!("{}", p_b("Applying changes..."));
    }
    deploy::execute_deploy_plan(&dynamo_client, &plan).await?;
    if !global.is_silent() {
        aprintln!("{}", p_g("Infrastructure deployed successfully."));
    }

    Ok(())
}
