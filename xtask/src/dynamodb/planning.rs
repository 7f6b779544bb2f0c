//! Pure functions for calculating deployment plans (Functional Core).

use super::config::{GsiConfig, TableConfig};

/// Current state of a table, as described by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableState {
    pub status: Status,
    pub gsis: Vec<GsiState>,
}

/// Lifecycle status shared by tables and indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Active,
    Creating,
    Updating,
    Deleting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsiState {
    pub name: String,
    pub status: Status,
}

impl TableState {
    /// The table and all of its indexes accept traffic.
    pub fn is_ready(&self) -> bool {
        self.status == Status::Active && self.gsis.iter().all(|g| g.status == Status::Active)
    }
}

/// Planned changes for deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployPlan {
    /// Table doesn't exist, needs to be created.
    CreateTable { config: TableConfig },
    /// Table exists, GSIs need to be added.
    AddGsis {
        table_name: String,
        gsis_to_add: Vec<GsiConfig>,
    },
    /// Table is up to date, no changes needed.
    NoChanges { table_name: String },
}

/// Plan for destroying a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyPlan {
    DeleteTable { table_name: String },
    AlreadyGone { table_name: String },
}

/// Calculate what changes are needed to reach the desired state.
///
/// Indexes present on the table but not requested are left alone.
pub fn calculate_deploy_plan(current: Option<&TableState>, desired: &TableConfig) -> DeployPlan {
    let Some(state) = current else {
        return DeployPlan::CreateTable {
            config: desired.clone(),
        };
    };

    let gsis_to_add: Vec<GsiConfig> = desired
        .gsis
        .iter()
        .filter(|gsi| !state.gsis.iter().any(|g| g.name == gsi.name))
        .cloned()
        .collect();

    if gsis_to_add.is_empty() {
        DeployPlan::NoChanges {
            table_name: desired.table_name.clone(),
        }
    } else {
        DeployPlan::AddGsis {
            table_name: desired.table_name.clone(),
            gsis_to_add,
        }
    }
}

pub fn calculate_destroy_plan(current: Option<&TableState>, table_name: &str) -> DestroyPlan {
    let table_name = table_name.to_string();
    match current {
        Some(_) => DestroyPlan::DeleteTable { table_name },
        None => DestroyPlan::AlreadyGone { table_name },
    }
}

fn format_gsi(gsi: &GsiConfig, indent: &str, verb: &str) -> Vec<String> {
    vec![
        format!("{indent}+ {verb}GSI: {}", gsi.name),
        format!("{indent}  Partition key: {} (S)", gsi.partition_key.name),
        format!("{indent}  Sort key: {} (S)", gsi.sort_key.name),
    ]
}

/// Format a deploy plan for display.
pub fn format_deploy_plan(plan: &DeployPlan) -> Vec<String> {
    match plan {
        DeployPlan::CreateTable { config } => {
            let mut lines = vec![
                format!("+ Create table: {}", config.table_name),
                format!("  Partition key: {} (S)", config.partition_key.name),
                format!("  Sort key: {} (S)", config.sort_key.name),
            ];
            for gsi in &config.gsis {
                lines.extend(format_gsi(gsi, "  ", ""));
            }
            lines.push("  Billing: PAY_PER_REQUEST".to_string());
            lines
        }
        DeployPlan::AddGsis {
            table_name,
            gsis_to_add,
        } => {
            let mut lines = vec![format!("~ Update table: {table_name}")];
            for gsi in gsis_to_add {
                lines.extend(format_gsi(gsi, "  ", "Add "));
            }
            lines
        }
        DeployPlan::NoChanges { table_name } => {
            vec![format!("= Table '{table_name}' is up to date")]
        }
    }
}

/// Format a destroy plan for display.
pub fn format_destroy_plan(plan: &DestroyPlan) -> Vec<String> {
    match plan {
        DestroyPlan::DeleteTable { table_name } => {
            vec![format!("- Delete table: {table_name} (ALL DATA WILL BE LOST)")]
        }
        DestroyPlan::AlreadyGone { table_name } => {
            vec![format!("= Table '{table_name}' does not exist")]
        }
    }
}
