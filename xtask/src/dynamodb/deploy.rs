//! Table deployment operations (Imperative Shell).

use std::time::Duration;

use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, CreateGlobalSecondaryIndexAction, GlobalSecondaryIndex,
    GlobalSecondaryIndexUpdate, KeySchemaElement, KeyType, Projection, ProjectionType,
    ScalarAttributeType,
};
use aws_sdk_dynamodb::Client;

use super::client;
use super::config::{GsiConfig, KeyAttribute, TableConfig};
use super::error::{DynamodbError, Result};
use super::planning::{DeployPlan, DestroyPlan};

const ACTIVATION_ATTEMPTS: usize = 60;
const ACTIVATION_DELAY: Duration = Duration::from_secs(2);

fn sdk_error(err: impl std::fmt::Display) -> DynamodbError {
    DynamodbError::AwsSdk(err.to_string())
}

/// Execute a deploy plan.
pub async fn execute_deploy_plan(client: &Client, plan: &DeployPlan) -> Result<()> {
    match plan {
        DeployPlan::CreateTable { config } => {
            create_table(client, config).await?;
            wait_for_table_active(client, &config.table_name).await?;
        }
        DeployPlan::AddGsis {
            table_name,
            gsis_to_add,
        } => {
            // The service accepts one index creation per update.
            for gsi in gsis_to_add {
                add_gsi(client, table_name, gsi).await?;
                wait_for_table_active(client, table_name).await?;
            }
        }
        DeployPlan::NoChanges { .. } => {}
    }
    Ok(())
}

/// Execute a destroy plan.
pub async fn execute_destroy_plan(client: &Client, plan: &DestroyPlan) -> Result<()> {
    if let DestroyPlan::DeleteTable { table_name } = plan {
        tracing::debug!(table = %table_name, "DeleteTable");
        client
            .delete_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(sdk_error)?;
    }
    Ok(())
}

fn key_schema(partition_key: &KeyAttribute, sort_key: &KeyAttribute) -> Result<Vec<KeySchemaElement>> {
    [(partition_key, KeyType::Hash), (sort_key, KeyType::Range)]
        .into_iter()
        .map(|(key, key_type)| {
            KeySchemaElement::builder()
                .attribute_name(&key.name)
                .key_type(key_type)
                .build()
                .map_err(sdk_error)
        })
        .collect()
}

/// String attribute definitions, without duplicates.
fn attribute_definitions<'a>(
    keys: impl IntoIterator<Item = &'a KeyAttribute>,
) -> Result<Vec<AttributeDefinition>> {
    let mut definitions: Vec<AttributeDefinition> = Vec::new();
    for key in keys {
        if definitions.iter().any(|d| d.attribute_name() == key.name) {
            continue;
        }
        definitions.push(
            AttributeDefinition::builder()
                .attribute_name(&key.name)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(sdk_error)?,
        );
    }
    Ok(definitions)
}

fn projection_all() -> Projection {
    Projection::builder()
        .projection_type(ProjectionType::All)
        .build()
}

async fn create_table(client: &Client, config: &TableConfig) -> Result<()> {
    let keys = [&config.partition_key, &config.sort_key]
        .into_iter()
        .chain(config.gsis.iter().flat_map(|g| [&g.partition_key, &g.sort_key]));

    let mut request = client
        .create_table()
        .table_name(&config.table_name)
        .set_key_schema(Some(key_schema(&config.partition_key, &config.sort_key)?))
        .set_attribute_definitions(Some(attribute_definitions(keys)?))
        .billing_mode(BillingMode::PayPerRequest);

    for gsi in &config.gsis {
        request = request.global_secondary_indexes(
            GlobalSecondaryIndex::builder()
                .index_name(&gsi.name)
                .set_key_schema(Some(key_schema(&gsi.partition_key, &gsi.sort_key)?))
                .projection(projection_all())
                .build()
                .map_err(sdk_error)?,
        );
    }

    tracing::debug!(table = %config.table_name, gsis = config.gsis.len(), "CreateTable");
    request.send().await.map_err(sdk_error)?;
    Ok(())
}

async fn add_gsi(client: &Client, table_name: &str, gsi: &GsiConfig) -> Result<()> {
    let create = CreateGlobalSecondaryIndexAction::builder()
        .index_name(&gsi.name)
        .set_key_schema(Some(key_schema(&gsi.partition_key, &gsi.sort_key)?))
        .projection(projection_all())
        .build()
        .map_err(sdk_error)?;

    tracing::debug!(table = %table_name, gsi = %gsi.name, "UpdateTable: create GSI");
    client
        .update_table()
        .table_name(table_name)
        .set_attribute_definitions(Some(attribute_definitions([
            &gsi.partition_key,
            &gsi.sort_key,
        ])?))
        .global_secondary_index_updates(GlobalSecondaryIndexUpdate::builder().create(create).build())
        .send()
        .await
        .map_err(sdk_error)?;

    Ok(())
}

async fn wait_for_table_active(client: &Client, table_name: &str) -> Result<()> {
    for attempt in 1..=ACTIVATION_ATTEMPTS {
        if let Some(state) = client::get_table_state(client, table_name).await? {
            if state.is_ready() {
                return Ok(());
            }
        }
        tracing::debug!(table = %table_name, attempt, "Waiting for table to become active");
        tokio::time::sleep(ACTIVATION_DELAY).await;
    }

    Err(DynamodbError::TableActivationTimeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_definitions_are_deduplicated() {
        let pk = KeyAttribute {
            name: "pk".to_string(),
        };
        let sk = KeyAttribute {
            name: "sk".to_string(),
        };
        let definitions = attribute_definitions([&pk, &sk, &pk]).unwrap();
        let names: Vec<&str> = definitions.iter().map(|d| d.attribute_name()).collect();
        assert_eq!(names, vec!["pk", "sk"]);
    }

    #[test]
    fn test_key_schema_order() {
        let config = TableConfig::cloudlydb("school", &[]).unwrap();
        let schema = key_schema(&config.partition_key, &config.sort_key).unwrap();
        assert_eq!(schema[0].key_type(), &KeyType::Hash);
        assert_eq!(schema[1].attribute_name(), "sk");
    }
}
