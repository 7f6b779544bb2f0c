//! AWS SDK client setup (Imperative Shell).

use aws_sdk_dynamodb::types::{IndexStatus, TableStatus};
use aws_sdk_dynamodb::Client;
use cloudlydb::storage::DynamoDbStore;
use cloudlydb::StoreConfig;

use super::error::{DynamodbError, Result};
use super::planning::{GsiState, Status, TableState};

/// Creates a DynamoDB client from the same configuration the mapper uses.
pub async fn create_client(config: &StoreConfig) -> Client {
    DynamoDbStore::connect(config).await.client().clone()
}

fn table_status(status: Option<&TableStatus>) -> Status {
    match status {
        Some(TableStatus::Creating) => Status::Creating,
        Some(TableStatus::Updating) => Status::Updating,
        Some(TableStatus::Deleting) => Status::Deleting,
        _ => Status::Active,
    }
}

fn index_status(status: Option<&IndexStatus>) -> Status {
    match status {
        Some(IndexStatus::Creating) => Status::Creating,
        Some(IndexStatus::Updating) => Status::Updating,
        Some(IndexStatus::Deleting) => Status::Deleting,
        _ => Status::Active,
    }
}

/// Fetches current table state, returns None if table doesn't exist.
pub async fn get_table_state(client: &Client, table_name: &str) -> Result<Option<TableState>> {
    let response = match client.describe_table().table_name(table_name).send().await {
        Ok(response) => response,
        Err(err) => {
            let err = err.into_service_error();
            if err.is_resource_not_found_exception() {
                return Ok(None);
            }
            return Err(DynamodbError::AwsSdk(err.to_string()));
        }
    };

    let Some(table) = response.table() else {
        return Ok(None);
    };

    let gsis = table
        .global_secondary_indexes()
        .iter()
        .map(|gsi| GsiState {
            name: gsi.index_name().unwrap_or_default().to_string(),
            status: index_status(gsi.index_status()),
        })
        .collect();

    let state = TableState {
        status: table_status(table.table_status()),
        gsis,
    };
    tracing::debug!(table = %table_name, ?state, "Described table");
    Ok(Some(state))
}
