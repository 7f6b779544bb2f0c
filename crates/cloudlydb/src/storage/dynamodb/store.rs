//! DynamoDB item store.
//!
//! Implements [`ItemStore`] from `cloudlydb_core::store` using DynamoDB.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::ReturnValue;
use aws_sdk_dynamodb::Client;

use cloudlydb_core::attribute::Item;
use cloudlydb_core::store::{ItemStore, QueryPage, StoreError, WriteCondition};
use cloudlydb_core::{Key, QueryRequest, TableBinding, UpdateExpression};

use super::conversions::{from_attribute_map, key_attributes, to_attribute_map};
use super::error::{
    map_delete_item_error, map_get_item_error, map_put_item_error, map_query_error,
    map_update_item_error,
};
use crate::config::StoreConfig;

/// DynamoDB-based item store.
///
/// Wraps an SDK client; every trait method issues exactly one request.
#[derive(Debug, Clone)]
pub struct DynamoDbStore {
    client: Client,
}

fn condition_expression(table: &TableBinding, condition: WriteCondition) -> String {
    match condition {
        WriteCondition::NotExists => format!("attribute_not_exists({})", table.partition_key),
        WriteCondition::Exists => format!("attribute_exists({})", table.partition_key),
    }
}

impl DynamoDbStore {
    /// Creates a store with the given DynamoDB client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a store for the given endpoint and region, using the AWS SDK
    /// default credential chain.
    pub async fn connect(config: &StoreConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        tracing::debug!(target_env = %config.target_display(), "DynamoDB client configured");
        Self::new(Client::new(&sdk_config))
    }

    /// Creates a store from environment configuration.
    ///
    /// See [`StoreConfig::from_env`] for the variables read.
    pub async fn from_env() -> Self {
        Self::connect(&StoreConfig::from_env()).await
    }

    /// The underlying SDK client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ItemStore for DynamoDbStore {
    async fn get_item(&self, table: &TableBinding, key: &Key) -> Result<Option<Item>, StoreError> {
        tracing::trace!(table = %table.table_name, pk = %key.pk, sk = %key.sk, "GetItem");
        let result = self
            .client
            .get_item()
            .table_name(&table.table_name)
            .set_key(Some(key_attributes(table, key)))
            .send()
            .await
            .map_err(|e| map_get_item_error(e, &table.table_name))?;

        result.item.as_ref().map(from_attribute_map).transpose()
    }

    async fn put_item(
        &self,
        table: &TableBinding,
        item: Item,
        condition: Option<WriteCondition>,
    ) -> Result<(), StoreError> {
        tracing::trace!(table = %table.table_name, ?condition, "PutItem");
        self.client
            .put_item()
            .table_name(&table.table_name)
            .set_item(Some(to_attribute_map(&item)))
            .set_condition_expression(condition.map(|c| condition_expression(table, c)))
            .send()
            .await
            .map_err(|e| map_put_item_error(e, &table.table_name))?;

        Ok(())
    }

    async fn update_item(
        &self,
        table: &TableBinding,
        key: &Key,
        update: &UpdateExpression,
        condition: Option<WriteCondition>,
    ) -> Result<Item, StoreError> {
        let rendered = update.render();
        tracing::trace!(
            table = %table.table_name,
            pk = %key.pk,
            sk = %key.sk,
            expression = %rendered.expression,
            "UpdateItem"
        );

        let result = self
            .client
            .update_item()
            .table_name(&table.table_name)
            .set_key(Some(key_attributes(table, key)))
            .update_expression(rendered.expression)
            .set_expression_attribute_names(Some(rendered.names))
            .set_expression_attribute_values(Some(to_attribute_map(&rendered.values)))
            .set_condition_expression(condition.map(|c| condition_expression(table, c)))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| map_update_item_error(e, &table.table_name))?;

        result
            .attributes
            .as_ref()
            .map(from_attribute_map)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryPage, StoreError> {
        let key_condition = request.key_condition_expression();
        tracing::trace!(
            table = %request.table.table_name,
            index = ?request.index_name,
            key_condition = %key_condition,
            "Query"
        );

        let names = request.expression_attribute_names();
        let result = self
            .client
            .query()
            .table_name(&request.table.table_name)
            .set_index_name(request.index_name.clone())
            .key_condition_expression(key_condition)
            .set_expression_attribute_values(Some(to_attribute_map(
                &request.expression_attribute_values(),
            )))
            .set_expression_attribute_names((!names.is_empty()).then_some(names))
            .set_projection_expression(request.projection_expression())
            .scan_index_forward(request.scan_forward)
            .limit(i32::try_from(request.limit).unwrap_or(i32::MAX))
            .set_exclusive_start_key(request.exclusive_start_key.as_ref().map(to_attribute_map))
            .send()
            .await
            .map_err(|e| map_query_error(e, &request.table.table_name))?;

        let items = result
            .items
            .unwrap_or_default()
            .iter()
            .map(from_attribute_map)
            .collect::<Result<Vec<_>, _>>()?;

        let last_evaluated_key = result
            .last_evaluated_key
            .filter(|key| !key.is_empty())
            .as_ref()
            .map(from_attribute_map)
            .transpose()?;

        Ok(QueryPage {
            items,
            last_evaluated_key,
        })
    }

    async fn delete_item(&self, table: &TableBinding, key: &Key) -> Result<Option<Item>, StoreError> {
        tracing::trace!(table = %table.table_name, pk = %key.pk, sk = %key.sk, "DeleteItem");
        let result = self
            .client
            .delete_item()
            .table_name(&table.table_name)
            .set_key(Some(key_attributes(table, key)))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| map_delete_item_error(e, &table.table_name))?;

        result
            .attributes
            .filter(|item| !item.is_empty())
            .as_ref()
            .map(from_attribute_map)
            .transpose()
    }
}
