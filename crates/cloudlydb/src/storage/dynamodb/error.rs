//! DynamoDB error mapping.
//!
//! Maps AWS SDK errors to `StoreError` from `cloudlydb_core::store`.

use std::fmt::Debug;

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use cloudlydb_core::StoreError;

/// Requests that never got a response.
fn transport_error<E: Debug, R: Debug>(err: &SdkError<E, R>) -> Option<StoreError> {
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            Some(StoreError::Connection(format!("{err:?}")))
        }
        _ => None,
    }
}

/// Classify a service error that has no modeled variant.
fn unmodeled<E: ProvideErrorMetadata + Debug>(operation: &str, err: &E) -> StoreError {
    let message = err.message().unwrap_or("no message").to_string();
    match err.code() {
        Some("ValidationException") => StoreError::Validation(message),
        Some("ThrottlingException") => StoreError::Throttled(message),
        Some(code) => StoreError::Service(format!("{operation} failed: {code}: {message}")),
        None => StoreError::Service(format!("{operation} failed: {err:?}")),
    }
}

fn throughput_exceeded() -> StoreError {
    StoreError::Throttled("Throughput exceeded, please retry".to_string())
}

fn request_limit_exceeded() -> StoreError {
    StoreError::Throttled("Request limit exceeded, please retry".to_string())
}

fn internal_server_error() -> StoreError {
    StoreError::Service("DynamoDB internal server error".to_string())
}

/// Map a GetItem SDK error to StoreError.
pub fn map_get_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<GetItemError, R>,
    table: &str,
) -> StoreError {
    if let Some(err) = transport_error(&err) {
        return err;
    }
    match err.into_service_error() {
        GetItemError::ResourceNotFoundException(_) => StoreError::TableNotFound(table.to_string()),
        GetItemError::ProvisionedThroughputExceededException(_) => throughput_exceeded(),
        GetItemError::RequestLimitExceeded(_) => request_limit_exceeded(),
        GetItemError::InternalServerError(_) => internal_server_error(),
        err => unmodeled("GetItem", &err),
    }
}

/// Map a Query SDK error to StoreError.
pub fn map_query_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<QueryError, R>,
    table: &str,
) -> StoreError {
    if let Some(err) = transport_error(&err) {
        return err;
    }
    match err.into_service_error() {
        QueryError::ResourceNotFoundException(_) => StoreError::TableNotFound(table.to_string()),
        QueryError::ProvisionedThroughputExceededException(_) => throughput_exceeded(),
        QueryError::RequestLimitExceeded(_) => request_limit_exceeded(),
        QueryError::InternalServerError(_) => internal_server_error(),
        err => unmodeled("Query", &err),
    }
}

/// Map a PutItem SDK error to StoreError.
pub fn map_put_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<PutItemError, R>,
    table: &str,
) -> StoreError {
    if let Some(err) = transport_error(&err) {
        return err;
    }
    match err.into_service_error() {
        PutItemError::ConditionalCheckFailedException(e) => StoreError::ConditionFailed(
            e.message().unwrap_or("conditional check failed").to_string(),
        ),
        PutItemError::ResourceNotFoundException(_) => StoreError::TableNotFound(table.to_string()),
        PutItemError::ProvisionedThroughputExceededException(_) => throughput_exceeded(),
        PutItemError::RequestLimitExceeded(_) => request_limit_exceeded(),
        PutItemError::ItemCollectionSizeLimitExceededException(_) => {
            StoreError::Service("Item collection size limit exceeded".to_string())
        }
        PutItemError::TransactionConflictException(_) => {
            StoreError::Service("Transaction conflict".to_string())
        }
        PutItemError::InternalServerError(_) => internal_server_error(),
        err => unmodeled("PutItem", &err),
    }
}

/// Map an UpdateItem SDK error to StoreError.
pub fn map_update_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<UpdateItemError, R>,
    table: &str,
) -> StoreError {
    if let Some(err) = transport_error(&err) {
        return err;
    }
    match err.into_service_error() {
        UpdateItemError::ConditionalCheckFailedException(e) => StoreError::ConditionFailed(
            e.message().unwrap_or("conditional check failed").to_string(),
        ),
        UpdateItemError::ResourceNotFoundException(_) => {
            StoreError::TableNotFound(table.to_string())
        }
        UpdateItemError::ProvisionedThroughputExceededException(_) => throughput_exceeded(),
        UpdateItemError::RequestLimitExceeded(_) => request_limit_exceeded(),
        UpdateItemError::ItemCollectionSizeLimitExceededException(_) => {
            StoreError::Service("Item collection size limit exceeded".to_string())
        }
        UpdateItemError::TransactionConflictException(_) => {
            StoreError::Service("Transaction conflict".to_string())
        }
        UpdateItemError::InternalServerError(_) => internal_server_error(),
        err => unmodeled("UpdateItem", &err),
    }
}

/// Map a DeleteItem SDK error to StoreError.
pub fn map_delete_item_error<R: Debug + Send + Sync + 'static>(
    err: SdkError<DeleteItemError, R>,
    table: &str,
) -> StoreError {
    if let Some(err) = transport_error(&err) {
        return err;
    }
    match err.into_service_error() {
        DeleteItemError::ConditionalCheckFailedException(e) => StoreError::ConditionFailed(
            e.message().unwrap_or("conditional check failed").to_string(),
        ),
        DeleteItemError::ResourceNotFoundException(_) => {
            StoreError::TableNotFound(table.to_string())
        }
        DeleteItemError::ProvisionedThroughputExceededException(_) => throughput_exceeded(),
        DeleteItemError::RequestLimitExceeded(_) => request_limit_exceeded(),
        DeleteItemError::ItemCollectionSizeLimitExceededException(_) => {
            StoreError::Service("Item collection size limit exceeded".to_string())
        }
        DeleteItemError::TransactionConflictException(_) => {
            StoreError::Service("Transaction conflict".to_string())
        }
        DeleteItemError::InternalServerError(_) => internal_server_error(),
        err => unmodeled("DeleteItem", &err),
    }
}
