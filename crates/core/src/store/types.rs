use crate::attribute::Item;

/// Precondition on a point write, checked against the partition-key
/// attribute of the target item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// The item must not exist yet.
    NotExists,
    /// The item must already exist.
    Exists,
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub items: Vec<Item>,
    /// Key to resume from. `None` once the query is exhausted.
    pub last_evaluated_key: Option<Item>,
}
