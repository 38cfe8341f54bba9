//! Managed list synchronization
//!
//! Uploads partitioned chunks as remote domain lists and removes managed
//! lists again. All calls for one account run strictly one after another.
//!
//! ## Failure policy
//!
//! - Create: the first failing chunk aborts the remaining chunks of that
//!   account. Lists already created stay in place.
//! - Delete: the first failing delete aborts the remaining deletes of that
//!   account and reports how many were removed.
//!
//! Whether an account failure stops the run is decided by the
//! [`Orchestrator`](crate::engine::Orchestrator), not here.

use tracing::{debug, error, info, warn};

use crate::config::{AccountConfig, ManagedNames};
use crate::error::{Error, Result};
use crate::partition::ListChunk;
use crate::traits::{GatewayApi, RemoteList};

/// Name of the list holding chunk `sequence`
///
/// The account suffix is only added when more than one account is
/// configured, so single-account names stay stable.
///
/// ```rust
/// use gatesync_core::lists::list_name;
///
/// assert_eq!(list_name("Gatesync List", 3, None), "Gatesync List - Chunk 3");
/// assert_eq!(
///     list_name("Gatesync List", 1, Some(2)),
///     "Gatesync List - Chunk 1 - Account 2"
/// );
/// ```
pub fn list_name(prefix: &str, sequence: usize, account_number: Option<usize>) -> String {
    match account_number {
        Some(number) => format!("{} - Chunk {} - Account {}", prefix, sequence, number),
        None => format!("{} - Chunk {}", prefix, sequence),
    }
}

/// Creates and deletes managed lists for one account at a time
pub struct ListSynchronizer<'a> {
    gateway: &'a dyn GatewayApi,
    names: &'a ManagedNames,
}

impl<'a> ListSynchronizer<'a> {
    /// Create a synchronizer over `gateway`
    pub fn new(gateway: &'a dyn GatewayApi, names: &'a ManagedNames) -> Self {
        Self { gateway, names }
    }

    /// Upload `chunks` as lists of `account`, one call per chunk
    ///
    /// `multi_account` adds the `" - Account <n>"` suffix to list names.
    ///
    /// # Errors
    ///
    /// [`Error::ListCreate`] naming the first list that could not be created.
    pub async fn create_lists(
        &self,
        account: &AccountConfig,
        chunks: &[ListChunk],
        multi_account: bool,
    ) -> Result<Vec<RemoteList>> {
        let suffix = multi_account.then_some(account.account_number);
        let mut remaining = chunks.len();
        let mut created = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let name = list_name(&self.names.list_prefix, chunk.sequence, suffix);

            match self
                .gateway
                .create_list(account, &name, &chunk.domains)
                .await
            {
                Ok(mut list) => {
                    remaining -= 1;
                    list.account_id = account.account_id.clone();
                    info!("Created \"{}\" list - {} left", name, remaining);
                    created.push(list);
                }
                Err(e) => {
                    error!(
                        "Could not create \"{}\" for Account {} - {}",
                        name, account.account_number, e
                    );
                    return Err(Error::ListCreate {
                        list: name,
                        created: created.len(),
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(created)
    }

    /// Fetch the managed lists of `account`
    ///
    /// A list is managed when its name contains the configured list prefix.
    /// An absent result is an empty set.
    pub async fn managed_lists(&self, account: &AccountConfig) -> Result<Vec<RemoteList>> {
        let Some(lists) = self.gateway.list_lists(account).await? else {
            warn!(
                "No lists found for Account {} (API returned an empty response)",
                account.account_number
            );
            return Ok(Vec::new());
        };

        let total = lists.len();
        let managed: Vec<RemoteList> = lists
            .into_iter()
            .filter(|list| list.name.contains(&self.names.list_prefix))
            .map(|mut list| {
                list.account_id = account.account_id.clone();
                list
            })
            .collect();

        debug!(
            "Account {}: {} lists, {} managed",
            account.account_number,
            total,
            managed.len()
        );
        Ok(managed)
    }

    /// Delete `lists` from `account`, one call per list
    ///
    /// Returns the number of deleted lists.
    ///
    /// # Errors
    ///
    /// [`Error::PartialDelete`] when a delete fails; earlier deletes stand.
    pub async fn delete_lists(&self, account: &AccountConfig, lists: &[RemoteList]) -> Result<usize> {
        let mut remaining = lists.len();

        for list in lists {
            if let Err(e) = self.gateway.delete_list(account, &list.id).await {
                error!("Could not delete {} - {}", list.name, e);
                return Err(Error::PartialDelete {
                    resource: "list",
                    deleted: lists.len() - remaining,
                    remaining,
                    source: Box::new(e),
                });
            }
            remaining -= 1;
            info!("Deleted {} list - {} left", list.name, remaining);
        }

        Ok(lists.len())
    }

    /// Delete every managed list of `account`
    ///
    /// No managed lists is a no-op success.
    pub async fn delete_managed_lists(&self, account: &AccountConfig) -> Result<usize> {
        let managed = self.managed_lists(account).await?;

        if managed.is_empty() {
            info!("No managed lists found for Account {}", account.account_number);
            return Ok(0);
        }

        info!(
            "Deleting {} lists for Account {}",
            managed.len(),
            account.account_number
        );
        self.delete_lists(account, &managed).await
    }
}
