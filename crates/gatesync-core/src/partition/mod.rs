//! Domain partitioning
//!
//! Splits a domain sequence into list-sized chunks and assigns them to
//! accounts. Accounts are filled in order: the first account takes up to
//! `list_item_limit - 1` domains, the next account the following slice, and
//! so on. Within an account the share is cut into chunks of at most
//! `list_item_size` domains.
//!
//! Partitioning is pure and deterministic. It runs before any remote call,
//! so a capacity shortfall aborts the run with nothing created.

use crate::config::{AccountConfig, ListLimits};
use crate::error::{Error, Result};

/// A bounded slice of the domain set destined for one remote list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListChunk {
    /// 1-based position of the chunk within its account
    pub sequence: usize,
    /// Domains of the chunk, in input order
    pub domains: Vec<String>,
}

impl ListChunk {
    /// Number of domains in the chunk
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Whether the chunk holds no domains
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// The chunks assigned to one account
#[derive(Debug, Clone)]
pub struct AccountShare {
    /// The account receiving the chunks
    pub account: AccountConfig,
    /// Position of the first domain of this share in the input (0-based)
    pub offset: usize,
    /// Chunks in upload order; empty when the account receives no domains
    pub chunks: Vec<ListChunk>,
}

impl AccountShare {
    /// Total domains across the share's chunks
    pub fn domain_count(&self) -> usize {
        self.chunks.iter().map(ListChunk::len).sum()
    }
}

/// Partition `domains` across `accounts`
///
/// Returns one [`AccountShare`] per account, in account order. Accounts past
/// the last needed one get an empty share.
///
/// # Errors
///
/// - [`Error::Config`] when no account is configured or the limits are invalid
/// - [`Error::Capacity`] when the domains exceed `(list_item_limit - 1) * accounts`
pub fn partition(
    domains: &[String],
    limits: &ListLimits,
    accounts: &[AccountConfig],
) -> Result<Vec<AccountShare>> {
    if accounts.is_empty() {
        return Err(Error::config("No account configurations provided"));
    }
    limits.validate()?;

    let per_account = limits.usable_per_account();
    check_capacity(domains.len(), per_account, accounts.len())?;

    let mut rest = domains;
    let mut offset = 0;
    let mut shares = Vec::with_capacity(accounts.len());

    for account in accounts {
        let take = per_account.min(rest.len());
        let (share, tail) = rest.split_at(take);

        let chunks = share
            .chunks(limits.list_item_size)
            .enumerate()
            .map(|(index, chunk)| ListChunk {
                sequence: index + 1,
                domains: chunk.to_vec(),
            })
            .collect();

        shares.push(AccountShare {
            account: account.clone(),
            offset,
            chunks,
        });

        offset += take;
        rest = tail;
    }

    Ok(shares)
}

/// Number of accounts needed for `domains` at `per_account` domains each
pub fn accounts_required(domains: usize, per_account: usize) -> usize {
    domains.div_ceil(per_account.max(1))
}

fn check_capacity(domains: usize, per_account: usize, accounts: usize) -> Result<()> {
    let capacity = per_account.saturating_mul(accounts);
    if domains > capacity {
        return Err(Error::Capacity {
            domains,
            per_account,
            accounts_required: accounts_required(domains, per_account),
            accounts_configured: accounts,
        });
    }
    Ok(())
}
