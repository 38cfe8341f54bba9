//! Rule match expressions
//!
//! Builds a disjunction over list ids in the gateway's wirefilter grammar:
//!
//! ```text
//! any(dns.domains[*] in $<id1>) or any(dns.domains[*] in $<id2>)
//! ```

/// Field matched by the DNS rule
pub const DNS_DOMAINS_FIELD: &str = "dns.domains[*]";

/// Field matched by the SNI rule
pub const SNI_DOMAINS_FIELD: &str = "net.sni.domains[*]";

const CONNECTIVE: &str = " or ";

/// Build a disjunctive match expression over `list_ids`
///
/// Returns an empty string when `list_ids` is empty. An empty expression is
/// not a valid rule and callers must not submit it.
///
/// # Example
///
/// ```rust
/// use gatesync_core::expression::{build_expression, DNS_DOMAINS_FIELD};
///
/// let expr = build_expression(["1", "2"], DNS_DOMAINS_FIELD);
/// assert_eq!(expr, "any(dns.domains[*] in $1) or any(dns.domains[*] in $2)");
/// ```
pub fn build_expression<I, S>(list_ids: I, field_path: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    list_ids
        .into_iter()
        .map(|id| format!("any({} in ${})", field_path, id.as_ref()))
        .collect::<Vec<_>>()
        .join(CONNECTIVE)
}
