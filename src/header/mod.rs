//! Header Rewriter. `spec.md` §4.D.

mod rewriter;
mod rlp;
mod trie;
mod types;

pub use rewriter::{rewrite, Error, RewriteResult};
pub use rlp::{requests_hash, Header};
pub use trie::{transactions_root, withdrawals_root};
pub use types::{ParsedPayload, Withdrawal};
