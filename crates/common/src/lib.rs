pub mod credential;
pub mod error;
pub mod nullifier;
pub mod submission;

pub use credential::{Credential, IssuanceInfo, NullifierRecord, NullifierState};
pub use error::{Error, Result};
pub use nullifier::NullifierHash;
pub use solana_program::pubkey::Pubkey;
pub use submission::{BadgeSummary, HoldingQuery, HoldingResponse, IssueResponse, ProofSubmission};
