pub mod error;
pub mod models;
pub mod validation;
pub mod user_info;
pub mod vote_policy;
pub mod ranking;
pub mod session;
pub mod export;
pub mod media;

pub use error::{Error, ErrorCode};
pub use models::*;
pub use validation::*;
pub use user_info::*;
pub use vote_policy::{apply_vote, set_votes, vote_weight, ANONYMOUS_VOTE_WEIGHT, REGISTERED_VOTE_WEIGHT};
pub use ranking::{derive_view, rank, TOP_RANKED};
pub use session::{classify, submission_gate, AdminSet, Identity, SubmitGate, ViewerClass};
pub use export::{export_file_name, to_csv};
