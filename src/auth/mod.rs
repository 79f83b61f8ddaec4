//! Biometric matcher and its persistence/session collaborators.
//! Spec.md §4.6, §3 ("UserTemplate", "Session").

pub mod matcher;
pub mod session;
pub mod store;

pub use matcher::{AuthMatcher, LoginSuccess, MatcherConfig, UserSummary};
pub use session::{Session, SessionTable, VerifyOutcome};
pub use store::{UserSample, UserStore, UserTemplate};
