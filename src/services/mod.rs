//! Row types and the queries behind each endpoint.
//!
//! Services are stateless: every function takes the pooled connection it
//! should run on, so handlers wrap calls in [`crate::db::Db::run`].

pub mod file;
pub mod recommend_question;
pub mod tenant;

pub use file::{File, FileEntry, FileOrder, FileService, FileType, NewFile};
pub use recommend_question::{
    NewRecommendQuestion, QuestionFilter, QuestionOrder, QuestionUpdate, RecommendQuestion,
    RecommendQuestionService, Validity,
};
pub use tenant::{ApiTokenService, Tenant, TenantService, User, UserService, UserTenantService};

/// `status` of a live row.
pub const STATUS_VALID: &str = "1";
