pub mod comments_repo;
pub mod credentials_repo;
pub mod migrations;
pub mod pool;

pub use comments_repo::{
    clear_comments, comment_statistics_or_default, count_comments, dump_comments, fetch_comment_statistics, find_comment,
    query_comments, upsert_comment, CommentsRepoError, EXPORT_COLUMNS,
};
pub use credentials_repo::{
    count_valid_credentials, delete_credentials, find_active_credential,
    invalidate_credentials, replace_active_credential, touch_active_credential,
    CredentialRecord, CredentialsRepoError,
};
pub use migrations::run_migrations;
pub use pool::{connect, connect_in_memory, ping, DbPool, DbPoolError};
