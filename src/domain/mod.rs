pub mod article;
pub mod parsed;

pub use article::{Article, ArticleStatus, ChangeSet, StatusKey, SyncStatus};
pub use parsed::{ParsedAttachment, ParsedAuthor, ParsedFeed, ParsedHub, ParsedItem};
