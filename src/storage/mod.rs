mod categories;
mod comments;
mod events;
mod posts;
mod traits;
mod types;
mod users;

pub use categories::{Category, CategoryStore, PostgresCategoryStore};
pub use comments::{Comment, CommentStore, NewComment, PostgresCommentStore};
pub use events::{PostgresEventStore, SecurityAction, SecurityEvent, SecurityEventStore};
pub use posts::{
    NewPost, Post, PostFilter, PostSort, PostStore, PostgresPostStore, Tag, UpdatePost,
};
pub use traits::{StorageError, StorageResult};
pub use types::{make_excerpt, slugify, CommentStatus, Pagination, PostStatus, Role};
pub use users::{CreateUser, PostgresUserStore, User, UserStore};
