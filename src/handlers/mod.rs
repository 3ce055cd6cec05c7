//! Resource views of the paper sharing site and the generic entity handlers they share.

pub mod discussions;
pub mod entity;
pub mod groups;
pub mod notes;
pub mod papers;
pub mod users;

use crate::dispatch::ResourceView;
use std::sync::Arc;

pub use discussions::{CommentsView, QuestionsView, RepliesView};
pub use groups::GroupsView;
pub use notes::NotesView;
pub use papers::PapersView;
pub use users::UsersView;

/// Every view the server mounts.
pub fn default_views() -> Vec<Arc<dyn ResourceView>> {
    vec![
        Arc::new(UsersView),
        Arc::new(GroupsView),
        Arc::new(PapersView),
        Arc::new(NotesView),
        Arc::new(QuestionsView),
        Arc::new(RepliesView),
        Arc::new(CommentsView),
    ]
}
