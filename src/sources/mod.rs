//! Built-in kinds of fetchable items.

pub mod blog;
pub mod links;
pub mod resource;
pub mod stream_replay;
pub mod timeline;

pub use blog::Blog;
pub use resource::{Resource, Unknown, Unsupported};
pub use stream_replay::StreamCapture;
pub use timeline::UserTimeline;
