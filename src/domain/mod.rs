pub mod fetchable;
pub mod fetched;
pub mod resource_type;
pub mod seed;

pub use fetchable::{FetchContext, FetchOutcome, Fetchable, Producer, ResourceKind};
pub use fetched::FetchedSet;
pub use resource_type::{tags_intersect, ResourceType};
pub use seed::Seed;
