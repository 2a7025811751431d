pub mod hub;

pub use hub::{BroadcastHub, PublishReport, ResultEvent, SubscriberId, Subscription};
