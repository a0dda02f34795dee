pub mod acks;
pub mod associations;
pub mod domains;
pub mod entities;
pub mod items;
pub mod messages;
pub mod semantic_ids;
pub mod timelines;
