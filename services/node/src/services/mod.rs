pub mod ack_service;
pub mod association_service;
pub mod domain_directory;
pub mod message_service;
pub mod timeline_repo;
pub mod timeline_service;
pub mod writability;
