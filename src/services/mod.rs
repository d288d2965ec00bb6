pub mod asset_store;
pub mod coordinator;
pub mod preview;
pub mod upload_service;
