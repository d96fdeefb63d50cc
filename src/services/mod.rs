pub mod backup_service;
pub mod maintenance_service;
pub mod migration;
pub mod parser;
pub mod reconcile;
pub mod restart;
pub mod restore_service;
pub mod store_io;
