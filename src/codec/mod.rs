pub mod blob;
pub mod gzip;
