pub mod destination;
pub mod photos;
pub mod source;
