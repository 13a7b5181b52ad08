pub mod batches;
pub mod callbacks;
pub mod health;
