pub mod ack;
pub mod health;
