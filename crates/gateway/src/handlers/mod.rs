//! API handlers module

pub mod accounts;
pub mod documents;
pub mod health;
pub mod lookup;
