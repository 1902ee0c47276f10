pub mod db;
pub mod domain;

pub use db::StoreError;
