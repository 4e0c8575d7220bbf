pub mod omniparser;
pub mod traits;
pub mod types;
