pub mod analytics;
pub mod attendance;
pub mod core;
pub mod enrollment;
pub mod integrations;
pub mod roster;
pub mod setup;
