pub mod config;
pub mod error;
pub mod events;
pub mod scan;
pub mod platform {
    pub mod device;
    pub mod monitors;
}
pub mod tasks {
    pub mod loader;
    pub mod presenter;
    pub mod shutdown;
    pub mod sync;
    pub mod viewer;
}
