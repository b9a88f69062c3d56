pub mod accumulation;
pub mod application;
pub mod binder;
pub mod camera;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod invalidation;
pub mod kernel;
pub mod renderer;
pub mod scene;
pub mod session;
pub mod texture;
pub mod tracer;
